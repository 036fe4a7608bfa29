//! HTTP CONNECT tunnelling.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ProxyConfig;
use crate::{Error, Result};

/// Upper bound on the proxy's response head.
const MAX_HEAD_LENGTH: usize = 8 * 1024;

/// Opens a TCP connection to the proxy and asks it for a tunnel to
/// `host:port`.
pub async fn tunnel(proxy: &ProxyConfig, host: &str, port: u16) -> Result<TcpStream> {
    tracing::debug!(proxy = %proxy.address, host, port, "Opening proxy tunnel");
    let mut tcp = TcpStream::connect(proxy.address.as_str()).await?;
    handshake(&mut tcp, proxy, host, port).await?;
    Ok(tcp)
}

/// Runs the CONNECT exchange on an already connected stream.
///
/// The response head is read byte by byte so no IMAP data sent right after
/// the tunnel opens is swallowed.
pub async fn handshake<S>(stream: &mut S, proxy: &ProxyConfig, host: &str, port: u16) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(connect_request(proxy, host, port).as_bytes()).await?;
    stream.flush().await?;

    let mut head = Vec::with_capacity(256);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_HEAD_LENGTH {
            return Err(Error::ConnectionFailed(
                "proxy response head too long".to_string(),
            ));
        }
        head.push(stream.read_u8().await?);
    }

    let status_line = head
        .split(|&b| b == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).trim().to_string())
        .unwrap_or_default();

    match status_code(&status_line) {
        Some(code) if (200..300).contains(&code) => Ok(()),
        _ => Err(Error::ConnectionFailed(format!(
            "proxy refused tunnel: {status_line}"
        ))),
    }
}

/// Builds the CONNECT request head.
fn connect_request(proxy: &ProxyConfig, host: &str, port: u16) -> String {
    let authority = format!("{host}:{port}");
    let target = if proxy.request_fulluri {
        format!("imap://{authority}")
    } else {
        authority.clone()
    };

    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(username) = &proxy.username {
        let password = proxy.password.as_deref().unwrap_or_default();
        let credentials = STANDARD.encode(format!("{username}:{password}"));
        request.push_str(&format!("Proxy-Authorization: Basic {credentials}\r\n"));
    }
    request.push_str("\r\n");
    request
}

/// Extracts the status code from `HTTP/1.x NNN reason`.
fn status_code(status_line: &str) -> Option<u16> {
    let mut parts = status_line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_plain() {
        let proxy = ProxyConfig::new("proxy:3128");
        assert_eq!(
            connect_request(&proxy, "imap.example.com", 993),
            "CONNECT imap.example.com:993 HTTP/1.1\r\nHost: imap.example.com:993\r\n\r\n"
        );
    }

    #[test]
    fn test_connect_request_with_auth_and_fulluri() {
        let proxy = ProxyConfig::new("proxy:3128")
            .credentials("user", "pass")
            .request_fulluri(true);
        let request = connect_request(&proxy, "imap.example.com", 143);
        assert!(request.starts_with("CONNECT imap://imap.example.com:143 HTTP/1.1\r\n"));
        assert!(request.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
    }

    #[test]
    fn test_status_code() {
        assert_eq!(status_code("HTTP/1.1 200 Connection established"), Some(200));
        assert_eq!(status_code("HTTP/1.0 407 Proxy Authentication Required"), Some(407));
        assert_eq!(status_code("* OK IMAP ready"), None);
    }

    #[tokio::test]
    async fn test_handshake_accepts_2xx() {
        use tokio_test::io::Builder;

        let proxy = ProxyConfig::new("proxy:3128");
        let mut mock = Builder::new()
            .write(b"CONNECT mail.local:143 HTTP/1.1\r\nHost: mail.local:143\r\n\r\n")
            .read(b"HTTP/1.1 200 Connection established\r\nVia: test\r\n\r\n")
            .build();

        handshake(&mut mock, &proxy, "mail.local", 143).await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejects_407() {
        use tokio_test::io::Builder;

        let proxy = ProxyConfig::new("proxy:3128");
        let mut mock = Builder::new()
            .write(b"CONNECT mail.local:143 HTTP/1.1\r\nHost: mail.local:143\r\n\r\n")
            .read(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
            .build();

        let err = handshake(&mut mock, &proxy, "mail.local", 143)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)));
    }
}
