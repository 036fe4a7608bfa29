//! Byte transport for IMAP connections.
//!
//! This module provides:
//! - TCP connect with optional HTTP CONNECT proxy and implicit TLS
//! - TLS/plaintext stream abstraction with a certificate-validation toggle
//! - Framed, cancellation-safe line reading with literal support
//! - Read timeouts and stream metadata used to classify failed reads

mod framed;
mod proxy;
mod stream;

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub use framed::{FramedStream, MAX_LINE_LENGTH, MAX_LITERAL_SIZE};
pub use proxy::handshake as proxy_handshake;
pub use stream::{ImapStream, create_tls_connector};

use crate::config::Config;
use crate::{Error, Result};

/// State of the underlying stream, used to classify failed reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamMeta {
    /// The last read hit the stream timeout.
    pub timed_out: bool,
    /// The peer closed the stream.
    pub eof: bool,
    /// Total bytes read.
    pub bytes_read: usize,
    /// Total bytes written.
    pub bytes_written: usize,
}

/// A framed stream with a read timeout and traffic echo.
pub struct Transport<S> {
    framed: FramedStream<S>,
    timeout: Option<Duration>,
    meta: StreamMeta,
    debug: bool,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S, timeout: Option<Duration>, debug: bool) -> Self {
        Self {
            framed: FramedStream::new(stream),
            timeout,
            meta: StreamMeta::default(),
            debug,
        }
    }

    /// Bounds every subsequent read; `None` waits forever.
    pub const fn set_stream_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Returns the current read timeout.
    #[must_use]
    pub const fn stream_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the stream metadata.
    #[must_use]
    pub const fn meta(&self) -> StreamMeta {
        self.meta
    }

    /// Reads one response unit (a line plus any literals it carries).
    ///
    /// # Errors
    ///
    /// `ConnectionTimedOut` when the read timeout elapses, `ConnectionClosed`
    /// when the peer has gone away, otherwise the underlying error.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let outcome = match self.timeout {
            Some(limit) => {
                if let Ok(outcome) = tokio::time::timeout(limit, self.framed.read_response()).await
                {
                    outcome
                } else {
                    self.meta.timed_out = true;
                    return Err(Error::ConnectionTimedOut(limit));
                }
            }
            None => self.framed.read_response().await,
        };

        match outcome {
            Ok(line) => {
                self.meta.timed_out = false;
                self.meta.bytes_read += line.len();
                self.echo("<<", &line);
                Ok(line)
            }
            Err(e) => Err(self.classify(e)),
        }
    }

    /// Writes one line; CRLF is appended.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` when the peer has gone away, otherwise the
    /// underlying error.
    pub async fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.echo(">>", line);
        match self.framed.write_line(line).await {
            Ok(()) => {
                self.meta.bytes_written += line.len() + 2;
                Ok(())
            }
            Err(e) => Err(self.classify(e)),
        }
    }

    /// Shuts the stream down, ignoring failures.
    pub async fn close(&mut self) {
        if let Err(e) = self.framed.shutdown().await {
            tracing::debug!(error = %e, "Ignoring shutdown failure");
        }
    }

    /// Returns the inner stream, dropping buffered data.
    pub fn into_inner(self) -> S {
        self.framed.into_inner()
    }

    fn classify(&mut self, error: Error) -> Error {
        match error {
            Error::Io(e) if is_closed(&e) => {
                self.meta.eof = true;
                Error::ConnectionClosed
            }
            other => other,
        }
    }

    fn echo(&self, direction: &str, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        let text = text.trim_end_matches(['\r', '\n']);
        if self.debug {
            tracing::debug!(target: "imapwire::wire", "{direction} {text}");
        } else {
            tracing::trace!(target: "imapwire::wire", "{direction} {text}");
        }
    }
}

fn is_closed(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

/// Opens the byte stream described by `config`: TCP (through the proxy if
/// one is set), then TLS right away for implicit-TLS modes.
///
/// # Errors
///
/// Every failure, including the connect timeout, is `ConnectionFailed`.
pub async fn open(config: &Config) -> Result<ImapStream> {
    let host = config.host.as_str();
    let port = config.port;

    let connecting = async {
        let tcp = match &config.proxy {
            Some(proxy) => proxy::tunnel(proxy, host, port).await?,
            None => TcpStream::connect((host, port)).await?,
        };
        let stream = ImapStream::Plain(tcp);
        if config.security.is_implicit() {
            stream.upgrade_to_tls(host, config.validate_cert).await
        } else {
            Ok(stream)
        }
    };

    match tokio::time::timeout(config.connect_timeout, connecting).await {
        Ok(Ok(stream)) => {
            tracing::info!(host, port, tls = stream.is_tls(), "Connected");
            Ok(stream)
        }
        Ok(Err(e)) => Err(Error::ConnectionFailed(format!(
            "connection to {host}:{port} failed: {e}"
        ))),
        Err(_) => Err(Error::ConnectionFailed(format!(
            "connection to {host}:{port} timed out after {:?}",
            config.connect_timeout
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_sets_meta() {
        let mock = Builder::new()
            .wait(Duration::from_secs(60))
            .read(b"* OK late\r\n")
            .build();
        let mut transport = Transport::new(mock, Some(Duration::from_secs(5)), false);

        let err = transport.read_line().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionTimedOut(d) if d == Duration::from_secs(5)));
        assert!(transport.meta().timed_out);

        transport.set_stream_timeout(None);
        assert_eq!(transport.read_line().await.unwrap(), b"* OK late\r\n");
        assert!(!transport.meta().timed_out);
    }

    #[tokio::test]
    async fn test_eof_classified_as_closed() {
        let mock = Builder::new().build();
        let mut transport = Transport::new(mock, None, false);

        let err = transport.read_line().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(transport.meta().eof);
    }

    #[tokio::test]
    async fn test_byte_counters() {
        let mock = Builder::new()
            .write(b"TAG1 NOOP\r\n")
            .read(b"TAG1 OK\r\n")
            .build();
        let mut transport = Transport::new(mock, None, true);

        transport.write_line(b"TAG1 NOOP").await.unwrap();
        transport.read_line().await.unwrap();
        assert_eq!(transport.meta().bytes_written, 11);
        assert_eq!(transport.meta().bytes_read, 9);
    }

    #[tokio::test]
    async fn test_open_refused_is_connection_failed() {
        let config = Config::builder("127.0.0.1")
            .port(1)
            .security(crate::Security::None)
            .connect_timeout(Duration::from_secs(2))
            .build();

        let err = open(&config).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)));
    }
}
