//! Framed I/O for IMAP protocol.
//!
//! IMAP uses line-terminated responses that may embed `{n}` literals; the
//! literal bytes and the rest of the line after them belong to the same
//! response unit. Reads are cancellation safe: everything pulled out of the
//! buffered reader is parked in `partial` until the unit is complete, so a
//! timed-out read loses nothing.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
pub const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Framed connection for IMAP protocol.
///
/// Handles line-based reading with literal support and buffered writing.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    /// Bytes of the response unit being assembled.
    partial: Vec<u8>,
    /// Offset in `partial` where the current physical line starts.
    line_start: usize,
    /// Literal bytes still owed by the server.
    literal_remaining: usize,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            partial: Vec::new(),
            line_start: 0,
            literal_remaining: 0,
        }
    }

    /// Reads one response unit: a physical line plus every literal it
    /// announces and the continuation lines after those literals.
    ///
    /// # Errors
    ///
    /// `UnexpectedEof` when the peer closes the stream, `BadRequest` when a
    /// line or literal exceeds the size limits.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        loop {
            if self.literal_remaining > 0 {
                let buf = self.reader.fill_buf().await?;
                if buf.is_empty() {
                    return Err(eof());
                }
                let take = buf.len().min(self.literal_remaining);
                self.partial.extend_from_slice(&buf[..take]);
                self.reader.consume(take);
                self.literal_remaining -= take;
                continue;
            }

            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(eof());
            }

            if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                self.partial.extend_from_slice(&buf[..=pos]);
                self.reader.consume(pos + 1);

                match parse_literal_length(&self.partial[self.line_start..]) {
                    Some(len) if len > MAX_LITERAL_SIZE => {
                        self.reset();
                        return Err(Error::BadRequest(format!(
                            "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                        )));
                    }
                    Some(len) => {
                        self.literal_remaining = len;
                        self.line_start = self.partial.len() + len;
                    }
                    None => {
                        let unit = std::mem::take(&mut self.partial);
                        self.line_start = 0;
                        return Ok(unit);
                    }
                }
            } else {
                let len = buf.len();
                self.partial.extend_from_slice(buf);
                self.reader.consume(len);

                if self.partial.len() - self.line_start > MAX_LINE_LENGTH {
                    self.reset();
                    return Err(Error::BadRequest("line too long".to_string()));
                }
            }
        }
    }

    /// Writes one command line; CRLF is appended.
    ///
    /// # Errors
    ///
    /// Propagates write and flush failures.
    pub async fn write_line(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);
        self.write_buffer.extend_from_slice(b"\r\n");

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Shuts the write half down.
    ///
    /// # Errors
    ///
    /// Propagates shutdown failures.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().await?;
        Ok(())
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Note: Any buffered data will be lost.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    fn reset(&mut self) {
        self.partial.clear();
        self.line_start = 0;
        self.literal_remaining = 0;
    }
}

fn eof() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "connection closed",
    ))
}

/// Parses a literal length from the end of a line.
///
/// Matches lines ending in `{123}` or `{123+}` (non-synchronizing), followed
/// by CRLF or a bare LF.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\n")?;
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);

    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::time::Duration;

    use tokio_test::io::Builder;

    use super::*;

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY {7}\n"), Some(7));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"{999999}\r\n"), Some(999_999));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
        assert_eq!(parse_literal_length(b"empty {}\r\n"), None);
    }

    #[tokio::test]
    async fn test_framed_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_framed_reads_lines_one_at_a_time() {
        let mock = Builder::new()
            .read(b"* 3 EXISTS\r\n* 0 RECENT\r\nTAG1 OK done\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(framed.read_response().await.unwrap(), b"* 3 EXISTS\r\n");
        assert_eq!(framed.read_response().await.unwrap(), b"* 0 RECENT\r\n");
        assert_eq!(framed.read_response().await.unwrap(), b"TAG1 OK done\r\n");
    }

    #[tokio::test]
    async fn test_framed_read_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY {5}\r\n")
            .read(b"hello)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY {5}\r\nhello)\r\n");
    }

    #[tokio::test]
    async fn test_literal_containing_newlines() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (RFC822.HEADER {14}\r\nA: 1\r\n")
            .read(b"B: 2\r\n\r\n UID 9)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(
            response,
            b"* 1 FETCH (RFC822.HEADER {14}\r\nA: 1\r\nB: 2\r\n\r\n UID 9)\r\n"
        );
    }

    #[tokio::test]
    async fn test_two_literals_in_one_unit() {
        let mock = Builder::new()
            .read(b"* 2 FETCH (A {1}\r\nx B {2}\r\nyz)\r\n* OK\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(
            framed.read_response().await.unwrap(),
            b"* 2 FETCH (A {1}\r\nx B {2}\r\nyz)\r\n"
        );
        assert_eq!(framed.read_response().await.unwrap(), b"* OK\r\n");
    }

    #[tokio::test]
    async fn test_eof_is_unexpected_eof() {
        let mock = Builder::new().read(b"* partial").build();
        let mut framed = FramedStream::new(mock);

        match framed.read_response().await {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected EOF, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_read_keeps_partial_line() {
        let mock = Builder::new()
            .read(b"* 4 EXI")
            .wait(Duration::from_secs(10))
            .read(b"STS\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let first = tokio::time::timeout(Duration::from_secs(1), framed.read_response()).await;
        assert!(first.is_err());

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 4 EXISTS\r\n");
    }

    #[tokio::test]
    async fn test_framed_write_line() {
        let mock = Builder::new().write(b"TAG1 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed.write_line(b"TAG1 NOOP").await.unwrap();
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let literal_size = MAX_LITERAL_SIZE + 1;
        let header = format!("* 1 FETCH (BODY {{{literal_size}}}\r\n");

        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("literal too large")
        );
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }
}
