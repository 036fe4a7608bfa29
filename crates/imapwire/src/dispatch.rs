//! Tagged request/response correlation.
//!
//! The dispatcher owns the transport and the tag counter. It writes a command
//! (pausing for the server's continuation before each literal), then reads
//! lines until the one carrying the request's tag.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::command::{Arg, TagGenerator};
use crate::error::ServerStatus;
use crate::parser::{Token, decode_line, flatten, split_tag};
use crate::response::{Lines, Response};
use crate::transport::{StreamMeta, Transport};
use crate::{Error, Result};

/// Writes commands and collects their responses.
pub struct Dispatcher<S> {
    transport: Transport<S>,
    tags: TagGenerator,
}

impl<S> std::fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Terminal status of a tagged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// `OK`.
    Ok,
    /// `NO`, `BAD` or `BYE`.
    Failed(ServerStatus),
    /// Anything else.
    Unknown,
}

impl Completion {
    /// Classifies a decoded tagged line by its second token.
    #[must_use]
    pub fn of(tokens: &[Token]) -> Self {
        match tokens.get(1).and_then(Token::as_str) {
            Some(word) if word.eq_ignore_ascii_case("OK") => Self::Ok,
            Some(word) => ServerStatus::from_word(word).map_or(Self::Unknown, Self::Failed),
            None => Self::Unknown,
        }
    }
}

impl<S> Dispatcher<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a transport with a fresh tag counter.
    pub fn new(transport: Transport<S>) -> Self {
        Self::from_parts(transport, TagGenerator::default())
    }

    /// Wraps a transport, continuing an existing tag sequence.
    pub const fn from_parts(transport: Transport<S>, tags: TagGenerator) -> Self {
        Self { transport, tags }
    }

    /// Splits into the transport and the tag counter.
    pub fn into_parts(self) -> (Transport<S>, TagGenerator) {
        (self.transport, self.tags)
    }

    /// Borrows the transport.
    pub const fn transport(&self) -> &Transport<S> {
        &self.transport
    }

    /// Mutably borrows the transport.
    pub const fn transport_mut(&mut self) -> &mut Transport<S> {
        &mut self.transport
    }

    /// Returns the stream metadata.
    pub const fn meta(&self) -> StreamMeta {
        self.transport.meta()
    }

    /// Allocates the next tag.
    pub fn next_tag(&mut self) -> String {
        self.tags.next()
    }

    /// Writes one raw line and records it on `response`.
    pub async fn write<T>(&mut self, response: &mut Response<T>, line: &[u8]) -> Result<()> {
        self.transport.write_line(line).await?;
        response.add_command(String::from_utf8_lossy(line));
        Ok(())
    }

    /// Reads one raw response unit and records it on `response`.
    pub async fn next_line<T>(&mut self, response: &mut Response<T>) -> Result<Vec<u8>> {
        let line = self.transport.read_line().await?;
        response.add_line(&line);
        Ok(line)
    }

    /// Writes `tag command args...`, allocating a tag when none is given.
    ///
    /// A literal argument ends the current line with its declaration; the
    /// payload starts the next line once the server answers with `+`.
    ///
    /// # Errors
    ///
    /// `BadRequest("failed to send literal string")` when the server refuses
    /// a literal, otherwise transport errors.
    pub async fn send_request<T>(
        &mut self,
        command: &str,
        args: &[Arg],
        tag: Option<String>,
    ) -> Result<Response<T>> {
        let tag = tag.unwrap_or_else(|| self.next_tag());
        let mut response = Response::new(tag.as_str());
        let mut line = format!("{tag} {command}").into_bytes();

        for arg in args {
            match arg {
                Arg::Plain(value) => {
                    line.push(b' ');
                    line.extend_from_slice(value.as_bytes());
                }
                Arg::Literal {
                    declaration,
                    payload,
                } => {
                    line.push(b' ');
                    line.extend_from_slice(declaration.as_bytes());
                    self.write(&mut response, &line).await?;

                    let reply = self.next_line(&mut response).await?;
                    if !is_continuation(&reply) {
                        return Err(Error::BadRequest(
                            "failed to send literal string".to_string(),
                        ));
                    }
                    line.clone_from(payload);
                }
            }
        }

        self.write(&mut response, &line).await?;
        Ok(response)
    }

    /// Reads lines until the one tagged with `response.sequence()`.
    ///
    /// # Errors
    ///
    /// `ServerError` for a tagged `NO`/`BAD`/`BYE`, `BadRequest` for any
    /// other tagged status, otherwise transport errors.
    pub async fn read_response<T>(&mut self, response: &mut Response<T>) -> Result<Lines> {
        let tag = response.sequence().to_string();
        let mut lines = Lines::new();
        loop {
            let raw = self.next_line(response).await?;
            let tokens = decode_line(&raw);
            let (leading, _) = split_tag(&raw);
            let terminal = leading == tag;
            lines.push(tokens);
            if terminal {
                break;
            }
        }

        let Some(last) = lines.last() else {
            return Err(Error::Runtime("empty response".to_string()));
        };
        match Completion::of(last) {
            Completion::Ok => Ok(lines),
            Completion::Failed(status) => Err(Error::ServerError {
                status,
                message: flatten(&last[1..]),
            }),
            Completion::Unknown => Err(Error::BadRequest(format!(
                "unexpected response: {}",
                flatten(last)
            ))),
        }
    }

    /// Reads lines until the one tagged `tag`, skipping untagged ones, and
    /// returns it decoded.
    pub async fn read_tagged_line<T>(
        &mut self,
        response: &mut Response<T>,
        tag: &str,
    ) -> Result<Vec<Token>> {
        loop {
            let raw = self.next_line(response).await?;
            let (leading, _) = split_tag(&raw);
            if leading == tag {
                return Ok(decode_line(&raw));
            }
        }
    }

    /// Sends a command and reads its response; the decoded lines become the
    /// result.
    ///
    /// # Errors
    ///
    /// See [`send_request`](Self::send_request) and
    /// [`read_response`](Self::read_response).
    pub async fn request_and_response(
        &mut self,
        command: &str,
        args: &[Arg],
    ) -> Result<Response<Lines>> {
        let mut response: Response<Lines> = self.send_request(command, args, None).await?;
        let lines = self.read_response(&mut response).await?;
        response.set_result(lines);
        Ok(response)
    }

    /// Runs an AUTHENTICATE exchange. Server challenges are answered with an
    /// empty line; a tagged `NO`/`BAD` is recorded as an error rather than
    /// raised.
    ///
    /// # Errors
    ///
    /// Transport errors and unexpected tagged statuses.
    pub async fn authenticate(&mut self, mechanism: &str, initial: &str) -> Result<Response<Lines>> {
        let mut response: Response<Lines> = self
            .send_request(
                "AUTHENTICATE",
                &[Arg::from(mechanism), Arg::from(initial)],
                None,
            )
            .await?;
        let tag = response.sequence().to_string();
        let mut lines = Lines::new();

        loop {
            let raw = self.next_line(&mut response).await?;
            if is_continuation(&raw) {
                let mut answer: Response<bool> = Response::new(tag.as_str());
                self.write(&mut answer, b"").await?;
                response.stack(&answer.with_result(true));
                continue;
            }

            let tokens = decode_line(&raw);
            let (leading, _) = split_tag(&raw);
            if leading != tag {
                lines.push(tokens);
                continue;
            }

            let completion = Completion::of(&tokens);
            let message = flatten(&tokens[1..]);
            lines.push(tokens);
            match completion {
                Completion::Ok => {}
                Completion::Failed(ServerStatus::Bye) | Completion::Unknown => {
                    return Err(Error::BadRequest(format!("unexpected response: {message}")));
                }
                Completion::Failed(_) => response.add_error(message),
            }
            response.set_result(lines);
            return Ok(response);
        }
    }
}

/// Returns true for a `+` continuation line.
pub fn is_continuation(line: &[u8]) -> bool {
    match line {
        [b'+', rest @ ..] => rest.is_empty() || matches!(rest[0], b' ' | b'\r' | b'\n'),
        _ => false,
    }
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
    use tokio_test::io::{Builder, Mock};

    use super::*;
    use crate::command::escape_string;

    fn dispatcher(mock: Mock) -> Dispatcher<Mock> {
        Dispatcher::new(Transport::new(mock, None, false))
    }

    #[tokio::test]
    async fn test_untagged_lines_do_not_terminate() {
        let mock = Builder::new()
            .write(b"TAG1 NOOP\r\n")
            .read(b"* 4 EXISTS\r\n")
            .read(b"* TAG1 OK looks tagged but is not\r\n")
            .read(b"TAG1 OK NOOP completed\r\n")
            .build();
        let mut dispatcher = dispatcher(mock);

        let response = dispatcher.request_and_response("NOOP", &[]).await.unwrap();
        let lines = response.data().unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[2][0].is("TAG1"));
        assert!(response.successful());
    }

    #[tokio::test]
    async fn test_prefix_tag_does_not_terminate() {
        let mock = Builder::new()
            .write(b"TAG1 NOOP\r\n")
            .read(b"TAG10 OK other\r\n")
            .read(b"TAG1 OK mine\r\n")
            .build();
        let mut dispatcher = dispatcher(mock);

        let response = dispatcher.request_and_response("NOOP", &[]).await.unwrap();
        assert_eq!(response.lines().len(), 2);
    }

    #[tokio::test]
    async fn test_status_classification() {
        for (status, expected) in [
            ("NO", Some(ServerStatus::No)),
            ("BAD", Some(ServerStatus::Bad)),
            ("BYE", Some(ServerStatus::Bye)),
        ] {
            let reply = format!("TAG1 {status} nope\r\n");
            let mock = Builder::new()
                .write(b"TAG1 NOOP\r\n")
                .read(reply.as_bytes())
                .build();
            let mut dispatcher = dispatcher(mock);

            match dispatcher.request_and_response("NOOP", &[]).await {
                Err(Error::ServerError { status, message }) => {
                    assert_eq!(Some(status), expected);
                    assert_eq!(message, format!("{status} nope"));
                }
                other => panic!("expected server error, got {other:?}"),
            }
        }

        let mock = Builder::new()
            .write(b"TAG1 NOOP\r\n")
            .read(b"TAG1 MAYBE\r\n")
            .build();
        let mut dispatcher = dispatcher(mock);
        let err = dispatcher.request_and_response("NOOP", &[]).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_literal_handshake() {
        let mock = Builder::new()
            .write(b"TAG1 APPEND \"INBOX\" {6}\r\n")
            .read(b"+ Ready for literal data\r\n")
            .write(b"a\r\nb\r\n\r\n")
            .read(b"TAG1 OK APPEND completed\r\n")
            .build();
        let mut dispatcher = dispatcher(mock);

        let args = [escape_string("INBOX"), escape_string("a\r\nb\r\n")];
        let response = dispatcher.request_and_response("APPEND", &args).await.unwrap();
        assert_eq!(response.commands().len(), 2);
        assert!(response.successful());
    }

    #[tokio::test]
    async fn test_literal_refused() {
        let mock = Builder::new()
            .write(b"TAG1 APPEND \"INBOX\" {2}\r\n")
            .read(b"TAG1 NO too big\r\n")
            .build();
        let mut dispatcher = dispatcher(mock);

        let args = [escape_string("INBOX"), escape_string("\r\n")];
        let err = dispatcher
            .request_and_response("APPEND", &args)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(msg) if msg == "failed to send literal string"));
    }

    #[tokio::test]
    async fn test_explicit_tag() {
        let mock = Builder::new().write(b"custom NOOP\r\n").build();
        let mut dispatcher = dispatcher(mock);

        let response: Response<Lines> = dispatcher
            .send_request("NOOP", &[], Some("custom".to_string()))
            .await
            .unwrap();
        assert_eq!(response.sequence(), "custom");
        assert_eq!(dispatcher.next_tag(), "TAG1");
    }

    #[tokio::test]
    async fn test_authenticate_answers_challenge() {
        let mock = Builder::new()
            .write(b"TAG1 AUTHENTICATE XOAUTH2 abc\r\n")
            .read(b"+ eyJzdGF0dXMiOiI0MDAifQ==\r\n")
            .write(b"\r\n")
            .read(b"TAG1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let mut dispatcher = dispatcher(mock);

        let response = dispatcher.authenticate("XOAUTH2", "abc").await.unwrap();
        assert!(response.failed());
        assert_eq!(response.sub_responses().len(), 1);
        assert_eq!(
            response.errors(),
            ["NO [AUTHENTICATIONFAILED] Invalid credentials"]
        );
    }

    #[tokio::test]
    async fn test_read_tagged_line_skips_untagged() {
        let mock = Builder::new()
            .read(b"* 2 EXISTS\r\n")
            .read(b"TAG4 OK IDLE terminated\r\n")
            .build();
        let mut dispatcher = dispatcher(mock);
        let mut response: Response<bool> = Response::new("TAG4");

        let tokens = dispatcher.read_tagged_line(&mut response, "TAG4").await.unwrap();
        assert_eq!(Completion::of(&tokens), Completion::Ok);
        assert_eq!(response.lines().len(), 2);
    }

    #[test]
    fn test_is_continuation() {
        assert!(is_continuation(b"+ idling\r\n"));
        assert!(is_continuation(b"+\r\n"));
        assert!(!is_continuation(b"+OK\r\n"));
        assert!(!is_continuation(b"* OK\r\n"));
    }
}
