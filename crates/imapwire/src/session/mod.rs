//! IMAP session: connection lifecycle, authentication and the command
//! surface.
//!
//! A [`Session`] owns one connection. Every call takes `&mut self`, so at
//! most one command is in flight. The session moves through
//!
//! - `Connected`: greeting received
//! - `Authenticated`: after LOGIN or AUTHENTICATE
//! - `Selected`: after SELECT or EXAMINE
//! - `Idling`: between IDLE and DONE
//!
//! Folder commands live in `folder.rs`, message commands in `message.rs`.

#![allow(clippy::missing_errors_doc)]

mod folder;
mod header;
mod message;
mod types;

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

pub use header::parse_header;
pub use message::Overview;
pub use types::{
    FetchRecord, FolderEntry, FolderStatus, Quota, QuotaInfo, QuotaResource, SelectResult,
};

use crate::command::{Arg, escape_string, quote};
use crate::config::{Config, Credentials, Security, SequenceMode, SessionOptions};
use crate::dispatch::{Completion, Dispatcher, is_continuation};
use crate::parser::Token;
use crate::response::{Lines, Response};
use crate::transport::{self, ImapStream, StreamMeta, Transport};
use crate::uid_cache::UidCache;
use crate::{Error, Result, sasl};

/// Protocol state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream.
    Disconnected,
    /// Greeting received, not authenticated.
    Connected,
    /// Logged in, no folder selected.
    Authenticated,
    /// A folder is selected.
    Selected(String),
    /// IDLE is running.
    Idling,
}

/// One IMAP connection.
pub struct Session<S> {
    dispatcher: Option<Dispatcher<S>>,
    state: ConnectionState,
    selected: Option<String>,
    idle_tag: Option<String>,
    uid_cache: UidCache,
    options: SessionOptions,
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("uid_cache", &self.uid_cache)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Session<ImapStream> {
    /// Opens the connection described by `config`, reads the greeting and
    /// negotiates STARTTLS when requested.
    pub async fn connect(config: &Config) -> Result<Self> {
        let stream = transport::open(config).await?;
        let mut session = Self::from_stream(stream, config.session_options()).await?;
        if config.security == Security::StartTls {
            session.start_tls(&config.host, config.validate_cert).await?;
        }
        Ok(session)
    }

    /// Upgrades a plaintext connection with STARTTLS.
    pub async fn start_tls(&mut self, host: &str, validate_cert: bool) -> Result<()> {
        let failed = || Error::ConnectionFailed("failed to enable TLS".to_string());

        let response = self
            .dispatcher()?
            .request_and_response("STARTTLS", &[])
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "STARTTLS rejected");
                failed()
            })?;
        if response.failed() {
            return Err(failed());
        }

        let (transport, tags) = self.dispatcher.take().ok_or_else(failed)?.into_parts();
        let stream = transport.into_inner().upgrade_to_tls(host, validate_cert).await;
        let stream = stream.map_err(|e| {
            tracing::warn!(error = %e, "TLS handshake after STARTTLS failed");
            failed()
        })?;

        let transport = Transport::new(stream, self.options.stream_timeout, self.options.debug);
        self.dispatcher = Some(Dispatcher::from_parts(transport, tags));
        tracing::debug!(host, "STARTTLS negotiated");
        Ok(())
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the server greeting, which must
    /// start with `* OK`.
    pub async fn from_stream(stream: S, options: SessionOptions) -> Result<Self> {
        let transport = Transport::new(stream, options.stream_timeout, options.debug);
        let mut dispatcher = Dispatcher::new(transport);

        let mut greeting: Response<bool> = Response::new("*");
        let line = dispatcher.next_line(&mut greeting).await?;
        if !line.starts_with(b"* OK") {
            let text = String::from_utf8_lossy(&line);
            return Err(Error::ConnectionFailed(format!(
                "connection refused: {}",
                text.trim_end()
            )));
        }
        tracing::debug!("Received server greeting");

        Ok(Self {
            dispatcher: Some(dispatcher),
            state: ConnectionState::Connected,
            selected: None,
            idle_tag: None,
            uid_cache: UidCache::new(options.uid_cache),
            options,
        })
    }

    fn dispatcher(&mut self) -> Result<&mut Dispatcher<S>> {
        self.dispatcher.as_mut().ok_or(Error::ConnectionClosed)
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Returns true while a stream is held and the peer has not closed it.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.dispatcher.as_ref().is_some_and(|d| !d.meta().eof)
    }

    /// Stream metadata; all zero once disconnected.
    #[must_use]
    pub fn meta(&self) -> StreamMeta {
        self.dispatcher
            .as_ref()
            .map(Dispatcher::meta)
            .unwrap_or_default()
    }

    /// Bounds every subsequent read; `None` waits forever.
    pub fn set_stream_timeout(&mut self, timeout: Option<Duration>) {
        self.options.stream_timeout = timeout;
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            dispatcher.transport_mut().set_stream_timeout(timeout);
        }
    }

    /// The UID cache.
    #[must_use]
    pub const fn uid_cache(&self) -> &UidCache {
        &self.uid_cache
    }

    /// Sequence mode configured for this session.
    #[must_use]
    pub const fn sequence(&self) -> SequenceMode {
        self.options.sequence
    }

    /// Logs in with `LOGIN "user" "pass"`.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<Response<Lines>> {
        let args = [escape_string(username), escape_string(password)];
        let response = self
            .dispatcher()?
            .request_and_response("LOGIN", &args)
            .await
            .map_err(auth_error)?;
        if response.failed() {
            return Err(Error::AuthFailed("LOGIN rejected".to_string()));
        }

        tracing::info!(username, "Logged in");
        self.state = ConnectionState::Authenticated;
        Ok(response)
    }

    /// Authenticates with `AUTHENTICATE XOAUTH2`.
    pub async fn authenticate(&mut self, username: &str, token: &str) -> Result<Response<Lines>> {
        let initial = sasl::xoauth2_response(username, token);
        let response = self
            .dispatcher()?
            .authenticate("XOAUTH2", &initial)
            .await
            .map_err(auth_error)?;
        if response.failed() {
            let reason = response.errors().join("; ");
            return Err(Error::AuthFailed(reason));
        }

        tracing::info!(username, "Authenticated with XOAUTH2");
        self.state = ConnectionState::Authenticated;
        Ok(response)
    }

    /// Logs in with whichever mechanism the credentials call for.
    pub async fn authenticate_with(&mut self, credentials: &Credentials) -> Result<Response<Lines>> {
        match credentials {
            Credentials::Password { username, password } => self.login(username, password).await,
            Credentials::OAuth2 {
                username,
                access_token,
            } => self.authenticate(username, access_token).await,
        }
    }

    /// Requests the capability list.
    pub async fn capabilities(&mut self) -> Result<Response<Vec<String>>> {
        let response = self
            .dispatcher()?
            .request_and_response("CAPABILITY", &[])
            .await?;
        let capabilities = response
            .data()
            .map(|lines| {
                untagged(lines, "CAPABILITY")
                    .flat_map(|line| line.iter().skip(2))
                    .map(|token| token.text().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(response.with_result(capabilities))
    }

    /// Returns true if the server lists `capability`.
    pub async fn has_capability(&mut self, capability: &str) -> Result<bool> {
        let response = self.capabilities().await?;
        Ok(response
            .data()
            .is_some_and(|caps| caps.iter().any(|c| c.eq_ignore_ascii_case(capability))))
    }

    /// Sends NOOP.
    pub async fn noop(&mut self) -> Result<Response<Lines>> {
        self.dispatcher()?.request_and_response("NOOP", &[]).await
    }

    /// Sends LOGOUT and drops the connection.
    ///
    /// Never fails: when the stream is gone or timed out the command is
    /// skipped, and failures are recorded on the returned response. Local
    /// state is reset either way.
    pub async fn logout(&mut self) -> Response<Lines> {
        let usable = self
            .dispatcher
            .as_ref()
            .is_some_and(|d| !d.meta().timed_out && !d.meta().eof);

        let response = match self.dispatcher.as_mut() {
            Some(dispatcher) if usable => {
                match dispatcher.request_and_response("LOGOUT", &[]).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::debug!(error = %e, "Ignoring LOGOUT failure");
                        let mut response = Response::<Lines>::new("").with_result(Lines::new());
                        response.add_error(e.to_string());
                        response
                    }
                }
            }
            _ => {
                tracing::debug!("Skipping LOGOUT on unusable stream");
                Response::<Lines>::new("")
                    .with_result(Lines::new())
                    .set_can_be_empty(true)
            }
        };

        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.transport_mut().close().await;
        }
        self.reset();
        tracing::info!("Logged out");
        response
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.selected = None;
        self.idle_tag = None;
        self.uid_cache.clear();
    }

    /// Sends `ID NIL`, or `ID ("a" "b" ...)` when parameters are given, and
    /// returns the server's field/value pairs.
    pub async fn id(&mut self, ids: Option<&[&str]>) -> Result<Response<BTreeMap<String, String>>> {
        let token = match ids {
            Some(ids) if !ids.is_empty() => {
                let quoted: Vec<String> = ids.iter().map(|id| quote(id)).collect();
                format!("({})", quoted.join(" "))
            }
            _ => "NIL".to_string(),
        };

        let response = self
            .dispatcher()?
            .request_and_response("ID", &[Arg::Plain(token)])
            .await?;
        let fields = response
            .data()
            .map(|lines| {
                untagged(lines, "ID")
                    .filter_map(|line| line.get(2).and_then(Token::as_list))
                    .flat_map(|items| items.chunks_exact(2))
                    .map(|pair| (pair[0].text().into_owned(), pair[1].text().into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(response.with_result(fields).set_can_be_empty(true))
    }

    /// Sends `GETQUOTA "#user/<name>"`.
    pub async fn get_quota(&mut self, username: &str) -> Result<Response<QuotaInfo>> {
        let root = Arg::Plain(format!("\"#user/{username}\""));
        self.quota_request("GETQUOTA", root).await
    }

    /// Sends `GETQUOTAROOT <root>`.
    pub async fn get_quota_root(&mut self, root: &str) -> Result<Response<QuotaInfo>> {
        self.quota_request("GETQUOTAROOT", Arg::from(root)).await
    }

    async fn quota_request(&mut self, command: &str, arg: Arg) -> Result<Response<QuotaInfo>> {
        let response = self
            .dispatcher()?
            .request_and_response(command, &[arg])
            .await?;
        let info = response
            .data()
            .map(|lines| QuotaInfo::from_lines(lines))
            .unwrap_or_default();
        Ok(response.with_result(info).set_can_be_empty(true))
    }

    /// Enters IDLE. Untagged `* OK` lines before the continuation are
    /// skipped.
    pub async fn idle(&mut self) -> Result<Response<bool>> {
        let dispatcher = self.dispatcher()?;
        let mut response: Response<bool> = dispatcher.send_request("IDLE", &[], None).await?;
        loop {
            let line = dispatcher.next_line(&mut response).await?;
            if line.starts_with(b"* OK") {
                continue;
            }
            if is_continuation(&line) {
                break;
            }
            return Err(Error::Runtime("idle failed".to_string()));
        }

        self.idle_tag = Some(response.sequence().to_string());
        self.state = ConnectionState::Idling;
        tracing::debug!("Entered IDLE");
        Ok(response.with_result(true))
    }

    /// Leaves IDLE: sends `DONE` and waits for the IDLE command's tagged
    /// `OK`, skipping untagged lines.
    pub async fn done(&mut self) -> Result<Response<bool>> {
        if self.state != ConnectionState::Idling {
            return Err(Error::Runtime("done without idle".to_string()));
        }
        let tag = self
            .idle_tag
            .take()
            .ok_or_else(|| Error::Runtime("done without idle".to_string()))?;
        self.state = self
            .selected
            .clone()
            .map_or(ConnectionState::Authenticated, ConnectionState::Selected);

        let dispatcher = self.dispatcher()?;
        let mut response: Response<bool> = Response::new(tag.as_str());
        dispatcher.write(&mut response, b"DONE").await?;
        let tokens = dispatcher.read_tagged_line(&mut response, &tag).await?;
        if Completion::of(&tokens) != Completion::Ok {
            return Err(Error::Runtime("done failed".to_string()));
        }

        tracing::debug!("Left IDLE");
        Ok(response.with_result(true))
    }

    /// Reads one raw line, without its line ending.
    pub async fn next_raw_line(&mut self) -> Result<String> {
        let line = self.dispatcher()?.transport_mut().read_line().await?;
        let text = String::from_utf8_lossy(&line);
        Ok(text.trim_end_matches(['\r', '\n']).to_string())
    }
}

fn auth_error(error: Error) -> Error {
    match error {
        Error::ServerError { message, .. } => Error::AuthFailed(message),
        other => other,
    }
}

/// Untagged lines whose first word after `*` is `kind`.
fn untagged<'a>(lines: &'a [Vec<Token>], kind: &'a str) -> impl Iterator<Item = &'a Vec<Token>> {
    lines.iter().filter(move |line| {
        line.first().is_some_and(|t| t.is("*")) && line.get(1).is_some_and(|t| t.is(kind))
    })
}

/// Numeric leaf that fits a message number or UID.
fn as_u32(token: &Token) -> Option<u32> {
    token.number().and_then(|n| u32::try_from(n).ok())
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

    pub(super) async fn session(mock: Mock) -> Session<Mock> {
        let options = SessionOptions {
            stream_timeout: None,
            ..SessionOptions::default()
        };
        Session::from_stream(mock, options).await.unwrap()
    }

    #[tokio::test]
    async fn test_greeting_rejected() {
        let mock = Builder::new().read(b"* BAD go away\r\n").build();
        let err = Session::from_stream(mock, SessionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_login_failure_is_auth_failed() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 LOGIN \"user\" \"wrong\"\r\n")
            .read(b"TAG1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let mut session = session(mock).await;

        let err = session.login("user", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::AuthFailed(_)));
        assert_eq!(session.state(), &ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_xoauth2_authenticate() {
        let initial = sasl::xoauth2_response("user@example.com", "token");
        let command = format!("TAG1 AUTHENTICATE XOAUTH2 {initial}\r\n");
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(command.as_bytes())
            .read(b"TAG1 OK AUTHENTICATE completed\r\n")
            .build();
        let mut session = session(mock).await;

        let response = session
            .authenticate_with(&Credentials::oauth2("user@example.com", "token"))
            .await
            .unwrap();
        assert!(response.successful());
        assert_eq!(session.state(), &ConnectionState::Authenticated);
    }

    #[tokio::test]
    async fn test_capabilities() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1 IDLE QUOTA ID\r\n")
            .read(b"TAG1 OK CAPABILITY completed\r\n")
            .write(b"TAG2 CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1\r\n")
            .read(b"TAG2 OK CAPABILITY completed\r\n")
            .build();
        let mut session = session(mock).await;

        let caps = session.capabilities().await.unwrap().into_validated().unwrap();
        assert_eq!(caps, vec!["IMAP4rev1", "IDLE", "QUOTA", "ID"]);
        assert!(!session.has_capability("idle").await.unwrap());
    }

    #[tokio::test]
    async fn test_id_nil_and_fields() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 ID NIL\r\n")
            .read(b"* ID NIL\r\n")
            .read(b"TAG1 OK ID completed\r\n")
            .write(b"TAG2 ID (\"name\" \"imapwire\")\r\n")
            .read(b"* ID (\"name\" \"Dovecot\" \"version\" \"2.3\")\r\n")
            .read(b"TAG2 OK ID completed\r\n")
            .build();
        let mut session = session(mock).await;

        let response = session.id(None).await.unwrap();
        assert!(response.successful());
        assert!(response.data().unwrap().is_empty());

        let fields = session
            .id(Some(&["name", "imapwire"]))
            .await
            .unwrap()
            .into_validated()
            .unwrap();
        assert_eq!(fields.get("name").map(String::as_str), Some("Dovecot"));
        assert_eq!(fields.get("version").map(String::as_str), Some("2.3"));
    }

    #[tokio::test]
    async fn test_id_values_are_escaped() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 ID (\"name\" \"say \\\"hi\\\"\")\r\n")
            .read(b"* ID NIL\r\n")
            .read(b"TAG1 OK ID completed\r\n")
            .build();
        let mut session = session(mock).await;

        let response = session.id(Some(&["name", "say \"hi\""])).await.unwrap();
        assert!(response.successful());
        assert_eq!(response.commands(), [r#"TAG1 ID ("name" "say \"hi\"")"#]);
    }

    #[tokio::test]
    async fn test_get_quota_root() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 GETQUOTAROOT INBOX\r\n")
            .read(b"* QUOTAROOT INBOX \"#user/alice\"\r\n")
            .read(b"* QUOTA \"#user/alice\" (STORAGE 10 512)\r\n")
            .read(b"TAG1 OK Getquotaroot completed\r\n")
            .write(b"TAG2 GETQUOTA \"#user/alice\"\r\n")
            .read(b"* QUOTA \"#user/alice\" (STORAGE 11 512)\r\n")
            .read(b"TAG2 OK Getquota completed\r\n")
            .build();
        let mut session = session(mock).await;

        let info = session.get_quota_root("INBOX").await.unwrap();
        let info = info.into_validated().unwrap();
        assert_eq!(info.roots, vec!["#user/alice"]);
        assert_eq!(info.quotas[0].resources[0].limit, 512);

        let info = session.get_quota("alice").await.unwrap().into_validated().unwrap();
        assert_eq!(info.quotas[0].root, "#user/alice");
        assert_eq!(info.quotas[0].resources[0].usage, 11);
    }

    #[tokio::test]
    async fn test_idle_skips_ok_noise_then_done() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 IDLE\r\n")
            .read(b"* OK Still here\r\n")
            .read(b"+ idling\r\n")
            .write(b"DONE\r\n")
            .read(b"* 3 EXISTS\r\n")
            .read(b"TAG1 OK IDLE terminated\r\n")
            .build();
        let mut session = session(mock).await;

        session.idle().await.unwrap();
        assert_eq!(session.state(), &ConnectionState::Idling);

        let response = session.done().await.unwrap();
        assert!(response.successful());
        assert_eq!(session.state(), &ConnectionState::Authenticated);
    }

    #[tokio::test]
    async fn test_idle_refused() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 IDLE\r\n")
            .read(b"TAG1 BAD command unknown\r\n")
            .build();
        let mut session = session(mock).await;

        let err = session.idle().await.unwrap_err();
        assert!(matches!(err, Error::Runtime(msg) if msg == "idle failed"));
    }

    #[tokio::test]
    async fn test_done_without_idle() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut session = session(mock).await;

        let err = session.done().await.unwrap_err();
        assert!(matches!(err, Error::Runtime(msg) if msg == "done without idle"));
    }

    #[tokio::test]
    async fn test_done_failed() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 IDLE\r\n")
            .read(b"+ idling\r\n")
            .write(b"DONE\r\n")
            .read(b"TAG1 BAD no idle in progress\r\n")
            .build();
        let mut session = session(mock).await;

        session.idle().await.unwrap();
        let err = session.done().await.unwrap_err();
        assert!(matches!(err, Error::Runtime(msg) if msg == "done failed"));
    }

    #[tokio::test]
    async fn test_logout_resets_state() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 LOGOUT\r\n")
            .read(b"* BYE logging out\r\n")
            .read(b"TAG1 OK LOGOUT completed\r\n")
            .build();
        let mut session = session(mock).await;

        let response = session.logout().await;
        assert!(response.successful());
        assert_eq!(session.state(), &ConnectionState::Disconnected);
        assert!(!session.is_connected());

        // nothing left to write to
        let again = session.logout().await;
        assert!(again.successful());
        assert!(again.commands().is_empty());
        assert!(matches!(session.noop().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_logout_swallows_failure() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 LOGOUT\r\n")
            .build();
        let mut session = session(mock).await;

        let response = session.logout().await;
        assert!(response.failed());
        assert_eq!(session.state(), &ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_skipped_after_timeout() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .wait(Duration::from_secs(120))
            .build();
        let mut session = session(mock).await;
        session.set_stream_timeout(Some(Duration::from_secs(10)));

        let err = session.next_raw_line().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionTimedOut(_)));
        assert!(session.meta().timed_out);

        let response = session.logout().await;
        assert!(response.commands().is_empty());
        assert_eq!(session.state(), &ConnectionState::Disconnected);
    }
}
