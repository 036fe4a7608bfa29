//! Integration tests for the IMAP protocol engine.
//!
//! Server conversations are scripted with `tokio_test` mock streams; the
//! connection scenarios use a loopback listener.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::io::{Builder, Mock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imapwire::transport::Transport;
use imapwire::{
    Config, Connect, Credentials, Dispatcher, Error, IdleController, RangeEnd, Security,
    SequenceMode, ServerStatus, Session, SessionOptions, build_set,
};

/// Logs to the test output; `RUST_LOG` picks the level.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imapwire=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn options() -> SessionOptions {
    SessionOptions {
        stream_timeout: None,
        ..SessionOptions::default()
    }
}

async fn session(mock: Mock) -> Session<Mock> {
    Session::from_stream(mock, options()).await.unwrap()
}

/// Serves one connection that sends `greeting` and then waits for the
/// client to go away.
async fn serve_greeting(greeting: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(greeting).await.unwrap();
        let mut buf = [0u8; 256];
        let _ = socket.read(&mut buf).await;
    });
    port
}

fn plain_config(port: u16) -> Config {
    Config::builder("127.0.0.1")
        .port(port)
        .security(Security::None)
        .connect_timeout(Duration::from_secs(5))
        .build()
}

// ============================================================================
// Connection and commands
// ============================================================================

#[tokio::test]
async fn test_connect_reads_greeting() {
    let port = serve_greeting(b"* OK IMAP4rev1 Service Ready\r\n").await;
    let session = Session::connect(&plain_config(port)).await.unwrap();
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_connect_rejects_bad_greeting() {
    let port = serve_greeting(b"BAD\r\n").await;
    let err = Session::connect(&plain_config(port)).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed(_)));
}

#[tokio::test]
async fn test_starttls_refused_is_connection_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"* OK IMAP4rev1 Service Ready\r\n").await.unwrap();
        let mut buf = [0u8; 256];
        let n = socket.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"TAG1 STARTTLS\r\n");
        socket.write_all(b"TAG1 NO TLS not available\r\n").await.unwrap();
        let _ = socket.read(&mut buf).await;
    });

    let config = Config::builder("127.0.0.1")
        .port(port)
        .security(Security::StartTls)
        .connect_timeout(Duration::from_secs(5))
        .build();
    let err = Session::connect(&config).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed(msg) if msg == "failed to enable TLS"));
}

#[tokio::test]
async fn test_login_writes_quoted_credentials() {
    let mock = Builder::new()
        .read(b"* OK IMAP4rev1 Service Ready\r\n")
        .write(b"TAG1 LOGIN \"user\" \"pass\"\r\n")
        .read(b"TAG1 OK LOGIN done\r\n")
        .build();
    let mut session = session(mock).await;

    let response = session.login("user", "pass").await.unwrap();
    assert!(response.successful());
    assert_eq!(response.commands(), ["TAG1 LOGIN \"user\" \"pass\""]);
}

#[tokio::test]
async fn test_folders_lists_inbox() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"TAG1 LIST \"\" \"*\"\r\n")
        .read(b"* LIST (\\HasNoChildren) \".\" \"INBOX\"\r\n")
        .read(b"TAG1 OK LIST completed\r\n")
        .build();
    let mut session = session(mock).await;

    let folders = session.folders("", "*").await.unwrap().into_validated().unwrap();
    let inbox = &folders["INBOX"];
    assert_eq!(inbox.delimiter.as_deref(), Some("."));
    assert_eq!(inbox.flags, vec!["\\HasNoChildren"]);
}

#[tokio::test]
async fn test_folder_status_reads_all_counters() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"TAG1 STATUS \"INBOX\" (MESSAGES UNSEEN RECENT UIDNEXT UIDVALIDITY)\r\n")
        .read(b"* STATUS \"INBOX\" (MESSAGES 42 UNSEEN 3 RECENT 2 UIDNEXT 66 UIDVALIDITY 1)\r\n")
        .read(b"TAG1 OK STATUS completed\r\n")
        .build();
    let mut session = session(mock).await;

    let status = session
        .folder_status("INBOX", None)
        .await
        .unwrap()
        .into_validated()
        .unwrap();
    assert_eq!(status.messages(), Some(42));
    assert_eq!(status.unseen(), Some(3));
    assert_eq!(status.recent(), Some(2));
    assert_eq!(status.uidnext(), Some(66));
    assert_eq!(status.uidvalidity(), Some(1));
}

#[tokio::test]
async fn test_fetch_body_literal() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"TAG1 UID FETCH 1 (BODY[])\r\n")
        .read(b"* 1 FETCH (UID 1 BODY[] {12}\r\nHello world!\r\n)\r\n")
        .read(b"TAG1 OK FETCH completed\r\n")
        .build();
    let mut session = session(mock).await;

    let result = session
        .fetch(&["BODY[]"], [1], SequenceMode::Uid)
        .await
        .unwrap()
        .into_validated()
        .unwrap();
    let body = result[&1].get("BODY[]").unwrap().as_bytes().unwrap();
    assert_eq!(body, b"Hello world!");
}

// ============================================================================
// Dispatcher properties
// ============================================================================

fn dispatcher(mock: Mock) -> Dispatcher<Mock> {
    Dispatcher::new(Transport::new(mock, None, false))
}

#[tokio::test]
async fn test_response_ends_only_on_exact_tag() {
    let mock = Builder::new()
        .write(b"TAG1 NOOP\r\n")
        .read(b"* 4 EXISTS\r\n")
        .read(b"TAG10 OK stale reply\r\n")
        .read(b"* OK still here\r\n")
        .read(b"TAG1 OK NOOP completed\r\n")
        .build();
    let mut dispatcher = dispatcher(mock);

    let response = dispatcher.request_and_response("NOOP", &[]).await.unwrap();
    assert_eq!(response.data().unwrap().len(), 4);
    assert_eq!(response.lines().last().unwrap(), "TAG1 OK NOOP completed");
}

#[tokio::test]
async fn test_terminal_status_classification() {
    for (reply, expected) in [
        (&b"TAG1 NO denied\r\n"[..], Some(ServerStatus::No)),
        (&b"TAG1 BAD syntax\r\n"[..], Some(ServerStatus::Bad)),
        (&b"TAG1 BYE shutting down\r\n"[..], Some(ServerStatus::Bye)),
        (&b"TAG1 MAYBE what\r\n"[..], None),
    ] {
        let mock = Builder::new().write(b"TAG1 NOOP\r\n").read(reply).build();
        let err = dispatcher(mock)
            .request_and_response("NOOP", &[])
            .await
            .unwrap_err();
        match (err, expected) {
            (Error::ServerError { status, .. }, Some(expected)) => assert_eq!(status, expected),
            (Error::BadRequest(_), None) => {}
            (other, _) => panic!("unexpected classification: {other:?}"),
        }
    }

    let mock = Builder::new()
        .write(b"TAG1 NOOP\r\n")
        .read(b"TAG1 OK done\r\n")
        .build();
    let response = dispatcher(mock)
        .request_and_response("NOOP", &[])
        .await
        .unwrap();
    assert!(response.successful());
}

#[test]
fn test_build_set() {
    assert_eq!(build_set(5, None).to_string(), "5");
    assert_eq!(build_set(5, Some(RangeEnd::Number(10))).to_string(), "5:10");
    assert_eq!(build_set(5, Some(RangeEnd::Unbounded)).to_string(), "5:*");
}

// ============================================================================
// UID cache
// ============================================================================

#[tokio::test]
async fn test_select_invalidates_uid_cache() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"TAG1 SELECT \"INBOX\"\r\n")
        .read(b"* 2 EXISTS\r\n")
        .read(b"TAG1 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"TAG2 UID FETCH 1:* (UID)\r\n")
        .read(b"* 1 FETCH (UID 101)\r\n")
        .read(b"* 2 FETCH (UID 102)\r\n")
        .read(b"TAG2 OK FETCH completed\r\n")
        .write(b"TAG3 SELECT \"INBOX\"\r\n")
        .read(b"* 3 EXISTS\r\n")
        .read(b"TAG3 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"TAG4 UID FETCH 1:* (UID)\r\n")
        .read(b"* 1 FETCH (UID 101)\r\n")
        .read(b"* 2 FETCH (UID 102)\r\n")
        .read(b"* 3 FETCH (UID 103)\r\n")
        .read(b"TAG4 OK FETCH completed\r\n")
        .build();
    let mut session = session(mock).await;

    session.select_folder("INBOX").await.unwrap();
    assert_eq!(session.get_uid(2).await.unwrap(), 102);
    // Served from the cache, nothing written.
    assert_eq!(session.get_uid(1).await.unwrap(), 101);

    session.select_folder("INBOX").await.unwrap();
    assert!(session.uid_cache().is_empty());
    assert_eq!(session.get_uid(3).await.unwrap(), 103);
}

// ============================================================================
// IDLE controller
// ============================================================================

/// Hands out one scripted stream per connection attempt.
struct MockConnector {
    streams: Mutex<VecDeque<Mock>>,
}

impl MockConnector {
    fn new(streams: Vec<Mock>) -> Self {
        Self {
            streams: Mutex::new(streams.into()),
        }
    }
}

impl Connect for MockConnector {
    type Stream = Mock;

    async fn connect(&self) -> imapwire::Result<Session<Mock>> {
        let stream = self.streams.lock().unwrap().pop_front();
        let stream =
            stream.ok_or_else(|| Error::ConnectionFailed("no more scripted streams".into()))?;
        Session::from_stream(stream, options()).await
    }
}

/// Greeting through IDLE on INBOX.
fn idle_setup() -> Builder {
    let mut builder = Builder::new();
    builder
        .read(b"* OK IMAP4rev1 Service Ready\r\n")
        .write(b"TAG1 LOGIN \"user\" \"pass\"\r\n")
        .read(b"TAG1 OK LOGIN done\r\n")
        .write(b"TAG2 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1 IDLE\r\n")
        .read(b"TAG2 OK CAPABILITY completed\r\n")
        .write(b"TAG3 SELECT \"INBOX\"\r\n")
        .read(b"* 3 EXISTS\r\n")
        .read(b"TAG3 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"TAG4 IDLE\r\n")
        .read(b"+ idling\r\n");
    builder
}

fn controller(streams: Vec<Mock>) -> IdleController<MockConnector> {
    init_tracing();
    IdleController::new(
        MockConnector::new(streams),
        Credentials::password("user", "pass"),
        "INBOX",
    )
    .keepalive(Duration::from_secs(300))
}

fn stop() -> Error {
    Error::Callback("stop".into())
}

#[tokio::test]
async fn test_idle_invokes_callback_once_per_exists() {
    let mock = idle_setup()
        .read(b"* OK Still here\r\n")
        .read(b"* 4 EXISTS\r\n")
        .build();
    let controller = controller(vec![mock]);

    let mut seen = Vec::new();
    let err = controller
        .run(async |msgno, mode| {
            assert_eq!(mode, SequenceMode::MessageNumber);
            seen.push(msgno);
            Err(stop())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Callback(_)));
    assert_eq!(seen, vec![4]);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_refreshes_without_callback() {
    let mock = idle_setup()
        .wait(Duration::from_secs(400))
        .write(b"DONE\r\n")
        .read(b"TAG4 OK IDLE terminated\r\n")
        .write(b"TAG5 IDLE\r\n")
        .read(b"+ idling\r\n")
        .read(b"* 5 EXISTS\r\n")
        .build();
    let controller = controller(vec![mock]);

    let mut seen = Vec::new();
    let err = controller
        .run(async |msgno, _| {
            seen.push(msgno);
            Err(stop())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Callback(_)));
    assert_eq!(seen, vec![5]);
}

#[tokio::test]
async fn test_idle_reconnects_after_close() {
    let closed = idle_setup().build();
    let fresh = idle_setup().read(b"* 7 EXISTS\r\n").build();
    let controller = controller(vec![closed, fresh]);

    let mut seen = Vec::new();
    let err = controller
        .run(async |msgno, _| {
            seen.push(msgno);
            Err(stop())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Callback(_)));
    assert_eq!(seen, vec![7]);
}

#[tokio::test(start_paused = true)]
async fn test_idle_reconnects_when_done_fails() {
    let refused = idle_setup()
        .wait(Duration::from_secs(400))
        .write(b"DONE\r\n")
        .read(b"TAG4 BAD Command not recognized\r\n")
        .build();
    let fresh = idle_setup().read(b"* 9 EXISTS\r\n").build();
    let controller = controller(vec![refused, fresh]);

    let mut seen = Vec::new();
    let err = controller
        .run(async |msgno, mode| {
            seen.push((msgno, mode));
            Err(stop())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Callback(_)));
    assert_eq!(seen, vec![(9, SequenceMode::MessageNumber)]);
}

#[tokio::test(start_paused = true)]
async fn test_idle_refreshes_at_deadline_despite_noise() {
    let mock = idle_setup()
        .wait(Duration::from_secs(150))
        .read(b"* OK Still here\r\n")
        .wait(Duration::from_secs(150))
        .read(b"* OK Still here\r\n")
        .write(b"DONE\r\n")
        .read(b"TAG4 OK IDLE terminated\r\n")
        .write(b"TAG5 IDLE\r\n")
        .read(b"+ idling\r\n")
        .read(b"* 4 EXISTS\r\n")
        .build();
    let controller = controller(vec![mock]);

    let mut seen = Vec::new();
    let err = controller
        .run(async |msgno, _| {
            seen.push(msgno);
            Err(stop())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Callback(_)));
    assert_eq!(seen, vec![4]);
}

#[tokio::test(start_paused = true)]
async fn test_idle_reconnect_backs_off_on_transient_failures() {
    let closed = idle_setup().build();
    // Each of these hangs up before the greeting.
    let first_retry = Builder::new().build();
    let second_retry = Builder::new().build();
    let fresh = idle_setup().read(b"* 6 EXISTS\r\n").build();
    let controller = controller(vec![closed, first_retry, second_retry, fresh]);

    let started = tokio::time::Instant::now();
    let mut seen = Vec::new();
    let err = controller
        .run(async |msgno, _| {
            seen.push(msgno);
            Err(stop())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Callback(_)));
    assert_eq!(seen, vec![6]);
    // 2s after the first failed attempt, 4s after the second.
    assert!(started.elapsed() >= Duration::from_secs(6));
}

#[tokio::test]
async fn test_idle_requires_capability() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"TAG1 LOGIN \"user\" \"pass\"\r\n")
        .read(b"TAG1 OK LOGIN done\r\n")
        .write(b"TAG2 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1\r\n")
        .read(b"TAG2 OK CAPABILITY completed\r\n")
        .build();
    let controller = controller(vec![mock]);

    let err = controller.run(async |_, _| Ok(())).await.unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));
}
