//! # imapwire
//!
//! An async IMAP client protocol engine for RFC 3501 (`IMAP4rev1`) with the
//! QUOTA (RFC 2087), ID (RFC 2971), IDLE (RFC 2177) and MOVE (RFC 6851)
//! extensions.
//!
//! ## Features
//!
//! - **Transport**: plain TCP, implicit TLS, STARTTLS and HTTP CONNECT
//!   proxies, with read timeouts that surface as typed errors
//! - **Tolerant decoder**: one pass over a response line turns atoms,
//!   quoted strings, nested lists and `{n}` literals into a [`Token`] tree
//! - **Tagged dispatch**: every command reads until its own tagged reply;
//!   literal arguments run the `+` continuation handshake
//! - **Response accumulator**: [`Response`] carries the tag, raw lines,
//!   recorded errors and the typed result of each command
//! - **UID cache**: message number ↔ UID map filled lazily per folder
//! - **IDLE controller**: keeps a folder in IDLE on its own connection,
//!   refreshing it periodically and reconnecting after failures
//!
//! ## Quick Start
//!
//! ```ignore
//! use imapwire::{Config, SequenceMode, Session};
//!
//! #[tokio::main]
//! async fn main() -> imapwire::Result<()> {
//!     let config = Config::new("imap.example.com");
//!     let mut session = Session::connect(&config).await?;
//!     session.login("user@example.com", "password").await?.validated_data()?;
//!
//!     let selected = session.select_folder("INBOX").await?.into_validated()?;
//!     println!("Messages: {:?}", selected.exists);
//!
//!     let unseen = session
//!         .search(&["UNSEEN"], SequenceMode::Uid)
//!         .await?
//!         .into_validated()?;
//!     let bodies = session
//!         .content(unseen, "BODY", SequenceMode::Uid)
//!         .await?
//!         .into_validated()?;
//!     for (uid, body) in &bodies {
//!         println!("{uid}: {} bytes", body.len());
//!     }
//!
//!     session.logout().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Disconnected ── connect() ──→ Connected ── login() ──→ Authenticated
//!                                                             │
//!                                          select()/examine() ▼
//!                                   Idling ←── idle() ──── Selected
//!                                          ─── done() ──→
//! ```
//!
//! ## Modules
//!
//! - [`transport`]: streams, TLS, proxy tunnel and framing
//! - [`parser`]: response line decoder
//! - [`command`]: argument encoding, sequence sets and tags
//! - [`dispatch`]: tagged request/response correlation
//! - [`session`]: the command surface
//! - [`idle`]: IDLE keepalive controller

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod config;
pub mod connect;
pub mod dispatch;
mod error;
pub mod idle;
pub mod parser;
pub mod response;
pub mod sasl;
pub mod session;
pub mod transport;
pub mod uid_cache;

pub use command::{Arg, RangeEnd, SequenceSet, StoreMode, TagGenerator, build_set};
pub use config::{
    Config, ConfigBuilder, Credentials, ProxyConfig, Security, SequenceMode, SessionOptions,
};
pub use connect::{Connect, TcpConnector};
pub use dispatch::Dispatcher;
pub use error::{Error, Result, ServerStatus};
pub use idle::{DEFAULT_KEEPALIVE, IdleController};
pub use parser::{Token, decode_line};
pub use response::{Lines, Response, ResultData};
pub use session::{
    ConnectionState, FetchRecord, FolderEntry, FolderStatus, Overview, Quota, QuotaInfo,
    QuotaResource, SelectResult, Session, parse_header,
};
pub use transport::{ImapStream, StreamMeta};
pub use uid_cache::UidCache;
