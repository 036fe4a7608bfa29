//! Error types for the IMAP protocol engine.

use std::time::Duration;

use thiserror::Error;

/// Terminal status word of a failed tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// `NO`: the command was understood but failed.
    No,
    /// `BAD`: the command was rejected as malformed.
    Bad,
    /// `BYE`: the server is closing the connection.
    Bye,
}

impl ServerStatus {
    /// Maps a status word to a failure status, if it is one.
    #[must_use]
    pub fn from_word(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("NO") {
            Some(Self::No)
        } else if word.eq_ignore_ascii_case("BAD") {
            Some(Self::Bad)
        } else if word.eq_ignore_ascii_case("BYE") {
            Some(Self::Bye)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::Bye => "BYE",
        })
    }
}

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Socket, proxy or TLS setup failed, the greeting was not `* OK`, or
    /// STARTTLS could not be negotiated.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A blocking read exceeded the stream timeout.
    #[error("Connection timed out after {0:?}")]
    ConnectionTimedOut(Duration),

    /// The peer closed the connection.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// LOGIN or AUTHENTICATE did not validate.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The server terminated a command with `NO`, `BAD` or `BYE`.
    #[error("Server returned {status}: {message}")]
    ServerError {
        /// Terminal status word.
        status: ServerStatus,
        /// Flattened tokens of the terminal line.
        message: String,
    },

    /// Unexpected terminal status or a failed literal handshake.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A UID or message number lookup failed.
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Protocol invariant violation.
    #[error("Protocol error: {0}")]
    Runtime(String),

    /// A response was validated and found to be failed.
    #[error("Command failed: {0}")]
    ResponseFailed(String),

    /// The server lacks a capability required by the operation.
    #[error("Capability not supported: {0}")]
    NotSupported(String),

    /// Error raised by a user callback (ends an IDLE loop).
    #[error("Callback error: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Returns true if the idle controller can recover from this error by
    /// cycling IDLE or reconnecting.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionTimedOut(_) | Self::ConnectionClosed)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_words() {
        assert_eq!(ServerStatus::from_word("NO"), Some(ServerStatus::No));
        assert_eq!(ServerStatus::from_word("bad"), Some(ServerStatus::Bad));
        assert_eq!(ServerStatus::from_word("BYE"), Some(ServerStatus::Bye));
        assert_eq!(ServerStatus::from_word("OK"), None);
    }

    #[test]
    fn test_server_error_display() {
        let err = Error::ServerError {
            status: ServerStatus::No,
            message: "NO [NONEXISTENT] Unknown Mailbox".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Server returned NO: NO [NONEXISTENT] Unknown Mailbox"
        );
    }

    #[test]
    fn test_transient() {
        assert!(Error::ConnectionClosed.is_transient());
        assert!(Error::ConnectionTimedOut(Duration::from_secs(1)).is_transient());
        assert!(!Error::Runtime("done failed".into()).is_transient());
    }
}
