//! Session factories.
//!
//! The idle controller needs to open connections of its own, so it takes a
//! [`Connect`] implementation instead of a [`Config`]. Tests plug in mock
//! streams the same way.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::Result;
use crate::config::Config;
use crate::session::Session;
use crate::transport::ImapStream;

/// Opens new sessions that have read the server greeting.
pub trait Connect {
    /// Stream type of the sessions produced.
    type Stream: AsyncRead + AsyncWrite + Unpin;

    /// Opens one session.
    ///
    /// # Errors
    ///
    /// Any connection, TLS or greeting failure.
    fn connect(&self) -> impl Future<Output = Result<Session<Self::Stream>>>;
}

/// Connects over TCP, TLS or a proxy as described by a [`Config`].
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: Config,
}

impl TcpConnector {
    /// Creates a connector for `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Returns the configuration used for every connection.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}

impl Connect for TcpConnector {
    type Stream = ImapStream;

    async fn connect(&self) -> Result<Session<ImapStream>> {
        tracing::debug!(host = %self.config.host, port = self.config.port, "Opening session");
        Session::connect(&self.config).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::Error;
    use crate::config::Security;

    #[tokio::test]
    async fn test_tcp_connector_reports_refused_connection() {
        let config = Config::builder("127.0.0.1")
            .port(1)
            .security(Security::None)
            .connect_timeout(Duration::from_secs(2))
            .build();
        let connector = TcpConnector::new(config);
        assert_eq!(connector.config().port, 1);

        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)));
    }
}
