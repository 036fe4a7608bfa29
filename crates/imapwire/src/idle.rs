//! IDLE keepalive controller (RFC 2177).
//!
//! [`IdleController::run`] keeps one dedicated connection in IDLE on a
//! folder and calls back for every `EXISTS` notification. IDLE is
//! re-issued every keepalive interval so servers do not drop the
//! connection as inactive. A closed connection, or a DONE/IDLE cycle that
//! fails, is replaced by a new one.
//!
//! # Example
//!
//! ```ignore
//! let controller = IdleController::new(
//!     TcpConnector::new(config),
//!     Credentials::password("user", "pass"),
//!     "INBOX",
//! );
//! controller
//!     .run(async |msgno, _mode| {
//!         println!("message {msgno} arrived");
//!         Ok(())
//!     })
//!     .await?;
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::config::{Credentials, SequenceMode};
use crate::connect::Connect;
use crate::parser::leading_number;
use crate::session::Session;
use crate::{Error, Result};

/// Default interval between DONE/IDLE refreshes.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(300);

/// Reconnect backoff grows by this step per failed attempt.
const RECONNECT_STEP: Duration = Duration::from_secs(2);

/// Upper bound on the reconnect backoff.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Keeps a folder in IDLE on its own connection.
#[derive(Debug)]
pub struct IdleController<C> {
    connector: C,
    credentials: Credentials,
    folder: String,
    keepalive: Duration,
    sequence: Option<SequenceMode>,
}

impl<C: Connect> IdleController<C> {
    /// Creates a controller idling on `folder`.
    pub fn new(connector: C, credentials: Credentials, folder: impl Into<String>) -> Self {
        Self {
            connector,
            credentials,
            folder: folder.into(),
            keepalive: DEFAULT_KEEPALIVE,
            sequence: None,
        }
    }

    /// Sets the refresh interval, which is also the read timeout of the
    /// idle connection.
    #[must_use]
    pub const fn keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Sets the sequence mode handed to the callback. Without it the
    /// session's configured mode is used.
    #[must_use]
    pub const fn sequence(mut self, sequence: SequenceMode) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Returns the folder being watched.
    #[must_use]
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Idles until an unrecoverable error occurs.
    ///
    /// `callback` receives the message number of every `EXISTS` line and the
    /// configured sequence mode. Returning an error from it (typically
    /// [`Error::Callback`]) ends the loop with that error. Timeouts and
    /// closed connections are recovered from; every other error is
    /// returned. Dropping the future stops idling.
    ///
    /// # Errors
    ///
    /// `NotSupported` when the server lacks IDLE, connection or
    /// authentication failures while opening a session, and callback
    /// errors.
    pub async fn run<F>(&self, mut callback: F) -> Result<()>
    where
        F: AsyncFnMut(u32, SequenceMode) -> Result<()>,
    {
        let mut session = self.open_idle_session().await?;
        let sequence = self.sequence.unwrap_or_else(|| session.sequence());
        let mut deadline = Instant::now() + self.keepalive;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = if remaining.is_zero() {
                Err(Error::ConnectionTimedOut(self.keepalive))
            } else {
                session.set_stream_timeout(Some(remaining));
                session.next_raw_line().await
            };

            match line {
                Ok(line) => {
                    if !line.contains("EXISTS") {
                        tracing::trace!(%line, "Ignoring idle line");
                        continue;
                    }
                    let Some(msgno) = exists_number(&line) else {
                        tracing::debug!(%line, "EXISTS without message number");
                        continue;
                    };
                    tracing::debug!(msgno, folder = %self.folder, "New message");
                    callback(msgno, sequence).await?;
                    deadline = Instant::now() + self.keepalive;
                }
                Err(Error::ConnectionTimedOut(_)) => {
                    session.set_stream_timeout(Some(self.keepalive));
                    if let Err(e) = refresh(&mut session).await {
                        tracing::warn!(error = %e, "IDLE refresh failed, reconnecting");
                        session = self.reconnect().await?;
                    }
                    deadline = Instant::now() + self.keepalive;
                }
                Err(Error::ConnectionClosed) => {
                    tracing::warn!(folder = %self.folder, "IDLE connection closed, reconnecting");
                    session = self.reconnect().await?;
                    deadline = Instant::now() + self.keepalive;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Connects, authenticates, selects the folder and enters IDLE.
    async fn open_idle_session(&self) -> Result<Session<C::Stream>> {
        let mut session = self.connector.connect().await?;
        session.set_stream_timeout(Some(self.keepalive));

        session.authenticate_with(&self.credentials).await?;
        if !session.has_capability("IDLE").await? {
            return Err(Error::NotSupported("IDLE".to_string()));
        }
        session.select_folder(&self.folder).await?.validated_data()?;
        session.idle().await?;

        tracing::info!(folder = %self.folder, "Idling");
        Ok(session)
    }

    /// Opens a replacement session, retrying with a linear backoff while
    /// the failure is transient.
    async fn reconnect(&self) -> Result<Session<C::Stream>> {
        for attempt in 1u32.. {
            tracing::info!(attempt, folder = %self.folder, "Attempting to reconnect");
            match self.open_idle_session().await {
                Err(e) if e.is_transient() => {
                    tracing::warn!(?e, attempt, "Reconnect attempt failed");
                    let delay = RECONNECT_STEP.saturating_mul(attempt).min(MAX_RECONNECT_DELAY);
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
        Err(Error::ConnectionFailed("reconnect attempts exhausted".to_string()))
    }
}

/// Leaves and re-enters IDLE on the same connection.
async fn refresh<S>(session: &mut Session<S>) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    session.done().await?;
    session.idle().await?;
    tracing::debug!("IDLE refreshed");
    Ok(())
}

/// Message number of an `* n EXISTS` line.
fn exists_number(line: &str) -> Option<u32> {
    let rest = line.trim_start_matches('*').trim_start();
    leading_number(rest).and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_exists_number() {
        assert_eq!(exists_number("* 23 EXISTS"), Some(23));
        assert_eq!(exists_number("*  7 EXISTS"), Some(7));
        assert_eq!(exists_number("* EXISTS"), None);
    }
}
