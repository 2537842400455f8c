// Background token refresh
// Renews the access token shortly before it expires for as long as the host keeps the handle

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::epoch_secs;
use super::manager::Session;
use super::types::TokenState;
use crate::config::Config;
use crate::error::Result;

/// Refresh policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonSettings {
    /// Renew once this many seconds or fewer remain
    pub threshold: i64,
    /// Upper bound for one renewal attempt
    pub timeout: Duration,
    /// Pause after a failed attempt
    pub retry_delay: Duration,
}

impl From<&Config> for DaemonSettings {
    fn from(config: &Config) -> Self {
        Self {
            threshold: config.token_refresh_threshold as i64,
            timeout: Duration::from_secs(config.token_refresh_timeout),
            retry_delay: Duration::from_secs(config.token_retry_delay),
        }
    }
}

/// Handle to the background refresh task
///
/// The latest token is published on a watch channel. Dropping the handle stops the task.
pub struct RefreshDaemon {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    tokens: watch::Receiver<TokenState>,
}

impl RefreshDaemon {
    pub fn spawn(session: Arc<Session>) -> Result<Self> {
        let settings = DaemonSettings::from(session.manager().config());
        Self::spawn_with(session, settings)
    }

    pub fn spawn_with(session: Arc<Session>, settings: DaemonSettings) -> Result<Self> {
        let (tx, tokens) = watch::channel(session.token_state()?);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(session, settings, tx, cancel.clone()));

        Ok(Self {
            cancel,
            handle: Some(handle),
            tokens,
        })
    }

    /// Most recently published token
    pub fn current(&self) -> TokenState {
        self.tokens.borrow().clone()
    }

    /// Receiver notified on every renewal
    pub fn subscribe(&self) -> watch::Receiver<TokenState> {
        self.tokens.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Token refresh task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for RefreshDaemon {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    session: Arc<Session>,
    settings: DaemonSettings,
    tx: watch::Sender<TokenState>,
    cancel: CancellationToken,
) {
    let account = session.account().to_string();
    tracing::debug!(account = %account, "Token refresh daemon started");

    loop {
        let remaining = tx.borrow().remaining(epoch_secs());

        let wait = if remaining <= settings.threshold {
            tracing::debug!(account = %account, remaining, "Token close to expiry, refreshing");

            let attempt = tokio::time::timeout(settings.timeout, session.refresh());
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = attempt => outcome,
            };

            match outcome.map(|r| r.and_then(|_| session.token_state())) {
                Ok(Ok(state)) => {
                    let fresh = state.remaining(epoch_secs()) > settings.threshold;
                    tx.send_replace(state);
                    tracing::info!(account = %account, "Background token refresh succeeded");
                    if fresh {
                        Duration::ZERO
                    } else {
                        settings.retry_delay
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(account = %account, "Background token refresh failed: {}", e);
                    settings.retry_delay
                }
                Err(_) => {
                    tracing::warn!(
                        account = %account,
                        "Background token refresh timed out after {}s",
                        settings.timeout.as_secs()
                    );
                    settings.retry_delay
                }
            }
        } else {
            Duration::from_secs((remaining - settings.threshold) as u64)
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    tracing::debug!(account = %account, "Token refresh daemon stopped");
}
