use std::sync::Arc;
use std::time::Duration;

use accteng_core::OAuthStore;

/// Periodically sweeps expired auth codes, revoked tokens, and expired PAR /
/// nonce / webauthn-challenge rows (§4.5 "Cleanup alarm"). Mirrors the
/// donor's relay-notifier worker shape: a small struct owning the shared
/// handles, with a `run` method meant to be spawned as a background task.
pub struct CleanupWorker {
    store: Arc<dyn OAuthStore>,
    interval: Duration,
}

impl CleanupWorker {
    pub fn new(store: Arc<dyn OAuthStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run the sweep loop forever. Should be spawned as a tokio task at
    /// engine startup and aborted on hibernation.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.store.cleanup_expired().await {
                Ok(removed) if removed > 0 => {
                    tracing::debug!(removed, "oauth cleanup alarm swept expired rows");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("oauth cleanup alarm failed: {e}");
                }
            }
        }
    }
}
