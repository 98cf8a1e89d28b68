use std::sync::Arc;

use accteng_core::config::EngineConfig;
use accteng_core::traits::{AccountStore, BlobStore, EventStore, OAuthStore, RepoStore};
use tokio::sync::Mutex;

use crate::firehose::relay::RelayNotifier;
use crate::firehose::sequencer::Sequencer;

/// Shared state for the single account this engine hosts.
///
/// Unlike a multi-tenant PDS, there is exactly one `AccountStore`/`RepoStore`
/// row set to serve, so the stores are reached for through trait objects
/// rather than threaded through as generic parameters — there is no second
/// implementation to monomorphize against at runtime.
#[derive(Clone)]
pub struct EngineState {
    pub account_store: Arc<dyn AccountStore>,
    pub repo_store: Arc<dyn RepoStore>,
    pub blob_store: Arc<dyn BlobStore>,
    pub oauth_store: Arc<dyn OAuthStore>,
    pub config: Arc<EngineConfig>,
    /// Firehose event sequencer (None if firehose is disabled).
    pub sequencer: Option<Sequencer>,
    /// Relay notifier (None if no relay is configured).
    pub relay_notifier: Option<RelayNotifier>,
    /// Event store for firehose persistence (None if not configured).
    pub event_store: Option<Arc<dyn EventStore>>,
    /// Serializes repo-mutating XRPC calls so commits always chain off the
    /// revision they observed. The repo engine itself is not internally
    /// synchronized — this is the engine's single-writer gate.
    pub write_lock: Arc<Mutex<()>>,
}

impl EngineState {
    pub fn new(
        account_store: Arc<dyn AccountStore>,
        repo_store: Arc<dyn RepoStore>,
        blob_store: Arc<dyn BlobStore>,
        oauth_store: Arc<dyn OAuthStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            account_store,
            repo_store,
            blob_store,
            oauth_store,
            config,
            sequencer: None,
            relay_notifier: None,
            event_store: None,
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}
