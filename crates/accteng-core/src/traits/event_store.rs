use async_trait::async_trait;

use crate::error::EngineResult;

/// A persisted firehose event row.
#[derive(Debug, Clone)]
pub struct PersistedEvent {
    pub seq: i64,
    pub event_type: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Persist a firehose event under the sequence number the caller already
    /// assigned (the same number embedded in `payload` and handed to live
    /// subscribers), so the replay log and the live broadcast never disagree
    /// on numbering.
    async fn append_event(&self, seq: i64, event_type: &str, payload: &[u8]) -> EngineResult<()>;

    /// Get events with seq > after_seq, up to `limit`.
    async fn get_events_after(&self, after_seq: i64, limit: usize)
        -> EngineResult<Vec<PersistedEvent>>;

    /// Get the maximum sequence number in the store (0 if empty).
    async fn get_max_seq(&self) -> EngineResult<i64>;

    /// Delete all but the most recent `keep_last` rows.
    async fn prune(&self, keep_last: i64) -> EngineResult<u64>;
}
