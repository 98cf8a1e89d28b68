use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::broadcast;

use super::events::FirehoseEvent;

/// The sequencer assigns monotonically increasing sequence numbers to firehose
/// events and broadcasts them to connected subscribers.
///
/// Sequence numbers are atomic and in-memory. For persistence across restarts,
/// the caller should persist the last-used seq and pass it when constructing.
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<SequencerInner>,
}

struct SequencerInner {
    next_seq: AtomicI64,
    /// Broadcast channel for live event streaming.
    /// Subscribers receive cloned events.
    sender: broadcast::Sender<Arc<FirehoseEvent>>,
}

impl Sequencer {
    /// Create a new sequencer.
    ///
    /// `start_seq` is the first sequence number to assign (typically last_persisted + 1).
    /// `channel_capacity` controls the broadcast buffer size (events before slow subscribers lag).
    pub fn new(start_seq: i64, channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Sequencer {
            inner: Arc::new(SequencerInner {
                next_seq: AtomicI64::new(start_seq),
                sender,
            }),
        }
    }

    /// Allocate the next sequence number.
    pub fn next_seq(&self) -> i64 {
        self.inner.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Emit (broadcast) a firehose event to all connected subscribers.
    pub fn emit(&self, event: FirehoseEvent) {
        // Ignore send errors â€” they just mean no subscribers are connected.
        let _ = self.inner.sender.send(Arc::new(event));
    }

    /// Subscribe to the live event stream.
    ///
    /// Returns a receiver that yields events as they are emitted.
    /// If the subscriber falls behind by more than `channel_capacity` events,
    /// it will receive a `Lagged` error.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<FirehoseEvent>> {
        self.inner.sender.subscribe()
    }

    /// Returns the current (next-to-be-assigned) sequence number.
    /// Useful for knowing the "head" of the stream.
    pub fn current_seq(&self) -> i64 {
        self.inner.next_seq.load(Ordering::Relaxed)
    }
}
