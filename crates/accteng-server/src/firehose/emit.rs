use crate::state::EngineState;

use super::events::FirehoseEvent;
use super::wire;

/// Persist a firehose event to the event store (if configured), then broadcast
/// it via the sequencer. The event must already have its `seq` assigned.
pub async fn emit_and_persist(state: &EngineState, event: FirehoseEvent) {
    let event_type = match &event {
        FirehoseEvent::Commit(_) => "commit",
        FirehoseEvent::Identity(_) => "identity",
        FirehoseEvent::Account(_) => "account",
    };

    // Persist the wire-encoded event payload under the same seq that is about
    // to be broadcast live, so a replaying subscriber's cursor lines up with
    // what a live subscriber already received.
    if let Some(ref event_store) = state.event_store {
        match wire::encode_event_frame(&event) {
            Ok(payload) => {
                if let Err(e) = event_store.append_event(event.seq(), event_type, &payload).await {
                    tracing::warn!("Failed to persist firehose event: {e}");
                }
            }
            Err(e) => {
                tracing::warn!("Failed to encode firehose event for persistence: {e}");
            }
        }
    }

    // Broadcast to live subscribers.
    if let Some(ref sequencer) = state.sequencer {
        sequencer.emit(event);
    }
}
