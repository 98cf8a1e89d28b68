use serde::Serialize;

use super::events::{ErrorFrame, FirehoseEvent, InfoFrame};

/// Frame header sent before each message body on the wire.
/// The AT Protocol firehose uses a two-part framing:
///   1. A small DAG-CBOR header: { "op": 1, "t": "#commit" } for messages,
///      or { "op": -1 } for errors.
///   2. A DAG-CBOR body (the event payload).
///
/// Both are concatenated into a single WebSocket binary frame.
#[derive(Debug, Serialize)]
struct FrameHeader {
    /// 1 = message frame, -1 = error frame
    op: i32,
    /// Event type tag (e.g. "#commit", "#identity", "#account", "#info")
    #[serde(skip_serializing_if = "Option::is_none")]
    t: Option<String>,
}

/// Encode a firehose event into a binary WebSocket frame (header + body, both DAG-CBOR).
pub fn encode_event_frame(event: &FirehoseEvent) -> Result<Vec<u8>, String> {
    let (tag, body_bytes) = match event {
        FirehoseEvent::Commit(e) => (
            "#commit",
            dagcbor_encode(e)?,
        ),
        FirehoseEvent::Identity(e) => (
            "#identity",
            dagcbor_encode(e)?,
        ),
        FirehoseEvent::Account(e) => (
            "#account",
            dagcbor_encode(e)?,
        ),
    };

    let header = FrameHeader {
        op: 1,
        t: Some(tag.to_string()),
    };
    let header_bytes = dagcbor_encode(&header)?;

    let mut frame = Vec::with_capacity(header_bytes.len() + body_bytes.len());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(&body_bytes);
    Ok(frame)
}

/// Encode an info frame for the firehose.
pub fn encode_info_frame(info: &InfoFrame) -> Result<Vec<u8>, String> {
    let header = FrameHeader {
        op: 1,
        t: Some("#info".to_string()),
    };
    let header_bytes = dagcbor_encode(&header)?;
    let body_bytes = dagcbor_encode(info)?;

    let mut frame = Vec::with_capacity(header_bytes.len() + body_bytes.len());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(&body_bytes);
    Ok(frame)
}

/// Encode an error frame for the firehose.
pub fn encode_error_frame(error: &ErrorFrame) -> Result<Vec<u8>, String> {
    let header = FrameHeader {
        op: -1,
        t: None,
    };
    let header_bytes = dagcbor_encode(&header)?;
    let body_bytes = dagcbor_encode(error)?;

    let mut frame = Vec::with_capacity(header_bytes.len() + body_bytes.len());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(&body_bytes);
    Ok(frame)
}

/// Helper: encode a value as DAG-CBOR bytes.
fn dagcbor_encode<T: Serialize>(value: &T) -> Result<Vec<u8>, String> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| format!("DAG-CBOR encode error: {e}"))
}
