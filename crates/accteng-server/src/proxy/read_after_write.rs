
use serde_json::Value;


/// Augment an AppView response with locally-written records that may not have
/// been indexed yet (read-after-write consistency).
///
/// This is called after a pipethrough response is received. If the request was
/// for a feed or thread, we check if the authenticated user has local records
/// that should appear in the response but are missing (because the AppView
/// hasn't indexed them yet).
///
/// For now this is a no-op placeholder — a full implementation would:
/// 1. Parse the AppView response for feed/thread responses.
/// 2. Check local repo for recent writes by the authenticated user.
/// 3. Merge local records into the response if missing.
pub fn augment_response(
    _did: &str,
    _method: &str,
    response: Value,
) -> Value {
    // Placeholder: return the response unmodified.
    // A full implementation would check recent local writes and merge them.
    response
}
