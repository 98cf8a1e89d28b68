use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::error::XrpcError;
use crate::state::EngineState;

/// GET /.well-known/atproto-did
///
/// This engine hosts exactly one account, so the response never depends on
/// the Host header — it always names the one DID it serves.
pub async fn atproto_did(State(state): State<EngineState>) -> Result<impl IntoResponse, XrpcError> {
    let account = state.account_store.get_account().await?.ok_or_else(|| {
        XrpcError::new(
            StatusCode::NOT_FOUND,
            "AccountNotFound",
            "No account has been provisioned on this server yet",
        )
    })?;

    Ok((StatusCode::OK, [("content-type", "text/plain")], account.did))
}
