use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthenticatedUser;
use crate::error::XrpcError;
use crate::state::EngineState;
use accteng_core::EngineError;

// ---------------------------------------------------------------------------
// resolveHandle
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ResolveHandleQuery {
    pub handle: String,
}

pub async fn resolve_handle(
    State(state): State<EngineState>,
    Query(params): Query<ResolveHandleQuery>,
) -> Result<Json<Value>, XrpcError> {
    let account = state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.handle == params.handle);

    if let Some(acct) = account {
        return Ok(Json(json!({ "did": acct.did })));
    }

    match accteng_identity::resolve_handle(&params.handle).await {
        Ok(Some(did)) => Ok(Json(json!({ "did": did }))),
        _ => Err(XrpcError::new(
            StatusCode::NOT_FOUND,
            "HandleNotFound",
            format!("handle not found: {}", params.handle),
        )),
    }
}

// ---------------------------------------------------------------------------
// updateHandle
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UpdateHandleRequest {
    pub handle: String,
}

/// Rebind the hosted account's handle. The engine has no multi-tenant handle
/// registry to check for collisions against, so the only validation left is
/// that the caller is authenticated as the one account this engine hosts;
/// DNS/HTTPS handle verification is the operator's responsibility, same as
/// it is for the initial `handle` value in `EngineConfig`.
pub async fn update_handle(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateHandleRequest>,
) -> Result<StatusCode, XrpcError> {
    state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == user.did)
        .ok_or(EngineError::RepoNotFound)?;

    state.account_store.update_handle(&body.handle).await?;

    if let Some(ref sequencer) = state.sequencer {
        use crate::firehose::events::{FirehoseEvent, IdentityEvent};
        let seq = sequencer.next_seq();
        let event = FirehoseEvent::Identity(IdentityEvent {
            seq,
            did: user.did.clone(),
            time: chrono::Utc::now().to_rfc3339(),
            handle: Some(body.handle.clone()),
        });
        crate::firehose::emit::emit_and_persist(&state, event).await;
    }

    Ok(StatusCode::OK)
}
