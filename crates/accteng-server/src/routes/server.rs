use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{AuthenticatedUser, JwtRefreshSecret};
use crate::error::XrpcError;
use crate::state::EngineState;
use accteng_core::types::RefreshTokenRecord;
use accteng_core::EngineError;

// ---------------------------------------------------------------------------
// describeServer
// ---------------------------------------------------------------------------

pub async fn describe_server(State(state): State<EngineState>) -> Result<Json<Value>, XrpcError> {
    Ok(Json(json!({
        "did": state.config.did,
        // This engine hosts exactly one account, provisioned at lazy-init
        // time, so the server never accepts new registrations.
        "availableUserDomains": Vec::<String>::new(),
        "inviteCodeRequired": false,
    })))
}

// ---------------------------------------------------------------------------
// createSession
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub identifier: String,
    pub password: String,
}

pub async fn create_session(
    State(state): State<EngineState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<Value>, XrpcError> {
    let account = state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == body.identifier || a.handle == body.identifier)
        .ok_or(EngineError::InvalidPassword)?;

    let valid = accteng_crypto::verify_password(&body.password, &account.password_hash)
        .map_err(|e| {
            XrpcError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                e.to_string(),
            )
        })?;
    if !valid {
        return Err(EngineError::InvalidPassword.into());
    }

    let access_jwt = accteng_crypto::create_access_token(&account.did, &state.config.jwt_secret)?;
    let refresh_jti = uuid::Uuid::new_v4().to_string();
    let refresh_jwt =
        accteng_crypto::create_refresh_token(&account.did, &refresh_jti, &state.config.jwt_secret)?;

    let refresh_record = RefreshTokenRecord {
        id: refresh_jti,
        expires_at: chrono::Utc::now() + chrono::Duration::days(90),
        next_id: None,
    };
    state.account_store.create_refresh_token(&refresh_record).await?;

    Ok(Json(json!({
        "did": account.did,
        "handle": account.handle,
        "accessJwt": access_jwt,
        "refreshJwt": refresh_jwt,
        "active": matches!(account.status, accteng_core::types::AccountStatus::Active),
    })))
}

// ---------------------------------------------------------------------------
// getSession
// ---------------------------------------------------------------------------

pub async fn get_session(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, XrpcError> {
    let account = state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == user.did)
        .ok_or(EngineError::RepoNotFound)?;

    Ok(Json(json!({
        "did": account.did,
        "handle": account.handle,
        "active": matches!(account.status, accteng_core::types::AccountStatus::Active),
    })))
}

// ---------------------------------------------------------------------------
// refreshSession
// ---------------------------------------------------------------------------

pub async fn refresh_session(
    State(state): State<EngineState>,
    headers: HeaderMap,
    axum::Extension(refresh_secret): axum::Extension<JwtRefreshSecret>,
) -> Result<Json<Value>, XrpcError> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            XrpcError::new(
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                "Missing authorization header",
            )
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        XrpcError::new(
            StatusCode::UNAUTHORIZED,
            "AuthenticationRequired",
            "Invalid authorization format",
        )
    })?;

    let claims = accteng_crypto::validate_refresh_token(token, &refresh_secret.0).map_err(|e| {
        let err_msg = e.to_string();
        if err_msg.contains("ExpiredSignature") {
            XrpcError::new(StatusCode::UNAUTHORIZED, "ExpiredToken", "Refresh token has expired")
        } else {
            XrpcError::new(StatusCode::UNAUTHORIZED, "InvalidToken", "Invalid refresh token")
        }
    })?;

    let _old_record = state
        .account_store
        .get_refresh_token(&claims.jti)
        .await?
        .ok_or_else(|| XrpcError::new(StatusCode::UNAUTHORIZED, "InvalidToken", "Refresh token not found"))?;

    let account = state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == claims.sub)
        .ok_or(EngineError::RepoNotFound)?;

    state.account_store.delete_refresh_token(&claims.jti).await?;

    let access_jwt = accteng_crypto::create_access_token(&account.did, &state.config.jwt_secret)?;
    let new_refresh_jti = uuid::Uuid::new_v4().to_string();
    let refresh_jwt = accteng_crypto::create_refresh_token(
        &account.did,
        &new_refresh_jti,
        &state.config.jwt_secret,
    )?;

    let refresh_record = RefreshTokenRecord {
        id: new_refresh_jti,
        expires_at: chrono::Utc::now() + chrono::Duration::days(90),
        next_id: None,
    };
    state.account_store.create_refresh_token(&refresh_record).await?;

    Ok(Json(json!({
        "did": account.did,
        "handle": account.handle,
        "accessJwt": access_jwt,
        "refreshJwt": refresh_jwt,
    })))
}

// ---------------------------------------------------------------------------
// deleteSession
// ---------------------------------------------------------------------------

pub async fn delete_session(
    State(state): State<EngineState>,
    _user: AuthenticatedUser,
) -> Result<StatusCode, XrpcError> {
    state.account_store.delete_all_refresh_tokens().await?;
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// getServiceAuth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GetServiceAuthQuery {
    pub aud: String,
    pub lxm: Option<String>,
}

pub async fn get_service_auth(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
    Query(params): Query<GetServiceAuthQuery>,
) -> Result<Json<Value>, XrpcError> {
    let account = state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == user.did)
        .ok_or(EngineError::RepoNotFound)?;

    let signing_key = accteng_crypto::SigningKey::from_bytes("p256", &account.signing_key)
        .map_err(|e| XrpcError::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", e.to_string()))?;

    let token = crate::proxy::service_auth::create_service_auth_token(
        &signing_key,
        &user.did,
        &params.aud,
        params.lxm.as_deref().unwrap_or(""),
    )?;

    Ok(Json(json!({ "token": token })))
}

// ---------------------------------------------------------------------------
// getAccountStatus
// ---------------------------------------------------------------------------

pub async fn get_account_status(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, XrpcError> {
    let account = state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == user.did)
        .ok_or(EngineError::RepoNotFound)?;
    let repo_state = state.repo_store.get_repo_state(&user.did).await?;

    Ok(Json(json!({
        "did": account.did,
        "active": repo_state.active,
        "status": match account.status {
            accteng_core::types::AccountStatus::Active => Value::Null,
            accteng_core::types::AccountStatus::Deactivated => json!("deactivated"),
            accteng_core::types::AccountStatus::Takendown => json!("takendown"),
        },
        "repoCommit": repo_state.rev,
        "repoRev": repo_state.seq,
    })))
}

// ---------------------------------------------------------------------------
// deleteAccount
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    pub did: String,
    pub password: String,
}

pub async fn delete_account(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
    Json(body): Json<DeleteAccountRequest>,
) -> Result<StatusCode, XrpcError> {
    if body.did != user.did {
        return Err(XrpcError::new(
            StatusCode::FORBIDDEN,
            "AuthorizationError",
            "Token did not match account DID",
        ));
    }

    let account = state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == user.did)
        .ok_or(EngineError::RepoNotFound)?;

    let valid = accteng_crypto::verify_password(&body.password, &account.password_hash)
        .map_err(|e| {
            XrpcError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                e.to_string(),
            )
        })?;
    if !valid {
        return Err(EngineError::InvalidPassword.into());
    }

    state.repo_store.delete_blocks_for_did(&user.did).await?;
    state.account_store.delete_account().await?;

    if let Some(ref sequencer) = state.sequencer {
        use crate::firehose::events::{AccountEvent, FirehoseEvent};
        let seq = sequencer.next_seq();
        let event = FirehoseEvent::Account(AccountEvent {
            seq,
            did: user.did.clone(),
            time: chrono::Utc::now().to_rfc3339(),
            active: false,
            status: Some("deleted".to_string()),
        });
        crate::firehose::emit::emit_and_persist(&state, event).await;
    }

    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// activateAccount / deactivateAccount
// ---------------------------------------------------------------------------

pub async fn activate_account(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
) -> Result<StatusCode, XrpcError> {
    state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == user.did)
        .ok_or(EngineError::RepoNotFound)?;

    state.account_store.activate_account().await?;
    state.repo_store.set_active(&user.did, true).await?;

    if let Some(ref sequencer) = state.sequencer {
        use crate::firehose::events::{AccountEvent, FirehoseEvent};
        let seq = sequencer.next_seq();
        let event = FirehoseEvent::Account(AccountEvent {
            seq,
            did: user.did.clone(),
            time: chrono::Utc::now().to_rfc3339(),
            active: true,
            status: None,
        });
        crate::firehose::emit::emit_and_persist(&state, event).await;
    }

    Ok(StatusCode::OK)
}

pub async fn deactivate_account(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
) -> Result<StatusCode, XrpcError> {
    state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == user.did)
        .ok_or(EngineError::RepoNotFound)?;

    state.account_store.deactivate_account().await?;
    state.repo_store.set_active(&user.did, false).await?;

    if let Some(ref sequencer) = state.sequencer {
        use crate::firehose::events::{AccountEvent, FirehoseEvent};
        let seq = sequencer.next_seq();
        let event = FirehoseEvent::Account(AccountEvent {
            seq,
            did: user.did.clone(),
            time: chrono::Utc::now().to_rfc3339(),
            active: false,
            status: Some("deactivated".to_string()),
        });
        crate::firehose::emit::emit_and_persist(&state, event).await;
    }

    Ok(StatusCode::OK)
}
