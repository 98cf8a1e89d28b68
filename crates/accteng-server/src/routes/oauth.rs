use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::XrpcError;
use crate::state::EngineState;
use accteng_core::EngineError;
use accteng_oauth::{
    AuthorizeRequest, PushedAuthRequest, authorize, exchange_code, push_authorization_request,
    refresh, revoke,
};

fn issuer(state: &EngineState) -> String {
    format!("https://{}", state.config.pds_hostname)
}

// ---------------------------------------------------------------------------
// OAuth Authorization Server Metadata (RFC 8414)
// ---------------------------------------------------------------------------

pub async fn authorization_server_metadata(
    State(state): State<EngineState>,
) -> Result<Json<Value>, XrpcError> {
    let issuer = issuer(&state);

    Ok(Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth/authorize"),
        "token_endpoint": format!("{issuer}/oauth/token"),
        "pushed_authorization_request_endpoint": format!("{issuer}/oauth/par"),
        "revocation_endpoint": format!("{issuer}/oauth/revoke"),
        "jwks_uri": format!("{issuer}/oauth/jwks"),
        "scopes_supported": ["atproto", "transition:generic", "transition:chat.bsky"],
        "response_types_supported": ["code"],
        "response_modes_supported": ["query"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "subject_types_supported": ["public"],
        "token_endpoint_auth_methods_supported": ["none"],
        "dpop_signing_alg_values_supported": ["ES256"],
        "code_challenge_methods_supported": ["S256"],
        "require_pushed_authorization_requests": true,
        "require_request_uri_registration": true,
        "client_id_metadata_document_supported": true,
    })))
}

// ---------------------------------------------------------------------------
// OAuth Protected Resource Metadata (RFC 9728)
// ---------------------------------------------------------------------------

pub async fn protected_resource_metadata(
    State(state): State<EngineState>,
) -> Result<Json<Value>, XrpcError> {
    let resource = issuer(&state);

    Ok(Json(json!({
        "resource": resource,
        "authorization_servers": [resource],
        "scopes_supported": ["atproto", "transition:generic", "transition:chat.bsky"],
        "bearer_methods_supported": ["header"],
        "resource_documentation": "https://atproto.com",
    })))
}

// ---------------------------------------------------------------------------
// PAR — pushed authorization request (RFC 9126)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OauthParForm {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    #[serde(default)]
    pub scope: String,
    pub state: Option<String>,
}

pub async fn oauth_par(
    State(state): State<EngineState>,
    Form(body): Form<OauthParForm>,
) -> Result<Json<Value>, XrpcError> {
    let resp = push_authorization_request(
        &state.oauth_store,
        PushedAuthRequest {
            client_id: body.client_id,
            redirect_uri: body.redirect_uri,
            response_type: body.response_type,
            code_challenge: body.code_challenge,
            code_challenge_method: body.code_challenge_method,
            scope: body.scope,
            state: body.state,
        },
    )
    .await?;

    Ok(Json(json!({
        "request_uri": resp.request_uri,
        "expires_in": resp.expires_in,
    })))
}

// ---------------------------------------------------------------------------
// authorize — redeem a PAR request_uri (or inline params) for an auth code
//
// A multi-tenant PDS serves a login/consent page here; this engine hosts
// exactly one account, so the only question the endpoint answers is whether
// that account is active, then issues the code on its behalf directly.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OauthAuthorizeQuery {
    pub request_uri: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
}

pub async fn oauth_authorize(
    State(state): State<EngineState>,
    Query(params): Query<OauthAuthorizeQuery>,
) -> Result<Response, XrpcError> {
    let account = state
        .account_store
        .get_account()
        .await?
        .ok_or(EngineError::RepoNotFound)?;
    if !matches!(account.status, accteng_core::types::AccountStatus::Active) {
        return Err(EngineError::AccountInactive.into());
    }

    let request = if let Some(uri) = params.request_uri {
        AuthorizeRequest::RequestUri(uri)
    } else {
        AuthorizeRequest::Inline {
            client_id: params.client_id.ok_or_else(|| {
                XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", "client_id is required")
            })?,
            redirect_uri: params.redirect_uri.ok_or_else(|| {
                XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", "redirect_uri is required")
            })?,
            code_challenge: params.code_challenge.unwrap_or_default(),
            code_challenge_method: params.code_challenge_method.unwrap_or_default(),
            scope: params.scope.unwrap_or_default(),
            state: params.state,
        }
    };

    let outcome = authorize(&state.oauth_store, request, &account.did).await?;

    let mut redirect_url = url::Url::parse(&outcome.redirect_uri).map_err(|e| {
        XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", format!("invalid redirect_uri: {e}"))
    })?;
    redirect_url.query_pairs_mut().append_pair("code", &outcome.code);
    if let Some(s) = &outcome.state {
        redirect_url.query_pairs_mut().append_pair("state", s);
    }

    Ok(Redirect::to(redirect_url.as_str()).into_response())
}

// ---------------------------------------------------------------------------
// token — authorization_code / refresh_token grants
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OauthTokenForm {
    pub grant_type: String,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
}

fn verified_dpop_proof(
    state: &EngineState,
    headers: &HeaderMap,
) -> Result<Option<accteng_crypto::dpop::VerifiedDpopProof>, XrpcError> {
    let Some(proof) = headers.get("dpop").and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    let url = format!("{}/oauth/token", issuer(state));
    let verified = accteng_crypto::dpop::verify_dpop_proof(
        proof,
        "POST",
        &url,
        None,
        state.config.oauth.dpop_iat_skew_secs,
    )?;
    Ok(Some(verified))
}

pub async fn oauth_token(
    State(state): State<EngineState>,
    headers: HeaderMap,
    Form(body): Form<OauthTokenForm>,
) -> Result<Json<Value>, XrpcError> {
    let dpop_proof = verified_dpop_proof(&state, &headers)?;

    let resp = match body.grant_type.as_str() {
        "authorization_code" => {
            let code = body.code.ok_or_else(|| {
                XrpcError::new(StatusCode::BAD_REQUEST, "invalid_request", "code is required")
            })?;
            let code_verifier = body.code_verifier.ok_or_else(|| {
                XrpcError::new(StatusCode::BAD_REQUEST, "invalid_request", "code_verifier is required")
            })?;
            let client_id = body.client_id.ok_or_else(|| {
                XrpcError::new(StatusCode::BAD_REQUEST, "invalid_request", "client_id is required")
            })?;
            let redirect_uri = body.redirect_uri.ok_or_else(|| {
                XrpcError::new(StatusCode::BAD_REQUEST, "invalid_request", "redirect_uri is required")
            })?;
            exchange_code(
                &state.oauth_store,
                &code,
                &code_verifier,
                &client_id,
                &redirect_uri,
                dpop_proof.as_ref(),
            )
            .await?
        }
        "refresh_token" => {
            let refresh_token = body.refresh_token.ok_or_else(|| {
                XrpcError::new(StatusCode::BAD_REQUEST, "invalid_request", "refresh_token is required")
            })?;
            refresh(&state.oauth_store, &refresh_token, dpop_proof.as_ref(), true).await?
        }
        other => {
            return Err(accteng_oauth::OAuthError::UnsupportedGrantType(other.to_string()).into());
        }
    };

    Ok(Json(json!({
        "access_token": resp.access_token,
        "refresh_token": resp.refresh_token,
        "token_type": resp.token_type,
        "expires_in": resp.expires_in,
        "scope": resp.scope,
    })))
}

// ---------------------------------------------------------------------------
// revoke (RFC 7009)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OauthRevokeForm {
    pub token: String,
}

pub async fn oauth_revoke(
    State(state): State<EngineState>,
    Form(body): Form<OauthRevokeForm>,
) -> Result<StatusCode, XrpcError> {
    revoke(&state.oauth_store, &body.token).await?;
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// jwks — this engine's DPoP-bound tokens are opaque, not signed JWTs, so
// there is no PDS-held signing key to publish here.
// ---------------------------------------------------------------------------

pub async fn oauth_jwks() -> Json<Value> {
    Json(json!({ "keys": [] }))
}
