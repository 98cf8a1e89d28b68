use std::sync::Arc;

use accteng_core::{AuthCode, OAuthStore};

use crate::error::{OAuthError, OAuthResult};
use crate::par::{generate_token, take_par};

/// TTL for an issued authorization code (§3 `auth_code` table).
const AUTH_CODE_TTL_SECS: i64 = 300;

/// Either an inline authorize request or a redeemed PAR `request_uri`
/// (§4.5 step 2 accepts both).
pub enum AuthorizeRequest {
    RequestUri(String),
    Inline {
        client_id: String,
        redirect_uri: String,
        code_challenge: String,
        code_challenge_method: String,
        scope: String,
        state: Option<String>,
    },
}

pub struct AuthorizeOutcome {
    pub redirect_uri: String,
    pub code: String,
    pub state: Option<String>,
}

/// Approve an authorization request on behalf of `sub` (the account's own
/// DID — this is a single-tenant engine, so consent is always for the one
/// account it hosts). Issues a fresh code, deletes the PAR row if one was
/// used, and returns the redirect target (§4.5 step 2).
pub async fn authorize(
    store: &Arc<dyn OAuthStore>,
    request: AuthorizeRequest,
    sub: &str,
) -> OAuthResult<AuthorizeOutcome> {
    let (client_id, redirect_uri, code_challenge, code_challenge_method, scope, state) =
        match request {
            AuthorizeRequest::RequestUri(uri) => {
                let par = take_par(store, &uri).await?;
                let params: serde_json::Value = serde_json::from_str(&par.params)
                    .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?;
                (
                    par.client_id,
                    params["redirect_uri"].as_str().unwrap_or_default().to_string(),
                    params["code_challenge"].as_str().unwrap_or_default().to_string(),
                    params["code_challenge_method"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    params["scope"].as_str().unwrap_or_default().to_string(),
                    params["state"].as_str().map(|s| s.to_string()),
                )
            }
            AuthorizeRequest::Inline {
                client_id,
                redirect_uri,
                code_challenge,
                code_challenge_method,
                scope,
                state,
            } => (
                client_id,
                redirect_uri,
                code_challenge,
                code_challenge_method,
                scope,
                state,
            ),
        };

    let code = generate_token(32);
    let expires_at = chrono::Utc::now() + chrono::Duration::seconds(AUTH_CODE_TTL_SECS);
    store
        .put_auth_code(&AuthCode {
            code: code.clone(),
            client_id,
            redirect_uri: redirect_uri.clone(),
            code_challenge,
            code_challenge_method,
            scope,
            sub: sub.to_string(),
            expires_at,
        })
        .await?;

    Ok(AuthorizeOutcome {
        redirect_uri,
        code,
        state,
    })
}
