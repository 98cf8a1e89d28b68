use std::sync::Arc;

use accteng_core::{OAuthStore, ParRequest};
use rand::RngCore;

use crate::error::{OAuthError, OAuthResult};

/// TTL for a pushed authorization request row (§3 `par` table).
const PAR_TTL_SECS: i64 = 90;

/// Parameters accepted by `pushed_authorization_request` (RFC 9126).
#[derive(Debug, Clone)]
pub struct PushedAuthRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub scope: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PushedAuthResponse {
    pub request_uri: String,
    pub expires_in: i64,
}

/// Validate and store a pushed authorization request, returning an opaque
/// `request_uri` the client redeems at `/oauth/authorize` (§4.5 step 1).
pub async fn push_authorization_request(
    store: &Arc<dyn OAuthStore>,
    req: PushedAuthRequest,
) -> OAuthResult<PushedAuthResponse> {
    if req.response_type != "code" {
        return Err(OAuthError::InvalidRequest(
            "response_type must be \"code\"".into(),
        ));
    }
    if req.code_challenge_method != "S256" {
        return Err(OAuthError::InvalidRequest(
            "code_challenge_method must be \"S256\"".into(),
        ));
    }
    if req.code_challenge.len() < 43 {
        return Err(OAuthError::InvalidRequest(
            "code_challenge too short to be a valid S256 challenge".into(),
        ));
    }
    if req.client_id.is_empty() || req.redirect_uri.is_empty() {
        return Err(OAuthError::InvalidRequest(
            "client_id and redirect_uri are required".into(),
        ));
    }

    let request_uri = format!("urn:ietf:params:oauth:request_uri:{}", generate_token(24));
    let params = serde_json::to_string(&serde_json::json!({
        "client_id": req.client_id,
        "redirect_uri": req.redirect_uri,
        "code_challenge": req.code_challenge,
        "code_challenge_method": req.code_challenge_method,
        "scope": req.scope,
        "state": req.state,
    }))
    .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?;

    let expires_at = chrono::Utc::now() + chrono::Duration::seconds(PAR_TTL_SECS);
    store
        .put_par(&ParRequest {
            request_uri: request_uri.clone(),
            client_id: req.client_id,
            params,
            expires_at,
        })
        .await?;

    Ok(PushedAuthResponse {
        request_uri,
        expires_in: PAR_TTL_SECS,
    })
}

/// Consume a stored PAR row, failing if it never existed or has expired.
pub async fn take_par(store: &Arc<dyn OAuthStore>, request_uri: &str) -> OAuthResult<ParRequest> {
    let row = store
        .take_par(request_uri)
        .await?
        .ok_or_else(|| OAuthError::InvalidRequest("unknown or expired request_uri".into()))?;
    if row.expires_at < chrono::Utc::now() {
        return Err(OAuthError::InvalidRequest("request_uri has expired".into()));
    }
    Ok(row)
}

pub(crate) fn generate_token(num_bytes: usize) -> String {
    use base64::Engine as _;
    let mut bytes = vec![0u8; num_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryOAuthStore;

    fn valid_request() -> PushedAuthRequest {
        PushedAuthRequest {
            client_id: "https://client.example/metadata.json".into(),
            redirect_uri: "https://client.example/callback".into(),
            response_type: "code".into(),
            code_challenge: "a".repeat(43),
            code_challenge_method: "S256".into(),
            scope: "atproto transition:generic".into(),
            state: Some("xyz".into()),
        }
    }

    #[tokio::test]
    async fn valid_par_is_stored_and_redeemable() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let resp = push_authorization_request(&store, valid_request()).await.unwrap();
        assert!(resp.request_uri.starts_with("urn:ietf:params:oauth:request_uri:"));
        let redeemed = take_par(&store, &resp.request_uri).await.unwrap();
        assert_eq!(redeemed.client_id, "https://client.example/metadata.json");
    }

    #[tokio::test]
    async fn par_is_single_use() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let resp = push_authorization_request(&store, valid_request()).await.unwrap();
        take_par(&store, &resp.request_uri).await.unwrap();
        let second = take_par(&store, &resp.request_uri).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn rejects_non_s256_challenge_method() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let mut req = valid_request();
        req.code_challenge_method = "plain".into();
        let result = push_authorization_request(&store, req).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_non_code_response_type() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let mut req = valid_request();
        req.response_type = "token".into();
        let result = push_authorization_request(&store, req).await;
        assert!(result.is_err());
    }
}
