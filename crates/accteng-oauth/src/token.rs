use std::sync::Arc;

use accteng_core::{OAuthStore, OAuthToken};
use accteng_crypto::dpop::VerifiedDpopProof;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::{OAuthError, OAuthResult};
use crate::par::generate_token;

const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;
const REFRESH_TOKEN_TTL_SECS: i64 = 90 * 24 * 60 * 60;

pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub scope: String,
}

/// Exchange an authorization code for a token pair (§4.5 step 3). If
/// `dpop_proof` is present, the resulting access token is bound to that
/// proof's JWK thumbprint (`dpop_jkt`); subsequent use of the token must
/// present a proof with a matching thumbprint.
pub async fn exchange_code(
    store: &Arc<dyn OAuthStore>,
    code: &str,
    code_verifier: &str,
    client_id: &str,
    redirect_uri: &str,
    dpop_proof: Option<&VerifiedDpopProof>,
) -> OAuthResult<TokenResponse> {
    let auth_code = store
        .get_auth_code(code)
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("unknown or already-redeemed code".into()))?;

    if auth_code.expires_at < chrono::Utc::now() {
        return Err(OAuthError::InvalidGrant("authorization code has expired".into()));
    }
    if auth_code.client_id != client_id {
        return Err(OAuthError::InvalidGrant("client_id does not match the authorization".into()));
    }
    if auth_code.redirect_uri != redirect_uri {
        return Err(OAuthError::InvalidGrant(
            "redirect_uri does not match the authorization".into(),
        ));
    }
    if !verify_pkce(code_verifier, &auth_code.code_challenge) {
        return Err(OAuthError::InvalidGrant("code_verifier does not match code_challenge".into()));
    }

    let now = chrono::Utc::now();
    let access_token = generate_token(32);
    let refresh_token = generate_token(32);
    let token = OAuthToken {
        access_token: access_token.clone(),
        refresh_token: refresh_token.clone(),
        client_id: client_id.to_string(),
        sub: auth_code.sub.clone(),
        scope: auth_code.scope.clone(),
        dpop_jkt: dpop_proof.map(|p| p.jkt.clone()),
        issued_at: now,
        expires_at: now + chrono::Duration::seconds(ACCESS_TOKEN_TTL_SECS),
        revoked: false,
    };

    // Code deletion and token insertion happen together: a partial outcome
    // would let the code be replayed (§4.5 step 3).
    store.redeem_auth_code(code, &token).await?;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: token_type_for(dpop_proof),
        expires_in: ACCESS_TOKEN_TTL_SECS,
        scope: auth_code.scope,
    })
}

/// Issue a new access token from a refresh token, optionally rotating the
/// refresh token itself (§4.5 step 4). If the original grant was DPoP-bound,
/// the new proof's thumbprint must match the stored one.
pub async fn refresh(
    store: &Arc<dyn OAuthStore>,
    refresh_token: &str,
    dpop_proof: Option<&VerifiedDpopProof>,
    rotate_refresh: bool,
) -> OAuthResult<TokenResponse> {
    let existing = store
        .get_token_by_refresh(refresh_token)
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("unknown refresh token".into()))?;

    if existing.revoked {
        return Err(OAuthError::InvalidGrant("refresh token has been revoked".into()));
    }
    if existing.issued_at + chrono::Duration::seconds(REFRESH_TOKEN_TTL_SECS) < chrono::Utc::now() {
        return Err(OAuthError::InvalidGrant("refresh token has expired".into()));
    }

    if let Some(expected_jkt) = &existing.dpop_jkt {
        match dpop_proof {
            Some(proof) if &proof.jkt == expected_jkt => {}
            Some(_) => {
                return Err(OAuthError::InvalidDpopProof(
                    "proof key does not match the token's bound key".into(),
                ));
            }
            None => {
                return Err(OAuthError::InvalidDpopProof(
                    "token is DPoP-bound; a proof is required".into(),
                ));
            }
        }
    }

    let now = chrono::Utc::now();
    let new_access = generate_token(32);
    let new_refresh = if rotate_refresh {
        generate_token(32)
    } else {
        existing.refresh_token.clone()
    };

    let new_token = OAuthToken {
        access_token: new_access.clone(),
        refresh_token: new_refresh.clone(),
        client_id: existing.client_id.clone(),
        sub: existing.sub.clone(),
        scope: existing.scope.clone(),
        dpop_jkt: existing.dpop_jkt.clone(),
        issued_at: now,
        expires_at: now + chrono::Duration::seconds(ACCESS_TOKEN_TTL_SECS),
        revoked: false,
    };

    let replace = if rotate_refresh {
        Some(existing.refresh_token.as_str())
    } else {
        None
    };
    store.rotate_token(&new_token, replace).await?;

    Ok(TokenResponse {
        access_token: new_access,
        refresh_token: new_refresh,
        token_type: token_type_for(dpop_proof),
        expires_in: ACCESS_TOKEN_TTL_SECS,
        scope: existing.scope,
    })
}

fn token_type_for(dpop_proof: Option<&VerifiedDpopProof>) -> &'static str {
    if dpop_proof.is_some() { "DPoP" } else { "Bearer" }
}

fn verify_pkce(code_verifier: &str, code_challenge: &str) -> bool {
    let digest = Sha256::digest(code_verifier.as_bytes());
    let computed = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
    computed == code_challenge
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorize::{AuthorizeRequest, authorize};
    use crate::test_support::InMemoryOAuthStore;

    fn pkce_pair() -> (String, String) {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string();
        let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(Sha256::digest(verifier.as_bytes()));
        (verifier, challenge)
    }

    async fn issue_code(store: &Arc<dyn OAuthStore>, challenge: &str) -> String {
        let outcome = authorize(
            store,
            AuthorizeRequest::Inline {
                client_id: "https://client.example/metadata.json".into(),
                redirect_uri: "https://client.example/callback".into(),
                code_challenge: challenge.to_string(),
                code_challenge_method: "S256".into(),
                scope: "atproto transition:generic".into(),
                state: None,
            },
            "did:web:pds.example",
        )
        .await
        .unwrap();
        outcome.code
    }

    #[tokio::test]
    async fn valid_pkce_exchange_succeeds() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let (verifier, challenge) = pkce_pair();
        let code = issue_code(&store, &challenge).await;

        let resp = exchange_code(
            &store,
            &code,
            &verifier,
            "https://client.example/metadata.json",
            "https://client.example/callback",
            None,
        )
        .await
        .unwrap();
        assert_eq!(resp.token_type, "Bearer");
        assert!(!resp.access_token.is_empty());
    }

    #[tokio::test]
    async fn wrong_verifier_rejected() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let (_, challenge) = pkce_pair();
        let code = issue_code(&store, &challenge).await;

        let resp = exchange_code(
            &store,
            &code,
            "wrong-verifier",
            "https://client.example/metadata.json",
            "https://client.example/callback",
            None,
        )
        .await;
        assert!(resp.is_err());
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let (verifier, challenge) = pkce_pair();
        let code = issue_code(&store, &challenge).await;

        exchange_code(
            &store,
            &code,
            &verifier,
            "https://client.example/metadata.json",
            "https://client.example/callback",
            None,
        )
        .await
        .unwrap();

        let replay = exchange_code(
            &store,
            &code,
            &verifier,
            "https://client.example/metadata.json",
            "https://client.example/callback",
            None,
        )
        .await;
        assert!(replay.is_err(), "code must not be redeemable twice");
    }

    #[tokio::test]
    async fn refresh_without_rotation_keeps_refresh_token() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let (verifier, challenge) = pkce_pair();
        let code = issue_code(&store, &challenge).await;
        let first = exchange_code(
            &store,
            &code,
            &verifier,
            "https://client.example/metadata.json",
            "https://client.example/callback",
            None,
        )
        .await
        .unwrap();

        let second = refresh(&store, &first.refresh_token, None, false).await.unwrap();
        assert_eq!(second.refresh_token, first.refresh_token);
        assert_ne!(second.access_token, first.access_token);
    }

    #[tokio::test]
    async fn revoked_refresh_token_rejected() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let (verifier, challenge) = pkce_pair();
        let code = issue_code(&store, &challenge).await;
        let first = exchange_code(
            &store,
            &code,
            &verifier,
            "https://client.example/metadata.json",
            "https://client.example/callback",
            None,
        )
        .await
        .unwrap();

        store.revoke_token(&first.access_token).await.unwrap();
        let result = refresh(&store, &first.refresh_token, None, false).await;
        assert!(result.is_err());
    }
}
