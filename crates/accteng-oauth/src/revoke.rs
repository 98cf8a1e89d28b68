use std::sync::Arc;

use accteng_core::OAuthStore;

use crate::error::OAuthResult;

/// Revoke an access or refresh token (RFC 7009). Per the RFC, revocation of
/// an unknown token is not an error — the endpoint is idempotent.
pub async fn revoke(store: &Arc<dyn OAuthStore>, token: &str) -> OAuthResult<()> {
    store.revoke_token(token).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorize::{AuthorizeRequest, authorize};
    use crate::test_support::InMemoryOAuthStore;
    use crate::token::exchange_code;
    use base64::Engine as _;
    use sha2::{Digest, Sha256};

    #[tokio::test]
    async fn revoking_unknown_token_is_not_an_error() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let result = revoke(&store, "never-issued").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn revoked_token_is_marked_revoked() {
        let store: Arc<dyn OAuthStore> = Arc::new(InMemoryOAuthStore::default());
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string();
        let challenge =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

        let outcome = authorize(
            &store,
            AuthorizeRequest::Inline {
                client_id: "https://client.example/metadata.json".into(),
                redirect_uri: "https://client.example/callback".into(),
                code_challenge: challenge,
                code_challenge_method: "S256".into(),
                scope: "atproto".into(),
                state: None,
            },
            "did:web:pds.example",
        )
        .await
        .unwrap();

        let token = exchange_code(
            &store,
            &outcome.code,
            &verifier,
            "https://client.example/metadata.json",
            "https://client.example/callback",
            None,
        )
        .await
        .unwrap();

        revoke(&store, &token.access_token).await.unwrap();
        let stored = store.get_token_by_access(&token.access_token).await.unwrap().unwrap();
        assert!(stored.revoked);
    }
}
