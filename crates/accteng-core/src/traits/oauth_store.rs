use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{
    AuthCode, OAuthClientMeta, OAuthToken, ParRequest, PasskeyCredential, PasskeyToken,
};

/// Durable storage for the OAuth 2.1 authorization-server state (§3 OAuth
/// tables, §4.5). Distinct from `AccountStore`/`RepoStore` because it is
/// consumed by the `accteng-oauth` crate, not the repo engine, and carries
/// its own cleanup-alarm lifecycle (§4.5 "Cleanup alarm").
#[async_trait]
pub trait OAuthStore: Send + Sync + 'static {
    async fn put_par(&self, request: &ParRequest) -> EngineResult<()>;
    async fn take_par(&self, request_uri: &str) -> EngineResult<Option<ParRequest>>;

    async fn put_auth_code(&self, code: &AuthCode) -> EngineResult<()>;
    async fn get_auth_code(&self, code: &str) -> EngineResult<Option<AuthCode>>;
    /// Delete the auth code and insert the issued token in one transaction,
    /// so a crash between the two can never leave the code redeemable twice
    /// (§4.5 step 3).
    async fn redeem_auth_code(&self, code: &str, token: &OAuthToken) -> EngineResult<()>;

    async fn get_token_by_access(&self, access_token: &str) -> EngineResult<Option<OAuthToken>>;
    async fn get_token_by_refresh(&self, refresh_token: &str) -> EngineResult<Option<OAuthToken>>;
    /// Insert a freshly rotated token and, if `replace_refresh` names a prior
    /// refresh token, revoke it atomically with the insert.
    async fn rotate_token(
        &self,
        new_token: &OAuthToken,
        replace_refresh: Option<&str>,
    ) -> EngineResult<()>;
    async fn revoke_token(&self, access_or_refresh: &str) -> EngineResult<()>;

    async fn get_client(&self, client_id: &str) -> EngineResult<Option<OAuthClientMeta>>;
    async fn put_client(&self, client: &OAuthClientMeta) -> EngineResult<()>;

    /// Record a DPoP proof `jti` as seen; returns `false` if it was already
    /// present (replay), `true` if this is its first use (§4.5 "DPoP
    /// verification").
    async fn check_and_save_nonce(&self, jti: &str) -> EngineResult<bool>;

    async fn put_webauthn_challenge(&self, challenge: &str) -> EngineResult<()>;
    async fn take_webauthn_challenge(&self, challenge: &str) -> EngineResult<bool>;

    async fn put_passkey_token(&self, token: &PasskeyToken) -> EngineResult<()>;
    async fn take_passkey_token(&self, token: &str) -> EngineResult<Option<PasskeyToken>>;

    async fn put_passkey(&self, credential: &PasskeyCredential) -> EngineResult<()>;
    async fn get_passkey(&self, credential_id: &str) -> EngineResult<Option<PasskeyCredential>>;
    async fn list_passkeys(&self) -> EngineResult<Vec<PasskeyCredential>>;
    /// Update the stored counter after a successful authentication ceremony.
    async fn update_passkey_counter(&self, credential_id: &str, counter: u32) -> EngineResult<()>;

    /// Delete expired auth codes, revoked tokens, expired PAR/nonce/challenge
    /// rows. Non-revoked tokens with expired access but valid refresh are
    /// preserved (§3 "Lifecycles").
    async fn cleanup_expired(&self) -> EngineResult<u64>;
}
