use std::sync::Arc;

use accteng_core::{OAuthStore, PasskeyCredential, PasskeyToken};
use webauthn_rs::prelude::*;

use crate::error::{OAuthError, OAuthResult};
use crate::par::generate_token;

/// TTL for a passkey registration hand-off token (§3 `passkey_token` table).
const PASSKEY_TOKEN_TTL_SECS: i64 = 600;

/// Build the library's `Webauthn` instance for this PDS's origin. One
/// instance is created at startup and shared for the life of the process.
pub fn build_webauthn(rp_id: &str, rp_origin: &url::Url, rp_name: &str) -> OAuthResult<Webauthn> {
    WebauthnBuilder::new(rp_id, rp_origin)
        .map_err(|e| OAuthError::InvalidRequest(format!("invalid webauthn RP config: {e}")))?
        .rp_name(rp_name)
        .build()
        .map_err(|e| OAuthError::InvalidRequest(format!("failed to build webauthn instance: {e}")))
}

/// Begin passkey registration: issue a hand-off token and a registration
/// challenge (§4.5 "WebAuthn (passkey) flow").
pub async fn init_registration(
    webauthn: &Webauthn,
    store: &Arc<dyn OAuthStore>,
    user_id: Uuid,
    user_name: &str,
    name: Option<String>,
) -> OAuthResult<(String, CreationChallengeResponse, PasskeyRegistration)> {
    let (ccr, reg_state) = webauthn
        .start_passkey_registration(user_id, user_name, user_name, None)
        .map_err(|e| OAuthError::InvalidRequest(format!("failed to start registration: {e}")))?;

    let token = generate_token(24);
    store
        .put_passkey_token(&PasskeyToken {
            token: token.clone(),
            challenge: serde_json::to_string(&reg_state)
                .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(PASSKEY_TOKEN_TTL_SECS),
            name,
        })
        .await?;

    Ok((token, ccr, reg_state))
}

/// Complete passkey registration: consume the hand-off token exactly once,
/// verify the attestation, and persist the credential.
pub async fn finish_registration(
    webauthn: &Webauthn,
    store: &Arc<dyn OAuthStore>,
    token: &str,
    response: &RegisterPublicKeyCredential,
) -> OAuthResult<()> {
    let stored = store
        .take_passkey_token(token)
        .await?
        .ok_or_else(|| OAuthError::InvalidRequest("unknown or already-used passkey token".into()))?;
    if stored.expires_at < chrono::Utc::now() {
        return Err(OAuthError::InvalidRequest("passkey registration token has expired".into()));
    }

    let reg_state: PasskeyRegistration = serde_json::from_str(&stored.challenge)
        .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?;
    let passkey = webauthn
        .finish_passkey_registration(response, &reg_state)
        .map_err(|e| OAuthError::InvalidRequest(format!("attestation verification failed: {e}")))?;

    store
        .put_passkey(&PasskeyCredential {
            credential_id: passkey.cred_id().to_string(),
            public_key: serde_json::to_vec(&passkey)
                .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?,
            counter: passkey.counter(),
            name: stored.name,
            created_at: chrono::Utc::now(),
            last_used_at: None,
        })
        .await?;
    Ok(())
}

/// Begin passkey authentication against every credential the account has
/// registered.
pub async fn get_authentication_options(
    webauthn: &Webauthn,
    store: &Arc<dyn OAuthStore>,
) -> OAuthResult<(RequestChallengeResponse, PasskeyAuthentication)> {
    let credentials = store.list_passkeys().await?;
    let passkeys: Vec<Passkey> = credentials
        .iter()
        .map(|c| serde_json::from_slice(&c.public_key))
        .collect::<Result<_, _>>()
        .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?;
    if passkeys.is_empty() {
        return Err(OAuthError::InvalidRequest("no passkeys registered".into()));
    }

    let (rcr, auth_state) = webauthn
        .start_passkey_authentication(&passkeys)
        .map_err(|e| OAuthError::InvalidRequest(format!("failed to start authentication: {e}")))?;
    let challenge = serde_json::to_string(&auth_state)
        .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?;
    store.put_webauthn_challenge(&challenge).await?;
    Ok((rcr, auth_state))
}

/// Verify a passkey assertion. The stored counter must strictly increase,
/// or the credential is treated as cloned and the authentication fails with
/// `CounterRegression` (§4.5).
pub async fn verify_authentication(
    webauthn: &Webauthn,
    store: &Arc<dyn OAuthStore>,
    auth_state: &PasskeyAuthentication,
    response: &PublicKeyCredential,
) -> OAuthResult<String> {
    let challenge = serde_json::to_string(auth_state)
        .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?;
    let consumed = store.take_webauthn_challenge(&challenge).await?;
    if !consumed {
        return Err(OAuthError::InvalidRequest(
            "authentication challenge already used or unknown".into(),
        ));
    }

    let result = webauthn
        .finish_passkey_authentication(response, auth_state)
        .map_err(|e| OAuthError::InvalidRequest(format!("assertion verification failed: {e}")))?;

    let credential_id = result.cred_id().to_string();
    let stored = store
        .get_passkey(&credential_id)
        .await?
        .ok_or_else(|| OAuthError::InvalidToken("unknown credential".into()))?;

    if result.counter() <= stored.counter && stored.counter != 0 {
        return Err(OAuthError::CounterRegression(credential_id));
    }

    store
        .update_passkey_counter(&credential_id, result.counter())
        .await?;
    Ok(credential_id)
}
