//! In-memory `OAuthStore` used only by this crate's unit tests. The real
//! implementation lives in `accteng-storage-sqlite`; this stays here so
//! `par`/`authorize`/`token`/`webauthn`/`cleanup` can each be tested without
//! pulling in a database.
use std::collections::HashMap;
use std::sync::Mutex;

use accteng_core::{
    AuthCode, EngineResult, OAuthClientMeta, OAuthStore, OAuthToken, ParRequest,
    PasskeyCredential, PasskeyToken,
};
use async_trait::async_trait;

#[derive(Default)]
pub struct InMemoryOAuthStore {
    par: Mutex<HashMap<String, ParRequest>>,
    auth_codes: Mutex<HashMap<String, AuthCode>>,
    tokens_by_access: Mutex<HashMap<String, OAuthToken>>,
    tokens_by_refresh: Mutex<HashMap<String, String>>,
    clients: Mutex<HashMap<String, OAuthClientMeta>>,
    nonces: Mutex<HashMap<String, ()>>,
    webauthn_challenges: Mutex<HashMap<String, ()>>,
    passkey_tokens: Mutex<HashMap<String, PasskeyToken>>,
    passkeys: Mutex<HashMap<String, PasskeyCredential>>,
}

#[async_trait]
impl OAuthStore for InMemoryOAuthStore {
    async fn put_par(&self, request: &ParRequest) -> EngineResult<()> {
        self.par
            .lock()
            .unwrap()
            .insert(request.request_uri.clone(), request.clone());
        Ok(())
    }

    async fn take_par(&self, request_uri: &str) -> EngineResult<Option<ParRequest>> {
        Ok(self.par.lock().unwrap().remove(request_uri))
    }

    async fn put_auth_code(&self, code: &AuthCode) -> EngineResult<()> {
        self.auth_codes
            .lock()
            .unwrap()
            .insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn get_auth_code(&self, code: &str) -> EngineResult<Option<AuthCode>> {
        Ok(self.auth_codes.lock().unwrap().get(code).cloned())
    }

    async fn redeem_auth_code(&self, code: &str, token: &OAuthToken) -> EngineResult<()> {
        self.auth_codes.lock().unwrap().remove(code);
        self.tokens_by_refresh
            .lock()
            .unwrap()
            .insert(token.refresh_token.clone(), token.access_token.clone());
        self.tokens_by_access
            .lock()
            .unwrap()
            .insert(token.access_token.clone(), token.clone());
        Ok(())
    }

    async fn get_token_by_access(&self, access_token: &str) -> EngineResult<Option<OAuthToken>> {
        Ok(self.tokens_by_access.lock().unwrap().get(access_token).cloned())
    }

    async fn get_token_by_refresh(&self, refresh_token: &str) -> EngineResult<Option<OAuthToken>> {
        let access = self.tokens_by_refresh.lock().unwrap().get(refresh_token).cloned();
        match access {
            Some(access) => Ok(self.tokens_by_access.lock().unwrap().get(&access).cloned()),
            None => Ok(None),
        }
    }

    async fn rotate_token(
        &self,
        new_token: &OAuthToken,
        replace_refresh: Option<&str>,
    ) -> EngineResult<()> {
        if let Some(old_refresh) = replace_refresh {
            if let Some(old_access) = self.tokens_by_refresh.lock().unwrap().remove(old_refresh) {
                if let Some(t) = self.tokens_by_access.lock().unwrap().get_mut(&old_access) {
                    t.revoked = true;
                }
            }
        }
        self.tokens_by_refresh
            .lock()
            .unwrap()
            .insert(new_token.refresh_token.clone(), new_token.access_token.clone());
        self.tokens_by_access
            .lock()
            .unwrap()
            .insert(new_token.access_token.clone(), new_token.clone());
        Ok(())
    }

    async fn revoke_token(&self, access_or_refresh: &str) -> EngineResult<()> {
        let access = self
            .tokens_by_refresh
            .lock()
            .unwrap()
            .get(access_or_refresh)
            .cloned()
            .unwrap_or_else(|| access_or_refresh.to_string());
        if let Some(t) = self.tokens_by_access.lock().unwrap().get_mut(&access) {
            t.revoked = true;
        }
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> EngineResult<Option<OAuthClientMeta>> {
        Ok(self.clients.lock().unwrap().get(client_id).cloned())
    }

    async fn put_client(&self, client: &OAuthClientMeta) -> EngineResult<()> {
        self.clients
            .lock()
            .unwrap()
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn check_and_save_nonce(&self, jti: &str) -> EngineResult<bool> {
        let mut nonces = self.nonces.lock().unwrap();
        if nonces.contains_key(jti) {
            Ok(false)
        } else {
            nonces.insert(jti.to_string(), ());
            Ok(true)
        }
    }

    async fn put_webauthn_challenge(&self, challenge: &str) -> EngineResult<()> {
        self.webauthn_challenges
            .lock()
            .unwrap()
            .insert(challenge.to_string(), ());
        Ok(())
    }

    async fn take_webauthn_challenge(&self, challenge: &str) -> EngineResult<bool> {
        Ok(self.webauthn_challenges.lock().unwrap().remove(challenge).is_some())
    }

    async fn put_passkey_token(&self, token: &PasskeyToken) -> EngineResult<()> {
        self.passkey_tokens
            .lock()
            .unwrap()
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn take_passkey_token(&self, token: &str) -> EngineResult<Option<PasskeyToken>> {
        Ok(self.passkey_tokens.lock().unwrap().remove(token))
    }

    async fn put_passkey(&self, credential: &PasskeyCredential) -> EngineResult<()> {
        self.passkeys
            .lock()
            .unwrap()
            .insert(credential.credential_id.clone(), credential.clone());
        Ok(())
    }

    async fn get_passkey(&self, credential_id: &str) -> EngineResult<Option<PasskeyCredential>> {
        Ok(self.passkeys.lock().unwrap().get(credential_id).cloned())
    }

    async fn list_passkeys(&self) -> EngineResult<Vec<PasskeyCredential>> {
        Ok(self.passkeys.lock().unwrap().values().cloned().collect())
    }

    async fn update_passkey_counter(&self, credential_id: &str, counter: u32) -> EngineResult<()> {
        if let Some(p) = self.passkeys.lock().unwrap().get_mut(credential_id) {
            p.counter = counter;
            p.last_used_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn cleanup_expired(&self) -> EngineResult<u64> {
        let now = chrono::Utc::now();
        let mut removed = 0u64;
        self.par.lock().unwrap().retain(|_, v| {
            let keep = v.expires_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });
        self.auth_codes.lock().unwrap().retain(|_, v| {
            let keep = v.expires_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });
        self.tokens_by_access.lock().unwrap().retain(|_, v| {
            let keep = !(v.revoked && v.expires_at < now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
