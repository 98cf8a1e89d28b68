use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use accteng_core::error::{EngineError, EngineResult};
use accteng_core::traits::OAuthStore;
use accteng_core::types::{
    AuthCode, OAuthClientMeta, OAuthToken, ParRequest, PasskeyCredential, PasskeyToken,
};

#[derive(Clone)]
pub struct SqliteOAuthStore {
    pool: SqlitePool,
}

fn fmt_dt(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn parse_dt(s: &str) -> EngineResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&chrono::Utc))
        .map_err(|e| EngineError::Storage(format!("invalid timestamp {s}: {e}")))
}

impl SqliteOAuthStore {
    pub async fn connect(url: &str) -> EngineResult<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl OAuthStore for SqliteOAuthStore {
    async fn put_par(&self, request: &ParRequest) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO par (request_uri, client_id, params, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&request.request_uri)
        .bind(&request.client_id)
        .bind(&request.params)
        .bind(fmt_dt(request.expires_at))
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn take_par(&self, request_uri: &str) -> EngineResult<Option<ParRequest>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let row = sqlx::query(
            "SELECT request_uri, client_id, params, expires_at FROM par WHERE request_uri = ?",
        )
        .bind(request_uri)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;

        let Some(row) = row else {
            tx.commit().await.ok();
            return Ok(None);
        };

        sqlx::query("DELETE FROM par WHERE request_uri = ?")
            .bind(request_uri)
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let expires_at: String = row
            .try_get("expires_at")
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        Ok(Some(ParRequest {
            request_uri: row
                .try_get("request_uri")
                .map_err(|e| EngineError::Storage(e.to_string()))?,
            client_id: row
                .try_get("client_id")
                .map_err(|e| EngineError::Storage(e.to_string()))?,
            params: row
                .try_get("params")
                .map_err(|e| EngineError::Storage(e.to_string()))?,
            expires_at: parse_dt(&expires_at)?,
        }))
    }

    async fn put_auth_code(&self, code: &AuthCode) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO auth_code
             (code, client_id, redirect_uri, code_challenge, code_challenge_method, scope, sub, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.redirect_uri)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(&code.scope)
        .bind(&code.sub)
        .bind(fmt_dt(code.expires_at))
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_auth_code(&self, code: &str) -> EngineResult<Option<AuthCode>> {
        let row = sqlx::query(
            "SELECT code, client_id, redirect_uri, code_challenge, code_challenge_method, scope, sub, expires_at
             FROM auth_code WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_auth_code(&row)?))
    }

    async fn redeem_auth_code(&self, code: &str, token: &OAuthToken) -> EngineResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let result = sqlx::query("DELETE FROM auth_code WHERE code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(EngineError::InvalidRequest(
                "authorization code not found or already redeemed".to_string(),
            ));
        }

        insert_token(&mut tx, token).await?;

        tx.commit()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_token_by_access(&self, access_token: &str) -> EngineResult<Option<OAuthToken>> {
        let row = sqlx::query(&format!("{TOKEN_SELECT} WHERE access_token = ?"))
            .bind(access_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_token(&row)?))
    }

    async fn get_token_by_refresh(&self, refresh_token: &str) -> EngineResult<Option<OAuthToken>> {
        let row = sqlx::query(&format!("{TOKEN_SELECT} WHERE refresh_token = ?"))
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_token(&row)?))
    }

    async fn rotate_token(
        &self,
        new_token: &OAuthToken,
        replace_refresh: Option<&str>,
    ) -> EngineResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        if let Some(old_refresh) = replace_refresh {
            sqlx::query("UPDATE token SET revoked = 1 WHERE refresh_token = ?")
                .bind(old_refresh)
                .execute(&mut *tx)
                .await
                .map_err(|e| EngineError::Storage(e.to_string()))?;
        }

        insert_token(&mut tx, new_token).await?;

        tx.commit()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn revoke_token(&self, access_or_refresh: &str) -> EngineResult<()> {
        sqlx::query(
            "UPDATE token SET revoked = 1 WHERE access_token = ? OR refresh_token = ?",
        )
        .bind(access_or_refresh)
        .bind(access_or_refresh)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> EngineResult<Option<OAuthClientMeta>> {
        let row = sqlx::query(
            "SELECT client_id, client_name, redirect_uris, logo_uri, client_uri, cached_at
             FROM oauth_client WHERE client_id = ?",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let redirect_uris: String = row
            .try_get("redirect_uris")
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        let cached_at: String = row
            .try_get("cached_at")
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        Ok(Some(OAuthClientMeta {
            client_id: row
                .try_get("client_id")
                .map_err(|e| EngineError::Storage(e.to_string()))?,
            client_name: row
                .try_get("client_name")
                .map_err(|e| EngineError::Storage(e.to_string()))?,
            redirect_uris: redirect_uris.split('\n').map(str::to_string).collect(),
            logo_uri: row
                .try_get("logo_uri")
                .map_err(|e| EngineError::Storage(e.to_string()))?,
            client_uri: row
                .try_get("client_uri")
                .map_err(|e| EngineError::Storage(e.to_string()))?,
            cached_at: parse_dt(&cached_at)?,
        }))
    }

    async fn put_client(&self, client: &OAuthClientMeta) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO oauth_client
             (client_id, client_name, redirect_uris, logo_uri, client_uri, cached_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&client.client_id)
        .bind(&client.client_name)
        .bind(client.redirect_uris.join("\n"))
        .bind(&client.logo_uri)
        .bind(&client.client_uri)
        .bind(fmt_dt(client.cached_at))
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn check_and_save_nonce(&self, jti: &str) -> EngineResult<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO dpop_nonce (jti) VALUES (?)")
            .bind(jti)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_webauthn_challenge(&self, challenge: &str) -> EngineResult<()> {
        sqlx::query("INSERT OR REPLACE INTO webauthn_challenge (challenge) VALUES (?)")
            .bind(challenge)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn take_webauthn_challenge(&self, challenge: &str) -> EngineResult<bool> {
        let result = sqlx::query("DELETE FROM webauthn_challenge WHERE challenge = ?")
            .bind(challenge)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_passkey_token(&self, token: &PasskeyToken) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO passkey_token (token, challenge, expires_at, name) VALUES (?, ?, ?, ?)",
        )
        .bind(&token.token)
        .bind(&token.challenge)
        .bind(fmt_dt(token.expires_at))
        .bind(&token.name)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn take_passkey_token(&self, token: &str) -> EngineResult<Option<PasskeyToken>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let row = sqlx::query(
            "SELECT token, challenge, expires_at, name FROM passkey_token WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;

        let Some(row) = row else {
            tx.commit().await.ok();
            return Ok(None);
        };

        sqlx::query("DELETE FROM passkey_token WHERE token = ?")
            .bind(token)
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let expires_at: String = row
            .try_get("expires_at")
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        Ok(Some(PasskeyToken {
            token: row
                .try_get("token")
                .map_err(|e| EngineError::Storage(e.to_string()))?,
            challenge: row
                .try_get("challenge")
                .map_err(|e| EngineError::Storage(e.to_string()))?,
            expires_at: parse_dt(&expires_at)?,
            name: row
                .try_get("name")
                .map_err(|e| EngineError::Storage(e.to_string()))?,
        }))
    }

    async fn put_passkey(&self, credential: &PasskeyCredential) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO passkey (credential_id, public_key, counter, name, created_at, last_used_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&credential.credential_id)
        .bind(&credential.public_key)
        .bind(credential.counter)
        .bind(&credential.name)
        .bind(fmt_dt(credential.created_at))
        .bind(credential.last_used_at.map(fmt_dt))
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_passkey(&self, credential_id: &str) -> EngineResult<Option<PasskeyCredential>> {
        let row = sqlx::query(
            "SELECT credential_id, public_key, counter, name, created_at, last_used_at
             FROM passkey WHERE credential_id = ?",
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_passkey(&row)?))
    }

    async fn list_passkeys(&self) -> EngineResult<Vec<PasskeyCredential>> {
        let rows = sqlx::query(
            "SELECT credential_id, public_key, counter, name, created_at, last_used_at FROM passkey",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;

        rows.iter().map(row_to_passkey).collect()
    }

    async fn update_passkey_counter(&self, credential_id: &str, counter: u32) -> EngineResult<()> {
        sqlx::query(
            "UPDATE passkey SET counter = ?, last_used_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE credential_id = ?",
        )
        .bind(counter)
        .bind(credential_id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn cleanup_expired(&self) -> EngineResult<u64> {
        let mut removed = 0u64;
        let now = fmt_dt(chrono::Utc::now());

        for (table, column) in [
            ("par", "expires_at"),
            ("auth_code", "expires_at"),
            ("passkey_token", "expires_at"),
        ] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE {column} < ?"))
                .bind(&now)
                .execute(&self.pool)
                .await
                .map_err(|e| EngineError::Storage(e.to_string()))?;
            removed += result.rows_affected();
        }

        let result = sqlx::query("DELETE FROM token WHERE revoked = 1")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        removed += result.rows_affected();

        Ok(removed)
    }
}

const TOKEN_SELECT: &str = "SELECT access_token, refresh_token, client_id, sub, scope, dpop_jkt, issued_at, expires_at, revoked FROM token";

async fn insert_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    token: &OAuthToken,
) -> EngineResult<()> {
    sqlx::query(
        "INSERT INTO token (access_token, refresh_token, client_id, sub, scope, dpop_jkt, issued_at, expires_at, revoked)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&token.access_token)
    .bind(&token.refresh_token)
    .bind(&token.client_id)
    .bind(&token.sub)
    .bind(&token.scope)
    .bind(&token.dpop_jkt)
    .bind(fmt_dt(token.issued_at))
    .bind(fmt_dt(token.expires_at))
    .bind(token.revoked)
    .execute(&mut **tx)
    .await
    .map_err(|e| EngineError::Storage(e.to_string()))?;
    Ok(())
}

fn row_to_auth_code(row: &sqlx::sqlite::SqliteRow) -> EngineResult<AuthCode> {
    let expires_at: String = row
        .try_get("expires_at")
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    Ok(AuthCode {
        code: row
            .try_get("code")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        client_id: row
            .try_get("client_id")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        redirect_uri: row
            .try_get("redirect_uri")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        code_challenge: row
            .try_get("code_challenge")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        code_challenge_method: row
            .try_get("code_challenge_method")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        scope: row
            .try_get("scope")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        sub: row
            .try_get("sub")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        expires_at: parse_dt(&expires_at)?,
    })
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> EngineResult<OAuthToken> {
    let issued_at: String = row
        .try_get("issued_at")
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    let expires_at: String = row
        .try_get("expires_at")
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    Ok(OAuthToken {
        access_token: row
            .try_get("access_token")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        refresh_token: row
            .try_get("refresh_token")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        client_id: row
            .try_get("client_id")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        sub: row
            .try_get("sub")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        scope: row
            .try_get("scope")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        dpop_jkt: row
            .try_get("dpop_jkt")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        issued_at: parse_dt(&issued_at)?,
        expires_at: parse_dt(&expires_at)?,
        revoked: row
            .try_get("revoked")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
    })
}

fn row_to_passkey(row: &sqlx::sqlite::SqliteRow) -> EngineResult<PasskeyCredential> {
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    let last_used_at: Option<String> = row
        .try_get("last_used_at")
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    Ok(PasskeyCredential {
        credential_id: row
            .try_get("credential_id")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        public_key: row
            .try_get("public_key")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        counter: row
            .try_get::<i64, _>("counter")
            .map_err(|e| EngineError::Storage(e.to_string()))? as u32,
        name: row
            .try_get("name")
            .map_err(|e| EngineError::Storage(e.to_string()))?,
        created_at: parse_dt(&created_at)?,
        last_used_at: last_used_at.map(|s| parse_dt(&s)).transpose()?,
    })
}
