use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use accteng_core::error::{EngineError, EngineResult};
use accteng_core::traits::AccountStore;
use accteng_core::types::{AccountStatus, EngineAccount, RefreshTokenRecord};

#[derive(Clone)]
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

/// Parse a SQLite datetime text string into a chrono DateTime<Utc>.
///
/// SQLite stores datetimes as TEXT in the format produced by
/// `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')`, which yields strings like
/// `2025-01-01T00:00:00.000Z`.
fn parse_datetime(s: &str) -> Result<chrono::DateTime<Utc>, EngineError> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Err(EngineError::Storage(format!(
        "failed to parse datetime: {s}"
    )))
}

fn parse_datetime_opt(s: Option<&str>) -> Result<Option<chrono::DateTime<Utc>>, EngineError> {
    match s {
        Some(s) => Ok(Some(parse_datetime(s)?)),
        None => Ok(None),
    }
}

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<EngineAccount, EngineError> {
    let did: String = row
        .try_get("did")
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    let handle: String = row
        .try_get("handle")
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    let password_hash: String = row
        .try_get("password_hash")
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    let signing_key: Vec<u8> = row
        .try_get("signing_key")
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    let deactivated_at: Option<String> = row
        .try_get("deactivated_at")
        .map_err(|e| EngineError::Storage(e.to_string()))?;

    let status = if deactivated_at.is_some() {
        AccountStatus::Deactivated
    } else {
        AccountStatus::Active
    };

    Ok(EngineAccount {
        did,
        handle,
        password_hash,
        signing_key,
        created_at: parse_datetime(&created_at)?,
        status,
        deactivated_at: parse_datetime_opt(deactivated_at.as_deref())?,
    })
}

const ACCOUNT_SELECT: &str = r#"
    SELECT did, handle, password_hash, signing_key, created_at, deactivated_at
    FROM account
"#;

impl SqliteAccountStore {
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
impl AccountStore for SqliteAccountStore {
    async fn get_account(&self) -> EngineResult<Option<EngineAccount>> {
        let row = sqlx::query(ACCOUNT_SELECT)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        match row {
            Some(ref r) => Ok(Some(row_to_account(r)?)),
            None => Ok(None),
        }
    }

    async fn init_account(&self, account: &EngineAccount) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO account (did, handle, password_hash, signing_key) VALUES (?, ?, ?, ?)",
        )
        .bind(&account.did)
        .bind(&account.handle)
        .bind(&account.password_hash)
        .bind(&account.signing_key)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn update_password(&self, password_hash: &str) -> EngineResult<()> {
        sqlx::query("UPDATE account SET password_hash = ?")
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn deactivate_account(&self) -> EngineResult<()> {
        sqlx::query(
            "UPDATE account SET deactivated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn activate_account(&self) -> EngineResult<()> {
        sqlx::query("UPDATE account SET deactivated_at = NULL")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn update_handle(&self, handle: &str) -> EngineResult<()> {
        sqlx::query("UPDATE account SET handle = ?")
            .bind(handle)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_account(&self) -> EngineResult<()> {
        sqlx::query("DELETE FROM refresh_token")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        sqlx::query("DELETE FROM account")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn create_refresh_token(&self, token: &RefreshTokenRecord) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO refresh_token (id, expires_at, next_id) VALUES (?, ?, ?)",
        )
        .bind(&token.id)
        .bind(token.expires_at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .bind(&token.next_id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_refresh_token(&self, id: &str) -> EngineResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query("SELECT id, expires_at, next_id FROM refresh_token WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        match row {
            Some(ref r) => {
                let id: String = r
                    .try_get("id")
                    .map_err(|e| EngineError::Storage(e.to_string()))?;
                let expires_at: String = r
                    .try_get("expires_at")
                    .map_err(|e| EngineError::Storage(e.to_string()))?;
                let next_id: Option<String> = r
                    .try_get("next_id")
                    .map_err(|e| EngineError::Storage(e.to_string()))?;

                Ok(Some(RefreshTokenRecord {
                    id,
                    expires_at: parse_datetime(&expires_at)?,
                    next_id,
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete_refresh_token(&self, id: &str) -> EngineResult<()> {
        sqlx::query("DELETE FROM refresh_token WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_all_refresh_tokens(&self) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_token")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_account() -> EngineAccount {
        EngineAccount {
            did: "did:web:example.com".to_string(),
            handle: "example.com".to_string(),
            password_hash: "$2b$12$abcdefghijklmnopqrstuv".to_string(),
            signing_key: vec![1, 2, 3, 4],
            created_at: Utc::now(),
            status: AccountStatus::Active,
            deactivated_at: None,
        }
    }

    #[tokio::test]
    async fn init_and_get_account_roundtrips() {
        let store = SqliteAccountStore::connect("sqlite::memory:").await.unwrap();
        store.init_account(&sample_account()).await.unwrap();

        let loaded = store.get_account().await.unwrap().unwrap();
        assert_eq!(loaded.did, "did:web:example.com");
        assert_eq!(loaded.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn deactivate_then_activate_flips_status() {
        let store = SqliteAccountStore::connect("sqlite::memory:").await.unwrap();
        store.init_account(&sample_account()).await.unwrap();

        store.deactivate_account().await.unwrap();
        let loaded = store.get_account().await.unwrap().unwrap();
        assert_eq!(loaded.status, AccountStatus::Deactivated);
        assert!(loaded.deactivated_at.is_some());

        store.activate_account().await.unwrap();
        let loaded = store.get_account().await.unwrap().unwrap();
        assert_eq!(loaded.status, AccountStatus::Active);
        assert!(loaded.deactivated_at.is_none());
    }

    #[tokio::test]
    async fn update_handle_changes_stored_handle() {
        let store = SqliteAccountStore::connect("sqlite::memory:").await.unwrap();
        store.init_account(&sample_account()).await.unwrap();

        store.update_handle("new.example.com").await.unwrap();
        let loaded = store.get_account().await.unwrap().unwrap();
        assert_eq!(loaded.handle, "new.example.com");
    }

    #[tokio::test]
    async fn delete_account_clears_account_and_tokens() {
        let store = SqliteAccountStore::connect("sqlite::memory:").await.unwrap();
        store.init_account(&sample_account()).await.unwrap();
        store
            .create_refresh_token(&RefreshTokenRecord {
                id: "rt-1".to_string(),
                expires_at: Utc::now() + chrono::Duration::days(90),
                next_id: None,
            })
            .await
            .unwrap();

        store.delete_account().await.unwrap();

        assert!(store.get_account().await.unwrap().is_none());
        assert!(store.get_refresh_token("rt-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_token_lifecycle() {
        let store = SqliteAccountStore::connect("sqlite::memory:").await.unwrap();
        store.init_account(&sample_account()).await.unwrap();

        let token = RefreshTokenRecord {
            id: "rt-1".to_string(),
            expires_at: Utc::now() + chrono::Duration::days(90),
            next_id: None,
        };
        store.create_refresh_token(&token).await.unwrap();
        assert!(store.get_refresh_token("rt-1").await.unwrap().is_some());

        store.delete_refresh_token("rt-1").await.unwrap();
        assert!(store.get_refresh_token("rt-1").await.unwrap().is_none());
    }
}
