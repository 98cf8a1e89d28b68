use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use accteng_core::error::{EngineError, EngineResult};
use accteng_core::traits::EventStore;
use accteng_core::PersistedEvent;

#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
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
impl EventStore for SqliteEventStore {
    async fn append_event(&self, seq: i64, event_type: &str, payload: &[u8]) -> EngineResult<()> {
        sqlx::query("INSERT INTO firehose_event (seq, event_type, payload) VALUES (?, ?, ?)")
            .bind(seq)
            .bind(event_type)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn get_events_after(
        &self,
        after_seq: i64,
        limit: usize,
    ) -> EngineResult<Vec<PersistedEvent>> {
        let rows = sqlx::query(
            "SELECT seq, event_type, payload FROM firehose_event WHERE seq > ? ORDER BY seq ASC LIMIT ?",
        )
        .bind(after_seq)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;

        rows.iter()
            .map(|r| {
                Ok(PersistedEvent {
                    seq: r
                        .try_get("seq")
                        .map_err(|e| EngineError::Storage(e.to_string()))?,
                    event_type: r
                        .try_get("event_type")
                        .map_err(|e| EngineError::Storage(e.to_string()))?,
                    payload: r
                        .try_get("payload")
                        .map_err(|e| EngineError::Storage(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn get_max_seq(&self) -> EngineResult<i64> {
        let row = sqlx::query("SELECT COALESCE(MAX(seq), 0) as max_seq FROM firehose_event")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        row.try_get("max_seq")
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    async fn prune(&self, keep_last: i64) -> EngineResult<u64> {
        let result = sqlx::query(
            "DELETE FROM firehose_event WHERE seq <= (SELECT COALESCE(MAX(seq), 0) - ? FROM firehose_event)",
        )
        .bind(keep_last)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
