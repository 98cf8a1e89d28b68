use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use accteng_core::error::{EngineError, EngineResult};
use accteng_core::traits::RepoStore;
use accteng_core::types::RepoState;

#[derive(Clone)]
pub struct SqliteRepoStore {
    pool: SqlitePool,
}

impl SqliteRepoStore {
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
impl RepoStore for SqliteRepoStore {
    async fn get_block(&self, did: &str, cid: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT block FROM repo_block WHERE did = ? AND cid = ?")
            .bind(did)
            .bind(cid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        match row {
            Some(ref r) => {
                let block: Vec<u8> = r
                    .try_get("block")
                    .map_err(|e| EngineError::Storage(e.to_string()))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    async fn put_block(&self, did: &str, cid: &[u8], rev: &str, block: &[u8]) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO repo_block (did, cid, rev, block) VALUES (?, ?, ?, ?)",
        )
        .bind(did)
        .bind(cid)
        .bind(rev)
        .bind(block)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn put_many(
        &self,
        did: &str,
        rev: &str,
        blocks: &[(Vec<u8>, Vec<u8>)],
    ) -> EngineResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        for (cid, block) in blocks {
            sqlx::query(
                "INSERT OR IGNORE INTO repo_block (did, cid, rev, block) VALUES (?, ?, ?, ?)",
            )
            .bind(did)
            .bind(cid)
            .bind(rev)
            .bind(block)
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn has_block(&self, did: &str, cid: &[u8]) -> EngineResult<bool> {
        let row = sqlx::query("SELECT 1 FROM repo_block WHERE did = ? AND cid = ?")
            .bind(did)
            .bind(cid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        Ok(row.is_some())
    }

    async fn get_all_blocks(&self, did: &str) -> EngineResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let rows = sqlx::query("SELECT cid, block FROM repo_block WHERE did = ?")
            .bind(did)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let mut blocks = Vec::with_capacity(rows.len());
        for row in &rows {
            let cid: Vec<u8> = row
                .try_get("cid")
                .map_err(|e| EngineError::Storage(e.to_string()))?;
            let block: Vec<u8> = row
                .try_get("block")
                .map_err(|e| EngineError::Storage(e.to_string()))?;
            blocks.push((cid, block));
        }
        Ok(blocks)
    }

    async fn delete_blocks(&self, did: &str, cids: &[Vec<u8>]) -> EngineResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        for cid in cids {
            sqlx::query("DELETE FROM repo_block WHERE did = ? AND cid = ?")
                .bind(did)
                .bind(cid)
                .execute(&mut *tx)
                .await
                .map_err(|e| EngineError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_blocks_for_did(&self, did: &str) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM repo_block WHERE did = ?")
            .bind(did)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn apply_commit(
        &self,
        did: &str,
        commit_cid: &[u8],
        rev: &str,
        new_blocks: &[(Vec<u8>, Vec<u8>)],
        removed_cids: &[Vec<u8>],
    ) -> EngineResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        for (cid, block) in new_blocks {
            sqlx::query(
                "INSERT OR IGNORE INTO repo_block (did, cid, rev, block) VALUES (?, ?, ?, ?)",
            )
            .bind(did)
            .bind(cid)
            .bind(rev)
            .bind(block)
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        }

        for cid in removed_cids {
            sqlx::query("DELETE FROM repo_block WHERE did = ? AND cid = ?")
                .bind(did)
                .bind(cid)
                .execute(&mut *tx)
                .await
                .map_err(|e| EngineError::Storage(e.to_string()))?;
        }

        sqlx::query(
            "INSERT INTO repo_state (did, root_cid, rev, seq, active) VALUES (?, ?, ?, 0, 0)
             ON CONFLICT(did) DO UPDATE SET root_cid = excluded.root_cid, rev = excluded.rev",
        )
        .bind(did)
        .bind(commit_cid)
        .bind(rev)
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_repo_state(&self, did: &str) -> EngineResult<RepoState> {
        let row = sqlx::query("SELECT root_cid, rev, seq, active FROM repo_state WHERE did = ?")
            .bind(did)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        match row {
            Some(r) => {
                let root_cid: Option<Vec<u8>> = r
                    .try_get("root_cid")
                    .map_err(|e| EngineError::Storage(e.to_string()))?;
                let rev: Option<String> = r
                    .try_get("rev")
                    .map_err(|e| EngineError::Storage(e.to_string()))?;
                let seq: i64 = r
                    .try_get("seq")
                    .map_err(|e| EngineError::Storage(e.to_string()))?;
                let active: i64 = r
                    .try_get("active")
                    .map_err(|e| EngineError::Storage(e.to_string()))?;

                Ok(RepoState {
                    root_cid,
                    rev,
                    seq: seq as u64,
                    active: active != 0,
                })
            }
            None => Ok(RepoState {
                root_cid: None,
                rev: None,
                seq: 0,
                active: false,
            }),
        }
    }

    async fn set_active(&self, did: &str, active: bool) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO repo_state (did, seq, active) VALUES (?, 0, ?)
             ON CONFLICT(did) DO UPDATE SET active = excluded.active",
        )
        .bind(did)
        .bind(active as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn add_record_blob(&self, record_uri: &str, blob_cid: &str) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO record_blob (record_uri, blob_cid) VALUES (?, ?)",
        )
        .bind(record_uri)
        .bind(blob_cid)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn remove_record_blobs(&self, record_uri: &str) -> EngineResult<()> {
        sqlx::query("DELETE FROM record_blob WHERE record_uri = ?")
            .bind(record_uri)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn track_imported_blob(&self, cid: &str, size: i64, mime: &str) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO imported_blob (cid, size, mime) VALUES (?, ?, ?)",
        )
        .bind(cid)
        .bind(size)
        .bind(mime)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn is_blob_imported(&self, cid: &str) -> EngineResult<bool> {
        let row = sqlx::query("SELECT 1 FROM imported_blob WHERE cid = ?")
            .bind(cid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn count_expected_blobs(&self) -> EngineResult<u64> {
        let row = sqlx::query("SELECT COUNT(DISTINCT blob_cid) as n FROM record_blob")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(n as u64)
    }

    async fn count_imported_blobs(&self) -> EngineResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM imported_blob")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(n as u64)
    }

    async fn list_missing_blobs(
        &self,
        limit: usize,
        cursor: Option<&str>,
    ) -> EngineResult<Vec<String>> {
        let rows = if let Some(cursor) = cursor {
            sqlx::query(
                "SELECT DISTINCT rb.blob_cid FROM record_blob rb
                 LEFT JOIN imported_blob ib ON rb.blob_cid = ib.cid
                 WHERE ib.cid IS NULL AND rb.blob_cid > ?
                 ORDER BY rb.blob_cid ASC LIMIT ?",
            )
            .bind(cursor)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?
        } else {
            sqlx::query(
                "SELECT DISTINCT rb.blob_cid FROM record_blob rb
                 LEFT JOIN imported_blob ib ON rb.blob_cid = ib.cid
                 WHERE ib.cid IS NULL
                 ORDER BY rb.blob_cid ASC LIMIT ?",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?
        };

        rows.iter()
            .map(|r| {
                r.try_get::<String, _>("blob_cid")
                    .map_err(|e| EngineError::Storage(e.to_string()))
            })
            .collect()
    }

    async fn save_last_tid(&self, did: &str, tid: &str) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO last_tid (did, tid) VALUES (?, ?)
             ON CONFLICT(did) DO UPDATE SET tid = excluded.tid",
        )
        .bind(did)
        .bind(tid)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn load_last_tid(&self, did: &str) -> EngineResult<Option<String>> {
        let row = sqlx::query("SELECT tid FROM last_tid WHERE did = ?")
            .bind(did)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        match row {
            Some(r) => {
                let tid: String = r
                    .try_get("tid")
                    .map_err(|e| EngineError::Storage(e.to_string()))?;
                Ok(Some(tid))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteRepoStore {
        SqliteRepoStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn apply_commit_is_atomic_and_advances_state() {
        let store = test_store().await;
        let did = "did:web:example.com";

        store
            .apply_commit(
                did,
                b"commit-cid-1",
                "3jzfcijpj2z2a",
                &[(b"block-a".to_vec(), b"block-a-bytes".to_vec())],
                &[],
            )
            .await
            .unwrap();

        let state = store.get_repo_state(did).await.unwrap();
        assert_eq!(state.root_cid, Some(b"commit-cid-1".to_vec()));
        assert_eq!(state.rev.as_deref(), Some("3jzfcijpj2z2a"));
        assert!(store.has_block(did, b"block-a").await.unwrap());
    }

    #[tokio::test]
    async fn apply_commit_removes_superseded_blocks() {
        let store = test_store().await;
        let did = "did:web:example.com";

        store
            .apply_commit(
                did,
                b"commit-1",
                "rev1",
                &[(b"leaf-1".to_vec(), b"v1".to_vec())],
                &[],
            )
            .await
            .unwrap();
        store
            .apply_commit(
                did,
                b"commit-2",
                "rev2",
                &[(b"leaf-2".to_vec(), b"v2".to_vec())],
                &[b"leaf-1".to_vec()],
            )
            .await
            .unwrap();

        assert!(!store.has_block(did, b"leaf-1").await.unwrap());
        assert!(store.has_block(did, b"leaf-2").await.unwrap());
    }

    #[tokio::test]
    async fn missing_blobs_excludes_imported() {
        let store = test_store().await;
        store.add_record_blob("at://did/a/1", "cidA").await.unwrap();
        store.add_record_blob("at://did/a/2", "cidB").await.unwrap();
        store
            .track_imported_blob("cidA", 100, "image/png")
            .await
            .unwrap();

        let missing = store.list_missing_blobs(10, None).await.unwrap();
        assert_eq!(missing, vec!["cidB".to_string()]);
        assert_eq!(store.count_expected_blobs().await.unwrap(), 2);
        assert_eq!(store.count_imported_blobs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn last_tid_roundtrips() {
        let store = test_store().await;
        let did = "did:web:example.com";
        assert_eq!(store.load_last_tid(did).await.unwrap(), None);
        store.save_last_tid(did, "3jzfcijpj2z2a").await.unwrap();
        assert_eq!(
            store.load_last_tid(did).await.unwrap(),
            Some("3jzfcijpj2z2a".to_string())
        );
    }
}
