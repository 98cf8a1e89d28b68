//! In-memory `RepoStore` used only by this crate's own tests. Real storage
//! backends live in `accteng-storage-sqlite`; this crate can't depend on that
//! (it would be circular through `accteng-server`), so tests get their own
//! minimal stand-in.

use std::collections::HashMap;
use std::sync::Mutex;

use accteng_core::error::EngineResult;
use accteng_core::traits::RepoStore;
use accteng_core::types::RepoState;
use async_trait::async_trait;

#[derive(Default)]
struct Inner {
    blocks: HashMap<Vec<u8>, Vec<u8>>,
    root_cid: Option<Vec<u8>>,
    rev: Option<String>,
    seq: u64,
    active: bool,
    record_blobs: HashMap<String, Vec<String>>,
    imported_blobs: HashMap<String, (i64, String)>,
    last_tid: Option<String>,
}

/// Single-DID, single-process `RepoStore` backed by a `Mutex<HashMap>`.
/// Good enough to exercise `accteng-repo`'s own logic; not meant to survive
/// a process restart or handle concurrent DIDs.
#[derive(Default)]
pub struct InMemoryRepoStore {
    inner: Mutex<Inner>,
}

impl InMemoryRepoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepoStore for InMemoryRepoStore {
    async fn get_block(&self, _did: &str, cid: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().unwrap().blocks.get(cid).cloned())
    }

    async fn put_block(&self, _did: &str, cid: &[u8], _rev: &str, block: &[u8]) -> EngineResult<()> {
        self.inner
            .lock()
            .unwrap()
            .blocks
            .insert(cid.to_vec(), block.to_vec());
        Ok(())
    }

    async fn put_many(
        &self,
        _did: &str,
        _rev: &str,
        blocks: &[(Vec<u8>, Vec<u8>)],
    ) -> EngineResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for (cid, block) in blocks {
            inner.blocks.insert(cid.clone(), block.clone());
        }
        Ok(())
    }

    async fn has_block(&self, _did: &str, cid: &[u8]) -> EngineResult<bool> {
        Ok(self.inner.lock().unwrap().blocks.contains_key(cid))
    }

    async fn get_all_blocks(&self, _did: &str) -> EngineResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .blocks
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete_blocks(&self, _did: &str, cids: &[Vec<u8>]) -> EngineResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for cid in cids {
            inner.blocks.remove(cid);
        }
        Ok(())
    }

    async fn delete_blocks_for_did(&self, _did: &str) -> EngineResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let n = inner.blocks.len() as u64;
        inner.blocks.clear();
        Ok(n)
    }

    async fn apply_commit(
        &self,
        _did: &str,
        commit_cid: &[u8],
        rev: &str,
        new_blocks: &[(Vec<u8>, Vec<u8>)],
        removed_cids: &[Vec<u8>],
    ) -> EngineResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for (cid, block) in new_blocks {
            inner.blocks.insert(cid.clone(), block.clone());
        }
        for cid in removed_cids {
            inner.blocks.remove(cid);
        }
        inner.root_cid = Some(commit_cid.to_vec());
        inner.rev = Some(rev.to_string());
        inner.seq += 1;
        Ok(())
    }

    async fn get_repo_state(&self, _did: &str) -> EngineResult<RepoState> {
        let inner = self.inner.lock().unwrap();
        Ok(RepoState {
            root_cid: inner.root_cid.clone(),
            rev: inner.rev.clone(),
            seq: inner.seq,
            active: inner.active,
        })
    }

    async fn set_active(&self, _did: &str, active: bool) -> EngineResult<()> {
        self.inner.lock().unwrap().active = active;
        Ok(())
    }

    async fn add_record_blob(&self, record_uri: &str, blob_cid: &str) -> EngineResult<()> {
        self.inner
            .lock()
            .unwrap()
            .record_blobs
            .entry(record_uri.to_string())
            .or_default()
            .push(blob_cid.to_string());
        Ok(())
    }

    async fn remove_record_blobs(&self, record_uri: &str) -> EngineResult<()> {
        self.inner.lock().unwrap().record_blobs.remove(record_uri);
        Ok(())
    }

    async fn track_imported_blob(&self, cid: &str, size: i64, mime: &str) -> EngineResult<()> {
        self.inner
            .lock()
            .unwrap()
            .imported_blobs
            .insert(cid.to_string(), (size, mime.to_string()));
        Ok(())
    }

    async fn is_blob_imported(&self, cid: &str) -> EngineResult<bool> {
        Ok(self.inner.lock().unwrap().imported_blobs.contains_key(cid))
    }

    async fn count_expected_blobs(&self) -> EngineResult<u64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .record_blobs
            .values()
            .map(|v| v.len() as u64)
            .sum())
    }

    async fn count_imported_blobs(&self) -> EngineResult<u64> {
        Ok(self.inner.lock().unwrap().imported_blobs.len() as u64)
    }

    async fn list_missing_blobs(
        &self,
        limit: usize,
        _cursor: Option<&str>,
    ) -> EngineResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let missing: Vec<String> = inner
            .record_blobs
            .values()
            .flatten()
            .filter(|cid| !inner.imported_blobs.contains_key(cid.as_str()))
            .take(limit)
            .cloned()
            .collect();
        Ok(missing)
    }

    async fn save_last_tid(&self, _did: &str, tid: &str) -> EngineResult<()> {
        self.inner.lock().unwrap().last_tid = Some(tid.to_string());
        Ok(())
    }

    async fn load_last_tid(&self, _did: &str) -> EngineResult<Option<String>> {
        Ok(self.inner.lock().unwrap().last_tid.clone())
    }
}
