use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::RepoState;

/// Durable storage for content-addressed blocks, the singleton `RepoState`,
/// and the record-blob reference index (§4.1). Exactly one instance backs
/// one engine; the `did`-scoped signature below is kept from the donor's
/// per-row schema for continuity even though only one DID value ever
/// appears, so block rows stay self-describing on disk.
#[async_trait]
pub trait RepoStore: Send + Sync + 'static {
    async fn get_block(&self, did: &str, cid: &[u8]) -> EngineResult<Option<Vec<u8>>>;
    async fn put_block(&self, did: &str, cid: &[u8], rev: &str, block: &[u8]) -> EngineResult<()>;
    async fn put_many(
        &self,
        did: &str,
        rev: &str,
        blocks: &[(Vec<u8>, Vec<u8>)],
    ) -> EngineResult<()>;
    async fn has_block(&self, did: &str, cid: &[u8]) -> EngineResult<bool>;
    async fn get_all_blocks(&self, did: &str) -> EngineResult<Vec<(Vec<u8>, Vec<u8>)>>;
    async fn delete_blocks(&self, did: &str, cids: &[Vec<u8>]) -> EngineResult<()>;
    async fn delete_blocks_for_did(&self, did: &str) -> EngineResult<u64>;

    /// Atomically insert `new_blocks`, delete `removed_cids`, and advance the
    /// `RepoState` root/rev pointer, all within one transaction (§4.1).
    async fn apply_commit(
        &self,
        did: &str,
        commit_cid: &[u8],
        rev: &str,
        new_blocks: &[(Vec<u8>, Vec<u8>)],
        removed_cids: &[Vec<u8>],
    ) -> EngineResult<()>;

    async fn get_repo_state(&self, did: &str) -> EngineResult<RepoState>;
    async fn set_active(&self, did: &str, active: bool) -> EngineResult<()>;

    // Blob-reference index.
    async fn add_record_blob(&self, record_uri: &str, blob_cid: &str) -> EngineResult<()>;
    async fn remove_record_blobs(&self, record_uri: &str) -> EngineResult<()>;
    async fn track_imported_blob(&self, cid: &str, size: i64, mime: &str) -> EngineResult<()>;
    async fn is_blob_imported(&self, cid: &str) -> EngineResult<bool>;
    async fn count_expected_blobs(&self) -> EngineResult<u64>;
    async fn count_imported_blobs(&self) -> EngineResult<u64>;
    async fn list_missing_blobs(
        &self,
        limit: usize,
        cursor: Option<&str>,
    ) -> EngineResult<Vec<String>>;

    /// Persist the last-issued TID so allocation never regresses across
    /// hibernation (§4.2 ordering rule).
    async fn save_last_tid(&self, did: &str, tid: &str) -> EngineResult<()>;
    async fn load_last_tid(&self, did: &str) -> EngineResult<Option<String>>;
}
