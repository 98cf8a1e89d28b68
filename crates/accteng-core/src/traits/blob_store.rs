use async_trait::async_trait;
use bytes::Bytes;

use crate::error::EngineResult;

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn put_blob(
        &self,
        did: &str,
        cid: &str,
        data: Bytes,
        mime_type: &str,
    ) -> EngineResult<()>;
    async fn get_blob(&self, did: &str, cid: &str) -> EngineResult<Option<(Bytes, String)>>;
    async fn has_blob(&self, did: &str, cid: &str) -> EngineResult<bool>;
    async fn delete_blob(&self, did: &str, cid: &str) -> EngineResult<()>;
    async fn list_blobs(
        &self,
        did: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> EngineResult<Vec<String>>;
}
