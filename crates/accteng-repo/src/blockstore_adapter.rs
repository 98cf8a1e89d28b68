use std::sync::Arc;

use accteng_core::traits::RepoStore;
use atrium_repo::blockstore::{AsyncBlockStoreRead, AsyncBlockStoreWrite, SHA2_256};
use atrium_repo::{Cid, Multihash};
use sha2::{Digest, Sha256};

/// Adapter that bridges our [`RepoStore`] trait to atrium-repo's blockstore
/// traits, scoped to the engine's one DID.
///
/// Writes are buffered in memory rather than applied to the store
/// immediately: §4.1 requires `apply_commit` to insert every new block and
/// advance the repo pointer as one atomic unit, so nothing observable may
/// reach `RepoStore` until the caller has a complete, signed commit to hand
/// to `apply_commit`. Reads fall through to the buffer first so a write can
/// be read back within the same operation before it is persisted.
pub struct RepoStoreAdapter {
    store: Arc<dyn RepoStore>,
    did: String,
    pending: Vec<(Vec<u8>, Vec<u8>)>,
}

impl RepoStoreAdapter {
    pub fn new(store: Arc<dyn RepoStore>, did: String) -> Self {
        Self {
            store,
            did,
            pending: Vec::new(),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &dyn RepoStore {
        self.store.as_ref()
    }

    /// Returns the DID this adapter is scoped to.
    pub fn did(&self) -> &str {
        &self.did
    }

    /// Drain and return every block buffered by `write_block` so far. Called
    /// once an operation has a finalized, signed commit to persist via
    /// `RepoStore::apply_commit`.
    pub fn take_pending_blocks(&mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        std::mem::take(&mut self.pending)
    }
}

/// Convert an `ipld_core::cid::Cid` to its byte representation for storage.
pub fn cid_to_bytes(cid: &Cid) -> Vec<u8> {
    cid.to_bytes()
}

/// Convert stored CID bytes back to an `ipld_core::cid::Cid`.
pub fn cid_from_bytes(bytes: &[u8]) -> Result<Cid, String> {
    Cid::read_bytes(std::io::Cursor::new(bytes)).map_err(|e| format!("invalid CID bytes: {e}"))
}

/// Compute a CID from codec, multihash code, and content bytes.
///
/// Only SHA2-256 is supported (multihash code 0x12).
fn compute_cid(
    codec: u64,
    hash_code: u64,
    contents: &[u8],
) -> Result<Cid, atrium_repo::blockstore::Error> {
    if hash_code != SHA2_256 {
        return Err(atrium_repo::blockstore::Error::UnsupportedHash(hash_code));
    }
    let digest = Sha256::digest(contents);
    let mh = Multihash::wrap(hash_code, digest.as_slice())
        .map_err(|e| atrium_repo::blockstore::Error::Other(Box::new(e)))?;
    Ok(Cid::new_v1(codec, mh))
}

impl AsyncBlockStoreRead for RepoStoreAdapter {
    async fn read_block_into(
        &mut self,
        cid: Cid,
        contents: &mut Vec<u8>,
    ) -> Result<(), atrium_repo::blockstore::Error> {
        let cid_bytes = cid_to_bytes(&cid);

        if let Some((_, block)) = self.pending.iter().rev().find(|(c, _)| *c == cid_bytes) {
            contents.extend_from_slice(block);
            return Ok(());
        }

        let data = self
            .store
            .get_block(&self.did, &cid_bytes)
            .await
            .map_err(|e| atrium_repo::blockstore::Error::Other(Box::new(e)))?;

        match data {
            Some(block) => {
                contents.extend_from_slice(&block);
                Ok(())
            }
            None => Err(atrium_repo::blockstore::Error::CidNotFound),
        }
    }
}

impl AsyncBlockStoreWrite for RepoStoreAdapter {
    async fn write_block(
        &mut self,
        codec: u64,
        hash: u64,
        contents: &[u8],
    ) -> Result<Cid, atrium_repo::blockstore::Error> {
        let cid = compute_cid(codec, hash, contents)?;
        let cid_bytes = cid_to_bytes(&cid);
        self.pending.push((cid_bytes, contents.to_vec()));
        Ok(cid)
    }
}
