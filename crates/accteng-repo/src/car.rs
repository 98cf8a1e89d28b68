use std::sync::Arc;

use accteng_core::error::{EngineError, EngineResult};
use accteng_core::traits::RepoStore;
use accteng_core::types::CommitDescriptor;
use atrium_repo::blockstore::{AsyncBlockStoreRead, AsyncBlockStoreWrite, CarStore, SHA2_256};
use atrium_repo::{Cid, Repository};
use futures::TryStreamExt;

use crate::blockstore_adapter::{RepoStoreAdapter, cid_from_bytes, cid_to_bytes};

const MAX_IMPORT_BYTES: usize = 100 * 1024 * 1024;

/// Encode a CAR (v1) for exactly the blocks a commit added, with the new
/// commit CID as the single root. This is what the sequencer reaches for
/// when it builds the firehose frame for a write: the commit operations
/// already know their own new blocks, so there's no need to reopen the repo
/// and re-derive a diff by export-set subtraction.
pub async fn car_from_commit(commit: &CommitDescriptor) -> EngineResult<Vec<u8>> {
    let root_cid = cid_from_bytes(&commit.commit_cid)
        .map_err(|e| EngineError::Storage(format!("invalid commit CID: {e}")))?;

    let mut car_buf = Vec::new();
    let mut car_store =
        CarStore::create_with_roots(std::io::Cursor::new(&mut car_buf), [root_cid])
            .await
            .map_err(|e| EngineError::Storage(format!("failed to create CAR: {e}")))?;

    for (cid_bytes, block) in &commit.new_blocks {
        let cid = cid_from_bytes(cid_bytes)
            .map_err(|e| EngineError::Storage(format!("invalid block CID: {e}")))?;
        car_store
            .write_block(cid.codec(), SHA2_256, block)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to write block to CAR: {e}")))?;
    }

    drop(car_store);
    Ok(car_buf)
}

/// Export the full repository as a CAR file (v1).
///
/// The CAR file contains the commit root as the single root CID,
/// followed by all blocks in the repository (commit, MST nodes, record blocks).
pub async fn export_full_car(
    store: Arc<dyn RepoStore>,
    did: &str,
    current_root: &[u8],
) -> EngineResult<Vec<u8>> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| EngineError::Storage(format!("invalid root CID: {e}")))?;

    // Open the repository to get the list of all CIDs to export
    let cids = {
        let mut repo = Repository::open(&mut adapter, root_cid)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to open repo: {e}")))?;

        // export() returns an iterator of all CIDs in the repo (commit + MST + records)
        repo.export()
            .await
            .map_err(|e| EngineError::Storage(format!("failed to export repo CIDs: {e}")))?
            .collect::<Vec<_>>()
    };
    // repo is dropped, adapter is available again

    // Create a CAR file in memory with the root CID
    let mut car_buf = Vec::new();
    let mut car_store =
        CarStore::create_with_roots(std::io::Cursor::new(&mut car_buf), [root_cid])
            .await
            .map_err(|e| EngineError::Storage(format!("failed to create CAR: {e}")))?;

    // Write each block into the CAR
    for cid in cids {
        let block = adapter
            .read_block(cid)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to read block {cid}: {e}")))?;

        car_store
            .write_block(cid.codec(), SHA2_256, &block)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to write block to CAR: {e}")))?;
    }

    // The car_store borrows car_buf via Cursor; drop it to release the borrow
    drop(car_store);

    Ok(car_buf)
}

/// Generate a diff CAR containing only blocks changed since a given revision.
///
/// This compares the current repo state with a previous commit CID and returns
/// a CAR file containing only the new/changed blocks. Used for `getRepo`
/// requests that name an older `since` rev; the firehose path uses
/// [`car_from_commit`] instead, since it already has the new blocks in hand.
///
/// If `since_root` is `None`, this behaves identically to `export_full_car`.
pub async fn generate_diff_car(
    store: Arc<dyn RepoStore>,
    did: &str,
    current_root: &[u8],
    since_root: Option<&[u8]>,
) -> EngineResult<Vec<u8>> {
    let since_cid = match since_root {
        Some(bytes) => cid_from_bytes(bytes)
            .map_err(|e| EngineError::Storage(format!("invalid since CID: {e}")))?,
        None => return export_full_car(store, did, current_root).await,
    };

    let current_cid = cid_from_bytes(current_root)
        .map_err(|e| EngineError::Storage(format!("invalid current root CID: {e}")))?;

    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let current_cids = {
        let mut repo = Repository::open(&mut adapter, current_cid)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to open current repo: {e}")))?;

        repo.export()
            .await
            .map_err(|e| EngineError::Storage(format!("failed to export current CIDs: {e}")))?
            .collect::<std::collections::HashSet<_>>()
    };

    let previous_cids = {
        let mut repo = Repository::open(&mut adapter, since_cid)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to open previous repo: {e}")))?;

        repo.export()
            .await
            .map_err(|e| EngineError::Storage(format!("failed to export previous CIDs: {e}")))?
            .collect::<std::collections::HashSet<_>>()
    };

    let diff_cids: Vec<Cid> = current_cids.difference(&previous_cids).copied().collect();

    let mut car_buf = Vec::new();
    let mut car_store =
        CarStore::create_with_roots(std::io::Cursor::new(&mut car_buf), [current_cid])
            .await
            .map_err(|e| EngineError::Storage(format!("failed to create diff CAR: {e}")))?;

    for cid in diff_cids {
        let block = adapter
            .read_block(cid)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to read block {cid}: {e}")))?;

        car_store
            .write_block(cid.codec(), SHA2_256, &block)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to write block to CAR: {e}")))?;
    }

    drop(car_store);

    Ok(car_buf)
}

/// Outcome of a successful [`import_car`]: the rebuilt root and rev, plus
/// every blob CID referenced from the imported records, so the caller can
/// seed the blob-reference index before flipping the repo active.
pub struct ImportOutcome {
    pub root_cid: Vec<u8>,
    pub rev: String,
    pub blob_refs: Vec<(String, String)>,
}

/// Import a full repository from a CAR file (§4.2). Permitted only when the
/// target repo is empty and inactive. Verifies the root commit's signature,
/// persists every block via `apply_commit`, then walks the MST to recover
/// the collection index (implicit in path keys) and the blob-reference
/// edges needed to populate the blob index.
pub async fn import_car(
    store: Arc<dyn RepoStore>,
    did: &str,
    signing_key: &accteng_crypto::SigningKey,
    car_bytes: &[u8],
) -> EngineResult<ImportOutcome> {
    if car_bytes.len() > MAX_IMPORT_BYTES {
        return Err(EngineError::RepoTooLarge);
    }

    let state = store.get_repo_state(did).await?;
    if state.root_cid.is_some() {
        return Err(EngineError::RepoAlreadyExists);
    }
    if state.active {
        return Err(EngineError::RepoAlreadyExists);
    }

    let mut reader = CarStore::open(std::io::Cursor::new(car_bytes.to_vec()))
        .await
        .map_err(|e| EngineError::InvalidRequest(format!("invalid CAR file: {e}")))?;

    let root_cid = *reader
        .roots()
        .first()
        .ok_or_else(|| EngineError::InvalidRequest("CAR file has no root".to_string()))?;

    let cids = {
        let mut repo = Repository::open(&mut reader, root_cid)
            .await
            .map_err(|e| EngineError::InvalidRequest(format!("CAR does not contain a valid repo: {e}")))?;
        repo.export()
            .await
            .map_err(|e| EngineError::InvalidRequest(format!("failed to walk CAR blocks: {e}")))?
            .collect::<Vec<_>>()
    };

    let mut blocks = Vec::with_capacity(cids.len());
    for cid in cids {
        let block = reader
            .read_block(cid)
            .await
            .map_err(|e| EngineError::InvalidRequest(format!("failed to read CAR block: {e}")))?;
        blocks.push((cid_to_bytes(&cid), block));
    }

    // Verify DID and signature against the CAR's own blocks before anything
    // touches the store: an import that fails either check must leave no
    // trace, so nothing is written via `put_block` until both pass.
    {
        let mut reader_repo = Repository::open(&mut reader, root_cid)
            .await
            .map_err(|e| EngineError::InvalidRequest(format!("CAR does not contain a valid repo: {e}")))?;

        let did_str = reader_repo.commit().did().as_str().to_string();
        if did_str != did {
            return Err(EngineError::InvalidRequest(
                "imported commit DID does not match repo DID".to_string(),
            ));
        }

        signing_key.verify(reader_repo.commit().bytes(), reader_repo.commit().sig())?;
    }

    for (cid_bytes, block) in &blocks {
        store.put_block(did, cid_bytes, "", block).await?;
    }

    let mut adapter = RepoStoreAdapter::new(Arc::clone(&store), did.to_string());
    let mut repo = Repository::open(&mut adapter, root_cid)
        .await
        .map_err(|e| EngineError::InvalidRequest(format!("failed to open imported repo: {e}")))?;

    let rev = repo.commit().rev().to_string();

    let mut blob_refs = Vec::new();
    {
        let mut tree = repo.tree();
        let entries_stream = tree.entries_prefixed("");
        futures::pin_mut!(entries_stream);

        while let Some((key, record_cid)) = entries_stream
            .try_next()
            .await
            .map_err(|e| EngineError::Storage(format!("failed to walk imported MST: {e}")))?
        {
            let block_data = adapter
                .read_block(record_cid)
                .await
                .map_err(|e| EngineError::Storage(format!("failed to read record block: {e}")))?;
            let value: serde_json::Value = serde_ipld_dagcbor::from_reader(&block_data[..])
                .map_err(|e| EngineError::Storage(format!("failed to decode record: {e}")))?;

            let collection = key.split('/').next().unwrap_or(&key);
            let uri = format!("at://{did}/{key}");
            let _ = collection;
            collect_blob_refs(&value, &uri, &mut blob_refs);
        }
    }

    store
        .apply_commit(did, &cid_to_bytes(&root_cid), &rev, &blocks, &[])
        .await?;

    Ok(ImportOutcome {
        root_cid: cid_to_bytes(&root_cid),
        rev,
        blob_refs,
    })
}

/// Recursively walk a decoded record looking for atproto blob references
/// (`{"$type": "blob", "ref": {"$link": "<cid>"}, ...}`), collecting
/// `(record_uri, blob_cid)` pairs.
fn collect_blob_refs(value: &serde_json::Value, uri: &str, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("$type").and_then(|v| v.as_str()) == Some("blob") {
                if let Some(link) = map
                    .get("ref")
                    .and_then(|r| r.get("$link"))
                    .and_then(|l| l.as_str())
                {
                    out.push((uri.to_string(), link.to_string()));
                    return;
                }
            }
            for v in map.values() {
                collect_blob_refs(v, uri, out);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                collect_blob_refs(v, uri, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::create_record;
    use crate::test_support::InMemoryRepoStore;
    use accteng_crypto::{SigningKey, TidGenerator};
    use serde_json::json;

    async fn seeded_repo() -> (Arc<InMemoryRepoStore>, String, SigningKey, Vec<u8>) {
        let store: Arc<InMemoryRepoStore> = Arc::new(InMemoryRepoStore::new());
        let did = "did:web:alice.test".to_string();
        let key = SigningKey::generate_p256().unwrap();
        let genesis = crate::operations::create_repo(store.clone(), &did, &key)
            .await
            .unwrap();
        store
            .apply_commit(
                &did,
                &genesis.commit_cid,
                &genesis.rev,
                &genesis.new_blocks,
                &genesis.removed_cids,
            )
            .await
            .unwrap();
        (store, did, key, genesis.commit_cid)
    }

    #[tokio::test]
    async fn car_from_commit_encodes_the_commits_own_blocks() {
        let (store, did, key, root) = seeded_repo().await;
        let tid_gen = TidGenerator::new();
        let write = create_record(
            store,
            &did,
            &key,
            "app.bsky.feed.post",
            Some("first"),
            &json!({"$type": "app.bsky.feed.post", "text": "hi"}),
            &tid_gen,
            &root,
        )
        .await
        .unwrap();

        let car_bytes = car_from_commit(&write.commit).await.unwrap();
        assert!(!car_bytes.is_empty());

        let reader = CarStore::open(std::io::Cursor::new(car_bytes)).await.unwrap();
        let root_cid = cid_from_bytes(&write.commit.commit_cid).unwrap();
        assert_eq!(reader.roots().first(), Some(&root_cid));
    }

    #[tokio::test]
    async fn export_full_car_contains_every_block() {
        let (store, did, _key, root) = seeded_repo().await;
        let car_bytes = export_full_car(store.clone(), &did, &root).await.unwrap();
        assert!(!car_bytes.is_empty());

        let all_blocks = store.get_all_blocks(&did).await.unwrap();
        // The CAR must be at least as large as the raw sum of block bytes
        // (it also carries CID + varint framing per block).
        let raw_total: usize = all_blocks.iter().map(|(_, b)| b.len()).sum();
        assert!(car_bytes.len() >= raw_total);
    }

    #[tokio::test]
    async fn generate_diff_car_without_since_matches_full_export() {
        let (store, did, _key, root) = seeded_repo().await;
        let full = export_full_car(store.clone(), &did, &root).await.unwrap();
        let diff = generate_diff_car(store, &did, &root, None).await.unwrap();
        assert_eq!(full.len(), diff.len());
    }

    #[tokio::test]
    async fn generate_diff_car_with_since_is_smaller_than_full_export() {
        let (store, did, key, root) = seeded_repo().await;
        let tid_gen = TidGenerator::new();
        let write = create_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.feed.post",
            Some("only"),
            &json!({"$type": "app.bsky.feed.post", "text": "diff me"}),
            &tid_gen,
            &root,
        )
        .await
        .unwrap();
        store
            .apply_commit(
                &did,
                &write.commit.commit_cid,
                &write.commit.rev,
                &write.commit.new_blocks,
                &write.commit.removed_cids,
            )
            .await
            .unwrap();

        let full = export_full_car(store.clone(), &did, &write.commit.commit_cid)
            .await
            .unwrap();
        let diff = generate_diff_car(store, &did, &write.commit.commit_cid, Some(&root))
            .await
            .unwrap();
        assert!(diff.len() < full.len());
    }

    #[tokio::test]
    async fn import_car_round_trips_into_an_empty_repo() {
        let (store, did, key, root) = seeded_repo().await;
        let car_bytes = export_full_car(store, &did, &root).await.unwrap();

        let target: Arc<InMemoryRepoStore> = Arc::new(InMemoryRepoStore::new());
        let outcome = import_car(target.clone(), &did, &key, &car_bytes).await.unwrap();
        assert_eq!(outcome.root_cid, root);

        let state = target.get_repo_state(&did).await.unwrap();
        assert_eq!(state.root_cid, Some(root));
    }

    #[tokio::test]
    async fn import_car_rejects_an_already_seeded_repo() {
        let (store, did, key, root) = seeded_repo().await;
        let car_bytes = export_full_car(store.clone(), &did, &root).await.unwrap();

        let err = import_car(store, &did, &key, &car_bytes).await.unwrap_err();
        assert!(matches!(err, EngineError::RepoAlreadyExists));
    }

    #[tokio::test]
    async fn import_car_rejects_oversized_payloads() {
        let (_store, did, key, _root) = seeded_repo().await;
        let target: Arc<InMemoryRepoStore> = Arc::new(InMemoryRepoStore::new());
        let oversized = vec![0u8; MAX_IMPORT_BYTES + 1];
        let err = import_car(target, &did, &key, &oversized).await.unwrap_err();
        assert!(matches!(err, EngineError::RepoTooLarge));
    }
}
