use std::sync::Arc;

use accteng_core::error::{EngineError, EngineResult};
use accteng_core::traits::RepoStore;
use accteng_core::types::{CommitDescriptor, RepoOpDescriptor};
use accteng_crypto::{SigningKey, TidGenerator};
use atrium_api::types::string::{Did, Tid};
use atrium_repo::blockstore::AsyncBlockStoreRead;
use atrium_repo::{Cid, Repository};
use futures::TryStreamExt;

use crate::blockstore_adapter::{RepoStoreAdapter, cid_from_bytes, cid_to_bytes};

/// Output returned when a record is created, updated, or put: the record's
/// own identity plus the commit that resulted from writing it. The caller
/// (the engine's single-writer path) is responsible for persisting `commit`
/// via `RepoStore::apply_commit` and handing it to the sequencer — this
/// module never touches the store except through the buffering adapter
/// (§9: the sequencer, not the repo engine, builds the diff CAR).
#[derive(Debug, Clone)]
pub struct RecordWriteOutput {
    pub uri: String,
    pub cid: Vec<u8>,
    pub commit: CommitDescriptor,
}

/// Output returned when reading a record.
#[derive(Debug, Clone)]
pub struct RecordOutput {
    pub uri: String,
    pub cid: Vec<u8>,
    pub value: serde_json::Value,
}

/// Create a new, empty repository for a DID: an empty MST and a signed
/// genesis commit. Returns the genesis `CommitDescriptor`; the caller
/// persists it via `apply_commit` before the repo is considered to exist.
pub async fn create_repo(
    store: Arc<dyn RepoStore>,
    did: &str,
    signing_key: &SigningKey,
) -> EngineResult<CommitDescriptor> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let atrium_did =
        Did::new(did.to_string()).map_err(|e| EngineError::InvalidRequest(format!("invalid DID: {e}")))?;

    let builder = Repository::create(&mut adapter, atrium_did)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to create repo: {e}")))?;

    let commit_bytes = builder.bytes();
    let sig = signing_key.sign(&commit_bytes)?;

    let repo = builder
        .finalize(sig)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to finalize repo: {e}")))?;

    let root_cid = repo.root();
    let rev = repo.commit().rev().to_string();

    Ok(CommitDescriptor {
        commit_cid: cid_to_bytes(&root_cid),
        rev,
        prev: None,
        new_blocks: adapter.take_pending_blocks(),
        removed_cids: Vec::new(),
        ops: Vec::new(),
    })
}

/// Create a new record in a repository.
///
/// If `rkey` is `None`, a new TID-based record key is generated. The record
/// is serialized as DAG-CBOR and stored in the MST at `{collection}/{rkey}`.
pub async fn create_record(
    store: Arc<dyn RepoStore>,
    did: &str,
    signing_key: &SigningKey,
    collection: &str,
    rkey: Option<&str>,
    record: &serde_json::Value,
    tid_gen: &TidGenerator,
    current_root: &[u8],
) -> EngineResult<RecordWriteOutput> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| EngineError::Storage(format!("invalid root CID: {e}")))?;

    let mut repo = Repository::open(&mut adapter, root_cid)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to open repo: {e}")))?;

    let rkey_str = match rkey {
        Some(k) => k.to_string(),
        None => tid_gen.next_tid(),
    };
    let mst_key = format!("{collection}/{rkey_str}");

    let already_present = {
        let mut tree = repo.tree();
        tree.get(&mst_key)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to check existing record: {e}")))?
    };
    if already_present.is_some() {
        return Err(EngineError::RecordAlreadyExists);
    }

    let (mut commit_builder, record_cid) = repo
        .add_raw(&mst_key, record)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to add record: {e}")))?;

    let rev_str = tid_gen.next_tid();
    let rev_tid = Tid::new(rev_str.clone())
        .map_err(|e| EngineError::InvalidRequest(format!("invalid TID: {e}")))?;
    commit_builder.rev(rev_tid);
    commit_builder.prev(root_cid);

    let commit_bytes = commit_builder.bytes();
    let sig = signing_key.sign(&commit_bytes)?;
    let new_root_cid = commit_builder
        .finalize(sig)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to finalize commit: {e}")))?;

    let uri = format!("at://{did}/{collection}/{rkey_str}");

    Ok(RecordWriteOutput {
        uri: uri.clone(),
        cid: cid_to_bytes(&record_cid),
        commit: CommitDescriptor {
            commit_cid: cid_to_bytes(&new_root_cid),
            rev: rev_str,
            prev: Some(current_root.to_vec()),
            new_blocks: adapter.take_pending_blocks(),
            removed_cids: Vec::new(),
            ops: vec![RepoOpDescriptor {
                action: "create".to_string(),
                path: format!("{collection}/{rkey_str}"),
                cid: Some(record_cid.to_string()),
            }],
        },
    })
}

/// Get a single record by its AT-URI components. Returns `None` if the
/// record does not exist.
pub async fn get_record(
    store: Arc<dyn RepoStore>,
    did: &str,
    collection: &str,
    rkey: &str,
    current_root: &[u8],
) -> EngineResult<Option<RecordOutput>> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| EngineError::Storage(format!("invalid root CID: {e}")))?;

    let maybe_cid = {
        let mut repo = Repository::open(&mut adapter, root_cid)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to open repo: {e}")))?;

        let mst_key = format!("{collection}/{rkey}");
        let mut tree = repo.tree();
        tree.get(&mst_key)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to get record from MST: {e}")))?
    };

    match maybe_cid {
        Some(record_cid) => {
            let block_data = adapter
                .read_block(record_cid)
                .await
                .map_err(|e| EngineError::Storage(format!("failed to read record block: {e}")))?;

            let value: serde_json::Value = serde_ipld_dagcbor::from_reader(&block_data[..])
                .map_err(|e| EngineError::Storage(format!("failed to decode record: {e}")))?;

            let uri = format!("at://{did}/{collection}/{rkey}");
            Ok(Some(RecordOutput {
                uri,
                cid: cid_to_bytes(&record_cid),
                value,
            }))
        }
        None => Ok(None),
    }
}

/// List records in a given collection. Returns up to `limit` records,
/// optionally starting after `cursor` (an rkey).
pub async fn list_records(
    store: Arc<dyn RepoStore>,
    did: &str,
    collection: &str,
    limit: usize,
    cursor: Option<&str>,
    current_root: &[u8],
) -> EngineResult<Vec<RecordOutput>> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| EngineError::Storage(format!("invalid root CID: {e}")))?;

    let prefix = format!("{collection}/");

    let entries: Vec<(String, Cid)> = {
        let mut repo = Repository::open(&mut adapter, root_cid)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to open repo: {e}")))?;

        let mut tree = repo.tree();
        let entries_stream = tree.entries_prefixed(&prefix);
        futures::pin_mut!(entries_stream);

        let mut collected = Vec::new();
        while let Some((key, cid)) = entries_stream
            .try_next()
            .await
            .map_err(|e| EngineError::Storage(format!("failed to iterate MST: {e}")))?
        {
            let rkey = key.strip_prefix(&prefix).unwrap_or(&key);
            if let Some(cursor_rkey) = cursor {
                if rkey <= cursor_rkey {
                    continue;
                }
            }
            collected.push((key, cid));
            if collected.len() >= limit {
                break;
            }
        }
        collected
    };

    let mut results = Vec::with_capacity(entries.len());
    for (key, record_cid) in entries {
        let rkey = key.strip_prefix(&prefix).unwrap_or(&key);
        let block_data = adapter
            .read_block(record_cid)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to read record block: {e}")))?;

        let value: serde_json::Value = serde_ipld_dagcbor::from_reader(&block_data[..])
            .map_err(|e| EngineError::Storage(format!("failed to decode record: {e}")))?;

        results.push(RecordOutput {
            uri: format!("at://{did}/{collection}/{rkey}"),
            cid: cid_to_bytes(&record_cid),
            value,
        });
    }

    Ok(results)
}

/// List the distinct collection NSIDs present in a repository by walking MST
/// leaf keys and extracting the NSID prefix. Every MST key is
/// `{collection}/{rkey}`, so the prefix before the first `/` is the
/// collection.
pub async fn list_collections(
    store: Arc<dyn RepoStore>,
    did: &str,
    current_root: &[u8],
) -> EngineResult<Vec<String>> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| EngineError::Storage(format!("invalid root CID: {e}")))?;

    let mut repo = Repository::open(&mut adapter, root_cid)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to open repo: {e}")))?;

    let mut tree = repo.tree();
    let entries_stream = tree.entries_prefixed("");
    futures::pin_mut!(entries_stream);

    let mut seen = std::collections::BTreeSet::new();
    while let Some((key, _)) = entries_stream
        .try_next()
        .await
        .map_err(|e| EngineError::Storage(format!("failed to walk MST: {e}")))?
    {
        if let Some(collection) = key.split('/').next() {
            seen.insert(collection.to_string());
        }
    }

    Ok(seen.into_iter().collect())
}

/// Build a CAR proving a record's presence or absence at `{collection}/{rkey}`.
/// The CAR carries the signed commit block, every MST structural node, and —
/// if the key is present — the record's own block; every *other* record leaf
/// is left out, since a verifier only needs the path to the one key in
/// question, not the rest of the repo.
pub async fn get_record_proof(
    store: Arc<dyn RepoStore>,
    did: &str,
    collection: &str,
    rkey: &str,
    current_root: &[u8],
) -> EngineResult<Vec<u8>> {
    use atrium_repo::blockstore::{AsyncBlockStoreWrite, CarStore, SHA2_256};

    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| EngineError::Storage(format!("invalid root CID: {e}")))?;

    let mst_key = format!("{collection}/{rkey}");

    let (target_cid, leaf_cids, all_cids) = {
        let mut repo = Repository::open(&mut adapter, root_cid)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to open repo: {e}")))?;

        let target_cid = {
            let mut tree = repo.tree();
            tree.get(&mst_key)
                .await
                .map_err(|e| EngineError::Storage(format!("failed to look up record: {e}")))?
        };

        let mut leaf_cids = std::collections::HashSet::new();
        {
            let mut tree = repo.tree();
            let entries_stream = tree.entries_prefixed("");
            futures::pin_mut!(entries_stream);
            while let Some((_, cid)) = entries_stream
                .try_next()
                .await
                .map_err(|e| EngineError::Storage(format!("failed to walk MST: {e}")))?
            {
                leaf_cids.insert(cid);
            }
        }

        let all_cids = repo
            .export()
            .await
            .map_err(|e| EngineError::Storage(format!("failed to export repo CIDs: {e}")))?
            .collect::<Vec<_>>();

        (target_cid, leaf_cids, all_cids)
    };

    let mut car_buf = Vec::new();
    let mut car_store =
        CarStore::create_with_roots(std::io::Cursor::new(&mut car_buf), [root_cid])
            .await
            .map_err(|e| EngineError::Storage(format!("failed to create CAR: {e}")))?;

    for cid in all_cids {
        // Skip every record leaf except the one being proven; the commit
        // and the MST's own structural nodes (not in `leaf_cids`) always go in.
        if leaf_cids.contains(&cid) && Some(cid) != target_cid {
            continue;
        }
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

/// Delete a record from a repository. The MST leaf's own CID is marked
/// removed; restructured internal nodes are left as unreferenced garbage
/// rather than diffed out, matching the donor's lack of a compaction pass.
pub async fn delete_record(
    store: Arc<dyn RepoStore>,
    did: &str,
    signing_key: &SigningKey,
    collection: &str,
    rkey: &str,
    tid_gen: &TidGenerator,
    current_root: &[u8],
) -> EngineResult<CommitDescriptor> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| EngineError::Storage(format!("invalid root CID: {e}")))?;

    let mut repo = Repository::open(&mut adapter, root_cid)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to open repo: {e}")))?;

    let mst_key = format!("{collection}/{rkey}");

    let previous_cid = {
        let mut tree = repo.tree();
        tree.get(&mst_key)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to look up record: {e}")))?
    }
    .ok_or(EngineError::RecordNotFound)?;

    let mut commit_builder = repo
        .delete_raw(&mst_key)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to delete record: {e}")))?;

    let rev_str = tid_gen.next_tid();
    let rev_tid = Tid::new(rev_str.clone())
        .map_err(|e| EngineError::InvalidRequest(format!("invalid TID: {e}")))?;
    commit_builder.rev(rev_tid);
    commit_builder.prev(root_cid);

    let commit_bytes = commit_builder.bytes();
    let sig = signing_key.sign(&commit_bytes)?;
    let new_root_cid = commit_builder
        .finalize(sig)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to finalize commit: {e}")))?;

    Ok(CommitDescriptor {
        commit_cid: cid_to_bytes(&new_root_cid),
        rev: rev_str,
        prev: Some(current_root.to_vec()),
        new_blocks: adapter.take_pending_blocks(),
        removed_cids: vec![cid_to_bytes(&previous_cid)],
        ops: vec![RepoOpDescriptor {
            action: "delete".to_string(),
            path: format!("{collection}/{rkey}"),
            cid: None,
        }],
    })
}

/// Create or update a record at a specific rkey. If the record already
/// exists at this path, it is updated and the prior leaf CID is marked
/// removed; otherwise it is created fresh.
pub async fn put_record(
    store: Arc<dyn RepoStore>,
    did: &str,
    signing_key: &SigningKey,
    collection: &str,
    rkey: &str,
    record: &serde_json::Value,
    tid_gen: &TidGenerator,
    current_root: &[u8],
) -> EngineResult<RecordWriteOutput> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| EngineError::Storage(format!("invalid root CID: {e}")))?;

    let mut repo = Repository::open(&mut adapter, root_cid)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to open repo: {e}")))?;

    let mst_key = format!("{collection}/{rkey}");

    let existing = {
        let mut tree = repo.tree();
        tree.get(&mst_key)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to check existing record: {e}")))?
    };

    let is_update = existing.is_some();
    let removed_cids: Vec<Vec<u8>> = existing.iter().map(cid_to_bytes).collect();
    let action = if is_update { "update" } else { "create" };
    let (mut commit_builder, record_cid) = if is_update {
        repo.update_raw(&mst_key, record)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to update record: {e}")))?
    } else {
        repo.add_raw(&mst_key, record)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to add record: {e}")))?
    };

    let rev_str = tid_gen.next_tid();
    let rev_tid = Tid::new(rev_str.clone())
        .map_err(|e| EngineError::InvalidRequest(format!("invalid TID: {e}")))?;
    commit_builder.rev(rev_tid);
    commit_builder.prev(root_cid);

    let commit_bytes = commit_builder.bytes();
    let sig = signing_key.sign(&commit_bytes)?;
    let new_root_cid = commit_builder
        .finalize(sig)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to finalize commit: {e}")))?;

    let uri = format!("at://{did}/{collection}/{rkey}");

    Ok(RecordWriteOutput {
        uri,
        cid: cid_to_bytes(&record_cid),
        commit: CommitDescriptor {
            commit_cid: cid_to_bytes(&new_root_cid),
            rev: rev_str,
            prev: Some(current_root.to_vec()),
            new_blocks: adapter.take_pending_blocks(),
            removed_cids,
            ops: vec![RepoOpDescriptor {
                action: action.to_string(),
                path: format!("{collection}/{rkey}"),
                cid: Some(record_cid.to_string()),
            }],
        },
    })
}

/// Maximum number of writes permitted in a single [`apply_writes`] batch.
pub const MAX_BATCH_WRITES: usize = 200;

/// A single write within an atomic batch.
pub enum BatchWrite<'a> {
    Create {
        collection: &'a str,
        rkey: Option<&'a str>,
        record: &'a serde_json::Value,
    },
    Update {
        collection: &'a str,
        rkey: &'a str,
        record: &'a serde_json::Value,
    },
    Delete {
        collection: &'a str,
        rkey: &'a str,
    },
}

/// The identity of one write's result inside a batch (parallels
/// [`RecordWriteOutput`], minus the per-write commit since the batch only
/// produces one).
#[derive(Debug, Clone)]
pub struct BatchWriteResult {
    pub uri: String,
    pub cid: Option<Vec<u8>>,
}

/// Outcome of applying a whole batch as a single commit.
#[derive(Debug, Clone)]
pub struct BatchWriteOutput {
    pub commit: CommitDescriptor,
    pub results: Vec<BatchWriteResult>,
}

/// Apply a sequence of writes as one atomic commit: all or nothing. Every
/// write mutates the MST through the
/// same buffering adapter and none of them are persisted to the store until
/// the caller hands the single resulting `CommitDescriptor` to
/// `RepoStore::apply_commit` — so a failure partway through (a missing
/// record, a duplicate key, a cap violation) leaves the store exactly as it
/// was, with nothing broadcast and nothing written.
pub async fn apply_writes(
    store: Arc<dyn RepoStore>,
    did: &str,
    signing_key: &SigningKey,
    writes: &[BatchWrite<'_>],
    tid_gen: &TidGenerator,
    current_root: &[u8],
) -> EngineResult<BatchWriteOutput> {
    if writes.is_empty() {
        return Err(EngineError::InvalidRequest("batch must contain at least one write".to_string()));
    }
    if writes.len() > MAX_BATCH_WRITES {
        return Err(EngineError::InvalidRequest(format!(
            "batch of {} writes exceeds the {MAX_BATCH_WRITES}-operation cap",
            writes.len()
        )));
    }

    let mut adapter = RepoStoreAdapter::new(store, did.to_string());
    let mut root_cid = cid_from_bytes(current_root)
        .map_err(|e| EngineError::Storage(format!("invalid root CID: {e}")))?;

    let mut removed_cids = Vec::new();
    let mut op_descs = Vec::new();
    let mut results = Vec::new();
    let mut rev_str = String::new();

    for write in writes {
        let mut repo = Repository::open(&mut adapter, root_cid)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to open repo: {e}")))?;

        let (commit_builder, path, action, record_cid, removed_cid, uri) = match write {
            BatchWrite::Create { collection, rkey, record } => {
                let rkey_str = match rkey {
                    Some(k) => k.to_string(),
                    None => tid_gen.next_tid(),
                };
                let mst_key = format!("{collection}/{rkey_str}");
                let already_present = {
                    let mut tree = repo.tree();
                    tree.get(&mst_key)
                        .await
                        .map_err(|e| EngineError::Storage(format!("failed to check existing record: {e}")))?
                };
                if already_present.is_some() {
                    return Err(EngineError::RecordAlreadyExists);
                }
                let (builder, record_cid) = repo
                    .add_raw(&mst_key, record)
                    .await
                    .map_err(|e| EngineError::Storage(format!("failed to add record: {e}")))?;
                let uri = format!("at://{did}/{collection}/{rkey_str}");
                (builder, mst_key, "create", Some(record_cid), None, uri)
            }
            BatchWrite::Update { collection, rkey, record } => {
                let mst_key = format!("{collection}/{rkey}");
                let existing = {
                    let mut tree = repo.tree();
                    tree.get(&mst_key)
                        .await
                        .map_err(|e| EngineError::Storage(format!("failed to check existing record: {e}")))?
                };
                let (builder, record_cid) = if existing.is_some() {
                    repo.update_raw(&mst_key, record)
                        .await
                        .map_err(|e| EngineError::Storage(format!("failed to update record: {e}")))?
                } else {
                    repo.add_raw(&mst_key, record)
                        .await
                        .map_err(|e| EngineError::Storage(format!("failed to add record: {e}")))?
                };
                let uri = format!("at://{did}/{collection}/{rkey}");
                (builder, mst_key, "update", Some(record_cid), existing, uri)
            }
            BatchWrite::Delete { collection, rkey } => {
                let mst_key = format!("{collection}/{rkey}");
                let previous_cid = {
                    let mut tree = repo.tree();
                    tree.get(&mst_key)
                        .await
                        .map_err(|e| EngineError::Storage(format!("failed to look up record: {e}")))?
                }
                .ok_or(EngineError::RecordNotFound)?;
                let builder = repo
                    .delete_raw(&mst_key)
                    .await
                    .map_err(|e| EngineError::Storage(format!("failed to delete record: {e}")))?;
                let uri = format!("at://{did}/{collection}/{rkey}");
                (builder, mst_key, "delete", None, Some(previous_cid), uri)
            }
        };

        let mut commit_builder = commit_builder;
        let this_rev = tid_gen.next_tid();
        let rev_tid = Tid::new(this_rev.clone())
            .map_err(|e| EngineError::InvalidRequest(format!("invalid TID: {e}")))?;
        commit_builder.rev(rev_tid);
        commit_builder.prev(root_cid);

        let commit_bytes = commit_builder.bytes();
        let sig = signing_key.sign(&commit_bytes)?;
        let new_root_cid = commit_builder
            .finalize(sig)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to finalize commit: {e}")))?;

        if let Some(removed) = removed_cid {
            removed_cids.push(cid_to_bytes(&removed));
        }
        op_descs.push(RepoOpDescriptor {
            action: action.to_string(),
            path,
            cid: record_cid.map(|c| c.to_string()),
        });
        results.push(BatchWriteResult {
            uri,
            cid: record_cid.map(|c| cid_to_bytes(&c)),
        });

        rev_str = this_rev;
        root_cid = new_root_cid;
    }

    Ok(BatchWriteOutput {
        commit: CommitDescriptor {
            commit_cid: cid_to_bytes(&root_cid),
            rev: rev_str,
            prev: Some(current_root.to_vec()),
            new_blocks: adapter.take_pending_blocks(),
            removed_cids,
            ops: op_descs,
        },
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryRepoStore;
    use serde_json::json;

    fn test_key() -> SigningKey {
        SigningKey::generate_p256().expect("key generation should not fail")
    }

    async fn new_repo() -> (Arc<InMemoryRepoStore>, String, SigningKey, Vec<u8>) {
        let store: Arc<InMemoryRepoStore> = Arc::new(InMemoryRepoStore::new());
        let did = "did:web:alice.test".to_string();
        let key = test_key();
        let genesis = create_repo(store.clone(), &did, &key).await.unwrap();
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
    async fn create_repo_produces_a_genesis_commit_with_no_prev() {
        let (_, _, _, root) = new_repo().await;
        assert!(!root.is_empty());
    }

    #[tokio::test]
    async fn create_then_get_record_round_trips() {
        let (store, did, key, root) = new_repo().await;
        let tid_gen = TidGenerator::new();
        let record = json!({"$type": "app.bsky.feed.post", "text": "hello"});

        let write = create_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.feed.post",
            None,
            &record,
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

        let rkey = write.uri.rsplit('/').next().unwrap();
        let fetched = get_record(
            store.clone(),
            &did,
            "app.bsky.feed.post",
            rkey,
            &write.commit.commit_cid,
        )
        .await
        .unwrap()
        .expect("record should exist after create");

        assert_eq!(fetched.uri, write.uri);
        assert_eq!(fetched.value, record);
    }

    #[tokio::test]
    async fn get_record_returns_none_for_missing_rkey() {
        let (store, did, _key, root) = new_repo().await;
        let result = get_record(store, &did, "app.bsky.feed.post", "3jzfcijpj2z2a", &root)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn list_records_respects_limit_and_cursor() {
        let (store, did, key, mut root) = new_repo().await;
        let tid_gen = TidGenerator::new();

        let mut rkeys = Vec::new();
        for i in 0..5 {
            let record = json!({"$type": "app.bsky.feed.post", "text": format!("post {i}")});
            let write = create_record(
                store.clone(),
                &did,
                &key,
                "app.bsky.feed.post",
                None,
                &record,
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
            root = write.commit.commit_cid;
            rkeys.push(write.uri.rsplit('/').next().unwrap().to_string());
        }
        rkeys.sort();

        let page1 = list_records(store.clone(), &did, "app.bsky.feed.post", 2, None, &root)
            .await
            .unwrap();
        assert_eq!(page1.len(), 2);

        let cursor = page1.last().unwrap().uri.rsplit('/').next().unwrap().to_string();
        let page2 = list_records(
            store.clone(),
            &did,
            "app.bsky.feed.post",
            10,
            Some(&cursor),
            &root,
        )
        .await
        .unwrap();
        assert_eq!(page2.len(), 3);

        let mut all_seen: Vec<String> = page1
            .iter()
            .chain(page2.iter())
            .map(|r| r.uri.rsplit('/').next().unwrap().to_string())
            .collect();
        all_seen.sort();
        assert_eq!(all_seen, rkeys);
    }

    #[tokio::test]
    async fn put_record_creates_then_updates_in_place() {
        let (store, did, key, root) = new_repo().await;
        let tid_gen = TidGenerator::new();
        let rkey = "self";

        let first = json!({"$type": "app.bsky.actor.profile", "displayName": "Alice"});
        let created = put_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.actor.profile",
            rkey,
            &first,
            &tid_gen,
            &root,
        )
        .await
        .unwrap();
        assert_eq!(created.commit.ops[0].action, "create");
        store
            .apply_commit(
                &did,
                &created.commit.commit_cid,
                &created.commit.rev,
                &created.commit.new_blocks,
                &created.commit.removed_cids,
            )
            .await
            .unwrap();

        let second = json!({"$type": "app.bsky.actor.profile", "displayName": "Alice B."});
        let updated = put_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.actor.profile",
            rkey,
            &second,
            &tid_gen,
            &created.commit.commit_cid,
        )
        .await
        .unwrap();
        assert_eq!(updated.commit.ops[0].action, "update");
        assert!(!updated.commit.removed_cids.is_empty());

        store
            .apply_commit(
                &did,
                &updated.commit.commit_cid,
                &updated.commit.rev,
                &updated.commit.new_blocks,
                &updated.commit.removed_cids,
            )
            .await
            .unwrap();

        let fetched = get_record(
            store,
            &did,
            "app.bsky.actor.profile",
            rkey,
            &updated.commit.commit_cid,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(fetched.value, second);
    }

    #[tokio::test]
    async fn delete_record_removes_it_and_marks_cid_removed() {
        let (store, did, key, root) = new_repo().await;
        let tid_gen = TidGenerator::new();
        let record = json!({"$type": "app.bsky.feed.post", "text": "to be deleted"});

        let created = create_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.feed.post",
            Some("todelete"),
            &record,
            &tid_gen,
            &root,
        )
        .await
        .unwrap();
        store
            .apply_commit(
                &did,
                &created.commit.commit_cid,
                &created.commit.rev,
                &created.commit.new_blocks,
                &created.commit.removed_cids,
            )
            .await
            .unwrap();

        let deleted = delete_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.feed.post",
            "todelete",
            &tid_gen,
            &created.commit.commit_cid,
        )
        .await
        .unwrap();
        assert_eq!(deleted.ops[0].action, "delete");
        assert_eq!(deleted.removed_cids.len(), 1);
        store
            .apply_commit(
                &did,
                &deleted.commit_cid,
                &deleted.rev,
                &deleted.new_blocks,
                &deleted.removed_cids,
            )
            .await
            .unwrap();

        let gone = get_record(
            store,
            &did,
            "app.bsky.feed.post",
            "todelete",
            &deleted.commit_cid,
        )
        .await
        .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn delete_record_missing_rkey_fails() {
        let (store, did, key, root) = new_repo().await;
        let tid_gen = TidGenerator::new();
        let err = delete_record(
            store,
            &did,
            &key,
            "app.bsky.feed.post",
            "nonexistent",
            &tid_gen,
            &root,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::RecordNotFound));
    }

    #[tokio::test]
    async fn list_collections_returns_distinct_nsid_prefixes() {
        let (store, did, key, root) = new_repo().await;
        let tid_gen = TidGenerator::new();
        let post = json!({"$type": "app.bsky.feed.post", "text": "a"});
        let profile = json!({"$type": "app.bsky.actor.profile", "displayName": "A"});

        let first = create_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.feed.post",
            Some("one"),
            &post,
            &tid_gen,
            &root,
        )
        .await
        .unwrap();
        store
            .apply_commit(
                &did,
                &first.commit.commit_cid,
                &first.commit.rev,
                &first.commit.new_blocks,
                &first.commit.removed_cids,
            )
            .await
            .unwrap();

        let second = create_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.feed.post",
            Some("two"),
            &post,
            &tid_gen,
            &first.commit.commit_cid,
        )
        .await
        .unwrap();
        store
            .apply_commit(
                &did,
                &second.commit.commit_cid,
                &second.commit.rev,
                &second.commit.new_blocks,
                &second.commit.removed_cids,
            )
            .await
            .unwrap();

        let third = create_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.actor.profile",
            Some("self"),
            &profile,
            &tid_gen,
            &second.commit.commit_cid,
        )
        .await
        .unwrap();
        store
            .apply_commit(
                &did,
                &third.commit.commit_cid,
                &third.commit.rev,
                &third.commit.new_blocks,
                &third.commit.removed_cids,
            )
            .await
            .unwrap();

        let collections = list_collections(store, &did, &third.commit.commit_cid)
            .await
            .unwrap();
        assert_eq!(
            collections,
            vec!["app.bsky.actor.profile".to_string(), "app.bsky.feed.post".to_string()]
        );
    }

    #[tokio::test]
    async fn create_record_twice_at_same_rkey_fails() {
        let (store, did, key, root) = new_repo().await;
        let tid_gen = TidGenerator::new();
        let record = json!({"$type": "app.bsky.feed.post", "text": "first"});

        let first = create_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.feed.post",
            Some("dupe"),
            &record,
            &tid_gen,
            &root,
        )
        .await
        .unwrap();
        store
            .apply_commit(
                &did,
                &first.commit.commit_cid,
                &first.commit.rev,
                &first.commit.new_blocks,
                &first.commit.removed_cids,
            )
            .await
            .unwrap();

        let err = create_record(
            store,
            &did,
            &key,
            "app.bsky.feed.post",
            Some("dupe"),
            &record,
            &tid_gen,
            &first.commit.commit_cid,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::RecordAlreadyExists));
    }

    #[tokio::test]
    async fn get_record_proof_proves_presence() {
        let (store, did, key, root) = new_repo().await;
        let tid_gen = TidGenerator::new();
        let record = json!({"$type": "app.bsky.feed.post", "text": "provable"});

        let write = create_record(
            store.clone(),
            &did,
            &key,
            "app.bsky.feed.post",
            Some("proven"),
            &record,
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

        let proof = get_record_proof(
            store,
            &did,
            "app.bsky.feed.post",
            "proven",
            &write.commit.commit_cid,
        )
        .await
        .unwrap();
        assert!(!proof.is_empty());
    }

    #[tokio::test]
    async fn get_record_proof_proves_absence() {
        let (store, did, _key, root) = new_repo().await;
        let proof = get_record_proof(store, &did, "app.bsky.feed.post", "nowhere", &root)
            .await
            .unwrap();
        assert!(!proof.is_empty());
    }

    #[tokio::test]
    async fn apply_writes_batch_produces_one_commit_for_several_ops() {
        let (store, did, key, root) = new_repo().await;
        let tid_gen = TidGenerator::new();
        let post = json!({"$type": "app.bsky.feed.post", "text": "batched"});
        let profile = json!({"$type": "app.bsky.actor.profile", "displayName": "Batch"});

        let writes = vec![
            BatchWrite::Create {
                collection: "app.bsky.feed.post",
                rkey: Some("one"),
                record: &post,
            },
            BatchWrite::Create {
                collection: "app.bsky.actor.profile",
                rkey: Some("self"),
                record: &profile,
            },
        ];

        let output = apply_writes(store.clone(), &did, &key, &writes, &tid_gen, &root)
            .await
            .unwrap();
        assert_eq!(output.results.len(), 2);
        assert_eq!(output.commit.ops.len(), 2);
        assert_eq!(output.commit.prev, Some(root.clone()));

        store
            .apply_commit(
                &did,
                &output.commit.commit_cid,
                &output.commit.rev,
                &output.commit.new_blocks,
                &output.commit.removed_cids,
            )
            .await
            .unwrap();

        let fetched = get_record(
            store,
            &did,
            "app.bsky.feed.post",
            "one",
            &output.commit.commit_cid,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(fetched.value, post);
    }

    #[tokio::test]
    async fn apply_writes_batch_fails_atomically_on_a_later_conflicting_op() {
        let (store, did, key, root) = new_repo().await;
        let tid_gen = TidGenerator::new();
        let post = json!({"$type": "app.bsky.feed.post", "text": "ok"});

        let writes = vec![
            BatchWrite::Create {
                collection: "app.bsky.feed.post",
                rkey: Some("survivor"),
                record: &post,
            },
            BatchWrite::Delete {
                collection: "app.bsky.feed.post",
                rkey: "does-not-exist",
            },
        ];

        let err = apply_writes(store.clone(), &did, &key, &writes, &tid_gen, &root)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RecordNotFound));

        // Nothing from the first op should have been persisted: the batch
        // never reached `RepoStore::apply_commit`.
        let still_missing = get_record(store, &did, "app.bsky.feed.post", "survivor", &root)
            .await
            .unwrap();
        assert!(still_missing.is_none());
    }

    #[tokio::test]
    async fn apply_writes_batch_rejects_more_than_the_operation_cap() {
        let (store, did, key, root) = new_repo().await;
        let tid_gen = TidGenerator::new();
        let post = json!({"$type": "app.bsky.feed.post", "text": "x"});
        let writes: Vec<BatchWrite> = (0..MAX_BATCH_WRITES + 1)
            .map(|_| BatchWrite::Create {
                collection: "app.bsky.feed.post",
                rkey: None,
                record: &post,
            })
            .collect();

        let err = apply_writes(store, &did, &key, &writes, &tid_gen, &root)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }
}
