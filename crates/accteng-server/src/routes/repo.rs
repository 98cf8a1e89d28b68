use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use accteng_core::types::CommitDescriptor;
use accteng_core::EngineError;
use accteng_crypto::TidGenerator;
use accteng_repo::cid_from_bytes;

use crate::auth::AuthenticatedUser;
use crate::error::XrpcError;
use crate::firehose::events::{CidLink, CommitEvent, FirehoseEvent, RepoOp};
use crate::state::EngineState;

/// Convert raw CID bytes to their display string (base32lower CIDv1).
fn cid_bytes_to_string(cid_bytes: &[u8]) -> Result<String, XrpcError> {
    let cid = cid_from_bytes(cid_bytes)
        .map_err(|e| XrpcError::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", e))?;
    Ok(cid.to_string())
}

fn signing_key_from_account(
    account: &accteng_core::types::EngineAccount,
) -> Result<accteng_crypto::SigningKey, XrpcError> {
    accteng_crypto::SigningKey::from_bytes("p256", &account.signing_key).map_err(|e| {
        XrpcError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalServerError",
            format!("failed to load signing key: {e}"),
        )
    })
}

/// Check that the `repo` parameter of an XRPC request names the account this
/// engine hosts, and return the current repo root. There is only ever one
/// account, so this doubles as the authorization check the donor used a
/// handle/DID lookup for.
async fn require_own_repo(
    state: &EngineState,
    user_did: &str,
    requested_repo: &str,
) -> Result<Vec<u8>, XrpcError> {
    if requested_repo != user_did {
        return Err(XrpcError::new(
            StatusCode::FORBIDDEN,
            "AuthorizationError",
            "Token did not match repo DID",
        ));
    }
    let repo_state = state.repo_store.get_repo_state(user_did).await?;
    repo_state.root_cid.ok_or_else(|| {
        XrpcError::new(
            StatusCode::BAD_REQUEST,
            "RepoNotFound",
            format!("repository not initialized for {user_did}"),
        )
    })
}

/// Persist a commit and, if the firehose is live, broadcast it. Shared by
/// every write path since `operations::*` always hands back the same
/// `CommitDescriptor` shape regardless of which write produced it.
async fn apply_and_emit(
    state: &EngineState,
    did: &str,
    commit: &CommitDescriptor,
) -> Result<(), XrpcError> {
    state
        .repo_store
        .apply_commit(
            did,
            &commit.commit_cid,
            &commit.rev,
            &commit.new_blocks,
            &commit.removed_cids,
        )
        .await?;

    if let Some(ref sequencer) = state.sequencer {
        let blocks = accteng_repo::car_from_commit(commit).await?;
        let seq = sequencer.next_seq();
        let commit_cid_str = cid_bytes_to_string(&commit.commit_cid)?;
        let prev = match &commit.prev {
            Some(p) => Some(CidLink {
                link: cid_bytes_to_string(p)?,
            }),
            None => None,
        };
        let ops = commit
            .ops
            .iter()
            .map(|op| RepoOp {
                action: op.action.clone(),
                path: op.path.clone(),
                cid: op.cid.clone().map(|link| CidLink { link }),
            })
            .collect();

        let event = FirehoseEvent::Commit(CommitEvent {
            seq,
            too_big: false,
            repo: did.to_string(),
            commit: CidLink { link: commit_cid_str },
            prev,
            rev: commit.rev.clone(),
            time: chrono::Utc::now().to_rfc3339(),
            ops,
            blocks,
        });
        crate::firehose::emit::emit_and_persist(state, event).await;

        if let Some(ref notifier) = state.relay_notifier {
            notifier.notify(did);
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// createRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub repo: String,
    pub collection: String,
    pub rkey: Option<String>,
    pub record: Value,
}

pub async fn create_record(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateRecordRequest>,
) -> Result<Json<Value>, XrpcError> {
    let current_root = require_own_repo(&state, &user.did, &body.repo).await?;

    let account = state
        .account_store
        .get_account()
        .await?
        .ok_or(EngineError::RepoNotFound)?;
    let signing_key = signing_key_from_account(&account)?;
    let tid_gen = TidGenerator::new();

    let _guard = state.write_lock.lock().await;
    let output = accteng_repo::create_record(
        state.repo_store.clone(),
        &user.did,
        &signing_key,
        &body.collection,
        body.rkey.as_deref(),
        &body.record,
        &tid_gen,
        &current_root,
    )
    .await?;

    apply_and_emit(&state, &user.did, &output.commit).await?;
    state
        .repo_store
        .add_record_blob(&output.uri, "")
        .await
        .ok();

    Ok(Json(json!({
        "uri": output.uri,
        "cid": cid_bytes_to_string(&output.cid)?,
    })))
}

// ---------------------------------------------------------------------------
// getRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GetRecordQuery {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
}

pub async fn get_record(
    State(state): State<EngineState>,
    Query(params): Query<GetRecordQuery>,
) -> Result<Json<Value>, XrpcError> {
    let repo_state = state.repo_store.get_repo_state(&params.repo).await?;
    let current_root = repo_state.root_cid.ok_or_else(|| {
        XrpcError::new(StatusCode::BAD_REQUEST, "RepoNotFound", "repository not initialized")
    })?;

    let record = accteng_repo::get_record(
        state.repo_store.clone(),
        &params.repo,
        &params.collection,
        &params.rkey,
        &current_root,
    )
    .await?
    .ok_or_else(|| {
        XrpcError::new(
            StatusCode::BAD_REQUEST,
            "RecordNotFound",
            format!(
                "record not found: at://{}/{}/{}",
                params.repo, params.collection, params.rkey
            ),
        )
    })?;

    Ok(Json(json!({
        "uri": record.uri,
        "cid": cid_bytes_to_string(&record.cid)?,
        "value": record.value,
    })))
}

// ---------------------------------------------------------------------------
// listRecords
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListRecordsQuery {
    pub repo: String,
    pub collection: String,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

pub async fn list_records(
    State(state): State<EngineState>,
    Query(params): Query<ListRecordsQuery>,
) -> Result<Json<Value>, XrpcError> {
    let limit = params.limit.unwrap_or(50).min(100);
    let repo_state = state.repo_store.get_repo_state(&params.repo).await?;
    let current_root = repo_state.root_cid.ok_or_else(|| {
        XrpcError::new(StatusCode::BAD_REQUEST, "RepoNotFound", "repository not initialized")
    })?;

    let records = accteng_repo::list_records(
        state.repo_store.clone(),
        &params.repo,
        &params.collection,
        limit,
        params.cursor.as_deref(),
        &current_root,
    )
    .await?;

    let cursor = if records.len() >= limit {
        records.last().and_then(|r| r.uri.rsplit('/').next().map(|s| s.to_string()))
    } else {
        None
    };

    let mut record_values = Vec::with_capacity(records.len());
    for r in &records {
        record_values.push(json!({
            "uri": r.uri,
            "cid": cid_bytes_to_string(&r.cid)?,
            "value": r.value,
        }));
    }

    let mut response = json!({ "records": record_values });
    if let Some(c) = cursor {
        response["cursor"] = json!(c);
    }

    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// deleteRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DeleteRecordRequest {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
}

pub async fn delete_record(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
    Json(body): Json<DeleteRecordRequest>,
) -> Result<StatusCode, XrpcError> {
    let current_root = require_own_repo(&state, &user.did, &body.repo).await?;

    let account = state
        .account_store
        .get_account()
        .await?
        .ok_or(EngineError::RepoNotFound)?;
    let signing_key = signing_key_from_account(&account)?;
    let tid_gen = TidGenerator::new();

    let _guard = state.write_lock.lock().await;
    let commit = accteng_repo::delete_record(
        state.repo_store.clone(),
        &user.did,
        &signing_key,
        &body.collection,
        &body.rkey,
        &tid_gen,
        &current_root,
    )
    .await?;

    apply_and_emit(&state, &user.did, &commit).await?;
    let uri = format!("at://{}/{}/{}", user.did, body.collection, body.rkey);
    state.repo_store.remove_record_blobs(&uri).await.ok();

    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// putRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PutRecordRequest {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
    pub record: Value,
}

pub async fn put_record(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
    Json(body): Json<PutRecordRequest>,
) -> Result<Json<Value>, XrpcError> {
    let current_root = require_own_repo(&state, &user.did, &body.repo).await?;

    let account = state
        .account_store
        .get_account()
        .await?
        .ok_or(EngineError::RepoNotFound)?;
    let signing_key = signing_key_from_account(&account)?;
    let tid_gen = TidGenerator::new();

    let _guard = state.write_lock.lock().await;
    let output = accteng_repo::put_record(
        state.repo_store.clone(),
        &user.did,
        &signing_key,
        &body.collection,
        &body.rkey,
        &body.record,
        &tid_gen,
        &current_root,
    )
    .await?;

    apply_and_emit(&state, &user.did, &output.commit).await?;

    Ok(Json(json!({
        "uri": output.uri,
        "cid": cid_bytes_to_string(&output.cid)?,
    })))
}

// ---------------------------------------------------------------------------
// describeRepo
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DescribeRepoQuery {
    pub repo: String,
}

pub async fn describe_repo(
    State(state): State<EngineState>,
    Query(params): Query<DescribeRepoQuery>,
) -> Result<Json<Value>, XrpcError> {
    let account = state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == params.repo || a.handle == params.repo)
        .ok_or(EngineError::RepoNotFound)?;

    let did_doc = json!({
        "@context": [
            "https://www.w3.org/ns/did/v1",
            "https://w3id.org/security/multikey/v1",
            "https://w3id.org/security/suites/secp256k1-2019/v1"
        ],
        "id": account.did,
        "alsoKnownAs": [format!("at://{}", account.handle)],
        "service": [{
            "id": "#atproto_pds",
            "type": "AtprotoPersonalDataServer",
            "serviceEndpoint": format!("https://{}", state.config.pds_hostname),
        }]
    });

    let repo_state = state.repo_store.get_repo_state(&account.did).await?;
    let (collections, head_cid) = match &repo_state.root_cid {
        Some(root) => {
            let collections = accteng_repo::list_collections(state.repo_store.clone(), &account.did, root)
                .await?;
            (collections, Some(cid_bytes_to_string(root)?))
        }
        None => (Vec::new(), None),
    };

    Ok(Json(json!({
        "handle": account.handle,
        "did": account.did,
        "didDoc": did_doc,
        "collections": collections,
        "headCid": head_cid,
        "handleIsCorrect": true,
    })))
}

// ---------------------------------------------------------------------------
// uploadBlob
// ---------------------------------------------------------------------------

/// Maximum blob size accepted by `uploadBlob`.
const MAX_BLOB_BYTES: usize = 5 * 1024 * 1024;

pub async fn upload_blob(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, XrpcError> {
    if body.len() > MAX_BLOB_BYTES {
        return Err(EngineError::BlobTooLarge.into());
    }

    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let digest = <sha2::Sha256 as sha2::Digest>::digest(&body);
    let mh = ipld_core::cid::multihash::Multihash::wrap(0x12, digest.as_slice()).map_err(|e| {
        XrpcError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalServerError",
            format!("failed to create multihash: {e}"),
        )
    })?;
    let cid = ipld_core::cid::Cid::new_v1(0x55, mh);
    let cid_string = cid.to_string();
    let size = body.len();

    state
        .blob_store
        .put_blob(&user.did, &cid_string, body, &content_type)
        .await?;

    Ok(Json(json!({
        "blob": {
            "$type": "blob",
            "ref": { "$link": cid_string },
            "mimeType": content_type,
            "size": size,
        }
    })))
}

// ---------------------------------------------------------------------------
// applyWrites
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyWritesRequest {
    pub repo: String,
    pub writes: Vec<ApplyWriteOp>,
    pub swap_commit: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub enum ApplyWriteOp {
    #[serde(rename = "com.atproto.repo.applyWrites#create")]
    Create {
        collection: String,
        rkey: Option<String>,
        value: Value,
    },
    #[serde(rename = "com.atproto.repo.applyWrites#update")]
    Update {
        collection: String,
        rkey: String,
        value: Value,
    },
    #[serde(rename = "com.atproto.repo.applyWrites#delete")]
    Delete { collection: String, rkey: String },
}

/// Apply every write as one atomic commit: all or nothing. Each op mutates
/// the same in-progress MST through
/// `accteng_repo::apply_writes`; nothing is persisted or broadcast until
/// every op has succeeded and a single signed commit exists, so a failure on
/// any op leaves the store and the firehose untouched.
pub async fn apply_writes(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
    Json(body): Json<ApplyWritesRequest>,
) -> Result<Json<Value>, XrpcError> {
    let current_root = require_own_repo(&state, &user.did, &body.repo).await?;

    if body.writes.len() > accteng_repo::MAX_BATCH_WRITES {
        return Err(XrpcError::new(
            StatusCode::BAD_REQUEST,
            "InvalidRequest",
            format!(
                "batch of {} writes exceeds the {}-operation cap",
                body.writes.len(),
                accteng_repo::MAX_BATCH_WRITES
            ),
        ));
    }

    if let Some(ref swap_cid) = body.swap_commit {
        let current_cid_str = cid_bytes_to_string(&current_root)?;
        if *swap_cid != current_cid_str {
            return Err(XrpcError::new(
                StatusCode::BAD_REQUEST,
                "InvalidSwap",
                format!("swap_commit mismatch: expected {swap_cid}, got {current_cid_str}"),
            ));
        }
    }

    let account = state
        .account_store
        .get_account()
        .await?
        .ok_or(EngineError::RepoNotFound)?;
    let signing_key = signing_key_from_account(&account)?;
    let tid_gen = TidGenerator::new();

    let batch: Vec<accteng_repo::BatchWrite<'_>> = body
        .writes
        .iter()
        .map(|write_op| match write_op {
            ApplyWriteOp::Create { collection, rkey, value } => accteng_repo::BatchWrite::Create {
                collection,
                rkey: rkey.as_deref(),
                record: value,
            },
            ApplyWriteOp::Update { collection, rkey, value } => accteng_repo::BatchWrite::Update {
                collection,
                rkey,
                record: value,
            },
            ApplyWriteOp::Delete { collection, rkey } => accteng_repo::BatchWrite::Delete { collection, rkey },
        })
        .collect();

    let _guard = state.write_lock.lock().await;
    let output = accteng_repo::apply_writes(
        state.repo_store.clone(),
        &user.did,
        &signing_key,
        &batch,
        &tid_gen,
        &current_root,
    )
    .await?;

    apply_and_emit(&state, &user.did, &output.commit).await?;

    let mut results = Vec::with_capacity(output.results.len());
    for r in &output.results {
        match &r.cid {
            Some(cid) => results.push(json!({ "uri": r.uri, "cid": cid_bytes_to_string(cid)? })),
            None => results.push(json!({ "uri": r.uri })),
        }
    }

    Ok(Json(json!({ "results": results })))
}

// ---------------------------------------------------------------------------
// importRepo
// ---------------------------------------------------------------------------

pub async fn import_repo(
    State(state): State<EngineState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Json<Value>, XrpcError> {
    let account = state
        .account_store
        .get_account()
        .await?
        .filter(|a| a.did == user.did)
        .ok_or(EngineError::RepoNotFound)?;
    let signing_key = signing_key_from_account(&account)?;

    let _guard = state.write_lock.lock().await;
    let outcome = accteng_repo::import_car(state.repo_store.clone(), &user.did, &signing_key, &body).await?;

    for (record_uri, blob_cid) in &outcome.blob_refs {
        state.repo_store.add_record_blob(record_uri, blob_cid).await?;
    }

    Ok(Json(json!({
        "root": cid_bytes_to_string(&outcome.root_cid)?,
        "rev": outcome.rev,
        "blobsExpected": outcome.blob_refs.len(),
    })))
}
