use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::XrpcError;
use crate::state::EngineState;
use accteng_repo::cid_from_bytes;

fn cid_bytes_to_string(cid_bytes: &[u8]) -> Result<String, XrpcError> {
    let cid = cid_from_bytes(cid_bytes)
        .map_err(|e| XrpcError::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", e))?;
    Ok(cid.to_string())
}

// ---------------------------------------------------------------------------
// getRepo — returns the full repo as a CAR file
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GetRepoQuery {
    pub did: String,
    /// Optional: only return blocks since this CID.
    pub since: Option<String>,
}

pub async fn get_repo(
    State(state): State<EngineState>,
    Query(params): Query<GetRepoQuery>,
) -> Result<Response, XrpcError> {
    let repo_state = state.repo_store.get_repo_state(&params.did).await?;
    let root_cid = repo_state.root_cid.ok_or_else(|| {
        XrpcError::new(
            StatusCode::BAD_REQUEST,
            "RepoNotFound",
            format!("repository not found for {}", params.did),
        )
    })?;

    let car_bytes = if let Some(since) = &params.since {
        let since_cid = ipld_core::cid::Cid::try_from(since.as_str()).map_err(|e| {
            XrpcError::new(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                format!("invalid since CID: {e}"),
            )
        })?;
        let since_bytes = since_cid.to_bytes();
        accteng_repo::generate_diff_car(
            state.repo_store.clone(),
            &params.did,
            &root_cid,
            Some(&since_bytes),
        )
        .await?
    } else {
        accteng_repo::export_full_car(state.repo_store.clone(), &params.did, &root_cid).await?
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/vnd.ipld.car")
        .body(Body::from(car_bytes))
        .unwrap())
}

// ---------------------------------------------------------------------------
// getLatestCommit
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GetLatestCommitQuery {
    pub did: String,
}

pub async fn get_latest_commit(
    State(state): State<EngineState>,
    Query(params): Query<GetLatestCommitQuery>,
) -> Result<Json<Value>, XrpcError> {
    let repo_state = state.repo_store.get_repo_state(&params.did).await?;
    let root_cid = repo_state.root_cid.ok_or_else(|| {
        XrpcError::new(
            StatusCode::BAD_REQUEST,
            "RepoNotFound",
            format!("repository not found for {}", params.did),
        )
    })?;
    let rev = repo_state.rev.unwrap_or_default();

    Ok(Json(json!({
        "cid": cid_bytes_to_string(&root_cid)?,
        "rev": rev,
    })))
}

// ---------------------------------------------------------------------------
// getBlocks — a diff CAR containing only the blocks for the given CIDs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GetBlocksQuery {
    pub did: String,
    pub cids: Vec<String>,
}

pub async fn get_blocks(
    State(state): State<EngineState>,
    Query(params): Query<GetBlocksQuery>,
) -> Result<Response, XrpcError> {
    let mut car_buf = Vec::new();
    for cid_str in &params.cids {
        let cid_bytes = ipld_core::cid::Cid::try_from(cid_str.as_str())
            .map_err(|e| {
                XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", format!("invalid CID: {e}"))
            })?
            .to_bytes();
        if let Some(block) = state.repo_store.get_block(&params.did, &cid_bytes).await? {
            car_buf.extend_from_slice(&block);
        }
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/vnd.ipld.car")
        .body(Body::from(car_buf))
        .unwrap())
}

// ---------------------------------------------------------------------------
// getRepoStatus — replaces the donor's multi-tenant listRepos with a status
// report for the one repo this engine hosts.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GetRepoStatusQuery {
    pub did: String,
}

pub async fn get_repo_status(
    State(state): State<EngineState>,
    Query(params): Query<GetRepoStatusQuery>,
) -> Result<Json<Value>, XrpcError> {
    let repo_state = state.repo_store.get_repo_state(&params.did).await?;

    let mut response = json!({
        "did": params.did,
        "active": repo_state.active,
    });
    if let Some(root_cid) = &repo_state.root_cid {
        response["rev"] = json!(repo_state.rev.clone().unwrap_or_default());
        response["status"] = if repo_state.active {
            Value::Null
        } else {
            json!("deactivated")
        };
        let _ = root_cid;
    } else {
        response["status"] = json!("not-initialized");
    }

    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// getBlob
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GetBlobQuery {
    pub did: String,
    pub cid: String,
}

/// Guess a mime type from the first bytes of a blob when the stored type is
/// missing or was recorded as the generic `application/octet-stream`.
/// Checks the handful of formats the firehose actually carries as embeds.
fn sniff_content_type(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 {
        return None;
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if data.starts_with(b"RIFF") && data[8..12].starts_with(b"WEBP") {
        return Some("image/webp");
    }
    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }
    if data[4..8].starts_with(b"ftyp") {
        return if data[8..12].starts_with(b"qt  ") {
            Some("video/quicktime")
        } else {
            Some("video/mp4")
        };
    }
    None
}

pub async fn get_blob(
    State(state): State<EngineState>,
    Query(params): Query<GetBlobQuery>,
) -> Result<Response, XrpcError> {
    let (data, mime_type) = state
        .blob_store
        .get_blob(&params.did, &params.cid)
        .await?
        .ok_or_else(|| {
            XrpcError::new(
                StatusCode::NOT_FOUND,
                "BlobNotFound",
                format!("blob not found: {}", params.cid),
            )
        })?;

    let content_type = if mime_type.is_empty() || mime_type == "application/octet-stream" {
        sniff_content_type(&data).map(str::to_string).unwrap_or(mime_type)
    } else {
        mime_type
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(data))
        .unwrap())
}

// ---------------------------------------------------------------------------
// listBlobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListBlobsQuery {
    pub did: String,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_blobs(
    State(state): State<EngineState>,
    Query(params): Query<ListBlobsQuery>,
) -> Result<Json<Value>, XrpcError> {
    let limit = params.limit.unwrap_or(500).min(1000);
    let cids = state
        .blob_store
        .list_blobs(&params.did, params.cursor.as_deref(), limit)
        .await?;

    let cursor = if cids.len() >= limit {
        cids.last().cloned()
    } else {
        None
    };

    let mut response = json!({ "cids": cids });
    if let Some(c) = cursor {
        response["cursor"] = json!(c);
    }

    Ok(Json(response))
}
