use serde::{Deserialize, Serialize};

/// Activation status of the single account hosted by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Deactivated,
    Takendown,
}

/// The one account this engine instance is bound to. Loaded once at lazy-init
/// time and never swapped: `did` is immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct EngineAccount {
    pub did: String,
    pub handle: String,
    pub password_hash: String,
    pub signing_key: Vec<u8>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: AccountStatus,
    pub deactivated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The singleton repo pointer: `root_cid`/`rev` are `None` until the genesis
/// commit has been applied.
#[derive(Debug, Clone)]
pub struct RepoState {
    pub root_cid: Option<Vec<u8>>,
    pub rev: Option<String>,
    pub seq: u64,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub next_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BlobMeta {
    pub cid: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A single new-or-removed block produced by applying one commit, as handed
/// from `RepoEngine` to `RepoStore::apply_commit` and on to the sequencer.
#[derive(Debug, Clone)]
pub struct CommitDescriptor {
    pub commit_cid: Vec<u8>,
    pub rev: String,
    pub prev: Option<Vec<u8>>,
    pub new_blocks: Vec<(Vec<u8>, Vec<u8>)>,
    pub removed_cids: Vec<Vec<u8>>,
    pub ops: Vec<RepoOpDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoOpDescriptor {
    pub action: String,
    pub path: String,
    pub cid: Option<String>,
}

/// A pushed authorization request row (§3 `par` table). TTL 90 s.
#[derive(Debug, Clone)]
pub struct ParRequest {
    pub request_uri: String,
    pub client_id: String,
    pub params: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// An issued, not-yet-redeemed authorization code (§3 `auth_code` table). TTL 5 min.
#[derive(Debug, Clone)]
pub struct AuthCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub scope: String,
    pub sub: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// An OAuth access/refresh token pair (§3 `token` table). Access tokens live
/// 1 hour, refresh tokens 90 days; `dpop_jkt` is set only for DPoP-bound grants.
#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub sub: String,
    pub scope: String,
    pub dpop_jkt: Option<String>,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub revoked: bool,
}

/// Cached OAuth client metadata, resolved from the client's
/// `client_id_metadata_document` URL (§4.5 ambient note).
#[derive(Debug, Clone)]
pub struct OAuthClientMeta {
    pub client_id: String,
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub logo_uri: Option<String>,
    pub client_uri: Option<String>,
    pub cached_at: chrono::DateTime<chrono::Utc>,
}

/// A WebAuthn registration hand-off token (§3 `passkey_token` table).
/// TTL 10 min, single-use.
#[derive(Debug, Clone)]
pub struct PasskeyToken {
    pub token: String,
    pub challenge: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub name: Option<String>,
}

/// A registered passkey credential (§3 `passkey` table). `counter` must
/// strictly increase on every successful authentication.
#[derive(Debug, Clone)]
pub struct PasskeyCredential {
    pub credential_id: String,
    pub public_key: Vec<u8>,
    pub counter: u32,
    pub name: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
}
