use thiserror::Error;

/// Error taxonomy for the account engine. Variants map 1:1 onto the wire
/// error tags of the external-interface error body `{error, message}`; the
/// mapping to HTTP status lives in `accteng-server::error`, not here, so this
/// crate stays transport-agnostic.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("access token expired")]
    ExpiredToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("repo not found")]
    RepoNotFound,

    #[error("record not found")]
    RecordNotFound,

    #[error("blob not found")]
    BlobNotFound,

    #[error("repo parameter does not match this account")]
    InvalidRepo,

    #[error("record already exists")]
    RecordAlreadyExists,

    #[error("repo already exists")]
    RepoAlreadyExists,

    #[error("repo too large")]
    RepoTooLarge,

    #[error("blob too large")]
    BlobTooLarge,

    #[error("account must be deactivated for this operation")]
    AccountActive,

    #[error("account is inactive")]
    AccountInactive,

    #[error("invalid password")]
    InvalidPassword,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
