use thiserror::Error;

/// OAuth-specific error tags (§7 "OAuth-specific" wire tags), kept distinct
/// from `accteng_core::EngineError` because they map onto RFC 6749 §5.2 / RFC
/// 9449 error codes rather than the engine's generic taxonomy.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("invalid_client: {0}")]
    InvalidClient(String),

    #[error("invalid_token: {0}")]
    InvalidToken(String),

    #[error("invalid_dpop_proof: {0}")]
    InvalidDpopProof(String),

    #[error("counter regression detected for credential {0}")]
    CounterRegression(String),

    #[error(transparent)]
    Engine(#[from] accteng_core::EngineError),
}

pub type OAuthResult<T> = Result<T, OAuthError>;

impl OAuthError {
    /// The RFC 6749 §5.2 error code this variant serializes as over the wire.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidToken(_) => "invalid_token",
            OAuthError::InvalidDpopProof(_) => "invalid_dpop_proof",
            OAuthError::CounterRegression(_) => "invalid_token",
            OAuthError::Engine(_) => "server_error",
        }
    }
}
