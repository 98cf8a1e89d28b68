use accteng_core::EngineError;
use accteng_oauth::OAuthError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug)]
pub struct XrpcError {
    pub status: StatusCode,
    pub error_name: String,
    pub message: String,
}

impl XrpcError {
    pub fn new(status: StatusCode, error_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_name: error_name.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for XrpcError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.error_name,
            "message": self.message,
        });
        (self.status, axum::Json(body)).into_response()
    }
}

impl From<EngineError> for XrpcError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::Storage(_) | EngineError::InternalError(_) => XrpcError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                err.to_string(),
            ),
            EngineError::Crypto(_) => XrpcError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                err.to_string(),
            ),
            EngineError::InvalidRequest(_) => {
                XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", err.to_string())
            }
            EngineError::AuthenticationRequired => XrpcError::new(
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                err.to_string(),
            ),
            EngineError::ExpiredToken => {
                XrpcError::new(StatusCode::UNAUTHORIZED, "ExpiredToken", err.to_string())
            }
            EngineError::InvalidToken => {
                XrpcError::new(StatusCode::UNAUTHORIZED, "InvalidToken", err.to_string())
            }
            EngineError::RepoNotFound => {
                XrpcError::new(StatusCode::BAD_REQUEST, "RepoNotFound", err.to_string())
            }
            EngineError::RecordNotFound => {
                XrpcError::new(StatusCode::BAD_REQUEST, "RecordNotFound", err.to_string())
            }
            EngineError::BlobNotFound => {
                XrpcError::new(StatusCode::NOT_FOUND, "BlobNotFound", err.to_string())
            }
            EngineError::InvalidRepo => {
                XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRepo", err.to_string())
            }
            EngineError::RecordAlreadyExists => XrpcError::new(
                StatusCode::BAD_REQUEST,
                "RecordAlreadyExists",
                err.to_string(),
            ),
            EngineError::RepoAlreadyExists => XrpcError::new(
                StatusCode::BAD_REQUEST,
                "RepoAlreadyExists",
                err.to_string(),
            ),
            EngineError::RepoTooLarge => {
                XrpcError::new(StatusCode::BAD_REQUEST, "RepoTooLarge", err.to_string())
            }
            EngineError::BlobTooLarge => {
                XrpcError::new(StatusCode::BAD_REQUEST, "BlobTooLarge", err.to_string())
            }
            EngineError::AccountActive => {
                XrpcError::new(StatusCode::BAD_REQUEST, "AccountActive", err.to_string())
            }
            EngineError::AccountInactive => XrpcError::new(
                StatusCode::BAD_REQUEST,
                "AccountInactive",
                err.to_string(),
            ),
            EngineError::InvalidPassword => {
                XrpcError::new(StatusCode::UNAUTHORIZED, "InvalidPassword", err.to_string())
            }
            EngineError::ServiceUnavailable(_) => XrpcError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "ServiceUnavailable",
                err.to_string(),
            ),
            EngineError::Upstream(_) => {
                XrpcError::new(StatusCode::BAD_GATEWAY, "UpstreamFailure", err.to_string())
            }
        }
    }
}

/// OAuth errors map onto RFC 6749 §5.2 / RFC 9449 wire codes rather than the
/// `{error, message}` XRPC shape, but the HTTP status choices mirror the
/// same severity bands as the `EngineError` mapping above.
impl From<OAuthError> for XrpcError {
    fn from(err: OAuthError) -> Self {
        let status = match &err {
            OAuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OAuthError::InvalidGrant(_) => StatusCode::BAD_REQUEST,
            OAuthError::UnsupportedGrantType(_) => StatusCode::BAD_REQUEST,
            OAuthError::InvalidClient(_) => StatusCode::UNAUTHORIZED,
            OAuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            OAuthError::InvalidDpopProof(_) => StatusCode::UNAUTHORIZED,
            OAuthError::CounterRegression(_) => StatusCode::UNAUTHORIZED,
            OAuthError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        XrpcError::new(status, err.code(), err.to_string())
    }
}
