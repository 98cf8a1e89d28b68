use accteng_core::{EngineError, EngineResult};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claims for an access token (short-lived).
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims for a refresh token (long-lived).
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Create an access token with a 2-hour expiry.
///
/// Uses HS256 symmetric signing with the provided secret.
pub fn create_access_token(did: &str, secret: &str) -> EngineResult<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = AccessTokenClaims {
        sub: did.to_string(),
        iat: now,
        exp: now + 2 * 60 * 60, // 2 hours
    };
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|_| EngineError::InvalidToken)
}

/// Create a refresh token with a 90-day expiry.
///
/// Uses HS256 symmetric signing with the provided secret.
pub fn create_refresh_token(did: &str, jti: &str, secret: &str) -> EngineResult<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = RefreshTokenClaims {
        sub: did.to_string(),
        jti: jti.to_string(),
        iat: now,
        exp: now + 90 * 24 * 60 * 60, // 90 days
    };
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|_| EngineError::InvalidToken)
}

/// Validate an access token and return its claims.
pub fn validate_access_token(token: &str, secret: &str) -> EngineResult<AccessTokenClaims> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();
    let token_data = decode::<AccessTokenClaims>(token, &key, &validation)
        .map_err(|_| EngineError::InvalidToken)?;
    Ok(token_data.claims)
}

/// Validate a refresh token and return its claims.
pub fn validate_refresh_token(token: &str, secret: &str) -> EngineResult<RefreshTokenClaims> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();
    let token_data = decode::<RefreshTokenClaims>(token, &key, &validation)
        .map_err(|_| EngineError::InvalidToken)?;
    Ok(token_data.claims)
}
