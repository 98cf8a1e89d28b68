//! Server-side verification of DPoP proofs (RFC 9449).
//!
//! A DPoP proof is a compact JWS whose header embeds the client's public key
//! as a JWK and whose claims bind the proof to an HTTP method/URL, a
//! resource-server nonce, and (for resource requests) the access token via
//! `ath`. This module only verifies proofs presented to the engine; building
//! proofs is a client concern handled elsewhere (see
//! `rsform-jacquard`'s `jacquard-oauth::dpop` for the client-side builder
//! this claim shape mirrors).

use accteng_core::{EngineError, EngineResult};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const JWT_HEADER_TYP_DPOP: &str = "dpop+jwt";

#[derive(Debug, Deserialize)]
struct DpopHeader {
    typ: Option<String>,
    alg: String,
    jwk: DpopJwk,
}

#[derive(Debug, Deserialize)]
struct DpopJwk {
    kty: String,
    crv: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DpopClaims {
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub iat: i64,
    pub nonce: Option<String>,
    pub ath: Option<String>,
}

/// A successfully verified DPoP proof, with the JWK thumbprint of the
/// client's key (used to bind access/refresh tokens to that key) and the
/// parsed claims.
pub struct VerifiedDpopProof {
    pub jkt: String,
    pub claims: DpopClaims,
}

/// Verify a DPoP proof JWT against the expected HTTP method and URL.
///
/// `expected_nonce`, when `Some`, requires the proof's `nonce` claim to
/// match (server-issued DPoP nonce challenge). `iat_skew_secs` bounds how
/// far the proof's `iat` may drift from the current time in either
/// direction, per RFC 9449 §4.3.
pub fn verify_dpop_proof(
    proof: &str,
    expected_method: &str,
    expected_url: &str,
    expected_nonce: Option<&str>,
    iat_skew_secs: i64,
) -> EngineResult<VerifiedDpopProof> {
    let mut parts = proof.split('.');
    let header_b64 = parts.next().ok_or(EngineError::InvalidToken)?;
    let _payload_b64 = parts.next().ok_or(EngineError::InvalidToken)?;
    if parts.next().is_none() {
        return Err(EngineError::InvalidToken);
    }

    let header_json = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| EngineError::InvalidToken)?;
    let header: DpopHeader =
        serde_json::from_slice(&header_json).map_err(|_| EngineError::InvalidToken)?;

    if header.typ.as_deref() != Some(JWT_HEADER_TYP_DPOP) {
        return Err(EngineError::InvalidRequest(
            "DPoP proof missing typ=dpop+jwt header".into(),
        ));
    }
    if header.jwk.kty != "EC" || header.jwk.crv.as_deref() != Some("P-256") {
        return Err(EngineError::InvalidRequest(
            "DPoP proof key must be an EC P-256 JWK".into(),
        ));
    }
    let (alg, x, y) = match (header.alg.as_str(), &header.jwk.x, &header.jwk.y) {
        ("ES256", Some(x), Some(y)) => (Algorithm::ES256, x, y),
        _ => {
            return Err(EngineError::InvalidRequest(
                "unsupported DPoP proof algorithm".into(),
            ));
        }
    };

    let key = DecodingKey::from_ec_components(x, y).map_err(|e| EngineError::Crypto(e.to_string()))?;
    let mut validation = Validation::new(alg);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    let data = decode::<DpopClaims>(proof, &key, &validation)
        .map_err(|_| EngineError::InvalidToken)?;
    let claims = data.claims;

    if !claims.htm.eq_ignore_ascii_case(expected_method) {
        return Err(EngineError::InvalidRequest(
            "DPoP proof htm does not match request method".into(),
        ));
    }
    if claims.htu != expected_url {
        return Err(EngineError::InvalidRequest(
            "DPoP proof htu does not match request URL".into(),
        ));
    }

    let now = chrono::Utc::now().timestamp();
    if (now - claims.iat).abs() > iat_skew_secs {
        return Err(EngineError::InvalidRequest(
            "DPoP proof iat outside allowed skew".into(),
        ));
    }

    if let Some(expected) = expected_nonce {
        if claims.nonce.as_deref() != Some(expected) {
            return Err(EngineError::InvalidRequest(
                "DPoP proof nonce mismatch or missing".into(),
            ));
        }
    }

    let jkt = jwk_thumbprint(&header.jwk)?;

    Ok(VerifiedDpopProof { jkt, claims })
}

/// Compute the `ath` claim value for an access token: base64url(SHA-256(token)).
pub fn access_token_hash(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// Compute the RFC 7638 JWK thumbprint of an EC public key, used as the
/// `jkt` value binding a DPoP-bound token to the key that requested it.
fn jwk_thumbprint(jwk: &DpopJwk) -> EngineResult<String> {
    let x = jwk.x.as_deref().ok_or(EngineError::InvalidToken)?;
    let y = jwk.y.as_deref().ok_or(EngineError::InvalidToken)?;
    let crv = jwk.crv.as_deref().ok_or(EngineError::InvalidToken)?;
    // RFC 7638: lexicographically ordered member names, no whitespace.
    let canonical = format!(
        r#"{{"crv":"{crv}","kty":"{}","x":"{x}","y":"{y}"}}"#,
        jwk.kty
    );
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes())))
}
