use accteng_core::{EngineError, EngineResult};

/// Hash a password with bcrypt.
///
/// `PASSWORD_HASH` in the engine configuration is documented as "bcrypt of
/// account password" (external-interfaces configuration table), so this
/// deliberately uses bcrypt rather than argon2.
pub fn hash_password(password: &str) -> EngineResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| EngineError::Crypto(format!("password hashing failed: {e}")))
}

/// Verify a password against a bcrypt hash string.
///
/// Returns `Ok(true)` if the password matches, `Ok(false)` otherwise.
pub fn verify_password(password: &str, hash: &str) -> EngineResult<bool> {
    bcrypt::verify(password, hash)
        .map_err(|e| EngineError::Crypto(format!("password verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verify_correct_password() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(verify_password("correct-horse", &hash).unwrap());
    }

    #[test]
    fn hash_verify_wrong_password() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(!verify_password("wrong-horse", &hash).unwrap());
    }

    #[test]
    fn hash_produces_bcrypt_format() {
        let hash = hash_password("test").unwrap();
        assert!(hash.starts_with("$2"), "hash should start with $2, got: {hash}");
    }

    #[test]
    fn different_hashes_for_same_password() {
        let hash1 = hash_password("same-password").unwrap();
        let hash2 = hash_password("same-password").unwrap();
        assert_ne!(hash1, hash2, "different salts should produce different hashes");
    }
}
