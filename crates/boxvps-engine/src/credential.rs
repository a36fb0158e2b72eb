//! Credential hashing.
//!
//! users.json only ever holds Argon2 PHC strings. The plaintext lives as
//! long as one operation: it is hashed for the store and, for SSH users,
//! handed to `chpasswd` on stdin.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::error::{EngineError, EngineResult};

/// Hashes a credential for storage.
pub fn hash_credential(credential: &str) -> EngineResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(credential.as_bytes(), &salt)
        .map_err(|e| EngineError::Credential(format!("Failed to hash credential: {}", e)))?;
    Ok(hash.to_string())
}

/// Checks a credential against a stored hash. Unparseable hashes never match.
pub fn verify_credential(credential: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(credential.as_bytes(), &parsed)
        .is_ok()
}
