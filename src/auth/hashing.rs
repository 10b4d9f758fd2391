//! Adaptive password hashing.
//!
//! bcrypt with the library default cost (12), comfortably above the minimum
//! work factor of 10. Verification is constant-time by construction.

use crate::errors::{Result, ServiceError};

/// Hash a plaintext password for storage.
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|err| ServiceError::internal_with_source("failed to hash password", Box::new(err)))
}

/// Verify a plaintext password against a stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    bcrypt::verify(password, stored_hash).map_err(|err| {
        ServiceError::internal_with_source("failed to verify password", Box::new(err))
    })
}
