//! Password hashing with bcrypt.

use anyhow::{Context, Result};

/// Bcrypt work factor used for stored credentials.
const BCRYPT_COST: u32 = 12;

/// Hash a plaintext password for storage.
pub fn hash_password(plain: &str) -> Result<String> {
    bcrypt::hash(plain, BCRYPT_COST).context("Failed to hash password")
}

/// Verify a plaintext password against a stored bcrypt hash.
///
/// A malformed stored hash counts as a mismatch rather than an error so
/// login failures stay uniform.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    bcrypt::verify(plain, hash).unwrap_or(false)
}
