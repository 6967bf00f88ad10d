//! JWT token encoding and decoding using HS256.
//!
//! The JWT carries the user's identity claims and authenticates every
//! request behind the `/api` routes (Bearer header).

use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — user id (decimal string)
    pub sub: String,
    /// User email
    pub email: String,
    /// User display name
    pub name: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Encode a JWT token for the given user.
///
/// Uses HS256 signing with the provided secret.
pub fn encode_jwt(
    user_id: i64,
    email: &str,
    name: &str,
    secret: &str,
    expiry_secs: u64,
) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: name.to_string(),
        iat: now,
        exp: now + expiry_secs as i64,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to encode JWT")
}

/// Decode and validate a JWT token.
///
/// Returns the claims if the token is valid, not expired, and
/// signed with the correct secret.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims> {
    let token_data: TokenData<Claims> = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .context("Failed to decode JWT")?;

    Ok(token_data.claims)
}

// ============================================================================
// Tests
// ============================================================================
