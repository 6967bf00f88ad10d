//! AuthUser extractor for Axum handlers.
//!
//! Extracts the authenticated user's identity from request extensions
//! (populated by the `require_auth` middleware).

use crate::api::handlers::{AppError, SharedState};
use crate::auth::jwt::Claims;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Authenticated user identity extracted from JWT claims.
///
/// Use this as a handler parameter to require authentication
/// and access the user's identity:
///
/// ```rust,ignore
/// async fn my_handler(user: AuthUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.name)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub name: String,
}

impl AuthUser {
    /// Create from JWT claims
    fn from_claims(claims: &Claims) -> Result<Self, AppError> {
        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid user ID in token".to_string()))?;

        Ok(Self {
            user_id,
            email: claims.email.clone(),
            name: claims.name.clone(),
        })
    }
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &SharedState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async {
            let claims = parts.extensions.get::<Claims>().ok_or_else(|| {
                AppError::Unauthorized("Authentication required — no claims in request".to_string())
            })?;

            Self::from_claims(claims)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
