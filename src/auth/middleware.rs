//! Auth middleware for Axum routes.
//!
//! Validates JWT Bearer tokens and injects Claims into request extensions.
//! Implements deny-by-default: if `auth_config` is None, all requests are rejected.

use crate::api::handlers::{AppError, SharedState};
use crate::auth::jwt::decode_jwt;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Middleware that requires a valid JWT Bearer token.
///
/// # Behavior
/// 1. If `auth_config` is `None` → 403 Forbidden (deny-by-default)
/// 2. Extract `Authorization: Bearer <token>` header → 401 if missing
/// 3. Validate JWT with the configured secret → 401 if invalid/expired
/// 4. Inject `Claims` into request extensions for downstream handlers
pub async fn require_auth(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_config = state.config.auth_config.as_ref().ok_or_else(|| {
        AppError::Forbidden("Authentication not configured — access denied".to_string())
    })?;

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let claims = decode_jwt(token, &auth_config.jwt_secret)
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

// ============================================================================
// Tests
// ============================================================================
