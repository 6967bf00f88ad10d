//! Authentication route handlers — registration, login, user info.

use super::handlers::{AppError, SharedState};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::{encode_jwt, AuthUser};
use crate::db::User;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// JWT plus the authenticated user, returned by register and login.
#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register — create an account and log it in.
///
/// Gated by `auth.allow_registration`; disabled deployments provision
/// accounts out of band.
pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let auth = state.config.auth_config.as_ref().ok_or_else(|| {
        AppError::Forbidden("Authentication not configured — access denied".to_string())
    })?;
    if !auth.allow_registration {
        return Err(AppError::Forbidden("Registration is disabled".to_string()));
    }

    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_string()));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("invalid email address".to_string()));
    }
    if req.password.len() < 8 {
        return Err(AppError::BadRequest(
            "password must be at least 8 characters".to_string(),
        ));
    }

    if state.db.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "an account with this email already exists".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;
    let user = state.db.create_user(name, &email, &password_hash).await?;
    tracing::info!(user_id = user.id, "registered new user");

    let token = encode_jwt(
        user.id,
        &user.email,
        &user.name,
        &auth.jwt_secret,
        auth.jwt_expiry_secs,
    )?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// POST /auth/login — email/password authentication.
pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let auth = state.config.auth_config.as_ref().ok_or_else(|| {
        AppError::Forbidden("Authentication not configured — access denied".to_string())
    })?;

    let email = req.email.trim().to_lowercase();
    let user = state.db.find_user_by_email(&email).await?;

    // Uniform failure for unknown email and wrong password.
    let user = match user {
        Some(user) if verify_password(&req.password, &user.password_hash) => user,
        _ => {
            return Err(AppError::Unauthorized(
                "invalid email or password".to_string(),
            ))
        }
    };

    let token = encode_jwt(
        user.id,
        &user.email,
        &user.name,
        &auth.jwt_secret,
        auth.jwt_expiry_secs,
    )?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// GET /auth/me — the authenticated user's profile, freshly read.
pub async fn me(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<Json<UserInfo>, AppError> {
    let user = state
        .db
        .find_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

    Ok(Json(user.into()))
}
