//! Shared server state, error type and the health endpoint.

use crate::db::Db;
use crate::invitations::InvitationManager;
use crate::members::{MemberError, MemberManager};
use crate::Config;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub db: Db,
    pub config: Config,
    pub members: MemberManager,
    pub invitations: InvitationManager,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    /// Wire up the managers over one store handle.
    pub fn shared(db: Db, config: Config) -> SharedState {
        let members = MemberManager::new(db.clone());
        let invitations = InvitationManager::new(db.clone(), members.clone());
        Arc::new(Self {
            db,
            config,
            members,
            invitations,
        })
    }
}

// ============================================================================
// Health check
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// Health check handler — verifies actual connectivity to the database.
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let db_ok = sqlx::query("SELECT 1").execute(state.db.pool()).await.is_ok();

    let (status_code, status, database) = if db_ok {
        (StatusCode::OK, "ok", "connected")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unreachable")
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: database.to_string(),
        }),
    )
}

// ============================================================================
// Error type
// ============================================================================

/// Application error, mapped onto HTTP status codes by `IntoResponse`.
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(e) => {
                tracing::error!("internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<MemberError> for AppError {
    fn from(err: MemberError) -> Self {
        match err {
            MemberError::BadRequest(msg) => AppError::BadRequest(msg),
            MemberError::NotFound(msg) => AppError::NotFound(msg),
            MemberError::Forbidden(msg) => AppError::Forbidden(msg),
            MemberError::Conflict(msg) => AppError::Conflict(msg),
            MemberError::Store(err) => AppError::Internal(err),
        }
    }
}
