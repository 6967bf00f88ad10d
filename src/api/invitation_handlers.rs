//! Invitation API handlers

use super::handlers::{AppError, SharedState};
use crate::auth::AuthUser;
use crate::db::{Invitation, Membership};
use crate::members::Role;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateInvitationRequest {
    pub email: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct InvitationListResponse {
    pub invitations: Vec<Invitation>,
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/projects/{id}/invitations
pub async fn create_invitation(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateInvitationRequest>,
) -> Result<Json<Invitation>, AppError> {
    let role: Role = req.role.parse().map_err(AppError::BadRequest)?;

    let invitation = state
        .invitations
        .invite(project_id, user.user_id, &req.email, role)
        .await?;
    tracing::info!(project_id, invitation_id = invitation.id, "created invitation");

    Ok(Json(invitation))
}

/// GET /api/projects/{id}/invitations
pub async fn list_invitations(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<InvitationListResponse>, AppError> {
    let invitations = state.invitations.list(project_id, user.user_id).await?;

    Ok(Json(InvitationListResponse {
        total: invitations.len(),
        invitations,
    }))
}

/// POST /api/invitations/{token}/accept — join the project
pub async fn accept_invitation(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(token): Path<String>,
) -> Result<Json<Membership>, AppError> {
    // Fresh read so the email check doesn't trust a stale token claim.
    let account = state
        .db
        .find_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

    let membership = state
        .invitations
        .accept(&token, account.id, &account.email)
        .await?;
    tracing::info!(
        project_id = membership.project_id,
        user_id = account.id,
        "invitation accepted"
    );

    Ok(Json(membership))
}

/// POST /api/invitations/{token}/decline
pub async fn decline_invitation(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(token): Path<String>,
) -> Result<Json<Invitation>, AppError> {
    let account = state
        .db
        .find_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

    let invitation = state.invitations.decline(&token, &account.email).await?;

    Ok(Json(invitation))
}

/// DELETE /api/invitations/{invitation_id} — revoke a pending invitation
pub async fn revoke_invitation(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(invitation_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state
        .invitations
        .revoke(invitation_id, user.user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
