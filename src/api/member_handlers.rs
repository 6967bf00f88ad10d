//! Member API handlers: listing, removal and role updates.
//!
//! Thin controllers over the membership engine: parse path/query/body into
//! engine inputs and let `AppError` map the engine's error kinds to
//! 400/403/404/409.

use super::handlers::{AppError, SharedState};
use crate::auth::AuthUser;
use crate::db::Membership;
use crate::members::{
    ListMembersInput, MemberPage, MemberSortField, RemoveMemberInput, Role, SortDirection,
    UpdateMemberRoleInput,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListMembersQuery {
    /// Comma-separated role filter, e.g. "OWNER,TESTER"
    pub roles: Option<String>,
    /// Case-insensitive substring match on member name or email
    pub q: Option<String>,
    /// 1-based page number; non-integers are floored
    #[serde(deserialize_with = "super::query::deserialize_option_from_str")]
    pub page: Option<f64>,
    /// Page size 1..=100 (default 20); out-of-range values are clamped
    #[serde(deserialize_with = "super::query::deserialize_option_from_str")]
    pub page_size: Option<f64>,
    pub sort_by: Option<MemberSortField>,
    pub order: Option<SortDirection>,
}

impl ListMembersQuery {
    fn parse_roles(&self) -> Result<Option<Vec<Role>>, AppError> {
        let Some(raw) = self.roles.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let roles = raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<Role>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::BadRequest)?;
        Ok(Some(roles))
    }
}

#[derive(Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/projects/{id}/members
pub async fn list_members(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Query(query): Query<ListMembersQuery>,
) -> Result<Json<MemberPage>, AppError> {
    let roles = query.parse_roles()?;

    let page = state
        .members
        .list_members(ListMembersInput {
            project_id,
            requester_id: user.user_id,
            roles,
            q: query.q,
            page: query.page,
            page_size: query.page_size,
            sort_by: query.sort_by.unwrap_or_default(),
            order: query.order.unwrap_or_default(),
        })
        .await?;

    Ok(Json(page))
}

/// DELETE /api/projects/{id}/members/{user_id} — returns the deleted membership
pub async fn remove_member(
    State(state): State<SharedState>,
    user: AuthUser,
    Path((project_id, member_id)): Path<(i64, i64)>,
) -> Result<Json<Membership>, AppError> {
    let removed = state
        .members
        .remove_member(RemoveMemberInput {
            project_id,
            requester_id: user.user_id,
            target_user_id: member_id,
        })
        .await?;
    tracing::info!(project_id, member = member_id, "removed member");

    Ok(Json(removed))
}

/// PATCH /api/projects/{id}/members/{user_id} — set the member's role
pub async fn update_member_role(
    State(state): State<SharedState>,
    user: AuthUser,
    Path((project_id, member_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateMemberRoleRequest>,
) -> Result<Json<Membership>, AppError> {
    let new_role: Role = req.role.parse().map_err(AppError::BadRequest)?;

    let membership = state
        .members
        .update_member_role(UpdateMemberRoleInput {
            project_id,
            requester_id: user.user_id,
            target_user_id: member_id,
            new_role,
        })
        .await?;

    Ok(Json(membership))
}
