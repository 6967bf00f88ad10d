//! Bug tracking API handlers

use super::handlers::{AppError, SharedState};
use super::query::{double_option, PaginatedResponse, PaginationParams, SearchFilter};
use crate::auth::AuthUser;
use crate::db::{Bug, BugSeverity, BugStatus};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateBugRequest {
    pub title: String,
    pub description: Option<String>,
    pub severity: Option<BugSeverity>,
    pub scenario_id: Option<i64>,
    pub execution_id: Option<i64>,
    pub assigned_to: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct UpdateBugRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub severity: Option<BugSeverity>,
    pub status: Option<BugStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<i64>>,
}

#[derive(Deserialize, Default)]
pub struct BugFilter {
    pub status: Option<BugStatus>,
    pub severity: Option<BugSeverity>,
}

// ============================================================================
// Shared lookups
// ============================================================================

/// Resolve a bug and check the caller's standing in its project.
pub(super) async fn authorize_bug(
    state: &SharedState,
    bug_id: i64,
    user_id: i64,
) -> Result<(Bug, crate::members::AccessContext), AppError> {
    let bug = state
        .db
        .find_bug(bug_id)
        .await?
        .ok_or_else(|| AppError::NotFound("bug not found".to_string()))?;

    let ctx = state.members.authorize(bug.project_id, user_id).await?;
    Ok((bug, ctx))
}

/// Check that a membership (or ownership) exists for an assignee.
async fn require_member(
    state: &SharedState,
    project_id: i64,
    user_id: i64,
) -> Result<(), AppError> {
    let project = state
        .db
        .find_project(project_id)
        .await?
        .ok_or_else(|| AppError::NotFound("project not found".to_string()))?;

    if project.owner_id == user_id
        || state.db.find_membership(project_id, user_id).await?.is_some()
    {
        return Ok(());
    }
    Err(AppError::BadRequest(
        "assignee is not a member of the project".to_string(),
    ))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/projects/{id}/bugs — file a bug (any member)
pub async fn create_bug(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateBugRequest>,
) -> Result<Json<Bug>, AppError> {
    state.members.authorize(project_id, user.user_id).await?;

    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest(
            "bug title must not be empty".to_string(),
        ));
    }

    // Linked records must belong to the same project.
    if let Some(scenario_id) = req.scenario_id {
        match state.db.project_id_for_scenario(scenario_id).await? {
            Some(pid) if pid == project_id => {}
            _ => {
                return Err(AppError::BadRequest(
                    "linked scenario does not belong to this project".to_string(),
                ))
            }
        }
    }
    if let Some(execution_id) = req.execution_id {
        match state.db.project_id_for_execution(execution_id).await? {
            Some(pid) if pid == project_id => {}
            _ => {
                return Err(AppError::BadRequest(
                    "linked execution does not belong to this project".to_string(),
                ))
            }
        }
    }
    if let Some(assignee) = req.assigned_to {
        require_member(&state, project_id, assignee).await?;
    }

    let bug = state
        .db
        .create_bug(
            project_id,
            req.scenario_id,
            req.execution_id,
            title,
            req.description.as_deref(),
            req.severity.unwrap_or(BugSeverity::Medium),
            user.user_id,
            req.assigned_to,
        )
        .await?;
    tracing::info!(project_id, bug_id = bug.id, "filed bug");

    Ok(Json(bug))
}

/// GET /api/projects/{id}/bugs — filterable, newest first
pub async fn list_bugs(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<BugFilter>,
    Query(search): Query<SearchFilter>,
) -> Result<Json<PaginatedResponse<Bug>>, AppError> {
    state.members.authorize(project_id, user.user_id).await?;

    let limit = pagination.validated_limit();
    let offset = pagination.validated_offset();

    let (items, total) = state
        .db
        .list_bugs(
            project_id,
            filter.status,
            filter.severity,
            search.term(),
            limit,
            offset,
        )
        .await?;

    Ok(Json(PaginatedResponse::new(items, total, limit, offset)))
}

/// GET /api/bugs/{id}
pub async fn get_bug(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(bug_id): Path<i64>,
) -> Result<Json<Bug>, AppError> {
    let (bug, _ctx) = authorize_bug(&state, bug_id, user.user_id).await?;
    Ok(Json(bug))
}

/// PATCH /api/bugs/{id} — any member may triage
pub async fn update_bug(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(bug_id): Path<i64>,
    Json(req): Json<UpdateBugRequest>,
) -> Result<Json<Bug>, AppError> {
    let (bug, _ctx) = authorize_bug(&state, bug_id, user.user_id).await?;

    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            return Err(AppError::BadRequest(
                "bug title must not be empty".to_string(),
            ));
        }
    }
    if let Some(Some(assignee)) = req.assigned_to {
        require_member(&state, bug.project_id, assignee).await?;
    }

    let bug = state
        .db
        .update_bug(
            bug_id,
            req.title,
            req.description,
            req.severity,
            req.status,
            req.assigned_to,
        )
        .await?
        .ok_or_else(|| AppError::NotFound("bug not found".to_string()))?;

    Ok(Json(bug))
}

/// DELETE /api/bugs/{id} — owner/manager or the reporter
pub async fn delete_bug(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(bug_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let (bug, ctx) = authorize_bug(&state, bug_id, user.user_id).await?;
    if !ctx.can_manage() && bug.reported_by != user.user_id {
        return Err(AppError::Forbidden(
            "only an owner, manager or the reporter may delete a bug".to_string(),
        ));
    }

    state.db.delete_bug(bug_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
