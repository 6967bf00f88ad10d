//! Project API handlers

use super::handlers::{AppError, SharedState};
use super::query::double_option;
use crate::auth::AuthUser;
use crate::db::Project;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Serialize)]
pub struct ProjectResponse {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub member_count: i64,
    pub package_count: i64,
}

#[derive(Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectResponse>,
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// List the caller's projects (owned or joined)
pub async fn list_projects(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<Json<ProjectListResponse>, AppError> {
    let projects = state.db.list_projects_for_user(user.user_id).await?;

    let mut responses = Vec::new();
    for project in projects {
        let member_count = state.db.count_members(project.id).await.unwrap_or_default();
        let package_count = state.db.count_packages(project.id).await.unwrap_or_default();
        responses.push(to_response(project, member_count, package_count));
    }

    Ok(Json(ProjectListResponse {
        total: responses.len(),
        projects: responses,
    }))
}

/// Create a new project; the creator becomes its OWNER member
pub async fn create_project(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<ProjectResponse>, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "project name must not be empty".to_string(),
        ));
    }

    let project = state
        .db
        .create_project(user.user_id, name, req.description.as_deref())
        .await?;
    tracing::info!(project_id = project.id, owner = user.user_id, "created project");

    Ok(Json(to_response(project, 1, 0)))
}

/// Get a project (any member or the owner)
pub async fn get_project(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<ProjectResponse>, AppError> {
    let ctx = state.members.authorize(project_id, user.user_id).await?;

    let member_count = state.db.count_members(project_id).await?;
    let package_count = state.db.count_packages(project_id).await?;

    Ok(Json(to_response(ctx.project, member_count, package_count)))
}

/// Update name/description (owner or manager)
pub async fn update_project(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>, AppError> {
    let ctx = state.members.authorize(project_id, user.user_id).await?;
    if !ctx.can_manage() {
        return Err(AppError::Forbidden(
            "only an owner or manager may update the project".to_string(),
        ));
    }

    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest(
                "project name must not be empty".to_string(),
            ));
        }
    }

    let project = state
        .db
        .update_project(
            project_id,
            req.name.map(|n| n.trim().to_string()),
            req.description,
        )
        .await?
        .ok_or_else(|| AppError::NotFound("project not found".to_string()))?;

    let member_count = state.db.count_members(project_id).await?;
    let package_count = state.db.count_packages(project_id).await?;

    Ok(Json(to_response(project, member_count, package_count)))
}

/// Delete a project and everything in it (owner only)
pub async fn delete_project(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let ctx = state.members.authorize(project_id, user.user_id).await?;
    if ctx.project.owner_id != user.user_id {
        return Err(AppError::Forbidden(
            "only the project owner may delete the project".to_string(),
        ));
    }

    state.db.delete_project(project_id).await?;
    tracing::info!(project_id, "deleted project");

    Ok(StatusCode::NO_CONTENT)
}

fn to_response(project: Project, member_count: i64, package_count: i64) -> ProjectResponse {
    ProjectResponse {
        id: project.id,
        owner_id: project.owner_id,
        name: project.name,
        description: project.description,
        created_at: project.created_at,
        updated_at: project.updated_at,
        member_count,
        package_count,
    }
}
