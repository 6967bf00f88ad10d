//! Test catalog API handlers: packages and scenarios.

use super::handlers::{AppError, SharedState};
use super::query::{double_option, PaginatedResponse, PaginationParams, SearchFilter};
use crate::auth::AuthUser;
use crate::db::{ScenarioPriority, ScenarioStatus, TestPackage, TestScenario};
use crate::members::AccessContext;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Deserialize)]
pub struct CreatePackageRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdatePackageRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Serialize)]
pub struct PackageListResponse {
    pub packages: Vec<TestPackage>,
    pub total: usize,
}

#[derive(Deserialize)]
pub struct CreateScenarioRequest {
    pub title: String,
    pub description: Option<String>,
    pub steps: Option<String>,
    pub expected_result: Option<String>,
    pub priority: Option<ScenarioPriority>,
}

#[derive(Deserialize, Default)]
pub struct UpdateScenarioRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub steps: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub expected_result: Option<Option<String>>,
    pub priority: Option<ScenarioPriority>,
    pub status: Option<ScenarioStatus>,
}

#[derive(Deserialize, Default)]
pub struct ScenarioFilter {
    pub status: Option<ScenarioStatus>,
    pub priority: Option<ScenarioPriority>,
}

// ============================================================================
// Shared lookups
// ============================================================================

/// Resolve a package and check the caller's standing in its project.
pub(super) async fn authorize_package(
    state: &SharedState,
    package_id: i64,
    user_id: i64,
) -> Result<(TestPackage, AccessContext), AppError> {
    let package = state
        .db
        .find_package(package_id)
        .await?
        .ok_or_else(|| AppError::NotFound("package not found".to_string()))?;

    let ctx = state.members.authorize(package.project_id, user_id).await?;
    Ok((package, ctx))
}

/// Resolve a scenario (through its package) and check the caller's standing.
pub(super) async fn authorize_scenario(
    state: &SharedState,
    scenario_id: i64,
    user_id: i64,
) -> Result<(TestScenario, AccessContext), AppError> {
    let scenario = state
        .db
        .find_scenario(scenario_id)
        .await?
        .ok_or_else(|| AppError::NotFound("scenario not found".to_string()))?;

    let project_id = state
        .db
        .project_id_for_scenario(scenario_id)
        .await?
        .ok_or_else(|| AppError::NotFound("scenario not found".to_string()))?;

    let ctx = state.members.authorize(project_id, user_id).await?;
    Ok((scenario, ctx))
}

// ============================================================================
// Package handlers
// ============================================================================

/// POST /api/projects/{id}/packages (owner or manager)
pub async fn create_package(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Json(req): Json<CreatePackageRequest>,
) -> Result<Json<TestPackage>, AppError> {
    let ctx = state.members.authorize(project_id, user.user_id).await?;
    if !ctx.can_manage() {
        return Err(AppError::Forbidden(
            "only an owner or manager may create packages".to_string(),
        ));
    }

    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "package name must not be empty".to_string(),
        ));
    }

    let package = state
        .db
        .create_package(project_id, name, req.description.as_deref(), user.user_id)
        .await?;

    Ok(Json(package))
}

/// GET /api/projects/{id}/packages (any member)
pub async fn list_packages(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<PackageListResponse>, AppError> {
    state.members.authorize(project_id, user.user_id).await?;
    let packages = state.db.list_packages(project_id).await?;

    Ok(Json(PackageListResponse {
        total: packages.len(),
        packages,
    }))
}

/// GET /api/packages/{id}
pub async fn get_package(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(package_id): Path<i64>,
) -> Result<Json<TestPackage>, AppError> {
    let (package, _ctx) = authorize_package(&state, package_id, user.user_id).await?;
    Ok(Json(package))
}

/// PATCH /api/packages/{id} (owner or manager)
pub async fn update_package(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(package_id): Path<i64>,
    Json(req): Json<UpdatePackageRequest>,
) -> Result<Json<TestPackage>, AppError> {
    let (_, ctx) = authorize_package(&state, package_id, user.user_id).await?;
    if !ctx.can_manage() {
        return Err(AppError::Forbidden(
            "only an owner or manager may update packages".to_string(),
        ));
    }

    let package = state
        .db
        .update_package(package_id, req.name, req.description)
        .await?
        .ok_or_else(|| AppError::NotFound("package not found".to_string()))?;

    Ok(Json(package))
}

/// DELETE /api/packages/{id} (owner or manager)
pub async fn delete_package(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(package_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let (_, ctx) = authorize_package(&state, package_id, user.user_id).await?;
    if !ctx.can_manage() {
        return Err(AppError::Forbidden(
            "only an owner or manager may delete packages".to_string(),
        ));
    }

    state.db.delete_package(package_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Scenario handlers
// ============================================================================

/// POST /api/packages/{id}/scenarios (owner, manager or tester)
pub async fn create_scenario(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(package_id): Path<i64>,
    Json(req): Json<CreateScenarioRequest>,
) -> Result<Json<TestScenario>, AppError> {
    let (package, ctx) = authorize_package(&state, package_id, user.user_id).await?;
    if !ctx.can_edit_scenarios() {
        return Err(AppError::Forbidden(
            "approvers may not author scenarios".to_string(),
        ));
    }

    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest(
            "scenario title must not be empty".to_string(),
        ));
    }

    let scenario = state
        .db
        .create_scenario(
            package.id,
            title,
            req.description.as_deref(),
            req.steps.as_deref(),
            req.expected_result.as_deref(),
            req.priority.unwrap_or(ScenarioPriority::Medium),
            user.user_id,
        )
        .await?;

    Ok(Json(scenario))
}

/// GET /api/packages/{id}/scenarios (any member; filterable)
pub async fn list_scenarios(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(package_id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ScenarioFilter>,
    Query(search): Query<SearchFilter>,
) -> Result<Json<PaginatedResponse<TestScenario>>, AppError> {
    authorize_package(&state, package_id, user.user_id).await?;

    let limit = pagination.validated_limit();
    let offset = pagination.validated_offset();

    let (items, total) = state
        .db
        .list_scenarios(
            package_id,
            filter.status,
            filter.priority,
            search.term(),
            limit,
            offset,
        )
        .await?;

    Ok(Json(PaginatedResponse::new(items, total, limit, offset)))
}

/// GET /api/scenarios/{id}
pub async fn get_scenario(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(scenario_id): Path<i64>,
) -> Result<Json<TestScenario>, AppError> {
    let (scenario, _ctx) = authorize_scenario(&state, scenario_id, user.user_id).await?;
    Ok(Json(scenario))
}

/// PATCH /api/scenarios/{id}
///
/// Owners, managers and testers may edit; setting status APPROVED is
/// reserved for owners and approvers.
pub async fn update_scenario(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(scenario_id): Path<i64>,
    Json(req): Json<UpdateScenarioRequest>,
) -> Result<Json<TestScenario>, AppError> {
    let (scenario, ctx) = authorize_scenario(&state, scenario_id, user.user_id).await?;

    let approving =
        req.status == Some(ScenarioStatus::Approved) && scenario.status != ScenarioStatus::Approved;
    if approving {
        if !ctx.can_approve() {
            return Err(AppError::Forbidden(
                "only an owner or approver may approve scenarios".to_string(),
            ));
        }
    } else if !ctx.can_edit_scenarios() {
        return Err(AppError::Forbidden(
            "approvers may not edit scenarios".to_string(),
        ));
    }

    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            return Err(AppError::BadRequest(
                "scenario title must not be empty".to_string(),
            ));
        }
    }

    let scenario = state
        .db
        .update_scenario(
            scenario_id,
            req.title,
            req.description,
            req.steps,
            req.expected_result,
            req.priority,
            req.status,
        )
        .await?
        .ok_or_else(|| AppError::NotFound("scenario not found".to_string()))?;

    Ok(Json(scenario))
}

/// DELETE /api/scenarios/{id} (owner/manager, or the scenario's author)
pub async fn delete_scenario(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(scenario_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let (scenario, ctx) = authorize_scenario(&state, scenario_id, user.user_id).await?;
    if !ctx.can_manage() && scenario.created_by != user.user_id {
        return Err(AppError::Forbidden(
            "only an owner, manager or the author may delete a scenario".to_string(),
        ));
    }

    state.db.delete_scenario(scenario_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
