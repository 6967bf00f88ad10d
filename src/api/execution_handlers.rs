//! Execution API handlers: recording and listing test runs.

use super::catalog_handlers::authorize_scenario;
use super::handlers::{AppError, SharedState};
use super::query::{PaginatedResponse, PaginationParams};
use crate::auth::AuthUser;
use crate::db::{Execution, ExecutionResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateExecutionRequest {
    pub result: ExecutionResult,
    pub notes: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ExecutionFilter {
    pub result: Option<ExecutionResult>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/scenarios/{id}/executions — record a run (any member)
pub async fn create_execution(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(scenario_id): Path<i64>,
    Json(req): Json<CreateExecutionRequest>,
) -> Result<Json<Execution>, AppError> {
    let (scenario, _ctx) = authorize_scenario(&state, scenario_id, user.user_id).await?;

    let execution = state
        .db
        .create_execution(scenario.id, user.user_id, req.result, req.notes.as_deref())
        .await?;
    tracing::info!(
        scenario_id,
        execution_id = execution.id,
        result = ?execution.result,
        "recorded execution"
    );

    Ok(Json(execution))
}

/// GET /api/scenarios/{id}/executions — newest first
pub async fn list_scenario_executions(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(scenario_id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ExecutionFilter>,
) -> Result<Json<PaginatedResponse<Execution>>, AppError> {
    authorize_scenario(&state, scenario_id, user.user_id).await?;

    let limit = pagination.validated_limit();
    let offset = pagination.validated_offset();

    let (items, total) = state
        .db
        .list_executions_for_scenario(scenario_id, filter.result, limit, offset)
        .await?;

    Ok(Json(PaginatedResponse::new(items, total, limit, offset)))
}

/// GET /api/projects/{id}/executions — all runs in a project, newest first
pub async fn list_project_executions(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ExecutionFilter>,
) -> Result<Json<PaginatedResponse<Execution>>, AppError> {
    state.members.authorize(project_id, user.user_id).await?;

    let limit = pagination.validated_limit();
    let offset = pagination.validated_offset();

    let (items, total) = state
        .db
        .list_executions_for_project(project_id, filter.result, limit, offset)
        .await?;

    Ok(Json(PaginatedResponse::new(items, total, limit, offset)))
}
