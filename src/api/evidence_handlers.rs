//! Evidence attachment API handlers.
//!
//! Only metadata is managed here; the blob itself is transported and
//! stored by an external service addressed through `storage_key`.

use super::bug_handlers::authorize_bug;
use super::handlers::{AppError, SharedState};
use crate::auth::AuthUser;
use crate::db::Evidence;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateEvidenceRequest {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Serialize)]
pub struct EvidenceListResponse {
    pub evidence: Vec<Evidence>,
    pub total: usize,
}

fn validate(req: &CreateEvidenceRequest) -> Result<(), AppError> {
    if req.file_name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "file name must not be empty".to_string(),
        ));
    }
    if req.size_bytes < 0 {
        return Err(AppError::BadRequest(
            "size must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Resolve an execution's project and check the caller's standing.
async fn authorize_execution(
    state: &SharedState,
    execution_id: i64,
    user_id: i64,
) -> Result<(), AppError> {
    let project_id = state
        .db
        .project_id_for_execution(execution_id)
        .await?
        .ok_or_else(|| AppError::NotFound("execution not found".to_string()))?;
    state.members.authorize(project_id, user_id).await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/executions/{id}/evidence — register an attachment
pub async fn add_execution_evidence(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(execution_id): Path<i64>,
    Json(req): Json<CreateEvidenceRequest>,
) -> Result<Json<Evidence>, AppError> {
    authorize_execution(&state, execution_id, user.user_id).await?;
    validate(&req)?;

    let storage_key = Uuid::new_v4().to_string();
    let evidence = state
        .db
        .create_evidence(
            Some(execution_id),
            None,
            req.file_name.trim(),
            &req.content_type,
            req.size_bytes,
            &storage_key,
            user.user_id,
        )
        .await?;

    Ok(Json(evidence))
}

/// GET /api/executions/{id}/evidence
pub async fn list_execution_evidence(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(execution_id): Path<i64>,
) -> Result<Json<EvidenceListResponse>, AppError> {
    authorize_execution(&state, execution_id, user.user_id).await?;

    let evidence = state.db.list_evidence_for_execution(execution_id).await?;
    Ok(Json(EvidenceListResponse {
        total: evidence.len(),
        evidence,
    }))
}

/// POST /api/bugs/{id}/evidence — register an attachment
pub async fn add_bug_evidence(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(bug_id): Path<i64>,
    Json(req): Json<CreateEvidenceRequest>,
) -> Result<Json<Evidence>, AppError> {
    authorize_bug(&state, bug_id, user.user_id).await?;
    validate(&req)?;

    let storage_key = Uuid::new_v4().to_string();
    let evidence = state
        .db
        .create_evidence(
            None,
            Some(bug_id),
            req.file_name.trim(),
            &req.content_type,
            req.size_bytes,
            &storage_key,
            user.user_id,
        )
        .await?;

    Ok(Json(evidence))
}

/// GET /api/bugs/{id}/evidence
pub async fn list_bug_evidence(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(bug_id): Path<i64>,
) -> Result<Json<EvidenceListResponse>, AppError> {
    authorize_bug(&state, bug_id, user.user_id).await?;

    let evidence = state.db.list_evidence_for_bug(bug_id).await?;
    Ok(Json(EvidenceListResponse {
        total: evidence.len(),
        evidence,
    }))
}

/// DELETE /api/evidence/{id} — uploader, owner or manager
pub async fn delete_evidence(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(evidence_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let evidence = state
        .db
        .find_evidence(evidence_id)
        .await?
        .ok_or_else(|| AppError::NotFound("evidence not found".to_string()))?;

    // Standing is checked against the parent record's project.
    let ctx = match (evidence.execution_id, evidence.bug_id) {
        (Some(execution_id), _) => {
            let project_id = state
                .db
                .project_id_for_execution(execution_id)
                .await?
                .ok_or_else(|| AppError::NotFound("execution not found".to_string()))?;
            state.members.authorize(project_id, user.user_id).await?
        }
        (None, Some(bug_id)) => authorize_bug(&state, bug_id, user.user_id).await?.1,
        (None, None) => {
            return Err(AppError::Internal(anyhow::anyhow!(
                "evidence {} has no parent record",
                evidence.id
            )))
        }
    };

    if !ctx.can_manage() && evidence.uploaded_by != user.user_id {
        return Err(AppError::Forbidden(
            "only an owner, manager or the uploader may delete evidence".to_string(),
        ));
    }

    state.db.delete_evidence(evidence_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
