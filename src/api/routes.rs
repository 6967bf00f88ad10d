//! API route definitions

use super::handlers::{self, SharedState};
use super::{
    auth_handlers, bug_handlers, catalog_handlers, evidence_handlers, execution_handlers,
    invitation_handlers, member_handlers, project_handlers,
};
use crate::auth::require_auth;
use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Routes reachable without a token
    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/register", post(auth_handlers::register))
        .route("/auth/login", post(auth_handlers::login));

    let protected = Router::new()
        .route("/auth/me", get(auth_handlers::me))
        // ====================================================================
        // Projects
        // ====================================================================
        .route(
            "/api/projects",
            get(project_handlers::list_projects).post(project_handlers::create_project),
        )
        .route(
            "/api/projects/{project_id}",
            get(project_handlers::get_project)
                .patch(project_handlers::update_project)
                .delete(project_handlers::delete_project),
        )
        // ====================================================================
        // Members
        // ====================================================================
        .route(
            "/api/projects/{project_id}/members",
            get(member_handlers::list_members),
        )
        .route(
            "/api/projects/{project_id}/members/{user_id}",
            axum::routing::patch(member_handlers::update_member_role)
                .delete(member_handlers::remove_member),
        )
        // ====================================================================
        // Invitations
        // ====================================================================
        .route(
            "/api/projects/{project_id}/invitations",
            get(invitation_handlers::list_invitations)
                .post(invitation_handlers::create_invitation),
        )
        .route(
            "/api/invitations/{invitation}",
            delete(invitation_handlers::revoke_invitation),
        )
        .route(
            "/api/invitations/{invitation}/accept",
            post(invitation_handlers::accept_invitation),
        )
        .route(
            "/api/invitations/{invitation}/decline",
            post(invitation_handlers::decline_invitation),
        )
        // ====================================================================
        // Test catalog
        // ====================================================================
        .route(
            "/api/projects/{project_id}/packages",
            get(catalog_handlers::list_packages).post(catalog_handlers::create_package),
        )
        .route(
            "/api/packages/{package_id}",
            get(catalog_handlers::get_package)
                .patch(catalog_handlers::update_package)
                .delete(catalog_handlers::delete_package),
        )
        .route(
            "/api/packages/{package_id}/scenarios",
            get(catalog_handlers::list_scenarios).post(catalog_handlers::create_scenario),
        )
        .route(
            "/api/scenarios/{scenario_id}",
            get(catalog_handlers::get_scenario)
                .patch(catalog_handlers::update_scenario)
                .delete(catalog_handlers::delete_scenario),
        )
        // ====================================================================
        // Executions
        // ====================================================================
        .route(
            "/api/scenarios/{scenario_id}/executions",
            get(execution_handlers::list_scenario_executions)
                .post(execution_handlers::create_execution),
        )
        .route(
            "/api/projects/{project_id}/executions",
            get(execution_handlers::list_project_executions),
        )
        // ====================================================================
        // Bugs
        // ====================================================================
        .route(
            "/api/projects/{project_id}/bugs",
            get(bug_handlers::list_bugs).post(bug_handlers::create_bug),
        )
        .route(
            "/api/bugs/{bug_id}",
            get(bug_handlers::get_bug)
                .patch(bug_handlers::update_bug)
                .delete(bug_handlers::delete_bug),
        )
        // ====================================================================
        // Evidence
        // ====================================================================
        .route(
            "/api/executions/{execution_id}/evidence",
            get(evidence_handlers::list_execution_evidence)
                .post(evidence_handlers::add_execution_evidence),
        )
        .route(
            "/api/bugs/{bug_id}/evidence",
            get(evidence_handlers::list_bug_evidence).post(evidence_handlers::add_bug_evidence),
        )
        .route(
            "/api/evidence/{evidence_id}",
            delete(evidence_handlers::delete_evidence),
        )
        .layer(from_fn_with_state(state.clone(), require_auth));

    public
        .merge(protected)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
