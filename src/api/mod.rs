//! HTTP API for testdeck

pub mod auth_handlers;
pub mod bug_handlers;
pub mod catalog_handlers;
pub mod evidence_handlers;
pub mod execution_handlers;
pub mod handlers;
pub mod invitation_handlers;
pub mod member_handlers;
pub mod project_handlers;
pub mod query;
pub mod routes;

pub use query::*;
pub use routes::create_router;
