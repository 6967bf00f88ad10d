//! Error taxonomy for the membership engine.

use thiserror::Error;

/// Classified failures raised by membership operations.
///
/// Each variant carries a machine-checkable kind plus a human-readable
/// message; translating kinds to HTTP status codes (400/404/403/409) is the
/// API layer's concern.
#[derive(Debug, Error)]
pub enum MemberError {
    /// Malformed input: non-positive id or unknown role value
    #[error("{0}")]
    BadRequest(String),

    /// Project or target membership absent
    #[error("{0}")]
    NotFound(String),

    /// Authorization or role-rule violation
    #[error("{0}")]
    Forbidden(String),

    /// The last-owner invariant would be violated
    #[error("{0}")]
    Conflict(String),

    /// Underlying store failure (surfaced as 500 by the API layer)
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type MemberResult<T> = Result<T, MemberError>;
