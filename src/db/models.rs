//! Row models for the relational store.

use crate::members::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Users
// ============================================================================

/// A registered user account
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Projects & memberships
// ============================================================================

/// A project under test management
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A membership row granting a user standing in a project.
///
/// The project owner is not required to have a row here; listing
/// synthesizes one for legacy projects (see `members::manager`).
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Membership {
    pub project_id: i64,
    pub user_id: i64,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A membership joined with the member's user profile (list view)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Member {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

// ============================================================================
// Invitations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

/// An invitation to join a project with a given role
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invitation {
    pub id: i64,
    pub project_id: i64,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub status: InvitationStatus,
    pub invited_by: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Test catalog
// ============================================================================

/// A grouping of test scenarios within a project
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestPackage {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    Draft,
    Ready,
    Approved,
    Deprecated,
}

/// A single test scenario (case) within a package
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestScenario {
    pub id: i64,
    pub package_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub steps: Option<String>,
    pub expected_result: Option<String>,
    pub priority: ScenarioPriority,
    pub status: ScenarioStatus,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Executions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionResult {
    Pass,
    Fail,
    Blocked,
    Skipped,
}

/// A recorded run of a test scenario
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Execution {
    pub id: i64,
    pub scenario_id: i64,
    pub executed_by: i64,
    pub result: ExecutionResult,
    pub notes: Option<String>,
    pub executed_at: DateTime<Utc>,
}

// ============================================================================
// Bugs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BugSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BugStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

/// A defect found during testing
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Bug {
    pub id: i64,
    pub project_id: i64,
    pub scenario_id: Option<i64>,
    pub execution_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub severity: BugSeverity,
    pub status: BugStatus,
    pub reported_by: i64,
    pub assigned_to: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Evidence
// ============================================================================

/// Attachment metadata for an execution or a bug.
///
/// The blob itself lives in external storage addressed by `storage_key`;
/// exactly one of `execution_id` / `bug_id` is set.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Evidence {
    pub id: i64,
    pub execution_id: Option<i64>,
    pub bug_id: Option<i64>,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub uploaded_by: i64,
    pub created_at: DateTime<Utc>,
}
