//! Project roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A member's role within a project.
///
/// Declaration order is the fixed sort order used by member listing
/// (`APPROVER < MANAGER < OWNER < TESTER`, an artifact of the underlying
/// enum declaration, not a permission ranking). Authorization decisions
/// must match on variants explicitly, never compare role values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Approver,
    Manager,
    Owner,
    Tester,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Approver, Role::Manager, Role::Owner, Role::Tester];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Approver => "APPROVER",
            Role::Manager => "MANAGER",
            Role::Owner => "OWNER",
            Role::Tester => "TESTER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPROVER" => Ok(Role::Approver),
            "MANAGER" => Ok(Role::Manager),
            "OWNER" => Ok(Role::Owner),
            "TESTER" => Ok(Role::Tester),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}
