use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role stored on a user account. Matches the `account_role` column in
/// the `role_assignments` table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum AccountRole {
    Admin,
    Operator,
    Viewer,
}

impl AccountRole {
    /// Privilege rank used by the environment lock gate: admin > operator > viewer.
    pub fn rank(&self) -> u8 {
        match self {
            AccountRole::Admin => 3,
            AccountRole::Operator => 2,
            AccountRole::Viewer => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Admin => "admin",
            AccountRole::Operator => "operator",
            AccountRole::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for AccountRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(AccountRole::Admin),
            "operator" => Ok(AccountRole::Operator),
            "viewer" => Ok(AccountRole::Viewer),
            other => Err(format!("unknown account role '{}'", other)),
        }
    }
}

/// Abstract governance roles. A capability bundle distinct from the stored
/// account role; permissions are declared per governance role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceRole {
    Cto,
    Architect,
    TechLead,
    Sre,
}

impl GovernanceRole {
    pub const ALL: [GovernanceRole; 4] = [
        GovernanceRole::Cto,
        GovernanceRole::Architect,
        GovernanceRole::TechLead,
        GovernanceRole::Sre,
    ];
}

/// Default dashboard mode an account lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    Governance,
    Operations,
    Observer,
}

/// One per user account. Last write wins.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct RoleAssignment {
    pub user_id: String,
    pub account_role: AccountRole,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}
