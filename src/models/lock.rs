use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::environment::Environment;
use super::role::AccountRole;

/// Lock state for a single environment. Only the latest lock/unlock actor
/// is retained; history lives in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct EnvironmentLock {
    pub environment: Environment,
    pub is_locked: bool,
    pub required_role: AccountRole,
    pub reason: Option<String>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub unlocked_by: Option<String>,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl EnvironmentLock {
    /// Initial lock record for an environment. Production tiers start locked.
    pub fn seed(environment: Environment) -> Self {
        let (is_locked, required_role) = match environment {
            Environment::Dev => (false, AccountRole::Operator),
            Environment::Qa => (false, AccountRole::Operator),
            Environment::Staging => (false, AccountRole::Operator),
            Environment::Preprod => (true, AccountRole::Operator),
            Environment::Prod => (true, AccountRole::Admin),
        };
        Self {
            environment,
            is_locked,
            required_role,
            reason: None,
            locked_by: None,
            locked_at: None,
            unlocked_by: None,
            unlocked_at: None,
            version: 1,
        }
    }
}
