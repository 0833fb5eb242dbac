use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::environment::Environment;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: String,
    /// Dotted action name, e.g. `approval.vote_recorded`, `environment.unlocked`.
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub environment: Option<Environment>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: impl ToString,
        environment: Option<Environment>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: actor_id.to_string(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            environment,
            details,
            created_at: Utc::now(),
        }
    }
}
