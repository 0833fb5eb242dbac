use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::environment::Environment;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub title: String,
    pub environment: Environment,
    pub requested_by: String,
    pub required_approvals: i32,
    pub current_approvals: i32,
    pub status: ApprovalStatus,
    /// Bumped on every write; used for compare-and-swap updates.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn new(new: &NewApprovalRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: new.title.clone(),
            environment: new.environment,
            requested_by: new.requested_by.clone(),
            required_approvals: new.required_approvals,
            current_approvals: 0,
            status: ApprovalStatus::Pending,
            version: 1,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApprovalRequest {
    pub title: String,
    pub environment: Environment,
    pub requested_by: String,
    pub required_approvals: i32,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(format!("unknown approval status '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum VoteDecision {
    Approve,
    Reject,
}

impl std::str::FromStr for VoteDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" | "approved" => Ok(VoteDecision::Approve),
            "reject" | "rejected" => Ok(VoteDecision::Reject),
            other => Err(format!("unknown vote decision '{}'", other)),
        }
    }
}

/// A single reviewer vote. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct ApprovalVote {
    pub id: Uuid,
    pub request_id: Uuid,
    pub voter_id: String,
    pub decision: VoteDecision,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}
