//! Approval quorum evaluation.
//!
//! A reject vote is final. Approve votes accumulate until the request's
//! `required_approvals` is met. Terminal requests never change again.

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use super::comment::Comment;
use crate::models::approval::{ApprovalRequest, ApprovalStatus, VoteDecision};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuorumError {
    #[error("approval request is already {0}")]
    AlreadyResolved(&'static str),
}

/// Next state of a request after one vote, plus the audit fields to record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuorumOutcome {
    pub current_approvals: i32,
    pub status: ApprovalStatus,
    pub audit_action: &'static str,
    pub audit_details: serde_json::Value,
}

impl QuorumOutcome {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

pub fn evaluate(
    request: &ApprovalRequest,
    decision: VoteDecision,
    comment: &Comment,
) -> Result<QuorumOutcome, QuorumError> {
    if request.status.is_terminal() {
        return Err(QuorumError::AlreadyResolved(request.status.as_str()));
    }

    let (current_approvals, status, audit_action) = match decision {
        VoteDecision::Reject => (
            request.current_approvals,
            ApprovalStatus::Rejected,
            "approval.rejected",
        ),
        VoteDecision::Approve => {
            let next = request.current_approvals + 1;
            if next >= request.required_approvals {
                (next, ApprovalStatus::Approved, "approval.approved")
            } else {
                (next, ApprovalStatus::Pending, "approval.vote_recorded")
            }
        }
    };

    Ok(QuorumOutcome {
        current_approvals,
        status,
        audit_action,
        audit_details: json!({
            "request_id": request.id,
            "environment": request.environment,
            "decision": decision,
            "comment": comment.as_str(),
            "previous_approvals": request.current_approvals,
            "current_approvals": current_approvals,
            "required_approvals": request.required_approvals,
            "status": status,
        }),
    })
}
