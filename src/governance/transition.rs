//! Mutations as single state transitions.
//!
//! Each planner returns the state before, the state after, and the list of
//! writes that make `next` durable. Callers apply `next` optimistically and
//! [`Transition::settle`] back to `previous` if the writes fail.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::comment::Comment;
use super::lock_gate::{self, LockError};
use super::permissions::Actor;
use super::quorum::{self, QuorumError, QuorumOutcome};
use crate::models::approval::{ApprovalRequest, ApprovalVote, VoteDecision};
use crate::models::audit::AuditEntry;
use crate::models::lock::EnvironmentLock;

/// A single durable write produced by a transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Write {
    UpdateApproval {
        request: ApprovalRequest,
        expected_version: i64,
    },
    InsertVote(ApprovalVote),
    UpdateLock {
        lock: EnvironmentLock,
        expected_version: i64,
    },
    InsertAudit(AuditEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition<T> {
    pub previous: T,
    pub next: T,
    pub writes: Vec<Write>,
}

impl<T> Transition<T> {
    /// State to keep once the writes have completed: `next` on success,
    /// `previous` on failure.
    pub fn settle<E>(self, result: &Result<(), E>) -> T {
        match result {
            Ok(()) => self.next,
            Err(_) => self.previous,
        }
    }

    pub fn audit_entry(&self) -> Option<&AuditEntry> {
        self.writes.iter().find_map(|w| match w {
            Write::InsertAudit(entry) => Some(entry),
            _ => None,
        })
    }
}

/// A vote transition together with the quorum outcome that produced it.
#[derive(Debug, Clone)]
pub struct VotePlan {
    pub transition: Transition<ApprovalRequest>,
    pub vote: ApprovalVote,
    pub outcome: QuorumOutcome,
}

pub fn plan_vote(
    request: &ApprovalRequest,
    voter_id: &str,
    decision: VoteDecision,
    comment: &Comment,
) -> Result<VotePlan, QuorumError> {
    let outcome = quorum::evaluate(request, decision, comment)?;
    let now = Utc::now();

    let mut next = request.clone();
    next.current_approvals = outcome.current_approvals;
    next.status = outcome.status;
    next.version = request.version + 1;
    if outcome.is_terminal() {
        next.resolved_at = Some(now);
    }

    let vote = ApprovalVote {
        id: Uuid::new_v4(),
        request_id: request.id,
        voter_id: voter_id.to_string(),
        decision,
        comment: comment.as_str().to_string(),
        created_at: now,
    };

    let audit = AuditEntry::new(
        voter_id,
        outcome.audit_action,
        "approval_request",
        request.id,
        Some(request.environment),
        outcome.audit_details.clone(),
    );

    let writes = vec![
        Write::UpdateApproval {
            request: next.clone(),
            expected_version: request.version,
        },
        Write::InsertVote(vote.clone()),
        Write::InsertAudit(audit),
    ];

    Ok(VotePlan {
        transition: Transition {
            previous: request.clone(),
            next,
            writes,
        },
        vote,
        outcome,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockChange {
    Lock { reason: Option<String> },
    Unlock { comment: Comment },
}

pub fn plan_lock_change(
    lock: &EnvironmentLock,
    actor: &Actor,
    change: LockChange,
) -> Result<Transition<EnvironmentLock>, LockError> {
    let now = Utc::now();
    let mut next = lock.clone();
    next.version = lock.version + 1;

    let (action, details) = match change {
        LockChange::Lock { reason } => {
            lock_gate::check_lock(lock, actor.account_role())?;
            next.is_locked = true;
            next.locked_by = Some(actor.user_id.clone());
            next.locked_at = Some(now);
            next.reason = reason.clone();
            ("environment.locked", json!({ "reason": reason }))
        }
        LockChange::Unlock { comment } => {
            lock_gate::check_unlock(lock, actor.account_role())?;
            next.is_locked = false;
            next.unlocked_by = Some(actor.user_id.clone());
            next.unlocked_at = Some(now);
            next.reason = None;
            ("environment.unlocked", json!({ "comment": comment.as_str() }))
        }
    };

    let mut details = details;
    details["required_role"] = json!(lock.required_role);
    details["actor_role"] = json!(actor.account_role());

    let audit = AuditEntry::new(
        &actor.user_id,
        action,
        "environment_lock",
        lock.environment,
        Some(lock.environment),
        details,
    );

    Ok(Transition {
        previous: lock.clone(),
        next: next.clone(),
        writes: vec![
            Write::UpdateLock {
                lock: next,
                expected_version: lock.version,
            },
            Write::InsertAudit(audit),
        ],
    })
}
