//! Governance operations: the single entry point used by the HTTP API and
//! the CLI. Every write goes validation → permission → rule evaluation →
//! compare-and-swap write → audit → change event → webhook.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::comment::Comment;
use super::lock_gate::{self, LockGate};
use super::permissions::{Action, Actor};
use super::quorum::QuorumOutcome;
use super::transition::{plan_lock_change, plan_vote, LockChange, Write};
use crate::config::GovernanceRules;
use crate::errors::AppError;
use crate::events::{ChangeFeed, ChangeKind, RowSnapshot};
use crate::models::approval::{
    ApprovalRequest, ApprovalStatus, ApprovalVote, NewApprovalRequest, VoteDecision,
};
use crate::models::audit::AuditEntry;
use crate::models::environment::Environment;
use crate::models::lock::EnvironmentLock;
use crate::models::role::{AccountRole, RoleAssignment};
use crate::notification::webhook::{GovernanceEvent, WebhookNotifier};
use crate::store::{apply_writes, GovernanceStore};

/// Attempts for a vote that keeps losing its compare-and-swap.
const VOTE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct VoteReceipt {
    pub request: ApprovalRequest,
    pub vote: ApprovalVote,
    pub outcome: QuorumOutcome,
}

#[derive(Clone)]
pub struct GovernanceService {
    store: Arc<dyn GovernanceStore>,
    feed: ChangeFeed,
    webhooks: Option<WebhookNotifier>,
    rules: GovernanceRules,
}

impl GovernanceService {
    pub fn new(store: Arc<dyn GovernanceStore>, feed: ChangeFeed, rules: GovernanceRules) -> Self {
        Self {
            store,
            feed,
            webhooks: None,
            rules,
        }
    }

    pub fn with_webhooks(mut self, notifier: WebhookNotifier) -> Self {
        if notifier.is_enabled() {
            self.webhooks = Some(notifier);
        }
        self
    }

    pub fn store(&self) -> &Arc<dyn GovernanceStore> {
        &self.store
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn rules(&self) -> GovernanceRules {
        self.rules
    }

    /// Wait for outstanding webhook deliveries. The server never needs this;
    /// one-shot CLI commands call it before exiting.
    pub async fn flush_webhooks(&self) -> usize {
        match &self.webhooks {
            Some(webhooks) => webhooks.flush().await,
            None => 0,
        }
    }

    // -- Setup --

    /// Insert the default lock row for every environment that has none.
    pub async fn seed_environment_locks(&self) -> Result<usize, AppError> {
        let mut inserted = 0;
        for env in Environment::ALL {
            if self
                .store
                .insert_lock_if_absent(&EnvironmentLock::seed(env))
                .await?
            {
                inserted += 1;
            }
        }
        if inserted > 0 {
            tracing::info!(inserted, "seeded environment locks");
        }
        Ok(inserted)
    }

    // -- Roles --

    /// Resolve a user to their permissions. Users with no assignment are viewers.
    pub async fn resolve_actor(&self, user_id: &str) -> Result<Actor, AppError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::Unauthenticated);
        }
        let role = self
            .store
            .get_role_assignment(user_id)
            .await?
            .map(|a| a.account_role)
            .unwrap_or(AccountRole::Viewer);
        Ok(Actor::new(user_id, role))
    }

    pub async fn assign_role(
        &self,
        actor: &Actor,
        user_id: &str,
        role: AccountRole,
    ) -> Result<RoleAssignment, AppError> {
        if actor.account_role() != AccountRole::Admin {
            return Err(AppError::Forbidden(
                "only admins may assign roles".to_string(),
            ));
        }
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::InvalidRequest("user_id is required".to_string()));
        }

        let previous = self.store.get_role_assignment(user_id).await?;
        let assignment = RoleAssignment {
            user_id: user_id.to_string(),
            account_role: role,
            updated_by: Some(actor.user_id.clone()),
            updated_at: Utc::now(),
        };
        self.store.upsert_role_assignment(&assignment).await?;

        let kind = if previous.is_some() {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        };
        self.feed
            .publish(kind, RowSnapshot::RoleAssignment(assignment.clone()));

        let audit = AuditEntry::new(
            &actor.user_id,
            "role.assigned",
            "role_assignment",
            user_id,
            None,
            json!({
                "previous_role": previous.map(|p| p.account_role),
                "account_role": role,
            }),
        );
        self.finish(&[Write::InsertAudit(audit)]).await?;

        Ok(assignment)
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleAssignment>, AppError> {
        Ok(self.store.list_role_assignments().await?)
    }

    // -- Approvals --

    pub async fn create_approval_request(
        &self,
        actor: &Actor,
        title: &str,
        environment: Environment,
        required_approvals: i32,
    ) -> Result<ApprovalRequest, AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidRequest("title is required".to_string()));
        }
        if required_approvals < 1 {
            return Err(AppError::InvalidRequest(
                "required_approvals must be at least 1".to_string(),
            ));
        }
        if !actor.can(Action::Deploy, environment) && !actor.can(Action::Approve, environment) {
            return Err(AppError::Forbidden(format!(
                "role '{}' may not request approvals in {}",
                actor.account_role(),
                environment
            )));
        }

        let request = ApprovalRequest::new(&NewApprovalRequest {
            title: title.to_string(),
            environment,
            requested_by: actor.user_id.clone(),
            required_approvals,
        });
        self.store.insert_approval_request(&request).await?;
        self.feed.publish(
            ChangeKind::Insert,
            RowSnapshot::ApprovalRequest(request.clone()),
        );

        let audit = AuditEntry::new(
            &actor.user_id,
            "approval.requested",
            "approval_request",
            request.id,
            Some(environment),
            json!({
                "title": request.title,
                "required_approvals": required_approvals,
            }),
        );
        self.finish(&[Write::InsertAudit(audit)]).await?;

        tracing::info!(
            request_id = %request.id,
            %environment,
            required_approvals,
            requested_by = %actor.user_id,
            "approval requested"
        );
        Ok(request)
    }

    pub async fn get_approval(&self, id: Uuid) -> Result<ApprovalRequest, AppError> {
        self.store
            .get_approval_request(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("approval request {}", id)))
    }

    pub async fn list_approvals(
        &self,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<ApprovalRequest>, AppError> {
        Ok(self.store.list_approval_requests(status).await?)
    }

    pub async fn list_votes(&self, request_id: Uuid) -> Result<Vec<ApprovalVote>, AppError> {
        self.get_approval(request_id).await?;
        Ok(self.store.list_votes(request_id).await?)
    }

    /// Cast a vote. The comment is validated before anything is read.
    ///
    /// A vote that loses a concurrent update is re-evaluated against the
    /// fresh row, so racing approvals are all counted.
    pub async fn cast_vote(
        &self,
        actor: &Actor,
        request_id: Uuid,
        decision: VoteDecision,
        comment: &str,
    ) -> Result<VoteReceipt, AppError> {
        let comment = Comment::parse(comment).ok_or(AppError::MissingComment)?;

        for attempt in 1..=VOTE_ATTEMPTS {
            let request = self.get_approval(request_id).await?;
            actor
                .require(Action::Approve, request.environment)
                .map_err(AppError::Forbidden)?;

            if !self.rules.allow_self_approval
                && decision == VoteDecision::Approve
                && request.requested_by == actor.user_id
            {
                return Err(AppError::SelfApproval);
            }
            if !self.rules.allow_revote {
                let votes = self.store.list_votes(request_id).await?;
                if votes.iter().any(|v| v.voter_id == actor.user_id) {
                    return Err(AppError::DuplicateVote);
                }
            }

            let plan = plan_vote(&request, &actor.user_id, decision, &comment)?;
            if !self.finish(&plan.transition.writes).await? {
                tracing::warn!(
                    request_id = %request_id,
                    voter = %actor.user_id,
                    attempt,
                    "vote lost a concurrent update, re-evaluating"
                );
                continue;
            }

            tracing::info!(
                request_id = %request_id,
                voter = %actor.user_id,
                ?decision,
                status = plan.outcome.status.as_str(),
                current_approvals = plan.outcome.current_approvals,
                "vote recorded"
            );
            return Ok(VoteReceipt {
                request: plan.transition.next,
                vote: plan.vote,
                outcome: plan.outcome,
            });
        }

        Err(AppError::Conflict(format!(
            "approval request {} kept changing, gave up after {} attempts",
            request_id, VOTE_ATTEMPTS
        )))
    }

    // -- Environment Locks --

    pub async fn list_locks(&self) -> Result<Vec<EnvironmentLock>, AppError> {
        Ok(self.store.list_locks().await?)
    }

    pub async fn get_lock(&self, environment: Environment) -> Result<EnvironmentLock, AppError> {
        self.store
            .get_lock(environment)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("lock for {}", environment)))
    }

    /// Current lock and which buttons the actor may use.
    pub async fn lock_gate(
        &self,
        actor: &Actor,
        environment: Environment,
    ) -> Result<(EnvironmentLock, LockGate), AppError> {
        let lock = self.get_lock(environment).await?;
        let gate = lock_gate::evaluate(&lock, actor.account_role());
        Ok((lock, gate))
    }

    pub async fn lock_environment(
        &self,
        actor: &Actor,
        environment: Environment,
        reason: Option<String>,
    ) -> Result<EnvironmentLock, AppError> {
        let reason = reason.and_then(|r| Comment::parse(&r)).map(Comment::into_inner);
        self.change_lock(actor, environment, LockChange::Lock { reason })
            .await
    }

    pub async fn unlock_environment(
        &self,
        actor: &Actor,
        environment: Environment,
        comment: &str,
    ) -> Result<EnvironmentLock, AppError> {
        let comment = Comment::parse(comment).ok_or(AppError::MissingComment)?;
        self.change_lock(actor, environment, LockChange::Unlock { comment })
            .await
    }

    /// Lock and unlock are compare-and-swap with no retry: of two racing
    /// changes exactly one wins and the other sees a conflict.
    async fn change_lock(
        &self,
        actor: &Actor,
        environment: Environment,
        change: LockChange,
    ) -> Result<EnvironmentLock, AppError> {
        let lock = self.get_lock(environment).await?;
        let transition = plan_lock_change(&lock, actor, change)?;

        if !self.finish(&transition.writes).await? {
            tracing::warn!(%environment, actor = %actor.user_id, "lock changed concurrently");
            return Err(AppError::Conflict(format!(
                "lock for {} was changed by someone else",
                environment
            )));
        }

        tracing::info!(
            %environment,
            actor = %actor.user_id,
            is_locked = transition.next.is_locked,
            "environment lock changed"
        );
        Ok(transition.next)
    }

    // -- Audit --

    pub async fn list_audit(&self, limit: i64, offset: i64) -> Result<Vec<AuditEntry>, AppError> {
        Ok(self.store.list_audit(limit.clamp(1, 500), offset.max(0)).await?)
    }

    /// Apply writes, then publish each committed row and notify webhooks.
    /// Returns `false` if a compare-and-swap lost; nothing is published then.
    /// Audit rows that failed to insert are neither published nor sent.
    async fn finish(&self, writes: &[Write]) -> Result<bool, AppError> {
        let Some(landed) = apply_writes(self.store.as_ref(), writes).await? else {
            return Ok(false);
        };

        for write in landed {
            let (kind, snapshot) = match write {
                Write::UpdateApproval { request, .. } => {
                    (ChangeKind::Update, RowSnapshot::ApprovalRequest(request.clone()))
                }
                Write::InsertVote(vote) => {
                    (ChangeKind::Insert, RowSnapshot::ApprovalVote(vote.clone()))
                }
                Write::UpdateLock { lock, .. } => {
                    (ChangeKind::Update, RowSnapshot::EnvironmentLock(lock.clone()))
                }
                Write::InsertAudit(entry) => {
                    if let Some(webhooks) = &self.webhooks {
                        webhooks.dispatch(GovernanceEvent::from_audit(entry));
                    }
                    (ChangeKind::Insert, RowSnapshot::AuditEntry(entry.clone()))
                }
            };
            self.feed.publish(kind, snapshot);
        }
        Ok(true)
    }
}
