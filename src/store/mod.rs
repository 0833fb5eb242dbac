pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::governance::transition::Write;
use crate::models::approval::{ApprovalRequest, ApprovalStatus, ApprovalVote};
use crate::models::audit::AuditEntry;
use crate::models::environment::Environment;
use crate::models::lock::EnvironmentLock;
use crate::models::role::RoleAssignment;

/// Persistence for governance rows.
/// Implementations: MemoryStore (DashMap, dev/tests), PgStore (Postgres).
///
/// Versioned updates are compare-and-swap: they return `Ok(false)` when the
/// stored `version` no longer matches `expected_version`.
#[async_trait]
pub trait GovernanceStore: Send + Sync {
    async fn get_role_assignment(&self, user_id: &str) -> anyhow::Result<Option<RoleAssignment>>;

    async fn upsert_role_assignment(&self, assignment: &RoleAssignment) -> anyhow::Result<()>;

    async fn list_role_assignments(&self) -> anyhow::Result<Vec<RoleAssignment>>;

    async fn insert_approval_request(&self, request: &ApprovalRequest) -> anyhow::Result<()>;

    async fn get_approval_request(&self, id: Uuid) -> anyhow::Result<Option<ApprovalRequest>>;

    /// Oldest first. `None` lists every status.
    async fn list_approval_requests(
        &self,
        status: Option<ApprovalStatus>,
    ) -> anyhow::Result<Vec<ApprovalRequest>>;

    async fn list_votes(&self, request_id: Uuid) -> anyhow::Result<Vec<ApprovalVote>>;

    /// Atomically swap in `request` and append `vote`.
    async fn record_vote(
        &self,
        request: &ApprovalRequest,
        expected_version: i64,
        vote: &ApprovalVote,
    ) -> anyhow::Result<bool>;

    async fn get_lock(&self, environment: Environment) -> anyhow::Result<Option<EnvironmentLock>>;

    async fn list_locks(&self) -> anyhow::Result<Vec<EnvironmentLock>>;

    /// Returns `true` if the row was inserted.
    async fn insert_lock_if_absent(&self, lock: &EnvironmentLock) -> anyhow::Result<bool>;

    async fn update_lock(
        &self,
        lock: &EnvironmentLock,
        expected_version: i64,
    ) -> anyhow::Result<bool>;

    async fn insert_audit(&self, entry: &AuditEntry) -> anyhow::Result<()>;

    /// Newest first.
    async fn list_audit(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<AuditEntry>>;
}

/// Execute a transition's writes in order and return the writes that landed.
///
/// Returns `Ok(None)` if a versioned write lost its compare-and-swap; no
/// later write runs in that case. Audit inserts are best-effort: a failure
/// is logged, left out of the returned list, and does not undo the primary
/// write.
pub async fn apply_writes<'a>(
    store: &dyn GovernanceStore,
    writes: &'a [Write],
) -> anyhow::Result<Option<Vec<&'a Write>>> {
    let mut landed = Vec::with_capacity(writes.len());
    let mut iter = writes.iter().peekable();
    while let Some(write) = iter.next() {
        match write {
            Write::UpdateApproval {
                request,
                expected_version,
            } => {
                let paired = iter.next_if(|w| matches!(w, Write::InsertVote(_)));
                let vote = match paired {
                    Some(Write::InsertVote(vote)) => vote,
                    _ => anyhow::bail!("approval update for {} has no paired vote", request.id),
                };
                if !store.record_vote(request, *expected_version, vote).await? {
                    return Ok(None);
                }
                landed.push(write);
                landed.extend(paired);
            }
            Write::InsertVote(vote) => {
                anyhow::bail!("vote {} is not paired with an approval update", vote.id)
            }
            Write::UpdateLock {
                lock,
                expected_version,
            } => {
                if !store.update_lock(lock, *expected_version).await? {
                    return Ok(None);
                }
                landed.push(write);
            }
            Write::InsertAudit(entry) => match store.insert_audit(entry).await {
                Ok(()) => {
                    tracing::debug!(audit_id = %entry.id, action = %entry.action, "audit log recorded");
                    landed.push(write);
                }
                Err(e) => {
                    tracing::error!(audit_id = %entry.id, action = %entry.action, "failed to write audit log: {}", e);
                }
            },
        }
    }
    Ok(Some(landed))
}
