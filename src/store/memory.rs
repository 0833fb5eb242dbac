use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::GovernanceStore;
use crate::models::approval::{ApprovalRequest, ApprovalStatus, ApprovalVote};
use crate::models::audit::AuditEntry;
use crate::models::environment::Environment;
use crate::models::lock::EnvironmentLock;
use crate::models::role::RoleAssignment;

/// In-process store backed by DashMap. Used when no `DATABASE_URL` is
/// configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    roles: DashMap<String, RoleAssignment>,
    approvals: DashMap<Uuid, ApprovalRequest>,
    votes: DashMap<Uuid, Vec<ApprovalVote>>,
    locks: DashMap<Environment, EnvironmentLock>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GovernanceStore for MemoryStore {
    async fn get_role_assignment(&self, user_id: &str) -> anyhow::Result<Option<RoleAssignment>> {
        Ok(self.roles.get(user_id).map(|r| r.clone()))
    }

    async fn upsert_role_assignment(&self, assignment: &RoleAssignment) -> anyhow::Result<()> {
        self.roles
            .insert(assignment.user_id.clone(), assignment.clone());
        Ok(())
    }

    async fn list_role_assignments(&self) -> anyhow::Result<Vec<RoleAssignment>> {
        let mut rows: Vec<RoleAssignment> = self.roles.iter().map(|r| r.clone()).collect();
        rows.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(rows)
    }

    async fn insert_approval_request(&self, request: &ApprovalRequest) -> anyhow::Result<()> {
        if self.approvals.contains_key(&request.id) {
            anyhow::bail!("approval request {} already exists", request.id);
        }
        self.approvals.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_approval_request(&self, id: Uuid) -> anyhow::Result<Option<ApprovalRequest>> {
        Ok(self.approvals.get(&id).map(|r| r.clone()))
    }

    async fn list_approval_requests(
        &self,
        status: Option<ApprovalStatus>,
    ) -> anyhow::Result<Vec<ApprovalRequest>> {
        let mut rows: Vec<ApprovalRequest> = self
            .approvals
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .map(|r| r.clone())
            .collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }

    async fn list_votes(&self, request_id: Uuid) -> anyhow::Result<Vec<ApprovalVote>> {
        Ok(self
            .votes
            .get(&request_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn record_vote(
        &self,
        request: &ApprovalRequest,
        expected_version: i64,
        vote: &ApprovalVote,
    ) -> anyhow::Result<bool> {
        // Holding the shard guard serializes concurrent votes on this request.
        let Some(mut current) = self.approvals.get_mut(&request.id) else {
            return Ok(false);
        };
        if current.version != expected_version {
            return Ok(false);
        }
        self.votes
            .entry(request.id)
            .or_default()
            .push(vote.clone());
        *current = request.clone();
        Ok(true)
    }

    async fn get_lock(&self, environment: Environment) -> anyhow::Result<Option<EnvironmentLock>> {
        Ok(self.locks.get(&environment).map(|l| l.clone()))
    }

    async fn list_locks(&self) -> anyhow::Result<Vec<EnvironmentLock>> {
        let mut rows: Vec<EnvironmentLock> = self.locks.iter().map(|l| l.clone()).collect();
        rows.sort_by_key(|l| l.environment);
        Ok(rows)
    }

    async fn insert_lock_if_absent(&self, lock: &EnvironmentLock) -> anyhow::Result<bool> {
        let mut inserted = false;
        self.locks.entry(lock.environment).or_insert_with(|| {
            inserted = true;
            lock.clone()
        });
        Ok(inserted)
    }

    async fn update_lock(
        &self,
        lock: &EnvironmentLock,
        expected_version: i64,
    ) -> anyhow::Result<bool> {
        let Some(mut current) = self.locks.get_mut(&lock.environment) else {
            return Ok(false);
        };
        if current.version != expected_version {
            return Ok(false);
        }
        *current = lock.clone();
        Ok(true)
    }

    async fn insert_audit(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        self.audit.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<AuditEntry>> {
        let audit = self.audit.read().await;
        Ok(audit
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
