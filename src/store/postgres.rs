use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::GovernanceStore;
use crate::models::approval::{ApprovalRequest, ApprovalStatus, ApprovalVote};
use crate::models::audit::AuditEntry;
use crate::models::environment::Environment;
use crate::models::lock::EnvironmentLock;
use crate::models::role::RoleAssignment;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl GovernanceStore for PgStore {
    // -- Role Assignment Operations --

    async fn get_role_assignment(&self, user_id: &str) -> anyhow::Result<Option<RoleAssignment>> {
        let row = sqlx::query_as::<_, RoleAssignment>(
            "SELECT user_id, account_role, updated_by, updated_at FROM role_assignments WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_role_assignment(&self, assignment: &RoleAssignment) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO role_assignments (user_id, account_role, updated_by, updated_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (user_id) DO UPDATE
               SET account_role = EXCLUDED.account_role,
                   updated_by = EXCLUDED.updated_by,
                   updated_at = EXCLUDED.updated_at"#,
        )
        .bind(&assignment.user_id)
        .bind(assignment.account_role)
        .bind(&assignment.updated_by)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_role_assignments(&self) -> anyhow::Result<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, RoleAssignment>(
            "SELECT user_id, account_role, updated_by, updated_at FROM role_assignments ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- Approval Operations --

    async fn insert_approval_request(&self, request: &ApprovalRequest) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO approval_requests (
                id, title, environment, requested_by, required_approvals,
                current_approvals, status, version, created_at, resolved_at
               )
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(request.id)
        .bind(&request.title)
        .bind(request.environment)
        .bind(&request.requested_by)
        .bind(request.required_approvals)
        .bind(request.current_approvals)
        .bind(request.status)
        .bind(request.version)
        .bind(request.created_at)
        .bind(request.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_approval_request(&self, id: Uuid) -> anyhow::Result<Option<ApprovalRequest>> {
        let row = sqlx::query_as::<_, ApprovalRequest>("SELECT * FROM approval_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_approval_requests(
        &self,
        status: Option<ApprovalStatus>,
    ) -> anyhow::Result<Vec<ApprovalRequest>> {
        let rows = sqlx::query_as::<_, ApprovalRequest>(
            r#"SELECT * FROM approval_requests
               WHERE ($1::varchar IS NULL OR status = $1)
               ORDER BY created_at ASC"#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_votes(&self, request_id: Uuid) -> anyhow::Result<Vec<ApprovalVote>> {
        let rows = sqlx::query_as::<_, ApprovalVote>(
            "SELECT * FROM approval_votes WHERE request_id = $1 ORDER BY created_at ASC",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn record_vote(
        &self,
        request: &ApprovalRequest,
        expected_version: i64,
        vote: &ApprovalVote,
    ) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE approval_requests
               SET current_approvals = $1, status = $2, version = $3, resolved_at = $4
               WHERE id = $5 AND version = $6 AND status = 'pending'"#,
        )
        .bind(request.current_approvals)
        .bind(request.status)
        .bind(request.version)
        .bind(request.resolved_at)
        .bind(request.id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"INSERT INTO approval_votes (id, request_id, voter_id, decision, comment, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(vote.id)
        .bind(vote.request_id)
        .bind(&vote.voter_id)
        .bind(vote.decision)
        .bind(&vote.comment)
        .bind(vote.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    // -- Environment Lock Operations --

    async fn get_lock(&self, environment: Environment) -> anyhow::Result<Option<EnvironmentLock>> {
        let row = sqlx::query_as::<_, EnvironmentLock>(
            "SELECT * FROM environment_locks WHERE environment = $1",
        )
        .bind(environment)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_locks(&self) -> anyhow::Result<Vec<EnvironmentLock>> {
        let mut rows = sqlx::query_as::<_, EnvironmentLock>("SELECT * FROM environment_locks")
            .fetch_all(&self.pool)
            .await?;
        rows.sort_by_key(|l| l.environment);
        Ok(rows)
    }

    async fn insert_lock_if_absent(&self, lock: &EnvironmentLock) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"INSERT INTO environment_locks (
                environment, is_locked, required_role, reason, locked_by, locked_at,
                unlocked_by, unlocked_at, version
               )
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               ON CONFLICT (environment) DO NOTHING"#,
        )
        .bind(lock.environment)
        .bind(lock.is_locked)
        .bind(lock.required_role)
        .bind(&lock.reason)
        .bind(&lock.locked_by)
        .bind(lock.locked_at)
        .bind(&lock.unlocked_by)
        .bind(lock.unlocked_at)
        .bind(lock.version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_lock(
        &self,
        lock: &EnvironmentLock,
        expected_version: i64,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"UPDATE environment_locks
               SET is_locked = $1, required_role = $2, reason = $3,
                   locked_by = $4, locked_at = $5, unlocked_by = $6, unlocked_at = $7,
                   version = $8
               WHERE environment = $9 AND version = $10"#,
        )
        .bind(lock.is_locked)
        .bind(lock.required_role)
        .bind(&lock.reason)
        .bind(&lock.locked_by)
        .bind(lock.locked_at)
        .bind(&lock.unlocked_by)
        .bind(lock.unlocked_at)
        .bind(lock.version)
        .bind(lock.environment)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Audit Log Operations --

    async fn insert_audit(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO audit_logs (
                id, actor_id, action, resource_type, resource_id, environment, details, created_at
               )
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(entry.id)
        .bind(&entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.environment)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntry>(
            r#"SELECT id, actor_id, action, resource_type, resource_id, environment, details, created_at
               FROM audit_logs
               ORDER BY created_at DESC
               LIMIT $1 OFFSET $2"#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
