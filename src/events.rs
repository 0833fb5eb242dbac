//! Realtime row-change feed.
//!
//! Every committed governance write is published as a full-row snapshot.
//! Subscribers that fall behind lose the skipped events and should resync
//! with a fresh read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::approval::{ApprovalRequest, ApprovalVote};
use crate::models::audit::AuditEntry;
use crate::models::lock::EnvironmentLock;
use crate::models::role::RoleAssignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
pub enum RowSnapshot {
    ApprovalRequest(ApprovalRequest),
    ApprovalVote(ApprovalVote),
    EnvironmentLock(EnvironmentLock),
    AuditEntry(AuditEntry),
    RoleAssignment(RoleAssignment),
}

impl RowSnapshot {
    pub fn table(&self) -> &'static str {
        match self {
            RowSnapshot::ApprovalRequest(_) => "approval_requests",
            RowSnapshot::ApprovalVote(_) => "approval_votes",
            RowSnapshot::EnvironmentLock(_) => "environment_locks",
            RowSnapshot::AuditEntry(_) => "audit_logs",
            RowSnapshot::RoleAssignment(_) => "role_assignments",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub snapshot: RowSnapshot,
    pub at: DateTime<Utc>,
}

/// Fan-out of change events to all subscribers.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, kind: ChangeKind, snapshot: RowSnapshot) {
        let table = snapshot.table();
        let event = ChangeEvent {
            kind,
            snapshot,
            at: Utc::now(),
        };
        // Err only means nobody is listening right now.
        match self.tx.send(event) {
            Ok(receivers) => tracing::debug!(table, receivers, "change event published"),
            Err(_) => tracing::trace!(table, "change event dropped, no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
