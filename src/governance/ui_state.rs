//! Dashboard view-state as a typed reducer.
//!
//! `reduce` is pure: the same state and action always give the same result.
//! Cached rows are refreshed from realtime snapshots, and optimistic writes
//! are tracked by token so a failed write can be rolled back.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use super::transition::Transition;
use crate::events::{ChangeEvent, RowSnapshot};
use crate::models::approval::ApprovalRequest;
use crate::models::environment::Environment;
use crate::models::lock::EnvironmentLock;
use crate::models::role::UiMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SidebarMode {
    Expanded,
    Collapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub id: u64,
    pub level: ToastLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
enum CachedRow {
    Approval(ApprovalRequest),
    Lock(EnvironmentLock),
}

/// An optimistic write awaiting its network result.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct PendingWrite {
    previous: CachedRow,
    optimistic: CachedRow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiState {
    pub mode: UiMode,
    pub sidebar: SidebarMode,
    pub selected_approval: Option<Uuid>,
    pub selected_environment: Option<Environment>,
    pub approvals: BTreeMap<Uuid, ApprovalRequest>,
    pub locks: BTreeMap<Environment, EnvironmentLock>,
    pub toasts: Vec<Toast>,
    next_toast_id: u64,
    pending: BTreeMap<Uuid, PendingWrite>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            mode: UiMode::Observer,
            sidebar: SidebarMode::Expanded,
            selected_approval: None,
            selected_environment: None,
            approvals: BTreeMap::new(),
            locks: BTreeMap::new(),
            toasts: Vec::new(),
            next_toast_id: 1,
            pending: BTreeMap::new(),
        }
    }
}

impl UiState {
    pub fn selected(&self) -> Option<&ApprovalRequest> {
        self.selected_approval.and_then(|id| self.approvals.get(&id))
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.pending.is_empty()
    }

    fn push_toast(&mut self, level: ToastLevel, message: String) {
        self.toasts.push(Toast {
            id: self.next_toast_id,
            level,
            message,
        });
        self.next_toast_id += 1;
    }

    fn put_row(&mut self, row: CachedRow) {
        match row {
            CachedRow::Approval(a) => {
                self.approvals.insert(a.id, a);
            }
            CachedRow::Lock(l) => {
                self.locks.insert(l.environment, l);
            }
        }
    }

    fn current_row(&self, like: &CachedRow) -> Option<CachedRow> {
        match like {
            CachedRow::Approval(a) => self.approvals.get(&a.id).cloned().map(CachedRow::Approval),
            CachedRow::Lock(l) => self.locks.get(&l.environment).cloned().map(CachedRow::Lock),
        }
    }
}

#[derive(Debug, Clone)]
pub enum UiAction {
    SetMode(UiMode),
    ToggleSidebar,
    SelectApproval(Option<Uuid>),
    SelectEnvironment(Option<Environment>),
    /// Replace caches with a fresh full read.
    Loaded {
        approvals: Vec<ApprovalRequest>,
        locks: Vec<EnvironmentLock>,
    },
    RowChanged(ChangeEvent),
    OptimisticApproval {
        token: Uuid,
        transition: Transition<ApprovalRequest>,
    },
    OptimisticLock {
        token: Uuid,
        transition: Transition<EnvironmentLock>,
    },
    WriteSucceeded {
        token: Uuid,
    },
    WriteFailed {
        token: Uuid,
        message: String,
    },
    Notify {
        level: ToastLevel,
        message: String,
    },
    DismissToast(u64),
}

pub fn reduce(mut state: UiState, action: UiAction) -> UiState {
    match action {
        UiAction::SetMode(mode) => state.mode = mode,
        UiAction::ToggleSidebar => {
            state.sidebar = match state.sidebar {
                SidebarMode::Expanded => SidebarMode::Collapsed,
                SidebarMode::Collapsed => SidebarMode::Expanded,
            }
        }
        UiAction::SelectApproval(id) => state.selected_approval = id,
        UiAction::SelectEnvironment(env) => state.selected_environment = env,
        UiAction::Loaded { approvals, locks } => {
            state.approvals = approvals.into_iter().map(|a| (a.id, a)).collect();
            state.locks = locks.into_iter().map(|l| (l.environment, l)).collect();
            if let Some(id) = state.selected_approval {
                if !state.approvals.contains_key(&id) {
                    state.selected_approval = None;
                }
            }
        }
        UiAction::RowChanged(event) => apply_snapshot(&mut state, event.snapshot),
        UiAction::OptimisticApproval { token, transition } => {
            state.approvals.insert(transition.next.id, transition.next.clone());
            state.pending.insert(
                token,
                PendingWrite {
                    previous: CachedRow::Approval(transition.previous),
                    optimistic: CachedRow::Approval(transition.next),
                },
            );
        }
        UiAction::OptimisticLock { token, transition } => {
            state
                .locks
                .insert(transition.next.environment, transition.next.clone());
            state.pending.insert(
                token,
                PendingWrite {
                    previous: CachedRow::Lock(transition.previous),
                    optimistic: CachedRow::Lock(transition.next),
                },
            );
        }
        UiAction::WriteSucceeded { token } => {
            state.pending.remove(&token);
        }
        UiAction::WriteFailed { token, message } => {
            if let Some(pending) = state.pending.remove(&token) {
                // A newer realtime snapshot wins over our rollback.
                if state.current_row(&pending.optimistic).as_ref() == Some(&pending.optimistic) {
                    state.put_row(pending.previous);
                }
            }
            state.push_toast(ToastLevel::Error, message);
        }
        UiAction::Notify { level, message } => state.push_toast(level, message),
        UiAction::DismissToast(id) => state.toasts.retain(|t| t.id != id),
    }
    state
}

fn apply_snapshot(state: &mut UiState, snapshot: RowSnapshot) {
    match snapshot {
        RowSnapshot::ApprovalRequest(row) => {
            let stale = state
                .approvals
                .get(&row.id)
                .is_some_and(|cached| cached.version > row.version);
            if !stale {
                state.approvals.insert(row.id, row);
            }
        }
        RowSnapshot::EnvironmentLock(row) => {
            let stale = state
                .locks
                .get(&row.environment)
                .is_some_and(|cached| cached.version > row.version);
            if !stale {
                state.locks.insert(row.environment, row);
            }
        }
        // Votes, audit rows and role changes are not cached client-side.
        RowSnapshot::ApprovalVote(_)
        | RowSnapshot::AuditEntry(_)
        | RowSnapshot::RoleAssignment(_) => {}
    }
}
