use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use crate::errors::AppError;
use crate::governance::lock_gate::LockGate;
use crate::governance::permissions::{Action, Actor};
use crate::governance::service::VoteReceipt;
use crate::models::approval::{ApprovalRequest, ApprovalStatus, ApprovalVote, VoteDecision};
use crate::models::audit::AuditEntry;
use crate::models::environment::Environment;
use crate::models::lock::EnvironmentLock;
use crate::models::role::{AccountRole, RoleAssignment};
use crate::AppState;

/// Header carrying the acting user's id.
pub const ACTOR_HEADER: &str = "x-opzenix-user";

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct PermissionQuery {
    pub action: String,
    pub environment: String,
}

#[derive(Deserialize)]
pub struct AssignRoleRequest {
    pub account_role: String,
}

#[derive(Deserialize)]
pub struct ApprovalListParams {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateApprovalRequest {
    pub title: String,
    pub environment: String,
    pub required_approvals: Option<i32>,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub decision: String, // "approve" | "reject"
    #[serde(default)]
    pub comment: String,
}

#[derive(Deserialize)]
pub struct LockRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct UnlockRequest {
    #[serde(default)]
    pub comment: String,
}

#[derive(Serialize)]
pub struct LockView {
    #[serde(flatten)]
    pub lock: EnvironmentLock,
    pub gate: LockGate,
}

#[derive(Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ── Helpers ──────────────────────────────────────────────────

async fn actor(state: &AppState, headers: &HeaderMap) -> Result<Actor, AppError> {
    let user_id = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthenticated)?;
    state.governance.resolve_actor(user_id).await
}

fn parse_environment(raw: &str) -> Result<Environment, AppError> {
    raw.parse().map_err(AppError::InvalidRequest)
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /api/v1/me: resolved roles, default mode and permission matrix
pub async fn whoami(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let actor = actor(&state, &headers).await?;
    Ok(Json(json!({
        "user_id": actor.user_id,
        "account_role": actor.profile.account_role,
        "roles": actor.profile.roles,
        "default_mode": actor.profile.default_mode,
        "permissions": actor.permissions.matrix(),
    })))
}

/// GET /api/v1/permissions/check?action=approve&environment=prod
pub async fn check_permission(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<PermissionQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let actor = actor(&state, &headers).await?;
    let action: Action = params.action.parse().map_err(AppError::InvalidRequest)?;
    let environment = parse_environment(&params.environment)?;
    Ok(Json(json!({
        "action": action,
        "environment": environment,
        "allowed": actor.can(action, environment),
    })))
}

/// GET /api/v1/roles: list role assignments
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RoleAssignment>>, AppError> {
    Ok(Json(state.governance.list_roles().await?))
}

/// GET /api/v1/roles/:user_id: effective role of a user
pub async fn get_role(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let resolved = state.governance.resolve_actor(&user_id).await?;
    Ok(Json(json!({
        "user_id": resolved.user_id,
        "account_role": resolved.account_role(),
        "default_mode": resolved.profile.default_mode,
    })))
}

/// PUT /api/v1/roles/:user_id: assign an account role (admin only)
pub async fn assign_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<Json<RoleAssignment>, AppError> {
    let actor = actor(&state, &headers).await?;
    let role: AccountRole = payload
        .account_role
        .parse()
        .map_err(AppError::InvalidRequest)?;
    let assignment = state.governance.assign_role(&actor, &user_id, role).await?;
    Ok(Json(assignment))
}

/// GET /api/v1/approvals?status=pending
pub async fn list_approvals(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ApprovalListParams>,
) -> Result<Json<Vec<ApprovalRequest>>, AppError> {
    let status: Option<ApprovalStatus> = params
        .status
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(AppError::InvalidRequest)?;
    Ok(Json(state.governance.list_approvals(status).await?))
}

/// POST /api/v1/approvals: open an approval request
pub async fn create_approval(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateApprovalRequest>,
) -> Result<(StatusCode, Json<ApprovalRequest>), AppError> {
    let actor = actor(&state, &headers).await?;
    let environment = parse_environment(&payload.environment)?;
    let request = state
        .governance
        .create_approval_request(
            &actor,
            &payload.title,
            environment,
            payload.required_approvals.unwrap_or(1),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/v1/approvals/:id
pub async fn get_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovalRequest>, AppError> {
    Ok(Json(state.governance.get_approval(id).await?))
}

/// GET /api/v1/approvals/:id/votes
pub async fn list_votes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ApprovalVote>>, AppError> {
    Ok(Json(state.governance.list_votes(id).await?))
}

/// POST /api/v1/approvals/:id/votes: approve or reject, comment required
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteReceipt>, AppError> {
    let actor = actor(&state, &headers).await?;
    let decision: VoteDecision = payload.decision.parse().map_err(|e: String| {
        tracing::warn!("cast_vote: invalid decision: {}", payload.decision);
        AppError::InvalidRequest(e)
    })?;
    let receipt = state
        .governance
        .cast_vote(&actor, id, decision, &payload.comment)
        .await?;
    Ok(Json(receipt))
}

/// GET /api/v1/locks: every lock with the caller's lock/unlock gate
pub async fn list_locks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<LockView>>, AppError> {
    let actor = actor(&state, &headers).await?;
    let locks = state.governance.list_locks().await?;
    Ok(Json(
        locks
            .into_iter()
            .map(|lock| LockView {
                gate: crate::governance::lock_gate::evaluate(&lock, actor.account_role()),
                lock,
            })
            .collect(),
    ))
}

/// GET /api/v1/locks/:environment
pub async fn get_lock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(environment): Path<String>,
) -> Result<Json<LockView>, AppError> {
    let actor = actor(&state, &headers).await?;
    let environment = parse_environment(&environment)?;
    let (lock, gate) = state.governance.lock_gate(&actor, environment).await?;
    Ok(Json(LockView { lock, gate }))
}

/// POST /api/v1/locks/:environment/lock
pub async fn lock_environment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(environment): Path<String>,
    payload: Option<Json<LockRequest>>,
) -> Result<Json<EnvironmentLock>, AppError> {
    let actor = actor(&state, &headers).await?;
    let environment = parse_environment(&environment)?;
    let reason = payload.and_then(|Json(p)| p.reason);
    let lock = state
        .governance
        .lock_environment(&actor, environment, reason)
        .await?;
    Ok(Json(lock))
}

/// POST /api/v1/locks/:environment/unlock: comment required
pub async fn unlock_environment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(environment): Path<String>,
    Json(payload): Json<UnlockRequest>,
) -> Result<Json<EnvironmentLock>, AppError> {
    let actor = actor(&state, &headers).await?;
    let environment = parse_environment(&environment)?;
    let lock = state
        .governance
        .unlock_environment(&actor, environment, &payload.comment)
        .await?;
    Ok(Json(lock))
}

/// GET /api/v1/audit: newest first, paginated
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let limit = params.limit.unwrap_or(50);
    let offset = params.offset.unwrap_or(0);
    Ok(Json(state.governance.list_audit(limit, offset).await?))
}

/// GET /api/v1/events: SSE stream of row-change snapshots
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.governance.feed().subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(event) => {
                let data = serde_json::to_string(&event).ok()?;
                Some(Ok(Event::default().event(event.snapshot.table()).data(data)))
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "change stream subscriber lagged");
                // Client should refetch everything.
                Some(Ok(Event::default().event("resync").data(skipped.to_string())))
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
