use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::governance::lock_gate::LockError;
use crate::governance::quorum::QuorumError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unknown actor")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("a non-empty comment is required")]
    MissingComment,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("approval request is already {0}")]
    AlreadyResolved(&'static str),

    #[error("requester may not approve their own request")]
    SelfApproval,

    #[error("user has already voted on this request")]
    DuplicateVote,

    #[error("lock state conflict: {0}")]
    LockConflict(String),

    #[error("concurrent update, retry: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<QuorumError> for AppError {
    fn from(e: QuorumError) -> Self {
        match e {
            QuorumError::AlreadyResolved(status) => AppError::AlreadyResolved(status),
        }
    }
}

impl From<LockError> for AppError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Denied { .. } => AppError::Forbidden(e.to_string()),
            LockError::AlreadyLocked(_) | LockError::NotLocked(_) => {
                AppError::LockConflict(e.to_string())
            }
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "unknown_actor",
            ),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "permission_error", "forbidden"),
            AppError::MissingComment => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "comment_required",
            ),
            AppError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error", "not_found"),
            AppError::AlreadyResolved(_) => {
                (StatusCode::CONFLICT, "conflict_error", "already_resolved")
            }
            AppError::SelfApproval => (StatusCode::CONFLICT, "conflict_error", "self_approval"),
            AppError::DuplicateVote => (StatusCode::CONFLICT, "conflict_error", "duplicate_vote"),
            AppError::LockConflict(_) => (StatusCode::CONFLICT, "conflict_error", "lock_state"),
            AppError::Conflict(_) => {
                (StatusCode::CONFLICT, "conflict_error", "concurrent_update")
            }
            AppError::Database(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal_server_error",
            ),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts().0
    }

    pub fn code(&self) -> &'static str {
        self.parts().2
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = self.parts();
        let msg = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "internal server error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
