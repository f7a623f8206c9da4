use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::models::VoteTarget;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Only reached through `VoteService::apply_vote`; the vote routes report
    /// a repeated vote as `success: false` instead.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Contention: {0}")]
    Contention(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Rate limit exceeded")]
    RateLimit,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Authentication(ref message) => (StatusCode::UNAUTHORIZED, message.as_str()),
            AppError::Authorization(ref message) => (StatusCode::FORBIDDEN, message.as_str()),
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.as_str()),
            AppError::Conflict(ref message) => (StatusCode::CONFLICT, message.as_str()),
            AppError::Contention(ref message) => {
                tracing::warn!("Contention: {}", message);
                (StatusCode::SERVICE_UNAVAILABLE, "Busy, please retry")
            }
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Jwt(ref e) => {
                tracing::error!("JWT error: {:?}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token")
            }
            AppError::RateLimit => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded"),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failures of the voting core.
#[derive(Error, Debug)]
pub enum VoteError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("{} {} not found", .0.kind.label(), .0.id)]
    TargetNotFound(VoteTarget),

    #[error("Vote already cast in this direction")]
    DuplicateVoteRequest,

    /// A second ledger row for the same (user, target) pair. Never expected.
    #[error("Duplicate vote record")]
    DuplicateVote,

    #[error("Contention: {0}")]
    Contention(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl VoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, VoteError::Contention(_))
    }
}

impl From<sqlx::Error> for VoteError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::PoolTimedOut = err {
            return VoteError::Contention("timed out acquiring a connection".to_string());
        }

        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned());

        match code.as_deref() {
            // unique_violation
            Some("23505") => VoteError::DuplicateVote,
            // lock_not_available, serialization_failure, deadlock_detected
            Some("55P03") | Some("40001") | Some("40P01") => VoteError::Contention(err.to_string()),
            _ => VoteError::Database(err),
        }
    }
}

impl From<VoteError> for AppError {
    fn from(err: VoteError) -> Self {
        match err {
            VoteError::Unauthenticated => AppError::Authentication("Not authenticated".to_string()),
            VoteError::TargetNotFound(_) => AppError::NotFound(err.to_string()),
            VoteError::DuplicateVoteRequest => AppError::Conflict(err.to_string()),
            VoteError::DuplicateVote => {
                AppError::Internal("Duplicate vote record for a single user".to_string())
            }
            VoteError::Contention(message) => AppError::Contention(message),
            VoteError::Database(e) => AppError::Database(e),
            VoteError::Storage(message) => AppError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn vote_errors_map_to_http_statuses() {
        let target = VoteTarget::post(Uuid::new_v4());

        assert_eq!(
            status_of(VoteError::Unauthenticated.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(VoteError::TargetNotFound(target).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(VoteError::DuplicateVoteRequest.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(VoteError::Contention("lock".to_string()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(VoteError::DuplicateVote.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(VoteError::Storage("disk".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_message_names_the_target() {
        let id = Uuid::new_v4();
        let message = VoteError::TargetNotFound(VoteTarget::comment(id)).to_string();
        assert_eq!(message, format!("Comment {} not found", id));
    }

    #[test]
    fn pool_timeout_is_retryable() {
        assert!(VoteError::from(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!VoteError::from(sqlx::Error::RowNotFound).is_retryable());
    }
}
