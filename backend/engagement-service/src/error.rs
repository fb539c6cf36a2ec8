/// Error types for engagement-service
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// PostgreSQL `lock_not_available`, raised when `lock_timeout` expires
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";
/// PostgreSQL `unique_violation`
const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum EngagementError {
    /// Bad input: empty/oversized comment, non-positive tip amount
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or invalid identity
    #[error("authentication required")]
    Auth,

    /// Authenticated, but not allowed to touch this resource
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Archived story, invalid status transition
    #[error("conflict: {0}")]
    Conflict(String),

    /// The payment reference was already recorded as a tip
    #[error("conflict: payment {0} already recorded")]
    DuplicatePayment(String),

    /// The story row lock could not be acquired in time
    #[error("story is busy, try again")]
    Busy,

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for EngagementError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            match db_err.code().as_deref() {
                Some(PG_LOCK_NOT_AVAILABLE) => return EngagementError::Busy,
                Some(PG_UNIQUE_VIOLATION) => {
                    return EngagementError::Conflict(db_err.message().to_string())
                }
                _ => {}
            }
        }
        EngagementError::Database(err)
    }
}

impl EngagementError {
    /// Returns whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            EngagementError::Busy => true,
            EngagementError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// Stable machine-readable kind, used in JSON error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            EngagementError::Validation(_) => "validation",
            EngagementError::NotFound(_) => "not_found",
            EngagementError::Auth => "auth",
            EngagementError::Forbidden(_) => "forbidden",
            EngagementError::Conflict(_) | EngagementError::DuplicatePayment(_) => "conflict",
            EngagementError::Busy => "busy",
            EngagementError::Database(_)
            | EngagementError::Migration(_)
            | EngagementError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    retryable: bool,
}

impl ResponseError for EngagementError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngagementError::Validation(_) => StatusCode::BAD_REQUEST,
            EngagementError::NotFound(_) => StatusCode::NOT_FOUND,
            EngagementError::Auth => StatusCode::UNAUTHORIZED,
            EngagementError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngagementError::Conflict(_) | EngagementError::DuplicatePayment(_) => {
                StatusCode::CONFLICT
            }
            EngagementError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            EngagementError::Database(_) if self.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            EngagementError::Database(_)
            | EngagementError::Migration(_)
            | EngagementError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            // Do not leak driver details to clients
            EngagementError::Database(_)
            | EngagementError::Migration(_)
            | EngagementError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind(),
            message,
            retryable: self.is_retryable(),
        })
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, EngagementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            EngagementError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngagementError::NotFound("story".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(EngagementError::Auth.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            EngagementError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngagementError::DuplicatePayment("pi_1".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngagementError::Busy.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(EngagementError::Busy.is_retryable());
        assert!(EngagementError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!EngagementError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!EngagementError::Validation("empty".into()).is_retryable());
        assert!(!EngagementError::Conflict("dup".into()).is_retryable());
        assert!(!EngagementError::Auth.is_retryable());
    }
}
