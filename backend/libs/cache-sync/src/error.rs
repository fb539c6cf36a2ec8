use resilience::Transient;
use thiserror::Error;

/// Failure reported by the engagement API, already classified by kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("conflict: {0}")]
    Conflict(String),

    /// No answer within the deadline; the server may still have applied it
    #[error("request timed out")]
    Timeout,

    /// The server applied nothing (503 busy, or the request never left)
    #[error("transient: {0}")]
    Transient(String),

    /// Any other server failure; whether anything was applied is unknown
    #[error("server error: {0}")]
    Server(String),
}

impl ApiError {
    /// Maps an HTTP status and the service's `error` kind to a variant
    pub fn from_status(status: u16, kind: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match (status, kind) {
            (400, _) | (_, "validation") => ApiError::Validation(message),
            (401, _) | (_, "auth") => ApiError::Unauthorized,
            (404, _) | (_, "not_found") => ApiError::NotFound(message),
            (409, _) | (_, "conflict") => ApiError::Conflict(message),
            (408, _) | (504, _) => ApiError::Timeout,
            (503, _) => ApiError::Transient(message),
            _ => ApiError::Server(message),
        }
    }

    /// Whether a request that failed this way can be sent again without
    /// risking a second application. Only true when the server applied nothing.
    pub fn is_safe_to_replay(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }
}

/// Retry classification for reads, which are always safe to repeat
impl Transient for ApiError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout | ApiError::Transient(_) | ApiError::Server(_)
        )
    }
}

/// What the screen should show after a mutation could not be confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Shown next to the input that was rejected
    InlineError(String),
    /// The story was removed or is no longer reachable
    StoryUnavailable,
    /// The viewer has to sign in again
    LoginRequired,
    /// Retries were exhausted; the action was reverted
    TryAgain,
}

impl Notice {
    /// `None` means the failure is resolved silently
    pub fn for_error(err: &ApiError) -> Option<Notice> {
        match err {
            ApiError::Validation(message) => Some(Notice::InlineError(message.clone())),
            ApiError::NotFound(_) => Some(Notice::StoryUnavailable),
            ApiError::Unauthorized => Some(Notice::LoginRequired),
            ApiError::Conflict(_) => None,
            ApiError::Timeout | ApiError::Transient(_) | ApiError::Server(_) => {
                Some(Notice::TryAgain)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from_status(400, "validation", "empty"),
            ApiError::Validation("empty".into())
        );
        assert_eq!(ApiError::from_status(401, "auth", ""), ApiError::Unauthorized);
        assert!(matches!(
            ApiError::from_status(404, "not_found", ""),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_status(409, "conflict", ""),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from_status(503, "busy", ""),
            ApiError::Transient(_)
        ));
        assert!(matches!(
            ApiError::from_status(500, "internal", ""),
            ApiError::Server(_)
        ));
        assert_eq!(ApiError::from_status(504, "", ""), ApiError::Timeout);
    }

    #[test]
    fn test_reads_retry_any_server_side_failure() {
        assert!(ApiError::Timeout.is_transient());
        assert!(ApiError::Transient("reset".into()).is_transient());
        assert!(ApiError::Server("500".into()).is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
        assert!(!ApiError::Conflict("archived".into()).is_transient());
    }

    #[test]
    fn test_only_unapplied_failures_are_safe_to_replay() {
        assert!(ApiError::Transient("busy".into()).is_safe_to_replay());
        assert!(!ApiError::Timeout.is_safe_to_replay());
        assert!(!ApiError::Server("500".into()).is_safe_to_replay());
        assert!(!ApiError::Validation("empty".into()).is_safe_to_replay());
    }

    #[test]
    fn test_conflict_is_silent() {
        assert_eq!(Notice::for_error(&ApiError::Conflict("dup".into())), None);
        assert_eq!(Notice::for_error(&ApiError::Timeout), Some(Notice::TryAgain));
        assert_eq!(
            Notice::for_error(&ApiError::NotFound("gone".into())),
            Some(Notice::StoryUnavailable)
        );
    }
}
