use thiserror::Error;
use uuid::Uuid;

pub type CampaignResult<T> = Result<T, CampaignError>;

/// Failure reported by the advertising platform API.
///
/// Every variant carries its own retry classification so callers never have
/// to inspect HTTP codes themselves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdServiceError {
    #[error("[RATE_LIMIT_EXCEEDED] {0} (HTTP 429)")]
    RateLimited(String),

    #[error("[AWS_SERVER_ERROR] {0} (HTTP 500)")]
    Server(String),

    #[error("[REQUEST_TIMEOUT] no response after {0} ms (HTTP 504)")]
    Timeout(u64),

    #[error("[AUTH_FAILED] {0} (HTTP 401)")]
    Unauthorized(String),

    #[error("[VALIDATION_ERROR] {0} (HTTP 400)")]
    Validation(String),
}

impl AdServiceError {
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            AdServiceError::RateLimited(_) | AdServiceError::Server(_) | AdServiceError::Timeout(_)
        )
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AdServiceError::RateLimited(_) => 429,
            AdServiceError::Server(_) => 500,
            AdServiceError::Timeout(_) => 504,
            AdServiceError::Unauthorized(_) => 401,
            AdServiceError::Validation(_) => 400,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AdServiceError::RateLimited(_) => "RATE_LIMIT_EXCEEDED",
            AdServiceError::Server(_) => "AWS_SERVER_ERROR",
            AdServiceError::Timeout(_) => "REQUEST_TIMEOUT",
            AdServiceError::Unauthorized(_) => "AUTH_FAILED",
            AdServiceError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Campaign with ID {0} not found")]
    NotFound(Uuid),

    #[error("Campaign {id} was modified concurrently (expected status {expected})")]
    Conflict { id: Uuid, expected: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Campaign {id} has exceeded maximum retries ({max_retries})")]
    MaxRetriesExceeded { id: Uuid, max_retries: u32 },

    #[error("Campaign {id} cannot be retried. Status: {status}, Retries: {retry_count}/{max_retries}")]
    NotRetryable {
        id: Uuid,
        status: String,
        retry_count: u32,
        max_retries: u32,
    },

    #[error("Campaign {0} is already synced with the ad platform and cannot be deleted")]
    CannotDeleteSynced(Uuid),

    #[error("Ad platform error: {0}")]
    AdService(#[from] AdServiceError),

    #[error("Task dispatcher is shut down")]
    DispatcherClosed,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CampaignError {
    /// Errors that say nothing about the campaign itself, only about the
    /// machinery around it.
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            CampaignError::Storage(_) | CampaignError::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(AdServiceError::RateLimited("slow down".into()).retryable());
        assert!(AdServiceError::Server("boom".into()).retryable());
        assert!(AdServiceError::Timeout(30_000).retryable());
        assert!(!AdServiceError::Validation("bad budget".into()).retryable());
        assert!(!AdServiceError::Unauthorized("expired token".into()).retryable());
    }

    #[test]
    fn test_ad_service_error_display() {
        let err = AdServiceError::RateLimited("Rate limit exceeded. Retry after 60 seconds.".into());
        assert_eq!(
            err.to_string(),
            "[RATE_LIMIT_EXCEEDED] Rate limit exceeded. Retry after 60 seconds. (HTTP 429)"
        );
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.error_code(), "RATE_LIMIT_EXCEEDED");
    }

    #[test]
    fn test_unexpected_errors() {
        assert!(CampaignError::Storage("disk gone".into()).is_unexpected());
        assert!(!CampaignError::NotFound(Uuid::new_v4()).is_unexpected());
        assert!(!CampaignError::AdService(AdServiceError::Server("x".into())).is_unexpected());
    }
}
