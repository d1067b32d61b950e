//! Error types for the collaborator seams.
//!
//! Remote failures are classified once, at the gateway boundary, so the
//! engine can decide locally whether a failure means "prune", "skip" or
//! "report".

use std::time::Duration;

/// Errors reported by the remote resource gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Resource not found")]
    NotFound,

    #[error("Missing access to resource")]
    Forbidden,

    #[error("Rate limited (retry after {}s)", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Remote transport failure: {0}")]
    Transport(String),
}

impl GatewayError {
    /// The resource no longer exists remotely.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// The resource exists but the actor cannot access it.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden)
    }

    /// Failure that the next scheduled pass may not see again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transport(_))
    }
}

/// Errors reported by the resource directory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Directory state lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_classification() {
        assert!(GatewayError::NotFound.is_not_found());
        assert!(!GatewayError::NotFound.is_transient());
        assert!(GatewayError::Forbidden.is_forbidden());
        assert!(
            GatewayError::RateLimited {
                retry_after: Duration::from_secs(3)
            }
            .is_transient()
        );
        assert!(GatewayError::Transport("reset".into()).is_transient());
        assert!(!GatewayError::Forbidden.is_transient());
    }

    #[test]
    fn test_rate_limited_display_includes_retry_after() {
        let err = GatewayError::RateLimited {
            retry_after: Duration::from_secs(12),
        };
        assert_eq!(err.to_string(), "Rate limited (retry after 12s)");
    }

    #[test]
    fn test_directory_error_display() {
        let err = DirectoryError::Unavailable("disk gone".to_string());
        assert!(err.to_string().contains("disk gone"));
    }
}
