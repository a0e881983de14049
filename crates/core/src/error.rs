//! Error types shared by the registry, media router, pipeline and controller.

use crate::session::SessionId;
use std::time::Duration;

/// Errors surfaced by agent lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("Invalid agent configuration: {0}")]
    InvalidConfig(String),
    #[error("Session '{0}' already exists")]
    DuplicateSession(SessionId),
    #[error("Session '{0}' not found")]
    NotFound(SessionId),
    #[error("Channel '{0}' is unavailable")]
    ChannelUnavailable(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("Service error: {0}")]
    ServiceError(String),
}

impl AgentError {
    /// Transport-level failures the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ChannelUnavailable(_) | AgentError::NetworkError(_)
        )
    }
}

/// Failure reported by an external speech or language service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Service timed out")]
    Timeout,
    #[error("Service request failed: {0}")]
    Failed(String),
}

impl From<ServiceError> for AgentError {
    fn from(err: ServiceError) -> Self {
        AgentError::ServiceError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = SessionId::new("lobby", "guide");
        assert_eq!(
            AgentError::DuplicateSession(id.clone()).to_string(),
            "Session 'lobby/guide' already exists"
        );
        assert_eq!(
            AgentError::NotFound(id).to_string(),
            "Session 'lobby/guide' not found"
        );
        assert_eq!(
            AgentError::Timeout(Duration::from_secs(10)).to_string(),
            "Timed out after 10000ms"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(AgentError::NetworkError("reset".into()).is_retryable());
        assert!(AgentError::ChannelUnavailable("lobby".into()).is_retryable());
        assert!(!AgentError::InvalidConfig("empty".into()).is_retryable());
        assert!(!AgentError::ServiceError("boom".into()).is_retryable());
    }
}
