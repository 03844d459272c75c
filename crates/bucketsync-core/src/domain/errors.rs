//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures, invalid state transitions, and path errors.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid local path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid relative (slash-separated) path
    #[error("Invalid relative path: {0}")]
    InvalidRelativePath(String),

    /// Invalid remote key prefix
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Invalid fingerprint format (expected 32 hex digits)
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Unknown sync direction name
    #[error("Invalid sync direction: {0}")]
    InvalidDirection(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidPath("relative/path".to_string());
        assert_eq!(err.to_string(), "Invalid path: relative/path");

        let err = DomainError::InvalidDirection("sideways".to_string());
        assert_eq!(err.to_string(), "Invalid sync direction: sideways");

        let err = DomainError::InvalidState {
            from: "Completed".to_string(),
            to: "Running".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Completed to Running"
        );
    }

    #[test]
    fn test_parse_failures_name_the_rejected_value() {
        let err = "sideways"
            .parse::<crate::domain::SyncDirection>()
            .unwrap_err();
        assert_eq!(err, DomainError::InvalidDirection("sideways".to_string()));

        let err = crate::domain::RelativePath::new("../escape").unwrap_err();
        assert!(matches!(err, DomainError::InvalidRelativePath(_)));
        assert!(err.to_string().contains("../escape"));
    }
}
