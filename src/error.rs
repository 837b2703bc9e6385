//! Error handling for session lifecycle operations
//!
//! Precondition failures are returned before any process is spawned,
//! runtime failures travel over the session's result channel, and cleanup
//! failures are only ever logged.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionState;

/// Main error type for session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Interface not in monitor mode: {0}")]
    ModeNotReady(String),

    #[error("Tool produced no output file: {}", .0.display())]
    OutputMissing(PathBuf),

    #[error("Parse degraded: {skipped} rows skipped")]
    ParseDegraded { skipped: usize },

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Cleanup failed: {0}")]
    CleanupFailed(String),

    #[error("Interface busy: {0}")]
    InterfaceBusy(String),

    #[error("Invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("Process exited unexpectedly: {0}")]
    ProcessExited(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SessionError {
    /// Errors raised by checks that run before anything is spawned.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SessionError::ModeNotReady(_)
                | SessionError::InvalidTarget(_)
                | SessionError::InterfaceBusy(_)
                | SessionError::ConfigError(_)
        )
    }

    /// Errors that are reported but never end a session.
    pub fn is_non_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::ParseDegraded { .. } | SessionError::CleanupFailed(_)
        )
    }
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SessionError::ModeNotReady("wlan1mon".into()).is_precondition());
        assert!(SessionError::InvalidTarget("no bssid".into()).is_precondition());
        assert!(!SessionError::SpawnFailed("enoent".into()).is_precondition());

        assert!(SessionError::ParseDegraded { skipped: 2 }.is_non_fatal());
        assert!(SessionError::CleanupFailed("busy".into()).is_non_fatal());
        assert!(!SessionError::Cancelled.is_non_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = SessionError::OutputMissing(PathBuf::from("/tmp/scan-01.csv"));
        assert_eq!(err.to_string(), "Tool produced no output file: /tmp/scan-01.csv");

        let err = SessionError::InvalidTransition {
            from: SessionState::Idle,
            to: SessionState::Running,
        };
        assert_eq!(err.to_string(), "Invalid session transition: Idle -> Running");
    }
}
