//! Session lifecycle: scan, recon and beacon flood
//!
//! Every session owns a [`SessionHandle`] that tracks the processes and
//! temporary files it acquired. All teardown goes through
//! [`SessionHandle::teardown`], so no exit path can skip cleanup.

pub mod flood;
pub mod handle;
pub mod recon;
pub mod scan;

pub use flood::{FloodGroup, FloodSession, FloodStart, FloodStatus, FloodStrategy};
pub use handle::SessionHandle;
pub use recon::{ReconSession, ReconUpdate};
pub use scan::{ScanPhase, ScanSession};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a [`SessionHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SessionState {
    /// Forward-only transitions. `Starting -> Stopping` covers a failed start.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Whether the session may still own processes or files
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Running | SessionState::Stopping
        )
    }
}

/// The three kinds of session that can hold the interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Scan,
    Recon,
    Flood,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionKind::Scan => "scan",
            SessionKind::Recon => "recon",
            SessionKind::Flood => "flood",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_forward_only() {
        use SessionState::*;

        assert!(Idle.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Starting.can_transition_to(Stopping));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));

        assert!(!Running.can_transition_to(Idle));
        assert!(!Stopped.can_transition_to(Starting));
        assert!(!Idle.can_transition_to(Running));
        assert!(!Running.can_transition_to(Stopped));
    }

    #[test]
    fn test_active_states() {
        assert!(!SessionState::Idle.is_active());
        assert!(SessionState::Running.is_active());
        assert!(!SessionState::Stopped.is_active());
    }
}
