//! Owned resources of one session run

use super::SessionState;
use crate::process::ProcessHandle;
use crate::{Result, SessionError};
use futures::future::join_all;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Processes and temporary files acquired by a session, plus its state.
///
/// Anything the session spawns or writes is registered here at the moment
/// it is acquired. [`teardown`](Self::teardown) stops every process and
/// deletes every file before the handle reaches `Stopped`. A handle that is
/// dropped while still active kills its children and removes its files on
/// a best-effort basis.
#[derive(Debug)]
pub struct SessionHandle {
    name: String,
    state: SessionState,
    processes: Vec<ProcessHandle>,
    artifacts: BTreeSet<PathBuf>,
}

impl SessionHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: SessionState::Idle,
            processes: Vec::new(),
            artifacts: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`, rejecting anything but a forward transition
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("{} session: {:?} -> {:?}", self.name, self.state, next);
        self.state = next;
        Ok(())
    }

    pub fn begin(&mut self) -> Result<()> {
        self.transition(SessionState::Starting)
    }

    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(SessionState::Running)
    }

    pub fn track_process(&mut self, process: ProcessHandle) {
        self.processes.push(process);
    }

    pub fn track_artifact(&mut self, path: impl Into<PathBuf>) {
        self.artifacts.insert(path.into());
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.artifacts.iter().map(PathBuf::as_path)
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.processes.iter().filter_map(ProcessHandle::pid).collect()
    }

    /// Number of tracked processes that have not exited
    pub fn alive_count(&mut self) -> usize {
        self.processes
            .iter_mut()
            .map(ProcessHandle::is_alive)
            .filter(|alive| *alive)
            .count()
    }

    /// Stop every tracked process concurrently without touching files or
    /// state. Used when output must be read after the tool exits.
    pub async fn stop_processes(&mut self, grace: Duration) {
        join_all(self.processes.iter_mut().map(|p| p.stop(grace))).await;
    }

    /// Stop all processes, delete all artifacts and reach `Stopped`.
    ///
    /// A no-op on a handle that never started or already stopped. Failed
    /// deletions are logged and returned as `CleanupFailed`; they never
    /// prevent the handle from reaching `Stopped`.
    pub async fn teardown(&mut self, grace: Duration) -> Vec<SessionError> {
        match self.state {
            SessionState::Idle | SessionState::Stopped => return Vec::new(),
            SessionState::Starting | SessionState::Running => {
                self.state = SessionState::Stopping;
                debug!("{} session: stopping", self.name);
            }
            SessionState::Stopping => {}
        }

        self.stop_processes(grace).await;
        self.processes.clear();

        let mut failures = Vec::new();
        for path in std::mem::take(&mut self.artifacts) {
            if let Err(e) = remove_artifact(&path).await {
                warn!("{}", e);
                failures.push(e);
            }
        }

        self.state = SessionState::Stopped;
        debug!("{} session: stopped", self.name);
        failures
    }
}

async fn remove_artifact(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        // The tool may never have created it
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SessionError::CleanupFailed(format!(
            "{}: {}",
            path.display(),
            e
        ))),
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.state.is_active() {
            return;
        }
        // Children are killed by kill_on_drop
        warn!("{} session dropped while {:?}", self.name, self.state);
        for path in &self.artifacts {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::IoMode;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rejects_backward_transition() {
        let mut handle = SessionHandle::new("test");
        assert!(handle.mark_running().is_err());

        handle.begin().unwrap();
        handle.mark_running().unwrap();
        match handle.begin() {
            Err(SessionError::InvalidTransition { from, to }) => {
                assert_eq!(from, SessionState::Running);
                assert_eq!(to, SessionState::Starting);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_teardown_idle_is_noop() {
        let mut handle = SessionHandle::new("test");
        assert!(handle.teardown(Duration::from_millis(10)).await.is_empty());
        assert_eq!(handle.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_teardown_removes_artifacts_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let written = dir.path().join("written.csv");
        let never_created = dir.path().join("never.csv");
        std::fs::write(&written, "data").unwrap();

        let mut handle = SessionHandle::new("test");
        handle.begin().unwrap();
        handle.track_artifact(&written);
        handle.track_artifact(&never_created);
        handle.mark_running().unwrap();

        let failures = handle.teardown(Duration::from_millis(100)).await;
        assert!(failures.is_empty());
        assert!(!written.exists());
        assert_eq!(handle.state(), SessionState::Stopped);
        assert_eq!(handle.artifacts().count(), 0);

        assert!(handle.teardown(Duration::from_millis(100)).await.is_empty());
        assert_eq!(handle.state(), SessionState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_teardown_stops_processes() {
        let mut handle = SessionHandle::new("test");
        handle.begin().unwrap();
        handle.track_process(ProcessHandle::start(&argv(&["sleep", "30"]), IoMode::Discard).unwrap());
        handle.track_process(ProcessHandle::start(&argv(&["sleep", "30"]), IoMode::Discard).unwrap());
        handle.mark_running().unwrap();
        assert_eq!(handle.alive_count(), 2);

        handle.teardown(Duration::from_secs(2)).await;
        assert_eq!(handle.process_count(), 0);
        assert_eq!(handle.state(), SessionState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_alive_count_skips_exited_processes() {
        let mut handle = SessionHandle::new("test");
        handle.begin().unwrap();
        handle.track_process(ProcessHandle::start(&argv(&["true"]), IoMode::Discard).unwrap());
        handle.track_process(ProcessHandle::start(&argv(&["sleep", "30"]), IoMode::Discard).unwrap());
        handle.mark_running().unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while handle.alive_count() != 1 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(handle.alive_count(), 1);
        assert_eq!(handle.process_count(), 2);

        handle.teardown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_failed_start_can_stop() {
        let mut handle = SessionHandle::new("test");
        handle.begin().unwrap();
        handle.teardown(Duration::from_millis(10)).await;
        assert_eq!(handle.state(), SessionState::Stopped);
    }
}
