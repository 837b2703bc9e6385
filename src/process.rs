//! Process handles for external tools
//!
//! A [`ProcessHandle`] owns exactly one spawned OS process. Stopping sends
//! SIGTERM, waits for the grace period and then force-kills; it never fails
//! and is a no-op once the process is gone.

use crate::{Result, SessionError};
use log::{debug, warn};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// What to do with the child's stdout and stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Redirect both streams to /dev/null
    Discard,
    /// Share the parent's terminal
    Inherit,
}

impl IoMode {
    fn stdio(self) -> Stdio {
        match self {
            IoMode::Discard => Stdio::null(),
            IoMode::Inherit => Stdio::inherit(),
        }
    }
}

/// Handle to one spawned external process
#[derive(Debug)]
pub struct ProcessHandle {
    label: String,
    pid: Option<u32>,
    child: Option<Child>,
}

impl ProcessHandle {
    /// Spawn `argv[0]` with the remaining arguments.
    ///
    /// stdin is always closed so repeated start/stop cycles do not
    /// accumulate descriptors, and the child is killed if the handle is
    /// dropped without being stopped.
    pub fn start(argv: &[String], io: IoMode) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SessionError::SpawnFailed("empty command line".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(io.stdio())
            .stderr(io.stdio())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| SessionError::SpawnFailed(format!("{}: {}", program, e)))?;

        let pid = child.id();
        debug!("Spawned {:?} (pid {:?})", argv, pid);

        Ok(Self {
            label: argv.join(" "),
            pid,
            child: Some(child),
        })
    }

    /// Command line the process was started with
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Check whether the process is still running, reaping it if it exited.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("{} exited with {}", self.label, status);
                self.child = None;
                false
            }
            Err(e) => {
                warn!("Failed to poll {}: {}", self.label, e);
                false
            }
        }
    }

    /// Terminate the process: SIGTERM, wait up to `grace`, then SIGKILL.
    pub async fn stop(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!("{} already exited with {}", self.label, status);
            return;
        }

        terminate(&mut child);

        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => debug!("{} stopped with {}", self.label, status),
            Ok(Err(e)) => warn!("Failed to wait for {}: {}", self.label, e),
            Err(_) => {
                warn!("{} ignored SIGTERM for {:?}, killing", self.label, grace);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", self.label, e);
                }
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to a child we have not reaped yet
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            debug!("SIGTERM to {} failed: {}", pid, std::io::Error::last_os_error());
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

/// Spawns processes for sessions
pub trait Launcher: Send + Sync {
    fn launch(&self, argv: &[String], io: IoMode) -> Result<ProcessHandle>;
}

/// Launcher that spawns real OS processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, argv: &[String], io: IoMode) -> Result<ProcessHandle> {
        ProcessHandle::start(argv, io)
    }
}

/// SIGKILL every process whose `/proc/[pid]/comm` equals `name`.
///
/// Used as a fallback for processes whose handle was lost. Returns the
/// number of processes signalled.
#[cfg(target_os = "linux")]
pub fn kill_by_name(name: &str) -> usize {
    use std::fs;

    if name.is_empty() {
        return 0;
    }

    // comm is truncated to 15 bytes by the kernel
    let wanted = &name.as_bytes()[..name.len().min(15)];
    let own_pid = std::process::id() as i32;

    let entries = match fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read /proc: {}", e);
            return 0;
        }
    };

    let mut killed = 0;
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else {
            continue;
        };
        if pid == own_pid {
            continue;
        }

        let Ok(comm) = fs::read(entry.path().join("comm")) else {
            continue;
        };
        if comm.strip_suffix(b"\n").unwrap_or(comm.as_slice()) != wanted {
            continue;
        }

        // SAFETY: plain signal delivery, a stale pid only yields ESRCH
        if unsafe { libc::kill(pid, libc::SIGKILL) } == 0 {
            debug!("Killed stray {} (pid {})", name, pid);
            killed += 1;
        }
    }

    killed
}

#[cfg(not(target_os = "linux"))]
pub fn kill_by_name(_name: &str) -> usize {
    0
}
