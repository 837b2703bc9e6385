//! Timed network discovery

use super::SessionHandle;
use crate::config::SessionConfig;
use crate::monitor::ModeProbe;
use crate::parser::CsvScanParser;
use crate::process::{IoMode, Launcher};
use crate::records::NetworkRecord;
use crate::{Result, SessionError};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Phase of the scan state machine: `Idle -> Scanning -> Succeeded | Failed -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Scanning,
    Succeeded,
    Failed,
}

/// Runs the scanner for a fixed duration and returns the networks it saw
pub struct ScanSession {
    config: Arc<SessionConfig>,
    launcher: Arc<dyn Launcher>,
    probe: Arc<dyn ModeProbe>,
    phase: Mutex<ScanPhase>,
    handle: Mutex<SessionHandle>,
    cancel: Mutex<CancellationToken>,
}

impl ScanSession {
    pub fn new(config: Arc<SessionConfig>, launcher: Arc<dyn Launcher>, probe: Arc<dyn ModeProbe>) -> Self {
        Self {
            config,
            launcher,
            probe,
            phase: Mutex::new(ScanPhase::Idle),
            handle: Mutex::new(SessionHandle::new("scan")),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub async fn phase(&self) -> ScanPhase {
        *self.phase.lock().await
    }

    pub async fn is_active(&self) -> bool {
        self.phase().await != ScanPhase::Idle
    }

    /// Reserve the session for a run. Fails with `InterfaceBusy` if a scan
    /// is already in progress.
    pub async fn claim(&self) -> Result<()> {
        let mut phase = self.phase.lock().await;
        if *phase != ScanPhase::Idle {
            return Err(SessionError::InterfaceBusy("a scan is already running".to_string()));
        }
        *phase = ScanPhase::Scanning;
        *self.cancel.lock().await = CancellationToken::new();
        Ok(())
    }

    /// Scan `interface` for `duration` and return the named networks found.
    ///
    /// The capture file is removed whatever the outcome, and the session is
    /// back to `Idle` when this returns.
    pub async fn run(&self, interface: &str, duration: Duration) -> Result<Vec<NetworkRecord>> {
        self.claim().await?;
        self.run_claimed(interface, duration).await
    }

    /// Body of [`run`](Self::run) for a session already reserved with
    /// [`claim`](Self::claim).
    pub async fn run_claimed(&self, interface: &str, duration: Duration) -> Result<Vec<NetworkRecord>> {
        let result = self.scan(interface, duration).await;

        let outcome = match &result {
            Ok(networks) => {
                info!("Scan on {} found {} networks", interface, networks.len());
                ScanPhase::Succeeded
            }
            Err(e) => {
                warn!("Scan on {} failed: {}", interface, e);
                ScanPhase::Failed
            }
        };
        let mut phase = self.phase.lock().await;
        debug!("scan phase: {:?} -> Idle", outcome);
        *phase = ScanPhase::Idle;

        result
    }

    /// Cancel a running scan. Returns once the scanner is dead and the
    /// capture file is gone; a no-op when idle.
    pub async fn stop(&self) {
        self.cancel.lock().await.cancel();
        let mut handle = self.handle.lock().await;
        handle.teardown(self.config.grace_period()).await;
    }

    async fn scan(&self, interface: &str, duration: Duration) -> Result<Vec<NetworkRecord>> {
        if !self.probe.is_ready(interface) {
            return Err(SessionError::ModeNotReady(interface.to_string()));
        }

        let cancel = self.cancel.lock().await.clone();
        let grace = self.config.grace_period();
        let prefix = self
            .config
            .work_dir
            .join(format!("scan-{}", Uuid::new_v4().simple()));
        let output = capture_path(&prefix);

        {
            let mut handle = self.handle.lock().await;
            *handle = SessionHandle::new("scan");
            handle.begin()?;
            handle.track_artifact(&output);

            let argv = scan_command(&self.config.scanner, interface, &prefix);
            match self.launcher.launch(&argv, IoMode::Discard) {
                Ok(process) => handle.track_process(process),
                Err(e) => {
                    handle.teardown(grace).await;
                    return Err(e);
                }
            }
            handle.mark_running()?;
        }

        info!("Scanning on {} for {:?}", interface, duration);
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }

        let mut handle = self.handle.lock().await;
        if cancel.is_cancelled() {
            handle.teardown(grace).await;
            return Err(SessionError::Cancelled);
        }

        handle.stop_processes(grace).await;
        let parsed = read_dump(&output);
        handle.teardown(grace).await;

        let dump = parsed?;
        if let Some(degraded) = dump.degradation() {
            debug!("{}", degraded);
        }
        Ok(dump.networks)
    }
}

/// Scanner command line: `SCANNER IF --output-format csv -w PREFIX`
pub fn scan_command(scanner: &[String], interface: &str, prefix: &Path) -> Vec<String> {
    let mut argv = scanner.to_vec();
    argv.extend([
        interface.to_string(),
        "--output-format".to_string(),
        "csv".to_string(),
        "-w".to_string(),
        prefix.to_string_lossy().into_owned(),
    ]);
    argv
}

/// The scanner appends a sequence number to the `-w` prefix
pub fn capture_path(prefix: &Path) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push("-01.csv");
    PathBuf::from(name)
}

fn read_dump(output: &Path) -> Result<crate::parser::ScanDump> {
    if !output.exists() {
        return Err(SessionError::OutputMissing(output.to_path_buf()));
    }
    CsvScanParser::parse_file(output)
}
