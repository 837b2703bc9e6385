//! Passive station reconnaissance against one target network

use super::{SessionHandle, SessionState};
use crate::config::SessionConfig;
use crate::parser::CsvScanParser;
use crate::process::{IoMode, Launcher};
use crate::records::StationSnapshot;
use crate::target::TargetSelection;
use crate::{Result, SessionError};
use chrono::Utc;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::scan::capture_path;

/// One event on the recon stream
pub type ReconUpdate = Result<StationSnapshot>;

/// Locks the scanner to a target's channel and periodically reports the
/// stations seen around it
pub struct ReconSession {
    config: Arc<SessionConfig>,
    launcher: Arc<dyn Launcher>,
    handle: Arc<Mutex<SessionHandle>>,
    cancel: Mutex<CancellationToken>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReconSession {
    pub fn new(config: Arc<SessionConfig>, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            config,
            launcher,
            handle: Arc::new(Mutex::new(SessionHandle::new("recon"))),
            cancel: Mutex::new(CancellationToken::new()),
            worker: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.handle.lock().await.state()
    }

    pub async fn is_active(&self) -> bool {
        self.state().await.is_active()
    }

    pub async fn start(
        &self,
        target: &TargetSelection,
        interface: &str,
    ) -> Result<mpsc::UnboundedReceiver<ReconUpdate>> {
        self.start_with_selection(target, interface, None).await
    }

    /// Start capturing on the target's channel. `selection_file` is adopted
    /// by the session and removed when it stops.
    ///
    /// A snapshot is emitted on every poll tick once the capture file
    /// exists. If the scanner dies, `ProcessExited` is sent and the session
    /// tears itself down.
    pub async fn start_with_selection(
        &self,
        target: &TargetSelection,
        interface: &str,
        selection_file: Option<PathBuf>,
    ) -> Result<mpsc::UnboundedReceiver<ReconUpdate>> {
        let (bssid, channel) = target.recon_params()?;
        let grace = self.config.grace_period();

        let mut handle = self.handle.lock().await;
        if handle.state().is_active() {
            return Err(SessionError::InterfaceBusy("recon is already running".to_string()));
        }

        *handle = SessionHandle::new("recon");
        handle.begin()?;
        if let Some(path) = selection_file {
            handle.track_artifact(path);
        }

        // Installed before the launch so a concurrent stop() always reaches it
        let cancel = CancellationToken::new();
        *self.cancel.lock().await = cancel.clone();

        let prefix = self
            .config
            .work_dir
            .join(format!("recon-{}", Uuid::new_v4().simple()));
        let output = capture_path(&prefix);
        handle.track_artifact(&output);

        let argv = recon_command(&self.config.scanner, interface, bssid, channel, &prefix);
        match self.launcher.launch(&argv, IoMode::Discard) {
            Ok(process) => handle.track_process(process),
            Err(e) => {
                handle.teardown(grace).await;
                return Err(e);
            }
        }

        if cancel.is_cancelled() {
            info!("Recon start interrupted by stop");
            handle.teardown(grace).await;
            return Err(SessionError::Cancelled);
        }
        handle.mark_running()?;

        info!("Recon started on {} (BSSID {}, channel {})", interface, bssid, channel);

        let (tx, rx) = mpsc::unbounded_channel();
        let poller = Poller {
            handle: Arc::clone(&self.handle),
            cancel,
            tx,
            output,
            bssid: bssid.to_string(),
            period: self.config.poll_interval(),
            grace,
        };
        *self.worker.lock().await = Some(tokio::spawn(poller.run()));
        drop(handle);

        Ok(rx)
    }

    /// Stop polling, kill the scanner and delete the capture and selection
    /// files. Safe to call repeatedly, before `start`, or while `start` is
    /// still in progress.
    pub async fn stop(&self) {
        self.cancel.lock().await.cancel();

        let mut handle = self.handle.lock().await;
        // A start that completed while we waited installed a newer token
        self.cancel.lock().await.cancel();
        let worker = self.worker.lock().await.take();

        if handle.state().is_active() {
            info!("Stopping recon");
        }
        handle.teardown(self.config.grace_period()).await;
        drop(handle);

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Recon poller ended abnormally: {}", e);
            }
        }
    }
}

/// Scanner command line locked to one BSSID and channel
pub fn recon_command(scanner: &[String], interface: &str, bssid: &str, channel: u32, prefix: &Path) -> Vec<String> {
    let mut argv = scanner.to_vec();
    argv.extend([
        "--bssid".to_string(),
        bssid.to_string(),
        "-c".to_string(),
        channel.to_string(),
        "--output-format".to_string(),
        "csv".to_string(),
        "-w".to_string(),
        prefix.to_string_lossy().into_owned(),
        interface.to_string(),
    ]);
    argv
}

struct Poller {
    handle: Arc<Mutex<SessionHandle>>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<ReconUpdate>,
    output: PathBuf,
    bssid: String,
    period: Duration,
    grace: Duration,
}

impl Poller {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.cancel.is_cancelled() {
                break;
            }

            if self.scanner_exited().await {
                warn!("Recon scanner exited unexpectedly");
                let _ = self
                    .tx
                    .send(Err(SessionError::ProcessExited("recon scanner".to_string())));
                self.handle.lock().await.teardown(self.grace).await;
                break;
            }

            match read_snapshot(&self.output, &self.bssid).await {
                Ok(Some(snapshot)) => {
                    if self.tx.send(Ok(snapshot)).is_err() {
                        debug!("Recon receiver dropped, polling stops");
                        break;
                    }
                }
                Ok(None) => debug!("Waiting for {}", self.output.display()),
                Err(e) => warn!("Failed to read {}: {}", self.output.display(), e),
            }
        }
    }

    async fn scanner_exited(&self) -> bool {
        let mut handle = self.handle.lock().await;
        handle.state() == SessionState::Running && handle.alive_count() == 0
    }
}

/// Parse the capture file, `None` while the scanner has not created it
async fn read_snapshot(output: &Path, bssid: &str) -> Result<Option<StationSnapshot>> {
    let bytes = match tokio::fs::read(output).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let dump = CsvScanParser::parse(&String::from_utf8_lossy(&bytes));
    Ok(Some(StationSnapshot {
        network_label: dump.find_network(bssid).map(|n| n.label().to_string()),
        stations: dump.stations_for(bssid),
        captured_at: Utc::now(),
    }))
}
