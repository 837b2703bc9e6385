//! Front door for the operator interface
//!
//! [`SessionManager`] owns one session of each kind on a single wireless
//! interface and enforces that at most one of them holds it at a time.

use crate::config::SessionConfig;
use crate::monitor::{ModeProbe, MonitorControl, SysfsModeProbe};
use crate::process::{Launcher, SystemLauncher};
use crate::records::NetworkRecord;
use crate::session::{
    FloodSession, FloodStart, FloodStatus, ReconSession, ReconUpdate, ScanSession, SessionKind,
};
use crate::target::{TargetKind, TargetSelection};
use crate::{Result, SessionError};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Result of a background scan
pub type ScanOutcome = Result<Vec<NetworkRecord>>;

#[derive(Debug)]
struct LiveSelection {
    target: TargetSelection,
    /// `None` once a session has adopted the file
    file: Option<PathBuf>,
}

/// Coordinates the scan, recon and flood sessions of one interface
pub struct SessionManager {
    config: Arc<SessionConfig>,
    monitor: MonitorControl,
    scan: Arc<ScanSession>,
    recon: ReconSession,
    flood: FloodSession,
    selections: Mutex<HashMap<TargetKind, LiveSelection>>,
    start_lock: Mutex<()>,
}

impl SessionManager {
    /// Manager spawning real tools and reading monitor state from sysfs
    pub fn new(config: SessionConfig) -> Result<Self> {
        let probe = Arc::new(SysfsModeProbe::new(config.monitor_suffix.clone()));
        Self::with_components(config, Arc::new(SystemLauncher), probe)
    }

    pub fn with_components(
        config: SessionConfig,
        launcher: Arc<dyn Launcher>,
        probe: Arc<dyn ModeProbe>,
    ) -> Result<Self> {
        config.validate()?;
        let monitor = MonitorControl::from_config(&config);
        let config = Arc::new(config);

        Ok(Self {
            scan: Arc::new(ScanSession::new(Arc::clone(&config), Arc::clone(&launcher), probe)),
            recon: ReconSession::new(Arc::clone(&config), Arc::clone(&launcher)),
            flood: FloodSession::new(Arc::clone(&config), launcher),
            monitor,
            config,
            selections: Mutex::new(HashMap::new()),
            start_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Interface the capture tools are pointed at
    pub fn capture_interface(&self) -> String {
        self.config.monitor_interface()
    }

    pub fn monitor_active(&self) -> bool {
        self.monitor.is_active(&self.config.interface)
    }

    pub async fn enable_monitor(&self) -> Result<()> {
        self.ensure_idle().await?;
        self.monitor.enable(&self.config.interface).await
    }

    /// Stops every session first, since they all need monitor mode
    pub async fn disable_monitor(&self) -> Result<()> {
        self.shutdown().await;
        self.monitor.disable(&self.config.interface).await
    }

    /// Session currently holding the interface, if any
    pub async fn active_session(&self) -> Option<SessionKind> {
        if self.scan.is_active().await {
            Some(SessionKind::Scan)
        } else if self.recon.is_active().await {
            Some(SessionKind::Recon)
        } else if self.flood.is_active().await {
            Some(SessionKind::Flood)
        } else {
            None
        }
    }

    /// Start a scan in the background. Earlier selections are discarded.
    pub async fn start_scan(&self, duration: Duration) -> Result<oneshot::Receiver<ScanOutcome>> {
        let _guard = self.start_lock.lock().await;
        self.ensure_idle().await?;
        self.scan.claim().await?;
        self.clear_selections().await;

        let (tx, rx) = oneshot::channel();
        let scan = Arc::clone(&self.scan);
        let interface = self.capture_interface();
        tokio::spawn(async move {
            let outcome = scan.run_claimed(&interface, duration).await;
            if tx.send(outcome).is_err() {
                debug!("Scan result receiver dropped");
            }
        });

        Ok(rx)
    }

    /// Fix the operator's choice for `kind`, replacing any previous one
    pub async fn select_target(&self, kind: TargetKind, record: &NetworkRecord) -> Result<TargetSelection> {
        info!("Selected {} for {:?}", record, kind);
        self.select(TargetSelection::from_record(kind, record)).await
    }

    /// Same as [`select_target`](Self::select_target) for a selection built
    /// without a scan
    pub async fn select(&self, target: TargetSelection) -> Result<TargetSelection> {
        let _guard = self.start_lock.lock().await;
        self.prune_finished().await;
        let file = target.persist(&self.config.work_dir)?;

        let previous = self.selections.lock().await.insert(
            target.kind(),
            LiveSelection {
                target: target.clone(),
                file: Some(file),
            },
        );
        if let Some(LiveSelection { file: Some(old), .. }) = previous {
            remove_selection_file(old).await;
        }

        Ok(target)
    }

    /// Live selection for `kind`. A selection adopted by a session that has
    /// since ended on its own is gone.
    pub async fn selection(&self, kind: TargetKind) -> Option<TargetSelection> {
        let _guard = self.start_lock.lock().await;
        self.prune_finished().await;
        self.selections.lock().await.get(&kind).map(|s| s.target.clone())
    }

    pub async fn start_recon(&self, target: &TargetSelection) -> Result<mpsc::UnboundedReceiver<ReconUpdate>> {
        let _guard = self.start_lock.lock().await;
        target.recon_params()?;
        self.prune_finished().await;
        self.ensure_idle().await?;

        let file = self.adopt_selection(target).await?;
        let result = self
            .recon
            .start_with_selection(target, &self.capture_interface(), file)
            .await;
        if result.is_err() {
            self.selections.lock().await.remove(&TargetKind::Recon);
        }
        result
    }

    pub async fn start_flood(
        &self,
        target: &TargetSelection,
    ) -> Result<(FloodStart, mpsc::UnboundedReceiver<FloodStatus>)> {
        let _guard = self.start_lock.lock().await;
        let ssid = target.flood_ssid()?;
        self.prune_finished().await;
        self.ensure_idle().await?;

        let file = self.adopt_selection(target).await?;
        let result = self
            .flood
            .start_with_selection(ssid, self.config.flood_groups, &self.capture_interface(), file)
            .await;
        if result.is_err() {
            self.selections.lock().await.remove(&TargetKind::BeaconFlood);
        }
        result
    }

    /// Stop one session; its adopted selection goes with it
    pub async fn stop(&self, kind: SessionKind) {
        match kind {
            SessionKind::Scan => self.scan.stop().await,
            SessionKind::Recon => {
                self.recon.stop().await;
                self.release_adopted(TargetKind::Recon).await;
            }
            SessionKind::Flood => {
                self.flood.stop().await;
                self.release_adopted(TargetKind::BeaconFlood).await;
            }
        }
    }

    /// Stop everything and remove every selection file
    pub async fn shutdown(&self) {
        info!("Shutting down all sessions");
        self.stop(SessionKind::Scan).await;
        self.stop(SessionKind::Recon).await;
        self.stop(SessionKind::Flood).await;
        self.clear_selections().await;
    }

    async fn ensure_idle(&self) -> Result<()> {
        match self.active_session().await {
            Some(kind) => Err(SessionError::InterfaceBusy(format!(
                "{} is held by the {} session",
                self.config.interface, kind
            ))),
            None => Ok(()),
        }
    }

    /// Hand the live selection file for `target` to the session about to start
    async fn adopt_selection(&self, target: &TargetSelection) -> Result<Option<PathBuf>> {
        let mut selections = self.selections.lock().await;
        match selections.get_mut(&target.kind()) {
            Some(live) if live.target == *target => Ok(live.file.take()),
            _ => Err(SessionError::InvalidTarget(format!(
                "{:?} target was not selected",
                target.kind()
            ))),
        }
    }

    async fn release_adopted(&self, kind: TargetKind) {
        let mut selections = self.selections.lock().await;
        if matches!(selections.get(&kind), Some(live) if live.file.is_none()) {
            selections.remove(&kind);
        }
    }

    /// Drop adopted selections whose session is no longer active, e.g. a
    /// recon whose scanner died. Callers hold `start_lock` so a start in
    /// progress is never mistaken for a finished one.
    async fn prune_finished(&self) {
        if !self.recon.is_active().await {
            self.release_adopted(TargetKind::Recon).await;
        }
        if !self.flood.is_active().await {
            self.release_adopted(TargetKind::BeaconFlood).await;
        }
    }

    async fn clear_selections(&self) {
        let drained: Vec<LiveSelection> = self.selections.lock().await.drain().map(|(_, s)| s).collect();
        for selection in drained {
            if let Some(file) = selection.file {
                remove_selection_file(file).await;
            }
        }
    }
}

async fn remove_selection_file(path: PathBuf) {
    if let Err(e) = tokio::fs::remove_file(&path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("{}", SessionError::CleanupFailed(format!("{}: {}", path.display(), e)));
        }
    }
}
