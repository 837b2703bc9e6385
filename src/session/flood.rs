//! Beacon flood with a fan-out of flooder processes

use super::{SessionHandle, SessionState};
use crate::config::SessionConfig;
use crate::process::{kill_by_name, IoMode, Launcher};
use crate::{Result, SessionError};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Longest SSID a beacon can carry, in bytes
pub const MAX_SSID_LEN: usize = 32;

/// Channel plan of one flooder process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FloodStrategy {
    /// Beacons on every channel at once
    AllChannels { rate: u32 },
    /// Beacons on a single channel
    Channel { channel: u32, rate: u32 },
    /// Channel hopping
    Hopping { rate: u32 },
}

impl FloodStrategy {
    /// Group `index` cycles through all channels, 1, 6, 11 and hopping
    pub fn for_group(index: usize) -> Self {
        match index % 5 {
            0 => FloodStrategy::AllChannels { rate: 100 },
            1 => FloodStrategy::Channel { channel: 1, rate: 50 },
            2 => FloodStrategy::Channel { channel: 6, rate: 50 },
            3 => FloodStrategy::Channel { channel: 11, rate: 50 },
            _ => FloodStrategy::Hopping { rate: 80 },
        }
    }

    pub fn rate(&self) -> u32 {
        match *self {
            FloodStrategy::AllChannels { rate }
            | FloodStrategy::Channel { rate, .. }
            | FloodStrategy::Hopping { rate } => rate,
        }
    }

    /// Flooder arguments selecting the channel plan and packet rate
    pub fn args(&self) -> Vec<String> {
        let mut args = match *self {
            FloodStrategy::AllChannels { .. } => vec!["-a".to_string()],
            FloodStrategy::Channel { channel, .. } => vec!["-c".to_string(), channel.to_string()],
            FloodStrategy::Hopping { .. } => vec!["-g".to_string()],
        };
        args.push("-s".to_string());
        args.push(self.rate().to_string());
        args
    }
}

impl fmt::Display for FloodStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FloodStrategy::AllChannels { rate } => write!(f, "all channels @ {} pps", rate),
            FloodStrategy::Channel { channel, rate } => write!(f, "channel {} @ {} pps", channel, rate),
            FloodStrategy::Hopping { rate } => write!(f, "hopping @ {} pps", rate),
        }
    }
}

/// One flooder process and the SSID list it broadcasts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FloodGroup {
    pub index: usize,
    pub strategy: FloodStrategy,
    pub ssid_file: PathBuf,
}

/// Outcome of a flood start.
///
/// Groups are launched in order and launching stops at the first spawn
/// failure, so `started` is always a prefix of `groups`.
#[derive(Debug)]
pub struct FloodStart {
    pub groups: Vec<FloodGroup>,
    pub started: Vec<usize>,
    pub failed: Option<(usize, SessionError)>,
}

impl FloodStart {
    pub fn is_degraded(&self) -> bool {
        self.failed.is_some()
    }
}

/// Periodic report from the flood supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FloodStatus {
    pub elapsed: Duration,
    pub alive: usize,
    pub total: usize,
}

/// SSID variants for group `group`: the bare SSID first, then `_{group}{i}`
/// suffixed copies, each clipped to 32 bytes.
pub fn ssid_variants(ssid: &str, group: usize, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let suffix = if group == 0 && i == 0 {
                String::new()
            } else {
                format!("_{}{}", group, i)
            };
            let room = MAX_SSID_LEN.saturating_sub(suffix.len());
            format!("{}{}", clip(ssid, room), suffix)
        })
        .collect()
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char
fn clip(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `FLOODER IF b -f FILE <strategy args>`
pub fn flood_command(flooder: &[String], interface: &str, ssid_file: &Path, strategy: FloodStrategy) -> Vec<String> {
    let mut argv = flooder.to_vec();
    argv.extend([
        interface.to_string(),
        "b".to_string(),
        "-f".to_string(),
        ssid_file.to_string_lossy().into_owned(),
    ]);
    argv.extend(strategy.args());
    argv
}

/// Drives the flooder processes of one beacon flood
pub struct FloodSession {
    config: Arc<SessionConfig>,
    launcher: Arc<dyn Launcher>,
    handle: Arc<Mutex<SessionHandle>>,
    cancel: Mutex<CancellationToken>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl FloodSession {
    pub fn new(config: Arc<SessionConfig>, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            config,
            launcher,
            handle: Arc::new(Mutex::new(SessionHandle::new("flood"))),
            cancel: Mutex::new(CancellationToken::new()),
            supervisor: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.handle.lock().await.state()
    }

    pub async fn is_active(&self) -> bool {
        self.state().await.is_active()
    }

    /// Number of flooder processes still running
    pub async fn alive_count(&self) -> usize {
        self.handle.lock().await.alive_count()
    }

    pub async fn pids(&self) -> Vec<u32> {
        self.handle.lock().await.pids()
    }

    pub async fn start(
        &self,
        ssid: &str,
        variant_count: usize,
        interface: &str,
    ) -> Result<(FloodStart, mpsc::UnboundedReceiver<FloodStatus>)> {
        self.start_with_selection(ssid, variant_count, interface, None).await
    }

    /// Write `variant_count` SSID lists and launch one flooder per list.
    ///
    /// If the first launch fails nothing is left running and the error is
    /// returned. A later failure leaves the earlier groups running and is
    /// reported in [`FloodStart::failed`]. A `stop()` issued before the
    /// launch finishes tears everything down and this returns `Cancelled`.
    pub async fn start_with_selection(
        &self,
        ssid: &str,
        variant_count: usize,
        interface: &str,
        selection_file: Option<PathBuf>,
    ) -> Result<(FloodStart, mpsc::UnboundedReceiver<FloodStatus>)> {
        if ssid.is_empty() {
            return Err(SessionError::InvalidTarget("beacon flood requires a non-empty SSID".to_string()));
        }
        if variant_count == 0 {
            return Err(SessionError::InvalidTarget("beacon flood requires at least one group".to_string()));
        }

        let grace = self.config.grace_period();
        let mut handle = self.handle.lock().await;
        if handle.state().is_active() {
            return Err(SessionError::InterfaceBusy("a flood is already running".to_string()));
        }

        *handle = SessionHandle::new("flood");
        handle.begin()?;
        if let Some(path) = selection_file {
            handle.track_artifact(path);
        }

        // Installed before the first launch so stop() can interrupt the stagger
        let cancel = CancellationToken::new();
        *self.cancel.lock().await = cancel.clone();

        let run_id = Uuid::new_v4().simple().to_string();
        let mut groups = Vec::with_capacity(variant_count);
        for index in 0..variant_count {
            let ssid_file = self.config.work_dir.join(format!("flood-{}-{}.lst", run_id, index));
            handle.track_artifact(&ssid_file);

            let mut names = ssid_variants(ssid, index, self.config.names_per_group).join("\n");
            names.push('\n');
            if let Err(e) = tokio::fs::write(&ssid_file, names).await {
                error!("Failed to write {}: {}", ssid_file.display(), e);
                handle.teardown(grace).await;
                return Err(e.into());
            }

            groups.push(FloodGroup {
                index,
                strategy: FloodStrategy::for_group(index),
                ssid_file,
            });
        }

        let mut started = Vec::new();
        let mut failed = None;
        for group in &groups {
            if group.index > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.launch_stagger()) => {}
                }
            }

            let argv = flood_command(&self.config.flooder, interface, &group.ssid_file, group.strategy);
            match self.launcher.launch(&argv, IoMode::Discard) {
                Ok(process) => {
                    info!("Flood group {} started ({})", group.index + 1, group.strategy);
                    handle.track_process(process);
                    started.push(group.index);
                }
                Err(e) => {
                    error!("Flood group {} failed to start: {}", group.index + 1, e);
                    failed = Some((group.index, e));
                    break;
                }
            }
        }

        if cancel.is_cancelled() {
            info!("Flood start interrupted by stop");
            handle.teardown(grace).await;
            return Err(SessionError::Cancelled);
        }

        if started.is_empty() {
            handle.teardown(grace).await;
            return Err(match failed {
                Some((_, e)) => e,
                None => SessionError::SpawnFailed("no flood group started".to_string()),
            });
        }

        handle.mark_running()?;
        if failed.is_some() {
            warn!("Flood degraded: {} of {} groups running", started.len(), groups.len());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = supervise(
            Arc::clone(&self.handle),
            cancel,
            tx,
            started.len(),
            self.config.status_interval(),
        );
        // Registered while the handle is still locked, so a waiting stop()
        // always finds it
        *self.supervisor.lock().await = Some(tokio::spawn(supervisor));
        drop(handle);

        Ok((FloodStart { groups, started, failed }, rx))
    }

    /// Stop every flooder, sweep up strays by process name and delete the
    /// SSID lists. Safe to call repeatedly, including while `start` is
    /// still launching groups.
    pub async fn stop(&self) {
        // Interrupts a start that is waiting out the launch stagger
        self.cancel.lock().await.cancel();

        let grace = self.config.grace_period();
        let mut handle = self.handle.lock().await;
        // A start that completed while we waited installed a newer token
        self.cancel.lock().await.cancel();
        let supervisor = self.supervisor.lock().await.take();

        if handle.state().is_active() {
            info!("Stopping flood");
            handle.stop_processes(grace).await;
            if let Some(name) = self.config.flooder_process_name() {
                let killed = kill_by_name(&name);
                if killed > 0 {
                    warn!("Killed {} untracked {} processes", killed, name);
                }
            }
            handle.teardown(grace).await;
        }
        drop(handle);

        if let Some(supervisor) = supervisor {
            if let Err(e) = supervisor.await {
                warn!("Flood supervisor ended abnormally: {}", e);
            }
        }
    }
}

async fn supervise(
    handle: Arc<Mutex<SessionHandle>>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<FloodStatus>,
    total: usize,
    period: Duration,
) {
    let started_at = Instant::now();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let alive = handle.lock().await.alive_count();
        if alive < total {
            warn!("{} of {} flooders have exited", total - alive, total);
        }

        let status = FloodStatus {
            elapsed: started_at.elapsed(),
            alive,
            total,
        };
        debug!("Flood status: {:?}", status);
        if tx.send(status).is_err() {
            debug!("Flood status receiver dropped");
            break;
        }
    }
}
