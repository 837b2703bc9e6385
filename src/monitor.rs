//! Monitor-mode control for the wireless interface
//!
//! Monitor mode is toggled either with the `ip`/`iw` down, set-mode, up
//! triad (interface keeps its name) or with `airmon-ng`, which creates a
//! derived `<iface>mon` interface.

use crate::{Result, SessionError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const SYSFS_NET: &str = "/sys/class/net";

/// ARPHRD_IEEE80211_RADIOTAP, the link type of a monitor-mode interface
const ARPHRD_RADIOTAP: &str = "803";

/// How monitor mode is switched on and off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeStrategy {
    /// `ip link set IF down`, `iw IF set monitor none`, `ip link set IF up`
    Triad,
    /// `airmon-ng start IF`, creating `IF<suffix>`
    Airmon,
}

impl ModeStrategy {
    /// Interface name the capture tools should use once monitor mode is on
    pub fn monitor_name(self, interface: &str, suffix: &str) -> String {
        match self {
            ModeStrategy::Triad => interface.to_string(),
            ModeStrategy::Airmon => format!("{}{}", interface, suffix),
        }
    }
}

/// Readiness check run before a scan spawns anything
pub trait ModeProbe: Send + Sync {
    fn is_ready(&self, interface: &str) -> bool;
}

/// Reads the link type from sysfs
#[derive(Debug, Clone)]
pub struct SysfsModeProbe {
    root: PathBuf,
    monitor_suffix: String,
}

impl SysfsModeProbe {
    pub fn new(monitor_suffix: impl Into<String>) -> Self {
        Self::with_root(SYSFS_NET, monitor_suffix)
    }

    pub fn with_root(root: impl Into<PathBuf>, monitor_suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            monitor_suffix: monitor_suffix.into(),
        }
    }
}

impl ModeProbe for SysfsModeProbe {
    fn is_ready(&self, interface: &str) -> bool {
        let dir = self.root.join(interface);
        if let Ok(link_type) = fs::read_to_string(dir.join("type")) {
            if link_type.trim() == ARPHRD_RADIOTAP {
                return true;
            }
        }
        // A derived monitor interface counts as ready when it exists
        !self.monitor_suffix.is_empty() && interface.ends_with(&self.monitor_suffix) && dir.exists()
    }
}

/// Switches an interface in and out of monitor mode
#[derive(Debug, Clone)]
pub struct MonitorControl {
    strategy: ModeStrategy,
    suffix: String,
    command_prefix: Vec<String>,
    root: PathBuf,
}

impl MonitorControl {
    pub fn new(strategy: ModeStrategy, suffix: impl Into<String>, command_prefix: Vec<String>) -> Self {
        Self {
            strategy,
            suffix: suffix.into(),
            command_prefix,
            root: PathBuf::from(SYSFS_NET),
        }
    }

    pub fn from_config(config: &crate::SessionConfig) -> Self {
        Self::new(
            config.mode_strategy,
            config.monitor_suffix.clone(),
            config.command_prefix.clone(),
        )
    }

    /// Point liveness checks at a different sysfs tree
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn monitor_name(&self, interface: &str) -> String {
        self.strategy.monitor_name(interface, &self.suffix)
    }

    /// Whether monitor mode is currently on for `interface`
    pub fn is_active(&self, interface: &str) -> bool {
        let monitor = self.monitor_name(interface);
        match self.strategy {
            ModeStrategy::Airmon => self.root.join(&monitor).exists(),
            ModeStrategy::Triad => link_type(&self.root, &monitor).as_deref() == Some(ARPHRD_RADIOTAP),
        }
    }

    pub fn enable_commands(&self, interface: &str) -> Vec<Vec<String>> {
        match self.strategy {
            ModeStrategy::Triad => vec![
                self.command(&["ip", "link", "set", interface, "down"]),
                self.command(&["iw", interface, "set", "monitor", "none"]),
                self.command(&["ip", "link", "set", interface, "up"]),
            ],
            ModeStrategy::Airmon => vec![self.command(&["airmon-ng", "start", interface])],
        }
    }

    pub fn disable_commands(&self, interface: &str) -> Vec<Vec<String>> {
        match self.strategy {
            ModeStrategy::Triad => vec![
                self.command(&["ip", "link", "set", interface, "down"]),
                self.command(&["iw", interface, "set", "type", "managed"]),
                self.command(&["ip", "link", "set", interface, "up"]),
            ],
            ModeStrategy::Airmon => {
                let monitor = self.monitor_name(interface);
                vec![self.command(&["airmon-ng", "stop", &monitor])]
            }
        }
    }

    pub async fn enable(&self, interface: &str) -> Result<()> {
        info!("Enabling monitor mode on {}", interface);
        for argv in self.enable_commands(interface) {
            run_command(&argv).await?;
        }
        Ok(())
    }

    pub async fn disable(&self, interface: &str) -> Result<()> {
        info!("Disabling monitor mode on {}", interface);
        for argv in self.disable_commands(interface) {
            run_command(&argv).await?;
        }
        Ok(())
    }

    fn command(&self, parts: &[&str]) -> Vec<String> {
        self.command_prefix
            .iter()
            .cloned()
            .chain(parts.iter().map(|s| s.to_string()))
            .collect()
    }
}

fn link_type(root: &Path, interface: &str) -> Option<String> {
    fs::read_to_string(root.join(interface).join("type"))
        .ok()
        .map(|t| t.trim().to_string())
}

/// Run a short-lived command to completion, failing on a non-zero exit
async fn run_command(argv: &[String]) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| SessionError::CommandFailed("empty command line".to_string()))?;

    debug!("Running {:?}", argv);
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| SessionError::CommandFailed(format!("{}: {}", program, e)))?;

    if !output.status.success() {
        return Err(SessionError::CommandFailed(format!(
            "{} exited with {}: {}",
            argv.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(entries: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (iface, link_type) in entries {
            let iface_dir = dir.path().join(iface);
            fs::create_dir_all(&iface_dir).unwrap();
            fs::write(iface_dir.join("type"), format!("{}\n", link_type)).unwrap();
        }
        dir
    }

    #[test]
    fn test_sysfs_probe() {
        let sysfs = fake_sysfs(&[("wlan0", "1"), ("wlan2", "803")]);
        fs::create_dir_all(sysfs.path().join("wlan1mon")).unwrap();
        let probe = SysfsModeProbe::with_root(sysfs.path(), "mon");

        assert!(!probe.is_ready("wlan0"));
        assert!(probe.is_ready("wlan2"));
        assert!(probe.is_ready("wlan1mon"));
        assert!(!probe.is_ready("wlan9mon"));
    }

    #[test]
    fn test_airmon_liveness_uses_derived_name() {
        let sysfs = fake_sysfs(&[("wlan1", "1")]);
        let control = MonitorControl::new(ModeStrategy::Airmon, "mon", Vec::new())
            .with_sysfs_root(sysfs.path());

        assert_eq!(control.monitor_name("wlan1"), "wlan1mon");
        assert!(!control.is_active("wlan1"));

        fs::create_dir_all(sysfs.path().join("wlan1mon")).unwrap();
        assert!(control.is_active("wlan1"));
    }

    #[test]
    fn test_triad_liveness_uses_link_type() {
        let sysfs = fake_sysfs(&[("wlan1", "803")]);
        let control = MonitorControl::new(ModeStrategy::Triad, "mon", Vec::new())
            .with_sysfs_root(sysfs.path());

        assert_eq!(control.monitor_name("wlan1"), "wlan1");
        assert!(control.is_active("wlan1"));
    }

    #[test]
    fn test_command_triad() {
        let control = MonitorControl::new(ModeStrategy::Triad, "mon", vec!["sudo".to_string()]);

        let enable = control.enable_commands("wlan1");
        assert_eq!(enable.len(), 3);
        assert_eq!(enable[0], vec!["sudo", "ip", "link", "set", "wlan1", "down"]);
        assert_eq!(enable[1], vec!["sudo", "iw", "wlan1", "set", "monitor", "none"]);
        assert_eq!(enable[2], vec!["sudo", "ip", "link", "set", "wlan1", "up"]);

        let disable = control.disable_commands("wlan1");
        assert_eq!(disable[1], vec!["sudo", "iw", "wlan1", "set", "type", "managed"]);

        let airmon = MonitorControl::new(ModeStrategy::Airmon, "mon", Vec::new());
        assert_eq!(airmon.disable_commands("wlan1"), vec![vec!["airmon-ng", "stop", "wlan1mon"]]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_reports_failure() {
        let ok: Vec<String> = vec!["true".into()];
        assert!(run_command(&ok).await.is_ok());

        let failing: Vec<String> = vec!["sh".into(), "-c".into(), "echo nope >&2; exit 3".into()];
        match run_command(&failing).await {
            Err(SessionError::CommandFailed(message)) => assert!(message.contains("nope")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
