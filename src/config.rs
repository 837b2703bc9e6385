//! Configuration module for the session manager

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::monitor::ModeStrategy;

/// Main configuration structure for session operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Managed wireless interface (e.g. `wlan1`)
    pub interface: String,

    /// Suffix appended to the interface name once monitor mode is on
    pub monitor_suffix: String,

    /// How monitor mode is toggled
    pub mode_strategy: ModeStrategy,

    /// Prepended to mode-control commands, e.g. `["sudo"]`
    pub command_prefix: Vec<String>,

    /// Scanner command prefix, e.g. `["sudo", "airodump-ng"]`
    pub scanner: Vec<String>,

    /// Flooder command prefix, e.g. `["sudo", "mdk4"]`
    pub flooder: Vec<String>,

    /// Directory for capture files and generated SSID lists
    pub work_dir: PathBuf,

    /// Default scan duration in seconds
    pub scan_duration_secs: u64,

    /// Recon polling period in milliseconds
    pub poll_interval_ms: u64,

    /// Grace period between SIGTERM and SIGKILL in milliseconds
    pub grace_period_ms: u64,

    /// Number of flooder processes (one SSID list each)
    pub flood_groups: usize,

    /// SSID variants written to each group's list
    pub names_per_group: usize,

    /// Delay between consecutive flooder launches in milliseconds
    pub launch_stagger_ms: u64,

    /// Flood supervisor reporting period in milliseconds
    pub status_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interface: "wlan1".to_string(),
            monitor_suffix: "mon".to_string(),
            mode_strategy: ModeStrategy::Airmon,
            command_prefix: Vec::new(),
            scanner: vec!["airodump-ng".to_string()],
            flooder: vec!["mdk4".to_string()],
            work_dir: std::env::temp_dir(),
            scan_duration_secs: 5,
            poll_interval_ms: 1000,
            grace_period_ms: 2000,
            flood_groups: 5,
            names_per_group: 10,
            launch_stagger_ms: 500,
            status_interval_ms: 5000,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration for an interface
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ..Default::default()
        }
    }

    pub fn with_scanner(mut self, scanner: Vec<String>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_flooder(mut self, flooder: Vec<String>) -> Self {
        self.flooder = flooder;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = grace.as_millis() as u64;
        self
    }

    pub fn with_launch_stagger(mut self, stagger: Duration) -> Self {
        self.launch_stagger_ms = stagger.as_millis() as u64;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_flood_groups(mut self, groups: usize) -> Self {
        self.flood_groups = groups;
        self
    }

    /// Interface the capture tools run on while monitor mode is enabled
    pub fn monitor_interface(&self) -> String {
        self.mode_strategy.monitor_name(&self.interface, &self.monitor_suffix)
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn launch_stagger(&self) -> Duration {
        Duration::from_millis(self.launch_stagger_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Process name used for the kill-by-name fallback (`mdk4` for `["sudo", "mdk4"]`)
    pub fn flooder_process_name(&self) -> Option<String> {
        self.flooder
            .last()
            .and_then(|program| Path::new(program).file_name())
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| crate::SessionError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: SessionConfig = toml::from_str(&content)
            .map_err(|e| crate::SessionError::ConfigError(format!("Failed to parse TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_path = home_dir.join(".airpanel.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.interface.is_empty() {
            return Err(crate::SessionError::ConfigError("Interface cannot be empty".to_string()));
        }

        if self.scanner.is_empty() || self.flooder.is_empty() {
            return Err(crate::SessionError::ConfigError("Tool commands cannot be empty".to_string()));
        }

        if self.scan_duration_secs == 0 || self.poll_interval_ms == 0 || self.status_interval_ms == 0 {
            return Err(crate::SessionError::ConfigError(
                "Scan duration and intervals must be greater than 0".to_string(),
            ));
        }

        if self.flood_groups == 0 || self.names_per_group == 0 {
            return Err(crate::SessionError::ConfigError(
                "Flood groups and names per group must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor_interface(), "wlan1mon");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "interface = \"wlan0\"").unwrap();
        writeln!(file, "flooder = [\"sudo\", \"/usr/sbin/mdk4\"]").unwrap();
        writeln!(file, "mode_strategy = \"triad\"").unwrap();

        let config = SessionConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.interface, "wlan0");
        assert_eq!(config.mode_strategy, ModeStrategy::Triad);
        assert_eq!(config.monitor_interface(), "wlan0");
        assert_eq!(config.flooder_process_name().as_deref(), Some("mdk4"));
        assert_eq!(config.flood_groups, 5);
    }

    #[test]
    fn test_validate_rejects_empty_tools() {
        let config = SessionConfig::default().with_scanner(Vec::new());
        assert!(matches!(
            config.validate(),
            Err(crate::SessionError::ConfigError(_))
        ));

        let config = SessionConfig::default().with_flood_groups(0);
        assert!(config.validate().is_err());
    }
}
