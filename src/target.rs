//! Operator target selection
//!
//! A [`TargetSelection`] is fixed once the operator confirms a network from
//! a scan. It gates which session may start and is persisted to a small
//! selection file that belongs to the session consuming it.

use crate::records::NetworkRecord;
use crate::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Session type a selection was made for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    BeaconFlood,
    Recon,
}

impl TargetKind {
    fn file_prefix(self) -> &'static str {
        match self {
            TargetKind::BeaconFlood => "beacon_target_",
            TargetKind::Recon => "network_info_",
        }
    }
}

/// Immutable snapshot of the operator's chosen network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSelection {
    kind: TargetKind,
    ssid: Option<String>,
    bssid: Option<String>,
    channel: Option<i32>,
}

impl TargetSelection {
    pub fn new(kind: TargetKind, ssid: Option<String>, bssid: Option<String>, channel: Option<i32>) -> Self {
        Self { kind, ssid, bssid, channel }
    }

    /// Snapshot `record` for a session of `kind`; a hidden ESSID becomes `None`
    pub fn from_record(kind: TargetKind, record: &NetworkRecord) -> Self {
        Self::new(
            kind,
            (!record.ssid.is_empty()).then(|| record.ssid.clone()),
            Some(record.bssid.clone()),
            Some(record.channel),
        )
    }

    pub fn recon(record: &NetworkRecord) -> Self {
        Self::from_record(TargetKind::Recon, record)
    }

    pub fn beacon_flood(record: &NetworkRecord) -> Self {
        Self::from_record(TargetKind::BeaconFlood, record)
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref()
    }

    pub fn bssid(&self) -> Option<&str> {
        self.bssid.as_deref()
    }

    pub fn channel(&self) -> Option<i32> {
        self.channel
    }

    /// BSSID and channel of a recon target, or `InvalidTarget`. The channel
    /// must be positive; `-1` means the scanner never locked one.
    pub fn recon_params(&self) -> Result<(&str, u32)> {
        if self.kind != TargetKind::Recon {
            return Err(SessionError::InvalidTarget(format!(
                "{:?} selection cannot start recon",
                self.kind
            )));
        }
        match (self.bssid(), self.channel) {
            (Some(bssid), Some(channel)) if !bssid.is_empty() => match u32::try_from(channel) {
                Ok(channel) if channel > 0 => Ok((bssid, channel)),
                _ => Err(SessionError::InvalidTarget(format!(
                    "recon requires a positive channel, got {}",
                    channel
                ))),
            },
            _ => Err(SessionError::InvalidTarget(
                "recon requires a BSSID and a channel".to_string(),
            )),
        }
    }

    /// SSID of a beacon-flood target, or `InvalidTarget`
    pub fn flood_ssid(&self) -> Result<&str> {
        if self.kind != TargetKind::BeaconFlood {
            return Err(SessionError::InvalidTarget(format!(
                "{:?} selection cannot start a flood",
                self.kind
            )));
        }
        match self.ssid() {
            Some(ssid) if !ssid.is_empty() => Ok(ssid),
            _ => Err(SessionError::InvalidTarget(
                "beacon flood requires a non-empty SSID".to_string(),
            )),
        }
    }

    /// Render the selection file body
    pub fn to_file_contents(&self) -> String {
        let mut contents = String::new();
        if let Some(ssid) = &self.ssid {
            contents.push_str(&format!("SSID: {}\n", ssid));
        }
        if let Some(bssid) = &self.bssid {
            contents.push_str(&format!("BSSID: {}\n", bssid));
        }
        if let Some(channel) = self.channel {
            contents.push_str(&format!("Channel: {}\n", channel));
        }
        contents
    }

    /// Write the selection file into `dir` and return its path
    pub fn persist(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("{}{}", self.kind.file_prefix(), uuid::Uuid::new_v4().simple()));
        fs::write(&path, self.to_file_contents())?;
        Ok(path)
    }
}
