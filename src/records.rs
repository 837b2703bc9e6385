//! Records extracted from scanner capture files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One access point seen by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    /// ESSID; empty for hidden networks
    pub ssid: String,
    /// Stable identity of the network
    pub bssid: String,
    /// `-1` when the scanner has not locked the channel yet
    pub channel: i32,
    pub signal_dbm: i32,
}

impl NetworkRecord {
    pub fn is_hidden(&self) -> bool {
        self.ssid.is_empty()
    }

    /// Label shown for the network, `Hidden Network` when no ESSID was broadcast
    pub fn label(&self) -> &str {
        if self.is_hidden() {
            "Hidden Network"
        } else {
            &self.ssid
        }
    }
}

impl std::fmt::Display for NetworkRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) - Ch:{}", self.label(), self.bssid, self.channel)
    }
}

/// One client station seen by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    pub mac: String,
    pub signal_dbm: i32,
    pub packet_count: u64,
    /// Probe-request SSIDs in the order the scanner listed them
    pub probed_ssids: Vec<String>,
    pub associated_bssid: Option<String>,
}

impl StationRecord {
    /// Whether this station should be reported for `bssid`.
    ///
    /// Heuristic: a station counts when it is associated with `bssid` or
    /// when it is not associated at all, since an unassociated station near
    /// the target may be probing for it. This over-reports and carries no
    /// correctness bound.
    ///
    /// A `(not associated)` column parses to `None` and so counts here too.
    /// Matching only a literally empty column would drop every station the
    /// scanner labels `(not associated)`; those are reported for every
    /// target instead.
    pub fn is_attributed_to(&self, bssid: &str) -> bool {
        match &self.associated_bssid {
            Some(associated) => associated.eq_ignore_ascii_case(bssid),
            None => true,
        }
    }
}

/// Full replacement view of the stations around a recon target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSnapshot {
    /// ESSID of the target, `Hidden Network` if it broadcasts none, `None`
    /// until the target row has been written
    pub network_label: Option<String>,
    pub stations: Vec<StationRecord>,
    pub captured_at: DateTime<Utc>,
}
