//! Parser for the scanner's two-section CSV dump
//!
//! The dump holds an access-point section and a station section separated
//! by a blank line. Each section starts with a header row (`BSSID, ...` or
//! `Station MAC, ...`) that is used to locate columns. The scanner rewrites
//! the whole file on every flush, so readers routinely see half-written
//! files: rows that are short or fail type checks are dropped, and a final
//! line without a terminator is treated as still being written.

use crate::records::{NetworkRecord, StationRecord};
use crate::{Result, SessionError};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

static MAC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{2}([:-][0-9A-Fa-f]{2}){5}$").expect("valid MAC regex"));

const AP_HEADER: &str = "BSSID";
const STATION_HEADER: &str = "Station MAC";
const NOT_ASSOCIATED: &str = "(not associated)";

/// Output of one parse pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanDump {
    /// Access points with a BSSID and a broadcast ESSID
    pub networks: Vec<NetworkRecord>,
    /// Access points whose ESSID is empty or masked
    pub hidden: Vec<NetworkRecord>,
    pub stations: Vec<StationRecord>,
    /// Data rows dropped for column-count or type errors
    pub skipped_rows: usize,
}

impl ScanDump {
    /// Look up an access point by BSSID, hidden ones included
    pub fn find_network(&self, bssid: &str) -> Option<&NetworkRecord> {
        self.networks
            .iter()
            .chain(self.hidden.iter())
            .find(|n| n.bssid.eq_ignore_ascii_case(bssid))
    }

    /// Stations attributed to `bssid`, see [`StationRecord::is_attributed_to`]
    pub fn stations_for(&self, bssid: &str) -> Vec<StationRecord> {
        self.stations
            .iter()
            .filter(|s| s.is_attributed_to(bssid))
            .cloned()
            .collect()
    }

    /// `ParseDegraded` diagnostic when rows were dropped
    pub fn degradation(&self) -> Option<SessionError> {
        (self.skipped_rows > 0).then(|| SessionError::ParseDegraded {
            skipped: self.skipped_rows,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    AccessPoints,
    Stations,
}

#[derive(Debug, Clone, Copy)]
struct ApColumns {
    bssid: usize,
    channel: usize,
    power: usize,
    essid: usize,
}

impl Default for ApColumns {
    fn default() -> Self {
        Self { bssid: 0, channel: 3, power: 8, essid: 13 }
    }
}

impl ApColumns {
    fn from_header(header: &StringRecord) -> Self {
        let defaults = Self::default();
        Self {
            bssid: column(header, "BSSID").unwrap_or(defaults.bssid),
            channel: column(header, "channel").unwrap_or(defaults.channel),
            power: column(header, "Power").unwrap_or(defaults.power),
            essid: column(header, "ESSID").unwrap_or(defaults.essid),
        }
    }

    fn min_len(&self) -> usize {
        self.bssid.max(self.channel).max(self.power).max(self.essid) + 1
    }
}

#[derive(Debug, Clone, Copy)]
struct StationColumns {
    mac: usize,
    power: usize,
    packets: usize,
    bssid: usize,
    probes: usize,
}

impl Default for StationColumns {
    fn default() -> Self {
        Self { mac: 0, power: 3, packets: 4, bssid: 5, probes: 6 }
    }
}

impl StationColumns {
    fn from_header(header: &StringRecord) -> Self {
        let defaults = Self::default();
        Self {
            mac: column(header, STATION_HEADER).unwrap_or(defaults.mac),
            power: column(header, "Power").unwrap_or(defaults.power),
            packets: column(header, "# packets").unwrap_or(defaults.packets),
            bssid: column(header, "BSSID").unwrap_or(defaults.bssid),
            probes: column(header, "Probed ESSIDs").unwrap_or(defaults.probes),
        }
    }

    /// The associated BSSID and probes are optional trailing columns
    fn min_len(&self) -> usize {
        self.mac.max(self.power).max(self.packets) + 1
    }
}

fn column(header: &StringRecord, name: &str) -> Option<usize> {
    header.iter().position(|field| field.eq_ignore_ascii_case(name))
}

fn header_kind(record: &StringRecord) -> Option<SectionKind> {
    match record.get(0) {
        Some(first) if first.eq_ignore_ascii_case(AP_HEADER) => Some(SectionKind::AccessPoints),
        Some(first) if first.eq_ignore_ascii_case(STATION_HEADER) => Some(SectionKind::Stations),
        _ => None,
    }
}

fn is_mac(value: &str) -> bool {
    MAC_RE.is_match(value)
}

fn normalize_mac(value: &str) -> String {
    value.replace('-', ":").to_ascii_uppercase()
}

/// airodump masks hidden ESSIDs as `<length:  N>` or NUL padding
fn is_masked_essid(essid: &str) -> bool {
    essid.is_empty() || essid.starts_with("<length:") || essid.chars().all(|c| c == '\0')
}

/// Stateless parser for scanner CSV dumps
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvScanParser;

impl CsvScanParser {
    /// Parse a dump. Never fails; bad rows are counted and dropped.
    pub fn parse(text: &str) -> ScanDump {
        let mut dump = ScanDump::default();

        for (index, section) in split_sections(complete_lines(text)).iter().enumerate() {
            let kind = if index == 0 {
                SectionKind::AccessPoints
            } else {
                SectionKind::Stations
            };
            parse_section(section, kind, &mut dump);
        }

        if dump.skipped_rows > 0 {
            debug!(
                "Parsed {} networks, {} stations ({} rows skipped)",
                dump.networks.len() + dump.hidden.len(),
                dump.stations.len(),
                dump.skipped_rows
            );
        }

        dump
    }

    /// Read and parse a dump file. Invalid UTF-8 is replaced, not rejected.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<ScanDump> {
        let bytes = fs::read(path)?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }
}

/// Drop a trailing line that has no terminator yet
fn complete_lines(text: &str) -> &str {
    match text.rfind('\n') {
        Some(end) => &text[..=end],
        None => "",
    }
}

/// Group consecutive non-blank lines
fn split_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        sections.push(current);
    }

    sections
}

fn parse_section(section: &str, default_kind: SectionKind, dump: &mut ScanDump) {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(section.as_bytes());

    let mut kind = default_kind;
    let mut ap_columns = ApColumns::default();
    let mut station_columns = StationColumns::default();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!("Unreadable row: {}", e);
                dump.skipped_rows += 1;
                continue;
            }
        };

        if let Some(header) = header_kind(&record) {
            kind = header;
            match header {
                SectionKind::AccessPoints => ap_columns = ApColumns::from_header(&record),
                SectionKind::Stations => station_columns = StationColumns::from_header(&record),
            }
            continue;
        }

        // No separator, not a data row
        if record.len() < 2 {
            continue;
        }

        let parsed = match kind {
            SectionKind::AccessPoints => parse_access_point(&record, &ap_columns).map(|network| {
                if network.ssid.is_empty() {
                    dump.hidden.push(network);
                } else {
                    dump.networks.push(network);
                }
            }),
            SectionKind::Stations => {
                parse_station(&record, &station_columns).map(|station| dump.stations.push(station))
            }
        };

        if parsed.is_none() {
            dump.skipped_rows += 1;
        }
    }
}

fn parse_access_point(record: &StringRecord, columns: &ApColumns) -> Option<NetworkRecord> {
    if record.len() < columns.min_len() {
        return None;
    }

    let bssid = record.get(columns.bssid)?;
    if !is_mac(bssid) {
        return None;
    }

    let channel = record.get(columns.channel)?.parse::<i32>().ok()?;
    let signal_dbm = record.get(columns.power)?.parse::<i32>().ok()?;
    let essid = record.get(columns.essid)?;

    Some(NetworkRecord {
        ssid: if is_masked_essid(essid) { String::new() } else { essid.to_string() },
        bssid: normalize_mac(bssid),
        channel,
        signal_dbm,
    })
}

fn parse_station(record: &StringRecord, columns: &StationColumns) -> Option<StationRecord> {
    if record.len() < columns.min_len() {
        return None;
    }

    let mac = record.get(columns.mac)?;
    if !is_mac(mac) {
        return None;
    }

    let signal_dbm = record.get(columns.power)?.parse::<i32>().ok()?;
    let packet_count = record.get(columns.packets)?.parse::<u64>().ok()?;

    let associated_bssid = match record.get(columns.bssid) {
        None | Some("") | Some(NOT_ASSOCIATED) => None,
        Some(bssid) if is_mac(bssid) => Some(normalize_mac(bssid)),
        Some(_) => return None,
    };

    let probed_ssids = record
        .iter()
        .skip(columns.probes)
        .filter(|probe| !probe.is_empty())
        .map(str::to_string)
        .collect();

    Some(StationRecord {
        mac: normalize_mac(mac),
        signal_dbm,
        packet_count,
        probed_ssids,
        associated_bssid,
    })
}
