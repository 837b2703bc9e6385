//! Terminal rendering of session results

use crate::records::{NetworkRecord, StationSnapshot};
use crate::session::{FloodStart, FloodStatus};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write;
use std::time::Duration;

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Numbered network list the operator picks a target from
pub fn render_networks(networks: &[NetworkRecord], format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(networks);
    }

    if networks.is_empty() {
        return Ok(format!("{}", "[!] No networks found".bright_yellow()));
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<4} {:<32} {:<18} {:>4} {:>6}",
        "#".bright_white().bold(),
        "SSID".bright_white().bold(),
        "BSSID".bright_white().bold(),
        "CH".bright_white().bold(),
        "dBm".bright_white().bold()
    );
    for (index, network) in networks.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<4} {:<32} {:<18} {:>4} {:>6}",
            index + 1,
            network.label().bright_cyan(),
            network.bssid,
            network.channel,
            signal(network.signal_dbm)
        );
    }
    Ok(out.trim_end().to_string())
}

/// One recon snapshot. The list replaces the previous one entirely.
pub fn render_snapshot(snapshot: &StationSnapshot, format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string(snapshot);
    }

    let mut out = String::new();
    let label = snapshot.network_label.as_deref().unwrap_or("waiting for beacon");
    let _ = writeln!(
        out,
        "{} {} ({} stations, {})",
        "[~]".bright_blue(),
        label.bright_cyan().bold(),
        snapshot.stations.len(),
        snapshot.captured_at.format("%H:%M:%S")
    );

    for station in &snapshot.stations {
        let association = station
            .associated_bssid
            .as_deref()
            .unwrap_or("not associated");
        let _ = write!(
            out,
            "    {}  {:>6}  {:>6} pkts  {}",
            station.mac.bright_white(),
            signal(station.signal_dbm),
            station.packet_count,
            association
        );
        if !station.probed_ssids.is_empty() {
            let _ = write!(out, "  probes: {}", station.probed_ssids.join(", ").bright_yellow());
        }
        out.push('\n');
    }
    Ok(out.trim_end().to_string())
}

pub fn render_flood_start(start: &FloodStart, format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        let value = json!({
            "groups": start.groups,
            "started": start.started,
            "failed": start.failed.as_ref().map(|(index, e)| json!({ "group": index, "error": e.to_string() })),
        });
        return serde_json::to_string_pretty(&value);
    }

    let mut out = String::new();
    for group in &start.groups {
        let line = if start.started.contains(&group.index) {
            format!("{} group {} ({})", "[✓]".bright_green(), group.index + 1, group.strategy)
        } else if matches!(&start.failed, Some((index, _)) if *index == group.index) {
            format!("{} group {} ({}) failed to start", "[!]".bright_red(), group.index + 1, group.strategy)
        } else {
            format!("{} group {} ({}) not launched", "[-]".bright_yellow(), group.index + 1, group.strategy)
        };
        let _ = writeln!(out, "{}", line);
    }
    if let Some((_, e)) = &start.failed {
        let _ = writeln!(out, "{} {}", "Error:".bright_red(), e);
    }
    Ok(out.trim_end().to_string())
}

pub fn render_flood_status(status: &FloodStatus, format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string(&json!({
            "elapsed_secs": status.elapsed.as_secs(),
            "alive": status.alive,
            "total": status.total,
        }));
    }

    let alive = format!("{}/{}", status.alive, status.total);
    let alive = if status.alive == status.total {
        alive.bright_green()
    } else {
        alive.bright_yellow()
    };
    Ok(format!(
        "{} flooding for {}s, {} flooders alive",
        "[~]".bright_blue(),
        status.elapsed.as_secs(),
        alive
    ))
}

/// Spinner shown while a scan is running
pub fn scan_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn signal(dbm: i32) -> ColoredString {
    let text = dbm.to_string();
    match dbm {
        d if d >= -55 => text.bright_green(),
        d if d >= -70 => text.bright_yellow(),
        _ => text.bright_red(),
    }
}
