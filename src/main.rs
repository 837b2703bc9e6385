use anyhow::{bail, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use log::debug;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use airpanel::{
    output::{self, OutputFormat},
    session::{FloodStatus, ReconUpdate},
    NetworkRecord, SessionConfig, SessionKind, SessionManager, TargetKind, TargetSelection,
};

fn build_cli() -> Command {
    Command::new("airpanel")
        .version(env!("CARGO_PKG_VERSION"))
        .author("ibrahimsql")
        .about("Airpanel: supervised scan, recon and beacon-flood sessions for wireless audits")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: ~/.airpanel.toml)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("interface")
                .short('i')
                .long("interface")
                .value_name("IFACE")
                .help("Wireless interface to manage")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print results as JSON")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("monitor")
                .about("Toggle or inspect monitor mode")
                .arg(
                    Arg::new("action")
                        .value_name("ACTION")
                        .required(true)
                        .value_parser(["on", "off", "status"]),
                ),
        )
        .subcommand(Command::new("scan").about("Scan for nearby networks").arg(duration_arg()))
        .subcommand(
            Command::new("recon")
                .about("Watch the stations around one network")
                .arg(
                    Arg::new("bssid")
                        .long("bssid")
                        .value_name("BSSID")
                        .help("Target BSSID (skips the scan)")
                        .requires("channel"),
                )
                .arg(
                    Arg::new("channel")
                        .long("channel")
                        .value_name("CH")
                        .help("Target channel")
                        .value_parser(clap::value_parser!(i32))
                        .requires("bssid"),
                )
                .arg(duration_arg()),
        )
        .subcommand(
            Command::new("flood")
                .about("Beacon flood with variants of a network name")
                .arg(
                    Arg::new("ssid")
                        .long("ssid")
                        .value_name("SSID")
                        .help("Network name to flood (skips the scan)"),
                )
                .arg(
                    Arg::new("groups")
                        .short('g')
                        .long("groups")
                        .value_name("N")
                        .help("Number of flooder processes")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(duration_arg()),
        )
}

fn duration_arg() -> Arg {
    Arg::new("duration")
        .short('d')
        .long("duration")
        .value_name("SECS")
        .help("Scan duration in seconds")
        .value_parser(clap::value_parser!(u64))
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<SessionConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => SessionConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::load_default_config(),
    };

    if let Some(interface) = matches.get_one::<String>("interface") {
        config.interface = interface.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let default_level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let mut config = load_config(&matches)?;
    let format = OutputFormat::from_json_flag(matches.get_flag("json"));

    let (name, sub) = matches.subcommand().context("missing subcommand")?;
    if let Some(groups) = sub.try_get_one::<usize>("groups").ok().flatten() {
        config.flood_groups = *groups;
    }
    let scan_duration = sub
        .try_get_one::<u64>("duration")
        .ok()
        .flatten()
        .map(|secs| Duration::from_secs(*secs))
        .unwrap_or_else(|| config.scan_duration());

    let manager = SessionManager::new(config)?;

    let result = match name {
        "monitor" => run_monitor(&manager, sub, format).await,
        "scan" => run_scan(&manager, scan_duration, format).await.map(drop),
        "recon" => run_recon(&manager, sub, scan_duration, format).await,
        "flood" => run_flood(&manager, sub, scan_duration, format).await,
        other => bail!("unknown command {}", other),
    };

    manager.shutdown().await;
    result
}

async fn run_monitor(manager: &SessionManager, sub: &ArgMatches, format: OutputFormat) -> anyhow::Result<()> {
    let interface = &manager.config().interface;
    match sub.get_one::<String>("action").map(String::as_str) {
        Some("on") => {
            manager.enable_monitor().await?;
            println!("{} monitor mode enabled on {}", "[✓]".bright_green(), manager.capture_interface().bright_cyan());
        }
        Some("off") => {
            manager.disable_monitor().await?;
            println!("{} monitor mode disabled on {}", "[✓]".bright_green(), interface.bright_cyan());
        }
        _ => {
            let active = manager.monitor_active();
            if format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "interface": interface, "monitor": active }));
            } else if active {
                println!("{} {} is in monitor mode", "[✓]".bright_green(), manager.capture_interface().bright_cyan());
            } else {
                println!("{} {} is not in monitor mode", "[!]".bright_yellow(), interface.bright_cyan());
            }
        }
    }
    Ok(())
}

async fn run_scan(manager: &SessionManager, duration: Duration, format: OutputFormat) -> anyhow::Result<Vec<NetworkRecord>> {
    let mut rx = manager.start_scan(duration).await?;
    let spinner = output::scan_spinner(format!("Scanning on {}", manager.capture_interface()));

    let outcome = tokio::select! {
        outcome = &mut rx => outcome,
        _ = tokio::signal::ctrl_c() => {
            spinner.set_message("Cancelling");
            manager.stop(SessionKind::Scan).await;
            rx.await
        }
    };
    spinner.finish_and_clear();

    let networks = outcome.context("scan task ended without a result")??;
    println!("{}", output::render_networks(&networks, format)?);
    Ok(networks)
}

/// Scan, list and let the operator pick a row from stdin
async fn pick_network(manager: &SessionManager, duration: Duration, format: OutputFormat) -> anyhow::Result<NetworkRecord> {
    let mut networks = run_scan(manager, duration, format).await?;
    if networks.is_empty() {
        bail!("no networks to choose from");
    }

    eprint!("{} ", "Select target #:".bright_blue());
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let choice: usize = line.trim().parse().context("expected a row number")?;
    if choice == 0 || choice > networks.len() {
        bail!("row {} is out of range", choice);
    }
    Ok(networks.swap_remove(choice - 1))
}

async fn run_recon(
    manager: &SessionManager,
    sub: &ArgMatches,
    scan_duration: Duration,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let target = match (sub.get_one::<String>("bssid"), sub.get_one::<i32>("channel")) {
        (Some(bssid), Some(channel)) => {
            let target = TargetSelection::new(TargetKind::Recon, None, Some(bssid.to_uppercase()), Some(*channel));
            manager.select(target).await?
        }
        _ => {
            let network = pick_network(manager, scan_duration, format).await?;
            manager.select_target(TargetKind::Recon, &network).await?
        }
    };

    let mut rx = manager.start_recon(&target).await?;
    eprintln!("{} recon running, press Ctrl+C to stop", "[~]".bright_blue());

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            update = rx.recv() => match update {
                Some(update) => {
                    if let Err(e) = print_recon_update(update, format) {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            }
        }
    };

    manager.stop(SessionKind::Recon).await;
    result
}

fn print_recon_update(update: ReconUpdate, format: OutputFormat) -> anyhow::Result<()> {
    let snapshot = update?;
    if format == OutputFormat::Text {
        // Each snapshot replaces the last one
        print!("\x1B[2J\x1B[H");
    }
    println!("{}", output::render_snapshot(&snapshot, format)?);
    Ok(())
}

async fn run_flood(
    manager: &SessionManager,
    sub: &ArgMatches,
    scan_duration: Duration,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let target = match sub.get_one::<String>("ssid") {
        Some(ssid) => {
            manager
                .select(TargetSelection::new(TargetKind::BeaconFlood, Some(ssid.clone()), None, None))
                .await?
        }
        None => {
            let network = pick_network(manager, scan_duration, format).await?;
            manager.select_target(TargetKind::BeaconFlood, &network).await?
        }
    };

    let (start, mut status) = manager.start_flood(&target).await?;
    println!("{}", output::render_flood_start(&start, format)?);
    eprintln!("{} flood running, press Ctrl+C to stop", "[~]".bright_blue());

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            update = status.recv() => match update {
                Some(update) => {
                    if let Err(e) = print_flood_status(&update, format) {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            }
        }
    };

    debug!("Stopping flood");
    manager.stop(SessionKind::Flood).await;
    result
}

fn print_flood_status(status: &FloodStatus, format: OutputFormat) -> anyhow::Result<()> {
    println!("{}", output::render_flood_status(status, format)?);
    Ok(())
}
