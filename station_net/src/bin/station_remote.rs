//! # Station Remote
//!
//! Operator console: sends station commands to every target over OSC/UDP.
//!
//! Targets come from `--target` (repeatable) and/or the `targets` list of a
//! `--config` file:
//!
//! ```toml
//! targets = ["10.0.0.12", "pi-controller-03.local:10000"]
//!
//! [shared]
//! service_name = "remote"
//! ```
//!
//! A target without a port uses the stations' default listen port.
//!
//! In `interactive` mode each stdin line is one command. `v` toggles
//! between start and stop, one key for the whole show.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use station_common::command::Command;
use station_common::config::{ConfigLoader, LogLevel, SharedConfig};
use station_common::consts::DEFAULT_LISTEN_PORT;
use station_common::link::StationLink;
use station_net::NetworkLink;
use std::io::BufRead;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "station_remote")]
#[command(version)]
#[command(about = "Send operator commands to stations")]
struct Args {
    /// Config file with a `targets` list.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Station address (`host` or `host:port`). Repeatable.
    #[arg(short, long = "target", value_name = "HOST[:PORT]", action = clap::ArgAction::Append)]
    targets: Vec<String>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Action {
    /// Start a run.
    Start,
    /// Stop every axis.
    Stop,
    /// Stop and re-home.
    Reset,
    /// Arm the run without motion.
    Standby,
    /// Clear axis alarms.
    ClearAlarm,
    /// Read commands from stdin, one per line.
    Interactive,
}

#[derive(Debug, Deserialize)]
struct RemoteConfig {
    #[serde(default)]
    shared: Option<SharedConfig>,
    #[serde(default)]
    targets: Vec<String>,
}

fn main() {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RemoteConfig::load(path).map(Some),
        None => Ok(None),
    };
    let configured_level = config
        .as_ref()
        .ok()
        .and_then(|c| c.as_ref())
        .and_then(|c| c.shared.as_ref())
        .map(|s| s.log_level);
    setup_tracing(&args, configured_level);

    let result = config
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

fn run(args: &Args, config: Option<RemoteConfig>) -> Result<(), Box<dyn std::error::Error>> {
    let mut names = config.map(|c| c.targets).unwrap_or_default();
    names.extend(args.targets.iter().cloned());
    if names.is_empty() {
        return Err("no targets (use --target or a config file)".into());
    }
    let targets = names
        .iter()
        .map(|name| resolve(name))
        .collect::<Result<Vec<_>, _>>()?;
    info!(targets = ?targets, "targets resolved");

    let mut link = NetworkLink::new(targets, None)?;
    match args.action {
        Action::Interactive => interactive(&mut link)?,
        action => {
            if let Some(command) = command_for(action) {
                send(&mut link, command);
            }
        }
    }
    if link.failed_count() > 0 {
        warn!(failed = link.failed_count(), "some datagrams were not sent");
    }
    Ok(())
}

fn command_for(action: Action) -> Option<Command> {
    Some(match action {
        Action::Start => Command::Start,
        Action::Stop => Command::Stop,
        Action::Reset => Command::Reset,
        Action::Standby => Command::StandbyEnter,
        Action::ClearAlarm => Command::AlarmClear,
        Action::Interactive => return None,
    })
}

fn resolve(name: &str) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_LISTEN_PORT));
    }
    let with_port = if name.contains(':') {
        name.to_string()
    } else {
        format!("{name}:{DEFAULT_LISTEN_PORT}")
    };
    with_port
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| format!("cannot resolve '{name}'").into())
}

fn send(link: &mut NetworkLink, command: Command) {
    link.broadcast(command);
    info!(command = %command, targets = link.peers().len(), "sent");
}

fn interactive(link: &mut NetworkLink) -> std::io::Result<()> {
    info!("commands: start, stop, reset, standby, clear (v toggles start/stop, q quits)");
    let mut started = false;
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let command = match line.trim().to_ascii_lowercase().as_str() {
            "" => continue,
            "q" | "quit" | "exit" => break,
            "v" if started => Command::Stop,
            "v" => Command::Start,
            "start" | "s" => Command::Start,
            "stop" | "x" => Command::Stop,
            "reset" | "r" => Command::Reset,
            "standby" | "b" => Command::StandbyEnter,
            "clear" | "clear-alarm" | "c" => Command::AlarmClear,
            other => {
                warn!(input = other, "unknown command");
                continue;
            }
        };
        match command {
            Command::Start => started = true,
            Command::Stop | Command::Reset => started = false,
            _ => {}
        }
        send(link, command);
    }
    Ok(())
}

fn setup_tracing(args: &Args, configured: Option<LogLevel>) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured.unwrap_or_default()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
