//! # Station
//!
//! One station controller process.
//!
//! Supports two configuration modes:
//! - **Fleet** (`--config-dir DIR --station ID`): merges `default.toml` with
//!   the station's table in `stations.toml`.
//! - **Single file** (`--config FILE`): one already-merged station config.
//!
//! The process opens the serial bus (or a simulated one with `--simulate`),
//! binds the UDP command listener, and runs the station loop until SIGINT.

use clap::Parser;
use station_common::config::{LogLevel, StationConfig, load_station_config};
use station_common::link::{NullLink, StationLink};
use station_control_unit::{EventQueue, StationRunner, build_sequencer};
use station_hal::{SerialBus, SharedBus, SimProfile, SimulatedBus};
use station_net::{CommandListener, NetworkLink};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Station controller - stepper axes, cues and inter-station commands
#[derive(Parser, Debug)]
#[command(name = "station")]
#[command(version)]
#[command(about = "Station control loop for cue-driven stepper axes")]
struct Args {
    /// Configuration directory holding default.toml and stations.toml.
    #[arg(long, value_name = "DIR", requires = "station", conflicts_with = "config")]
    config_dir: Option<PathBuf>,

    /// Station id (table name in stations.toml).
    #[arg(long, value_name = "ID")]
    station: Option<String>,

    /// Single merged station configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Replace the serial bus with simulated drivers.
    #[arg(long)]
    simulate: bool,

    /// Do not bind or send UDP (local testing).
    #[arg(long)]
    offline: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = load(&args);
    setup_tracing(&args, config.as_ref().ok().map(|c| c.shared.log_level));

    info!("Station v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Station shutdown complete");
}

fn load(args: &Args) -> Result<StationConfig, station_common::config::ConfigError> {
    match (&args.config_dir, &args.station, &args.config) {
        (Some(dir), Some(id), _) => load_station_config(dir, id),
        (None, _, Some(file)) => StationConfig::load_validated(file),
        _ => load_station_config(
            &PathBuf::from(station_common::consts::DEFAULT_CONFIG_DIR),
            args.station.as_deref().unwrap_or_default(),
        ),
    }
}

fn run(args: &Args, config: StationConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        station = %config.station.id,
        name = %config.station.name,
        role = ?config.station.role,
        axes = config.axes.len(),
        cues = config.cues.len(),
        "Config OK"
    );

    // Bus unavailable at startup is fatal.
    let bus = if args.simulate {
        let slaves: Vec<u8> = config.axes.iter().map(|a| a.slave_id).collect();
        let (sim, _handle) = SimulatedBus::new(&slaves, SimProfile::default());
        SharedBus::new(sim)
    } else {
        SharedBus::new(SerialBus::open(
            Path::new(&config.bus.port),
            config.bus.baud_rate,
            config.bus.timeout(),
        )?)
    };
    info!(bus = %bus.describe(), "bus ready");

    let link: Box<dyn StationLink> = if args.offline {
        warn!("offline mode: no UDP traffic");
        Box::new(NullLink)
    } else {
        Box::new(NetworkLink::from_config(&config.network)?)
    };

    let sequencer = build_sequencer(&config, &bus, link)?;
    let queue = Arc::new(EventQueue::new());

    let listener = if args.offline {
        None
    } else {
        let queue = Arc::clone(&queue);
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.network.listen_port));
        Some(CommandListener::spawn(addr, move |cmd| {
            if let Err(e) = queue.push(cmd) {
                warn!(error = %e, "command not queued");
            }
        })?)
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut runner = StationRunner::new(sequencer, queue, config.bus.poll_interval());
    runner.run(&running);

    if let Some(listener) = listener {
        listener.shutdown();
    }

    let snapshot = serde_json::to_string(&runner.sequencer().snapshot())?;
    info!(snapshot = %snapshot, "final station state");
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
