//! # Station Diagnostic
//!
//! Talks to CVD drivers directly, without a station loop:
//!
//! | Command | Output |
//! |---------|--------|
//! | `scan [--from N --to N]` | every slave id that answers a status read |
//! | `status --slave N` | decoded status word, input command word, present alarm |
//!
//! Reports go to stdout (JSON with `--json`), logs to stderr.
//! `--simulate 1,2` replaces the serial port with simulated drivers.

use clap::{Parser, Subcommand};
use serde::Serialize;
use station_common::alarm::describe_alarm;
use station_common::consts::{
    DEFAULT_BAUD_RATE, DEFAULT_BUS_TIMEOUT_MS, DEFAULT_SERIAL_PORT, MAX_SLAVE_ID, MIN_SLAVE_ID,
};
use station_hal::{BusError, MotorDriver, SerialBus, SharedBus, SimProfile, SimulatedBus};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "station_diagnostic")]
#[command(version)]
#[command(about = "Scan the RS-485 bus and dump driver status")]
struct Args {
    /// Serial device.
    #[arg(long, default_value = DEFAULT_SERIAL_PORT)]
    port: PathBuf,

    /// Baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Response timeout [ms].
    #[arg(long, default_value_t = DEFAULT_BUS_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Use simulated drivers with these slave ids instead of the port.
    #[arg(long, value_delimiter = ',', value_name = "IDS")]
    simulate: Option<Vec<u8>>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// JSON logs and JSON reports.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Find responding slaves.
    Scan {
        #[arg(long, default_value_t = MIN_SLAVE_ID)]
        from: u8,
        #[arg(long, default_value_t = 16)]
        to: u8,
    },
    /// Dump one slave.
    Status {
        #[arg(long)]
        slave: u8,
    },
}

#[derive(Debug, Serialize)]
struct ScanReport {
    found: Vec<u8>,
    /// Slaves that answered with something other than a timeout.
    errors: Vec<(u8, String)>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    slave_id: u8,
    status_word: u16,
    status_flags: Vec<&'static str>,
    command_word: u16,
    alarm_code: u32,
    alarm: &'static str,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let bus = match &args.simulate {
        Some(ids) => {
            let (sim, _handle) = SimulatedBus::new(ids, SimProfile::default());
            SharedBus::new(sim)
        }
        None => SharedBus::new(SerialBus::open(
            &args.port,
            args.baud,
            Duration::from_millis(args.timeout_ms),
        )?),
    };
    info!(bus = %bus.describe(), "bus open");

    match args.action {
        Action::Scan { from, to } => {
            let report = scan(&bus, from, to)?;
            if args.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!("responding slaves: {:?}", report.found);
                for (slave, err) in &report.errors {
                    println!("slave {slave}: {err}");
                }
            }
        }
        Action::Status { slave } => {
            let report = status(&bus, slave)?;
            if args.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!("slave {}", report.slave_id);
                println!(
                    "  status  {:#06x} {}",
                    report.status_word,
                    report.status_flags.join(" ")
                );
                println!("  command {:#06x}", report.command_word);
                println!("  alarm   {:#06x} {}", report.alarm_code, report.alarm);
            }
        }
    }
    Ok(())
}

fn scan(bus: &SharedBus, from: u8, to: u8) -> Result<ScanReport, Box<dyn std::error::Error>> {
    let range = from.max(MIN_SLAVE_ID)..=to.min(MAX_SLAVE_ID);
    if range.is_empty() {
        return Err(format!("empty slave range {from}..={to}").into());
    }

    let mut report = ScanReport {
        found: Vec::new(),
        errors: Vec::new(),
    };
    for slave in range {
        match MotorDriver::new(bus.clone(), slave).read_status() {
            Ok(bits) => {
                info!(slave, status = format_args!("{:#06x}", bits.bits()), "found");
                report.found.push(slave);
            }
            Err(BusError::Timeout { .. }) => debug!(slave, "no answer"),
            Err(e) => report.errors.push((slave, e.to_string())),
        }
    }
    Ok(report)
}

fn status(bus: &SharedBus, slave: u8) -> Result<StatusReport, BusError> {
    let driver = MotorDriver::new(bus.clone(), slave);
    let bits = driver.read_status()?;
    let command = driver.read_command()?;
    let code = driver.read_alarm_code()?;
    Ok(StatusReport {
        slave_id: slave,
        status_word: bits.bits(),
        status_flags: bits.iter_names().map(|(name, _)| name).collect(),
        command_word: command.bits(),
        alarm_code: code,
        alarm: if code == 0 { "none" } else { describe_alarm(code) },
    })
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout carries only the report.
    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
