//! Configuration loading traits and types.
//!
//! Stations are deployed with two TOML files in one directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `default.toml` | Fleet-wide defaults (bus, network, shared) |
//! | `stations.toml` | One `[<station-id>]` table per station, merged over the defaults |
//!
//! The station table is deep-merged into the defaults: nested tables merge
//! key by key, anything else (including arrays such as `axes`) replaces the
//! default. Keys starting with `_` are annotations and never merged.
//!
//! # Usage
//!
//! ```rust,no_run
//! use station_common::config::{load_station_config, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = load_station_config(Path::new("/etc/station"), "station2")?;
//!     println!("Station: {} ({} axes)", config.station.id, config.axes.len());
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_BAUD_RATE, DEFAULT_BUS_TIMEOUT_MS, DEFAULT_LISTEN_PORT, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_POLL_RETRIES, DEFAULT_SEND_PORT, DEFAULT_SERIAL_PORT, DEFAULT_START_GRACE_POLLS,
    DEFAULT_VIDEO_HOST, DEFAULT_VIDEO_PORT, MAX_AXES, MAX_OPERATION_NO, MAX_SLAVE_ID,
    MIN_SLAVE_ID,
};
use crate::cue::{AxisId, Cue, CueAction};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Fleet-wide defaults file name.
pub const DEFAULT_FILE: &str = "default.toml";

/// Per-station overrides file name.
pub const STATIONS_FILE: &str = "stations.toml";

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared by every station binary.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "station-2"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_file(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound
        } else {
            ConfigError::ParseError(format!("{}: {e}", path.display()))
        }
    })
}

// ─── Station Sections ───────────────────────────────────────────────

/// Whether the station relays its commands to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StationRole {
    /// Broadcasts Start/Stop/Reset/Standby/AlarmClear to every peer.
    Master,
    /// Only listens.
    #[default]
    Follower,
}

/// Station identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationSection {
    /// Station identifier (key in `stations.toml`).
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Master or follower.
    #[serde(default)]
    pub role: StationRole,
}

impl StationSection {
    #[inline]
    pub fn is_master(&self) -> bool {
        self.role == StationRole::Master
    }
}

/// Serial bus and polling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Serial device path.
    pub port: String,
    /// Baud rate (8N1).
    pub baud_rate: u32,
    /// Per-transaction response timeout.
    pub timeout_ms: u64,
    /// Poll / tick interval.
    pub poll_interval_ms: u64,
    /// Consecutive failed status reads tolerated before an axis faults.
    pub poll_retries: u8,
    /// Polls after START during which a missing MOVE edge is tolerated.
    pub start_grace_polls: u32,
    /// Re-home an axis after it is stopped mid-operation.
    pub rehome_after_stop: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_BUS_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_retries: DEFAULT_POLL_RETRIES,
            start_grace_polls: DEFAULT_START_GRACE_POLLS,
            rehome_after_stop: false,
        }
    }
}

impl BusConfig {
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate the bus section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.is_empty() {
            return Err(ConfigError::ValidationError(
                "bus.port cannot be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::ValidationError(
                "bus.baud_rate must be > 0".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "bus.timeout_ms must be > 0".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "bus.poll_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One motor axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Logical name, referenced by cues.
    pub name: String,
    /// Bus address.
    pub slave_id: u8,
}

/// Cue action as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueActionKind {
    Start,
    Stop,
    Home,
}

/// One cue line.
///
/// ```toml
/// [[cues]]
/// at = 2.0
/// axis = "lift"
/// action = "start"
/// op = 0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CueConfig {
    /// Trigger time in seconds from run start.
    pub at: f64,
    /// Target axis name.
    pub axis: String,
    pub action: CueActionKind,
    /// Operation number (start cues only, defaults to 0).
    #[serde(default)]
    pub op: Option<u16>,
}

/// UDP ports and addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Inbound command port.
    pub listen_port: u16,
    /// Port peers listen on (used for peers given without a port).
    pub send_port: u16,
    /// Peer stations, as `ip` or `ip:port`.
    pub peers: Vec<String>,
    /// Video collaborator host.
    pub video_host: String,
    /// Video collaborator port.
    pub video_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            send_port: DEFAULT_SEND_PORT,
            peers: Vec::new(),
            video_host: DEFAULT_VIDEO_HOST.to_string(),
            video_port: DEFAULT_VIDEO_PORT,
        }
    }
}

impl NetworkConfig {
    /// Resolve peer entries to socket addresses.
    pub fn peer_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.peers
            .iter()
            .map(|peer| parse_endpoint(peer, self.send_port))
            .collect()
    }

    /// Video collaborator address.
    pub fn video_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_endpoint(&self.video_host, self.video_port)
    }
}

fn parse_endpoint(text: &str, default_port: u16) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = text.parse::<SocketAddr>() {
        return Ok(addr);
    }
    text.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, default_port))
        .map_err(|_| ConfigError::ValidationError(format!("invalid network address '{text}'")))
}

// ─── Station Config ─────────────────────────────────────────────────

/// Complete configuration of one station process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub shared: SharedConfig,
    pub station: StationSection,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub axes: Vec<AxisConfig>,
    #[serde(default)]
    pub cues: Vec<CueConfig>,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl StationConfig {
    /// Load a single, already-merged file and validate it.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.station.id.is_empty() {
            return Err(ConfigError::ValidationError(
                "station.id cannot be empty".to_string(),
            ));
        }
        self.bus.validate()?;

        if self.axes.len() > MAX_AXES {
            return Err(ConfigError::ValidationError(format!(
                "{} axes configured (max {MAX_AXES})",
                self.axes.len()
            )));
        }
        let mut names = HashSet::new();
        let mut slaves = HashSet::new();
        for axis in &self.axes {
            if axis.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "axis name cannot be empty".to_string(),
                ));
            }
            if !names.insert(axis.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate axis name '{}'",
                    axis.name
                )));
            }
            if !(MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&axis.slave_id) {
                return Err(ConfigError::ValidationError(format!(
                    "axis '{}': slave_id {} out of range {MIN_SLAVE_ID}..={MAX_SLAVE_ID}",
                    axis.name, axis.slave_id
                )));
            }
            if !slaves.insert(axis.slave_id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate slave_id {}",
                    axis.slave_id
                )));
            }
        }

        self.resolve_cues()?;
        self.network.peer_addrs()?;
        self.network.video_addr()?;
        Ok(())
    }

    /// Index of the axis with the given name.
    pub fn axis_id(&self, name: &str) -> Option<AxisId> {
        self.axes
            .iter()
            .position(|a| a.name == name)
            .map(|i| AxisId(i as u8))
    }

    /// Convert cue lines into runtime cues, in file order.
    pub fn resolve_cues(&self) -> Result<Vec<Cue>, ConfigError> {
        self.cues
            .iter()
            .enumerate()
            .map(|(i, line)| {
                if !line.at.is_finite() || line.at < 0.0 {
                    return Err(ConfigError::ValidationError(format!(
                        "cue {i}: trigger time {} must be finite and >= 0",
                        line.at
                    )));
                }
                let axis = self.axis_id(&line.axis).ok_or_else(|| {
                    ConfigError::ValidationError(format!(
                        "cue {i}: unknown axis '{}'",
                        line.axis
                    ))
                })?;
                let action = match (line.action, line.op) {
                    (CueActionKind::Start, op) => {
                        let op = op.unwrap_or(0);
                        if op > u16::from(MAX_OPERATION_NO) {
                            return Err(ConfigError::ValidationError(format!(
                                "cue {i}: operation {op} out of range 0..={MAX_OPERATION_NO}"
                            )));
                        }
                        CueAction::SelectAndStart(op as u8)
                    }
                    (CueActionKind::Stop | CueActionKind::Home, Some(_)) => {
                        return Err(ConfigError::ValidationError(format!(
                            "cue {i}: 'op' is only valid on start cues"
                        )));
                    }
                    (CueActionKind::Stop, None) => CueAction::Stop,
                    (CueActionKind::Home, None) => CueAction::Home,
                };
                let trigger = Duration::try_from_secs_f64(line.at).map_err(|e| {
                    ConfigError::ValidationError(format!(
                        "cue {i}: trigger time {}: {e}",
                        line.at
                    ))
                })?;
                Ok(Cue::new(trigger, axis, action))
            })
            .collect()
    }
}

// ─── Two-File Loader ────────────────────────────────────────────────

/// Recursively merge `overlay` into `base`, skipping `_`-prefixed keys.
pub fn deep_merge(base: &mut toml::Table, overlay: &toml::Table) {
    for (key, value) in overlay {
        if key.starts_with('_') {
            continue;
        }
        match (base.get_mut(key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn parse_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = read_file(path)?;
    content
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
}

/// Load `default.toml` + `stations.toml[station_id]` from `dir`, merge and validate.
///
/// `station.id` is always set to `station_id`.
pub fn load_station_config(dir: &Path, station_id: &str) -> Result<StationConfig, ConfigError> {
    let mut merged = parse_table(&dir.join(DEFAULT_FILE))?;
    let stations = parse_table(&dir.join(STATIONS_FILE))?;

    let overrides = match stations.get(station_id) {
        Some(toml::Value::Table(table)) => table,
        Some(_) => {
            return Err(ConfigError::ValidationError(format!(
                "station '{station_id}' entry is not a table"
            )));
        }
        None => {
            return Err(ConfigError::ValidationError(format!(
                "unknown station '{station_id}'"
            )));
        }
    };
    deep_merge(&mut merged, overrides);

    let station = merged
        .entry("station")
        .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    if let toml::Value::Table(section) = station {
        section.insert(
            "id".to_string(),
            toml::Value::String(station_id.to_string()),
        );
    }

    let config: StationConfig = toml::Value::Table(merged)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
