//! Prelude module for common re-exports.
//!
//! ```rust
//! use station_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    AxisConfig, BusConfig, ConfigError, ConfigLoader, NetworkConfig, SharedConfig,
    StationConfig, StationRole, load_station_config,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{MAX_AXES, MAX_OPERATION_NO};

// ─── Domain Types ───────────────────────────────────────────────────
pub use crate::alarm::{ALARM_CODE_COMM_LOST, ALARM_CODE_UNKNOWN, AlarmEvent};
pub use crate::command::{Command, CommandOrigin, StationCommand};
pub use crate::cue::{AxisId, Cue, CueAction};
pub use crate::link::{NullLink, StationLink, VideoCue};
pub use crate::state::{MotorState, StationState};
