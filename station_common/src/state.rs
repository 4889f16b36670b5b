//! State enums for axes and stations.
//!
//! All enums use `#[repr(u8)]` so snapshots can be logged or shipped as
//! compact codes.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Per-Axis State ─────────────────────────────────────────────────

/// Per-axis motor state.
///
/// Only `Ready` accepts a start request, only `Running` (and an aborted
/// `Homing`) accept a stop. `Error` is reachable from any state and is left
/// only through an explicit alarm clear, which re-homes the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MotorState {
    /// Not initialized or not referenced.
    Disconnected = 0,
    /// HOME issued, waiting for HOME-END.
    Homing = 1,
    /// Referenced and idle.
    Ready = 2,
    /// Operation started, waiting for completion.
    Running = 3,
    /// Operation complete (transient, returns to `Ready`).
    Finished = 4,
    /// Hardware alarm or lost communication.
    Error = 5,
}

impl MotorState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Homing),
            2 => Some(Self::Ready),
            3 => Some(Self::Running),
            4 => Some(Self::Finished),
            5 => Some(Self::Error),
            _ => None,
        }
    }

    /// Lowercase name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Homing => "homing",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }

    /// Whether the controller samples the bus in this state.
    #[inline]
    pub const fn is_polled(self) -> bool {
        matches!(self, Self::Homing | Self::Running)
    }
}

impl Default for MotorState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl fmt::Display for MotorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Station State ──────────────────────────────────────────────────

/// Station-level sequencing state.
///
/// Exactly one is active per station process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StationState {
    /// Process started, axes not yet initialized.
    Boot = 0,
    /// Homing every axis.
    Homing = 1,
    /// All axes ready, waiting for Start.
    Ready = 2,
    /// Run armed.
    Standby = 3,
    /// Run clock advancing, cues firing.
    Running = 4,
    /// Every scheduled axis finished (transient, returns to `Ready`).
    Finished = 5,
    /// Stopped by command or by an axis fault.
    Stopped = 6,
}

impl StationState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Boot),
            1 => Some(Self::Homing),
            2 => Some(Self::Ready),
            3 => Some(Self::Standby),
            4 => Some(Self::Running),
            5 => Some(Self::Finished),
            6 => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Lowercase name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Homing => "homing",
            Self::Ready => "ready",
            Self::Standby => "standby",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Stopped => "stopped",
        }
    }
}

impl Default for StationState {
    fn default() -> Self {
        Self::Boot
    }
}

impl fmt::Display for StationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_state_roundtrips_through_u8() {
        for v in 0..=5u8 {
            let s = MotorState::from_u8(v).unwrap();
            assert_eq!(s as u8, v);
        }
        assert!(MotorState::from_u8(6).is_none());
    }

    #[test]
    fn station_state_roundtrips_through_u8() {
        for v in 0..=6u8 {
            let s = StationState::from_u8(v).unwrap();
            assert_eq!(s as u8, v);
        }
        assert!(StationState::from_u8(7).is_none());
    }

    #[test]
    fn only_homing_and_running_are_polled() {
        assert!(MotorState::Homing.is_polled());
        assert!(MotorState::Running.is_polled());
        assert!(!MotorState::Ready.is_polled());
        assert!(!MotorState::Finished.is_polled());
        assert!(!MotorState::Disconnected.is_polled());
        assert!(!MotorState::Error.is_polled());
    }

    #[test]
    fn defaults() {
        assert_eq!(MotorState::default(), MotorState::Disconnected);
        assert_eq!(StationState::default(), StationState::Boot);
        assert_eq!(StationState::Standby.to_string(), "standby");
    }
}
