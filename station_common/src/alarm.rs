//! Alarm events and codes.
//!
//! An [`AlarmEvent`] is produced when a poll reports the driver alarm bit
//! or when an axis loses communication. Every event is emitted as a
//! structured `tracing` record on the [`ALARM_TARGET`] target.

use crate::cue::AxisId;
use std::time::SystemTime;
use tracing::error;

/// `tracing` target carrying alarm and bus-fault records.
pub const ALARM_TARGET: &str = "station::alarm";

/// Alarm bit set but the present-alarm register could not be read.
pub const ALARM_CODE_UNKNOWN: u32 = 0xFFFF_0000;

/// Bus reads failed more often than the retry budget allows.
pub const ALARM_CODE_COMM_LOST: u32 = 0xFFFF_0001;

/// A command write to the driver failed.
pub const ALARM_CODE_COMMAND_FAILED: u32 = 0xFFFF_0002;

/// Hardware-reported or communication fault on one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEvent {
    /// Faulted axis.
    pub axis: AxisId,
    /// Axis name from configuration.
    pub axis_name: String,
    /// Bus address of the axis.
    pub slave_id: u8,
    /// Driver alarm code or one of the `ALARM_CODE_*` sentinels.
    pub code: u32,
    /// When the fault was observed.
    pub timestamp: SystemTime,
}

impl AlarmEvent {
    /// New event stamped with the current time.
    pub fn new(axis: AxisId, axis_name: &str, slave_id: u8, code: u32) -> Self {
        Self {
            axis,
            axis_name: axis_name.to_string(),
            slave_id,
            code,
            timestamp: SystemTime::now(),
        }
    }

    /// True when the event stems from the bus rather than the drive.
    #[inline]
    pub const fn is_communication_fault(&self) -> bool {
        matches!(self.code, ALARM_CODE_COMM_LOST | ALARM_CODE_COMMAND_FAILED)
    }

    /// Emit the event as a structured record.
    pub fn emit(&self) {
        error!(
            target: ALARM_TARGET,
            axis = self.axis.0,
            axis_name = %self.axis_name,
            slave_id = self.slave_id,
            code = self.code,
            kind = if self.is_communication_fault() { "communication" } else { "drive" },
            description = describe_alarm(self.code),
            "axis alarm"
        );
    }
}

/// Human-readable name for a driver alarm code.
pub fn describe_alarm(code: u32) -> &'static str {
    match code {
        ALARM_CODE_UNKNOWN => "alarm (code unavailable)",
        ALARM_CODE_COMM_LOST => "communication lost",
        ALARM_CODE_COMMAND_FAILED => "command write failed",
        0x10 => "excessive position deviation",
        0x20 => "overcurrent",
        0x21 => "main circuit overheat",
        0x22 => "overvoltage",
        0x25 => "undervoltage",
        0x30 => "overload",
        0x31 => "overspeed",
        0x41 => "EEPROM error",
        0x60 => "both limit sensors active",
        0x62 => "homing error",
        0x70 => "abnormal operation data",
        0x84 => "RS-485 communication error",
        0x85 => "RS-485 communication timeout",
        _ => "unrecognized alarm",
    }
}
