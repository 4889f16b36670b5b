//! Station commands.
//!
//! A [`Command`] is a payload-free tag. It is wrapped with its origin in a
//! [`StationCommand`] and consumed exactly once by the sequencer that
//! receives it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operator-level command applied to a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Begin a run (via Standby).
    Start,
    /// Stop every axis, station → Stopped.
    Stop,
    /// Stop every axis and re-home, station → Homing.
    Reset,
    /// Arm the run without starting motion.
    StandbyEnter,
    /// Clear axis alarms and re-home the faulted axes.
    AlarmClear,
}

impl Command {
    /// Safety-critical commands pre-empt the next tick and are never dropped
    /// on queue overflow.
    #[inline]
    pub const fn is_urgent(self) -> bool {
        matches!(self, Self::Stop | Self::Reset | Self::AlarmClear)
    }

    /// Lowercase name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reset => "reset",
            Self::StandbyEnter => "standby",
            Self::AlarmClear => "clear_alarm",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOrigin {
    /// Local operator input (keyboard/buttons on the master).
    Local,
    /// Received over the network from another station.
    Remote,
}

/// A command tagged with its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StationCommand {
    /// The command.
    pub command: Command,
    /// Its origin.
    pub origin: CommandOrigin,
}

impl StationCommand {
    /// Command from local operator input.
    pub const fn local(command: Command) -> Self {
        Self {
            command,
            origin: CommandOrigin::Local,
        }
    }

    /// Command received from the network.
    pub const fn remote(command: Command) -> Self {
        Self {
            command,
            origin: CommandOrigin::Remote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgent_commands() {
        assert!(Command::Stop.is_urgent());
        assert!(Command::Reset.is_urgent());
        assert!(Command::AlarmClear.is_urgent());
        assert!(!Command::Start.is_urgent());
        assert!(!Command::StandbyEnter.is_urgent());
    }

    #[test]
    fn constructors_set_origin() {
        assert_eq!(StationCommand::local(Command::Start).origin, CommandOrigin::Local);
        assert_eq!(StationCommand::remote(Command::Stop).origin, CommandOrigin::Remote);
    }
}
