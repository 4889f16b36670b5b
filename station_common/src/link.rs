//! Outbound notification seam between the sequencer and the network.
//!
//! The sequencer never talks to sockets directly. It reports state changes
//! through a [`StationLink`]; the network crate provides the UDP
//! implementation and tests substitute in-memory ones.

use crate::command::Command;
use std::fmt;

/// Notification sent to the video playback host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCue {
    Ready,
    Standby,
    Stop,
    Reset,
    Finished,
    Error,
}

impl VideoCue {
    /// Path segment appended to `/video/`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Standby => "standby",
            Self::Stop => "stop",
            Self::Reset => "reset",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }

    /// Parse the path segment after `/video/`.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ready" => Self::Ready,
            "standby" => Self::Standby,
            "stop" => Self::Stop,
            "reset" => Self::Reset,
            "finished" => Self::Finished,
            "error" => Self::Error,
            _ => return None,
        })
    }
}

impl fmt::Display for VideoCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound side of a station's network link.
///
/// Both operations are best-effort: a failed send is logged by the
/// implementation and never blocks or fails the control loop.
pub trait StationLink: Send {
    /// Tell the video host about a station state change.
    fn notify_video(&mut self, cue: VideoCue);

    /// Relay a command to every configured peer (master stations only).
    fn broadcast(&mut self, command: Command);
}

/// Link that discards everything. Used by stations without networking.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLink;

impl StationLink for NullLink {
    fn notify_video(&mut self, _cue: VideoCue) {}

    fn broadcast(&mut self, _command: Command) {}
}
