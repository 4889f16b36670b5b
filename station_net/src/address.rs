//! OSC address table.
//!
//! | Address | Command | Origin |
//! |---------|---------|--------|
//! | `/start` | Start | Remote |
//! | `/stop` | Stop | Remote |
//! | `/reset` | Reset | Remote |
//! | `/standby` | StandbyEnter | Remote |
//! | `/clear_alarm` | AlarmClear | Remote |
//! | `/control/start` | Start | Local |
//! | `/control/stop` | Stop | Local |
//!
//! Outbound to the video host: `/video/<cue>`.

use station_common::command::{Command, CommandOrigin, StationCommand};
use station_common::link::VideoCue;

pub const ADDR_START: &str = "/start";
pub const ADDR_STOP: &str = "/stop";
pub const ADDR_RESET: &str = "/reset";
pub const ADDR_STANDBY: &str = "/standby";
pub const ADDR_CLEAR_ALARM: &str = "/clear_alarm";
pub const ADDR_CONTROL_START: &str = "/control/start";
pub const ADDR_CONTROL_STOP: &str = "/control/stop";

/// Prefix of every video notification.
pub const VIDEO_PREFIX: &str = "/video/";

/// Map an inbound address to a command. Arguments are ignored.
pub fn command_for(address: &str) -> Option<StationCommand> {
    let (command, origin) = match address {
        ADDR_START => (Command::Start, CommandOrigin::Remote),
        ADDR_STOP => (Command::Stop, CommandOrigin::Remote),
        ADDR_RESET => (Command::Reset, CommandOrigin::Remote),
        ADDR_STANDBY => (Command::StandbyEnter, CommandOrigin::Remote),
        ADDR_CLEAR_ALARM => (Command::AlarmClear, CommandOrigin::Remote),
        ADDR_CONTROL_START => (Command::Start, CommandOrigin::Local),
        ADDR_CONTROL_STOP => (Command::Stop, CommandOrigin::Local),
        _ => return None,
    };
    Some(StationCommand { command, origin })
}

/// Address a command is relayed under.
pub const fn address_for(command: Command) -> &'static str {
    match command {
        Command::Start => ADDR_START,
        Command::Stop => ADDR_STOP,
        Command::Reset => ADDR_RESET,
        Command::StandbyEnter => ADDR_STANDBY,
        Command::AlarmClear => ADDR_CLEAR_ALARM,
    }
}

pub fn video_address(cue: VideoCue) -> String {
    format!("{VIDEO_PREFIX}{}", cue.as_str())
}

/// Parse `/video/<cue>`.
pub fn parse_video_address(address: &str) -> Option<VideoCue> {
    address
        .strip_prefix(VIDEO_PREFIX)
        .and_then(VideoCue::from_name)
}
