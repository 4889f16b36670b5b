//! # Station Network Link
//!
//! OSC 1.0 over UDP between stations, the video host and operator tools.
//!
//! | Direction | Traffic |
//! |-----------|---------|
//! | inbound | `/start`, `/stop`, `/reset`, `/standby`, `/clear_alarm`, `/control/*` |
//! | master → peers | the same command addresses, relayed once |
//! | station → video | `/video/<cue>` |
//!
//! Delivery is best-effort. Nothing is acknowledged or retried; a station
//! that misses a relayed command stays where it was until the operator
//! issues the next one.

pub mod address;
pub mod error;
pub mod link;
pub mod listener;
pub mod osc;

pub use error::NetError;
pub use link::NetworkLink;
pub use listener::{CommandListener, parse_packet};
pub use osc::{OscArg, OscMessage};
