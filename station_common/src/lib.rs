//! Station Common Library
//!
//! Shared constants, domain types and configuration loading for all
//! station workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Limits and protocol defaults
//! - [`state`] - `MotorState` and `StationState`
//! - [`command`] - Operator commands and their origin
//! - [`cue`] - Axis ids and scheduled cues
//! - [`alarm`] - Alarm events and codes
//! - [`link`] - Outbound network seam (`StationLink`)
//! - [`config`] - Configuration loading and validation
//! - [`prelude`] - Common re-exports for convenience

pub mod alarm;
pub mod command;
pub mod config;
pub mod consts;
pub mod cue;
pub mod link;
pub mod prelude;
pub mod state;
