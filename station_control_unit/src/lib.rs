//! # Station Control Unit
//!
//! Per-station control kernel: motor controllers driven over a shared
//! RS-485 bus, a cue engine, and the sequencer that composes them into the
//! station state machine.
//!
//! ## Layers
//!
//! 1. **MotorController** - per-axis homing/operation cycle with bounded
//!    poll retries
//! 2. **CueEngine** - run clock and one-shot timed actions
//! 3. **StationSequencer** - single writer of `StationState`, fail-stop on
//!    any axis alarm
//! 4. **StationRunner** - prioritized command queue and the tick loop

pub mod cue;
pub mod motor;
pub mod queue;
pub mod runner;
pub mod sequencer;

pub use cue::CueEngine;
pub use motor::{ControllerSettings, MotorController, MotorError, MotorEvent};
pub use queue::{EventQueue, QueueError};
pub use runner::{CycleStats, RunnerError, StationRunner, build_sequencer};
pub use sequencer::{SequencerError, StationSequencer, StationSnapshot};
