//! Cue types: one-shot actions tied to elapsed run time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Index of an axis within its station (position in the configured axis list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AxisId(pub u8);

impl AxisId {
    /// Position in the station's axis collection.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "axis#{}", self.0)
    }
}

/// Action a cue performs on its target axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CueAction {
    /// Select operation `n` and send START.
    SelectAndStart(u8),
    /// Send STOP.
    Stop,
    /// Send HOME.
    Home,
}

/// A scheduled action.
///
/// `fired` flips once per run and is reset when the next run begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    /// Elapsed run time at which the cue fires.
    pub trigger: Duration,
    /// Target axis.
    pub axis: AxisId,
    /// Action to perform.
    pub action: CueAction,
    /// Whether the cue already fired in the current run.
    pub fired: bool,
}

impl Cue {
    /// New unfired cue.
    pub const fn new(trigger: Duration, axis: AxisId, action: CueAction) -> Self {
        Self {
            trigger,
            axis,
            action,
            fired: false,
        }
    }

    /// Whether this cue starts an operation (and so schedules its axis).
    #[inline]
    pub const fn starts_operation(&self) -> bool {
        matches!(self.action, CueAction::SelectAndStart(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cue_is_unfired() {
        let cue = Cue::new(Duration::from_secs(2), AxisId(1), CueAction::SelectAndStart(0));
        assert!(!cue.fired);
        assert!(cue.starts_operation());
        assert_eq!(cue.axis.index(), 1);
    }

    #[test]
    fn stop_and_home_do_not_schedule() {
        assert!(!Cue::new(Duration::ZERO, AxisId(0), CueAction::Stop).starts_operation());
        assert!(!Cue::new(Duration::ZERO, AxisId(0), CueAction::Home).starts_operation());
    }
}
