//! Cue engine: a run clock and the cues it fires.
//!
//! Cues are kept sorted by trigger time. Equal triggers keep configuration
//! order. The clock advances only while a run is active; each cue fires at
//! most once per run.

use station_common::cue::{AxisId, Cue};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CueEngine {
    cues: Vec<Cue>,
    elapsed: Duration,
    running: bool,
}

impl CueEngine {
    pub fn new(mut cues: Vec<Cue>) -> Self {
        // Stable: ties keep their configured order.
        cues.sort_by_key(|c| c.trigger);
        for cue in &mut cues {
            cue.fired = false;
        }
        Self {
            cues,
            elapsed: Duration::ZERO,
            running: false,
        }
    }

    /// Begin a new run: clock to zero, every cue unfired.
    pub fn start_run(&mut self) {
        for cue in &mut self.cues {
            cue.fired = false;
        }
        self.elapsed = Duration::ZERO;
        self.running = true;
    }

    /// Freeze the clock. Fired flags are kept.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Stop the run and forget it.
    pub fn reset(&mut self) {
        self.pause();
        self.elapsed = Duration::ZERO;
        for cue in &mut self.cues {
            cue.fired = false;
        }
    }

    /// Advance the run clock by `dt`. No-op when no run is active.
    pub fn advance(&mut self, dt: Duration) {
        if self.running {
            self.elapsed = self.elapsed.saturating_add(dt);
        }
    }

    /// Mark and return every unfired cue whose trigger has passed, in
    /// firing order.
    pub fn due(&mut self) -> Vec<Cue> {
        let elapsed = self.elapsed;
        let mut fired = Vec::new();
        for cue in self
            .cues
            .iter_mut()
            .take_while(|c| c.trigger <= elapsed)
            .filter(|c| !c.fired)
        {
            cue.fired = true;
            fired.push(cue.clone());
        }
        fired
    }

    pub fn all_fired(&self) -> bool {
        self.cues.iter().all(|c| c.fired)
    }

    /// Axes that some cue starts an operation on.
    pub fn scheduled_axes(&self) -> BTreeSet<AxisId> {
        self.cues
            .iter()
            .filter(|c| c.starts_operation())
            .map(|c| c.axis)
            .collect()
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }
}
