//! Station loop: drain commands → tick → wait.
//!
//! ## Cycle
//! 1. Apply queued commands in arrival order.
//! 2. `StationSequencer::tick` (poll axes, fire cues, joins). The tick right
//!    after a run starts uses a zero step, so cue time counts from `Start`.
//! 3. Wait out the poll interval. An urgent push ends the wait early, so a
//!    stop is acted on without waiting for the next scheduled tick.

use crate::motor::{ControllerSettings, MotorController};
use crate::queue::EventQueue;
use crate::sequencer::{SequencerError, StationSequencer};
use station_common::config::{ConfigError, StationConfig};
use station_common::cue::AxisId;
use station_common::link::StationLink;
use station_hal::{MotorDriver, SharedBus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Cycles between periodic statistics records.
pub const STATS_LOG_INTERVAL: u64 = 600;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle work duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle work duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle work duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Running sum of squares for stddev computation.
    pub sum_sq_cycle_ns: i128,
    /// Cycles whose work exceeded the poll interval.
    pub overruns: u64,
    /// Cycles cut short by an urgent command.
    pub preemptions: u64,
    /// Maximum wake-up latency [ns] (time past the planned wake).
    pub max_latency_ns: i64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            sum_sq_cycle_ns: 0,
            overruns: 0,
            preemptions: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
        self.sum_sq_cycle_ns += (duration_ns as i128) * (duration_ns as i128);
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
    }

    /// Average cycle time [ns] (returns 0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

fn as_ns(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

// ─── Construction ───────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sequencer(#[from] SequencerError),
}

/// Build a sequencer for `config` with every axis on `bus`.
pub fn build_sequencer(
    config: &StationConfig,
    bus: &SharedBus,
    link: Box<dyn StationLink>,
) -> Result<StationSequencer, RunnerError> {
    let settings = ControllerSettings::from(&config.bus);
    let controllers = config
        .axes
        .iter()
        .enumerate()
        .map(|(i, axis)| {
            MotorController::new(
                AxisId(i as u8),
                &axis.name,
                MotorDriver::new(bus.clone(), axis.slave_id),
                settings,
            )
        })
        .collect();
    let cues = config.resolve_cues()?;
    Ok(StationSequencer::new(
        &config.station.id,
        config.station.is_master(),
        controllers,
        cues,
        link,
    )?)
}

// ─── Runner ─────────────────────────────────────────────────────────

pub struct StationRunner {
    sequencer: StationSequencer,
    queue: Arc<EventQueue>,
    poll_interval: Duration,
    stats: CycleStats,
}

impl StationRunner {
    pub fn new(sequencer: StationSequencer, queue: Arc<EventQueue>, poll_interval: Duration) -> Self {
        Self {
            sequencer,
            queue,
            poll_interval,
            stats: CycleStats::new(),
        }
    }

    pub fn sequencer(&self) -> &StationSequencer {
        &self.sequencer
    }

    pub fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Boot the sequencer (Boot → Homing).
    pub fn boot(&mut self) {
        self.sequencer.boot();
    }

    /// Apply queued commands in the order they arrived. Returns how many
    /// were applied.
    pub fn apply_queued(&mut self) -> usize {
        let commands = self.queue.drain();
        let count = commands.len();
        for cmd in commands {
            // Rejections are logged by the sequencer.
            let _ = self.sequencer.apply(cmd);
        }
        count
    }

    /// One cycle body: commands, then a sequencer tick of `dt`.
    ///
    /// `dt` was measured before any `Start` in this batch, so a run begun
    /// here is ticked with a zero step.
    pub fn step(&mut self, dt: Duration) {
        let runs = self.sequencer.run_count();
        self.apply_queued();
        let dt = if self.sequencer.run_count() == runs {
            dt
        } else {
            Duration::ZERO
        };
        self.sequencer.tick(dt);
    }

    /// Boot the station and run until `running` is cleared. Every axis is
    /// sent STOP on the way out.
    pub fn run(&mut self, running: &AtomicBool) {
        info!(
            station = %self.sequencer.station_id(),
            master = self.sequencer.is_master(),
            axes = self.sequencer.axes().len(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "station loop starting"
        );
        self.boot();

        let mut last = Instant::now();
        let mut planned_wake = last + self.poll_interval;
        while running.load(Ordering::SeqCst) {
            let now = Instant::now();
            let latency = now.saturating_duration_since(planned_wake);
            let dt = now.duration_since(last);
            last = now;

            self.step(dt);

            let work = now.elapsed();
            self.stats.record(as_ns(work), as_ns(latency));
            if work > self.poll_interval {
                self.stats.overruns += 1;
                warn!(
                    work_us = work.as_micros() as u64,
                    interval_ms = self.poll_interval.as_millis() as u64,
                    "cycle overrun"
                );
            }
            if self.stats.cycle_count % STATS_LOG_INTERVAL == 0 {
                self.log_stats();
            }

            let remaining = self.poll_interval.saturating_sub(work);
            planned_wake = Instant::now() + remaining;
            if self.queue.wait_urgent(remaining) {
                self.stats.preemptions += 1;
                debug!("urgent command pre-empted wait");
                // No lateness when woken early on purpose.
                planned_wake = Instant::now();
            }
        }

        info!("station loop stopping, halting axes");
        self.sequencer.halt_all();
        self.log_stats();
    }

    fn log_stats(&self) {
        let s = &self.stats;
        info!(
            cycles = s.cycle_count,
            avg_us = s.avg_cycle_ns() / 1_000,
            max_us = s.max_cycle_ns / 1_000,
            max_latency_us = s.max_latency_ns / 1_000,
            overruns = s.overruns,
            preemptions = s.preemptions,
            dropped = self.queue.dropped_count(),
            state = %self.sequencer.state(),
            "cycle statistics"
        );
    }
}
