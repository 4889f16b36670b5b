//! Station event queue.
//!
//! Two fixed-capacity lanes feed the sequencer:
//!
//! | Lane | Commands | On overflow |
//! |------|----------|-------------|
//! | urgent | Stop, Reset, AlarmClear | duplicate of the newest entry collapses, else rejected |
//! | normal | Start, StandbyEnter | oldest dropped |
//!
//! Lanes only decide overflow handling and wake-up. Every push is stamped
//! with a sequence number and [`EventQueue::drain`] returns commands in
//! arrival order across both lanes, so `Start` then `Stop` is applied as
//! `Start` then `Stop`.
//!
//! An urgent push wakes a loop waiting in [`EventQueue::wait_urgent`], so a
//! stop pre-empts the remaining poll sleep.

use heapless::Deque;
use parking_lot::{Condvar, Mutex};
use static_assertions::const_assert;
use station_common::command::StationCommand;
use station_common::consts::{EVENT_QUEUE_CAPACITY, URGENT_QUEUE_CAPACITY};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const_assert!(URGENT_QUEUE_CAPACITY > 0);
const_assert!(EVENT_QUEUE_CAPACITY > 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Urgent lane full; the command was not queued.
    #[error("urgent lane full, {} rejected", .0.command)]
    Full(StationCommand),
}

#[derive(Debug, Clone, Copy)]
struct Queued {
    seq: u64,
    cmd: StationCommand,
}

#[derive(Debug, Default)]
struct Lanes {
    urgent: Deque<Queued, URGENT_QUEUE_CAPACITY>,
    normal: Deque<Queued, EVENT_QUEUE_CAPACITY>,
    next_seq: u64,
    dropped: u64,
}

impl Lanes {
    fn stamp(&mut self, cmd: StationCommand) -> Queued {
        let seq = self.next_seq;
        self.next_seq += 1;
        Queued { seq, cmd }
    }

    /// Last thing pushed, if it is still queued.
    fn newest(&self) -> Option<&Queued> {
        let newest = self.next_seq.checked_sub(1)?;
        self.urgent
            .back()
            .filter(|q| q.seq == newest)
            .or_else(|| self.normal.back().filter(|q| q.seq == newest))
    }
}

/// Multi-producer, single-consumer command queue.
#[derive(Debug, Default)]
pub struct EventQueue {
    lanes: Mutex<Lanes>,
    urgent_ready: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, cmd: StationCommand) -> Result<(), QueueError> {
        let mut lanes = self.lanes.lock();
        if cmd.command.is_urgent() {
            // Only a repeat of the very last push collapses; anything else
            // in between would change the applied order.
            if lanes.newest().is_some_and(|q| q.cmd == cmd) {
                return Ok(());
            }
            if lanes.urgent.is_full() {
                warn!(command = %cmd.command, "urgent lane full");
                return Err(QueueError::Full(cmd));
            }
            let queued = lanes.stamp(cmd);
            // Checked for room above.
            let _ = lanes.urgent.push_back(queued);
            drop(lanes);
            self.urgent_ready.notify_one();
            return Ok(());
        }

        if lanes.normal.is_full() {
            if let Some(old) = lanes.normal.pop_front() {
                lanes.dropped += 1;
                warn!(dropped = %old.cmd.command, "event queue full, oldest entry dropped");
            }
        }
        let queued = lanes.stamp(cmd);
        // Room was just made.
        let _ = lanes.normal.push_back(queued);
        Ok(())
    }

    /// Take every queued command, oldest first across both lanes.
    pub fn drain(&self) -> Vec<StationCommand> {
        let mut lanes = self.lanes.lock();
        let mut out = Vec::with_capacity(lanes.urgent.len() + lanes.normal.len());
        loop {
            let take_urgent = match (lanes.urgent.front(), lanes.normal.front()) {
                (Some(u), Some(n)) => u.seq < n.seq,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_urgent {
                lanes.urgent.pop_front()
            } else {
                lanes.normal.pop_front()
            };
            out.extend(next.map(|q| q.cmd));
        }
        out
    }

    /// Block until an urgent command is queued or `timeout` elapses.
    ///
    /// Returns `true` when urgent work is pending.
    pub fn wait_urgent(&self, timeout: Duration) -> bool {
        let mut lanes = self.lanes.lock();
        if lanes.urgent.is_empty() {
            let _ = self.urgent_ready.wait_for(&mut lanes, timeout);
        }
        !lanes.urgent.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        let lanes = self.lanes.lock();
        lanes.urgent.is_empty() && lanes.normal.is_empty()
    }

    /// Normal-lane entries discarded on overflow so far.
    pub fn dropped_count(&self) -> u64 {
        self.lanes.lock().dropped
    }
}
