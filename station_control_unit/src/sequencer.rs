//! Station sequencer: the single writer of `StationState`.
//!
//! | From | Trigger | To | Side effects |
//! |------|---------|----|--------------|
//! | Boot | `boot()` | Homing | HOME on every axis (zero axes: straight to Ready) |
//! | Homing | all axes Ready | Ready | video `ready` |
//! | Ready / Stopped | StandbyEnter | Standby | video `standby` |
//! | Ready / Stopped | Start | Standby → Running | video `standby`, new run |
//! | Standby | Start | Running | new run |
//! | Running | all cues fired, scheduled axes finished | Finished → Ready | video `finished` |
//! | any | Stop | Stopped | STOP moving axes, pause cues, video `stop` |
//! | any | Reset | Homing | reset cues, video `reset`, re-home axes |
//! | any | AlarmClear | Homing (if an axis was cleared) | ALM-RST, re-home |
//! | any | axis alarm | Stopped | STOP other axes, video `error` |
//!
//! A master relays every accepted command to its peers after applying it
//! locally.

use crate::cue::CueEngine;
use crate::motor::{MotorController, MotorError, MotorEvent};
use heapless::Deque;
use serde::Serialize;
use station_common::alarm::AlarmEvent;
use station_common::command::{Command, StationCommand};
use station_common::consts::{ALARM_HISTORY_LEN, MAX_AXES};
use station_common::cue::{AxisId, Cue, CueAction};
use station_common::link::{StationLink, VideoCue};
use station_common::state::{MotorState, StationState};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    /// Command not accepted in the current state. No state change.
    #[error("{command} rejected in state {state}: {reason}")]
    Precondition {
        state: StationState,
        command: Command,
        reason: &'static str,
    },

    #[error("{0} axes configured, at most {MAX_AXES} supported")]
    TooManyAxes(usize),
}

/// Serializable view of one axis.
#[derive(Debug, Clone, Serialize)]
pub struct AxisSnapshot {
    pub name: String,
    pub slave_id: u8,
    pub state: MotorState,
    pub status: u16,
    pub last_operation: Option<u8>,
}

/// Serializable view of the station.
#[derive(Debug, Clone, Serialize)]
pub struct StationSnapshot {
    pub station_id: String,
    pub is_master: bool,
    pub state: StationState,
    pub run_count: u64,
    pub elapsed_ms: u128,
    pub pending: Vec<u8>,
    pub alarms: usize,
    pub axes: Vec<AxisSnapshot>,
}

pub struct StationSequencer {
    station_id: String,
    is_master: bool,
    state: StationState,
    axes: heapless::Vec<MotorController, MAX_AXES>,
    cues: CueEngine,
    link: Box<dyn StationLink>,
    /// Axes started in the current run that have not finished yet.
    pending: BTreeSet<AxisId>,
    alarms: Deque<AlarmEvent, ALARM_HISTORY_LEN>,
    run_count: u64,
}

impl StationSequencer {
    pub fn new(
        station_id: &str,
        is_master: bool,
        controllers: Vec<MotorController>,
        cues: Vec<Cue>,
        link: Box<dyn StationLink>,
    ) -> Result<Self, SequencerError> {
        let count = controllers.len();
        let mut axes = heapless::Vec::new();
        for controller in controllers {
            if axes.push(controller).is_err() {
                return Err(SequencerError::TooManyAxes(count));
            }
        }
        Ok(Self {
            station_id: station_id.to_string(),
            is_master,
            state: StationState::Boot,
            axes,
            cues: CueEngine::new(cues),
            link,
            pending: BTreeSet::new(),
            alarms: Deque::new(),
            run_count: 0,
        })
    }

    // ─── Accessors ──────────────────────────────────────────────────

    #[inline]
    pub fn state(&self) -> StationState {
        self.state
    }

    #[inline]
    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    #[inline]
    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn axes(&self) -> &[MotorController] {
        &self.axes
    }

    pub fn axis(&self, id: AxisId) -> Option<&MotorController> {
        self.axes.get(id.index())
    }

    pub fn cue_engine(&self) -> &CueEngine {
        &self.cues
    }

    /// Axes still expected to finish in the current run.
    pub fn pending(&self) -> &BTreeSet<AxisId> {
        &self.pending
    }

    /// Most recent alarms, oldest first.
    pub fn alarm_history(&self) -> impl Iterator<Item = &AlarmEvent> {
        self.alarms.iter()
    }

    /// Runs started since boot.
    #[inline]
    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    pub fn all_axes_ready(&self) -> bool {
        self.axes.iter().all(|a| a.state() == MotorState::Ready)
    }

    pub fn snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            station_id: self.station_id.clone(),
            is_master: self.is_master,
            state: self.state,
            run_count: self.run_count,
            elapsed_ms: self.cues.elapsed().as_millis(),
            pending: self.pending.iter().map(|a| a.0).collect(),
            alarms: self.alarms.len(),
            axes: self
                .axes
                .iter()
                .map(|a| AxisSnapshot {
                    name: a.name().to_string(),
                    slave_id: a.slave_id(),
                    state: a.state(),
                    status: a.last_status().bits(),
                    last_operation: a.last_operation(),
                })
                .collect(),
        }
    }

    // ─── Transitions ────────────────────────────────────────────────

    fn transition(&mut self, to: StationState) {
        if self.state != to {
            info!(station = %self.station_id, from = %self.state, to = %to, "station transition");
            self.state = to;
        }
    }

    fn notify(&mut self, cue: VideoCue) {
        self.link.notify_video(cue);
    }

    /// Boot → Homing: start homing every axis.
    pub fn boot(&mut self) {
        if self.state != StationState::Boot {
            return;
        }
        if self.axes.is_empty() {
            self.transition(StationState::Ready);
            self.notify(VideoCue::Ready);
            return;
        }
        self.transition(StationState::Homing);
        let mut faults = Vec::new();
        for axis in self.axes.iter_mut() {
            if let Err(MotorError::Bus { .. }) = axis.initialize() {
                faults.extend(axis.last_alarm().cloned());
            }
        }
        for alarm in faults {
            self.on_alarm(alarm);
        }
    }

    /// Apply one command. Returns the resulting state.
    pub fn apply(&mut self, cmd: StationCommand) -> Result<StationState, SequencerError> {
        info!(
            station = %self.station_id,
            command = %cmd.command,
            origin = ?cmd.origin,
            state = %self.state,
            "command received"
        );
        let result = match cmd.command {
            Command::Start => self.on_start(),
            Command::StandbyEnter => self.on_standby(),
            Command::Stop => {
                self.on_stop();
                Ok(())
            }
            Command::Reset => {
                self.on_reset();
                Ok(())
            }
            Command::AlarmClear => {
                self.on_alarm_clear();
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                if self.is_master {
                    self.link.broadcast(cmd.command);
                }
                Ok(self.state)
            }
            Err(reason) => {
                warn!(
                    station = %self.station_id,
                    command = %cmd.command,
                    state = %self.state,
                    reason,
                    "command rejected"
                );
                Err(SequencerError::Precondition {
                    state: self.state,
                    command: cmd.command,
                    reason,
                })
            }
        }
    }

    fn on_start(&mut self) -> Result<(), &'static str> {
        match self.state {
            StationState::Ready | StationState::Stopped | StationState::Standby => {}
            StationState::Running => return Err("run already active"),
            _ => return Err("station not ready"),
        }
        if !self.all_axes_ready() {
            return Err("not every axis is ready");
        }
        if self.state != StationState::Standby {
            self.transition(StationState::Standby);
            self.notify(VideoCue::Standby);
        }
        self.begin_run();
        Ok(())
    }

    fn on_standby(&mut self) -> Result<(), &'static str> {
        match self.state {
            StationState::Ready | StationState::Stopped => {}
            StationState::Standby => return Err("already in standby"),
            _ => return Err("station not ready"),
        }
        if !self.all_axes_ready() {
            return Err("not every axis is ready");
        }
        self.transition(StationState::Standby);
        self.notify(VideoCue::Standby);
        Ok(())
    }

    fn on_stop(&mut self) {
        let faults = self.stop_axes(None);
        self.cues.pause();
        self.pending.clear();
        self.transition(StationState::Stopped);
        self.notify(VideoCue::Stop);
        for alarm in faults {
            self.record_alarm(alarm);
        }
    }

    fn on_reset(&mut self) {
        self.cues.reset();
        self.pending.clear();
        self.transition(StationState::Homing);
        self.notify(VideoCue::Reset);

        let mut faults = Vec::new();
        for axis in self.axes.iter_mut() {
            if axis.state() == MotorState::Error {
                warn!(axis = %axis.name(), "axis in error, waiting for alarm clear");
                continue;
            }
            if let Err(MotorError::Bus { .. }) = axis.home() {
                faults.extend(axis.last_alarm().cloned());
            }
        }
        for alarm in faults {
            self.on_alarm(alarm);
        }

        // Homing can never complete while an axis holds an alarm.
        let faulted = self
            .axes
            .iter()
            .filter(|a| a.state() == MotorState::Error)
            .count();
        if faulted > 0 && self.state != StationState::Stopped {
            warn!(
                station = %self.station_id,
                faulted,
                "reset left axes in error, alarm clear required"
            );
            self.transition(StationState::Stopped);
            self.notify(VideoCue::Error);
        }
    }

    fn on_alarm_clear(&mut self) {
        let mut cleared = 0usize;
        for axis in self.axes.iter_mut() {
            if axis.state() == MotorState::Error && axis.clear_alarm().is_ok() {
                cleared += 1;
            }
        }
        if cleared == 0 {
            info!(station = %self.station_id, "no axis alarm to clear");
            return;
        }

        self.cues.reset();
        self.pending.clear();
        self.transition(StationState::Homing);

        // Axes stopped mid-homing lost their reference too.
        let mut faults = Vec::new();
        for axis in self.axes.iter_mut() {
            if axis.state() == MotorState::Disconnected {
                if let Err(MotorError::Bus { .. }) = axis.home() {
                    faults.extend(axis.last_alarm().cloned());
                }
            }
        }
        for alarm in faults {
            self.on_alarm(alarm);
        }
    }

    fn begin_run(&mut self) {
        self.run_count += 1;
        self.pending.clear();
        self.cues.start_run();
        self.transition(StationState::Running);
        info!(
            station = %self.station_id,
            run = self.run_count,
            cues = self.cues.cues().len(),
            scheduled = self.cues.scheduled_axes().len(),
            "run started"
        );

        if self.cues.is_empty() {
            // No cue table: every axis runs operation 0.
            let mut faults = Vec::new();
            for axis in self.axes.iter_mut() {
                match axis.start_operation(0) {
                    Ok(()) => {
                        self.pending.insert(axis.id());
                    }
                    Err(MotorError::Bus { .. }) => faults.extend(axis.last_alarm().cloned()),
                    Err(MotorError::Precondition { .. }) => {}
                }
            }
            for alarm in faults {
                self.on_alarm(alarm);
            }
        } else {
            self.fire_due_cues();
        }
    }

    fn fire_due_cues(&mut self) {
        for cue in self.cues.due() {
            let Some(axis) = self.axes.get_mut(cue.axis.index()) else {
                warn!(axis = %cue.axis, "cue targets unknown axis");
                continue;
            };
            info!(
                axis = %axis.name(),
                action = ?cue.action,
                at_ms = cue.trigger.as_millis() as u64,
                "cue fired"
            );
            let result = match cue.action {
                CueAction::SelectAndStart(op) => axis.start_operation(op).map(|()| {
                    self.pending.insert(cue.axis);
                }),
                CueAction::Stop => {
                    self.pending.remove(&cue.axis);
                    axis.stop()
                }
                CueAction::Home => {
                    self.pending.remove(&cue.axis);
                    axis.home()
                }
            };
            if let Err(MotorError::Bus { .. }) = result {
                let alarm = axis.last_alarm().cloned();
                if let Some(alarm) = alarm {
                    self.on_alarm(alarm);
                }
                if self.state != StationState::Running {
                    break;
                }
            }
        }
    }

    fn finish_run(&mut self) {
        self.transition(StationState::Finished);
        self.notify(VideoCue::Finished);
        self.cues.pause();
        info!(
            station = %self.station_id,
            run = self.run_count,
            elapsed_ms = self.cues.elapsed().as_millis() as u64,
            "run finished"
        );
        if self.all_axes_ready() {
            self.transition(StationState::Ready);
        } else {
            self.transition(StationState::Homing);
        }
    }

    // ─── Faults ─────────────────────────────────────────────────────

    fn record_alarm(&mut self, alarm: AlarmEvent) {
        if self.alarms.is_full() {
            self.alarms.pop_front();
        }
        // Room was just made.
        let _ = self.alarms.push_back(alarm);
    }

    /// STOP every moving axis except `skip`. Returns alarms raised by
    /// failed writes.
    fn stop_axes(&mut self, skip: Option<AxisId>) -> Vec<AlarmEvent> {
        let mut faults = Vec::new();
        for axis in self.axes.iter_mut() {
            if Some(axis.id()) == skip || !axis.state().is_polled() {
                continue;
            }
            if let Err(MotorError::Bus { .. }) = axis.stop() {
                faults.extend(axis.last_alarm().cloned());
            }
        }
        faults
    }

    /// Fail-stop: one faulted axis stops the whole station.
    fn on_alarm(&mut self, alarm: AlarmEvent) {
        let axis = alarm.axis;
        self.record_alarm(alarm);
        if self.state == StationState::Stopped {
            return;
        }
        let faults = self.stop_axes(Some(axis));
        self.cues.pause();
        self.pending.clear();
        self.transition(StationState::Stopped);
        self.notify(VideoCue::Error);
        for alarm in faults {
            self.record_alarm(alarm);
        }
    }

    // ─── Tick ───────────────────────────────────────────────────────

    /// One scheduler step: poll axes, fire due cues, then evaluate the
    /// Finished and Ready joins.
    pub fn tick(&mut self, dt: Duration) {
        let mut alarms = Vec::new();
        for axis in self.axes.iter_mut() {
            match axis.poll() {
                Some(MotorEvent::Finished(id)) => {
                    self.pending.remove(&id);
                }
                Some(MotorEvent::Alarm(alarm)) => alarms.push(alarm),
                Some(MotorEvent::Ready(_)) | None => {}
            }
        }
        for alarm in alarms {
            self.on_alarm(alarm);
        }

        if self.state == StationState::Running {
            self.cues.advance(dt);
            self.fire_due_cues();
        }

        if self.state == StationState::Running && self.cues.all_fired() && self.pending.is_empty() {
            self.finish_run();
        }

        if self.state == StationState::Homing && self.all_axes_ready() {
            self.transition(StationState::Ready);
            self.notify(VideoCue::Ready);
        }
    }

    /// Best-effort STOP on every axis (shutdown).
    pub fn halt_all(&mut self) {
        for axis in self.axes.iter_mut() {
            axis.halt();
        }
    }
}
