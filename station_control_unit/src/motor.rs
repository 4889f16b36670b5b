//! Per-axis motor state machine.
//!
//! | From | Event | To | Action |
//! |------|-------|----|--------|
//! | Disconnected | `initialize()` | Homing | HOME |
//! | Homing | poll: HOME-END | Ready | release inputs, `Ready` event |
//! | Ready | `start_operation(n)` | Running | select `n`, START |
//! | Running | poll: motion done, IN-POS | Finished → Ready | release inputs, `Finished` event |
//! | Running | `stop()` | Ready (or Homing) | STOP |
//! | Homing | `stop()` | Disconnected | STOP (reference lost) |
//! | Error | `clear_alarm()` | Homing | ALM-RST, HOME |
//! | any | poll: ALARM / bus lost | Error | `Alarm` event |
//!
//! Completion is edge-driven: an operation finishes on the first poll that
//! shows MOVE off and IN-POS on after MOVE was seen. If the driver never
//! reports MOVE (very short moves), IN-POS alone is accepted once the start
//! grace period has elapsed.

use station_common::alarm::{
    ALARM_CODE_COMM_LOST, ALARM_CODE_COMMAND_FAILED, ALARM_CODE_UNKNOWN, AlarmEvent,
};
use station_common::config::BusConfig;
use station_common::cue::AxisId;
use station_common::state::MotorState;
use station_hal::{BusError, MotorDriver, StatusBits};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Edge-triggered controller output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotorEvent {
    /// Homing completed.
    Ready(AxisId),
    /// Operation completed.
    Finished(AxisId),
    /// Axis entered `Error`.
    Alarm(AlarmEvent),
}

/// Controller operation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MotorError {
    /// Requested in a state that does not accept it. No state change.
    #[error("{axis}: {action} rejected in state {state}")]
    Precondition {
        axis: AxisId,
        state: MotorState,
        action: &'static str,
    },

    /// Command write failed; the axis is now in `Error`.
    #[error("{axis}: bus error: {source}")]
    Bus {
        axis: AxisId,
        #[source]
        source: BusError,
    },
}

/// Polling policy shared by every controller on a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Consecutive failed status reads tolerated before `Error`.
    pub poll_retries: u8,
    /// Polls after START before IN-POS alone counts as completion.
    pub start_grace_polls: u32,
    /// Re-home after `stop()` interrupts an operation.
    pub rehome_after_stop: bool,
}

impl From<&BusConfig> for ControllerSettings {
    fn from(bus: &BusConfig) -> Self {
        Self {
            poll_retries: bus.poll_retries,
            start_grace_polls: bus.start_grace_polls,
            rehome_after_stop: bus.rehome_after_stop,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&BusConfig::default())
    }
}

/// State machine driving one axis.
#[derive(Debug)]
pub struct MotorController {
    id: AxisId,
    name: String,
    driver: MotorDriver,
    settings: ControllerSettings,
    state: MotorState,
    last_status: StatusBits,
    last_operation: Option<u8>,
    last_alarm: Option<AlarmEvent>,
    failed_polls: u8,
    polls_since_start: u32,
    motion_seen: bool,
}

impl MotorController {
    pub fn new(id: AxisId, name: &str, driver: MotorDriver, settings: ControllerSettings) -> Self {
        Self {
            id,
            name: name.to_string(),
            driver,
            settings,
            state: MotorState::Disconnected,
            last_status: StatusBits::empty(),
            last_operation: None,
            last_alarm: None,
            failed_polls: 0,
            polls_since_start: 0,
            motion_seen: false,
        }
    }

    #[inline]
    pub fn id(&self) -> AxisId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn slave_id(&self) -> u8 {
        self.driver.slave_id()
    }

    #[inline]
    pub fn state(&self) -> MotorState {
        self.state
    }

    /// Status word from the most recent successful poll.
    #[inline]
    pub fn last_status(&self) -> StatusBits {
        self.last_status
    }

    /// Operation number of the most recent start.
    #[inline]
    pub fn last_operation(&self) -> Option<u8> {
        self.last_operation
    }

    /// Alarm that put the axis into `Error`, if it is there.
    pub fn last_alarm(&self) -> Option<&AlarmEvent> {
        self.last_alarm.as_ref()
    }

    fn transition(&mut self, to: MotorState) {
        if self.state != to {
            info!(axis = %self.name, from = %self.state, to = %to, "axis transition");
            self.state = to;
        }
    }

    fn reject(&self, action: &'static str) -> MotorError {
        warn!(axis = %self.name, state = %self.state, action, "axis precondition violated");
        MotorError::Precondition {
            axis: self.id,
            state: self.state,
            action,
        }
    }

    /// Enter `Error`, emit the structured alarm record and return its event.
    fn fault(&mut self, code: u32) -> MotorEvent {
        let alarm = AlarmEvent::new(self.id, &self.name, self.driver.slave_id(), code);
        alarm.emit();
        self.transition(MotorState::Error);
        self.last_alarm = Some(alarm.clone());
        MotorEvent::Alarm(alarm)
    }

    /// Map a failed command write to `Error`.
    fn command_failed(&mut self, source: BusError) -> MotorError {
        warn!(axis = %self.name, error = %source, "command write failed");
        self.fault(ALARM_CODE_COMMAND_FAILED);
        MotorError::Bus {
            axis: self.id,
            source,
        }
    }

    fn begin_homing(&mut self) -> Result<(), MotorError> {
        if let Err(e) = self.driver.home() {
            return Err(self.command_failed(e));
        }
        self.failed_polls = 0;
        self.transition(MotorState::Homing);
        Ok(())
    }

    // ─── Commands ───────────────────────────────────────────────────

    /// Disconnected → Homing.
    pub fn initialize(&mut self) -> Result<(), MotorError> {
        if self.state != MotorState::Disconnected {
            return Err(self.reject("initialize"));
        }
        self.begin_homing()
    }

    /// Ready → Running: select operation `op` and send START.
    pub fn start_operation(&mut self, op: u8) -> Result<(), MotorError> {
        if self.state != MotorState::Ready {
            return Err(self.reject("start_operation"));
        }
        if let Err(e) = self.driver.select_operation(op) {
            return Err(self.command_failed(e));
        }
        if let Err(e) = self.driver.start() {
            return Err(self.command_failed(e));
        }
        self.last_operation = Some(op);
        self.polls_since_start = 0;
        self.motion_seen = false;
        self.failed_polls = 0;
        info!(axis = %self.name, op, "operation started");
        self.transition(MotorState::Running);
        Ok(())
    }

    /// Stop motion.
    ///
    /// Running → Ready (Homing when configured to re-home);
    /// Homing → Disconnected, since the reference was not established.
    pub fn stop(&mut self) -> Result<(), MotorError> {
        if !matches!(self.state, MotorState::Running | MotorState::Homing) {
            return Err(self.reject("stop"));
        }
        if let Err(e) = self.driver.stop() {
            return Err(self.command_failed(e));
        }
        match self.state {
            MotorState::Running if self.settings.rehome_after_stop => {
                if let Err(e) = self.driver.release() {
                    return Err(self.command_failed(e));
                }
                self.begin_homing()?;
            }
            MotorState::Running => self.transition(MotorState::Ready),
            _ => self.transition(MotorState::Disconnected),
        }
        Ok(())
    }

    /// Re-reference the axis from any state except `Error`.
    ///
    /// Motion in progress is stopped first.
    pub fn home(&mut self) -> Result<(), MotorError> {
        if self.state == MotorState::Error {
            return Err(self.reject("home"));
        }
        if self.state.is_polled() {
            if let Err(e) = self.driver.stop() {
                return Err(self.command_failed(e));
            }
        }
        if let Err(e) = self.driver.release() {
            return Err(self.command_failed(e));
        }
        self.begin_homing()
    }

    /// Error → Homing: pulse ALM-RST and re-home.
    pub fn clear_alarm(&mut self) -> Result<(), MotorError> {
        if self.state != MotorState::Error {
            return Err(self.reject("clear_alarm"));
        }
        if let Err(source) = self.driver.clear_alarm() {
            warn!(axis = %self.name, error = %source, "alarm clear failed");
            return Err(MotorError::Bus {
                axis: self.id,
                source,
            });
        }
        self.last_alarm = None;
        self.begin_homing()
    }

    /// Best-effort STOP for shutdown, regardless of state.
    pub fn halt(&mut self) {
        if let Err(e) = self.driver.stop() {
            warn!(axis = %self.name, error = %e, "halt failed");
        }
    }

    // ─── Polling ────────────────────────────────────────────────────

    /// Sample the driver once. Only `Homing` and `Running` are polled.
    pub fn poll(&mut self) -> Option<MotorEvent> {
        if !self.state.is_polled() {
            return None;
        }

        let status = match self.driver.read_status() {
            Ok(status) => status,
            Err(e) => {
                self.failed_polls = self.failed_polls.saturating_add(1);
                if self.failed_polls > self.settings.poll_retries {
                    warn!(axis = %self.name, error = %e, "status read retries exhausted");
                    return Some(self.fault(ALARM_CODE_COMM_LOST));
                }
                warn!(
                    axis = %self.name,
                    attempt = self.failed_polls,
                    retries = self.settings.poll_retries,
                    error = %e,
                    "status read failed"
                );
                return None;
            }
        };
        self.failed_polls = 0;

        if status != self.last_status {
            debug!(
                axis = %self.name,
                rose = ?(status - self.last_status),
                fell = ?(self.last_status - status),
                "status edges"
            );
        }
        self.last_status = status;

        if status.alarm() {
            let code = match self.driver.read_alarm_code() {
                Ok(0) | Err(_) => ALARM_CODE_UNKNOWN,
                Ok(code) => code,
            };
            return Some(self.fault(code));
        }

        match self.state {
            MotorState::Homing if status.home_end() => {
                if let Err(e) = self.driver.release() {
                    return Some(self.release_failed(e));
                }
                self.transition(MotorState::Ready);
                Some(MotorEvent::Ready(self.id))
            }
            MotorState::Running => {
                self.polls_since_start = self.polls_since_start.saturating_add(1);
                if status.moving() {
                    self.motion_seen = true;
                    return None;
                }
                let settled = status.in_position()
                    && (self.motion_seen
                        || self.polls_since_start > self.settings.start_grace_polls);
                if !settled {
                    return None;
                }
                if let Err(e) = self.driver.release() {
                    return Some(self.release_failed(e));
                }
                self.transition(MotorState::Finished);
                self.transition(MotorState::Ready);
                Some(MotorEvent::Finished(self.id))
            }
            _ => None,
        }
    }

    fn release_failed(&mut self, e: BusError) -> MotorEvent {
        warn!(axis = %self.name, error = %e, "input release failed");
        self.fault(ALARM_CODE_COMMAND_FAILED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_hal::protocol::registers::DriverSignal;
    use station_hal::{SharedBus, SimHandle, SimProfile, SimulatedBus};

    fn controller(profile: SimProfile) -> (MotorController, SimHandle) {
        let (sim, handle) = SimulatedBus::new(&[1], profile);
        let driver = MotorDriver::new(SharedBus::new(sim), 1);
        let settings = ControllerSettings {
            poll_retries: 2,
            start_grace_polls: 3,
            rehome_after_stop: false,
        };
        (MotorController::new(AxisId(0), "lift", driver, settings), handle)
    }

    fn homed(profile: SimProfile) -> (MotorController, SimHandle) {
        let (mut ctl, handle) = controller(profile);
        ctl.initialize().unwrap();
        while ctl.state() == MotorState::Homing {
            ctl.poll();
        }
        assert_eq!(ctl.state(), MotorState::Ready);
        (ctl, handle)
    }

    #[test]
    fn homing_reaches_ready_on_next_poll() {
        let (mut ctl, h) = controller(SimProfile {
            homing_polls: 0,
            motion_polls: 1,
        });
        ctl.initialize().unwrap();
        assert_eq!(ctl.state(), MotorState::Homing);
        assert_eq!(ctl.poll(), Some(MotorEvent::Ready(AxisId(0))));
        assert_eq!(ctl.state(), MotorState::Ready);
        // Ready is not polled: no second event.
        assert_eq!(ctl.poll(), None);
        let log = h.signal_log(1);
        assert_eq!(log, vec![DriverSignal::Home.bits().bits(), 0]);
    }

    #[test]
    fn start_only_from_ready() {
        let (mut ctl, _h) = controller(SimProfile::default());
        assert!(matches!(
            ctl.start_operation(0),
            Err(MotorError::Precondition {
                state: MotorState::Disconnected,
                ..
            })
        ));
        assert_eq!(ctl.state(), MotorState::Disconnected);

        ctl.initialize().unwrap();
        assert!(ctl.start_operation(0).is_err());
        assert_eq!(ctl.state(), MotorState::Homing);
    }

    #[test]
    fn operation_finishes_after_motion() {
        let (mut ctl, h) = homed(SimProfile {
            homing_polls: 0,
            motion_polls: 2,
        });
        ctl.start_operation(4).unwrap();
        assert_eq!(h.selected_operation(1), Some(4));
        assert_eq!(ctl.state(), MotorState::Running);

        assert_eq!(ctl.poll(), None);
        assert_eq!(ctl.poll(), None);
        assert_eq!(ctl.poll(), Some(MotorEvent::Finished(AxisId(0))));
        assert_eq!(ctl.state(), MotorState::Ready);
        assert_eq!(ctl.last_operation(), Some(4));
        assert_eq!(h.signal_log(1).last(), Some(&0));
    }

    #[test]
    fn stale_in_position_waits_for_grace_period() {
        let (mut ctl, _h) = homed(SimProfile {
            homing_polls: 0,
            motion_polls: 0,
        });
        ctl.start_operation(0).unwrap();
        // MOVE never observed: IN-POS is trusted only after 3 grace polls.
        assert_eq!(ctl.poll(), None);
        assert_eq!(ctl.poll(), None);
        assert_eq!(ctl.poll(), None);
        assert_eq!(ctl.poll(), Some(MotorEvent::Finished(AxisId(0))));
    }

    #[test]
    fn alarm_while_running_reports_code() {
        let (mut ctl, h) = homed(SimProfile {
            homing_polls: 0,
            motion_polls: 10,
        });
        ctl.start_operation(0).unwrap();
        ctl.poll();
        h.raise_alarm(1, 0x30);
        match ctl.poll() {
            Some(MotorEvent::Alarm(alarm)) => {
                assert_eq!(alarm.code, 0x30);
                assert_eq!(alarm.slave_id, 1);
            }
            other => panic!("expected alarm, got {other:?}"),
        }
        assert_eq!(ctl.state(), MotorState::Error);
        assert_eq!(ctl.last_alarm().map(|a| a.code), Some(0x30));
        assert_eq!(ctl.poll(), None);
    }

    #[test]
    fn unreadable_alarm_code_falls_back() {
        let (mut ctl, h) = homed(SimProfile::default());
        ctl.start_operation(0).unwrap();
        h.reject_register(1, station_hal::protocol::registers::REG_PRESENT_ALARM);
        h.raise_alarm(1, 0x30);
        match ctl.poll() {
            Some(MotorEvent::Alarm(alarm)) => assert_eq!(alarm.code, ALARM_CODE_UNKNOWN),
            other => panic!("expected alarm, got {other:?}"),
        }
    }

    #[test]
    fn bounded_retries_then_comm_lost() {
        let (mut ctl, h) = homed(SimProfile {
            homing_polls: 0,
            motion_polls: 10,
        });
        ctl.start_operation(0).unwrap();
        h.drop_responses(1, 3);
        // Two failures are tolerated.
        assert_eq!(ctl.poll(), None);
        assert_eq!(ctl.poll(), None);
        assert_eq!(ctl.state(), MotorState::Running);
        match ctl.poll() {
            Some(MotorEvent::Alarm(alarm)) => assert_eq!(alarm.code, ALARM_CODE_COMM_LOST),
            other => panic!("expected comm lost, got {other:?}"),
        }
        assert_eq!(ctl.state(), MotorState::Error);
    }

    #[test]
    fn transient_read_failure_resets_counter() {
        let (mut ctl, h) = homed(SimProfile {
            homing_polls: 0,
            motion_polls: 10,
        });
        ctl.start_operation(0).unwrap();
        for _ in 0..3 {
            h.drop_responses(1, 2);
            assert_eq!(ctl.poll(), None);
            assert_eq!(ctl.poll(), None);
            assert_eq!(ctl.poll(), None);
        }
        assert_eq!(ctl.state(), MotorState::Running);
    }

    #[test]
    fn stop_semantics() {
        let (mut ctl, _h) = homed(SimProfile {
            homing_polls: 5,
            motion_polls: 10,
        });
        assert!(ctl.stop().is_err());
        assert_eq!(ctl.state(), MotorState::Ready);

        ctl.start_operation(0).unwrap();
        ctl.stop().unwrap();
        assert_eq!(ctl.state(), MotorState::Ready);

        ctl.home().unwrap();
        assert_eq!(ctl.state(), MotorState::Homing);
        ctl.stop().unwrap();
        assert_eq!(ctl.state(), MotorState::Disconnected);
    }

    #[test]
    fn stop_with_rehome() {
        let (sim, _h) = SimulatedBus::new(&[1], SimProfile::default());
        let driver = MotorDriver::new(SharedBus::new(sim), 1);
        let settings = ControllerSettings {
            rehome_after_stop: true,
            ..ControllerSettings::default()
        };
        let mut ctl = MotorController::new(AxisId(0), "lift", driver, settings);
        ctl.initialize().unwrap();
        while ctl.state() == MotorState::Homing {
            ctl.poll();
        }
        ctl.start_operation(0).unwrap();
        ctl.stop().unwrap();
        assert_eq!(ctl.state(), MotorState::Homing);
    }

    #[test]
    fn clear_alarm_rehomes() {
        let (mut ctl, h) = homed(SimProfile {
            homing_polls: 0,
            motion_polls: 10,
        });
        assert!(ctl.clear_alarm().is_err());

        ctl.start_operation(0).unwrap();
        h.raise_alarm(1, 0x10);
        ctl.poll();
        assert_eq!(ctl.state(), MotorState::Error);
        assert!(ctl.home().is_err());

        ctl.clear_alarm().unwrap();
        assert_eq!(ctl.state(), MotorState::Homing);
        assert!(ctl.last_alarm().is_none());
        assert_eq!(ctl.poll(), Some(MotorEvent::Ready(AxisId(0))));
    }

    #[test]
    fn failed_command_write_faults_axis() {
        let (mut ctl, h) = homed(SimProfile::default());
        h.disconnect(1);
        assert!(matches!(
            ctl.start_operation(0),
            Err(MotorError::Bus { .. })
        ));
        assert_eq!(ctl.state(), MotorState::Error);
        assert_eq!(
            ctl.last_alarm().map(|a| a.code),
            Some(ALARM_CODE_COMMAND_FAILED)
        );
    }
}
