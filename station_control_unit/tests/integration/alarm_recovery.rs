//! Fail-stop on a drive alarm and recovery through AlarmClear.

use super::{TWO_AXES, rig};
use station_common::command::{Command, StationCommand};
use station_common::link::VideoCue;
use station_common::state::{MotorState, StationState};
use station_control_unit::SequencerError;
use station_hal::{DriverSignal, SimProfile};

const SLOW: SimProfile = SimProfile {
    homing_polls: 1,
    motion_polls: 30,
};

#[test]
fn alarm_while_running_stops_station_and_clear_rehomes() {
    let mut rig = rig(TWO_AXES, SLOW);
    rig.boot_ready();

    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();
    rig.ticks(2);
    assert!(
        rig.seq
            .axes()
            .iter()
            .all(|a| a.state() == MotorState::Running)
    );

    rig.sim.raise_alarm(1, 0x30);
    rig.ticks(1);

    assert_eq!(rig.seq.state(), StationState::Stopped);
    assert_eq!(rig.seq.axes()[0].state(), MotorState::Error);
    // The healthy axis was stopped, not left running.
    assert_eq!(rig.seq.axes()[1].state(), MotorState::Ready);
    assert_eq!(
        rig.sim.signal_log(2).last(),
        Some(&DriverSignal::Stop.bits().bits())
    );
    assert_eq!(rig.link.videos().last(), Some(&VideoCue::Error));

    let alarms: Vec<_> = rig.seq.alarm_history().cloned().collect();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].code, 0x30);
    assert_eq!(alarms[0].axis_name, "axis1");
    assert_eq!(alarms[0].slave_id, 1);

    // Nothing moves while stopped.
    rig.ticks(20);
    assert_eq!(rig.seq.state(), StationState::Stopped);
    assert_eq!(rig.seq.axes()[1].state(), MotorState::Ready);

    // Start is refused until the alarm is cleared.
    assert!(matches!(
        rig.seq.apply(StationCommand::local(Command::Start)),
        Err(SequencerError::Precondition {
            state: StationState::Stopped,
            ..
        })
    ));

    assert_eq!(
        rig.seq.apply(StationCommand::local(Command::AlarmClear)),
        Ok(StationState::Homing)
    );
    assert_eq!(rig.seq.axes()[0].state(), MotorState::Homing);
    assert!(
        rig.sim
            .signal_log(1)
            .contains(&DriverSignal::AlarmReset.bits().bits())
    );

    rig.ticks(3);
    assert_eq!(rig.seq.state(), StationState::Ready);
    assert_eq!(rig.link.videos().last(), Some(&VideoCue::Ready));
    assert!(rig.seq.axes().iter().all(|a| a.state() == MotorState::Ready));
}

#[test]
fn alarm_during_homing_blocks_ready() {
    let mut rig = rig(
        TWO_AXES,
        SimProfile {
            homing_polls: 5,
            motion_polls: 2,
        },
    );
    rig.seq.boot();
    rig.ticks(1);
    rig.sim.raise_alarm(2, 0x42);
    rig.ticks(1);

    assert_eq!(rig.seq.state(), StationState::Stopped);
    assert_eq!(rig.seq.axes()[1].state(), MotorState::Error);
    // Homing interrupted: the other axis lost its reference.
    assert_eq!(rig.seq.axes()[0].state(), MotorState::Disconnected);

    rig.seq.apply(StationCommand::local(Command::AlarmClear)).unwrap();
    assert!(
        rig.seq
            .axes()
            .iter()
            .all(|a| a.state() == MotorState::Homing)
    );
    rig.ticks(10);
    assert_eq!(rig.seq.state(), StationState::Ready);
}

#[test]
fn unknown_alarm_code_is_still_reported() {
    let mut rig = rig(TWO_AXES, SLOW);
    rig.boot_ready();
    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();
    rig.sim.reject_register(
        2,
        station_hal::protocol::registers::REG_PRESENT_ALARM,
    );
    rig.sim.raise_alarm(2, 0x30);
    rig.ticks(1);

    let last = rig.seq.alarm_history().last().cloned().unwrap();
    assert_eq!(last.code, station_common::alarm::ALARM_CODE_UNKNOWN);
    assert_eq!(rig.seq.state(), StationState::Stopped);
}
