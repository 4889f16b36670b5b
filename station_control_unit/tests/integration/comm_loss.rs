//! Bounded poll retries and the communication-lost alarm.

use super::{TWO_AXES, rig};
use station_common::alarm::{ALARM_CODE_COMM_LOST, ALARM_CODE_COMMAND_FAILED};
use station_common::command::{Command, StationCommand};
use station_common::link::VideoCue;
use station_common::state::{MotorState, StationState};
use station_hal::SimProfile;

const SLOW: SimProfile = SimProfile {
    homing_polls: 1,
    motion_polls: 30,
};

#[test]
fn retries_absorb_transient_loss() {
    let mut rig = rig(TWO_AXES, SLOW);
    rig.boot_ready();
    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();

    // poll_retries = 2: one dropped and one corrupted reply are tolerated.
    rig.sim.drop_responses(1, 1);
    rig.sim.corrupt_responses(1, 1);
    rig.ticks(3);

    assert_eq!(rig.seq.state(), StationState::Running);
    assert_eq!(rig.seq.axes()[0].state(), MotorState::Running);
    assert_eq!(rig.seq.alarm_history().count(), 0);
}

#[test]
fn exhausted_retries_fault_the_station() {
    let mut rig = rig(TWO_AXES, SLOW);
    rig.boot_ready();
    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();

    rig.sim.drop_responses(2, 3);
    rig.ticks(2);
    assert_eq!(rig.seq.state(), StationState::Running);
    rig.ticks(1);

    assert_eq!(rig.seq.state(), StationState::Stopped);
    assert_eq!(rig.seq.axes()[1].state(), MotorState::Error);
    let alarm = rig.seq.alarm_history().last().cloned().unwrap();
    assert_eq!(alarm.code, ALARM_CODE_COMM_LOST);
    assert!(alarm.is_communication_fault());
    assert_eq!(rig.link.videos().last(), Some(&VideoCue::Error));
}

#[test]
fn vanished_driver_faults_on_start() {
    let mut rig = rig(TWO_AXES, SLOW);
    rig.boot_ready();
    rig.sim.disconnect(2);

    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();
    assert_eq!(rig.seq.state(), StationState::Stopped);
    assert_eq!(rig.seq.axes()[0].state(), MotorState::Ready);
    assert_eq!(rig.seq.axes()[1].state(), MotorState::Error);
    assert_eq!(
        rig.seq.alarm_history().last().map(|a| a.code),
        Some(ALARM_CODE_COMMAND_FAILED)
    );

    // Still unreachable: the alarm cannot be cleared.
    rig.seq.apply(StationCommand::local(Command::AlarmClear)).unwrap();
    assert_eq!(rig.seq.state(), StationState::Stopped);
    assert_eq!(rig.seq.axes()[1].state(), MotorState::Error);
}
