//! Cue timing: tie order, one-shot firing, run completion.

use super::{TWO_AXES, rig};
use station_common::command::{Command, StationCommand};
use station_common::link::VideoCue;
use station_common::state::{MotorState, StationState};
use station_hal::SimProfile;

const PROFILE: SimProfile = SimProfile {
    homing_polls: 1,
    motion_polls: 3,
};

fn two_axis_show() -> String {
    format!(
        r#"{TWO_AXES}
        [[cues]]
        at = 2.0
        axis = "axis1"
        action = "start"
        op = 0

        [[cues]]
        at = 2.0
        axis = "axis2"
        action = "start"
        op = 0

        [[cues]]
        at = 8.0
        axis = "axis1"
        action = "start"
        op = 1
        "#
    )
}

#[test]
fn tied_cues_fire_in_insertion_order_within_one_tick() {
    let mut rig = rig(&two_axis_show(), PROFILE);
    rig.boot_ready();

    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();
    assert_eq!(rig.seq.state(), StationState::Running);

    // t = 1.9 s: nothing selected yet.
    rig.ticks(19);
    assert!(rig.selections().is_empty());

    // t = 2.0 s: both axes, axis1 first.
    rig.ticks(1);
    assert_eq!(rig.selections(), vec![1, 2]);
    assert_eq!(rig.sim.selected_operation(1), Some(0));
    assert_eq!(rig.sim.selected_operation(2), Some(0));
    assert!(
        rig.seq
            .axes()
            .iter()
            .all(|a| a.state() == MotorState::Running)
    );

    // Both finish, the run continues because the 8 s cue is pending.
    rig.ticks(10);
    assert!(rig.seq.axes().iter().all(|a| a.state() == MotorState::Ready));
    assert_eq!(rig.seq.state(), StationState::Running);

    // t = 8.0 s: only axis1, operation 1.
    rig.clear_frames();
    rig.ticks(49);
    assert!(rig.selections().is_empty());
    rig.ticks(1);
    assert_eq!(rig.selections(), vec![1]);
    assert_eq!(rig.sim.selected_operation(1), Some(1));
    assert_eq!(rig.seq.axes()[1].state(), MotorState::Ready);

    rig.ticks(10);
    assert_eq!(rig.seq.state(), StationState::Ready);
    assert_eq!(rig.link.videos(), vec![VideoCue::Standby, VideoCue::Finished]);
}

#[test]
fn cues_fire_once_per_run_and_rearm_on_next_start() {
    let mut rig = rig(&two_axis_show(), PROFILE);
    rig.boot_ready();

    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();
    rig.ticks(100);
    assert_eq!(rig.seq.state(), StationState::Ready);
    assert_eq!(rig.selections(), vec![1, 2, 1]);

    rig.clear_frames();
    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();
    rig.ticks(100);
    assert_eq!(rig.selections(), vec![1, 2, 1]);
    assert_eq!(rig.seq.run_count(), 2);
}

#[test]
fn unscheduled_axis_is_not_waited_for() {
    let show = format!(
        r#"{TWO_AXES}
        [[cues]]
        at = 0.5
        axis = "axis2"
        action = "start"
        op = 4
        "#
    );
    let mut rig = rig(&show, PROFILE);
    rig.boot_ready();

    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();
    rig.ticks(5);
    assert_eq!(rig.seq.pending().len(), 1);
    rig.ticks(5);
    assert_eq!(rig.seq.state(), StationState::Ready);
    assert_eq!(rig.selections(), vec![2]);
    assert_eq!(rig.seq.axes()[0].last_operation(), None);
}

#[test]
fn home_cue_leaves_station_homing_after_run() {
    let show = format!(
        r#"{TWO_AXES}
        [[cues]]
        at = 0.0
        axis = "axis1"
        action = "start"

        [[cues]]
        at = 1.0
        axis = "axis2"
        action = "home"
        "#
    );
    let mut rig = rig(
        &show,
        SimProfile {
            homing_polls: 20,
            motion_polls: 2,
        },
    );
    rig.boot_ready();

    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();
    // The t = 0 cue fires with the Start itself.
    assert_eq!(rig.seq.axes()[0].state(), MotorState::Running);

    rig.ticks(10);
    assert_eq!(rig.seq.axes()[1].state(), MotorState::Homing);
    rig.ticks(1);
    assert_eq!(rig.seq.state(), StationState::Homing);

    rig.ticks(25);
    assert_eq!(rig.seq.state(), StationState::Ready);
    assert_eq!(
        rig.link.videos(),
        vec![VideoCue::Standby, VideoCue::Finished, VideoCue::Ready]
    );
}

#[test]
fn zero_axis_station_finishes_on_first_tick() {
    let mut rig = rig(
        r#"
        [shared]
        service_name = "prologue"

        [station]
        id = "prologue"
        "#,
        PROFILE,
    );
    rig.seq.boot();
    assert_eq!(rig.seq.state(), StationState::Ready);

    rig.seq.apply(StationCommand::local(Command::Start)).unwrap();
    rig.ticks(1);
    assert_eq!(rig.seq.state(), StationState::Ready);
    assert_eq!(
        rig.link.videos(),
        vec![VideoCue::Ready, VideoCue::Standby, VideoCue::Finished]
    );
    assert!(rig.frames.lock().is_empty());
}
