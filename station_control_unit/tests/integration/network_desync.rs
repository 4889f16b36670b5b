//! Master relay over a lossy link: peers may miss a command and recover
//! when the operator re-issues.

use super::{DT, Recorder, TWO_AXES, parse, rig_for};
use station_common::command::{Command, StationCommand};
use station_common::link::{StationLink, VideoCue};
use station_common::state::StationState;
use station_control_unit::{EventQueue, StationRunner, build_sequencer};
use station_hal::{SharedBus, SimProfile, SimulatedBus};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Delivers broadcasts into peer queues, losing the next `drop` packets.
struct LossyFanout {
    peers: Vec<Arc<EventQueue>>,
    drop: Arc<AtomicUsize>,
    local: Recorder,
}

impl StationLink for LossyFanout {
    fn notify_video(&mut self, cue: VideoCue) {
        self.local.notify_video(cue);
    }

    fn broadcast(&mut self, command: Command) {
        self.local.broadcast(command);
        for peer in &self.peers {
            let lost = self
                .drop
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !lost {
                let _ = peer.push(StationCommand::remote(command));
            }
        }
    }
}

fn runner(toml_text: &str, link: Box<dyn StationLink>, queue: Arc<EventQueue>) -> StationRunner {
    let config = parse(toml_text);
    let slaves: Vec<u8> = config.axes.iter().map(|a| a.slave_id).collect();
    let (sim, _h) = SimulatedBus::new(
        &slaves,
        SimProfile {
            homing_polls: 1,
            motion_polls: 50,
        },
    );
    let seq = build_sequencer(&config, &SharedBus::new(sim), link).unwrap();
    StationRunner::new(seq, queue, DT)
}

fn master_config() -> String {
    TWO_AXES.replace("id = \"test\"", "id = \"master\"\n    role = \"master\"")
}

#[test]
fn dropped_start_leaves_peer_ready() {
    let peer_queue = Arc::new(EventQueue::new());
    let peer_video = Recorder::default();
    let mut peer = runner(TWO_AXES, Box::new(peer_video.clone()), Arc::clone(&peer_queue));

    let drop = Arc::new(AtomicUsize::new(0));
    let master_queue = Arc::new(EventQueue::new());
    let master_link = Recorder::default();
    let mut master = runner(
        &master_config(),
        Box::new(LossyFanout {
            peers: vec![Arc::clone(&peer_queue)],
            drop: Arc::clone(&drop),
            local: master_link.clone(),
        }),
        Arc::clone(&master_queue),
    );
    assert!(master.sequencer().is_master());

    master.boot();
    peer.boot();
    for _ in 0..3 {
        master.step(DT);
        peer.step(DT);
    }
    assert_eq!(master.sequencer().state(), StationState::Ready);
    assert_eq!(peer.sequencer().state(), StationState::Ready);

    // The Start packet is lost on the way to the peer.
    drop.store(1, Ordering::SeqCst);
    master_queue
        .push(StationCommand::local(Command::Start))
        .unwrap();
    for _ in 0..3 {
        master.step(DT);
        peer.step(DT);
    }
    assert_eq!(master.sequencer().state(), StationState::Running);
    assert_eq!(peer.sequencer().state(), StationState::Ready);
    assert_eq!(peer.sequencer().run_count(), 0);
    assert_eq!(master_link.broadcasts(), vec![Command::Start]);

    // Operator re-issues: Stop, then Start, both delivered.
    master_queue.push(StationCommand::local(Command::Stop)).unwrap();
    master.step(DT);
    peer.step(DT);
    assert_eq!(peer.sequencer().state(), StationState::Stopped);

    master_queue
        .push(StationCommand::local(Command::Start))
        .unwrap();
    master.step(DT);
    peer.step(DT);
    assert_eq!(master.sequencer().state(), StationState::Running);
    assert_eq!(peer.sequencer().state(), StationState::Running);
    assert_eq!(
        master_link.broadcasts(),
        vec![Command::Start, Command::Stop, Command::Start]
    );
    assert_eq!(
        peer_video.videos(),
        vec![
            VideoCue::Ready,
            VideoCue::Stop,
            VideoCue::Standby,
        ]
    );
}

#[test]
fn peer_does_not_relay_remote_commands() {
    let config = parse(TWO_AXES);
    let mut rig = rig_for(&config, SimProfile::default());
    rig.boot_ready();
    rig.seq
        .apply(StationCommand::remote(Command::Start))
        .unwrap();
    rig.seq.apply(StationCommand::remote(Command::Reset)).unwrap();
    assert!(rig.link.broadcasts().is_empty());
}
