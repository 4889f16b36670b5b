//! Shared rig for station scenarios.

mod alarm_recovery;
mod comm_loss;
mod cue_timing;
mod network_desync;
mod preemption;
mod startup;

use parking_lot::Mutex;
use station_common::command::Command;
use station_common::config::StationConfig;
use station_common::link::{StationLink, VideoCue};
use station_common::state::StationState;
use station_control_unit::{StationSequencer, build_sequencer};
use station_hal::protocol::frame::FC_WRITE_MULTIPLE;
use station_hal::{Bus, BusError, SharedBus, SimHandle, SimProfile, SimulatedBus};
use std::sync::Arc;
use std::time::Duration;

pub const DT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Video(VideoCue),
    Broadcast(Command),
}

/// Link that records everything it is asked to send.
#[derive(Clone, Default)]
pub struct Recorder(pub Arc<Mutex<Vec<Sent>>>);

impl Recorder {
    pub fn videos(&self) -> Vec<VideoCue> {
        self.0
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Video(cue) => Some(*cue),
                Sent::Broadcast(_) => None,
            })
            .collect()
    }

    pub fn broadcasts(&self) -> Vec<Command> {
        self.0
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Broadcast(cmd) => Some(*cmd),
                Sent::Video(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl StationLink for Recorder {
    fn notify_video(&mut self, cue: VideoCue) {
        self.0.lock().push(Sent::Video(cue));
    }

    fn broadcast(&mut self, command: Command) {
        self.0.lock().push(Sent::Broadcast(command));
    }
}

/// Bus wrapper logging `(slave, function)` of every request in line order.
pub struct Tap {
    inner: SimulatedBus,
    frames: Arc<Mutex<Vec<(u8, u8)>>>,
}

impl Bus for Tap {
    fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, BusError> {
        if let [slave, function, ..] = request {
            self.frames.lock().push((*slave, *function));
        }
        self.inner.transact(request)
    }

    fn describe(&self) -> String {
        format!("tap over {}", self.inner.describe())
    }
}

pub struct Rig {
    pub seq: StationSequencer,
    pub sim: SimHandle,
    pub link: Recorder,
    pub frames: Arc<Mutex<Vec<(u8, u8)>>>,
}

impl Rig {
    pub fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.seq.tick(DT);
        }
    }

    /// Slaves that received an operation-select write, in line order.
    pub fn selections(&self) -> Vec<u8> {
        self.frames
            .lock()
            .iter()
            .filter(|(_, function)| *function == FC_WRITE_MULTIPLE)
            .map(|(slave, _)| *slave)
            .collect()
    }

    pub fn clear_frames(&self) {
        self.frames.lock().clear();
    }

    /// Boot and tick until Ready, then forget what was sent so far.
    pub fn boot_ready(&mut self) {
        self.seq.boot();
        for _ in 0..50 {
            if self.seq.state() == StationState::Ready {
                break;
            }
            self.seq.tick(DT);
        }
        assert_eq!(self.seq.state(), StationState::Ready);
        self.link.clear();
        self.clear_frames();
    }
}

pub fn parse(toml_text: &str) -> StationConfig {
    let config: StationConfig = toml::from_str(toml_text).unwrap();
    config.validate().unwrap();
    config
}

pub fn rig_for(config: &StationConfig, profile: SimProfile) -> Rig {
    let slaves: Vec<u8> = config.axes.iter().map(|a| a.slave_id).collect();
    let (sim, handle) = SimulatedBus::new(&slaves, profile);
    let frames = Arc::new(Mutex::new(Vec::new()));
    let bus = SharedBus::new(Tap {
        inner: sim,
        frames: Arc::clone(&frames),
    });
    let link = Recorder::default();
    let seq = build_sequencer(config, &bus, Box::new(link.clone())).unwrap();
    Rig {
        seq,
        sim: handle,
        link,
        frames,
    }
}

pub fn rig(toml_text: &str, profile: SimProfile) -> Rig {
    rig_for(&parse(toml_text), profile)
}

/// Two axes on slaves 1 and 2, no cues.
pub const TWO_AXES: &str = r#"
    [shared]
    service_name = "station-test"

    [station]
    id = "test"

    [bus]
    poll_retries = 2
    start_grace_polls = 3

    [[axes]]
    name = "axis1"
    slave_id = 1

    [[axes]]
    name = "axis2"
    slave_id = 2
"#;
