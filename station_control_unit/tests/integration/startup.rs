//! Fleet configuration to a running station.

use super::{DT, Recorder};
use station_common::command::{Command, StationCommand};
use station_common::config::load_station_config;
use station_common::link::VideoCue;
use station_common::state::StationState;
use station_control_unit::build_sequencer;
use station_hal::{SharedBus, SimProfile, SimulatedBus};
use std::fs;
use tempfile::TempDir;

const DEFAULTS: &str = r#"
[shared]
service_name = "station"
log_level = "info"

[station]
id = "unset"

[bus]
poll_interval_ms = 100
poll_retries = 3

[network]
listen_port = 10000
send_port = 10001
"#;

const STATIONS: &str = r#"
[station4]
_note = "lift and turntable"

[station4.station]
name = "Station 4"
role = "master"

[[station4.axes]]
name = "lift"
slave_id = 1

[[station4.axes]]
name = "turntable"
slave_id = 2

[[station4.cues]]
at = 0.0
axis = "lift"
action = "start"
op = 2

[[station4.cues]]
at = 1.5
axis = "turntable"
action = "start"
op = 5
"#;

#[test]
fn fleet_config_drives_a_full_run() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("default.toml"), DEFAULTS).unwrap();
    fs::write(dir.path().join("stations.toml"), STATIONS).unwrap();

    let config = load_station_config(dir.path(), "station4").unwrap();
    assert_eq!(config.station.id, "station4");
    assert_eq!(config.bus.poll_interval(), DT);

    let (sim, handle) = SimulatedBus::new(&[1, 2], SimProfile::default());
    let link = Recorder::default();
    let mut seq = build_sequencer(&config, &SharedBus::new(sim), Box::new(link.clone())).unwrap();
    assert!(seq.is_master());

    seq.boot();
    for _ in 0..5 {
        seq.tick(DT);
    }
    assert_eq!(seq.state(), StationState::Ready);

    seq.apply(StationCommand::local(Command::Start)).unwrap();
    assert_eq!(handle.selected_operation(1), Some(2));
    for _ in 0..30 {
        seq.tick(DT);
    }
    assert_eq!(handle.selected_operation(2), Some(5));
    assert_eq!(seq.state(), StationState::Ready);
    assert_eq!(
        link.videos(),
        vec![VideoCue::Ready, VideoCue::Standby, VideoCue::Finished]
    );
    assert_eq!(link.broadcasts(), vec![Command::Start]);

    let snapshot = serde_json::to_value(seq.snapshot()).unwrap();
    assert_eq!(snapshot["state"], "ready");
    assert_eq!(snapshot["axes"][1]["name"], "turntable");
}
