//! Sequencer tick benchmark over simulated drivers.
//!
//! Measures one station tick (poll every axis, evaluate cues, joins) for
//! stations of 1 to `MAX_AXES` axes while every axis is running.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use station_common::command::{Command, StationCommand};
use station_common::consts::MAX_AXES;
use station_common::cue::AxisId;
use station_common::link::NullLink;
use station_control_unit::{ControllerSettings, MotorController, StationSequencer};
use station_hal::{MotorDriver, SharedBus, SimProfile, SimulatedBus};

fn running_station(axes: usize) -> StationSequencer {
    let slaves: Vec<u8> = (1..=axes as u8).collect();
    let (sim, _h) = SimulatedBus::new(
        &slaves,
        SimProfile {
            homing_polls: 0,
            motion_polls: u32::MAX,
        },
    );
    let bus = SharedBus::new(sim);
    let controllers = slaves
        .iter()
        .enumerate()
        .map(|(i, &slave)| {
            MotorController::new(
                AxisId(i as u8),
                &format!("axis{slave}"),
                MotorDriver::new(bus.clone(), slave),
                ControllerSettings::default(),
            )
        })
        .collect();
    let mut seq =
        StationSequencer::new("bench", false, controllers, Vec::new(), Box::new(NullLink))
            .unwrap_or_else(|e| panic!("{e}"));
    seq.boot();
    seq.tick(Duration::from_millis(100));
    let _ = seq.apply(StationCommand::local(Command::Start));
    seq
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("station_tick");
    for axes in [1usize, 2, 4, MAX_AXES] {
        let mut seq = running_station(axes);
        group.bench_with_input(BenchmarkId::from_parameter(axes), &axes, |b, _| {
            b.iter(|| seq.tick(black_box(Duration::from_millis(100))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
