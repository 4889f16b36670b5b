//! Stop pre-empts the loop's poll wait.

use super::{TWO_AXES, parse};
use station_common::command::{Command, StationCommand};
use station_common::link::NullLink;
use station_control_unit::{EventQueue, StationRunner, build_sequencer};
use station_hal::{DriverSignal, SharedBus, SimProfile, SimulatedBus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const INTERVAL: Duration = Duration::from_millis(400);

#[test]
fn stop_is_applied_without_waiting_for_next_tick() {
    let config = parse(TWO_AXES);
    let (sim, handle) = SimulatedBus::new(
        &[1, 2],
        SimProfile {
            homing_polls: 0,
            motion_polls: 1_000,
        },
    );
    let seq = build_sequencer(&config, &SharedBus::new(sim), Box::new(NullLink)).unwrap();
    let queue = Arc::new(EventQueue::new());
    let running = Arc::new(AtomicBool::new(true));

    let worker = {
        let queue = Arc::clone(&queue);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut runner = StationRunner::new(seq, queue, INTERVAL);
            runner.run(&running);
            runner.stats().preemptions
        })
    };

    // Ready after the first cycle; Start is picked up on a later one.
    thread::sleep(INTERVAL / 2);
    queue.push(StationCommand::local(Command::Start)).unwrap();
    let start = DriverSignal::Start.bits().bits();
    let deadline = Instant::now() + INTERVAL * 4;
    while !handle.signal_log(1).contains(&start) {
        assert!(Instant::now() < deadline, "start never issued");
        thread::sleep(Duration::from_millis(5));
    }

    let stop = DriverSignal::Stop.bits().bits();
    let pushed = Instant::now();
    queue.push(StationCommand::local(Command::Stop)).unwrap();
    while !handle.signal_log(1).contains(&stop) {
        assert!(pushed.elapsed() < INTERVAL, "stop waited for the tick");
        thread::sleep(Duration::from_millis(1));
    }
    assert!(pushed.elapsed() < INTERVAL / 2);

    running.store(false, Ordering::SeqCst);
    let preemptions = worker.join().unwrap();
    assert!(preemptions >= 1);
}
