//! Simulated CVD drivers behind a frame-level bus.
//!
//! `SimulatedBus` answers the same RTU frames a physical line would: each
//! request is decoded, applied to a software driver for its slave id and
//! answered with an encoded response. Motion advances one step per status
//! read, so tests are deterministic in "polls" rather than wall time.
//!
//! A [`SimHandle`] shares state with the bus for fault injection and
//! inspection from tests or the station binary's `--simulate` mode.

use crate::bus::{Bus, BusError};
use crate::protocol::frame::{
    EXC_ILLEGAL_ADDRESS, EXC_ILLEGAL_FUNCTION, FC_READ_HOLDING, FC_WRITE_MULTIPLE,
    FC_WRITE_SINGLE, FrameError, Request, Response,
};
use crate::protocol::registers::{
    CommandBits, REG_INPUT_COMMAND, REG_NET_SELECTION, REG_OUTPUT_STATUS,
    REG_OUTPUT_STATUS_HIGH, REG_PRESENT_ALARM, StatusBits, combine_u32, split_u32,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Motion timing of a simulated driver, in status reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimProfile {
    /// Status reads that still report homing after HOME (0: done on the next read).
    pub homing_polls: u32,
    /// Status reads that still report motion after START.
    pub motion_polls: u32,
}

impl Default for SimProfile {
    fn default() -> Self {
        Self {
            homing_polls: 2,
            motion_polls: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Idle,
    Homing { remaining: u32 },
    Moving { remaining: u32 },
}

/// One software driver.
#[derive(Debug, Clone)]
struct SimSlave {
    profile: SimProfile,
    status: StatusBits,
    activity: Activity,
    alarm_code: u32,
    registers: BTreeMap<u16, u16>,
    signal_log: Vec<u16>,
    rejected: HashSet<u16>,
    free: bool,
}

impl SimSlave {
    fn new(profile: SimProfile) -> Self {
        Self {
            profile,
            status: StatusBits::READY,
            activity: Activity::Idle,
            alarm_code: 0,
            registers: BTreeMap::new(),
            signal_log: Vec::new(),
            rejected: HashSet::new(),
            free: false,
        }
    }

    fn selected_operation(&self) -> u32 {
        let high = self.registers.get(&REG_NET_SELECTION).copied().unwrap_or(0);
        let low = self.registers.get(&(REG_NET_SELECTION + 1)).copied().unwrap_or(0);
        combine_u32(high, low)
    }

    fn raise_alarm(&mut self, code: u32) {
        self.alarm_code = code;
        self.activity = Activity::Idle;
        self.status.remove(StatusBits::MOVE | StatusBits::READY);
        self.status.insert(StatusBits::ALARM);
    }

    fn apply_command(&mut self, word: u16) {
        self.signal_log.push(word);
        let bits = CommandBits::from_bits_truncate(word);
        self.status.set(StatusBits::START_R, bits.contains(CommandBits::START));

        if bits.contains(CommandBits::ALARM_RESET) && self.status.alarm() {
            self.alarm_code = 0;
            self.status.remove(StatusBits::ALARM);
            self.status.insert(StatusBits::READY);
        }
        if self.status.alarm() {
            return;
        }
        if bits.contains(CommandBits::STOP) {
            self.activity = Activity::Idle;
            self.status.remove(StatusBits::MOVE);
            self.status.insert(StatusBits::READY);
        } else if bits.contains(CommandBits::HOME) && self.activity == Activity::Idle {
            self.activity = Activity::Homing {
                remaining: self.profile.homing_polls,
            };
            self.status
                .remove(StatusBits::HOME_END | StatusBits::IN_POS | StatusBits::READY);
            self.status.insert(StatusBits::MOVE);
        } else if bits.contains(CommandBits::START)
            && self.activity == Activity::Idle
            && self.status.ready()
        {
            self.activity = Activity::Moving {
                remaining: self.profile.motion_polls,
            };
            self.status.remove(StatusBits::IN_POS | StatusBits::READY);
            self.status.insert(StatusBits::MOVE);
        }
        self.free = bits.contains(CommandBits::FREE);
    }

    /// Advance one step and return the status word.
    fn poll_status(&mut self) -> StatusBits {
        match self.activity {
            Activity::Homing { remaining: 0 } => {
                self.activity = Activity::Idle;
                self.status.remove(StatusBits::MOVE);
                self.status
                    .insert(StatusBits::HOME_END | StatusBits::IN_POS | StatusBits::READY);
            }
            Activity::Homing { remaining } => {
                self.activity = Activity::Homing {
                    remaining: remaining - 1,
                };
            }
            Activity::Moving { remaining: 0 } => {
                self.activity = Activity::Idle;
                self.status.remove(StatusBits::MOVE);
                self.status.insert(StatusBits::IN_POS | StatusBits::READY);
            }
            Activity::Moving { remaining } => {
                self.activity = Activity::Moving {
                    remaining: remaining - 1,
                };
            }
            Activity::Idle => {}
        }
        self.status
    }

    fn read(&mut self, address: u16, count: u16) -> Result<Vec<u16>, u8> {
        let range = address..address.saturating_add(count);
        if range.clone().any(|a| self.rejected.contains(&a)) {
            return Err(EXC_ILLEGAL_ADDRESS);
        }
        let status = if range.contains(&REG_OUTPUT_STATUS) {
            self.poll_status()
        } else {
            self.status
        };
        let [alarm_high, alarm_low] = split_u32(self.alarm_code);
        Ok(range
            .map(|a| match a {
                REG_OUTPUT_STATUS_HIGH => 0,
                REG_OUTPUT_STATUS => status.bits(),
                REG_PRESENT_ALARM => alarm_high,
                a if a == REG_PRESENT_ALARM + 1 => alarm_low,
                a => self.registers.get(&a).copied().unwrap_or(0),
            })
            .collect())
    }

    fn write(&mut self, address: u16, values: &[u16]) -> Result<(), u8> {
        let end = address as u32 + values.len() as u32;
        if (address as u32..end).any(|a| self.rejected.contains(&(a as u16))) {
            return Err(EXC_ILLEGAL_ADDRESS);
        }
        for (offset, value) in values.iter().enumerate() {
            let a = address + offset as u16;
            self.registers.insert(a, *value);
            if a == REG_INPUT_COMMAND {
                self.apply_command(*value);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Drop,
    CorruptCrc,
}

#[derive(Debug, Default)]
struct SimState {
    slaves: BTreeMap<u8, SimSlave>,
    faults: BTreeMap<u8, Vec<Fault>>,
    transactions: u64,
}

/// Frame-level simulated bus.
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
}

/// Test/inspection handle sharing state with a [`SimulatedBus`].
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBus {
    /// Bus with one driver per slave id, all using `profile`.
    pub fn new(slave_ids: &[u8], profile: SimProfile) -> (Self, SimHandle) {
        let mut state = SimState::default();
        for &id in slave_ids {
            state.slaves.insert(id, SimSlave::new(profile));
        }
        let state = Arc::new(Mutex::new(state));
        (
            Self {
                state: Arc::clone(&state),
            },
            SimHandle { state },
        )
    }
}

impl Bus for SimulatedBus {
    fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, BusError> {
        let mut state = self.state.lock();
        state.transactions += 1;

        let slave_id = request.first().copied().unwrap_or_default();
        let decoded = match Request::decode(request) {
            Ok(decoded) => decoded,
            Err(FrameError::UnsupportedFunction(function)) => {
                let mut out = Vec::new();
                Response::Exception {
                    slave: slave_id,
                    function,
                    code: EXC_ILLEGAL_FUNCTION,
                }
                .encode(&mut out);
                return Ok(out);
            }
            // A real slave ignores frames it cannot parse.
            Err(_) => return Err(BusError::Timeout { slave_id }),
        };

        let fault = state
            .faults
            .get_mut(&slave_id)
            .and_then(|queue| (!queue.is_empty()).then(|| queue.remove(0)));
        if fault == Some(Fault::Drop) {
            debug!(slave_id, "simulated response dropped");
            return Err(BusError::Timeout { slave_id });
        }

        let Some(slave) = state.slaves.get_mut(&slave_id) else {
            return Err(BusError::Timeout { slave_id });
        };

        let response = match decoded {
            Request::ReadHolding { address, count, .. } => match slave.read(address, count) {
                Ok(values) => Response::Registers {
                    slave: slave_id,
                    values,
                },
                Err(code) => Response::Exception {
                    slave: slave_id,
                    function: FC_READ_HOLDING,
                    code,
                },
            },
            Request::WriteSingle { address, value, .. } => match slave.write(address, &[value]) {
                Ok(()) => Response::WriteSingle {
                    slave: slave_id,
                    address,
                    value,
                },
                Err(code) => Response::Exception {
                    slave: slave_id,
                    function: FC_WRITE_SINGLE,
                    code,
                },
            },
            Request::WriteMultiple {
                address, values, ..
            } => match slave.write(address, &values) {
                Ok(()) => Response::WriteMultiple {
                    slave: slave_id,
                    address,
                    count: values.len() as u16,
                },
                Err(code) => Response::Exception {
                    slave: slave_id,
                    function: FC_WRITE_MULTIPLE,
                    code,
                },
            },
        };

        let mut out = Vec::new();
        response.encode(&mut out);
        if fault == Some(Fault::CorruptCrc) {
            if let Some(last) = out.last_mut() {
                *last ^= 0xFF;
            }
        }
        Ok(out)
    }

    fn describe(&self) -> String {
        let state = self.state.lock();
        format!("simulation ({} slaves)", state.slaves.len())
    }
}

impl SimHandle {
    /// Latch an alarm on `slave` (motion stops, ALARM set).
    pub fn raise_alarm(&self, slave: u8, code: u32) {
        if let Some(s) = self.state.lock().slaves.get_mut(&slave) {
            s.raise_alarm(code);
        }
    }

    /// Drop the next `count` responses from `slave`.
    pub fn drop_responses(&self, slave: u8, count: usize) {
        let mut state = self.state.lock();
        let queue = state.faults.entry(slave).or_default();
        queue.extend(std::iter::repeat_n(Fault::Drop, count));
    }

    /// Corrupt the CRC of the next `count` responses from `slave`.
    pub fn corrupt_responses(&self, slave: u8, count: usize) {
        let mut state = self.state.lock();
        let queue = state.faults.entry(slave).or_default();
        queue.extend(std::iter::repeat_n(Fault::CorruptCrc, count));
    }

    /// Answer any access to `address` on `slave` with an illegal-address exception.
    pub fn reject_register(&self, slave: u8, address: u16) {
        if let Some(s) = self.state.lock().slaves.get_mut(&slave) {
            s.rejected.insert(address);
        }
    }

    /// Remove `slave` from the line (all requests time out).
    pub fn disconnect(&self, slave: u8) {
        self.state.lock().slaves.remove(&slave);
    }

    /// Change the motion timing of `slave`.
    pub fn set_profile(&self, slave: u8, profile: SimProfile) {
        if let Some(s) = self.state.lock().slaves.get_mut(&slave) {
            s.profile = profile;
        }
    }

    /// Current status word of `slave` without advancing motion.
    pub fn status(&self, slave: u8) -> Option<StatusBits> {
        self.state.lock().slaves.get(&slave).map(|s| s.status)
    }

    /// Whether `slave` is in free (AWO) mode.
    pub fn is_free(&self, slave: u8) -> bool {
        self.state
            .lock()
            .slaves
            .get(&slave)
            .is_some_and(|s| s.free)
    }

    /// Every word written to the input command register of `slave`.
    pub fn signal_log(&self, slave: u8) -> Vec<u16> {
        self.state
            .lock()
            .slaves
            .get(&slave)
            .map(|s| s.signal_log.clone())
            .unwrap_or_default()
    }

    /// Operation number last written to the selection register of `slave`.
    pub fn selected_operation(&self, slave: u8) -> Option<u32> {
        self.state.lock().slaves.get(&slave).map(SimSlave::selected_operation)
    }

    /// Raw holding register value.
    pub fn register(&self, slave: u8, address: u16) -> Option<u16> {
        self.state
            .lock()
            .slaves
            .get(&slave)
            .and_then(|s| s.registers.get(&address).copied())
    }

    /// Transactions seen so far (all slaves).
    pub fn transactions(&self) -> u64 {
        self.state.lock().transactions
    }
}
