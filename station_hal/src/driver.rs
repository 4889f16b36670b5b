//! Motor driver command surface.
//!
//! One [`MotorDriver`] per axis. Every call is exactly the bus transaction(s)
//! it names: nothing is retried and no bit is interpreted beyond
//! encode/decode. Policy lives in the controller.

use crate::bus::{BusError, SharedBus};
use crate::protocol::registers::{
    CommandBits, DriverSignal, OperationData, REG_INPUT_COMMAND, REG_NET_SELECTION,
    REG_OUTPUT_STATUS, REG_PRESENT_ALARM, StatusBits, combine_u32, operation_data_address,
    split_u32,
};
use tracing::debug;

/// Register-level access to one driver on a shared bus.
#[derive(Debug, Clone)]
pub struct MotorDriver {
    bus: SharedBus,
    slave_id: u8,
}

impl MotorDriver {
    pub fn new(bus: SharedBus, slave_id: u8) -> Self {
        Self { bus, slave_id }
    }

    #[inline]
    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    // ─── Status ─────────────────────────────────────────────────────

    /// Read the output status word.
    pub fn read_status(&self) -> Result<StatusBits, BusError> {
        let words = self.bus.read_registers(self.slave_id, REG_OUTPUT_STATUS, 1)?;
        Ok(StatusBits::from_bits_truncate(words[0]))
    }

    /// Read back the input command word.
    pub fn read_command(&self) -> Result<CommandBits, BusError> {
        let words = self.bus.read_registers(self.slave_id, REG_INPUT_COMMAND, 1)?;
        Ok(CommandBits::from_bits_truncate(words[0]))
    }

    /// Read the present alarm code (0 when no alarm is active).
    pub fn read_alarm_code(&self) -> Result<u32, BusError> {
        let words = self.bus.read_registers(self.slave_id, REG_PRESENT_ALARM, 2)?;
        Ok(combine_u32(words[0], words[1]))
    }

    // ─── Commands ───────────────────────────────────────────────────

    /// Write the input command word.
    pub fn write_command(&self, bits: CommandBits) -> Result<(), BusError> {
        self.bus
            .write_register(self.slave_id, REG_INPUT_COMMAND, bits.bits())
    }

    /// Write a single logical signal.
    pub fn send(&self, signal: DriverSignal) -> Result<(), BusError> {
        debug!(slave_id = self.slave_id, signal = signal.as_str(), "driver signal");
        self.write_command(signal.bits())
    }

    /// Select the operation data number run by the next START.
    pub fn select_operation(&self, op: u8) -> Result<(), BusError> {
        self.bus.write_registers(
            self.slave_id,
            REG_NET_SELECTION,
            &split_u32(op as u32),
        )
    }

    pub fn home(&self) -> Result<(), BusError> {
        self.send(DriverSignal::Home)
    }

    pub fn start(&self) -> Result<(), BusError> {
        self.send(DriverSignal::Start)
    }

    pub fn stop(&self) -> Result<(), BusError> {
        self.send(DriverSignal::Stop)
    }

    /// Release every input (all-off command word).
    pub fn release(&self) -> Result<(), BusError> {
        self.send(DriverSignal::Off)
    }

    /// Pulse ALM-RST: set, then release.
    pub fn clear_alarm(&self) -> Result<(), BusError> {
        self.send(DriverSignal::AlarmReset)?;
        self.release()
    }

    /// Enable or disable free mode (motor de-energized).
    pub fn set_free(&self, enable: bool) -> Result<(), BusError> {
        self.send(if enable {
            DriverSignal::Free
        } else {
            DriverSignal::Off
        })
    }

    /// Program operation data block `op`.
    pub fn write_operation_data(&self, op: u8, data: &OperationData) -> Result<(), BusError> {
        self.select_operation(op)?;
        self.bus.write_registers(
            self.slave_id,
            operation_data_address(op),
            &data.to_registers(),
        )
    }
}
