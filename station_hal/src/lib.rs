//! Station HAL
//!
//! Everything between a motor controller and the RS-485 line:
//!
//! - [`protocol`] - RTU framing, CRC and the CVD register map
//! - [`bus`] - `Bus` transport trait and the serialized `SharedBus`
//! - [`serial`] - Linux tty transport
//! - [`simulation`] - Simulated drivers with fault injection
//! - [`driver`] - Per-axis `MotorDriver` command surface

pub mod bus;
pub mod driver;
pub mod protocol;
pub mod serial;
pub mod simulation;

pub use bus::{Bus, BusError, SharedBus};
pub use driver::MotorDriver;
pub use protocol::{CommandBits, DriverSignal, OperationData, StatusBits};
pub use serial::SerialBus;
pub use simulation::{SimHandle, SimProfile, SimulatedBus};
