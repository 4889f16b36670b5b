//! System-wide constants for the station workspace.
//!
//! Single source of truth for numeric limits and protocol defaults.
//! Imported by all crates.

use static_assertions::const_assert;

/// Maximum number of axes on one station bus.
pub const MAX_AXES: usize = 8;

/// Lowest valid Modbus slave id.
pub const MIN_SLAVE_ID: u8 = 1;

/// Highest valid Modbus slave id.
pub const MAX_SLAVE_ID: u8 = 247;

/// Highest operation number selectable on the driver.
pub const MAX_OPERATION_NO: u8 = 255;

/// Default controller poll / sequencer tick interval [ms].
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default per-transaction bus timeout [ms].
pub const DEFAULT_BUS_TIMEOUT_MS: u64 = 100;

/// Consecutive failed status reads tolerated before an axis is declared lost.
pub const DEFAULT_POLL_RETRIES: u8 = 3;

/// Polls to wait for motion to begin after START before trusting `IN-POS`.
pub const DEFAULT_START_GRACE_POLLS: u32 = 20;

/// Default serial baud rate of the CVD drivers.
pub const DEFAULT_BAUD_RATE: u32 = 230_400;

/// Default serial device.
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// Default inbound command port.
pub const DEFAULT_LISTEN_PORT: u16 = 10000;

/// Default port peers listen on for relayed commands.
pub const DEFAULT_SEND_PORT: u16 = 10001;

/// Default video player host.
pub const DEFAULT_VIDEO_HOST: &str = "127.0.0.1";

/// Default video player port.
pub const DEFAULT_VIDEO_PORT: u16 = 9000;

/// Capacity of the informational lane of the station event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 32;

/// Capacity of the safety-critical lane of the station event queue.
pub const URGENT_QUEUE_CAPACITY: usize = 8;

/// Number of recent alarms retained by a sequencer.
pub const ALARM_HISTORY_LEN: usize = 16;

/// Default configuration directory path.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/station";

const_assert!(MAX_AXES > 0 && MAX_AXES <= MAX_SLAVE_ID as usize);
const_assert!(URGENT_QUEUE_CAPACITY <= EVENT_QUEUE_CAPACITY);
const_assert!(DEFAULT_BUS_TIMEOUT_MS <= DEFAULT_POLL_INTERVAL_MS);
