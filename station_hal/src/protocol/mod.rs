//! Register protocol: RTU framing plus the driver register map.
//!
//! Stateless. Everything here is pure encode/decode.

pub mod frame;
pub mod registers;

pub use frame::{FrameError, Request, Response, crc16};
pub use registers::{CommandBits, DriverSignal, OperationData, OperationMode, StatusBits};
