//! Bus transport trait and the serialized shared bus.
//!
//! A station owns one physical RS-485 line. Every axis talks through the
//! same [`SharedBus`], which holds its lock for the whole request/response
//! exchange, so at most one transaction is ever outstanding on the line.

use crate::protocol::frame::{FrameError, Request, Response};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Bus transaction failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// No complete response within the bus timeout.
    #[error("slave {slave_id}: response timeout")]
    Timeout { slave_id: u8 },

    /// Response CRC did not match.
    #[error("CRC mismatch (expected {expected:#06x}, got {actual:#06x})")]
    Crc { expected: u16, actual: u16 },

    /// Response could not be parsed.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Slave answered with an exception code.
    #[error("slave {slave_id}: exception {code:#04x} on function {function:#04x}")]
    Exception { slave_id: u8, function: u8, code: u8 },

    /// A different slave answered.
    #[error("response from slave {actual}, expected {expected}")]
    SlaveMismatch { expected: u8, actual: u8 },

    /// Device-level I/O failure.
    #[error("bus I/O error: {0}")]
    Io(String),

    /// Setting or request not supported by this transport.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<FrameError> for BusError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Crc { expected, actual } => Self::Crc { expected, actual },
            other => Self::Malformed(other.to_string()),
        }
    }
}

/// Raw frame transport.
///
/// Implementations send one request frame and return one complete response
/// frame, or fail within their configured timeout. They never retry.
pub trait Bus: Send {
    /// Exchange one request for one response.
    fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, BusError>;

    /// Short transport description for logs (device path, "simulation").
    fn describe(&self) -> String;
}

/// Cloneable handle to one serialized bus.
#[derive(Clone)]
pub struct SharedBus {
    inner: Arc<Mutex<Box<dyn Bus>>>,
}

impl std::fmt::Debug for SharedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBus")
            .field("transport", &self.describe())
            .finish()
    }
}

impl SharedBus {
    pub fn new(bus: impl Bus + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(bus))),
        }
    }

    pub fn describe(&self) -> String {
        self.inner.lock().describe()
    }

    /// Run one request through the bus and validate the response header.
    pub fn execute(&self, request: &Request) -> Result<Response, BusError> {
        let frame = request.to_frame()?;
        let raw = {
            let mut bus = self.inner.lock();
            bus.transact(&frame)?
        };
        trace!(slave = request.slave(), tx = frame.len(), rx = raw.len(), "bus transaction");

        let response = Response::decode(&raw, request.function())?;
        if response.slave() != request.slave() {
            return Err(BusError::SlaveMismatch {
                expected: request.slave(),
                actual: response.slave(),
            });
        }
        if let Response::Exception {
            slave,
            function,
            code,
        } = response
        {
            return Err(BusError::Exception {
                slave_id: slave,
                function,
                code,
            });
        }
        Ok(response)
    }

    /// FC03: read `count` holding registers.
    pub fn read_registers(&self, slave: u8, address: u16, count: u16) -> Result<Vec<u16>, BusError> {
        match self.execute(&Request::ReadHolding {
            slave,
            address,
            count,
        })? {
            Response::Registers { values, .. } if values.len() == count as usize => Ok(values),
            Response::Registers { values, .. } => Err(BusError::Malformed(format!(
                "asked for {count} registers, got {}",
                values.len()
            ))),
            other => Err(BusError::Malformed(format!("unexpected response {other:?}"))),
        }
    }

    /// FC06: write one holding register.
    pub fn write_register(&self, slave: u8, address: u16, value: u16) -> Result<(), BusError> {
        match self.execute(&Request::WriteSingle {
            slave,
            address,
            value,
        })? {
            Response::WriteSingle {
                address: a,
                value: v,
                ..
            } if a == address && v == value => Ok(()),
            other => Err(BusError::Malformed(format!("bad write echo {other:?}"))),
        }
    }

    /// FC10: write consecutive holding registers.
    pub fn write_registers(&self, slave: u8, address: u16, values: &[u16]) -> Result<(), BusError> {
        match self.execute(&Request::WriteMultiple {
            slave,
            address,
            values: values.to_vec(),
        })? {
            Response::WriteMultiple {
                address: a, count, ..
            } if a == address && count as usize == values.len() => Ok(()),
            other => Err(BusError::Malformed(format!("bad write acknowledgement {other:?}"))),
        }
    }
}
