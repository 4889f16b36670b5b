//! Modbus RTU framing.
//!
//! Frame layout (all multi-byte fields big-endian except the CRC):
//!
//! | Function | Request | Response |
//! |----------|---------|----------|
//! | `0x03` read holding | slave, fc, addr, count, crc | slave, fc, byte count, data…, crc |
//! | `0x06` write single | slave, fc, addr, value, crc | echo of the request |
//! | `0x10` write multiple | slave, fc, addr, count, byte count, data…, crc | slave, fc, addr, count, crc |
//! | exception | - | slave, fc \| `0x80`, code, crc |
//!
//! The CRC is CRC-16/MODBUS (reflected poly `0xA001`, init `0xFFFF`),
//! transmitted low byte first.

use thiserror::Error;

/// Read holding registers.
pub const FC_READ_HOLDING: u8 = 0x03;
/// Write single register.
pub const FC_WRITE_SINGLE: u8 = 0x06;
/// Write multiple registers.
pub const FC_WRITE_MULTIPLE: u8 = 0x10;
/// Set on the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Exception code: function not supported.
pub const EXC_ILLEGAL_FUNCTION: u8 = 0x01;
/// Exception code: register address not accepted.
pub const EXC_ILLEGAL_ADDRESS: u8 = 0x02;
/// Exception code: value out of range.
pub const EXC_ILLEGAL_VALUE: u8 = 0x03;

/// Maximum RTU frame length.
pub const MAX_FRAME_LEN: usize = 256;
/// Register limit of one FC03 read.
pub const MAX_READ_REGISTERS: u16 = 125;
/// Register limit of one FC10 write.
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Framing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short ({len} bytes)")]
    TooShort { len: usize },

    #[error("CRC mismatch (expected {expected:#06x}, got {actual:#06x})")]
    Crc { expected: u16, actual: u16 },

    #[error("unsupported function code {0:#04x}")]
    UnsupportedFunction(u8),

    #[error("unexpected function code (expected {expected:#04x}, got {actual:#04x})")]
    UnexpectedFunction { expected: u8, actual: u8 },

    #[error("length mismatch: {0}")]
    Length(String),

    #[error("register count {0} out of range")]
    RegisterCount(usize),
}

// ─── CRC ────────────────────────────────────────────────────────────

/// CRC-16/MODBUS over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn push_crc(out: &mut Vec<u8>, start: usize) {
    let crc = crc16(&out[start..]);
    out.push(crc as u8);
    out.push((crc >> 8) as u8);
}

/// Verify the trailing CRC and return the frame body without it.
pub fn check_crc(frame: &[u8]) -> Result<&[u8], FrameError> {
    if frame.len() < 4 {
        return Err(FrameError::TooShort { len: frame.len() });
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    let actual = u16::from_le_bytes([tail[0], tail[1]]);
    let expected = crc16(body);
    if actual != expected {
        return Err(FrameError::Crc { expected, actual });
    }
    Ok(body)
}

#[inline]
fn be16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

/// Total frame length implied by the bytes received so far.
///
/// Returns `None` until enough of the header has arrived to know.
pub fn expected_response_len(head: &[u8]) -> Option<usize> {
    if head.len() < 2 {
        return None;
    }
    let function = head[1];
    if function & EXCEPTION_FLAG != 0 {
        return Some(5);
    }
    match function {
        FC_READ_HOLDING => head.get(2).map(|&count| 5 + count as usize),
        FC_WRITE_SINGLE | FC_WRITE_MULTIPLE => Some(8),
        _ => Some(5),
    }
}

// ─── Requests ───────────────────────────────────────────────────────

/// Master → slave request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadHolding { slave: u8, address: u16, count: u16 },
    WriteSingle { slave: u8, address: u16, value: u16 },
    WriteMultiple { slave: u8, address: u16, values: Vec<u16> },
}

impl Request {
    #[inline]
    pub fn slave(&self) -> u8 {
        match self {
            Self::ReadHolding { slave, .. }
            | Self::WriteSingle { slave, .. }
            | Self::WriteMultiple { slave, .. } => *slave,
        }
    }

    #[inline]
    pub fn function(&self) -> u8 {
        match self {
            Self::ReadHolding { .. } => FC_READ_HOLDING,
            Self::WriteSingle { .. } => FC_WRITE_SINGLE,
            Self::WriteMultiple { .. } => FC_WRITE_MULTIPLE,
        }
    }

    /// Append the encoded frame (with CRC) to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), FrameError> {
        let start = out.len();
        out.push(self.slave());
        out.push(self.function());
        match self {
            Self::ReadHolding { address, count, .. } => {
                if *count == 0 || *count > MAX_READ_REGISTERS {
                    return Err(FrameError::RegisterCount(*count as usize));
                }
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(&count.to_be_bytes());
            }
            Self::WriteSingle { address, value, .. } => {
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(&value.to_be_bytes());
            }
            Self::WriteMultiple {
                address, values, ..
            } => {
                if values.is_empty() || values.len() > MAX_WRITE_REGISTERS as usize {
                    return Err(FrameError::RegisterCount(values.len()));
                }
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(&(values.len() as u16).to_be_bytes());
                out.push((values.len() * 2) as u8);
                for value in values {
                    out.extend_from_slice(&value.to_be_bytes());
                }
            }
        }
        push_crc(out, start);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_frame(&self) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::with_capacity(16);
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Parse a request frame (slave side).
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let body = check_crc(frame)?;
        if body.len() < 6 {
            return Err(FrameError::TooShort { len: frame.len() });
        }
        let slave = body[0];
        let address = be16(body, 2);
        match body[1] {
            FC_READ_HOLDING => Ok(Self::ReadHolding {
                slave,
                address,
                count: be16(body, 4),
            }),
            FC_WRITE_SINGLE => Ok(Self::WriteSingle {
                slave,
                address,
                value: be16(body, 4),
            }),
            FC_WRITE_MULTIPLE => {
                let count = be16(body, 4) as usize;
                let byte_count = *body
                    .get(6)
                    .ok_or(FrameError::TooShort { len: frame.len() })?
                    as usize;
                if byte_count != count * 2 || body.len() != 7 + byte_count {
                    return Err(FrameError::Length(format!(
                        "write of {count} registers carries {byte_count} data bytes"
                    )));
                }
                let values = body[7..]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(Self::WriteMultiple {
                    slave,
                    address,
                    values,
                })
            }
            other => Err(FrameError::UnsupportedFunction(other)),
        }
    }
}

// ─── Responses ──────────────────────────────────────────────────────

/// Slave → master response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Registers { slave: u8, values: Vec<u16> },
    WriteSingle { slave: u8, address: u16, value: u16 },
    WriteMultiple { slave: u8, address: u16, count: u16 },
    Exception { slave: u8, function: u8, code: u8 },
}

impl Response {
    #[inline]
    pub fn slave(&self) -> u8 {
        match self {
            Self::Registers { slave, .. }
            | Self::WriteSingle { slave, .. }
            | Self::WriteMultiple { slave, .. }
            | Self::Exception { slave, .. } => *slave,
        }
    }

    /// Append the encoded frame (with CRC) to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        match self {
            Self::Registers { slave, values } => {
                out.push(*slave);
                out.push(FC_READ_HOLDING);
                out.push((values.len() * 2) as u8);
                for value in values {
                    out.extend_from_slice(&value.to_be_bytes());
                }
            }
            Self::WriteSingle {
                slave,
                address,
                value,
            } => {
                out.push(*slave);
                out.push(FC_WRITE_SINGLE);
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(&value.to_be_bytes());
            }
            Self::WriteMultiple {
                slave,
                address,
                count,
            } => {
                out.push(*slave);
                out.push(FC_WRITE_MULTIPLE);
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(&count.to_be_bytes());
            }
            Self::Exception {
                slave,
                function,
                code,
            } => {
                out.push(*slave);
                out.push(function | EXCEPTION_FLAG);
                out.push(*code);
            }
        }
        push_crc(out, start);
    }

    /// Parse the response to a request with function code `expected_function`.
    pub fn decode(frame: &[u8], expected_function: u8) -> Result<Self, FrameError> {
        let body = check_crc(frame)?;
        if body.len() < 3 {
            return Err(FrameError::TooShort { len: frame.len() });
        }
        let slave = body[0];
        let function = body[1];

        if function == expected_function | EXCEPTION_FLAG {
            return Ok(Self::Exception {
                slave,
                function: expected_function,
                code: body[2],
            });
        }
        if function != expected_function {
            return Err(FrameError::UnexpectedFunction {
                expected: expected_function,
                actual: function,
            });
        }

        match function {
            FC_READ_HOLDING => {
                let byte_count = body[2] as usize;
                if body.len() != 3 + byte_count || byte_count % 2 != 0 {
                    return Err(FrameError::Length(format!(
                        "byte count {byte_count} with {} data bytes",
                        body.len() - 3
                    )));
                }
                let values = body[3..]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(Self::Registers { slave, values })
            }
            FC_WRITE_SINGLE | FC_WRITE_MULTIPLE => {
                if body.len() != 6 {
                    return Err(FrameError::Length(format!(
                        "write acknowledgement of {} bytes",
                        body.len()
                    )));
                }
                let address = be16(body, 2);
                let field = be16(body, 4);
                Ok(if function == FC_WRITE_SINGLE {
                    Self::WriteSingle {
                        slave,
                        address,
                        value: field,
                    }
                } else {
                    Self::WriteMultiple {
                        slave,
                        address,
                        count: field,
                    }
                })
            }
            other => Err(FrameError::UnsupportedFunction(other)),
        }
    }
}
