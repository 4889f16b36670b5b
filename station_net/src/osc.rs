//! OSC 1.0 message codec.
//!
//! | Part | Encoding |
//! |------|----------|
//! | address | ASCII, NUL-terminated, padded to 4 bytes |
//! | type tags | `,` + one tag per argument, NUL-terminated, padded to 4 bytes |
//! | `i` | int32, big-endian |
//! | `f` | float32, big-endian |
//! | `s` | string, NUL-terminated, padded to 4 bytes |
//!
//! Bundles (`#bundle`) are not used between stations and are rejected.

use thiserror::Error;

/// Largest datagram the link sends or accepts.
pub const MAX_PACKET_LEN: usize = 1024;

const BUNDLE_TAG: &str = "#bundle";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OscError {
    #[error("packet truncated at byte {0}")]
    Truncated(usize),

    #[error("packet length {0} is not a multiple of 4")]
    Unaligned(usize),

    #[error("address must start with '/'")]
    BadAddress,

    #[error("string is not valid UTF-8")]
    Utf8,

    #[error("type tag string missing")]
    MissingTypeTags,

    #[error("unsupported type tag '{0}'")]
    UnsupportedTag(char),

    #[error("bundles are not supported")]
    Bundle,
}

/// One OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
}

impl OscArg {
    const fn tag(&self) -> u8 {
        match self {
            Self::Int(_) => b'i',
            Self::Float(_) => b'f',
            Self::Str(_) => b's',
        }
    }
}

/// An address and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

fn pad(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    pad(out);
}

/// Cursor over a 4-byte aligned packet.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn read_str(&mut self) -> Result<&'a str, OscError> {
        let rest = self.buf.get(self.pos..).ok_or(OscError::Truncated(self.pos))?;
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(OscError::Truncated(self.buf.len()))?;
        let s = std::str::from_utf8(&rest[..nul]).map_err(|_| OscError::Utf8)?;
        // String, its NUL and padding.
        let next = self.pos + (nul + 4) / 4 * 4;
        if next > self.buf.len() {
            return Err(OscError::Truncated(self.buf.len()));
        }
        self.pos = next;
        Ok(s)
    }

    fn read_word(&mut self) -> Result<[u8; 4], OscError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + 4)
            .ok_or(OscError::Truncated(self.pos))?;
        self.pos += 4;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

impl OscMessage {
    /// Message without arguments.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: OscArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        write_str(&mut out, &self.address);

        let tags: String = std::iter::once(',')
            .chain(self.args.iter().map(|a| a.tag() as char))
            .collect();
        write_str(&mut out, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Str(s) => write_str(&mut out, s),
            }
        }
        out
    }

    pub fn decode(packet: &[u8]) -> Result<Self, OscError> {
        if packet.len() % 4 != 0 {
            return Err(OscError::Unaligned(packet.len()));
        }
        let mut r = Reader { buf: packet, pos: 0 };

        let address = r.read_str()?;
        if address == BUNDLE_TAG {
            return Err(OscError::Bundle);
        }
        if !address.starts_with('/') {
            return Err(OscError::BadAddress);
        }

        // Very old senders omit the tag string entirely.
        if r.at_end() {
            return Ok(Self::new(address));
        }
        let tags = r.read_str()?;
        let Some(tags) = tags.strip_prefix(',') else {
            return Err(OscError::MissingTypeTags);
        };

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let arg = match tag {
                'i' => OscArg::Int(i32::from_be_bytes(r.read_word()?)),
                'f' => OscArg::Float(f32::from_be_bytes(r.read_word()?)),
                's' => OscArg::Str(r.read_str()?.to_string()),
                other => return Err(OscError::UnsupportedTag(other)),
            };
            args.push(arg);
        }
        Ok(Self {
            address: address.to_string(),
            args,
        })
    }
}
