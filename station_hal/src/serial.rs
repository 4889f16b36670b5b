//! RS-485 serial transport (Linux tty, raw 8N1).
//!
//! The port is put in raw mode with `VMIN = VTIME = 0`; the response timeout
//! is enforced with `poll(2)` against a deadline covering the whole frame.

use crate::bus::{Bus, BusError};
use crate::protocol::frame::{MAX_FRAME_LEN, expected_response_len};
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, poll};
use nix::sys::termios::{
    self, BaudRate, ControlFlags, FlushArg, SetArg, SpecialCharacterIndices,
};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Serial port bus.
pub struct SerialBus {
    file: File,
    path: PathBuf,
    baud_rate: u32,
    timeout: Duration,
}

fn baud_rate(rate: u32) -> Result<BaudRate, BusError> {
    Ok(match rate {
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        460800 => BaudRate::B460800,
        921600 => BaudRate::B921600,
        other => {
            return Err(BusError::Unsupported(format!("baud rate {other}")));
        }
    })
}

fn io_err(path: &Path, err: impl std::fmt::Display) -> BusError {
    BusError::Io(format!("{}: {err}", path.display()))
}

impl SerialBus {
    /// Open and configure `path` for 8N1 at `baud_rate`.
    pub fn open(path: &Path, baud_rate_hz: u32, timeout: Duration) -> Result<Self, BusError> {
        let speed = baud_rate(baud_rate_hz)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NOCTTY.bits())
            .open(path)
            .map_err(|e| io_err(path, e))?;

        let mut tio = termios::tcgetattr(file.as_fd()).map_err(|e| io_err(path, e))?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, speed).map_err(|e| io_err(path, e))?;
        tio.control_flags &= !(ControlFlags::PARENB | ControlFlags::CSTOPB | ControlFlags::CSIZE);
        tio.control_flags |= ControlFlags::CS8 | ControlFlags::CLOCAL | ControlFlags::CREAD;
        tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(file.as_fd(), SetArg::TCSANOW, &tio).map_err(|e| io_err(path, e))?;
        termios::tcflush(file.as_fd(), FlushArg::TCIOFLUSH).map_err(|e| io_err(path, e))?;

        info!(port = %path.display(), baud = baud_rate_hz, timeout_ms = timeout.as_millis() as u64, "serial bus opened");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            baud_rate: baud_rate_hz,
            timeout,
        })
    }

    /// Wait for readability until `deadline`. Returns false on timeout.
    fn wait_readable(&self, deadline: Instant) -> Result<bool, BusError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        let wait_ms = remaining.as_millis().clamp(1, u16::MAX as u128) as u16;
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        let ready = poll(&mut fds, wait_ms).map_err(|e| io_err(&self.path, e))?;
        Ok(ready > 0)
    }
}

impl Bus for SerialBus {
    fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, BusError> {
        let slave_id = request.first().copied().unwrap_or_default();

        // Drop anything left over from an earlier timed-out exchange.
        termios::tcflush(self.file.as_fd(), FlushArg::TCIFLUSH)
            .map_err(|e| io_err(&self.path, e))?;
        self.file
            .write_all(request)
            .map_err(|e| io_err(&self.path, e))?;
        termios::tcdrain(self.file.as_fd()).map_err(|e| io_err(&self.path, e))?;

        let deadline = Instant::now() + self.timeout;
        let mut response = Vec::with_capacity(MAX_FRAME_LEN);
        let mut chunk = [0u8; MAX_FRAME_LEN];
        loop {
            if let Some(total) = expected_response_len(&response) {
                if response.len() >= total {
                    response.truncate(total);
                    return Ok(response);
                }
            }
            if !self.wait_readable(deadline)? {
                debug!(slave_id, received = response.len(), "serial response timeout");
                return Err(BusError::Timeout { slave_id });
            }
            let n = self
                .file
                .read(&mut chunk)
                .map_err(|e| io_err(&self.path, e))?;
            if response.len() + n > MAX_FRAME_LEN {
                return Err(BusError::Malformed(format!(
                    "response exceeds {MAX_FRAME_LEN} bytes"
                )));
            }
            response.extend_from_slice(&chunk[..n]);
        }
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.path.display(), self.baud_rate)
    }
}
