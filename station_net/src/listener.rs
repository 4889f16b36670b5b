//! Inbound command listener.
//!
//! A background thread reads OSC datagrams from the listen port, maps each
//! address to a [`StationCommand`] and hands it to a callback (normally a
//! push onto the station's event queue). Arguments are ignored, so `/start`
//! with or without an int payload is the same command. Unknown addresses
//! and undecodable packets are logged and dropped.

use crate::address::command_for;
use crate::error::NetError;
use crate::osc::{MAX_PACKET_LEN, OscMessage};
use station_common::command::StationCommand;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the receive loop checks for shutdown.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Decode one datagram into a command.
pub fn parse_packet(packet: &[u8]) -> Result<StationCommand, NetError> {
    let message = OscMessage::decode(packet)?;
    command_for(&message.address).ok_or(NetError::UnknownAddress(message.address))
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

pub struct CommandListener {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<()>>,
}

impl CommandListener {
    /// Bind `addr` and start the receive thread.
    pub fn spawn<F>(addr: SocketAddr, handler: F) -> Result<Self, NetError>
    where
        F: Fn(StationCommand) + Send + 'static,
    {
        let socket = UdpSocket::bind(addr).map_err(|source| NetError::Bind { addr, source })?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let local_addr = socket.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(Counters::default());
        let handle = {
            let running = Arc::clone(&running);
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name("osc-listener".to_string())
                .spawn(move || receive_loop(&socket, &running, &counters, handler))?
        };

        info!(addr = %local_addr, "command listener started");
        Ok(Self {
            local_addr,
            running,
            counters,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Commands passed to the handler so far.
    pub fn accepted_count(&self) -> u64 {
        self.counters.accepted.load(Ordering::Relaxed)
    }

    /// Datagrams dropped as malformed or unknown.
    pub fn rejected_count(&self) -> u64 {
        self.counters.rejected.load(Ordering::Relaxed)
    }

    /// Stop the receive thread and wait for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("command listener thread panicked");
            }
            info!(
                accepted = self.accepted_count(),
                rejected = self.rejected_count(),
                "command listener stopped"
            );
        }
    }
}

impl Drop for CommandListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop<F>(socket: &UdpSocket, running: &AtomicBool, counters: &Counters, handler: F)
where
    F: Fn(StationCommand),
{
    let mut buf = [0u8; MAX_PACKET_LEN];
    while running.load(Ordering::SeqCst) {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                warn!(error = %e, "receive failed");
                continue;
            }
        };

        match parse_packet(&buf[..len]) {
            Ok(cmd) => {
                counters.accepted.fetch_add(1, Ordering::Relaxed);
                debug!(%from, command = %cmd.command, origin = ?cmd.origin, "received");
                handler(cmd);
            }
            Err(e) => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%from, len, error = %e, "ignoring datagram");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc::OscArg;
    use station_common::command::{Command, CommandOrigin};

    #[test]
    fn parses_known_addresses() {
        let packet = OscMessage::new("/stop").encode();
        assert_eq!(
            parse_packet(&packet).unwrap(),
            StationCommand::remote(Command::Stop)
        );

        let packet = OscMessage::new("/control/start").encode();
        assert_eq!(parse_packet(&packet).unwrap().origin, CommandOrigin::Local);
    }

    #[test]
    fn arguments_do_not_change_the_command() {
        let packet = OscMessage::new("/start").with_arg(OscArg::Int(1)).encode();
        assert_eq!(
            parse_packet(&packet).unwrap(),
            StationCommand::remote(Command::Start)
        );
    }

    #[test]
    fn rejects_unknown_and_garbage() {
        let packet = OscMessage::new("/control/launch").encode();
        assert!(matches!(
            parse_packet(&packet),
            Err(NetError::UnknownAddress(a)) if a == "/control/launch"
        ));
        assert!(matches!(parse_packet(b"junk"), Err(NetError::Osc(_))));
    }
}
