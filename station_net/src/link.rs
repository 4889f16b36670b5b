//! UDP implementation of [`StationLink`].
//!
//! One unbound-port socket is used for every outbound datagram. Sends are
//! fire-and-forget: a failure is logged and counted, and the caller never
//! sees it.

use crate::address::{address_for, video_address};
use crate::error::NetError;
use crate::osc::OscMessage;
use station_common::command::Command;
use station_common::config::NetworkConfig;
use station_common::link::{StationLink, VideoCue};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use tracing::{debug, info, warn};

pub struct NetworkLink {
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
    video: Option<SocketAddr>,
    sent: u64,
    failed: u64,
}

impl NetworkLink {
    /// Link sending commands to `peers` and video cues to `video`.
    pub fn new(peers: Vec<SocketAddr>, video: Option<SocketAddr>) -> Result<Self, NetError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let socket = UdpSocket::bind(addr).map_err(|source| NetError::Bind { addr, source })?;
        info!(
            peers = peers.len(),
            video = ?video,
            "network link ready"
        );
        Ok(Self {
            socket,
            peers,
            video,
            sent: 0,
            failed: 0,
        })
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Self, NetError> {
        Self::new(config.peer_addrs()?, Some(config.video_addr()?))
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }

    /// Datagrams handed to the OS.
    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    /// Datagrams the OS refused.
    pub fn failed_count(&self) -> u64 {
        self.failed
    }

    fn send(&mut self, message: &OscMessage, targets: &[SocketAddr]) {
        let packet = message.encode();
        for &to in targets {
            match self.socket.send_to(&packet, to) {
                Ok(_) => {
                    self.sent += 1;
                    debug!(address = %message.address, %to, "sent");
                }
                Err(e) => {
                    self.failed += 1;
                    warn!(address = %message.address, %to, error = %e, "send failed");
                }
            }
        }
    }
}

impl StationLink for NetworkLink {
    fn notify_video(&mut self, cue: VideoCue) {
        if let Some(to) = self.video {
            self.send(&OscMessage::new(video_address(cue)), &[to]);
        }
    }

    fn broadcast(&mut self, command: Command) {
        let peers = std::mem::take(&mut self.peers);
        self.send(&OscMessage::new(address_for(command)), &peers);
        self.peers = peers;
    }
}
