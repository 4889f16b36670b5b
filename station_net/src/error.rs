//! Network link errors.

use crate::osc::OscError;
use station_common::config::ConfigError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("cannot bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed OSC packet: {0}")]
    Osc(#[from] OscError),

    #[error("unknown OSC address '{0}'")]
    UnknownAddress(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
