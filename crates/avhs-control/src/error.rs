use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;

use avhs_protocol::error::InvalidCode;

/// Socket-level failures on the control connection.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {0}")]
    ConnectTimeout(SocketAddr),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("connection closed by device")]
    ClosedByPeer,

    #[error("send queue full, device is not reading")]
    QueueFull,

    #[error("socket is not connected")]
    NotConnected,
}

/// Failure to set up the multicast tally listener.
///
/// Usually another instance already holds the group on this machine.
#[derive(Error, Debug)]
#[error("cannot join multicast {group}:{port} on {interface}: {source}")]
pub struct MulticastError {
    pub group: Ipv4Addr,
    pub port: u16,
    pub interface: Ipv4Addr,
    #[source]
    pub source: io::Error,
}

impl MulticastError {
    /// True for the errors a second listener on the same group produces
    /// (EINVAL, EADDRINUSE, ECONNREFUSED).
    pub fn is_address_conflict(&self) -> bool {
        matches!(
            self.source.kind(),
            io::ErrorKind::AddrInUse | io::ErrorKind::InvalidInput | io::ErrorKind::ConnectionRefused
        )
    }
}

/// Errors returned to callers of the [`Switcher`](crate::transport::Switcher) handle.
#[derive(Error, Debug)]
pub enum SwitcherError {
    #[error(transparent)]
    InvalidCode(#[from] InvalidCode),

    #[error("no device model configured")]
    NotConfigured,

    #[error("connection task has stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multicast_error(kind: io::ErrorKind) -> MulticastError {
        MulticastError {
            group: Ipv4Addr::new(224, 0, 0, 200),
            port: 60020,
            interface: Ipv4Addr::new(192, 168, 0, 10),
            source: io::Error::from(kind),
        }
    }

    #[test]
    fn address_conflict_kinds() {
        assert!(multicast_error(io::ErrorKind::AddrInUse).is_address_conflict());
        assert!(multicast_error(io::ErrorKind::InvalidInput).is_address_conflict());
        assert!(multicast_error(io::ErrorKind::ConnectionRefused).is_address_conflict());

        assert!(!multicast_error(io::ErrorKind::AddrNotAvailable).is_address_conflict());
        assert!(!multicast_error(io::ErrorKind::PermissionDenied).is_address_conflict());
    }
}
