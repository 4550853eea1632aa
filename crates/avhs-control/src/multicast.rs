//! Multicast tally listener.
//!
//! The AV-HS410 publishes ABST bus status on a fixed multicast group. The
//! listener joins it on the operator-selected interface, frames datagrams
//! with its own buffer and hands decoded packets to the connection task.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use avhs_protocol::framing::Framer;

use crate::config::MulticastSettings;
use crate::error::MulticastError;
use crate::transport::{Inbound, Source};

const RETRY_BASE: Duration = Duration::from_millis(10);
const RETRY_MAX: Duration = Duration::from_secs(2);

/// Create a listener socket bound to the tally port and joined to the group.
///
/// Must be called from within a tokio runtime.
pub fn create_multicast_listener(settings: &MulticastSettings) -> Result<UdpSocket, MulticastError> {
    bind_and_join(settings)
        .and_then(UdpSocket::from_std)
        .map_err(|source| MulticastError {
            group: settings.group,
            port: settings.port,
            interface: settings.interface,
            source,
        })
}

fn bind_and_join(settings: &MulticastSettings) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    #[cfg(any(target_os = "macos", target_os = "freebsd"))]
    socket.set_reuse_port(true)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, settings.port);
    socket.bind(&addr.into())?;

    socket.join_multicast_v4(&settings.group, &settings.interface)?;

    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// Pause after `failures` consecutive receive errors, doubling up to a cap.
fn retry_delay(failures: u32) -> Duration {
    RETRY_BASE
        .saturating_mul(1 << failures.saturating_sub(1).min(8))
        .min(RETRY_MAX)
}

/// Receive loop. Runs until aborted or the connection task goes away.
pub(crate) async fn listen(socket: UdpSocket, generation: u64, tx: mpsc::Sender<Inbound>) {
    let mut buf = [0u8; 1500];
    let mut framer = Framer::new();
    let mut failures = 0u32;

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                if failures > 0 {
                    info!(failures, "Multicast receive recovered");
                    failures = 0;
                }
                let frames = framer.feed(&buf[..len]);
                if frames.malformed > 0 {
                    debug!(from = %from, dropped = frames.malformed, "Dropped malformed multicast spans");
                }
                if frames.overflowed > 0 {
                    warn!(from = %from, bytes = frames.overflowed, "Multicast buffer overflow, discarded pending bytes");
                }
                if frames.packets.is_empty() {
                    continue;
                }

                let inbound = Inbound::Packets {
                    generation,
                    source: Source::Multicast,
                    packets: frames.packets,
                };
                if tx.send(inbound).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                failures += 1;
                if failures == 1 {
                    error!("Multicast receive error: {}", e);
                } else {
                    debug!(failures, "Multicast receive error: {}", e);
                }
                tokio::time::sleep(retry_delay(failures)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn datagrams_are_framed_across_boundaries() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(listen(socket, 7, tx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"\x02ABST:02", addr).await.unwrap();
        sender.send_to(b":00\x03\x02ABST:03:01\x03", addr).await.unwrap();

        let inbound = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match inbound {
            Inbound::Packets {
                generation,
                source,
                packets,
            } => {
                assert_eq!(generation, 7);
                assert_eq!(source, Source::Multicast);
                assert_eq!(packets, vec!["ABST:02:00", "ABST:03:01"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        task.abort();
    }

    #[tokio::test]
    async fn join_on_foreign_interface_fails_with_context() {
        // TEST-NET-1 is never assigned to a local interface.
        let settings = MulticastSettings {
            group: Ipv4Addr::new(224, 0, 0, 200),
            port: 0,
            interface: Ipv4Addr::new(192, 0, 2, 1),
        };
        let err = create_multicast_listener(&settings).unwrap_err();
        assert_eq!(err.interface, settings.interface);
        assert!(err.to_string().contains("224.0.0.200"));
        assert!(!err.is_address_conflict());
    }

    #[test]
    fn receive_retry_backs_off() {
        assert_eq!(retry_delay(1), Duration::from_millis(10));
        assert_eq!(retry_delay(2), Duration::from_millis(20));
        assert_eq!(retry_delay(5), Duration::from_millis(160));
        assert_eq!(retry_delay(9), RETRY_MAX);
        assert_eq!(retry_delay(u32::MAX), RETRY_MAX);
    }
}
