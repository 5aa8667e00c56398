//! UDP transport for LAN (RMCP / RMCP+) operation.
//!
//! Binds an ephemeral local port and targets the BMC on UDP 623 by
//! default. Datagrams from any other peer are ignored while waiting,
//! so a busy network cannot feed frames into the session layer.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::net::UdpSocket;

use crate::error::IpmiError;
use crate::transport::Transport;

/// Default RMCP port on the BMC side.
pub const DEFAULT_PORT: u16 = 623;

/// Largest datagram the session layer will ever produce or accept.
const MAX_DATAGRAM: usize = 1024;

/// A UDP connection to one BMC.
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind an ephemeral local port and target `remote`.
    pub async fn connect(remote: SocketAddr) -> Result<Self, IpmiError> {
        let bind_addr: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        debug!(
            "udp transport bound {} -> {}",
            socket.local_addr()?,
            remote
        );
        Ok(Self {
            socket,
            remote,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// The BMC address this transport targets.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), IpmiError> {
        trace!("udp send {} bytes", frame.len());
        self.socket.send_to(frame, self.remote).await?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, IpmiError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or(IpmiError::Timeout(timeout))?;

            let (len, peer) =
                match tokio::time::timeout(remaining, self.socket.recv_from(&mut self.buf)).await {
                    Ok(result) => result?,
                    Err(_elapsed) => return Err(IpmiError::Timeout(timeout)),
                };

            if peer != self.remote {
                trace!("udp drop {len} bytes from foreign peer {peer}");
                continue;
            }
            trace!("udp recv {len} bytes");
            return Ok(self.buf[..len].to_vec());
        }
    }

    async fn close(&mut self) -> Result<(), IpmiError> {
        // UDP sockets close on drop; nothing to flush.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_recv_roundtrip() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let mut transport = UdpTransport::connect(peer_addr).await.unwrap();
        transport.send(&[0x06, 0x00, 0xFF, 0x07]).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, console_addr) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0x06, 0x00, 0xFF, 0x07]);

        peer.send_to(&[0x06, 0x00, 0xFF, 0x07, 0xAA], console_addr)
            .await
            .unwrap();
        let reply = transport.recv(Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply, vec![0x06, 0x00, 0xFF, 0x07, 0xAA]);
    }

    #[tokio::test]
    async fn recv_times_out() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut transport = UdpTransport::connect(peer.local_addr().unwrap())
            .await
            .unwrap();
        let err = transport.recv(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, IpmiError::Timeout(_)));
    }

    #[tokio::test]
    async fn foreign_datagrams_are_ignored() {
        let bmc = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut transport = UdpTransport::connect(bmc.local_addr().unwrap())
            .await
            .unwrap();
        // Learn the console's address by receiving one frame.
        transport.send(&[0x01]).await.unwrap();
        let mut buf = [0u8; 16];
        let (_, console_addr) = bmc.recv_from(&mut buf).await.unwrap();

        stranger.send_to(&[0xEE], console_addr).await.unwrap();
        bmc.send_to(&[0xBB], console_addr).await.unwrap();

        let reply = transport.recv(Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply, vec![0xBB]);
    }
}
