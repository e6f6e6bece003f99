//! Tokio UDP implementation

use std::io::Result;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::traits::PtpChannel;

/// [`PtpChannel`] over a Tokio UDP socket.
#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
}

impl UdpChannel {
    /// Bind to `port` on `interface` (`0.0.0.0` binds all interfaces).
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the port cannot be bound.
    pub async fn bind(interface: Ipv4Addr, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(interface, port)).await?;
        Ok(Self { socket })
    }

    /// Wrap an already bound socket.
    #[must_use]
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// Local address.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl PtpChannel for UdpChannel {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<usize> {
        self.socket.send_to(data, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn join_multicast_v4(&self, group: Ipv4Addr, interface: Ipv4Addr) -> Result<()> {
        self.socket.join_multicast_v4(group, interface)
    }

    fn local_port(&self) -> Result<u16> {
        self.socket.local_addr().map(|a| a.port())
    }
}
