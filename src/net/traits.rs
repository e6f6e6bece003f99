//! Datagram channel abstraction

use std::io::Result;
use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;

/// One bound PTP datagram channel (event or general port).
///
/// The follower needs nothing else from the network: bind happens when
/// the channel is built, after which it can join a group, send and
/// receive.
#[async_trait]
pub trait PtpChannel: Send + Sync {
    /// Send a datagram. Resolves once the transport has accepted it.
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<usize>;

    /// Receive one datagram with its sender address.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// Join an IPv4 multicast group on `interface`.
    fn join_multicast_v4(&self, group: Ipv4Addr, interface: Ipv4Addr) -> Result<()>;

    /// Local port the channel is bound to.
    fn local_port(&self) -> Result<u16>;
}
