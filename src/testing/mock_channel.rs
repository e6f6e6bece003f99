//! In-memory datagram channel

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::net::PtpChannel;

type Datagram = (Vec<u8>, SocketAddr);
type Inbound = Result<Datagram, io::ErrorKind>;

/// Channel whose traffic is driven by a [`MockPeer`].
#[derive(Debug)]
pub struct MockChannel {
    port: u16,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    outbound: mpsc::UnboundedSender<Datagram>,
    fail_sends: AtomicBool,
    groups: Mutex<Vec<(Ipv4Addr, Ipv4Addr)>>,
}

/// Test side of a [`MockChannel`]: injects datagrams and observes sends.
#[derive(Debug)]
pub struct MockPeer {
    inject: Option<mpsc::UnboundedSender<Inbound>>,
    sent: mpsc::UnboundedReceiver<Datagram>,
    channel: Arc<MockChannel>,
}

impl MockChannel {
    /// Create a channel reporting `port` as its local port.
    #[must_use]
    pub fn new(port: u16) -> (Arc<Self>, MockPeer) {
        let (inject, inbound) = mpsc::unbounded_channel();
        let (outbound, sent) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            port,
            inbound: tokio::sync::Mutex::new(inbound),
            outbound,
            fail_sends: AtomicBool::new(false),
            groups: Mutex::new(Vec::new()),
        });
        let peer = MockPeer {
            inject: Some(inject),
            sent,
            channel: channel.clone(),
        };
        (channel, peer)
    }

    /// Groups joined so far, as `(group, interface)` pairs.
    #[must_use]
    pub fn joined_groups(&self) -> Vec<(Ipv4Addr, Ipv4Addr)> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PtpChannel for MockChannel {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> io::Result<usize> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NetworkUnreachable,
                "mock send failure",
            ));
        }
        self.outbound
            .send((data.to_vec(), target))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "mock peer dropped"))?;
        Ok(data.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(Ok((data, from))) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            Some(Err(kind)) => Err(io::Error::new(kind, "mock receive failure")),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "mock channel closed",
            )),
        }
    }

    fn join_multicast_v4(&self, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((group, interface));
        Ok(())
    }

    fn local_port(&self) -> io::Result<u16> {
        Ok(self.port)
    }
}

impl MockPeer {
    /// Deliver a datagram to the channel as if it came from `from`.
    pub fn inject(&self, data: Vec<u8>, from: SocketAddr) {
        if let Some(inject) = &self.inject {
            let _ = inject.send(Ok((data, from)));
        }
    }

    /// Make one receive on the channel fail with `kind`.
    pub fn inject_error(&self, kind: io::ErrorKind) {
        if let Some(inject) = &self.inject {
            let _ = inject.send(Err(kind));
        }
    }

    /// Next datagram the channel sent, waiting if needed.
    pub async fn next_sent(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        self.sent.recv().await
    }

    /// Next sent datagram, if one is already queued.
    pub fn try_next_sent(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        self.sent.try_recv().ok()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn fail_sends(&self, fail: bool) {
        self.channel.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Close the inbound side; the channel's next receive fails.
    pub fn close(&mut self) {
        self.inject = None;
    }
}
