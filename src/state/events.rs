//! Event bus for follower signals

use std::net::IpAddr;

use tokio::sync::broadcast;

use crate::protocol::ptp::message::{DomainId, SourceIdentity};
use crate::protocol::ptp::timestamp::ClockTime;

/// Follower events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    // Sync events
    /// Lock state changed
    LockChanged {
        /// New lock state
        locked: bool,
    },
    /// An exchange completed and the offset was updated
    TimeSynced {
        /// Corrected time right after the update
        time: ClockTime,
        /// Corrected time of the exchange, in Unix milliseconds
        last_sync_epoch_ms: i64,
    },
    /// A Sync arrived from a different master
    MasterChanged {
        /// New master identity
        identity: SourceIdentity,
        /// Address the Sync came from
        address: IpAddr,
        /// Lock state at the time of the change
        locked: bool,
    },
    /// A previously unseen domain/subdomain was observed
    DomainObserved {
        /// Every domain seen so far
        domains: Vec<DomainId>,
    },

    // Transport events
    /// A channel is bound and listening
    TransportReady {
        /// Local port
        port: u16,
    },
    /// Bind, join, send or receive failure
    TransportError {
        /// Error message
        message: String,
    },
    /// Channels were released
    TransportClosed,
}

impl SyncEvent {
    /// Whether this is a transport lifecycle event.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportReady { .. } | Self::TransportError { .. } | Self::TransportClosed
        )
    }
}

/// Event bus for distributing events
#[derive(Debug, Clone)]
pub struct EventBus {
    /// Broadcast sender
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Create a new event bus
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    /// Subscribe to events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    pub fn emit(&self, event: SyncEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    /// Get subscriber count
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
pub struct EventFilter {
    rx: broadcast::Receiver<SyncEvent>,
    filter: Box<dyn Fn(&SyncEvent) -> bool + Send>,
}

impl EventFilter {
    /// Create a filtered event receiver
    pub fn new<F>(bus: &EventBus, filter: F) -> Self
    where
        F: Fn(&SyncEvent) -> bool + Send + 'static,
    {
        Self {
            rx: bus.subscribe(),
            filter: Box::new(filter),
        }
    }

    /// Receive next matching event
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if (self.filter)(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event that is already queued, without waiting
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if (self.filter)(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

/// Helper functions for common filters
impl EventFilter {
    /// Filter for lock state changes only
    #[must_use]
    pub fn lock_events(bus: &EventBus) -> Self {
        Self::new(bus, |e| matches!(e, SyncEvent::LockChanged { .. }))
    }

    /// Filter for master changes only
    #[must_use]
    pub fn master_events(bus: &EventBus) -> Self {
        Self::new(bus, |e| matches!(e, SyncEvent::MasterChanged { .. }))
    }

    /// Filter for transport lifecycle events
    #[must_use]
    pub fn transport_events(bus: &EventBus) -> Self {
        Self::new(bus, SyncEvent::is_transport)
    }
}
