//! Follower state machine.
//!
//! One [`SyncEngine`] per client instance, generic over the wire codec.
//! It consumes decoded packets from the event and general channels,
//! decides when a `Delay_Req` must go out, and turns each completed
//! exchange into an offset update on the [`LocalClock`].
//!
//! ```text
//! Master                          Follower
//!   |--- Sync (t1) ----------------->|  ts1 = local receive time
//!   |--- Follow_Up (precise t1) ---->|  (two-step only)
//!   |<---- Delay_Req --------------- |  t2 = local send time, after the send completes
//!   |---- Delay_Resp (ts2) --------->|
//!   |                                |
//!   |  delta = ((ts1 - t1) - (ts2 - t2)) / 2
//! ```
//!
//! The engine never touches a socket. Sends are returned as
//! [`EngineAction`]s and their completion is reported back through
//! [`SyncEngine::delay_request_sent`], which is where `t2` is captured.

use std::io;
use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::PtpError;
use crate::state::{EventBus, SyncEvent};

use super::clock::LocalClock;
use super::message::{DomainId, Filter, MessageType, PacketHeader, PtpCodec, SourceIdentity};
use super::registry::DomainRegistry;
use super::timestamp::ClockTime;

/// Default minimum interval between completed exchanges.
pub const DEFAULT_MIN_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Smallest accepted minimum sync interval.
pub const MIN_SYNC_INTERVAL_FLOOR: Duration = Duration::from_millis(125);

/// The master currently followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRecord {
    /// Master identity from its Sync messages.
    pub identity: SourceIdentity,
    /// Address its Sync messages arrive from.
    pub address: IpAddr,
}

/// When and at what corrected time the last exchange completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastSync {
    /// Monotonic instant of completion.
    pub at: Instant,
    /// Corrected clock reading right after the offset update.
    pub time: ClockTime,
}

/// Per-instance exchange state.
#[derive(Debug, Clone)]
pub struct SyncSession {
    /// Master's Sync send time.
    pub t1: Option<ClockTime>,
    /// Local Sync receive time.
    pub ts1: Option<ClockTime>,
    /// Local Delay_Req send time, set once the send has completed.
    pub t2: Option<ClockTime>,
    /// Master's Delay_Req receive time.
    pub ts2: Option<ClockTime>,
    /// Sequence of the last accepted Sync.
    pub sync_sequence: Option<u16>,
    /// Sequence of the last Delay_Req issued.
    pub request_sequence: u16,
    /// Last completed exchange.
    pub last_sync: Option<LastSync>,
    /// Floor on exchange frequency. Never below 125 ms.
    pub min_sync_interval: Duration,
    /// Sync/unsync flag.
    pub locked: bool,
}

impl SyncSession {
    fn new(min_sync_interval: Duration) -> Self {
        Self {
            t1: None,
            ts1: None,
            t2: None,
            ts2: None,
            sync_sequence: None,
            request_sequence: 0,
            last_sync: None,
            min_sync_interval: min_sync_interval.max(MIN_SYNC_INTERVAL_FLOOR),
            locked: false,
        }
    }

    /// How long a lock holds without a fresh exchange.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        self.min_sync_interval * 2
    }
}

/// Work the engine asks its driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// Send a Delay_Req, then report completion via
    /// [`SyncEngine::delay_request_sent`].
    SendDelayRequest {
        /// Sequence ID carried by `packet`.
        sequence: u16,
        /// Encoded request.
        packet: Vec<u8>,
        /// Multicast group and event port.
        destination: SocketAddr,
    },
}

/// Follower state machine over one codec.
pub struct SyncEngine<C: PtpCodec> {
    codec: C,
    clock: LocalClock,
    session: SyncSession,
    master: Option<MasterRecord>,
    registry: DomainRegistry,
    events: EventBus,
    destination: SocketAddr,
    lock_deadline: Option<Instant>,
}

impl<C: PtpCodec> SyncEngine<C> {
    /// Create an engine. Delay requests go to the codec's multicast group
    /// on `event_port`.
    #[must_use]
    pub fn new(
        codec: C,
        clock: LocalClock,
        min_sync_interval: Duration,
        event_port: u16,
        events: EventBus,
    ) -> Self {
        let destination = SocketAddr::V4(SocketAddrV4::new(codec.multicast_group(), event_port));
        Self {
            codec,
            clock,
            session: SyncSession::new(min_sync_interval),
            master: None,
            registry: DomainRegistry::new(),
            events,
            destination,
            lock_deadline: None,
        }
    }

    /// Handle a datagram from the event channel (port 319).
    pub fn handle_event(&mut self, data: &[u8], src: IpAddr, at: Instant) -> Option<EngineAction> {
        let received = self.clock.now();
        let header = self.decode(data)?;

        if header.message_type != MessageType::Sync {
            tracing::trace!(kind = %header.message_type, %src, "PTP: ignoring event message");
            return None;
        }
        if !self.codec.matches_filter(&header) {
            tracing::trace!(domain = %header.domain, %src, "PTP: Sync outside configured domain");
            return None;
        }

        self.track_master(&header, src);
        self.session.sync_sequence = Some(header.sequence);

        if header.two_step {
            // Precise t1 follows in a Follow_Up.
            self.session.ts1 = Some(received);
            self.session.t1 = None;
            return None;
        }

        if !self.interval_elapsed(at) {
            tracing::trace!(seq = header.sequence, "PTP: one-step Sync inside min interval");
            return None;
        }
        let Some(t1) = self.codec.decode_timestamp(data) else {
            tracing::trace!(len = data.len(), "PTP: one-step Sync without timestamp");
            return None;
        };
        self.session.ts1 = Some(received);
        self.session.t1 = Some(t1);
        tracing::debug!(seq = header.sequence, %t1, ts1 = %received, "PTP: one-step Sync");
        Some(self.issue_delay_request())
    }

    /// Handle a datagram from the general channel (port 320).
    pub fn handle_general(
        &mut self,
        data: &[u8],
        src: IpAddr,
        at: Instant,
    ) -> Option<EngineAction> {
        let header = self.decode(data)?;
        if !self.codec.matches_filter(&header) {
            tracing::trace!(domain = %header.domain, %src, "PTP: general message outside configured domain");
            return None;
        }
        match header.message_type {
            MessageType::FollowUp => self.on_follow_up(&header, data, at),
            MessageType::DelayResp => {
                self.on_delay_response(&header, data, at);
                None
            }
            other => {
                tracing::trace!(kind = %other, %src, "PTP: ignoring general message");
                None
            }
        }
    }

    /// Report completion of a send requested by [`EngineAction::SendDelayRequest`].
    ///
    /// `t2` is read from the corrected clock here, after the transport has
    /// confirmed the send. A failure is surfaced as an event and leaves the
    /// pending `t1`/`ts1` untouched.
    pub fn delay_request_sent(&mut self, sequence: u16, result: io::Result<()>) {
        match result {
            Ok(()) if sequence == self.session.request_sequence => {
                let t2 = self.clock.now();
                self.session.t2 = Some(t2);
                tracing::trace!(seq = sequence, %t2, "PTP: Delay_Req sent");
            }
            Ok(()) => {
                tracing::trace!(seq = sequence, "PTP: superseded Delay_Req sent");
            }
            Err(e) => {
                let err = PtpError::Send(e);
                tracing::warn!(seq = sequence, error = %err, "PTP: Delay_Req not sent");
                self.events.emit(SyncEvent::TransportError {
                    message: format!("Delay_Req seq={sequence}: {err}"),
                });
            }
        }
    }

    /// Drop the lock if its deadline has passed without a new exchange.
    pub fn poll_lock_timeout(&mut self, at: Instant) {
        match self.lock_deadline {
            Some(deadline) if at >= deadline => {}
            _ => return,
        }
        self.lock_deadline = None;
        if self.session.locked {
            self.session.locked = false;
            tracing::warn!(
                timeout = ?self.session.lock_timeout(),
                "PTP: lock lost, no exchange completed in time"
            );
            self.events.emit(SyncEvent::LockChanged { locked: false });
        }
    }

    /// Tear down: cancel the lock timer and report unlocked, even if the
    /// lock was already lost.
    pub fn shutdown(&mut self) {
        self.lock_deadline = None;
        self.session.locked = false;
        self.events.emit(SyncEvent::LockChanged { locked: false });
    }

    // ===== Queries =====

    /// Current lock state.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.session.locked
    }

    /// The master currently followed.
    #[must_use]
    pub fn master(&self) -> Option<&MasterRecord> {
        self.master.as_ref()
    }

    /// Last completed exchange.
    #[must_use]
    pub fn last_sync(&self) -> Option<LastSync> {
        self.session.last_sync
    }

    /// Corrected time.
    #[must_use]
    pub fn now(&self) -> ClockTime {
        self.clock.now()
    }

    /// Corrected time in nanoseconds.
    #[must_use]
    pub fn now_nanos(&self) -> i128 {
        self.clock.now_nanos()
    }

    /// Accumulated offset.
    #[must_use]
    pub fn offset(&self) -> ClockTime {
        self.clock.offset()
    }

    /// Configured domain filter.
    #[must_use]
    pub fn filter(&self) -> Filter {
        self.codec.filter()
    }

    /// Every domain value seen so far.
    #[must_use]
    pub fn observed_domains(&self) -> Vec<DomainId> {
        self.registry.snapshot()
    }

    /// Exchange state.
    #[must_use]
    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    /// When the lock will be dropped if no exchange completes.
    #[must_use]
    pub fn lock_deadline(&self) -> Option<Instant> {
        self.lock_deadline
    }

    /// Where Delay_Req packets are sent.
    #[must_use]
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// The codec.
    #[must_use]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    // ===== Transitions =====

    fn decode(&mut self, data: &[u8]) -> Option<PacketHeader> {
        let Some(header) = self.codec.decode_header(data) else {
            tracing::trace!(len = data.len(), "PTP: dropping undecodable packet");
            return None;
        };
        if self.registry.observe(header.domain) {
            tracing::info!(domain = %header.domain, "PTP: observed new domain");
            self.events.emit(SyncEvent::DomainObserved {
                domains: self.registry.snapshot(),
            });
        }
        Some(header)
    }

    fn track_master(&mut self, header: &PacketHeader, src: IpAddr) {
        if let Some(master) = self.master.as_mut() {
            if master.identity == header.source {
                if master.address != src {
                    tracing::debug!(identity = %master.identity, from = %master.address, to = %src, "PTP: master moved");
                    master.address = src;
                }
                return;
            }
        }

        let was_locked = self.session.locked;
        self.session.locked = false;
        self.master = Some(MasterRecord {
            identity: header.source.clone(),
            address: src,
        });
        tracing::info!(identity = %header.source, address = %src, "PTP: new master");
        if was_locked {
            self.events.emit(SyncEvent::LockChanged { locked: false });
        }
        self.events.emit(SyncEvent::MasterChanged {
            identity: header.source.clone(),
            address: src,
            locked: false,
        });
    }

    // Inherited throttle: also drops eligible one-step Syncs and Follow_Ups
    // when no exchange is in flight.
    fn interval_elapsed(&self, at: Instant) -> bool {
        self.session.last_sync.is_none_or(|last| {
            at.saturating_duration_since(last.at) > self.session.min_sync_interval
        })
    }

    fn on_follow_up(
        &mut self,
        header: &PacketHeader,
        data: &[u8],
        at: Instant,
    ) -> Option<EngineAction> {
        if self.session.sync_sequence != Some(header.sequence) {
            tracing::trace!(seq = header.sequence, expected = ?self.session.sync_sequence, "PTP: Follow_Up for another Sync");
            return None;
        }
        if self.session.ts1.is_none() {
            return None;
        }
        if !self.interval_elapsed(at) {
            tracing::trace!(seq = header.sequence, "PTP: Follow_Up inside min interval");
            return None;
        }
        let t1 = self.codec.decode_timestamp(data)?;
        self.session.t1 = Some(t1);
        tracing::debug!(seq = header.sequence, %t1, "PTP: Follow_Up");
        Some(self.issue_delay_request())
    }

    fn issue_delay_request(&mut self) -> EngineAction {
        let sequence = self.session.request_sequence.wrapping_add(1);
        self.session.request_sequence = sequence;
        self.session.t2 = None;
        self.session.ts2 = None;
        EngineAction::SendDelayRequest {
            sequence,
            packet: self.codec.encode_delay_request(sequence),
            destination: self.destination,
        }
    }

    fn on_delay_response(&mut self, header: &PacketHeader, data: &[u8], at: Instant) {
        if header.sequence != self.session.request_sequence {
            tracing::trace!(seq = header.sequence, expected = self.session.request_sequence, "PTP: Delay_Resp for another request");
            return;
        }
        let Some(ts2) = self.codec.decode_timestamp(data) else {
            return;
        };
        let (Some(t1), Some(ts1), Some(t2)) = (self.session.t1, self.session.ts1, self.session.t2)
        else {
            tracing::trace!(seq = header.sequence, "PTP: Delay_Resp without a complete exchange");
            return;
        };
        self.session.ts2 = Some(ts2);

        let delta_ns = ((ts1 - t1) - (ts2 - t2)) / 2;
        let (delta_s, delta_rem) = split_nanos(delta_ns);
        self.clock.apply_delta(delta_s, delta_rem);
        self.session.t2 = None;
        self.session.ts2 = None;

        let time = self.clock.now();
        self.session.last_sync = Some(LastSync { at, time });
        tracing::debug!(
            seq = header.sequence,
            delta_ns = %delta_ns,
            offset = %self.clock.offset(),
            "PTP: exchange complete"
        );
        self.events.emit(SyncEvent::TimeSynced {
            time,
            last_sync_epoch_ms: time.to_millis(),
        });

        self.lock_deadline = Some(at + self.session.lock_timeout());
        if !self.session.locked {
            self.session.locked = true;
            tracing::info!(offset = %self.clock.offset(), "PTP: locked");
            self.events.emit(SyncEvent::LockChanged { locked: true });
        }
    }
}

impl<C: PtpCodec + std::fmt::Debug> std::fmt::Debug for SyncEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("codec", &self.codec)
            .field("locked", &self.session.locked)
            .field("master", &self.master)
            .field("offset", &format_args!("{}", self.clock.offset()))
            .field("domains", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Split a nanosecond delta into truncated seconds and the signed remainder.
///
/// Truncation keeps both parts on the same side of zero, so a negative
/// delta splits into `(-1, -500_000_000)` rather than `(-2, 500_000_000)`.
#[must_use]
pub fn split_nanos(delta_ns: i128) -> (i64, i64) {
    let per_sec = i128::from(ClockTime::NANOS_PER_SEC);
    let seconds = delta_ns / per_sec;
    let seconds = i64::try_from(seconds).unwrap_or(if seconds < 0 { i64::MIN } else { i64::MAX });
    #[allow(
        clippy::cast_possible_truncation,
        reason = "remainder of a division by 1e9 fits in i64"
    )]
    let nanos = (delta_ns % per_sec) as i64;
    (seconds, nanos)
}
