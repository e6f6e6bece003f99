use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::protocol::ptp::clock::{LocalClock, ManualTimeSource};
use crate::protocol::ptp::engine::{EngineAction, MIN_SYNC_INTERVAL_FLOOR, SyncEngine, split_nanos};
use crate::protocol::ptp::message::{DomainId, MessageType, PtpCodec, SubdomainName};
use crate::protocol::ptp::timestamp::ClockTime;
use crate::protocol::ptp::v1::LegacyCodec;
use crate::protocol::ptp::v2::ModernCodec;
use crate::state::{EventBus, SyncEvent};
use crate::testing::PacketBuilder;

const MASTER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
const OTHER_MASTER: [u8; 8] = [0x00, 0x1d, 0xc1, 0xff, 0xfe, 0x00, 0x00, 0x02];

struct Harness<C: PtpCodec> {
    engine: SyncEngine<C>,
    source: ManualTimeSource,
    rx: broadcast::Receiver<SyncEvent>,
    start: Instant,
}

impl<C: PtpCodec> Harness<C> {
    fn new(codec: C, min_sync_interval: Duration) -> Self {
        let source = ManualTimeSource::new(ClockTime::new(1_700_000_000, 0));
        let events = EventBus::new();
        let rx = events.subscribe();
        let clock = LocalClock::new(Arc::new(source.clone()));
        Self {
            engine: SyncEngine::new(codec, clock, min_sync_interval, 319, events),
            source,
            rx,
            start: Instant::now(),
        }
    }

    fn at(&self, millis: u64) -> Instant {
        self.start + Duration::from_millis(millis)
    }

    fn drain(&mut self) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }

    /// Confirm the send of whatever `action` asked for.
    fn complete(&mut self, action: Option<EngineAction>) -> u16 {
        let sequence = match action {
            Some(EngineAction::SendDelayRequest { sequence, .. }) => sequence,
            other => panic!("expected a Delay_Req, got {other:?}"),
        };
        self.engine.delay_request_sent(sequence, Ok(()));
        sequence
    }
}

fn v2() -> Harness<ModernCodec> {
    Harness::new(ModernCodec::new(0), Duration::from_secs(10))
}

fn v1() -> Harness<LegacyCodec> {
    Harness::new(
        LegacyCodec::new(SubdomainName::new("_DFLT").unwrap()),
        Duration::from_secs(10),
    )
}

fn count(events: &[SyncEvent], pred: impl Fn(&SyncEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(*e)).count()
}

fn is_lock(locked: bool) -> impl Fn(&SyncEvent) -> bool {
    move |e| matches!(e, SyncEvent::LockChanged { locked: l } if *l == locked)
}

fn is_synced(e: &SyncEvent) -> bool {
    matches!(e, SyncEvent::TimeSynced { .. })
}

fn is_master(e: &SyncEvent) -> bool {
    matches!(e, SyncEvent::MasterChanged { .. })
}

/// Runs a full two-step exchange on domain 0 starting at `at_ms`.
fn two_step_exchange(h: &mut Harness<ModernCodec>, sync_seq: u16, at_ms: u64) -> Option<u16> {
    let sync = PacketBuilder::v2(MessageType::Sync)
        .sequence(sync_seq)
        .two_step(true)
        .build();
    assert!(h.engine.handle_event(&sync, MASTER, h.at(at_ms)).is_none());

    let follow_up = PacketBuilder::v2(MessageType::FollowUp)
        .sequence(sync_seq)
        .timestamp(1_700_000_000, 500_000_000)
        .build();
    let action = h.engine.handle_general(&follow_up, MASTER, h.at(at_ms))?;
    h.source.advance(Duration::from_millis(50));
    let request = h.complete(Some(action));

    let response = PacketBuilder::v2(MessageType::DelayResp)
        .sequence(request)
        .timestamp(1_700_000_000, 600_000_000)
        .build();
    assert!(h.engine.handle_general(&response, MASTER, h.at(at_ms)).is_none());
    Some(request)
}

// ===== Exchanges =====

#[test]
fn test_two_step_exchange_locks_once() {
    let mut h = v2();
    let request = two_step_exchange(&mut h, 1, 0).unwrap();
    assert_eq!(request, 1);

    let events = h.drain();
    assert_eq!(count(&events, is_lock(true)), 1);
    assert_eq!(count(&events, is_synced), 1);
    assert!(h.engine.is_locked());

    let SyncEvent::TimeSynced {
        time,
        last_sync_epoch_ms,
    } = events.iter().find(|e| is_synced(e)).unwrap().clone()
    else {
        unreachable!()
    };
    assert!(time.is_normalized());
    assert_eq!(last_sync_epoch_ms, time.to_millis());
}

#[test]
fn test_two_step_offset() {
    let mut h = v2();
    two_step_exchange(&mut h, 1, 0).unwrap();

    // ts1 = .000, t1 = .500, t2 = .050, ts2 = .600
    // delta = ((0 - 0.5) - (0.6 - 0.05)) / 2 = -0.525 s
    assert_eq!(h.engine.offset(), ClockTime::new(-1, 475_000_000));
    assert_eq!(h.engine.now(), ClockTime::new(1_700_000_000, 575_000_000));
    assert_eq!(
        h.engine.last_sync().unwrap().time,
        ClockTime::new(1_700_000_000, 575_000_000)
    );
}

#[test]
fn test_exchange_clears_request_times() {
    let mut h = v2();
    two_step_exchange(&mut h, 1, 0).unwrap();
    let session = h.engine.session();
    assert!(session.t2.is_none());
    assert!(session.ts2.is_none());
}

#[test]
fn test_one_step_exchange_locks() {
    let mut h = v1();
    let sync = PacketBuilder::v1(MessageType::Sync)
        .sequence(3)
        .timestamp(1_699_999_999, 900_000_000)
        .build();
    let action = h.engine.handle_event(&sync, MASTER, h.at(0));
    let Some(EngineAction::SendDelayRequest {
        sequence,
        ref packet,
        destination,
    }) = action
    else {
        panic!("one-step Sync must trigger a Delay_Req");
    };
    assert_eq!(packet.len(), LegacyCodec::DELAY_REQ_LEN);
    assert_eq!(destination, "224.0.1.129:319".parse::<SocketAddr>().unwrap());
    assert_eq!(h.engine.session().t1, Some(ClockTime::new(1_699_999_999, 900_000_000)));

    h.engine.delay_request_sent(sequence, Ok(()));
    let response = PacketBuilder::v1(MessageType::DelayResp)
        .sequence(sequence)
        .timestamp(1_700_000_000, 100_000_000)
        .build();
    h.engine.handle_general(&response, MASTER, h.at(0));

    assert!(h.engine.is_locked());
    assert_eq!(count(&h.drain(), is_lock(true)), 1);
}

#[test]
fn test_one_step_without_timestamp_is_ignored() {
    let mut h = v2();
    let sync = PacketBuilder::v2(MessageType::Sync).sequence(3).build();
    assert!(h.engine.handle_event(&sync, MASTER, h.at(0)).is_none());
    assert_eq!(h.engine.session().request_sequence, 0);
}

#[test]
fn test_negative_delta_normalizes() {
    let mut h = v2();
    // Master far ahead: ts1 < t1 and ts2 > t2.
    let sync = PacketBuilder::v2(MessageType::Sync)
        .sequence(1)
        .timestamp(1_700_000_003, 700_000_000)
        .build();
    let action = h.engine.handle_event(&sync, MASTER, h.at(0));
    let request = h.complete(action);
    let response = PacketBuilder::v2(MessageType::DelayResp)
        .sequence(request)
        .timestamp(1_700_000_003, 900_000_000)
        .build();
    h.engine.handle_general(&response, MASTER, h.at(0));

    // delta = ((0 - 3.7) - (3.9 - 0)) / 2 = -3.8 s
    let offset = h.engine.offset();
    assert_eq!(offset, ClockTime::new(-4, 200_000_000));
    assert!(offset.is_normalized());
    let now = h.engine.now();
    assert!(now.is_normalized());
    assert_eq!(now, ClockTime::new(1_700_000_003, 800_000_000));
}

#[test]
fn test_successive_exchanges_accumulate() {
    let mut h = Harness::new(ModernCodec::new(0), MIN_SYNC_INTERVAL_FLOOR);
    two_step_exchange(&mut h, 1, 0).unwrap();
    let first = h.engine.offset();
    two_step_exchange(&mut h, 2, 1_000).unwrap();
    assert_ne!(h.engine.offset(), first);
    assert_eq!(count(&h.drain(), is_lock(true)), 1);
    assert_eq!(h.engine.session().request_sequence, 2);
}

// ===== Out-of-order and mismatched input =====

#[test]
fn test_delay_resp_before_send_completes_is_dropped() {
    let mut h = v2();
    let sync = PacketBuilder::v2(MessageType::Sync)
        .sequence(1)
        .timestamp(1_700_000_000, 0)
        .build();
    let Some(EngineAction::SendDelayRequest { sequence, .. }) =
        h.engine.handle_event(&sync, MASTER, h.at(0))
    else {
        panic!("expected a Delay_Req");
    };
    let response = PacketBuilder::v2(MessageType::DelayResp)
        .sequence(sequence)
        .timestamp(1_700_000_000, 0)
        .build();
    h.engine.handle_general(&response, MASTER, h.at(0));
    assert!(!h.engine.is_locked());
    assert_eq!(h.engine.offset(), ClockTime::ZERO);
}

#[test]
fn test_delay_resp_wrong_sequence_ignored() {
    let mut h = v2();
    let sync = PacketBuilder::v2(MessageType::Sync)
        .sequence(1)
        .timestamp(1_700_000_000, 0)
        .build();
    let action = h.engine.handle_event(&sync, MASTER, h.at(0));
    let request = h.complete(action);
    let response = PacketBuilder::v2(MessageType::DelayResp)
        .sequence(request.wrapping_add(5))
        .timestamp(1_700_000_000, 0)
        .build();
    h.engine.handle_general(&response, MASTER, h.at(0));
    assert!(!h.engine.is_locked());
    assert!(h.engine.session().t2.is_some());
}

#[test]
fn test_follow_up_sequence_mismatch_ignored() {
    let mut h = v2();
    let sync = PacketBuilder::v2(MessageType::Sync).sequence(7).two_step(true).build();
    h.engine.handle_event(&sync, MASTER, h.at(0));
    let follow_up = PacketBuilder::v2(MessageType::FollowUp)
        .sequence(8)
        .timestamp(1_700_000_000, 0)
        .build();
    assert!(h.engine.handle_general(&follow_up, MASTER, h.at(0)).is_none());
    assert!(h.engine.session().t1.is_none());
}

#[test]
fn test_follow_up_without_sync_ignored() {
    let mut h = v2();
    let follow_up = PacketBuilder::v2(MessageType::FollowUp)
        .sequence(0)
        .timestamp(1_700_000_000, 0)
        .build();
    assert!(h.engine.handle_general(&follow_up, MASTER, h.at(0)).is_none());
}

#[test]
fn test_other_domain_is_observed_but_ignored() {
    let mut h = Harness::new(ModernCodec::new(1), Duration::from_secs(10));
    let sync = PacketBuilder::v2(MessageType::Sync)
        .domain(0)
        .sequence(1)
        .timestamp(1_700_000_000, 0)
        .build();
    assert!(h.engine.handle_event(&sync, MASTER, h.at(0)).is_none());
    assert!(h.engine.master().is_none());
    assert_eq!(h.engine.observed_domains(), vec![DomainId::Number(0)]);

    let events = h.drain();
    assert_eq!(
        events,
        vec![SyncEvent::DomainObserved {
            domains: vec![DomainId::Number(0)]
        }]
    );
}

#[test]
fn test_domain_observed_emitted_once_per_value() {
    let mut h = v2();
    for domain in [0u8, 4, 0, 4, 9] {
        let sync = PacketBuilder::v2(MessageType::Sync).domain(domain).two_step(true).build();
        h.engine.handle_event(&sync, MASTER, h.at(0));
    }
    let events = h.drain();
    assert_eq!(
        count(&events, |e| matches!(e, SyncEvent::DomainObserved { .. })),
        3
    );
    assert_eq!(h.engine.observed_domains().len(), 3);
}

#[test]
fn test_garbage_is_dropped_silently() {
    let mut h = v2();
    assert!(h.engine.handle_event(&[0xFF; 7], MASTER, h.at(0)).is_none());
    assert!(h.engine.handle_general(&[], MASTER, h.at(0)).is_none());
    assert!(h.drain().is_empty());
}

#[test]
fn test_event_port_ignores_delay_resp() {
    let mut h = v2();
    let response = PacketBuilder::v2(MessageType::DelayResp).timestamp(1, 0).build();
    assert!(h.engine.handle_event(&response, MASTER, h.at(0)).is_none());
    assert!(h.engine.master().is_none());
}

// ===== Master tracking =====

#[test]
fn test_same_master_emits_once() {
    let mut h = v2();
    for seq in 1..=2 {
        let sync = PacketBuilder::v2(MessageType::Sync).sequence(seq).two_step(true).build();
        h.engine.handle_event(&sync, MASTER, h.at(0));
    }
    assert_eq!(count(&h.drain(), is_master), 1);
}

#[test]
fn test_different_masters_emit_twice() {
    let mut h = v2();
    let first = PacketBuilder::v2(MessageType::Sync).sequence(1).two_step(true).build();
    let second = PacketBuilder::v2(MessageType::Sync)
        .identity(OTHER_MASTER)
        .sequence(2)
        .two_step(true)
        .build();
    h.engine.handle_event(&first, MASTER, h.at(0));
    h.engine.handle_event(&second, MASTER, h.at(0));

    let events = h.drain();
    assert_eq!(count(&events, is_master), 2);
    assert_eq!(
        h.engine.master().unwrap().identity.as_str(),
        "00-1d-c1-ff-fe-00-00-02:0"
    );
}

#[test]
fn test_master_change_while_locked_unlocks() {
    let mut h = v2();
    two_step_exchange(&mut h, 1, 0).unwrap();
    h.drain();

    let other = PacketBuilder::v2(MessageType::Sync)
        .identity(OTHER_MASTER)
        .sequence(2)
        .two_step(true)
        .build();
    h.engine.handle_event(&other, MASTER, h.at(1));

    assert!(!h.engine.is_locked());
    let events = h.drain();
    assert!(matches!(events[0], SyncEvent::LockChanged { locked: false }));
    assert!(matches!(
        events[1],
        SyncEvent::MasterChanged { locked: false, .. }
    ));
}

#[test]
fn test_master_address_update_is_silent() {
    let mut h = v2();
    let sync = PacketBuilder::v2(MessageType::Sync).two_step(true).build();
    h.engine.handle_event(&sync, MASTER, h.at(0));
    let moved = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9));
    h.engine.handle_event(&sync, moved, h.at(0));

    assert_eq!(h.engine.master().unwrap().address, moved);
    assert_eq!(count(&h.drain(), is_master), 1);
}

// ===== Rate limiting =====

#[test]
fn test_follow_up_inside_min_interval_is_skipped() {
    let mut h = v2();
    two_step_exchange(&mut h, 1, 0).unwrap();
    assert!(two_step_exchange(&mut h, 2, 5_000).is_none());
    assert_eq!(h.engine.session().request_sequence, 1);
}

#[test]
fn test_follow_up_after_min_interval_is_used() {
    let mut h = v2();
    two_step_exchange(&mut h, 1, 0).unwrap();
    assert_eq!(two_step_exchange(&mut h, 2, 10_001), Some(2));
}

#[test]
fn test_min_interval_has_floor() {
    let h = Harness::new(ModernCodec::new(0), Duration::from_millis(1));
    assert_eq!(h.engine.session().min_sync_interval, MIN_SYNC_INTERVAL_FLOOR);
    assert_eq!(h.engine.session().lock_timeout(), Duration::from_millis(250));
}

// ===== Lock timeout =====

#[test]
fn test_lock_deadline_is_twice_interval() {
    let mut h = v2();
    two_step_exchange(&mut h, 1, 0).unwrap();
    assert_eq!(h.engine.lock_deadline(), Some(h.at(20_000)));
}

#[test]
fn test_lock_timeout_fires_once() {
    let mut h = v2();
    two_step_exchange(&mut h, 1, 0).unwrap();
    h.drain();

    h.engine.poll_lock_timeout(h.at(19_999));
    assert!(h.engine.is_locked());

    h.engine.poll_lock_timeout(h.at(20_000));
    h.engine.poll_lock_timeout(h.at(30_000));
    assert!(!h.engine.is_locked());
    assert!(h.engine.lock_deadline().is_none());
    assert_eq!(h.drain(), vec![SyncEvent::LockChanged { locked: false }]);
}

#[test]
fn test_new_exchange_pushes_deadline() {
    let mut h = Harness::new(ModernCodec::new(0), MIN_SYNC_INTERVAL_FLOOR);
    two_step_exchange(&mut h, 1, 0).unwrap();
    two_step_exchange(&mut h, 2, 200).unwrap();
    h.engine.poll_lock_timeout(h.at(300));
    assert!(h.engine.is_locked());
    assert_eq!(h.engine.lock_deadline(), Some(h.at(450)));
}

// ===== Send completion and shutdown =====

#[test]
fn test_t2_is_read_after_send_completes() {
    let mut h = v2();
    let sync = PacketBuilder::v2(MessageType::Sync)
        .sequence(1)
        .timestamp(1_700_000_000, 0)
        .build();
    let action = h.engine.handle_event(&sync, MASTER, h.at(0));
    assert!(h.engine.session().t2.is_none());

    h.source.advance(Duration::from_millis(3));
    h.complete(action);
    assert_eq!(
        h.engine.session().t2,
        Some(ClockTime::new(1_700_000_000, 3_000_000))
    );
}

#[test]
fn test_send_failure_reports_transport_error() {
    let mut h = v2();
    let sync = PacketBuilder::v2(MessageType::Sync)
        .sequence(1)
        .timestamp(1_700_000_000, 0)
        .build();
    h.engine.handle_event(&sync, MASTER, h.at(0));
    h.drain();

    h.engine.delay_request_sent(
        1,
        Err(io::Error::new(io::ErrorKind::NetworkUnreachable, "down")),
    );
    assert!(h.engine.session().t2.is_none());
    let events = h.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], SyncEvent::TransportError { message } if message.contains("down")));
}

#[test]
fn test_superseded_send_does_not_set_t2() {
    let mut h = v2();
    let sync = PacketBuilder::v2(MessageType::Sync)
        .sequence(1)
        .timestamp(1_700_000_000, 0)
        .build();
    h.engine.handle_event(&sync, MASTER, h.at(0));
    h.engine.delay_request_sent(9, Ok(()));
    assert!(h.engine.session().t2.is_none());
}

#[test]
fn test_shutdown_always_reports_unlocked() {
    let mut h = v2();
    h.engine.shutdown();
    assert_eq!(h.drain(), vec![SyncEvent::LockChanged { locked: false }]);

    two_step_exchange(&mut h, 1, 0).unwrap();
    h.drain();
    h.engine.shutdown();
    assert!(!h.engine.is_locked());
    assert!(h.engine.lock_deadline().is_none());
    assert_eq!(h.drain(), vec![SyncEvent::LockChanged { locked: false }]);
}

// ===== split_nanos =====

#[test]
fn test_split_nanos_truncates_toward_zero() {
    assert_eq!(split_nanos(1_500_000_000), (1, 500_000_000));
    assert_eq!(split_nanos(-1_500_000_000), (-1, -500_000_000));
    assert_eq!(split_nanos(-525_000_000), (0, -525_000_000));
    assert_eq!(split_nanos(0), (0, 0));
}

#[test]
fn test_debug_output() {
    let h = v2();
    let debug = format!("{:?}", h.engine);
    assert!(debug.contains("SyncEngine"));
    assert!(debug.contains("locked: false"));
}
