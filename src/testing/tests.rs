use std::net::{Ipv4Addr, SocketAddr};

use super::*;
use crate::net::PtpChannel;
use crate::protocol::ptp::message::MessageType;

fn peer_addr() -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], 319))
}

#[tokio::test]
async fn test_mock_channel_inject_and_recv() {
    let (channel, peer) = MockChannel::new(319);
    peer.inject(vec![1, 2, 3], peer_addr());

    let mut buf = [0u8; 8];
    let (len, from) = channel.recv_from(&mut buf).await.unwrap();
    assert_eq!(&buf[..len], &[1, 2, 3]);
    assert_eq!(from, peer_addr());
}

#[tokio::test]
async fn test_mock_channel_truncates_to_buffer() {
    let (channel, peer) = MockChannel::new(319);
    peer.inject(vec![9; 10], peer_addr());

    let mut buf = [0u8; 4];
    let (len, _) = channel.recv_from(&mut buf).await.unwrap();
    assert_eq!(len, 4);
}

#[tokio::test]
async fn test_mock_channel_records_sends() {
    let (channel, mut peer) = MockChannel::new(319);
    assert!(peer.try_next_sent().is_none());

    channel.send_to(b"req", peer_addr()).await.unwrap();
    let (data, to) = peer.next_sent().await.unwrap();
    assert_eq!(data, b"req");
    assert_eq!(to, peer_addr());
}

#[tokio::test]
async fn test_mock_channel_send_failure() {
    let (channel, peer) = MockChannel::new(319);
    peer.fail_sends(true);
    assert!(channel.send_to(b"req", peer_addr()).await.is_err());
    peer.fail_sends(false);
    assert!(channel.send_to(b"req", peer_addr()).await.is_ok());
}

#[tokio::test]
async fn test_mock_channel_close() {
    let (channel, mut peer) = MockChannel::new(320);
    peer.close();
    let mut buf = [0u8; 8];
    let err = channel.recv_from(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::ConnectionAborted);
}

#[test]
fn test_mock_channel_joins() {
    let (channel, _peer) = MockChannel::new(319);
    assert_eq!(channel.local_port().unwrap(), 319);
    let group = Ipv4Addr::new(224, 0, 1, 129);
    channel.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED).unwrap();
    assert_eq!(channel.joined_groups(), vec![(group, Ipv4Addr::UNSPECIFIED)]);
}

#[test]
fn test_packet_builder_lengths() {
    assert_eq!(PacketBuilder::v1(MessageType::Sync).build().len(), 32);
    assert_eq!(
        PacketBuilder::v1(MessageType::Sync).timestamp(1, 0).build().len(),
        40
    );
    assert_eq!(PacketBuilder::v2(MessageType::Sync).build().len(), 34);
    assert_eq!(
        PacketBuilder::v2(MessageType::Sync).timestamp(1, 0).build().len(),
        44
    );
}

#[test]
fn test_packet_builder_v1_fields() {
    let packet = PacketBuilder::v1(MessageType::DelayResp)
        .subdomain("_ALT1")
        .sequence(0x0102)
        .two_step(true)
        .build();
    assert_eq!(&packet[..5], b"_ALT1");
    assert_eq!(packet[16], 4);
    assert_eq!(&packet[26..28], &[0x01, 0x02]);
    assert_eq!(packet[28], 3);
    assert_eq!(&packet[30..32], &[0x00, 0x08]);
}

#[test]
fn test_packet_builder_v2_fields() {
    let packet = PacketBuilder::v2(MessageType::FollowUp)
        .domain(7)
        .two_step(true)
        .build();
    assert_eq!(packet[0], 0x08);
    assert_eq!(packet[1], 2);
    assert_eq!(&packet[2..4], &[0, 34]);
    assert_eq!(packet[4], 7);
    assert_eq!(&packet[6..8], &[0x02, 0x00]);
}

#[tokio::test]
async fn test_mock_channel_injected_error() {
    let (channel, peer) = MockChannel::new(320);
    peer.inject_error(std::io::ErrorKind::ConnectionReset);
    peer.inject(vec![7], peer_addr());

    let mut buf = [0u8; 8];
    let err = channel.recv_from(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);
    let (len, _) = channel.recv_from(&mut buf).await.unwrap();
    assert_eq!(&buf[..len], &[7]);
}
