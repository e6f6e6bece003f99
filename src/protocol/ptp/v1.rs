//! Legacy (IEEE 1588-2002 style) fixed-format codec.
//!
//! ```text
//!  0..16  subdomain name (NUL padded)
//!  16     message type   (Sync=1, Delay_Req=2, Follow_Up=3, Delay_Resp=4)
//!  18..24 source UUID
//!  24..26 source port     (u16 BE)
//!  26..28 sequence ID     (u16 BE)
//!  28     control         (Sync=0, Delay_Req=1, Follow_Up=2, Delay_Resp=3)
//!  30..32 flags           (u16 BE, 0x0008 = assist / two-step)
//!  32..36 seconds         (u32 BE)
//!  36..40 nanoseconds     (i32 BE, signed)
//! ```

use std::net::Ipv4Addr;

use super::message::{
    DomainId, Filter, MessageType, PacketHeader, PtpCodec, SourceIdentity, SubdomainName,
};
use super::multicast;
use super::timestamp::ClockTime;

/// Legacy message type values (byte 16).
pub mod message_type {
    /// Sync.
    pub const SYNC: u8 = 1;
    /// Delay request.
    pub const DELAY_REQ: u8 = 2;
    /// Follow-up.
    pub const FOLLOW_UP: u8 = 3;
    /// Delay response.
    pub const DELAY_RESP: u8 = 4;
}

/// Legacy control values (byte 28).
pub mod control {
    /// Sync.
    pub const SYNC: u8 = 0;
    /// Delay request.
    pub const DELAY_REQ: u8 = 1;
    /// Follow-up.
    pub const FOLLOW_UP: u8 = 2;
    /// Delay response.
    pub const DELAY_RESP: u8 = 3;
}

/// Codec for the legacy wire format, filtering on one subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyCodec {
    subdomain: SubdomainName,
}

impl LegacyCodec {
    /// Header-only packet length.
    pub const HEADER_LEN: usize = 32;
    /// Length of a packet carrying a timestamp.
    pub const TIMESTAMP_LEN: usize = 40;
    /// Length of an encoded Delay_Req.
    pub const DELAY_REQ_LEN: usize = 44;
    /// Two-step assist flag.
    pub const FLAG_ASSIST: u16 = 0x0008;

    const MESSAGE_TYPE: usize = 16;
    const UUID: std::ops::Range<usize> = 18..24;
    const PORT: usize = 24;
    const SEQUENCE: usize = 26;
    const CONTROL: usize = 28;
    const FLAGS: usize = 30;
    const SECONDS: usize = 32;
    const NANOS: usize = 36;

    /// Create a codec for `subdomain`.
    #[must_use]
    pub fn new(subdomain: SubdomainName) -> Self {
        Self { subdomain }
    }

    /// The configured subdomain.
    #[must_use]
    pub fn subdomain(&self) -> SubdomainName {
        self.subdomain
    }

    fn message_type(value: u8) -> MessageType {
        match value {
            message_type::SYNC => MessageType::Sync,
            message_type::DELAY_REQ => MessageType::DelayReq,
            message_type::FOLLOW_UP => MessageType::FollowUp,
            message_type::DELAY_RESP => MessageType::DelayResp,
            other => MessageType::Other(other),
        }
    }
}

fn be_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

impl PtpCodec for LegacyCodec {
    fn decode_header(&self, data: &[u8]) -> Option<PacketHeader> {
        if data.len() < Self::HEADER_LEN {
            return None;
        }
        let subdomain = SubdomainName::from_wire(data)?;
        let flags = be_u16(data, Self::FLAGS);
        Some(PacketHeader {
            message_type: Self::message_type(data[Self::MESSAGE_TYPE]),
            domain: DomainId::Subdomain(subdomain),
            source: SourceIdentity::from_parts(&data[Self::UUID], be_u16(data, Self::PORT)),
            sequence: be_u16(data, Self::SEQUENCE),
            control: data[Self::CONTROL],
            two_step: flags & Self::FLAG_ASSIST != 0,
        })
    }

    fn decode_timestamp(&self, data: &[u8]) -> Option<ClockTime> {
        if data.len() < Self::TIMESTAMP_LEN {
            return None;
        }
        let s = Self::SECONDS;
        let n = Self::NANOS;
        let seconds = u32::from_be_bytes([data[s], data[s + 1], data[s + 2], data[s + 3]]);
        let nanoseconds = i32::from_be_bytes([data[n], data[n + 1], data[n + 2], data[n + 3]]);
        Some(ClockTime::new(i64::from(seconds), i64::from(nanoseconds)))
    }

    fn encode_delay_request(&self, sequence: u16) -> Vec<u8> {
        let mut buf = vec![0u8; Self::DELAY_REQ_LEN];
        buf[..SubdomainName::WIRE_LEN].copy_from_slice(self.subdomain.as_bytes());
        buf[Self::MESSAGE_TYPE] = message_type::DELAY_REQ;
        buf[Self::SEQUENCE..Self::SEQUENCE + 2].copy_from_slice(&sequence.to_be_bytes());
        buf[Self::CONTROL] = control::DELAY_REQ;
        buf
    }

    fn multicast_group(&self) -> Ipv4Addr {
        multicast::v1_group()
    }

    fn filter(&self) -> Filter {
        Filter::Subdomain(self.subdomain)
    }
}
