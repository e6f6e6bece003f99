//! Modern (IEEE 1588-2008 style) codec.
//!
//! Fields are read at fixed offsets whatever the declared message length:
//!
//! ```text
//!  0      message type (low nibble: Sync=0x0, Delay_Req=0x1, Follow_Up=0x8, Delay_Resp=0x9)
//!  1      version (must be exactly 2)
//!  2..4   message length (u16 BE)
//!  4      domain number
//!  6..8   flags (u16 BE, 0x0200 = two-step)
//!  20..28 clock identity
//!  30..32 sequence ID (u16 BE)
//!  32     control
//!  34..40 seconds (48-bit BE)
//!  40..44 nanoseconds (u32 BE)
//! ```
//!
//! Only the 8-byte clock identity is read from the source port identity;
//! the 2-byte port number that follows it is not part of the follower's
//! identity and is always rendered as `:0`.

use std::net::Ipv4Addr;

use super::message::{DomainId, Filter, MessageType, PacketHeader, PtpCodec, SourceIdentity};
use super::multicast;
use super::timestamp::ClockTime;

/// Codec for the modern wire format, filtering on one domain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModernCodec {
    domain: u8,
}

impl ModernCodec {
    /// Header-only packet length.
    pub const HEADER_LEN: usize = 32;
    /// Length of a packet carrying a timestamp.
    pub const TIMESTAMP_LEN: usize = 44;
    /// Length of an encoded Delay_Req.
    pub const DELAY_REQ_LEN: usize = 52;
    /// PTP version this codec speaks.
    pub const VERSION: u8 = 2;
    /// Two-step flag.
    pub const FLAG_TWO_STEP: u16 = 0x0200;
    /// Highest configurable domain.
    pub const MAX_DOMAIN: u8 = 127;

    /// Create a codec for `domain`. Domains above 127 fall back to 0.
    #[must_use]
    pub fn new(domain: u8) -> Self {
        Self {
            domain: if domain > Self::MAX_DOMAIN { 0 } else { domain },
        }
    }

    /// The configured domain.
    #[must_use]
    pub fn domain(&self) -> u8 {
        self.domain
    }

    fn message_type(nibble: u8) -> MessageType {
        match nibble & 0x0F {
            0x0 => MessageType::Sync,
            0x1 => MessageType::DelayReq,
            0x8 => MessageType::FollowUp,
            0x9 => MessageType::DelayResp,
            other => MessageType::Other(other),
        }
    }
}

impl PtpCodec for ModernCodec {
    fn decode_header(&self, data: &[u8]) -> Option<PacketHeader> {
        if data.len() < Self::HEADER_LEN || data[1] != Self::VERSION {
            return None;
        }
        Some(PacketHeader {
            message_type: Self::message_type(data[0]),
            domain: DomainId::Number(data[4]),
            source: SourceIdentity::from_parts(&data[20..28], 0),
            sequence: u16::from_be_bytes([data[30], data[31]]),
            control: data.get(32).copied().unwrap_or(0),
            two_step: u16::from_be_bytes([data[6], data[7]]) & Self::FLAG_TWO_STEP != 0,
        })
    }

    fn decode_timestamp(&self, data: &[u8]) -> Option<ClockTime> {
        if data.len() < Self::TIMESTAMP_LEN {
            return None;
        }
        let high = u64::from(u16::from_be_bytes([data[34], data[35]]));
        let low = u64::from(u32::from_be_bytes([data[36], data[37], data[38], data[39]]));
        let seconds = (high << 32) | low;
        let nanoseconds = u32::from_be_bytes([data[40], data[41], data[42], data[43]]);
        #[allow(
            clippy::cast_possible_wrap,
            reason = "48-bit seconds always fit in i64"
        )]
        Some(ClockTime::new(seconds as i64, i64::from(nanoseconds)))
    }

    fn encode_delay_request(&self, sequence: u16) -> Vec<u8> {
        let mut buf = vec![0u8; Self::DELAY_REQ_LEN];
        buf[0] = 0x01;
        buf[1] = Self::VERSION;
        #[allow(
            clippy::cast_possible_truncation,
            reason = "DELAY_REQ_LEN is a small constant"
        )]
        buf[2..4].copy_from_slice(&(Self::DELAY_REQ_LEN as u16).to_be_bytes());
        // Masters on non-zero domains ignore requests for another domain.
        buf[4] = self.domain;
        buf[30..32].copy_from_slice(&sequence.to_be_bytes());
        buf
    }

    fn multicast_group(&self) -> Ipv4Addr {
        multicast::v2_group(self.domain)
    }

    fn filter(&self) -> Filter {
        Filter::Domain(self.domain)
    }
}
