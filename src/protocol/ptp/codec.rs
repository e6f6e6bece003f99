//! Runtime selection between the two wire generations.

use std::net::Ipv4Addr;

use super::message::{Filter, PacketHeader, PtpCodec};
use super::timestamp::ClockTime;
use super::v1::LegacyCodec;
use super::v2::ModernCodec;

/// Either codec, chosen once from configuration and never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolCodec {
    /// Legacy fixed-format protocol.
    V1(LegacyCodec),
    /// Modern protocol.
    V2(ModernCodec),
}

impl ProtocolCodec {
    /// Build the codec matching a validated filter.
    #[must_use]
    pub fn for_filter(filter: Filter) -> Self {
        match filter {
            Filter::Subdomain(name) => Self::V1(LegacyCodec::new(name)),
            Filter::Domain(domain) => Self::V2(ModernCodec::new(domain)),
        }
    }
}

impl PtpCodec for ProtocolCodec {
    fn decode_header(&self, data: &[u8]) -> Option<PacketHeader> {
        match self {
            Self::V1(c) => c.decode_header(data),
            Self::V2(c) => c.decode_header(data),
        }
    }

    fn decode_timestamp(&self, data: &[u8]) -> Option<ClockTime> {
        match self {
            Self::V1(c) => c.decode_timestamp(data),
            Self::V2(c) => c.decode_timestamp(data),
        }
    }

    fn encode_delay_request(&self, sequence: u16) -> Vec<u8> {
        match self {
            Self::V1(c) => c.encode_delay_request(sequence),
            Self::V2(c) => c.encode_delay_request(sequence),
        }
    }

    fn multicast_group(&self) -> Ipv4Addr {
        match self {
            Self::V1(c) => c.multicast_group(),
            Self::V2(c) => c.multicast_group(),
        }
    }

    fn filter(&self) -> Filter {
        match self {
            Self::V1(c) => c.filter(),
            Self::V2(c) => c.filter(),
        }
    }
}
