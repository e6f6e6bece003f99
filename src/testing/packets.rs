//! Master-side packet builder for both wire generations

use crate::protocol::ptp::message::{MessageType, SubdomainName};
use crate::protocol::ptp::v1::{LegacyCodec, control, message_type};
use crate::protocol::ptp::v2::ModernCodec;
use crate::types::ProtocolVersion;

/// Builds Sync, `Follow_Up` and `Delay_Resp` packets the way a master
/// would put them on the wire.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    version: ProtocolVersion,
    message_type: MessageType,
    subdomain: [u8; SubdomainName::WIRE_LEN],
    domain: u8,
    identity: [u8; 8],
    port: u16,
    sequence: u16,
    two_step: bool,
    timestamp: Option<(i64, i64)>,
}

impl PacketBuilder {
    /// Legacy packet on the `_DFLT` subdomain.
    #[must_use]
    pub fn v1(message_type: MessageType) -> Self {
        Self::new(ProtocolVersion::V1, message_type)
    }

    /// Modern packet on domain 0.
    #[must_use]
    pub fn v2(message_type: MessageType) -> Self {
        Self::new(ProtocolVersion::V2, message_type)
    }

    fn new(version: ProtocolVersion, message_type: MessageType) -> Self {
        let mut subdomain = [0u8; SubdomainName::WIRE_LEN];
        subdomain[..SubdomainName::DEFAULT.len()].copy_from_slice(SubdomainName::DEFAULT.as_bytes());
        Self {
            version,
            message_type,
            subdomain,
            domain: 0,
            identity: [0x00, 0x1d, 0xc1, 0xff, 0xfe, 0x00, 0x00, 0x01],
            port: 1,
            sequence: 0,
            two_step: false,
            timestamp: None,
        }
    }

    /// Set the legacy subdomain (truncated to 16 bytes, NUL padded).
    #[must_use]
    pub fn subdomain(mut self, name: &str) -> Self {
        self.subdomain = [0u8; SubdomainName::WIRE_LEN];
        let len = name.len().min(SubdomainName::WIRE_LEN);
        self.subdomain[..len].copy_from_slice(&name.as_bytes()[..len]);
        self
    }

    /// Set the modern domain number.
    #[must_use]
    pub fn domain(mut self, domain: u8) -> Self {
        self.domain = domain;
        self
    }

    /// Set the sender identity (v1 uses the first 6 bytes as UUID).
    #[must_use]
    pub fn identity(mut self, identity: [u8; 8]) -> Self {
        self.identity = identity;
        self
    }

    /// Set the sender port (v1 only; part of the legacy identity).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the sequence ID.
    #[must_use]
    pub fn sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set the two-step (v2) / assist (v1) flag.
    #[must_use]
    pub fn two_step(mut self, two_step: bool) -> Self {
        self.two_step = two_step;
        self
    }

    /// Attach a body timestamp.
    #[must_use]
    pub fn timestamp(mut self, seconds: i64, nanoseconds: i64) -> Self {
        self.timestamp = Some((seconds, nanoseconds));
        self
    }

    /// Encode the packet.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        match self.version {
            ProtocolVersion::V1 => self.build_v1(),
            ProtocolVersion::V2 => self.build_v2(),
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "test packets carry whatever bits the caller asks for"
    )]
    fn build_v1(&self) -> Vec<u8> {
        let len = if self.timestamp.is_some() {
            LegacyCodec::TIMESTAMP_LEN
        } else {
            LegacyCodec::HEADER_LEN
        };
        let mut buf = vec![0u8; len];
        buf[..16].copy_from_slice(&self.subdomain);
        let (kind, ctrl) = match self.message_type {
            MessageType::Sync => (message_type::SYNC, control::SYNC),
            MessageType::DelayReq => (message_type::DELAY_REQ, control::DELAY_REQ),
            MessageType::FollowUp => (message_type::FOLLOW_UP, control::FOLLOW_UP),
            MessageType::DelayResp => (message_type::DELAY_RESP, control::DELAY_RESP),
            MessageType::Other(v) => (v, 0xFF),
        };
        buf[16] = kind;
        buf[18..24].copy_from_slice(&self.identity[..6]);
        buf[24..26].copy_from_slice(&self.port.to_be_bytes());
        buf[26..28].copy_from_slice(&self.sequence.to_be_bytes());
        buf[28] = ctrl;
        let flags: u16 = if self.two_step { LegacyCodec::FLAG_ASSIST } else { 0 };
        buf[30..32].copy_from_slice(&flags.to_be_bytes());
        if let Some((seconds, nanoseconds)) = self.timestamp {
            buf[32..36].copy_from_slice(&(seconds as u32).to_be_bytes());
            buf[36..40].copy_from_slice(&(nanoseconds as i32).to_be_bytes());
        }
        buf
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "test packets carry whatever bits the caller asks for"
    )]
    fn build_v2(&self) -> Vec<u8> {
        let len = if self.timestamp.is_some() {
            ModernCodec::TIMESTAMP_LEN
        } else {
            34
        };
        let mut buf = vec![0u8; len];
        let (kind, ctrl) = match self.message_type {
            MessageType::Sync => (0x0, 0x00),
            MessageType::DelayReq => (0x1, 0x01),
            MessageType::FollowUp => (0x8, 0x02),
            MessageType::DelayResp => (0x9, 0x03),
            MessageType::Other(v) => (v & 0x0F, 0x05),
        };
        buf[0] = kind;
        buf[1] = ModernCodec::VERSION;
        buf[2..4].copy_from_slice(&(len as u16).to_be_bytes());
        buf[4] = self.domain;
        let flags: u16 = if self.two_step { ModernCodec::FLAG_TWO_STEP } else { 0 };
        buf[6..8].copy_from_slice(&flags.to_be_bytes());
        buf[20..28].copy_from_slice(&self.identity);
        buf[28..30].copy_from_slice(&self.port.to_be_bytes());
        buf[30..32].copy_from_slice(&self.sequence.to_be_bytes());
        buf[32] = ctrl;
        if let Some((seconds, nanoseconds)) = self.timestamp {
            let seconds = (seconds as u64).to_be_bytes();
            buf[34..40].copy_from_slice(&seconds[2..8]);
            buf[40..44].copy_from_slice(&(nanoseconds as u32).to_be_bytes());
        }
        buf
    }
}
