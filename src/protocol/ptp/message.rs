//! Protocol-neutral message model and the codec seam.
//!
//! The legacy (v1) and modern (v2) wire formats differ in every byte
//! offset, but the follower only needs the same handful of fields from
//! each. Codecs decode into a [`PacketHeader`] and the sync engine works
//! on that alone.

use std::net::Ipv4Addr;

use crate::error::PtpError;

use super::timestamp::ClockTime;

/// Message kinds the follower cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Sync (master → follower), carries or announces T1.
    Sync,
    /// Delay request (follower → master).
    DelayReq,
    /// Follow-up (master → follower), carries the precise T1.
    FollowUp,
    /// Delay response (master → follower), carries the master's receive time.
    DelayResp,
    /// Any other wire value (Announce, management, ...).
    Other(u8),
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "Sync"),
            Self::DelayReq => write!(f, "Delay_Req"),
            Self::FollowUp => write!(f, "Follow_Up"),
            Self::DelayResp => write!(f, "Delay_Resp"),
            Self::Other(v) => write!(f, "Other(0x{v:02X})"),
        }
    }
}

/// Legacy subdomain name: 16 bytes, NUL padded.
///
/// Equality is exact 16-byte equality, so `"_DFL"` and `"_DFLTX"` are both
/// different from `"_DFLT"`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubdomainName([u8; SubdomainName::WIRE_LEN]);

impl SubdomainName {
    /// Size of the field on the wire.
    pub const WIRE_LEN: usize = 16;

    /// Longest name that still leaves a terminating NUL.
    pub const MAX_LEN: usize = 15;

    /// The default legacy subdomain.
    pub const DEFAULT: &'static str = "_DFLT";

    /// Validate a configured name: 1 to 15 printable ASCII characters.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidSubdomain`] naming the rejected value.
    pub fn new(name: &str) -> Result<Self, PtpError> {
        let reject = |reason| PtpError::InvalidSubdomain {
            value: name.to_string(),
            reason,
        };
        if name.is_empty() {
            return Err(reject("must not be empty"));
        }
        if !name.is_ascii() {
            return Err(reject("must be ASCII"));
        }
        if name.len() > Self::MAX_LEN {
            return Err(reject("must be at most 15 characters"));
        }
        if !name.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
            return Err(reject("must contain only printable characters"));
        }
        let mut raw = [0u8; Self::WIRE_LEN];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self(raw))
    }

    /// Take the raw field from a packet. Returns `None` if `data` is short.
    #[must_use]
    pub fn from_wire(data: &[u8]) -> Option<Self> {
        let raw: [u8; Self::WIRE_LEN] = data.get(..Self::WIRE_LEN)?.try_into().ok()?;
        Some(Self(raw))
    }

    /// Raw wire bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; Self::WIRE_LEN] {
        &self.0
    }

    /// Printable name: bytes up to the first NUL, lossily decoded.
    #[must_use]
    pub fn name(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(Self::WIRE_LEN);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl std::fmt::Display for SubdomainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

impl std::fmt::Debug for SubdomainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubdomainName({:?})", self.name())
    }
}

/// A domain value seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DomainId {
    /// Legacy named subdomain.
    Subdomain(SubdomainName),
    /// Modern numeric domain (raw byte, may exceed 127).
    Number(u8),
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subdomain(name) => write!(f, "{name}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// The locally configured domain filter. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Accept only this legacy subdomain.
    Subdomain(SubdomainName),
    /// Accept only this modern domain number (0-127).
    Domain(u8),
}

impl Filter {
    /// Whether a received domain value passes the filter.
    #[must_use]
    pub fn accepts(&self, domain: &DomainId) -> bool {
        match (self, domain) {
            (Self::Subdomain(want), DomainId::Subdomain(got)) => want == got,
            (Self::Domain(want), DomainId::Number(got)) => want == got,
            _ => false,
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subdomain(name) => write!(f, "{name}"),
            Self::Domain(n) => write!(f, "{n}"),
        }
    }
}

/// Identity of the sending clock.
///
/// Opaque: only equality matters. Built by the codecs from protocol
/// specific bytes, e.g. `00-1d-c1-ff-fe-12-34-56:0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceIdentity(String);

impl SourceIdentity {
    /// Format raw identity bytes as hyphenated lowercase hex plus a port suffix.
    #[must_use]
    pub fn from_parts(id: &[u8], port: u16) -> Self {
        let hex: Vec<String> = id.iter().map(|b| format!("{b:02x}")).collect();
        Self(format!("{}:{port}", hex.join("-")))
    }

    /// The identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields common to both generations, decoded from a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    /// Message type.
    pub message_type: MessageType,
    /// Domain or subdomain the packet belongs to.
    pub domain: DomainId,
    /// Sender identity.
    pub source: SourceIdentity,
    /// Sequence ID.
    pub sequence: u16,
    /// Control field (legacy byte 28, modern byte 32).
    pub control: u8,
    /// Two-step flag: a Follow_Up carries the precise origin time.
    pub two_step: bool,
}

/// One PTP wire generation.
///
/// Every decode is bounds-checked and returns `None` on short or foreign
/// input. Nothing in a codec may panic on network data.
pub trait PtpCodec: Send + Sync + 'static {
    /// Decode the header fields. Needs at least the header-only length.
    fn decode_header(&self, data: &[u8]) -> Option<PacketHeader>;

    /// Decode the body timestamp of a Sync, Follow_Up or Delay_Resp.
    fn decode_timestamp(&self, data: &[u8]) -> Option<ClockTime>;

    /// Build a Delay_Req with the given sequence ID.
    fn encode_delay_request(&self, sequence: u16) -> Vec<u8>;

    /// Multicast group used for this codec's configured domain.
    fn multicast_group(&self) -> Ipv4Addr;

    /// The configured filter.
    fn filter(&self) -> Filter;

    /// Whether a decoded header belongs to the configured domain.
    fn matches_filter(&self, header: &PacketHeader) -> bool {
        self.filter().accepts(&header.domain)
    }
}
