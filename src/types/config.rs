use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PtpError, Result};
use crate::net::{PTP_EVENT_PORT, PTP_GENERAL_PORT};
use crate::protocol::ptp::engine::{DEFAULT_MIN_SYNC_INTERVAL, MIN_SYNC_INTERVAL_FLOOR};
use crate::protocol::ptp::message::{Filter, SubdomainName};
use crate::protocol::ptp::v2::ModernCodec;

/// PTP wire generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// Legacy fixed-format protocol, filtered by subdomain name
    V1,
    /// Modern protocol, filtered by domain number
    #[default]
    V2,
}

/// Host-side follower configuration, as entered by the user
///
/// Values are kept raw (numbers as `f64`, the address as text) and only
/// checked by [`ClientConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local interface address, dotted-quad IPv4 (default: `0.0.0.0`)
    pub interface: String,

    /// Protocol generation (default: v2)
    pub protocol: ProtocolVersion,

    /// Legacy subdomain name (default: `_DFLT`)
    pub subdomain: String,

    /// Modern domain number (default: 0)
    pub domain: f64,

    /// Minimum interval between exchanges in milliseconds (default: 10000)
    pub min_sync_interval_ms: f64,

    /// Event port (default: 319)
    pub event_port: u16,

    /// General port (default: 320)
    pub general_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            interface: Ipv4Addr::UNSPECIFIED.to_string(),
            protocol: ProtocolVersion::V2,
            subdomain: SubdomainName::DEFAULT.to_string(),
            domain: 0.0,
            #[allow(clippy::cast_precision_loss)]
            min_sync_interval_ms: DEFAULT_MIN_SYNC_INTERVAL.as_millis() as f64,
            event_port: PTP_EVENT_PORT,
            general_port: PTP_GENERAL_PORT,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidConfig`] if the JSON does not parse.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate into immutable settings.
    ///
    /// The interface must be a dotted-quad IPv4 address and, for v1, the
    /// subdomain must be 1-15 printable ASCII characters. Out-of-range
    /// domains and intervals fall back to defaults instead of failing.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidInterface`] or
    /// [`PtpError::InvalidSubdomain`] naming the offending value.
    pub fn validate(&self) -> Result<ClientSettings> {
        let interface = parse_interface(&self.interface)?;
        let filter = match self.protocol {
            ProtocolVersion::V1 => Filter::Subdomain(SubdomainName::new(&self.subdomain)?),
            ProtocolVersion::V2 => Filter::Domain(domain_from_setting(self.domain)),
        };
        Ok(ClientSettings {
            interface,
            filter,
            min_sync_interval: min_sync_interval_from_setting(self.min_sync_interval_ms),
            event_port: self.event_port,
            general_port: self.general_port,
        })
    }
}

/// Validated, immutable follower settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Local interface
    pub interface: Ipv4Addr,
    /// Domain filter; also selects the protocol generation
    pub filter: Filter,
    /// Minimum interval between exchanges (at least 125 ms)
    pub min_sync_interval: Duration,
    /// Event port
    pub event_port: u16,
    /// General port
    pub general_port: u16,
}

impl ClientSettings {
    /// Protocol generation implied by the filter
    #[must_use]
    pub fn protocol(&self) -> ProtocolVersion {
        match self.filter {
            Filter::Subdomain(_) => ProtocolVersion::V1,
            Filter::Domain(_) => ProtocolVersion::V2,
        }
    }
}

fn parse_interface(value: &str) -> Result<Ipv4Addr> {
    value.parse().map_err(|_| PtpError::InvalidInterface {
        value: value.to_string(),
    })
}

/// Domain setting: rounded, and anything outside 0-127 becomes 0.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "range checked before the cast"
)]
pub fn domain_from_setting(value: f64) -> u8 {
    let rounded = value.round();
    if (0.0..=f64::from(ModernCodec::MAX_DOMAIN)).contains(&rounded) {
        rounded as u8
    } else {
        0
    }
}

/// Minimum interval setting: values below 125 ms keep the 10 s default.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "checked finite and >= 125 before the cast"
)]
pub fn min_sync_interval_from_setting(millis: f64) -> Duration {
    #[allow(clippy::cast_precision_loss)]
    let floor = MIN_SYNC_INTERVAL_FLOOR.as_millis() as f64;
    if millis.is_finite() && millis >= floor {
        Duration::from_millis(millis.round() as u64)
    } else {
        DEFAULT_MIN_SYNC_INTERVAL
    }
}

/// Builder for `ClientConfig`
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set local interface address
    #[must_use]
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.config.interface = interface.into();
        self
    }

    /// Use the legacy protocol with this subdomain
    #[must_use]
    pub fn v1(mut self, subdomain: impl Into<String>) -> Self {
        self.config.protocol = ProtocolVersion::V1;
        self.config.subdomain = subdomain.into();
        self
    }

    /// Use the modern protocol with this domain
    #[must_use]
    pub fn v2(mut self, domain: f64) -> Self {
        self.config.protocol = ProtocolVersion::V2;
        self.config.domain = domain;
        self
    }

    /// Set minimum sync interval in milliseconds
    #[must_use]
    pub fn min_sync_interval_ms(mut self, millis: f64) -> Self {
        self.config.min_sync_interval_ms = millis;
        self
    }

    /// Set event and general ports
    #[must_use]
    pub fn ports(mut self, event: u16, general: u16) -> Self {
        self.config.event_port = event;
        self.config.general_port = general;
        self
    }

    /// Build the config
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
