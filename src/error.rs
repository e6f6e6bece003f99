use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Errors raised by the PTP follower.
///
/// Only configuration problems are fatal. Malformed packets never produce
/// an error value; they are dropped by the codecs.
#[derive(Debug, Error)]
pub enum PtpError {
    // ===== Configuration Errors =====
    /// Local interface is not a dotted-quad IPv4 address
    #[error("invalid interface address {value:?}: expected a dotted-quad IPv4 address")]
    InvalidInterface {
        /// The rejected value
        value: String,
    },

    /// Legacy subdomain name failed validation
    #[error("invalid subdomain {value:?}: {reason}")]
    InvalidSubdomain {
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Configuration could not be parsed
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the failure
        message: String,
    },

    // ===== Transport Errors =====
    /// Binding a channel failed
    #[error("failed to bind port {port} on {interface}: {source}")]
    Bind {
        /// Local interface
        interface: Ipv4Addr,
        /// Port that could not be bound
        port: u16,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Joining a multicast group failed
    #[error("failed to join multicast group {group}: {source}")]
    Multicast {
        /// Group address
        group: Ipv4Addr,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Sending a datagram failed
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
}

impl PtpError {
    /// Whether this error rejects construction (as opposed to a runtime
    /// transport failure reported through events).
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInterface { .. } | Self::InvalidSubdomain { .. } | Self::InvalidConfig { .. }
        )
    }
}

impl From<serde_json::Error> for PtpError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig {
            message: err.to_string(),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PtpError>;
