//! # ptp-follower
//!
//! A PTP (IEEE 1588) follower clock for time-aware devices.
//!
//! ## Features
//!
//! - Legacy (v1) and modern (v2) wire codecs
//! - Multicast group addressing per protocol generation
//! - Two-step and one-step masters
//! - Lock tracking with a timeout, master change and domain discovery events
//!
//! ## Example
//!
//! ```rust,no_run
//! use ptp_follower::{ClientConfig, PtpClient, SyncEvent};
//!
//! # async fn example() -> Result<(), ptp_follower::PtpError> {
//! let config = ClientConfig::builder().interface("0.0.0.0").v2(0.0).build();
//! let client = PtpClient::start(&config)?;
//! let mut events = client.subscribe();
//!
//! while let Ok(event) = events.recv().await {
//!     if let SyncEvent::LockChanged { locked: true } = event {
//!         println!("locked, time is {}", client.now().await);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Driver**: `PtpClient` - owns the channels and the lock timer
//! - **State machine**: `SyncEngine` - generic over a `PtpCodec`
//! - **Wire**: `LegacyCodec`, `ModernCodec` and the multicast resolver

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Follower events
pub mod state;
/// Configuration types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod net;
pub mod protocol;

// Re-exports
pub use error::PtpError;
pub use protocol::ptp::{ClockTime, DomainId, Filter, MasterRecord, PtpClient, SourceIdentity};
pub use state::{EventBus, EventFilter, SyncEvent};
pub use types::{ClientConfig, ClientSettings, ProtocolVersion};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        ClientConfig, ClockTime, DomainId, Filter, ProtocolVersion, PtpClient, PtpError, SyncEvent,
    };
}
