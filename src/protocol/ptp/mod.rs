//! Precision Time Protocol (PTP, IEEE 1588) follower.
//!
//! Follows an external master in either wire generation: the legacy
//! fixed-format protocol (v1, filtered by subdomain name) or the modern
//! protocol (v2, filtered by domain number). Both run through the same
//! [`SyncEngine`], parameterized over a [`PtpCodec`].
//!
//! ## Standard PTP Ports
//!
//! - **319**: Event messages (Sync, `Delay_Req`).
//! - **320**: General messages (`Follow_Up`, `Delay_Resp`).
//!
//! ## Offset
//!
//! ```text
//! delta  = ((ts1 - t1) - (ts2 - t2)) / 2
//! offset = offset + delta
//! now    = raw - offset
//! ```

pub mod clock;
pub mod codec;
pub mod engine;
pub mod handler;
pub mod message;
pub mod multicast;
pub mod registry;
pub mod timestamp;
pub mod v1;
pub mod v2;

#[cfg(test)]
mod tests;

// Re-exports for convenient access.
pub use clock::{LocalClock, ManualTimeSource, SystemTimeSource, TimeSource};
pub use codec::ProtocolCodec;
pub use engine::{EngineAction, LastSync, MasterRecord, SyncEngine, SyncSession};
pub use handler::{PtpClient, SharedSyncEngine};
pub use message::{DomainId, Filter, MessageType, PacketHeader, PtpCodec, SourceIdentity, SubdomainName};
pub use registry::DomainRegistry;
pub use timestamp::ClockTime;
pub use v1::LegacyCodec;
pub use v2::ModernCodec;
