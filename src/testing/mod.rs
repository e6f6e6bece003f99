//! Testing utilities
//!
//! An in-memory [`PtpChannel`](crate::net::PtpChannel) and a packet
//! builder for both wire generations, so a follower can be driven end to
//! end without binding privileged ports.

pub mod mock_channel;
pub mod packets;

#[cfg(test)]
/// Unit tests for the testing helpers.
pub mod tests;

pub use mock_channel::{MockChannel, MockPeer};
pub use packets::PacketBuilder;
