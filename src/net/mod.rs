//! Network abstraction layer
//!
//! The follower talks to the network only through [`PtpChannel`], so the
//! transport can be swapped (see `crate::testing::MockChannel`).

mod tokio_impl;
mod traits;


pub use tokio_impl::UdpChannel;
pub use traits::PtpChannel;

/// Standard PTP event port (Sync, `Delay_Req`).
pub const PTP_EVENT_PORT: u16 = 319;

/// Standard PTP general port (`Follow_Up`, `Delay_Resp`).
pub const PTP_GENERAL_PORT: u16 = 320;
