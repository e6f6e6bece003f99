//! Follower events

mod events;

pub use events::{EventBus, EventFilter, SyncEvent};
