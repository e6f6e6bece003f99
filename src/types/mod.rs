//! Configuration types

mod config;


pub use config::{
    ClientConfig, ClientConfigBuilder, ClientSettings, ProtocolVersion, domain_from_setting,
    min_sync_interval_from_setting,
};
