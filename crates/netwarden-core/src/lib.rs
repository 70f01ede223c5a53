//! netwarden-core — configuration and small shared helpers.
//!
//! Every other netwarden crate is configured from a single
//! `netwarden.toml` parsed here. All sections are optional; missing
//! values fall back to defaults suitable for a single-host install.

pub mod config;
pub mod time;

pub use config::{
    ConfigError, ConfigWarning, GovernanceConfig, LogConfig, LogFormat, NetwardenConfig,
    PollerConfig, ServerConfig, SnmpConfig, StorageConfig,
};
pub use time::epoch_millis;
