//! Configuration Module
//!
//! Session settings and environment loading for the binary.

mod settings;

pub use settings::{ConfigError, DEFAULT_METRICS_PORT, MonitorConfig, ProxySettings, SessionConfig};
