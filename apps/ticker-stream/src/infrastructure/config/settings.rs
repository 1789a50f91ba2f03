//! Session Configuration Settings
//!
//! [`SessionConfig`] is what a caller hands to `start_session`. The binary
//! builds a [`MonitorConfig`] (venue, instruments, session settings, metrics
//! port) from environment variables.

use std::fmt;
use std::time::Duration;

use crate::domain::history::DEFAULT_HISTORY_CAPACITY;
use crate::domain::session::{UnknownVenueError, Venue};
use crate::domain::ticker::InstrumentId;
use crate::infrastructure::exchange::heartbeat::{
    DEFAULT_DEAD_LINK_THRESHOLD, DEFAULT_RECEIVE_TIMEOUT, HeartbeatConfig,
};
use crate::infrastructure::exchange::reconnect::ReconnectConfig;
use crate::infrastructure::exchange::transport::DEFAULT_CONNECT_TIMEOUT;

/// HTTP CONNECT proxy address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

impl fmt::Display for ProxySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Settings for one venue session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Endpoint override; the adapter's default is used when `None`.
    pub endpoint: Option<String>,
    /// HTTP CONNECT proxy, if any.
    pub proxy: Option<ProxySettings>,
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Silence before a heartbeat probe.
    pub receive_timeout: Duration,
    /// Silence before the connection is abandoned.
    pub dead_link_threshold: Duration,
    /// Delay policy between connection epochs.
    pub reconnect: ReconnectConfig,
    /// Points kept per instrument.
    pub history_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            proxy: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            dead_link_threshold: DEFAULT_DEAD_LINK_THRESHOLD,
            reconnect: ReconnectConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Override the venue endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Route connections through an HTTP CONNECT proxy.
    #[must_use]
    pub fn with_proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy = Some(ProxySettings {
            host: host.into(),
            port,
        });
        self
    }

    /// Use a fixed reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect = ReconnectConfig::fixed(delay);
        self
    }

    /// Set the per-instrument history capacity.
    #[must_use]
    pub const fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Liveness settings derived from this configuration.
    #[must_use]
    pub const fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig::new(self.receive_timeout, self.dead_link_threshold)
    }

    /// Check the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero timeout, a dead-link threshold not
    /// above the receive timeout, a zero history capacity, a reconnect
    /// multiplier below 1, or a jitter factor outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("receive_timeout", self.receive_timeout),
            ("dead_link_threshold", self.dead_link_threshold),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }

        if self.dead_link_threshold <= self.receive_timeout {
            return Err(ConfigError::DeadLinkNotAboveReceiveTimeout {
                receive_timeout: self.receive_timeout,
                dead_link_threshold: self.dead_link_threshold,
            });
        }

        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }

        let reconnect = &self.reconnect;
        if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "reconnect.multiplier".to_string(),
                value: reconnect.multiplier.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&reconnect.jitter_factor) {
            return Err(ConfigError::InvalidValue {
                key: "reconnect.jitter_factor".to_string(),
                value: reconnect.jitter_factor.to_string(),
            });
        }

        Ok(())
    }
}

// =============================================================================
// Monitor Configuration (binary)
// =============================================================================

/// Default Prometheus listener port (0 disables the listener).
pub const DEFAULT_METRICS_PORT: u16 = 9091;

/// Everything the `ticker-stream` binary needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Venue to connect to.
    pub venue: Venue,
    /// Instruments to subscribe to.
    pub instruments: Vec<InstrumentId>,
    /// Session settings.
    pub session: SessionConfig,
    /// Prometheus listener port (0 = recorder only).
    pub metrics_port: u16,
}

impl MonitorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `TICKER_INSTRUMENTS` is missing or empty, a value
    /// cannot be parsed, or the resulting session settings are invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = EnvReader { lookup };

        let venue = env
            .get("TICKER_VENUE")
            .map(|v| v.parse::<Venue>())
            .transpose()?
            .unwrap_or(Venue::Okx);

        let raw_instruments = env
            .get("TICKER_INSTRUMENTS")
            .ok_or_else(|| ConfigError::MissingEnvVar("TICKER_INSTRUMENTS".to_string()))?;
        let instruments: Vec<InstrumentId> = raw_instruments
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(InstrumentId::from)
            .collect();
        if instruments.is_empty() {
            return Err(ConfigError::EmptyValue("TICKER_INSTRUMENTS".to_string()));
        }

        let proxy = match (env.get("TICKER_PROXY_HOST"), env.get("TICKER_PROXY_PORT")) {
            (None, None) => None,
            (Some(host), Some(_)) => Some(ProxySettings {
                host,
                port: env.parse("TICKER_PROXY_PORT", 0)?,
            }),
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar("TICKER_PROXY_PORT".to_string()));
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvVar("TICKER_PROXY_HOST".to_string()));
            }
        };

        let defaults = SessionConfig::default();
        let initial_delay = env.secs("TICKER_RECONNECT_DELAY_SECS", defaults.reconnect.initial_delay)?;
        let reconnect = ReconnectConfig {
            initial_delay,
            max_delay: env.secs("TICKER_RECONNECT_MAX_DELAY_SECS", initial_delay)?,
            multiplier: env.parse("TICKER_RECONNECT_MULTIPLIER", defaults.reconnect.multiplier)?,
            jitter_factor: env.parse("TICKER_RECONNECT_JITTER", defaults.reconnect.jitter_factor)?,
            max_attempts: env.parse("TICKER_MAX_RECONNECT_ATTEMPTS", defaults.reconnect.max_attempts)?,
        };

        let session = SessionConfig {
            endpoint: env.get("TICKER_ENDPOINT"),
            proxy,
            connect_timeout: env.secs("TICKER_CONNECT_TIMEOUT_SECS", defaults.connect_timeout)?,
            receive_timeout: env.secs("TICKER_RECEIVE_TIMEOUT_SECS", defaults.receive_timeout)?,
            dead_link_threshold: env.secs("TICKER_DEAD_LINK_SECS", defaults.dead_link_threshold)?,
            reconnect,
            history_capacity: env.parse("TICKER_HISTORY_CAPACITY", defaults.history_capacity)?,
        };
        session.validate()?;

        Ok(Self {
            venue,
            instruments,
            session,
            metrics_port: env.parse("TICKER_METRICS_PORT", DEFAULT_METRICS_PORT)?,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// A value could not be parsed or is out of range.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Setting name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// Venue name not recognized.
    #[error(transparent)]
    UnknownVenue(#[from] UnknownVenueError),
    /// A timeout was zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    /// The dead-link threshold would fire before the first probe.
    #[error(
        "dead-link threshold ({dead_link_threshold:?}) must exceed the receive timeout ({receive_timeout:?})"
    )]
    DeadLinkNotAboveReceiveTimeout {
        /// Configured receive timeout.
        receive_timeout: Duration,
        /// Configured dead-link threshold.
        dead_link_threshold: Duration,
    },
    /// History capacity was zero.
    #[error("history capacity must be at least 1")]
    ZeroHistoryCapacity,
}

/// Typed access to string settings; blank values count as unset.
struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        }
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                }),
        }
    }
}
