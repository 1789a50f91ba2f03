//! Port Interfaces
//!
//! Defines the interfaces (ports) the session supervisor drives, following
//! the Hexagonal Architecture pattern. Infrastructure adapters implement
//! them; tests substitute in-memory versions.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`ExchangeAdapter`]: venue protocol (subscribe, heartbeat, parse)
//! - [`Transport`] / [`Connection`]: a framed, bidirectional byte stream
//! - [`SessionListener`]: the consumer receiving display updates

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::derived::DisplayUpdate;
use crate::domain::session::{ConnectionState, Venue};
use crate::domain::ticker::{CanonicalTicker, InstrumentId, MalformedTickerError};

// =============================================================================
// Frames
// =============================================================================

/// A frame received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 data frame.
    Text(String),
    /// Binary data frame.
    Binary(Vec<u8>),
    /// Transport-level ping; the supervisor answers with a pong.
    Ping(Vec<u8>),
    /// Transport-level pong.
    Pong,
}

impl InboundFrame {
    /// Byte length of a data frame; `None` for control frames.
    #[must_use]
    pub fn data_len(&self) -> Option<usize> {
        match self {
            Self::Text(text) => Some(text.len()),
            Self::Binary(bytes) => Some(bytes.len()),
            Self::Ping(_) | Self::Pong => None,
        }
    }
}

/// A frame to send over the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// UTF-8 data frame.
    Text(String),
    /// Transport-level ping.
    Ping,
    /// Transport-level pong echoing a ping payload.
    Pong(Vec<u8>),
}

/// Non-ticker frames an adapter recognizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    /// Reply to a heartbeat probe.
    Heartbeat,
    /// Venue acknowledged the subscription.
    SubscriptionAck,
    /// Venue reported an error.
    Error {
        /// Venue error code, if any.
        code: Option<String>,
        /// Venue error message.
        message: String,
    },
}

/// Result of parsing one inbound data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFrame {
    /// A validated ticker for a subscribed instrument.
    Ticker(CanonicalTicker),
    /// A protocol control message.
    Control(ControlSignal),
    /// A well-formed frame carrying nothing of interest.
    Empty,
}

// =============================================================================
// Errors
// =============================================================================

/// A data frame could not be turned into a ticker or control signal.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// JSON encoding or decoding failed, or the payload did not match the
    /// venue shape.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary payload was not valid UTF-8.
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,

    /// Ticker fields failed validation.
    #[error(transparent)]
    MalformedTicker(#[from] MalformedTickerError),

    /// Ticker refers to an instrument this session did not subscribe to.
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),
}

impl FrameError {
    /// Short reason used as a metric label.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::NotUtf8 => "not_utf8",
            Self::MalformedTicker(_) => "malformed_ticker",
            Self::UnknownInstrument(_) => "unknown_instrument",
        }
    }

    /// Whether the frame should be dropped without a warning.
    #[must_use]
    pub const fn is_silent(&self) -> bool {
        matches!(self, Self::UnknownInstrument(_))
    }
}

/// Transport failures. All of them end the current connection epoch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not establish the connection.
    #[error("connect to {endpoint} failed: {reason}")]
    Connect {
        /// Endpoint being dialled.
        endpoint: String,
        /// Underlying cause.
        reason: String,
    },

    /// The HTTP CONNECT proxy refused or broke the tunnel.
    #[error("proxy error: {0}")]
    Proxy(String),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// The peer closed the connection.
    #[error("connection closed by peer{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),
}

// =============================================================================
// Exchange Adapter
// =============================================================================

/// Venue protocol: how to subscribe, probe liveness, and read frames.
///
/// One implementation per venue. Adapters are pure: they never touch the
/// network, so every method is synchronous.
pub trait ExchangeAdapter: Send + Sync {
    /// Venue this adapter speaks for.
    fn venue(&self) -> Venue;

    /// Endpoint used when the configuration supplies none.
    fn default_endpoint(&self) -> &str;

    /// Instruments the adapter subscribes to.
    fn instruments(&self) -> &[InstrumentId];

    /// Frames sent right after connecting.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Json`] if the request cannot be encoded.
    fn build_subscription(&self) -> Result<Vec<OutboundFrame>, FrameError>;

    /// Liveness probe sent after a silent receive timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Json`] if the probe cannot be encoded.
    fn heartbeat(&self) -> Result<OutboundFrame, FrameError>;

    /// Interpret one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] if the frame cannot be decoded, carries an
    /// invalid ticker, or names an instrument outside the subscribed set.
    fn parse_frame(&self, raw: &str, observed_at: DateTime<Utc>)
    -> Result<ParsedFrame, FrameError>;
}

// =============================================================================
// Transport
// =============================================================================

/// Opens framed connections to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the connection (or proxy tunnel) cannot
    /// be established.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open connection.
#[async_trait]
pub trait Connection: Send {
    /// Send a frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if the frame could not be written.
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError>;

    /// Receive the next frame.
    ///
    /// Must be cancel-safe: the supervisor races it against timers.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the peer closes, and
    /// [`TransportError::Receive`] on read failures.
    async fn recv(&mut self) -> Result<InboundFrame, TransportError>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the close handshake fails.
    async fn close(&mut self) -> Result<(), TransportError>;
}

// =============================================================================
// Session Listener
// =============================================================================

/// Consumer of a session's output.
///
/// Called on the session task, in arrival order. Implementations must return
/// quickly; hand heavy work off to another task.
pub trait SessionListener: Send + Sync + 'static {
    /// A ticker was accepted and annotated.
    fn on_update(&self, update: DisplayUpdate);

    /// Total bytes received so far, after every data frame.
    fn on_traffic(&self, _total_bytes: u64) {}

    /// The connection state changed.
    fn on_state(&self, _state: ConnectionState) {}
}

impl<L: SessionListener + ?Sized> SessionListener for Arc<L> {
    fn on_update(&self, update: DisplayUpdate) {
        (**self).on_update(update);
    }

    fn on_traffic(&self, total_bytes: u64) {
        (**self).on_traffic(total_bytes);
    }

    fn on_state(&self, state: ConnectionState) {
        (**self).on_state(state);
    }
}
