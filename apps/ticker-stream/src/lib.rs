#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Ticker Stream - Exchange Ticker Ingestion
//!
//! Maintains a live WebSocket session to a crypto derivatives venue (OKX or
//! Binance), subscribes to ticker updates for a set of instruments, and
//! hands consumers formatted display updates, per-instrument price history,
//! and a traffic counter.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core ticker logic and data types
//!   - `ticker`: Canonical ticker model and field validation
//!   - `derived`: Price formatting, change percent, classification
//!   - `history`: Bounded price history and traffic accumulation
//!   - `session`: Venue, connection state, per-session state
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Exchange adapter, transport, and listener interfaces
//!   - `services`: Session start, stop, and observation
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `exchange`: OKX/Binance adapters, WebSocket transport, supervisor
//!   - `config`: Session settings and environment loading
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing subscriber and OpenTelemetry export
//!
//! # Data Flow
//!
//! ```text
//! Venue WS ──► Transport ──► Adapter ──► Supervisor ──► SessionListener
//!   (frames)                 (parse)     (history,       (DisplayUpdate,
//!                                         liveness)        traffic)
//!                                            │
//!                                            └──► watch ──► SessionHandle
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core ticker types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::derived::{Classification, DisplayUpdate};
pub use domain::history::{PriceHistoryBuffer, PricePoint, TrafficAccumulator, TrafficReadout};
pub use domain::session::{ConnectionState, Venue, VenueSession};
pub use domain::ticker::{CanonicalTicker, InstrumentId, MalformedTickerError};

// Ports
pub use application::ports::{
    Connection, ExchangeAdapter, FrameError, InboundFrame, OutboundFrame, SessionListener,
    Transport, TransportError,
};

// Session service
pub use application::services::{
    Callbacks, SessionError, SessionHandle, start_session, start_session_with_transport,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, MonitorConfig, ProxySettings, SessionConfig};

// Exchange
pub use infrastructure::exchange::{ReconnectConfig, WebSocketTransport};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
