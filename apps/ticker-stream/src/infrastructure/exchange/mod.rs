//! Exchange Adapters
//!
//! WebSocket clients for the supported venues:
//!
//! - **OKX**: v5 public `tickers` channel, JSON `ping` heartbeats
//! - **Binance**: futures `@ticker` streams, transport-level ping heartbeats
//!
//! Venue-specific wire handling lives in the adapters; connection management
//! (heartbeat, reconnect, proxy tunnelling) is shared.

pub mod binance;
pub mod heartbeat;
pub mod messages;
pub mod okx;
pub mod reconnect;
pub mod supervisor;
pub mod transport;

use std::sync::Arc;

use crate::application::ports::ExchangeAdapter;
use crate::domain::session::Venue;
use crate::domain::ticker::InstrumentId;

pub use binance::{BINANCE_FUTURES_ENDPOINT, BinanceAdapter, normalize_symbol};
pub use heartbeat::{HeartbeatConfig, Liveness, LivenessMonitor};
pub use okx::{OKX_PUBLIC_ENDPOINT, OkxAdapter};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use supervisor::{FeedError, FeedSupervisor};
pub use transport::{DEFAULT_CONNECT_TIMEOUT, WebSocketTransport};

/// Build the adapter for `venue`.
#[must_use]
pub fn adapter_for(venue: Venue, instruments: Vec<InstrumentId>) -> Arc<dyn ExchangeAdapter> {
    match venue {
        Venue::Okx => Arc::new(OkxAdapter::new(instruments)),
        Venue::Binance => Arc::new(BinanceAdapter::new(instruments)),
    }
}
