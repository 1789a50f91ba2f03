//! Venue Session State
//!
//! The per-session aggregate: connection state, liveness timestamp, traffic
//! counter, and one bounded price history per subscribed instrument.
//!
//! # Ownership
//!
//! A [`VenueSession`] is mutated only by the task that runs the session.
//! Consumers observe cloned snapshots published through a watch channel, so
//! no locking is involved.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::history::{PriceHistoryBuffer, TrafficAccumulator};
use crate::domain::ticker::{CanonicalTicker, InstrumentId};

// =============================================================================
// Venue
// =============================================================================

/// Exchange whose push feed a session consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// OKX public WebSocket (`tickers` channel).
    Okx,
    /// Binance futures WebSocket (`@ticker` streams).
    Binance,
}

impl Venue {
    /// Lower-case venue name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Okx => "okx",
            Self::Binance => "binance",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A venue name did not match any supported exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown venue `{0}` (expected `okx` or `binance`)")]
pub struct UnknownVenueError(pub String);

impl FromStr for Venue {
    type Err = UnknownVenueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "okx" | "a" => Ok(Self::Okx),
            "binance" | "b" => Ok(Self::Binance),
            other => Err(UnknownVenueError(other.to_string())),
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of a session's connection.
///
/// ```text
/// Disconnected ──▶ Connecting ──▶ Subscribed ◀──▶ Degraded
///      ▲                              │               │
///      └──────────────────────────────┴───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ConnectionState {
    /// No connection; waiting to (re)connect or stopped.
    #[default]
    Disconnected,
    /// Transport connect in progress.
    Connecting,
    /// Connected and subscribed; frames are flowing.
    Subscribed,
    /// Connected but silent; a heartbeat probe is outstanding.
    Degraded,
}

impl ConnectionState {
    /// State name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Degraded => "degraded",
        }
    }

    /// Whether a transport connection is currently open.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Subscribed | Self::Degraded)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Venue Session
// =============================================================================

/// Snapshot-able state of one venue session.
#[derive(Debug, Clone)]
pub struct VenueSession {
    venue: Venue,
    instruments: Vec<InstrumentId>,
    state: ConnectionState,
    last_message_at: Option<DateTime<Utc>>,
    traffic: TrafficAccumulator,
    histories: BTreeMap<InstrumentId, PriceHistoryBuffer>,
    reconnect_attempts: u32,
    epoch: u64,
    last_observed: HashMap<InstrumentId, DateTime<Utc>>,
}

impl VenueSession {
    /// Create a session with an empty history per instrument.
    #[must_use]
    pub fn new(venue: Venue, instruments: Vec<InstrumentId>, history_capacity: usize) -> Self {
        let histories = instruments
            .iter()
            .map(|id| (id.clone(), PriceHistoryBuffer::new(history_capacity)))
            .collect();

        Self {
            venue,
            instruments,
            state: ConnectionState::Disconnected,
            last_message_at: None,
            traffic: TrafficAccumulator::default(),
            histories,
            reconnect_attempts: 0,
            epoch: 0,
            last_observed: HashMap::new(),
        }
    }

    /// Venue this session consumes.
    #[must_use]
    pub const fn venue(&self) -> Venue {
        self.venue
    }

    /// Subscribed instruments, in subscription order.
    #[must_use]
    pub fn instruments(&self) -> &[InstrumentId] {
        &self.instruments
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Set the connection state; returns `true` if it changed.
    pub fn set_state(&mut self, state: ConnectionState) -> bool {
        let changed = self.state != state;
        self.state = state;
        changed
    }

    /// When the last inbound frame arrived.
    #[must_use]
    pub const fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.last_message_at
    }

    /// Bytes received over the session's lifetime.
    #[must_use]
    pub const fn traffic(&self) -> TrafficAccumulator {
        self.traffic
    }

    /// Number of reconnects performed so far.
    #[must_use]
    pub const fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Current connection epoch (incremented on every connect).
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// History for one instrument.
    #[must_use]
    pub fn history(&self, instrument: &InstrumentId) -> Option<&PriceHistoryBuffer> {
        self.histories.get(instrument)
    }

    /// Note that a frame arrived at `at`.
    pub fn record_frame(&mut self, at: DateTime<Utc>) {
        self.last_message_at = Some(at);
    }

    /// Add raw inbound bytes; returns the new total.
    pub fn record_bytes(&mut self, bytes: u64) -> u64 {
        self.traffic.add(bytes);
        self.traffic.total_bytes()
    }

    /// Count one reconnect.
    pub fn record_reconnect(&mut self) {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
    }

    /// Start a new connection epoch. Per-instrument timestamp ordering is
    /// only enforced within an epoch.
    pub fn begin_epoch(&mut self) {
        self.epoch += 1;
        self.last_observed.clear();
    }

    /// Record an accepted ticker in its instrument's history.
    ///
    /// `observed_at` is clamped so it never goes backwards for an instrument
    /// within the current epoch. Returns the ticker as recorded.
    pub fn accept_ticker(&mut self, mut ticker: CanonicalTicker) -> CanonicalTicker {
        if let Some(previous) = self.last_observed.get(&ticker.instrument)
            && ticker.observed_at < *previous
        {
            ticker.observed_at = *previous;
        }
        self.last_observed
            .insert(ticker.instrument.clone(), ticker.observed_at);

        if let Some(history) = self.histories.get_mut(&ticker.instrument) {
            history.push(ticker.observed_at, ticker.last_price);
        }

        ticker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rust_decimal::Decimal;

    fn ticker(id: &str, price: i64, at: DateTime<Utc>) -> CanonicalTicker {
        CanonicalTicker {
            instrument: id.into(),
            last_price: Decimal::from(price),
            open_price_24h: Decimal::from(price),
            high_24h: Decimal::from(price),
            low_24h: Decimal::from(price),
            observed_at: at,
        }
    }

    fn session() -> VenueSession {
        VenueSession::new(Venue::Okx, vec!["BTC-USDT".into(), "ETH-USDT".into()], 3)
    }

    #[test]
    fn venue_parses_case_insensitively() {
        assert_eq!("OKX".parse::<Venue>().unwrap(), Venue::Okx);
        assert_eq!(" binance ".parse::<Venue>().unwrap(), Venue::Binance);
        assert!("kraken".parse::<Venue>().is_err());
    }

    #[test]
    fn histories_are_per_instrument() {
        let mut session = session();
        let now = Utc::now();
        session.accept_ticker(ticker("BTC-USDT", 1, now));
        session.accept_ticker(ticker("ETH-USDT", 2, now));
        session.accept_ticker(ticker("BTC-USDT", 3, now));

        let btc = session.history(&"BTC-USDT".into()).unwrap();
        assert_eq!(btc.len(), 2);
        assert_eq!(session.history(&"ETH-USDT".into()).unwrap().len(), 1);
    }

    #[test]
    fn observed_at_never_goes_backwards_within_epoch() {
        let mut session = session();
        let now = Utc::now();
        session.accept_ticker(ticker("BTC-USDT", 1, now));
        let late = session.accept_ticker(ticker("BTC-USDT", 2, now - TimeDelta::seconds(5)));
        assert_eq!(late.observed_at, now);
    }

    #[test]
    fn new_epoch_resets_ordering() {
        let mut session = session();
        let now = Utc::now();
        session.accept_ticker(ticker("BTC-USDT", 1, now));
        session.begin_epoch();
        let earlier = now - TimeDelta::seconds(5);
        let accepted = session.accept_ticker(ticker("BTC-USDT", 2, earlier));
        assert_eq!(accepted.observed_at, earlier);
        assert_eq!(session.epoch(), 1);
    }

    #[test]
    fn state_change_reports_transitions() {
        let mut session = session();
        assert!(!session.set_state(ConnectionState::Disconnected));
        assert!(session.set_state(ConnectionState::Connecting));
        assert!(session.set_state(ConnectionState::Subscribed));
        assert!(session.state().is_connected());
    }

    #[test]
    fn bytes_accumulate() {
        let mut session = session();
        session.record_bytes(500);
        assert_eq!(session.record_bytes(600), 1100);
        assert_eq!(session.traffic().total_bytes(), 1100);
    }
}
