//! Binance Adapter
//!
//! Speaks the Binance futures market-stream protocol for `@ticker` streams.
//!
//! # Symbol Mapping
//!
//! Instruments are supplied in whatever form the consumer uses
//! (`BTC-USDT-SWAP`, `ETH_USDT_PERP`, `btc/usdt`). Binance wants compact
//! lower-case symbols, so each instrument is normalized by dropping venue
//! suffixes and separators. Inbound symbols (`BTCUSDT`) go through the same
//! normalization and are mapped back to the instrument the consumer gave.
//!
//! Inbound symbols that map to nothing are dropped without a warning, since
//! combined streams routinely carry them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::application::ports::{
    ControlSignal, ExchangeAdapter, FrameError, OutboundFrame, ParsedFrame,
};
use crate::domain::session::Venue;
use crate::domain::ticker::{CanonicalTicker, InstrumentId, MalformedTickerError};
use crate::infrastructure::exchange::messages::{BinanceError, BinanceRequest, BinanceTicker};

/// Binance USDⓈ-M futures market-stream endpoint.
pub const BINANCE_FUTURES_ENDPOINT: &str = "wss://fstream.binance.com/ws";

const SUBSCRIBE_REQUEST_ID: u64 = 1;
const VENUE_SUFFIXES: [&str; 3] = ["-SWAP", "_PERP", "-PERP"];

/// Normalize an instrument or venue symbol to Binance's stream form.
///
/// ```rust
/// use ticker_stream::infrastructure::exchange::binance::normalize_symbol;
///
/// assert_eq!(normalize_symbol("BTC-USDT-SWAP"), "btcusdt");
/// assert_eq!(normalize_symbol("BTCUSDT"), "btcusdt");
/// ```
#[must_use]
pub fn normalize_symbol(instrument: &str) -> String {
    let upper = instrument.trim().to_ascii_uppercase();
    let stem = VENUE_SUFFIXES
        .iter()
        .find_map(|suffix| upper.strip_suffix(suffix))
        .unwrap_or(&upper);

    stem.chars()
        .filter(|c| !matches!(c, '-' | '_' | '/'))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Adapter for Binance `<symbol>@ticker` streams.
#[derive(Debug, Clone)]
pub struct BinanceAdapter {
    instruments: Vec<InstrumentId>,
    /// Normalized symbols in subscription order.
    streams: Vec<String>,
    /// Normalized symbol to the instrument the consumer supplied.
    symbols: HashMap<String, InstrumentId>,
}

impl BinanceAdapter {
    /// Create an adapter for the given instruments.
    ///
    /// When two instruments normalize to the same symbol the first one keeps
    /// it.
    #[must_use]
    pub fn new(instruments: Vec<InstrumentId>) -> Self {
        let mut streams = Vec::with_capacity(instruments.len());
        let mut symbols = HashMap::with_capacity(instruments.len());

        for instrument in &instruments {
            let symbol = normalize_symbol(instrument.as_str());
            if let Some(existing) = symbols.get(&symbol) {
                tracing::warn!(
                    venue = %Venue::Binance,
                    instrument = %instrument,
                    kept = %existing,
                    symbol = %symbol,
                    "Instruments collide after normalization, ignoring duplicate"
                );
                continue;
            }
            streams.push(symbol.clone());
            symbols.insert(symbol, instrument.clone());
        }

        Self {
            instruments,
            streams,
            symbols,
        }
    }

    /// Instrument a venue symbol maps to, if subscribed.
    #[must_use]
    pub fn resolve(&self, symbol: &str) -> Option<&InstrumentId> {
        self.symbols.get(&normalize_symbol(symbol))
    }

    fn parse_ticker(&self, payload: Value, observed_at: DateTime<Utc>) -> Result<ParsedFrame, FrameError> {
        let ticker: BinanceTicker = serde_json::from_value(payload)?;
        let (symbol, raw) = ticker.into_parts();
        let symbol = symbol
            .filter(|s| !s.is_empty())
            .ok_or(MalformedTickerError::MissingInstrument)?;

        let Some(instrument) = self.resolve(&symbol) else {
            return Err(FrameError::UnknownInstrument(symbol));
        };

        let ticker = CanonicalTicker::from_raw(instrument.clone(), &raw, observed_at)?;
        Ok(ParsedFrame::Ticker(ticker))
    }
}

impl ExchangeAdapter for BinanceAdapter {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn default_endpoint(&self) -> &str {
        BINANCE_FUTURES_ENDPOINT
    }

    fn instruments(&self) -> &[InstrumentId] {
        &self.instruments
    }

    fn build_subscription(&self) -> Result<Vec<OutboundFrame>, FrameError> {
        let request = BinanceRequest {
            method: "SUBSCRIBE",
            params: self
                .streams
                .iter()
                .map(|symbol| format!("{symbol}@ticker"))
                .collect(),
            id: SUBSCRIBE_REQUEST_ID,
        };
        Ok(vec![OutboundFrame::Text(serde_json::to_string(&request)?)])
    }

    fn heartbeat(&self) -> Result<OutboundFrame, FrameError> {
        Ok(OutboundFrame::Ping)
    }

    fn parse_frame(
        &self,
        raw: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<ParsedFrame, FrameError> {
        let mut value: Value = serde_json::from_str(raw.trim())?;

        if let Some(error) = value.get_mut("error") {
            let error: BinanceError = serde_json::from_value(error.take())?;
            return Ok(ParsedFrame::Control(ControlSignal::Error {
                code: error.code(),
                message: error.msg.unwrap_or_default(),
            }));
        }
        if value.get("result").is_some() && value.get("id").is_some() {
            return Ok(ParsedFrame::Control(ControlSignal::SubscriptionAck));
        }

        // Combined streams wrap the payload: {"stream": "...", "data": {...}}
        let payload = if value.get("data").is_some_and(Value::is_object) {
            value["data"].take()
        } else {
            value
        };

        if payload.get("s").is_none() && payload.get("symbol").is_none() {
            return Ok(ParsedFrame::Empty);
        }
        self.parse_ticker(payload, observed_at)
    }
}
