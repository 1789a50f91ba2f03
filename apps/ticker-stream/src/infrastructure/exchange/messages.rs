//! Venue Wire Message Types
//!
//! Serde types for the JSON frames exchanged with each venue. Price fields
//! stay as raw [`serde_json::Value`]s here; validation happens when they are
//! turned into a canonical ticker.
//!
//! # References
//!
//! - [OKX public channels](https://www.okx.com/docs-v5/en/#public-data-websocket-tickers-channel)
//! - [Binance futures streams](https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams)

use serde::{Deserialize, Serialize};

use crate::domain::ticker::RawTickerFields;

/// Render a venue error code, which may arrive as a string or a number.
fn code_text(code: Option<&serde_json::Value>) -> Option<String> {
    match code? {
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

// =============================================================================
// OKX
// =============================================================================

/// OKX subscription argument.
///
/// # Wire Format (JSON)
/// ```json
/// {"channel": "tickers", "instId": "BTC-USDT-SWAP"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkxChannelArg {
    /// Channel name (always `tickers` here).
    pub channel: String,
    /// Instrument identifier.
    #[serde(rename = "instId")]
    pub inst_id: String,
}

/// OKX request frame.
///
/// # Wire Format (JSON)
/// ```json
/// {"op": "subscribe", "args": [{"channel": "tickers", "instId": "BTC-USDT-SWAP"}]}
/// {"op": "ping"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OkxRequest {
    /// Operation name.
    pub op: &'static str,
    /// Operation arguments, omitted for `ping`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<OkxChannelArg>,
}

/// OKX event frame (subscribe ack or error).
///
/// # Wire Format (JSON)
/// ```json
/// {"event": "subscribe", "arg": {"channel": "tickers", "instId": "BTC-USDT"}}
/// {"event": "error", "code": "60012", "msg": "Invalid request"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OkxEvent {
    /// Event name.
    pub event: String,
    /// Error code, string-encoded by OKX.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    /// Error message.
    #[serde(default)]
    pub msg: Option<String>,
}

impl OkxEvent {
    /// Error code as text.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        code_text(self.code.as_ref())
    }
}

/// One element of an OKX `tickers` push.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct OkxTicker {
    /// Instrument identifier.
    #[serde(rename = "instId", default)]
    pub inst_id: Option<String>,
    /// Last traded price.
    #[serde(default)]
    pub last: Option<serde_json::Value>,
    /// Open price 24 hours ago.
    #[serde(rename = "open24h", default)]
    pub open_24h: Option<serde_json::Value>,
    /// 24h high.
    #[serde(rename = "high24h", default)]
    pub high_24h: Option<serde_json::Value>,
    /// 24h low.
    #[serde(rename = "low24h", default)]
    pub low_24h: Option<serde_json::Value>,
}

impl OkxTicker {
    /// Split into the instrument and its raw price fields.
    #[must_use]
    pub fn into_parts(self) -> (Option<String>, RawTickerFields) {
        (
            self.inst_id,
            RawTickerFields {
                last: self.last,
                open_24h: self.open_24h,
                high_24h: self.high_24h,
                low_24h: self.low_24h,
            },
        )
    }
}

/// OKX data push.
///
/// # Wire Format (JSON)
/// ```json
/// {"arg": {"channel": "tickers", "instId": "BTC-USDT"},
///  "data": [{"instId": "BTC-USDT", "last": "64000.1", "open24h": "63000", ...}]}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OkxPush {
    /// Channel argument the push belongs to.
    #[serde(default)]
    pub arg: Option<serde_json::Value>,
    /// Ticker payloads; only the first is used.
    pub data: Vec<OkxTicker>,
}

// =============================================================================
// Binance
// =============================================================================

/// Binance request frame.
///
/// # Wire Format (JSON)
/// ```json
/// {"method": "SUBSCRIBE", "params": ["btcusdt@ticker"], "id": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinanceRequest {
    /// Method name.
    pub method: &'static str,
    /// Stream names.
    pub params: Vec<String>,
    /// Request identifier echoed in the response.
    pub id: u64,
}

/// Binance error body.
///
/// # Wire Format (JSON)
/// ```json
/// {"error": {"code": 2, "msg": "Invalid request"}, "id": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceError {
    /// Error code.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    /// Error message.
    #[serde(default)]
    pub msg: Option<String>,
}

impl BinanceError {
    /// Error code as text.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        code_text(self.code.as_ref())
    }
}

/// Binance 24h ticker payload, short or long field names.
///
/// # Wire Format (JSON)
/// ```json
/// {"e": "24hrTicker", "s": "BTCUSDT", "c": "64000.1", "o": "63000", "h": "65000", "l": "62000"}
/// {"symbol": "BTCUSDT", "lastPrice": "64000.1", "openPrice": "63000", ...}
/// ```
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BinanceTicker {
    /// Venue symbol, e.g. `BTCUSDT`.
    #[serde(rename = "s", alias = "symbol", default)]
    pub symbol: Option<String>,
    /// Last traded price.
    #[serde(rename = "c", alias = "lastPrice", default)]
    pub last: Option<serde_json::Value>,
    /// Open price 24 hours ago.
    #[serde(rename = "o", alias = "openPrice", default)]
    pub open: Option<serde_json::Value>,
    /// 24h high.
    #[serde(rename = "h", alias = "highPrice", default)]
    pub high: Option<serde_json::Value>,
    /// 24h low.
    #[serde(rename = "l", alias = "lowPrice", default)]
    pub low: Option<serde_json::Value>,
}

impl BinanceTicker {
    /// Split into the symbol and its raw price fields.
    #[must_use]
    pub fn into_parts(self) -> (Option<String>, RawTickerFields) {
        (
            self.symbol,
            RawTickerFields {
                last: self.last,
                open_24h: self.open,
                high_24h: self.high,
                low_24h: self.low,
            },
        )
    }
}
