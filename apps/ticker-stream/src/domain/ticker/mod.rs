//! Canonical Ticker Model
//!
//! The normalized record every exchange adapter produces. Venue wire types
//! differ in field names and number encodings; they all funnel through
//! [`CanonicalTicker::from_raw`], which applies one validation rule to every
//! price field.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Instrument Identifier
// =============================================================================

/// Opaque identifier of a tradable contract, e.g. `BTC-USDT-SWAP`.
///
/// Supplied by the consumer at subscription time and used as the join key
/// between vendor payloads and canonical records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create an identifier from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InstrumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Price fields carried by a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    /// Last traded price.
    Last,
    /// Price 24 hours ago.
    Open24h,
    /// Highest price in the last 24 hours.
    High24h,
    /// Lowest price in the last 24 hours.
    Low24h,
}

impl PriceField {
    /// Field name used in log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Last => "last",
            Self::Open24h => "open24h",
            Self::High24h => "high24h",
            Self::Low24h => "low24h",
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ticker could not be built from the vendor fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedTickerError {
    /// The instrument identifier was missing or empty.
    #[error("ticker is missing its instrument identifier")]
    MissingInstrument,
    /// A required price field was absent.
    #[error("ticker for {instrument} is missing field `{field}`")]
    MissingField {
        /// Instrument the frame referred to.
        instrument: InstrumentId,
        /// The absent field.
        field: PriceField,
    },
    /// A price field was present but not a usable number.
    #[error("ticker for {instrument} has invalid `{field}`: {value}")]
    InvalidField {
        /// Instrument the frame referred to.
        instrument: InstrumentId,
        /// The offending field.
        field: PriceField,
        /// Raw value as received.
        value: String,
    },
}

// =============================================================================
// Raw Fields
// =============================================================================

/// Price fields as they arrive on the wire, before validation.
///
/// Vendors send prices either as JSON strings (`"64000.1"`) or as JSON
/// numbers; both are accepted here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTickerFields {
    /// Last traded price.
    pub last: Option<serde_json::Value>,
    /// 24h open price.
    pub open_24h: Option<serde_json::Value>,
    /// 24h high.
    pub high_24h: Option<serde_json::Value>,
    /// 24h low.
    pub low_24h: Option<serde_json::Value>,
}

// =============================================================================
// Canonical Ticker
// =============================================================================

/// Venue-independent ticker snapshot for one instrument.
///
/// Every price is a non-negative decimal. Instances are never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalTicker {
    /// Instrument the ticker describes.
    pub instrument: InstrumentId,
    /// Last traded price.
    pub last_price: Decimal,
    /// Price 24 hours ago.
    pub open_price_24h: Decimal,
    /// Highest price over the last 24 hours.
    pub high_24h: Decimal,
    /// Lowest price over the last 24 hours.
    pub low_24h: Decimal,
    /// When the ticker was observed locally.
    pub observed_at: DateTime<Utc>,
}

impl CanonicalTicker {
    /// Build a ticker from raw vendor fields.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedTickerError`] if the instrument is empty or any
    /// price field is absent, non-numeric, or negative.
    pub fn from_raw(
        instrument: InstrumentId,
        raw: &RawTickerFields,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, MalformedTickerError> {
        if instrument.as_str().is_empty() {
            return Err(MalformedTickerError::MissingInstrument);
        }

        let last_price = parse_price(&instrument, PriceField::Last, raw.last.as_ref())?;
        let open_price_24h = parse_price(&instrument, PriceField::Open24h, raw.open_24h.as_ref())?;
        let high_24h = parse_price(&instrument, PriceField::High24h, raw.high_24h.as_ref())?;
        let low_24h = parse_price(&instrument, PriceField::Low24h, raw.low_24h.as_ref())?;

        Ok(Self {
            instrument,
            last_price,
            open_price_24h,
            high_24h,
            low_24h,
            observed_at,
        })
    }
}

fn parse_price(
    instrument: &InstrumentId,
    field: PriceField,
    value: Option<&serde_json::Value>,
) -> Result<Decimal, MalformedTickerError> {
    let invalid = |value: String| MalformedTickerError::InvalidField {
        instrument: instrument.clone(),
        field,
        value,
    };

    let text = match value {
        None | Some(serde_json::Value::Null) => {
            return Err(MalformedTickerError::MissingField {
                instrument: instrument.clone(),
                field,
            });
        }
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => return Err(invalid(other.to_string())),
    };

    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| invalid(text.clone()))?;

    if price.is_sign_negative() && !price.is_zero() {
        return Err(invalid(text));
    }

    Ok(price)
}
