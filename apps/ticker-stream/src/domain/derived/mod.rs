//! Derived Display Values
//!
//! Pure transforms from raw prices to what a display shows: a formatted
//! price string, the 24h percent change, and an up/down/flat classification.
//!
//! # Price Formatting
//!
//! | price ≥  | format                     |
//! |----------|----------------------------|
//! | 1000     | thousands-grouped, 2 dp    |
//! | 1        | 4 dp                       |
//! | 0.0001   | 6 dp                       |
//! | else     | 8 dp                       |

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::domain::session::Venue;
use crate::domain::ticker::{CanonicalTicker, InstrumentId};

/// Direction of the 24h price move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Classification {
    /// Price is above the 24h open.
    Up,
    /// Price is below the 24h open.
    Down,
    /// Price equals the 24h open.
    Flat,
    /// No usable open price.
    Unknown,
}

/// Output of the derived-value calculator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedValues {
    /// Price rendered per the threshold table.
    pub formatted_price: String,
    /// Percent change against the 24h open, if the open is positive.
    pub change_percent: Option<Decimal>,
    /// Direction of the move.
    pub classification: Classification,
}

/// Compute every derived value for a last/open price pair.
#[must_use]
pub fn derive(last: Decimal, open: Decimal) -> DerivedValues {
    let change_percent = change_percent(last, open);
    DerivedValues {
        formatted_price: format_price(last),
        change_percent,
        classification: classify(change_percent),
    }
}

/// Render a price with the precision its magnitude calls for.
#[must_use]
pub fn format_price(price: Decimal) -> String {
    let thousand = Decimal::from(1000);
    let one = Decimal::ONE;
    let ten_thousandth = Decimal::new(1, 4);

    if price >= thousand {
        group_thousands(&fixed(price, 2))
    } else if price >= one {
        fixed(price, 4)
    } else if price >= ten_thousandth {
        fixed(price, 6)
    } else {
        fixed(price, 8)
    }
}

/// Percent change from `open` to `last`; `None` unless `open > 0`.
#[must_use]
pub fn change_percent(last: Decimal, open: Decimal) -> Option<Decimal> {
    if open <= Decimal::ZERO {
        return None;
    }
    (last - open)
        .checked_div(open)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|pct| pct.normalize())
}

/// Classify a percent change.
#[must_use]
pub fn classify(change: Option<Decimal>) -> Classification {
    match change {
        None => Classification::Unknown,
        Some(c) if c > Decimal::ZERO => Classification::Up,
        Some(c) if c < Decimal::ZERO => Classification::Down,
        Some(_) => Classification::Flat,
    }
}

/// Render a percent change as `+1.23%` / `-4.56%` / `0.00%`.
#[must_use]
pub fn format_change(change: Decimal) -> String {
    let text = fixed(change, 2);
    if change > Decimal::ZERO {
        format!("+{text}%")
    } else {
        format!("{text}%")
    }
}

/// Fixed-point text with midpoints rounded away from zero.
fn fixed(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.prec$}", prec = dp as usize)
}

fn group_thousands(text: &str) -> String {
    let (sign, unsigned) = text
        .strip_prefix('-')
        .map_or(("", text), |rest| ("-", rest));
    let (int_part, frac_part) = unsigned
        .split_once('.')
        .map_or((unsigned, None), |(i, f)| (i, Some(f)));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

// =============================================================================
// Display Update
// =============================================================================

/// The externally visible result of one accepted ticker.
///
/// Derived on every update and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayUpdate {
    /// Venue the ticker came from.
    pub venue: Venue,
    /// Instrument the update describes.
    pub instrument: InstrumentId,
    /// Price rendered per the threshold table.
    pub formatted_price: String,
    /// Percent change against the 24h open.
    pub change_percent: Option<Decimal>,
    /// Direction of the move.
    pub classification: Classification,
    /// Raw last price, for charting collaborators.
    pub last_price: Decimal,
    /// Highest price over the trailing 24 hours.
    pub high_24h: Decimal,
    /// Lowest price over the trailing 24 hours.
    pub low_24h: Decimal,
    /// When the ticker was observed.
    pub observed_at: DateTime<Utc>,
}

impl DisplayUpdate {
    /// Annotate a canonical ticker with its derived values.
    #[must_use]
    pub fn from_ticker(venue: Venue, ticker: &CanonicalTicker) -> Self {
        let derived = derive(ticker.last_price, ticker.open_price_24h);
        Self {
            venue,
            instrument: ticker.instrument.clone(),
            formatted_price: derived.formatted_price,
            change_percent: derived.change_percent,
            classification: derived.classification,
            last_price: ticker.last_price,
            high_24h: ticker.high_24h,
            low_24h: ticker.low_24h,
            observed_at: ticker.observed_at,
        }
    }

    /// First display line: instrument, price, and change when known.
    #[must_use]
    pub fn headline(&self) -> String {
        match self.change_percent {
            Some(change) => format!(
                "{}: {} ({})",
                self.instrument,
                self.formatted_price,
                format_change(change)
            ),
            None => format!("{}: {}", self.instrument, self.formatted_price),
        }
    }

    /// Second display line with the 24h range at 4 dp.
    ///
    /// `None` when the change is unknown; the label shows the headline only.
    #[must_use]
    pub fn range_line(&self) -> Option<String> {
        self.change_percent.map(|_| {
            format!(
                "24h high: {} low: {}",
                fixed(self.high_24h, 4),
                fixed(self.low_24h, 4)
            )
        })
    }
}

/// Renders the full label, one line per [`headline`](DisplayUpdate::headline)
/// and [`range_line`](DisplayUpdate::range_line).
impl fmt::Display for DisplayUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.range_line() {
            Some(range) => write!(f, "{}\n{range}", self.headline()),
            None => f.write_str(&self.headline()),
        }
    }
}
