//! History & Traffic Accumulators
//!
//! Bounded per-instrument price history and a monotonic byte counter.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Default number of points kept per instrument.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// One (timestamp, price) observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PricePoint {
    /// When the price was observed.
    pub at: DateTime<Utc>,
    /// Last traded price.
    pub price: Decimal,
}

// =============================================================================
// Price History Buffer
// =============================================================================

/// Fixed-capacity FIFO of price points.
///
/// Appending beyond capacity evicts the oldest point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceHistoryBuffer {
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl PriceHistoryBuffer {
    /// Create a buffer holding at most `capacity` points (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest when full.
    pub fn push(&mut self, at: DateTime<Utc>, price: Decimal) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(PricePoint { at, price });
    }

    /// Number of points held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the buffer holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Maximum number of points held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent point.
    #[must_use]
    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    /// Points oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    /// Copy of the points, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<PricePoint> {
        self.points.iter().copied().collect()
    }
}

impl Default for PriceHistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

// =============================================================================
// Traffic Accumulator
// =============================================================================

/// Monotonic count of bytes received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficAccumulator {
    total: u64,
}

impl TrafficAccumulator {
    /// Add `bytes` to the total.
    pub fn add(&mut self, bytes: u64) {
        self.total = self.total.saturating_add(bytes);
    }

    /// Total bytes received.
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.total
    }

    /// Human readout: `x.xx KB` up to 1024 KB, `x.xx MB` above.
    #[must_use]
    pub fn readout(&self) -> TrafficReadout {
        TrafficReadout(self.total)
    }
}

/// Display adapter for a byte total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficReadout(u64);

impl From<u64> for TrafficReadout {
    fn from(total_bytes: u64) -> Self {
        Self(total_bytes)
    }
}

impl fmt::Display for TrafficReadout {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kb = self.0 as f64 / 1024.0;
        if kb > 1024.0 {
            write!(f, "{:.2} MB", kb / 1024.0)
        } else {
            write!(f, "{kb:.2} KB")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn prices(buffer: &PriceHistoryBuffer) -> Vec<Decimal> {
        buffer.iter().map(|p| p.price).collect()
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = PriceHistoryBuffer::new(3);
        for price in 1..=4 {
            buffer.push(Utc::now(), Decimal::from(price));
        }
        assert_eq!(
            prices(&buffer),
            vec![Decimal::from(2), Decimal::from(3), Decimal::from(4)]
        );
        assert_eq!(buffer.latest().map(|p| p.price), Some(Decimal::from(4)));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buffer = PriceHistoryBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(Utc::now(), Decimal::ONE);
        buffer.push(Utc::now(), Decimal::TWO);
        assert_eq!(prices(&buffer), vec![Decimal::TWO]);
    }

    #[test]
    fn traffic_totals() {
        let mut traffic = TrafficAccumulator::default();
        traffic.add(500);
        traffic.add(600);
        assert_eq!(traffic.total_bytes(), 1100);
        assert_eq!(traffic.readout().to_string(), "1.07 KB");
    }

    #[test]
    fn readout_switches_to_megabytes() {
        let mut traffic = TrafficAccumulator::default();
        traffic.add(1024 * 1024);
        assert_eq!(traffic.readout().to_string(), "1024.00 KB");
        traffic.add(1);
        assert_eq!(traffic.readout().to_string(), "1.00 MB");
        traffic.add(3 * 1024 * 1024);
        assert_eq!(traffic.readout().to_string(), "4.00 MB");
    }

    proptest! {
        #[test]
        fn holds_the_newest_points(capacity in 1usize..20, count in 0usize..60) {
            let mut buffer = PriceHistoryBuffer::new(capacity);
            for i in 0..count {
                buffer.push(Utc::now(), Decimal::from(i));
            }
            prop_assert_eq!(buffer.len(), count.min(capacity));
            let expected: Vec<Decimal> =
                (count.saturating_sub(capacity)..count).map(Decimal::from).collect();
            prop_assert_eq!(prices(&buffer), expected);
        }

        #[test]
        fn traffic_is_monotonic(chunks in proptest::collection::vec(0u64..10_000, 0..50)) {
            let mut traffic = TrafficAccumulator::default();
            let mut previous = 0;
            for chunk in &chunks {
                traffic.add(*chunk);
                prop_assert!(traffic.total_bytes() >= previous);
                previous = traffic.total_bytes();
            }
            prop_assert_eq!(traffic.total_bytes(), chunks.iter().sum::<u64>());
        }
    }
}
