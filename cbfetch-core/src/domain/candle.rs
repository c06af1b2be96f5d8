//! Candle: one OHLCV record for a fixed time bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candle for a single bucket.
///
/// `timestamp` is the bucket start in unix seconds; the bucket spans
/// `[timestamp, timestamp + granularity)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    /// Every field is a finite number.
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Open and close sit inside `[low, high]` and volume is not negative.
    /// The cache refuses candles that fail this.
    pub fn is_sane(&self) -> bool {
        let range = self.low..=self.high;
        self.is_finite()
            && range.contains(&self.open)
            && range.contains(&self.close)
            && self.volume >= 0.0
    }

    /// A bearish candle closed below its open.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}
