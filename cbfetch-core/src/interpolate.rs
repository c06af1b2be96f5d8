//! Collapse OHLC candles into a single price series.
//!
//! Pure functions: no I/O, inputs are never mutated.

use crate::domain::{Candle, Granularity, PricePoint, PriceSeries};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rule for turning one candle into price points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterpolationMode {
    /// Close price at the bucket start.
    Close,
    /// Open price at the bucket start.
    Open,
    /// `(high + low) / 2` at the bucket start.
    Mean,
    /// Two points per candle tracing the intra-bucket swing.
    ///
    /// Bearish candle: high at the bucket start, low at mid-bucket.
    /// Bullish or flat candle: low at the bucket start, high at mid-bucket.
    #[default]
    HiLo,
}

impl InterpolationMode {
    pub const ALL: [InterpolationMode; 4] = [
        InterpolationMode::Close,
        InterpolationMode::Open,
        InterpolationMode::Mean,
        InterpolationMode::HiLo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InterpolationMode::Close => "close",
            InterpolationMode::Open => "open",
            InterpolationMode::Mean => "mean",
            InterpolationMode::HiLo => "hi-lo",
        }
    }
}

impl fmt::Display for InterpolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a mode name does not match any [`InterpolationMode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported interpolation mode '{0}' (expected close, open, mean or hi-lo)")]
pub struct UnsupportedMode(pub String);

impl FromStr for InterpolationMode {
    type Err = UnsupportedMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "close" => Ok(InterpolationMode::Close),
            "open" => Ok(InterpolationMode::Open),
            "mean" => Ok(InterpolationMode::Mean),
            "hi-lo" | "hilo" | "hi_lo" => Ok(InterpolationMode::HiLo),
            _ => Err(UnsupportedMode(s.to_string())),
        }
    }
}

/// Shape candles into a price series.
///
/// `granularity` only matters for [`InterpolationMode::HiLo`], which places its
/// second point half a bucket after the candle start.
pub fn shape(candles: &[Candle], mode: InterpolationMode, granularity: Granularity) -> PriceSeries {
    let points = match mode {
        InterpolationMode::Close => single_point(candles, |c| c.close),
        InterpolationMode::Open => single_point(candles, |c| c.open),
        InterpolationMode::Mean => single_point(candles, |c| (c.high + c.low) / 2.0),
        InterpolationMode::HiLo => {
            let half = granularity.seconds() / 2;
            let mut points = Vec::with_capacity(candles.len() * 2);
            for c in candles {
                let (first, second) = if c.is_bearish() {
                    (c.high, c.low)
                } else {
                    (c.low, c.high)
                };
                points.push(PricePoint { timestamp: c.timestamp, price: first });
                points.push(PricePoint { timestamp: c.timestamp + half, price: second });
            }
            points
        }
    };
    PriceSeries::new(points)
}

fn single_point(candles: &[Candle], price: impl Fn(&Candle) -> f64) -> Vec<PricePoint> {
    candles
        .iter()
        .map(|c| PricePoint { timestamp: c.timestamp, price: price(c) })
        .collect()
}
