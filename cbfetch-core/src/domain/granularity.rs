//! Candle bucket sizes accepted by the Coinbase candle endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of candles the public candle endpoint returns per call.
pub const MAX_CANDLES_PER_REQUEST: i64 = 300;

/// Bucket size of a candle.
///
/// Serialized as the raw number of seconds so cache sidecars and config files
/// stay readable (`3600`, not `"OneHour"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Granularity {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    SixHours,
    OneDay,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::OneMinute,
        Granularity::FiveMinutes,
        Granularity::FifteenMinutes,
        Granularity::OneHour,
        Granularity::SixHours,
        Granularity::OneDay,
    ];

    /// Bucket size in seconds.
    pub const fn seconds(self) -> i64 {
        match self {
            Granularity::OneMinute => 60,
            Granularity::FiveMinutes => 300,
            Granularity::FifteenMinutes => 900,
            Granularity::OneHour => 3_600,
            Granularity::SixHours => 21_600,
            Granularity::OneDay => 86_400,
        }
    }

    /// Short label used in file names and progress output.
    pub const fn label(self) -> &'static str {
        match self {
            Granularity::OneMinute => "1m",
            Granularity::FiveMinutes => "5m",
            Granularity::FifteenMinutes => "15m",
            Granularity::OneHour => "1h",
            Granularity::SixHours => "6h",
            Granularity::OneDay => "1d",
        }
    }

    /// Widest span a single API call may cover.
    pub const fn max_window_seconds(self) -> i64 {
        self.seconds() * MAX_CANDLES_PER_REQUEST
    }

    /// Round a unix timestamp down to the start of its bucket.
    pub fn floor(self, ts: i64) -> i64 {
        ts.div_euclid(self.seconds()) * self.seconds()
    }

    /// Round a unix timestamp up to the next bucket boundary (identity if aligned).
    pub fn ceil(self, ts: i64) -> i64 {
        let floored = self.floor(ts);
        if floored == ts {
            ts
        } else {
            floored + self.seconds()
        }
    }

    pub fn is_aligned(self, ts: i64) -> bool {
        ts.rem_euclid(self.seconds()) == 0
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.seconds())
    }
}

/// Raised for a bucket size the candle endpoint does not serve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported granularity {0}s (allowed: 60, 300, 900, 3600, 21600, 86400)")]
pub struct UnsupportedGranularity(pub i64);

impl TryFrom<i64> for Granularity {
    type Error = UnsupportedGranularity;

    fn try_from(seconds: i64) -> Result<Self, Self::Error> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.seconds() == seconds)
            .ok_or(UnsupportedGranularity(seconds))
    }
}

impl TryFrom<u32> for Granularity {
    type Error = UnsupportedGranularity;

    fn try_from(seconds: u32) -> Result<Self, Self::Error> {
        Granularity::try_from(i64::from(seconds))
    }
}

impl From<Granularity> for u32 {
    fn from(g: Granularity) -> u32 {
        g.seconds() as u32
    }
}

impl FromStr for Granularity {
    type Err = UnsupportedGranularity;

    /// Accepts either seconds (`"3600"`) or a label (`"1h"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(g) = Granularity::ALL.into_iter().find(|g| g.label() == s) {
            return Ok(g);
        }
        let seconds: i64 = s.parse().map_err(|_| UnsupportedGranularity(-1))?;
        Granularity::try_from(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_and_ceil_round_outward() {
        let g = Granularity::FiveMinutes;
        assert_eq!(g.floor(299), 0);
        assert_eq!(g.floor(300), 300);
        assert_eq!(g.ceil(301), 600);
        assert_eq!(g.ceil(600), 600);
        assert_eq!(g.floor(-1), -300);
    }

    #[test]
    fn parses_seconds_and_labels() {
        assert_eq!("3600".parse::<Granularity>().unwrap(), Granularity::OneHour);
        assert_eq!("15m".parse::<Granularity>().unwrap(), Granularity::FifteenMinutes);
        assert!("120".parse::<Granularity>().is_err());
        assert!("hourly".parse::<Granularity>().is_err());
    }

    #[test]
    fn rejects_unlisted_bucket_sizes() {
        assert_eq!(
            Granularity::try_from(7200i64),
            Err(UnsupportedGranularity(7200))
        );
    }

    #[test]
    fn max_window_is_300_candles() {
        assert_eq!(Granularity::OneHour.max_window_seconds(), 300 * 3600);
    }

    #[test]
    fn serializes_as_seconds() {
        let json = serde_json::to_string(&Granularity::SixHours).unwrap();
        assert_eq!(json, "21600");
        let back: Granularity = serde_json::from_str("60").unwrap();
        assert_eq!(back, Granularity::OneMinute);
        assert!(serde_json::from_str::<Granularity>("61").is_err());
    }
}
