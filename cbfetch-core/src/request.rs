//! Fetch request model.

use crate::coin::Coin;
use crate::domain::{Granularity, TimeRange};
use crate::error::Error;
use crate::interpolate::InterpolationMode;
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One call's worth of parameters. Constructed per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub coin: Coin,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
    pub interpolation: InterpolationMode,
}

impl Default for FetchRequest {
    /// Bitcoin, hourly, the three months up to yesterday, hi-lo shaping.
    fn default() -> Self {
        let end = yesterday();
        let start = end.checked_sub_months(Months::new(3)).unwrap_or(end);
        Self {
            coin: Coin::Bitcoin,
            start: midnight_utc(start),
            end: midnight_utc(end),
            granularity: Granularity::OneHour,
            interpolation: InterpolationMode::default(),
        }
    }
}

impl FetchRequest {
    pub fn new(
        coin: Coin,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
        interpolation: InterpolationMode,
    ) -> Self {
        Self {
            coin,
            start,
            end,
            granularity,
            interpolation,
        }
    }

    /// Build from loosely-typed input (CLI flags, config values).
    ///
    /// Unknown coins and unsupported granularities are `InvalidRequest`; an
    /// unknown interpolation mode is `UnsupportedMode`.
    pub fn parse(
        coin: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity_seconds: i64,
        interpolation: &str,
    ) -> Result<Self, Error> {
        let coin: Coin = coin
            .parse()
            .map_err(|e| Error::InvalidRequest(format!("{e}")))?;
        let granularity = Granularity::try_from(granularity_seconds)
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        let interpolation: InterpolationMode = interpolation.parse()?;
        let request = Self::new(coin, start, end, granularity, interpolation);
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.start >= self.end {
            return Err(Error::InvalidRequest(format!(
                "start {} must be before end {}",
                self.start.to_rfc3339(),
                self.end.to_rfc3339()
            )));
        }
        if self.start > Utc::now() {
            return Err(Error::InvalidRequest(format!(
                "start {} is in the future",
                self.start.to_rfc3339()
            )));
        }
        Ok(())
    }

    /// Requested span rounded outward to bucket boundaries.
    pub fn aligned_range(&self) -> TimeRange {
        TimeRange::new(self.start.timestamp(), self.end.timestamp()).aligned(self.granularity)
    }
}

pub fn yesterday() -> NaiveDate {
    Utc::now().date_naive().pred_opt().unwrap_or(NaiveDate::MIN)
}

/// `00:00:00 UTC` on `date`.
pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn default_request_spans_three_months_to_yesterday() {
        let req = FetchRequest::default();
        assert_eq!(req.coin, Coin::Bitcoin);
        assert_eq!(req.granularity, Granularity::OneHour);
        assert_eq!(req.interpolation, InterpolationMode::HiLo);
        assert_eq!(req.end, midnight_utc(yesterday()));
        let days = (req.end - req.start).num_days();
        assert!((89..=92).contains(&days), "{days}");
        req.validate().unwrap();
    }

    #[test]
    fn start_must_precede_end() {
        let req = FetchRequest::new(
            Coin::Bitcoin,
            ts(7200),
            ts(3600),
            Granularity::OneHour,
            InterpolationMode::Close,
        );
        assert!(matches!(req.validate(), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn parse_rejects_bad_granularity_and_coin() {
        let err = FetchRequest::parse("bitcoin", ts(0), ts(3600), 7200, "close").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let err = FetchRequest::parse("dogelon", ts(0), ts(3600), 3600, "close").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn parse_rejects_unknown_mode() {
        let err = FetchRequest::parse("btc", ts(0), ts(3600), 3600, "median").unwrap_err();
        assert!(matches!(err, Error::UnsupportedMode(_)));
    }

    #[test]
    fn aligned_range_rounds_outward() {
        let req = FetchRequest::new(
            Coin::Ethereum,
            ts(3601),
            ts(7201),
            Granularity::OneHour,
            InterpolationMode::Close,
        );
        assert_eq!(req.aligned_range(), TimeRange::new(3600, 10_800));
    }
}
