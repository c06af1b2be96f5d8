//! Coinbase Exchange public candle client.
//!
//! `GET {base}/products/{product_id}/candles?granularity=G&start=ISO&end=ISO`
//! returns up to 300 rows of `[time, low, high, open, close, volume]`, newest
//! first. One call per [`CandleSource::fetch_candles`]; the fetcher owns retry
//! and pacing.

use super::provider::{CandleSource, SourceError};
use crate::config::FetcherConfig;
use crate::domain::{Candle, Granularity, TimeRange};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";

/// One candle row: `[time, low, high, open, close, volume]`.
#[derive(Debug, Deserialize)]
struct CandleRow(i64, f64, f64, f64, f64, f64);

/// Error body the exchange returns on 4xx.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Blocking Coinbase candle client.
pub struct CoinbaseClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl CoinbaseClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cbfetch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.base_url.clone(), config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the candle endpoint URL for a product.
    fn candles_url(&self, product_id: &str) -> String {
        format!("{}/products/{product_id}/candles", self.base_url)
    }

    fn iso(ts: i64) -> Result<String, SourceError> {
        DateTime::<Utc>::from_timestamp(ts, 0)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            .ok_or(SourceError::TimestampOutOfRange(ts))
    }

    /// Convert rows to candles, keeping only buckets that start inside `window`.
    fn parse_rows(rows: Vec<CandleRow>, window: TimeRange) -> Vec<Candle> {
        let mut candles: Vec<Candle> = rows
            .into_iter()
            .filter(|row| window.contains(row.0))
            .map(|CandleRow(timestamp, low, high, open, close, volume)| Candle {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            })
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        candles
    }

    fn classify_status(
        product_id: &str,
        resp: reqwest::blocking::Response,
    ) -> SourceError {
        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return SourceError::RateLimited { retry_after_secs };
        }

        if status.is_server_error() {
            return SourceError::ServerError {
                status: status.as_u16(),
            };
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return SourceError::ProductNotFound {
                product_id: product_id.to_string(),
            };
        }

        let message = resp
            .json::<ErrorBody>()
            .map(|b| b.message)
            .unwrap_or_else(|_| "no message".to_string());
        SourceError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

impl CandleSource for CoinbaseClient {
    fn name(&self) -> &str {
        "coinbase_exchange"
    }

    fn fetch_candles(
        &self,
        product_id: &str,
        window: TimeRange,
        granularity: Granularity,
    ) -> Result<Vec<Candle>, SourceError> {
        let url = self.candles_url(product_id);
        let query = [
            ("granularity", granularity.seconds().to_string()),
            ("start", Self::iso(window.start)?),
            ("end", Self::iso(window.end)?),
        ];

        tracing::debug!(%product_id, %window, granularity = granularity.seconds(), "requesting candles");

        let resp = self.client.get(&url).query(&query).send().map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(e.to_string())
            } else {
                SourceError::NetworkUnreachable(e.to_string())
            }
        })?;

        if !resp.status().is_success() {
            return Err(Self::classify_status(product_id, resp));
        }

        let rows: Vec<CandleRow> = resp.json().map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(e.to_string())
            } else {
                SourceError::ResponseFormatChanged(format!(
                    "failed to parse candles for {product_id}: {e}"
                ))
            }
        })?;

        Ok(Self::parse_rows(rows, window))
    }
}
