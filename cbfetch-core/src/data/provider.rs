//! Candle source trait and structured network error types.
//!
//! The CandleSource trait abstracts over the Coinbase REST client so the fetch
//! loop can be driven by a scripted source in tests. A source performs exactly
//! one request per call; retry and pacing live in the fetcher.

use crate::domain::{Candle, Granularity, TimeRange};
use std::time::Duration;
use thiserror::Error;

/// Errors from a single candle request.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limited by provider (HTTP 429)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("request rejected: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("product not found: {product_id}")]
    ProductNotFound { product_id: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    /// A window bound cannot be expressed as a calendar time.
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}

impl SourceError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::RateLimited { .. }
                | SourceError::Timeout(_)
                | SourceError::NetworkUnreachable(_)
                | SourceError::ServerError { .. }
        )
    }

    /// Minimum wait before retrying, or `None` when retrying is pointless.
    ///
    /// A `Retry-After` header on a 429 becomes the floor for the backoff.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            e if e.is_transient() => Some(Duration::ZERO),
            _ => None,
        }
    }
}

/// Anything that can serve candles for one product and window.
pub trait CandleSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch candles whose bucket start lies in `window`.
    ///
    /// `window` never spans more than
    /// [`MAX_CANDLES_PER_REQUEST`](crate::domain::MAX_CANDLES_PER_REQUEST)
    /// buckets. Candles may come back in any order.
    fn fetch_candles(
        &self,
        product_id: &str,
        window: TimeRange,
        granularity: Granularity,
    ) -> Result<Vec<Candle>, SourceError>;
}

impl<S: CandleSource + ?Sized> CandleSource for &S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_candles(
        &self,
        product_id: &str,
        window: TimeRange,
        granularity: Granularity,
    ) -> Result<Vec<Candle>, SourceError> {
        (**self).fetch_candles(product_id, window, granularity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SourceError::RateLimited { retry_after_secs: None }.is_transient());
        assert!(SourceError::Timeout("slow".into()).is_transient());
        assert!(SourceError::ServerError { status: 503 }.is_transient());
        assert!(!SourceError::ProductNotFound { product_id: "X-USD".into() }.is_transient());
        assert!(!SourceError::Rejected { status: 400, message: "bad".into() }.is_transient());
        assert!(!SourceError::ResponseFormatChanged("oops".into()).is_transient());
        assert!(!SourceError::TimestampOutOfRange(i64::MAX).is_transient());
    }

    #[test]
    fn retry_after_sets_minimum_delay() {
        let limited = SourceError::RateLimited {
            retry_after_secs: Some(3),
        };
        assert_eq!(limited.retry_delay(), Some(Duration::from_secs(3)));
        assert_eq!(
            SourceError::ServerError { status: 502 }.retry_delay(),
            Some(Duration::ZERO)
        );
        assert_eq!(
            SourceError::ProductNotFound {
                product_id: "X-USD".into()
            }
            .retry_delay(),
            None
        );
    }
}
