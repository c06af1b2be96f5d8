//! Fetch orchestrator: fills cache gaps from the candle source, then serves
//! the requested range from disk.
//!
//! One request at a time: every call is paced by the configured request delay,
//! retried with exponential backoff on transient failures, and merged into the
//! cache as soon as it lands so an interrupted run resumes where it stopped.

use super::cache::{CachedSeries, CandleCache};
use super::coinbase::CoinbaseClient;
use super::progress::ProgressSink;
use super::provider::{CandleSource, SourceError};
use super::retry::retry_with_backoff;
use crate::coin::Coin;
use crate::config::FetcherConfig;
use crate::domain::{Candle, Granularity, PriceSeries, TimeRange};
use crate::error::Error;
use crate::interpolate::shape;
use crate::request::FetchRequest;
use chrono::Utc;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Counters for one gap-filling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillStats {
    pub windows: usize,
    pub candles: usize,
}

pub struct Fetcher<S: CandleSource = CoinbaseClient> {
    source: S,
    cache: CandleCache,
    config: FetcherConfig,
    /// One permit per `request_delay`; `None` when the delay is zero.
    limiter: Option<DefaultDirectRateLimiter>,
    clock: DefaultClock,
}

impl Fetcher<CoinbaseClient> {
    /// Fetcher backed by the public Coinbase Exchange API.
    pub fn coinbase(config: FetcherConfig) -> Result<Self, Error> {
        let client = CoinbaseClient::from_config(&config)?;
        Ok(Self::new(client, config))
    }
}

impl<S: CandleSource> Fetcher<S> {
    pub fn new(source: S, config: FetcherConfig) -> Self {
        let limiter = Quota::with_period(config.request_delay).map(RateLimiter::direct);
        Self {
            source,
            cache: CandleCache::new(config.cache_dir.clone()),
            config,
            limiter,
            clock: DefaultClock::default(),
        }
    }

    pub fn cache(&self) -> &CandleCache {
        &self.cache
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch, cache, and shape prices for `request`.
    pub fn fetch_prices(
        &self,
        request: &FetchRequest,
        progress: &mut dyn ProgressSink,
    ) -> Result<PriceSeries, Error> {
        let candles = self.fetch_candles(request, progress)?;
        Ok(shape(&candles, request.interpolation, request.granularity))
    }

    /// Fetch and cache raw candles for `request`, without shaping.
    pub fn fetch_candles(
        &self,
        request: &FetchRequest,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<Candle>, Error> {
        request.validate()?;

        let range = request.aligned_range();
        let stats = self.fill_gaps(request.coin, request.granularity, range, progress)?;

        let series = self.cache.load(request.coin, request.granularity)?;
        let candles = series.slice(range).to_vec();

        tracing::info!(
            source = self.source.name(),
            coin = %request.coin,
            granularity = request.granularity.seconds(),
            requested = %range,
            windows_fetched = stats.windows,
            candles_fetched = stats.candles,
            candles_returned = candles.len(),
            "fetch complete"
        );
        Ok(candles)
    }

    /// Download every uncovered part of `range` and merge it into the cache.
    ///
    /// The end is clamped to the start of the still-open bucket so an
    /// incomplete candle is never recorded as covered.
    pub fn fill_gaps(
        &self,
        coin: Coin,
        granularity: Granularity,
        range: TimeRange,
        progress: &mut dyn ProgressSink,
    ) -> Result<FillStats, Error> {
        let open_bucket = granularity.floor(Utc::now().timestamp());
        let range = TimeRange::new(range.start, range.end.min(open_bucket));

        let mut cached = self.cache.load_or_recover(coin, granularity)?;
        let windows = plan_windows(&cached, range);
        let total = windows.len();
        if total == 0 {
            tracing::debug!(%coin, granularity = granularity.seconds(), "cache hit");
            return Ok(FillStats::default());
        }

        let product_id = coin.product_id();
        tracing::debug!(source = self.source.name(), %product_id, windows = total,
            "filling cache gaps");

        let mut stats = FillStats::default();
        for (i, window) in windows.into_iter().enumerate() {
            let candles = self.fetch_window(&product_id, window, granularity)?;
            stats.windows += 1;
            stats.candles += candles.len();
            cached = self.cache.merge(cached, candles, window)?;
            progress.report(i + 1, total);
        }
        Ok(stats)
    }

    /// One sub-window with pacing and retry.
    fn fetch_window(
        &self,
        product_id: &str,
        window: TimeRange,
        granularity: Granularity,
    ) -> Result<Vec<Candle>, Error> {
        retry_with_backoff(
            &self.config.retry,
            SourceError::retry_delay,
            |attempt, err, backoff| {
                tracing::warn!(%product_id, %window, attempt, error = %err,
                    backoff_ms = backoff.as_millis() as u64, "transient fetch failure, retrying");
            },
            || {
                self.pace();
                self.source.fetch_candles(product_id, window, granularity)
            },
        )
        .map_err(|exhausted| Error::Fetch {
            product_id: product_id.to_string(),
            window,
            attempts: exhausted.attempts,
            source: exhausted.last_error,
        })
    }

    /// Block until the limiter grants the next request permit.
    fn pace(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        while let Err(not_until) = limiter.check() {
            std::thread::sleep(not_until.wait_time_from(self.clock.now()));
        }
    }
}

/// Cache gaps in `range`, split into windows the API serves in one call.
pub fn plan_windows(cached: &CachedSeries, range: TimeRange) -> Vec<TimeRange> {
    let max_width = cached.granularity().max_window_seconds();
    cached
        .missing_ranges(range.start, range.end)
        .into_iter()
        .flat_map(|gap| gap.split(max_width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_splits_gaps_at_300_candles() {
        let cached = CachedSeries::empty(Coin::Bitcoin, Granularity::OneMinute);
        let windows = plan_windows(&cached, TimeRange::new(0, 700 * 60));
        assert_eq!(
            windows,
            vec![
                TimeRange::new(0, 300 * 60),
                TimeRange::new(300 * 60, 600 * 60),
                TimeRange::new(600 * 60, 700 * 60),
            ]
        );
    }

    #[test]
    fn plan_skips_covered_ranges() {
        let mut cached = CachedSeries::empty(Coin::Bitcoin, Granularity::OneHour);
        cached.merge(Vec::new(), TimeRange::new(3600, 7200));
        let windows = plan_windows(&cached, TimeRange::new(0, 3 * 3600));
        assert_eq!(
            windows,
            vec![TimeRange::new(0, 3600), TimeRange::new(7200, 3 * 3600)]
        );
    }
}
