//! Convenience entry points over [`Fetcher`].

use crate::coin::Coin;
use crate::config::FetcherConfig;
use crate::data::fetcher::Fetcher;
use crate::data::progress::{NoProgress, ProgressSink};
use crate::domain::{Candle, Granularity, PriceSeries};
use crate::error::Error;
use crate::interpolate::InterpolationMode;
use crate::request::FetchRequest;
use chrono::{DateTime, Utc};

/// Fetch a shaped price series from Coinbase using the environment's config.
pub fn fetch_prices(
    coin: Coin,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
    mode: InterpolationMode,
) -> Result<PriceSeries, Error> {
    CoinData::new(FetchRequest::new(coin, start, end, granularity, mode)).fetch_prices()
}

/// Request-model wrapper: holds a [`FetchRequest`] and the config to run it with.
#[derive(Debug, Clone)]
pub struct CoinData {
    request: FetchRequest,
    config: FetcherConfig,
}

impl CoinData {
    pub fn new(request: FetchRequest) -> Self {
        Self {
            request,
            config: FetcherConfig::from_env(),
        }
    }

    pub fn with_config(mut self, config: FetcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn fetch_prices(&self) -> Result<PriceSeries, Error> {
        self.fetch_prices_with_progress(&mut NoProgress)
    }

    pub fn fetch_prices_with_progress(
        &self,
        progress: &mut dyn ProgressSink,
    ) -> Result<PriceSeries, Error> {
        // Fail on bad input before building an HTTP client.
        self.request.validate()?;
        Fetcher::coinbase(self.config.clone())?.fetch_prices(&self.request, progress)
    }

    pub fn fetch_candles(&self, progress: &mut dyn ProgressSink) -> Result<Vec<Candle>, Error> {
        self.request.validate()?;
        Fetcher::coinbase(self.config.clone())?.fetch_candles(&self.request, progress)
    }
}
