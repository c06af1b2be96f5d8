//! cbfetch core: historical Coinbase candles behind a self-healing local cache.
//!
//! This crate contains:
//! - Domain types (candles, granularities, half-open time ranges, price series)
//! - The supported coin registry
//! - A per-(coin, granularity) on-disk cache with coverage tracking
//! - The Coinbase Exchange candle client, retry policy and request pacing
//! - Gap-filling fetch orchestration and batch prefetch
//! - Interpolation of candles into a single price series

pub mod api;
pub mod coin;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod interpolate;
pub mod request;

pub use api::{fetch_prices, CoinData};
pub use coin::Coin;
pub use config::FetcherConfig;
pub use data::{Fetcher, NoProgress, ProgressSink, TextProgress};
pub use domain::{Candle, Granularity, PricePoint, PriceSeries, TimeRange};
pub use error::Error;
pub use interpolate::{shape, InterpolationMode};
pub use request::FetchRequest;
