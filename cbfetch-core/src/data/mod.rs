//! Candle download, caching and progress reporting

pub mod cache;
pub mod coinbase;
pub mod fetcher;
pub mod prefetch;
pub mod progress;
pub mod provider;
pub mod retry;

pub use cache::{CacheError, CacheStatus, CachedSeries, CandleCache, MergeOutcome};
pub use coinbase::CoinbaseClient;
pub use fetcher::{plan_windows, FillStats, Fetcher};
pub use prefetch::{prefetch, PrefetchOptions, PrefetchSummary};
pub use progress::{NoProgress, ProgressSink, TextProgress};
pub use provider::{CandleSource, SourceError};
pub use retry::{retry_with_backoff, RetryExhausted, RetryPolicy};

#[cfg(feature = "rich-progress")]
pub use progress::RichProgress;
