//! Cache warming: fetch full history for many (coin, granularity) pairs.

use super::cache::CacheError;
use super::fetcher::Fetcher;
use super::progress::ProgressSink;
use super::provider::CandleSource;
use crate::coin::Coin;
use crate::domain::{Candle, Granularity};
use crate::error::Error;
use crate::interpolate::InterpolationMode;
use crate::request::{midnight_utc, FetchRequest};
use chrono::NaiveDate;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Options for a prefetch run.
#[derive(Debug, Clone)]
pub struct PrefetchOptions {
    /// Last day to fetch (exclusive bound at midnight UTC).
    pub end: NaiveDate,
    /// Also export each pair's candles to a CSV next to the cache.
    pub export_csv: bool,
}

/// Summary of a batch prefetch.
#[derive(Debug, Default)]
pub struct PrefetchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(Coin, Granularity, Error)>,
    pub exported: Vec<PathBuf>,
}

impl PrefetchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Warm the cache for every (coin, granularity) pair from the coin's history
/// start up to `options.end`. A failing pair is recorded and the batch moves on.
///
/// `make_progress` builds a progress sink per pair.
pub fn prefetch<S: CandleSource>(
    fetcher: &Fetcher<S>,
    coins: &[Coin],
    granularities: &[Granularity],
    options: &PrefetchOptions,
    make_progress: &mut dyn FnMut(Coin, Granularity) -> Box<dyn ProgressSink>,
) -> PrefetchSummary {
    let mut summary = PrefetchSummary {
        total: coins.len() * granularities.len(),
        ..Default::default()
    };

    for &coin in coins {
        for &granularity in granularities {
            let mut progress = make_progress(coin, granularity);
            match prefetch_pair(fetcher, coin, granularity, options, progress.as_mut()) {
                Ok(exported) => {
                    summary.succeeded += 1;
                    summary.exported.extend(exported);
                }
                Err(e) => {
                    tracing::error!(%coin, granularity = granularity.seconds(), error = %e,
                        "prefetch failed");
                    summary.errors.push((coin, granularity, e));
                    summary.failed += 1;
                }
            }
        }
    }

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        total = summary.total,
        "prefetch complete"
    );
    summary
}

fn prefetch_pair<S: CandleSource>(
    fetcher: &Fetcher<S>,
    coin: Coin,
    granularity: Granularity,
    options: &PrefetchOptions,
    progress: &mut dyn ProgressSink,
) -> Result<Option<PathBuf>, Error> {
    let request = FetchRequest::new(
        coin,
        midnight_utc(coin.history_start()),
        midnight_utc(options.end),
        granularity,
        InterpolationMode::Close,
    );
    let candles = fetcher.fetch_candles(&request, progress)?;

    if !options.export_csv || candles.is_empty() {
        return Ok(None);
    }
    let path = export_path(fetcher.cache().cache_dir(), coin, granularity, &candles);
    let file = fs::File::create(&path).map_err(|e| CacheError::Io {
        path: path.clone(),
        source: e,
    })?;
    write_candles_csv(&candles, file).map_err(|e| {
        CacheError::Serialize(format!("export {}: {e}", path.display()))
    })?;
    tracing::info!(path = %path.display(), rows = candles.len(), "exported candles");
    Ok(Some(path))
}

/// `{dir}/{coin}_{granularity}_{first-date}_{last-date}.csv`
pub fn export_path(dir: &Path, coin: Coin, granularity: Granularity, candles: &[Candle]) -> PathBuf {
    let date = |c: Option<&Candle>| {
        c.and_then(|c| c.datetime())
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    };
    dir.join(format!(
        "{coin}_{}_{}_{}.csv",
        granularity.seconds(),
        date(candles.first()),
        date(candles.last())
    ))
}

/// Write raw candles as CSV (`timestamp,open,high,low,close,volume`).
pub fn write_candles_csv<W: Write>(candles: &[Candle], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for candle in candles {
        wtr.serialize(candle)?;
    }
    wtr.flush()?;
    Ok(())
}
