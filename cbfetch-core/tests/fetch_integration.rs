//! Integration tests for the fetch pipeline driven by a scripted candle source.

use cbfetch_core::coin::Coin;
use cbfetch_core::config::FetcherConfig;
use cbfetch_core::data::prefetch::{prefetch, PrefetchOptions};
use cbfetch_core::data::progress::{NoProgress, ProgressSink};
use cbfetch_core::data::provider::{CandleSource, SourceError};
use cbfetch_core::data::retry::RetryPolicy;
use cbfetch_core::data::Fetcher;
use cbfetch_core::domain::{Candle, Granularity, TimeRange};
use cbfetch_core::error::Error;
use cbfetch_core::interpolate::InterpolationMode;
use cbfetch_core::request::FetchRequest;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

/// 2023-01-01T00:00:00Z
const T0: i64 = 1_672_531_200;
const HOUR: i64 = 3600;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Deterministic candle for a bucket; alternates bullish and bearish.
fn synthetic(timestamp: i64) -> Candle {
    let base = 100.0 + ((timestamp / 60) % 97) as f64;
    let (open, close) = if (timestamp / 60) % 2 == 0 {
        (base, base + 1.0)
    } else {
        (base + 1.0, base)
    };
    Candle {
        timestamp,
        open,
        high: base + 2.0,
        low: base - 1.0,
        close,
        volume: 10.0,
    }
}

/// Candle source that serves synthetic candles, records every request, and
/// can be told to fail.
#[derive(Default)]
struct ScriptedSource {
    calls: RefCell<Vec<TimeRange>>,
    call_times: RefCell<Vec<Instant>>,
    failures: RefCell<VecDeque<SourceError>>,
    always_fail: Cell<bool>,
    /// Buckets with no trades: the exchange simply omits them.
    empty_buckets: Vec<i64>,
}

impl ScriptedSource {
    fn failing_first(errors: impl IntoIterator<Item = SourceError>) -> Self {
        Self {
            failures: RefCell::new(errors.into_iter().collect()),
            ..Default::default()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl CandleSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch_candles(
        &self,
        _product_id: &str,
        window: TimeRange,
        granularity: Granularity,
    ) -> Result<Vec<Candle>, SourceError> {
        self.calls.borrow_mut().push(window);
        self.call_times.borrow_mut().push(Instant::now());
        if self.always_fail.get() {
            return Err(SourceError::ServerError { status: 503 });
        }
        if let Some(err) = self.failures.borrow_mut().pop_front() {
            return Err(err);
        }
        let step = granularity.seconds();
        let mut candles: Vec<Candle> = (window.start..window.end)
            .step_by(step as usize)
            .filter(|t| !self.empty_buckets.contains(t))
            .map(synthetic)
            .collect();
        // Coinbase returns newest first.
        candles.reverse();
        Ok(candles)
    }
}

fn config(dir: &Path, attempts: u32) -> FetcherConfig {
    FetcherConfig::default()
        .with_cache_dir(dir)
        .with_request_delay(Duration::ZERO)
        .with_retry(RetryPolicy::immediate(attempts))
}

fn hourly_request(start: i64, end: i64, mode: InterpolationMode) -> FetchRequest {
    FetchRequest::new(Coin::Bitcoin, ts(start), ts(end), Granularity::OneHour, mode)
}

struct CountingProgress(Vec<(usize, usize)>);

impl ProgressSink for CountingProgress {
    fn report(&mut self, current: usize, total: usize) {
        self.0.push((current, total));
    }
}

#[test]
fn empty_cache_fetch_returns_full_range() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let fetcher = Fetcher::new(&source, config(dir.path(), 1));

    let request = hourly_request(T0, T0 + 48 * HOUR, InterpolationMode::Close);
    let prices = fetcher.fetch_prices(&request, &mut NoProgress).unwrap();

    assert_eq!(prices.len(), 48);
    assert_eq!(source.call_count(), 1);
    let expected: Vec<i64> = (0..48).map(|i| T0 + i * HOUR).collect();
    assert_eq!(prices.timestamps(), expected);

    let cached = fetcher.cache().load(Coin::Bitcoin, Granularity::OneHour).unwrap();
    assert_eq!(cached.coverage(), &[TimeRange::new(T0, T0 + 48 * HOUR)]);
    assert!(cached.missing_ranges(T0, T0 + 48 * HOUR).is_empty());
}

#[test]
fn second_identical_fetch_makes_no_requests() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let fetcher = Fetcher::new(&source, config(dir.path(), 1));
    let request = hourly_request(T0, T0 + 72 * HOUR, InterpolationMode::HiLo);

    let first = fetcher.fetch_prices(&request, &mut NoProgress).unwrap();
    let calls_after_first = source.call_count();
    let second = fetcher.fetch_prices(&request, &mut NoProgress).unwrap();

    assert_eq!(source.call_count(), calls_after_first);
    assert_eq!(first, second);
    assert_eq!(second.len(), 2 * 72);
}

#[test]
fn buckets_without_trades_are_not_refetched() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource {
        empty_buckets: vec![T0 + 3 * HOUR, T0 + 4 * HOUR],
        ..Default::default()
    };
    let fetcher = Fetcher::new(&source, config(dir.path(), 1));
    let request = hourly_request(T0, T0 + 10 * HOUR, InterpolationMode::Close);

    let candles = fetcher.fetch_candles(&request, &mut NoProgress).unwrap();
    assert_eq!(candles.len(), 8);

    fetcher.fetch_candles(&request, &mut NoProgress).unwrap();
    assert_eq!(source.call_count(), 1);
}

#[test]
fn overlapping_requests_build_the_same_cache_as_one_request() {
    let split_dir = tempfile::tempdir().unwrap();
    let split_source = ScriptedSource::default();
    let split = Fetcher::new(&split_source, config(split_dir.path(), 1));
    split
        .fetch_candles(&hourly_request(T0, T0 + 30 * HOUR, InterpolationMode::Close), &mut NoProgress)
        .unwrap();
    split
        .fetch_candles(
            &hourly_request(T0 + 20 * HOUR, T0 + 48 * HOUR, InterpolationMode::Close),
            &mut NoProgress,
        )
        .unwrap();

    // Only the uncovered tail was requested the second time.
    assert_eq!(
        split_source.calls.borrow().last().copied(),
        Some(TimeRange::new(T0 + 30 * HOUR, T0 + 48 * HOUR))
    );

    let whole_dir = tempfile::tempdir().unwrap();
    let whole_source = ScriptedSource::default();
    let whole = Fetcher::new(&whole_source, config(whole_dir.path(), 1));
    whole
        .fetch_candles(&hourly_request(T0, T0 + 48 * HOUR, InterpolationMode::Close), &mut NoProgress)
        .unwrap();

    let a = split.cache().load(Coin::Bitcoin, Granularity::OneHour).unwrap();
    let b = whole.cache().load(Coin::Bitcoin, Granularity::OneHour).unwrap();
    assert_eq!(a.candles(), b.candles());
    assert_eq!(a.coverage(), b.coverage());
}

#[test]
fn long_ranges_are_split_into_300_candle_windows() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let fetcher = Fetcher::new(&source, config(dir.path(), 1));
    let request = FetchRequest::new(
        Coin::Ethereum,
        ts(T0),
        ts(T0 + 700 * 60),
        Granularity::OneMinute,
        InterpolationMode::Open,
    );

    let mut progress = CountingProgress(Vec::new());
    let prices = fetcher.fetch_prices(&request, &mut progress).unwrap();

    assert_eq!(prices.len(), 700);
    assert_eq!(source.call_count(), 3);
    for window in source.calls.borrow().iter() {
        assert!(window.len_seconds() <= 300 * 60);
    }
    assert_eq!(progress.0, vec![(1, 3), (2, 3), (3, 3)]);
}

#[test]
fn requests_are_spaced_by_the_configured_delay() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let delay = Duration::from_millis(20);
    let fetcher = Fetcher::new(&source, config(dir.path(), 1).with_request_delay(delay));
    let request = FetchRequest::new(
        Coin::Bitcoin,
        ts(T0),
        ts(T0 + 900 * 60),
        Granularity::OneMinute,
        InterpolationMode::Close,
    );

    fetcher.fetch_candles(&request, &mut NoProgress).unwrap();

    let times = source.call_times.borrow();
    assert_eq!(times.len(), 3);
    // The limiter keeps its own clock; allow a millisecond of skew.
    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= delay - Duration::from_millis(1), "gap {gap:?}");
    }
}

#[test]
fn transient_failures_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::failing_first([
        SourceError::RateLimited {
            retry_after_secs: None,
        },
        SourceError::Timeout("slow".into()),
    ]);
    let fetcher = Fetcher::new(&source, config(dir.path(), 5));

    let candles = fetcher
        .fetch_candles(&hourly_request(T0, T0 + 24 * HOUR, InterpolationMode::Close), &mut NoProgress)
        .unwrap();

    assert_eq!(candles.len(), 24);
    assert_eq!(source.call_count(), 3);
}

#[test]
fn exhausted_retries_fail_and_leave_cache_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let fetcher = Fetcher::new(&source, config(dir.path(), 3));

    fetcher
        .fetch_candles(&hourly_request(T0, T0 + 24 * HOUR, InterpolationMode::Close), &mut NoProgress)
        .unwrap();
    let before = fetcher.cache().load(Coin::Bitcoin, Granularity::OneHour).unwrap();
    let calls_before = source.call_count();

    source.always_fail.set(true);
    let err = fetcher
        .fetch_candles(
            &hourly_request(T0 + 24 * HOUR, T0 + 48 * HOUR, InterpolationMode::Close),
            &mut NoProgress,
        )
        .unwrap_err();

    match err {
        Error::Fetch {
            attempts, window, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(window, TimeRange::new(T0 + 24 * HOUR, T0 + 48 * HOUR));
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
    assert_eq!(source.call_count(), calls_before + 3);

    let after = fetcher.cache().load(Coin::Bitcoin, Granularity::OneHour).unwrap();
    assert_eq!(before, after);
}

#[test]
fn permanent_failures_are_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::failing_first([SourceError::ProductNotFound {
        product_id: "BTC-USD".into(),
    }]);
    let fetcher = Fetcher::new(&source, config(dir.path(), 5));

    let err = fetcher
        .fetch_candles(&hourly_request(T0, T0 + 24 * HOUR, InterpolationMode::Close), &mut NoProgress)
        .unwrap_err();

    assert!(matches!(err, Error::Fetch { attempts: 1, .. }));
    assert_eq!(source.call_count(), 1);
}

#[test]
fn corrupt_cache_is_quarantined_and_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let fetcher = Fetcher::new(&source, config(dir.path(), 1));
    let request = hourly_request(T0, T0 + 12 * HOUR, InterpolationMode::Close);

    fetcher.fetch_candles(&request, &mut NoProgress).unwrap();
    let data_path = fetcher.cache().data_path(Coin::Bitcoin, Granularity::OneHour);
    std::fs::write(&data_path, "timestamp,time,open\nnot,a,candle\n").unwrap();

    let candles = fetcher.fetch_candles(&request, &mut NoProgress).unwrap();

    assert_eq!(candles.len(), 12);
    assert_eq!(source.call_count(), 2);
    let mut quarantined = data_path.clone().into_os_string();
    quarantined.push(".quarantined");
    assert!(Path::new(&quarantined).exists());
    fetcher.cache().load(Coin::Bitcoin, Granularity::OneHour).unwrap();
}

#[test]
fn invalid_request_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let fetcher = Fetcher::new(&source, config(&dir.path().join("cache"), 1));

    let err = fetcher
        .fetch_candles(&hourly_request(T0 + HOUR, T0, InterpolationMode::Close), &mut NoProgress)
        .unwrap_err();

    assert!(err.is_invalid_input());
    assert_eq!(source.call_count(), 0);
    assert!(!dir.path().join("cache").exists());
}

#[test]
fn prefetch_reports_failures_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::failing_first([SourceError::ProductNotFound {
        product_id: "SOL-USD".into(),
    }]);
    let fetcher = Fetcher::new(&source, config(dir.path(), 1));
    let options = PrefetchOptions {
        end: NaiveDate::from_ymd_opt(2017, 1, 11).unwrap(),
        export_csv: true,
    };

    let summary = prefetch(
        &fetcher,
        &[Coin::Solana, Coin::Cardano],
        &[Granularity::OneDay],
        &options,
        &mut |_, _| Box::new(NoProgress) as Box<dyn ProgressSink>,
    );

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors[0].0, Coin::Solana);
    assert!(!summary.all_succeeded());

    let cached = fetcher.cache().load(Coin::Cardano, Granularity::OneDay).unwrap();
    assert_eq!(cached.candles().len(), 10);
    assert_eq!(summary.exported.len(), 1);
    assert!(summary.exported[0].ends_with("ada_86400_2017-01-01_2017-01-10.csv"));
    assert!(summary.exported[0].exists());
}
