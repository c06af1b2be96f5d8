//! Candle cache: one CSV file per (coin, granularity).
//!
//! Layout: `{cache_dir}/{coin}/{granularity}.csv` plus a
//! `{granularity}.meta.json` sidecar.
//!
//! Features:
//! - Coverage tracking (which ranges were fetched, even when the exchange had
//!   no trades and returned no candles)
//! - Newest-fetch-wins merge, deduplicated by timestamp
//! - Forward fills append to the CSV; out-of-order merges rewrite it atomically
//! - Integrity validation on load (blake3 hash, ordering, alignment)
//! - Recovery when the sidecar lags the CSV after a crash
//! - Quarantine for corrupt files ({filename}.quarantined)
//!
//! The CSV is always written before the sidecar, so the sidecar never claims
//! coverage the CSV does not hold.

use crate::coin::Coin;
use crate::domain::range::{insert_coalesced, subtract};
use crate::domain::{Candle, Granularity, TimeRange};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt cache file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("cache serialization error: {0}")]
    Serialize(String),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, CacheError::Corrupt { .. })
    }
}

const CSV_HEADER: [&str; 7] = ["timestamp", "time", "open", "high", "low", "close", "volume"];

/// Candles for one (coin, granularity) plus the ranges already fetched.
///
/// Invariants: candle timestamps are strictly increasing and aligned to the
/// granularity; coverage ranges are aligned, sorted, disjoint and never touch.
#[derive(Debug, Clone)]
pub struct CachedSeries {
    coin: Coin,
    granularity: Granularity,
    candles: Vec<Candle>,
    coverage: Vec<TimeRange>,
    /// Digest of the CSV as last read or written; `None` until it touches disk.
    disk: Option<DiskState>,
}

impl PartialEq for CachedSeries {
    fn eq(&self, other: &Self) -> bool {
        self.coin == other.coin
            && self.granularity == other.granularity
            && self.candles == other.candles
            && self.coverage == other.coverage
    }
}

/// Running hash of the CSV bytes, extended in place on append.
#[derive(Clone)]
struct DiskState {
    hasher: blake3::Hasher,
    len: u64,
}

impl DiskState {
    fn of(bytes: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(bytes);
        Self {
            hasher,
            len: bytes.len() as u64,
        }
    }

    fn extend(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.len += bytes.len() as u64;
    }

    fn hex(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Debug for DiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskState").field("len", &self.len).finish_non_exhaustive()
    }
}

/// What a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub replaced: usize,
    pub rejected: usize,
    /// Every accepted candle landed after the previous last candle.
    pub appended: bool,
}

impl CachedSeries {
    pub fn empty(coin: Coin, granularity: Granularity) -> Self {
        Self {
            coin,
            granularity,
            candles: Vec::new(),
            coverage: Vec::new(),
            disk: None,
        }
    }

    pub fn coin(&self) -> Coin {
        self.coin
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn coverage(&self) -> &[TimeRange] {
        &self.coverage
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty() && self.coverage.is_empty()
    }

    /// Gaps between `[start, end)` (rounded outward to buckets) and coverage.
    pub fn missing_ranges(&self, start: i64, end: i64) -> Vec<TimeRange> {
        let wanted = TimeRange::new(start, end).aligned(self.granularity);
        if wanted.is_empty() {
            return Vec::new();
        }
        subtract(wanted, &self.coverage)
    }

    /// Candles whose bucket starts inside `range`.
    pub fn slice(&self, range: TimeRange) -> &[Candle] {
        let lo = self.candles.partition_point(|c| c.timestamp < range.start);
        let hi = self.candles.partition_point(|c| c.timestamp < range.end);
        &self.candles[lo..hi.max(lo)]
    }

    /// Merge freshly fetched candles in memory. The newest value wins on a
    /// timestamp collision; misaligned or malformed candles are rejected.
    /// `fetched` is recorded as covered.
    pub fn merge(&mut self, new_candles: Vec<Candle>, fetched: TimeRange) -> MergeOutcome {
        let g = self.granularity;
        let mut outcome = MergeOutcome::default();

        let mut incoming: Vec<Candle> = Vec::with_capacity(new_candles.len());
        for candle in new_candles {
            if g.is_aligned(candle.timestamp) && candle.is_sane() {
                incoming.push(candle);
            } else {
                outcome.rejected += 1;
            }
        }
        // Stable sort, then keep the last occurrence of a repeated timestamp.
        incoming.sort_by_key(|c| c.timestamp);
        incoming.reverse();
        let before_dedup = incoming.len();
        incoming.dedup_by_key(|c| c.timestamp);
        incoming.reverse();
        outcome.replaced += before_dedup - incoming.len();

        let past_tail = match (self.candles.last(), incoming.first()) {
            (Some(last), Some(first)) => first.timestamp > last.timestamp,
            _ => true,
        };
        if past_tail {
            outcome.added += incoming.len();
            outcome.appended = true;
            self.candles.extend(incoming);
        } else {
            let mut by_ts: BTreeMap<i64, Candle> =
                self.candles.drain(..).map(|c| (c.timestamp, c)).collect();
            for candle in incoming {
                match by_ts.insert(candle.timestamp, candle) {
                    Some(_) => outcome.replaced += 1,
                    None => outcome.added += 1,
                }
            }
            self.candles = by_ts.into_values().collect();
        }

        insert_coalesced(&mut self.coverage, fetched.aligned(g));
        outcome
    }

    fn validate(&self) -> Result<(), String> {
        let g = self.granularity;
        for pair in self.candles.windows(2) {
            if pair[0].timestamp >= pair[1].timestamp {
                return Err(format!(
                    "timestamps not strictly increasing at {}",
                    pair[1].timestamp
                ));
            }
        }
        if let Some(c) = self.candles.iter().find(|c| !g.is_aligned(c.timestamp)) {
            return Err(format!("timestamp {} not aligned to {g}s", c.timestamp));
        }
        for r in &self.coverage {
            if r.is_empty() || !g.is_aligned(r.start) || !g.is_aligned(r.end) {
                return Err(format!("invalid coverage range {r:?}"));
            }
        }
        for pair in self.coverage.windows(2) {
            if pair[0].end >= pair[1].start {
                return Err(format!("coverage ranges overlap at {}", pair[1].start));
            }
        }
        Ok(())
    }
}

/// Metadata sidecar for one cached series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub coin: Coin,
    pub granularity: Granularity,
    pub candle_count: usize,
    pub coverage: Vec<TimeRange>,
    pub data_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// One CSV row. `time` is only there for humans reading the file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    timestamp: i64,
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl From<&Candle> for CacheRow {
    fn from(c: &Candle) -> Self {
        let time = c
            .datetime()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        Self {
            timestamp: c.timestamp,
            time,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
        }
    }
}

impl From<CacheRow> for Candle {
    fn from(r: CacheRow) -> Self {
        Candle {
            timestamp: r.timestamp,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        }
    }
}

/// Cache status for a single (coin, granularity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub coin: Coin,
    pub granularity: Granularity,
    pub candle_count: usize,
    pub first_covered: Option<DateTime<Utc>>,
    pub last_covered: Option<DateTime<Utc>>,
    pub gap_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// The on-disk candle cache.
#[derive(Debug, Clone)]
pub struct CandleCache {
    cache_dir: PathBuf,
}

impl CandleCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory for a coin: `{cache_dir}/{coin}/`
    fn coin_dir(&self, coin: Coin) -> PathBuf {
        self.cache_dir.join(coin.slug())
    }

    /// Candle file: `{cache_dir}/{coin}/{granularity}.csv`
    pub fn data_path(&self, coin: Coin, granularity: Granularity) -> PathBuf {
        self.coin_dir(coin)
            .join(format!("{}.csv", granularity.seconds()))
    }

    /// Sidecar: `{cache_dir}/{coin}/{granularity}.meta.json`
    pub fn meta_path(&self, coin: Coin, granularity: Granularity) -> PathBuf {
        self.coin_dir(coin)
            .join(format!("{}.meta.json", granularity.seconds()))
    }

    /// Load the cached series. Empty when nothing has been cached yet.
    ///
    /// Any inconsistency between the CSV and its sidecar is reported as
    /// [`CacheError::Corrupt`]; partial data is never returned.
    pub fn load(&self, coin: Coin, granularity: Granularity) -> Result<CachedSeries, CacheError> {
        let data_path = self.data_path(coin, granularity);
        let meta_path = self.meta_path(coin, granularity);

        match (data_path.exists(), meta_path.exists()) {
            (false, false) => return Ok(CachedSeries::empty(coin, granularity)),
            (true, false) => return Err(CacheError::corrupt(&meta_path, "metadata sidecar missing")),
            (false, true) => return Err(CacheError::corrupt(&data_path, "candle file missing")),
            (true, true) => {}
        }

        let meta = self.read_meta(&meta_path, coin, granularity)?;
        let bytes = fs::read(&data_path).map_err(|e| CacheError::io(&data_path, e))?;
        let disk = DiskState::of(&bytes);
        if disk.hex() != meta.data_hash {
            return Err(CacheError::corrupt(&data_path, "content hash mismatch"));
        }

        let candles = decode_rows(&data_path, &bytes)?;
        if candles.len() != meta.candle_count {
            return Err(CacheError::corrupt(
                &data_path,
                format!("expected {} rows, found {}", meta.candle_count, candles.len()),
            ));
        }

        let series = CachedSeries {
            coin,
            granularity,
            candles,
            coverage: meta.coverage,
            disk: Some(disk),
        };
        series
            .validate()
            .map_err(|reason| CacheError::corrupt(&data_path, reason))?;
        Ok(series)
    }

    /// Load, repairing a sidecar that lags its CSV. Anything else that is
    /// corrupt is quarantined and the series starts over empty.
    pub fn load_or_recover(
        &self,
        coin: Coin,
        granularity: Granularity,
    ) -> Result<CachedSeries, CacheError> {
        let err = match self.load(coin, granularity) {
            Err(e) if e.is_corrupt() => e,
            other => return other,
        };

        match self.salvage(coin, granularity) {
            Ok(series) => {
                tracing::warn!(%coin, granularity = granularity.seconds(), error = %err,
                    candles = series.candles.len(), "rebuilt cache sidecar from candle file");
                Ok(series)
            }
            Err(salvage_err) if salvage_err.is_corrupt() => {
                tracing::warn!(%coin, granularity = granularity.seconds(), error = %err,
                    "quarantining corrupt cache; it will be rebuilt");
                self.quarantine(coin, granularity)?;
                Ok(CachedSeries::empty(coin, granularity))
            }
            Err(salvage_err) => Err(salvage_err),
        }
    }

    /// Rebuild a series whose sidecar is missing or older than the CSV, as
    /// left behind when a process dies between the two writes.
    ///
    /// Merges only add or replace candles and only grow coverage, so the
    /// CSV's complete rows paired with the old sidecar's coverage are a
    /// consistent, if slightly stale, series.
    fn salvage(&self, coin: Coin, granularity: Granularity) -> Result<CachedSeries, CacheError> {
        let data_path = self.data_path(coin, granularity);
        let meta_path = self.meta_path(coin, granularity);
        if !data_path.exists() {
            return Err(CacheError::corrupt(&data_path, "candle file missing"));
        }

        let (coverage, min_rows) = if meta_path.exists() {
            let meta = self.read_meta(&meta_path, coin, granularity)?;
            (meta.coverage, meta.candle_count)
        } else {
            (Vec::new(), 0)
        };

        let bytes = fs::read(&data_path).map_err(|e| CacheError::io(&data_path, e))?;
        // An interrupted append leaves an unterminated last line.
        let complete = match bytes.iter().rposition(|&b| b == b'\n') {
            Some(i) => &bytes[..=i],
            None => &bytes[..0],
        };
        let candles = decode_rows(&data_path, complete)?;
        if candles.len() < min_rows {
            return Err(CacheError::corrupt(
                &data_path,
                format!("sidecar records {min_rows} rows, file holds {}", candles.len()),
            ));
        }

        let mut series = CachedSeries {
            coin,
            granularity,
            candles,
            coverage,
            disk: None,
        };
        series
            .validate()
            .map_err(|reason| CacheError::corrupt(&data_path, reason))?;
        self.save(&mut series)?;
        Ok(series)
    }

    /// Rewrite both files. Each is replaced atomically (write .tmp, rename),
    /// CSV first.
    pub fn save(&self, series: &mut CachedSeries) -> Result<(), CacheError> {
        let dir = self.coin_dir(series.coin);
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let bytes = encode_rows(&series.candles, true)?;
        let disk = DiskState::of(&bytes);
        write_atomic(&self.data_path(series.coin, series.granularity), &bytes)?;
        self.write_meta(series, disk.hex())?;
        series.disk = Some(disk);
        Ok(())
    }

    /// Append `series.candles[from..]` to the CSV and refresh the sidecar.
    fn append(&self, series: &mut CachedSeries, from: usize) -> Result<(), CacheError> {
        let bytes = encode_rows(&series.candles[from..], false)?;
        let path = self.data_path(series.coin, series.granularity);
        if !bytes.is_empty() {
            let mut file = fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(|e| CacheError::io(&path, e))?;
            file.write_all(&bytes)
                .and_then(|()| file.sync_data())
                .map_err(|e| CacheError::io(&path, e))?;
        }

        let Some(disk) = series.disk.as_mut() else {
            return Err(CacheError::Serialize("append before first save".into()));
        };
        disk.extend(&bytes);
        let hash = disk.hex();
        self.write_meta(series, hash)
    }

    fn write_meta(&self, series: &CachedSeries, data_hash: String) -> Result<(), CacheError> {
        let meta = CacheMeta {
            coin: series.coin,
            granularity: series.granularity,
            candle_count: series.candles.len(),
            coverage: series.coverage.clone(),
            data_hash,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| CacheError::Serialize(format!("meta: {e}")))?;
        write_atomic(&self.meta_path(series.coin, series.granularity), &json)
    }

    /// Merge candles fetched for `fetched` into `cached` and persist the result.
    ///
    /// Forward fills append to the CSV; anything landing before the last
    /// cached candle rewrites the file.
    pub fn merge(
        &self,
        mut cached: CachedSeries,
        new_candles: Vec<Candle>,
        fetched: TimeRange,
    ) -> Result<CachedSeries, CacheError> {
        let tail = cached.candles.len();
        let outcome = cached.merge(new_candles, fetched);
        if outcome.rejected > 0 {
            tracing::warn!(coin = %cached.coin, rejected = outcome.rejected,
                "dropped misaligned or malformed candles");
        }
        tracing::debug!(coin = %cached.coin, window = %fetched, added = outcome.added,
            replaced = outcome.replaced, appended = outcome.appended, "merged candles into cache");

        if outcome.appended && cached.disk.is_some() {
            self.append(&mut cached, tail)?;
        } else {
            self.save(&mut cached)?;
        }
        Ok(cached)
    }

    /// Move a (coin, granularity) pair's files aside as `*.quarantined`.
    pub fn quarantine(&self, coin: Coin, granularity: Granularity) -> Result<(), CacheError> {
        for path in [self.data_path(coin, granularity), self.meta_path(coin, granularity)] {
            if path.exists() {
                let mut target = path.clone().into_os_string();
                target.push(".quarantined");
                fs::rename(&path, &target).map_err(|e| CacheError::io(&path, e))?;
            }
        }
        Ok(())
    }

    /// Every cached (coin, granularity) pair with a readable sidecar.
    pub fn status(&self) -> Vec<CacheStatus> {
        let mut statuses = Vec::new();
        for coin in Coin::ALL {
            for granularity in Granularity::ALL {
                let path = self.meta_path(coin, granularity);
                if !path.exists() {
                    continue;
                }
                match self.read_meta(&path, coin, granularity) {
                    Ok(meta) => statuses.push(CacheStatus {
                        coin,
                        granularity,
                        candle_count: meta.candle_count,
                        first_covered: meta.coverage.first().and_then(|r| r.start_datetime()),
                        last_covered: meta.coverage.last().and_then(|r| r.end_datetime()),
                        gap_count: meta.coverage.len().saturating_sub(1),
                        updated_at: meta.updated_at,
                    }),
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable cache sidecar"),
                }
            }
        }
        statuses
    }

    fn read_meta(
        &self,
        path: &Path,
        coin: Coin,
        granularity: Granularity,
    ) -> Result<CacheMeta, CacheError> {
        let meta = read_meta_file(path)?;
        if meta.coin != coin || meta.granularity != granularity {
            return Err(CacheError::corrupt(
                path,
                format!(
                    "sidecar describes {}/{} instead of {coin}/{granularity}",
                    meta.coin, meta.granularity
                ),
            ));
        }
        Ok(meta)
    }
}

fn read_meta_file(path: &Path) -> Result<CacheMeta, CacheError> {
    let content = fs::read(path).map_err(|e| CacheError::io(path, e))?;
    serde_json::from_slice(&content)
        .map_err(|e| CacheError::corrupt(path, format!("unreadable sidecar: {e}")))
}

/// CSV rows for `candles`, optionally preceded by the header line.
fn encode_rows(candles: &[Candle], header: bool) -> Result<Vec<u8>, CacheError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if header {
        wtr.write_record(CSV_HEADER)
            .map_err(|e| CacheError::Serialize(format!("csv header: {e}")))?;
    }
    for candle in candles {
        wtr.serialize(CacheRow::from(candle))
            .map_err(|e| CacheError::Serialize(format!("candle row: {e}")))?;
    }
    wtr.into_inner()
        .map_err(|e| CacheError::Serialize(format!("csv flush: {e}")))
}

fn decode_rows(path: &Path, bytes: &[u8]) -> Result<Vec<Candle>, CacheError> {
    let mut rdr = csv::Reader::from_reader(bytes);
    let header = rdr
        .headers()
        .map_err(|e| CacheError::corrupt(path, format!("header: {e}")))?;
    if header.iter().ne(CSV_HEADER) {
        return Err(CacheError::corrupt(path, "unexpected CSV header"));
    }
    rdr.deserialize::<CacheRow>()
        .enumerate()
        .map(|(i, row)| {
            row.map(Candle::from)
                .map_err(|e| CacheError::corrupt(path, format!("row {i}: {e}")))
        })
        .collect()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| CacheError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CacheError::io(path, e)
    })
}
