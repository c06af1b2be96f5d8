//! cbfetch CLI: fetch, prefetch, and cache inspection commands.
//!
//! Commands:
//! - `fetch`: download (or read from cache) one coin's prices and print them as CSV
//! - `prefetch`: warm the cache with full history for many coins
//! - `coins`: list supported coins
//! - `cache status`: report what is cached per (coin, granularity)

use anyhow::{bail, Context, Result};
use cbfetch_core::data::prefetch::{prefetch, PrefetchOptions};
use cbfetch_core::data::{NoProgress, ProgressSink, TextProgress};
use cbfetch_core::request::{midnight_utc, yesterday};
use cbfetch_core::{Coin, Fetcher, FetchRequest, FetcherConfig, Granularity, InterpolationMode};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cbfetch",
    version,
    about = "Historical Coinbase candles with a local cache"
)]
struct Cli {
    /// Cache directory. Overrides the config file and CBFETCH_CACHE_DIR.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress display while downloading.
    #[arg(long, global = true, value_enum, default_value_t = ProgressStyle::Text)]
    progress: ProgressStyle,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProgressStyle {
    #[value(name = "none")]
    Off,
    Text,
    Rich,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch prices for one coin and write them to stdout as CSV.
    Fetch {
        /// Coin slug, ticker, or product id (e.g. bitcoin, BTC, BTC-USD).
        #[arg(default_value = "bitcoin")]
        coin: String,

        /// Start (YYYY-MM-DD or RFC 3339). Defaults to three months before --end.
        #[arg(long)]
        start: Option<String>,

        /// End (YYYY-MM-DD or RFC 3339). Defaults to yesterday.
        #[arg(long)]
        end: Option<String>,

        /// Candle width: 60, 300, 900, 3600, 21600, 86400 or 1m, 5m, 15m, 1h, 6h, 1d.
        #[arg(long, default_value = "1h")]
        granularity: Granularity,

        /// close, open, mean, or hi-lo.
        #[arg(long, default_value = "hi-lo")]
        mode: InterpolationMode,

        /// Print raw OHLCV candles instead of shaped prices.
        #[arg(long, default_value_t = false)]
        candles: bool,
    },
    /// Warm the cache with full history for the given coins (all if none given).
    Prefetch {
        coins: Vec<String>,

        /// Granularities to fetch. Defaults to every supported width.
        #[arg(long, value_delimiter = ',')]
        granularity: Vec<Granularity>,

        /// Last day to fetch (YYYY-MM-DD, exclusive). Defaults to yesterday.
        #[arg(long)]
        end: Option<String>,

        /// Also export each pair to `{coin}_{granularity}_{first}_{last}.csv`.
        #[arg(long, default_value_t = false)]
        export_csv: bool,
    },
    /// List supported coins.
    Coins,
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached coins, granularities, candle counts and covered spans.
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Fetch {
            coin,
            start,
            end,
            granularity,
            mode,
            candles,
        } => run_fetch(config, cli.progress, &coin, start, end, granularity, mode, candles),
        Commands::Prefetch {
            coins,
            granularity,
            end,
            export_csv,
        } => run_prefetch(config, cli.progress, coins, granularity, end, export_csv),
        Commands::Coins => {
            run_coins();
            Ok(())
        }
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&config),
        },
    }
}

fn load_config(cli: &Cli) -> Result<FetcherConfig> {
    let config = match &cli.config {
        Some(path) => FetcherConfig::from_file(path).map_err(anyhow::Error::msg)?,
        None => FetcherConfig::from_env(),
    };
    Ok(match &cli.cache_dir {
        Some(dir) => config.with_cache_dir(dir),
        None => config,
    })
}

fn make_progress(style: ProgressStyle, label: String) -> Box<dyn ProgressSink> {
    match style {
        ProgressStyle::Off => Box::new(NoProgress),
        ProgressStyle::Text => Box::new(TextProgress::new(label)),
        #[cfg(feature = "rich-progress")]
        ProgressStyle::Rich => Box::new(cbfetch_core::data::RichProgress::new(label)),
        #[cfg(not(feature = "rich-progress"))]
        ProgressStyle::Rich => {
            tracing::warn!("built without rich-progress; falling back to text progress");
            Box::new(TextProgress::new(label))
        }
    }
}

/// Accept a bare date (midnight UTC) or a full RFC 3339 timestamp.
fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(midnight_utc(date));
    }
    let dt = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid time '{s}' (expected YYYY-MM-DD or RFC 3339)"))?;
    Ok(dt.with_timezone(&Utc))
}

#[allow(clippy::too_many_arguments)]
fn run_fetch(
    config: FetcherConfig,
    style: ProgressStyle,
    coin: &str,
    start: Option<String>,
    end: Option<String>,
    granularity: Granularity,
    mode: InterpolationMode,
    raw_candles: bool,
) -> Result<()> {
    let coin: Coin = coin.parse()?;
    let defaults = FetchRequest::default();
    let end = end.as_deref().map(parse_time).transpose()?.unwrap_or(defaults.end);
    let start = match start.as_deref() {
        Some(s) => parse_time(s)?,
        None => end - (defaults.end - defaults.start),
    };
    let request = FetchRequest::new(coin, start, end, granularity, mode);

    let fetcher = Fetcher::coinbase(config)?;
    let mut progress = make_progress(style, format!("{} {}", coin.product_id(), granularity.label()));
    let stdout = io::stdout().lock();

    if raw_candles {
        let candles = fetcher.fetch_candles(&request, progress.as_mut())?;
        cbfetch_core::data::prefetch::write_candles_csv(&candles, stdout)?;
    } else {
        let prices = fetcher.fetch_prices(&request, progress.as_mut())?;
        prices.write_csv(stdout)?;
    }
    Ok(())
}

fn run_prefetch(
    config: FetcherConfig,
    style: ProgressStyle,
    coins: Vec<String>,
    granularities: Vec<Granularity>,
    end: Option<String>,
    export_csv: bool,
) -> Result<()> {
    let coins: Vec<Coin> = if coins.is_empty() {
        Coin::ALL.to_vec()
    } else {
        coins
            .iter()
            .map(|c| c.parse::<Coin>())
            .collect::<Result<_, _>>()?
    };
    let granularities = if granularities.is_empty() {
        Granularity::ALL.to_vec()
    } else {
        granularities
    };
    let end = end
        .as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()?
        .unwrap_or_else(yesterday);

    let fetcher = Fetcher::coinbase(config)?;
    let options = PrefetchOptions { end, export_csv };
    let summary = prefetch(&fetcher, &coins, &granularities, &options, &mut |coin, g| {
        make_progress(style, format!("{} {}", coin.product_id(), g.label()))
    });

    println!(
        "Prefetched {}/{} pairs into {}",
        summary.succeeded,
        summary.total,
        fetcher.cache().cache_dir().display()
    );
    for path in &summary.exported {
        println!("Exported {}", path.display());
    }
    if !summary.all_succeeded() {
        for (coin, g, err) in &summary.errors {
            eprintln!("Error for {coin} {}: {err}", g.label());
        }
        bail!("{} of {} pairs failed", summary.failed, summary.total);
    }
    Ok(())
}

fn run_coins() {
    println!("{:<28} {:<8} {:<12} {:>12}", "Coin", "Ticker", "Product", "History from");
    println!("{}", "-".repeat(63));
    for coin in Coin::ALL {
        println!(
            "{:<28} {:<8} {:<12} {:>12}",
            coin.slug(),
            coin.ticker(),
            coin.product_id(),
            coin.history_start()
        );
    }
}

fn run_cache_status(config: &FetcherConfig) -> Result<()> {
    let cache = cbfetch_core::data::CandleCache::new(&config.cache_dir);
    if !cache.cache_dir().exists() {
        println!("Cache directory does not exist: {}", cache.cache_dir().display());
        return Ok(());
    }

    let statuses = cache.status();
    if statuses.is_empty() {
        println!("Cache is empty: {}", cache.cache_dir().display());
        return Ok(());
    }

    let fmt_time = |t: Option<DateTime<Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into())
    };

    println!("Cache: {}", cache.cache_dir().display());
    println!("Series: {}", statuses.len());
    println!();
    println!(
        "{:<20} {:<6} {:>9} {:<17} {:<17} {:>5}",
        "Coin", "Gran", "Candles", "From", "To", "Gaps"
    );
    println!("{}", "-".repeat(79));
    for s in &statuses {
        println!(
            "{:<20} {:<6} {:>9} {:<17} {:<17} {:>5}",
            s.coin.slug(),
            s.granularity.label(),
            s.candle_count,
            fmt_time(s.first_covered),
            fmt_time(s.last_covered),
            s.gap_count
        );
    }
    Ok(())
}
