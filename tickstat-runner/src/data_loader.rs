//! Trade tape loading for the runner.
//!
//! A session's data comes either from a trade CSV or from a seeded random
//! walk. Both end up as a [`MarketSeries`] grouped into fixed-length bars.
//!
//! CSV columns: `timestamp,price,quantity[,direction]`. Timestamps are
//! RFC 3339 or naive `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC); direction is
//! `buy`, `sell` or `unknown` and defaults to `unknown`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tickstat_core::domain::{MarketSeries, Security, Trade, TradeDirection};
use tickstat_core::StatError;
use tracing::{info, warn};

use crate::config::DataConfig;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: {reason}")]
    InvalidRow { line: u64, reason: String },

    #[error("no trades in {0}")]
    Empty(PathBuf),

    #[error("cannot build series: {0}")]
    Series(#[from] StatError),
}

/// One CSV row as written and read.
#[derive(Debug, Serialize, Deserialize)]
struct TradeRow {
    timestamp: String,
    price: f64,
    quantity: f64,
    #[serde(default)]
    direction: Option<TradeDirection>,
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Load a time-ordered trade CSV and group it into `bar_seconds` bars.
pub fn load_trades_csv(
    path: &Path,
    security: Security,
    bar_seconds: i64,
) -> Result<MarketSeries, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let mut tape = Vec::new();
    for record in reader.deserialize::<TradeRow>() {
        let row = record?;
        let line = tape.len() as u64 + 2;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::InvalidRow {
            line,
            reason: format!("unrecognized timestamp '{}'", row.timestamp),
        })?;
        tape.push(Trade {
            timestamp,
            price: row.price,
            quantity: row.quantity,
            direction: row.direction.unwrap_or(TradeDirection::Unknown),
            bar_index: 0,
        });
    }
    if tape.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }

    let invalid = tape.iter().filter(|t| !t.is_valid()).count();
    if invalid > 0 {
        warn!(path = %path.display(), invalid, "tape contains malformed trades");
    }

    let series = MarketSeries::from_trades(security, tape, bar_seconds)?;
    info!(
        path = %path.display(),
        bars = series.bars().len(),
        trades = series.trade_count(),
        "loaded trade tape"
    );
    Ok(series)
}

/// Write every trade of `series` in the CSV layout [`load_trades_csv`] reads.
pub fn write_trades_csv(path: &Path, series: &MarketSeries) -> Result<(), LoadError> {
    let mut writer = csv::Writer::from_path(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    for index in 0..series.bars().len() {
        for trade in series.trades(index) {
            writer.serialize(TradeRow {
                timestamp: trade.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                price: trade.price,
                quantity: trade.quantity,
                direction: Some(trade.direction),
            })?;
        }
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Seeded random walk on the tick grid, `trades_per_bar` prints per bar.
///
/// Deterministic for a given seed. Prices never go below one tick.
pub fn synthetic_series(
    security: Security,
    bars: usize,
    trades_per_bar: usize,
    seed: u64,
    bar_seconds: i64,
    start_price: f64,
) -> Result<MarketSeries, LoadError> {
    if bar_seconds <= 0 {
        return Err(
            StatError::invalid(format!("bar length must be positive, got {bar_seconds}s")).into(),
        );
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let tick = security.tick_size;
    // 2024-01-02 14:30 UTC, floored to a bar boundary
    let start_secs = 1_704_205_800_i64.div_euclid(bar_seconds) * bar_seconds;
    let start = DateTime::from_timestamp(start_secs, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| StatError::invalid("synthetic start time out of range"))?;
    let too_large = || StatError::invalid(format!("{bars} bars of {bar_seconds}s is too large"));
    let total = bars.checked_mul(trades_per_bar).ok_or_else(too_large)?;
    let per_bar = i64::try_from(trades_per_bar.max(1)).map_err(|_| too_large())?;
    let spacing_ms = bar_seconds.checked_mul(1_000).ok_or_else(too_large)? / per_bar;
    // The last bar must open inside the calendar.
    let last_open = i64::try_from(bars.saturating_sub(1))
        .ok()
        .and_then(|n| n.checked_mul(bar_seconds))
        .and_then(TimeDelta::try_seconds)
        .and_then(|span| start.checked_add_signed(span));
    if last_open.is_none() {
        return Err(too_large().into());
    }

    let mut ticks = (start_price / tick).round().max(1.0);
    let mut tape = Vec::with_capacity(total.min(1 << 20));
    for bar in 0..bars {
        let open_time = start + TimeDelta::seconds(bar_seconds * bar as i64);
        // Drift changes every bar so the walk forms visible value areas.
        let drift: f64 = rng.gen_range(-0.3..0.3);
        for j in 0..trades_per_bar {
            let step: f64 = rng.gen_range(-1.5..1.5) + drift;
            ticks = (ticks + step.round()).max(1.0);
            let direction = if step > 0.0 {
                TradeDirection::Buy
            } else if step < 0.0 {
                TradeDirection::Sell
            } else {
                TradeDirection::Unknown
            };
            tape.push(Trade {
                timestamp: open_time + TimeDelta::milliseconds(spacing_ms * j as i64),
                price: ticks * tick,
                quantity: f64::from(rng.gen_range(1u32..=20)),
                direction,
                bar_index: bar,
            });
        }
    }

    let series = MarketSeries::from_trades(security, tape, bar_seconds)?;
    info!(
        bars = series.bars().len(),
        trades = series.trade_count(),
        seed,
        "generated synthetic tape"
    );
    Ok(series)
}

/// Resolve a session's data source into a series.
pub fn load_series(data: &DataConfig, security: Security) -> Result<MarketSeries, LoadError> {
    match data {
        DataConfig::Csv { path, bar_seconds } => load_trades_csv(path, security, *bar_seconds),
        DataConfig::Synthetic {
            bars,
            trades_per_bar,
            seed,
            bar_seconds,
            start_price,
        } => synthetic_series(
            security,
            *bars,
            *trades_per_bar,
            *seed,
            *bar_seconds,
            *start_price,
        ),
    }
}
