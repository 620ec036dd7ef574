//! Bar loading for the replay driver.
//!
//! Reads an OHLCV CSV with a `timestamp,open,high,low,close,volume` header.
//! `timestamp` may be an integer nanosecond epoch, an RFC 3339 date-time, or
//! a plain `YYYY-MM-DD` date (midnight UTC). Timestamps must not decrease.
//!
//! Empty OHLCV cells load as NaN (void bars); conditions report them as
//! insufficient data rather than failing the load.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use siglab_core::domain::Bar;

/// Errors from the bar loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: unrecognized timestamp '{value}'")]
    BadTimestamp { row: usize, value: String },
    #[error("row {row}: timestamp {current} is earlier than the previous bar ({previous})")]
    OutOfOrder {
        row: usize,
        previous: i64,
        current: i64,
    },
    #[error("no bars in input")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

/// Parse a timestamp cell into a nanosecond epoch.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(ns) = raw.parse::<i64>() {
        return Some(ns);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp_nanos_opt();
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?)
        .timestamp_nanos_opt()
}

/// Read bars from any CSV source.
pub fn read_bars_csv<R: Read>(reader: R) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars: Vec<Bar> = Vec::new();
    let mut insane = 0usize;

    for (i, result) in rdr.deserialize::<BarRow>().enumerate() {
        let row = i + 1;
        let raw = result?;
        let timestamp = parse_timestamp(&raw.timestamp).ok_or_else(|| LoadError::BadTimestamp {
            row,
            value: raw.timestamp.clone(),
        })?;
        if let Some(previous) = bars.last().map(|b| b.timestamp) {
            if timestamp < previous {
                return Err(LoadError::OutOfOrder {
                    row,
                    previous,
                    current: timestamp,
                });
            }
        }
        let bar = Bar {
            timestamp,
            open: raw.open.unwrap_or(f64::NAN),
            high: raw.high.unwrap_or(f64::NAN),
            low: raw.low.unwrap_or(f64::NAN),
            close: raw.close.unwrap_or(f64::NAN),
            volume: raw.volume.unwrap_or(f64::NAN),
        };
        if !bar.is_void() && !bar.is_sane() {
            insane += 1;
        }
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(LoadError::Empty);
    }
    let void = bars.iter().filter(|b| b.is_void()).count();
    if void > 0 || insane > 0 {
        warn!(
            bars = bars.len(),
            void, insane, "bar data has void or inconsistent OHLCV rows"
        );
    }
    Ok(bars)
}

/// Load bars from a CSV file.
pub fn load_bars_csv(path: &Path) -> Result<Vec<Bar>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_bars_csv(io::BufReader::new(file))?;
    info!(path = %path.display(), bars = bars.len(), "bars loaded");
    Ok(bars)
}
