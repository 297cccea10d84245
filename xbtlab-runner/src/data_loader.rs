//! CSV loading for bars and signal tables.
//!
//! Bars: `timestamp,open,high,low,close,volume[,turnover]`, timestamps in Unix
//! seconds, strictly increasing. Extra columns are ignored.
//!
//! Signal tables: one file per timeframe, `timestamp,<column>...`. Signal
//! cells are `true`/`false`/`1`/`0` or empty for unknown; volatility cells are
//! numbers, empty when not yet computable.
//!
//! Malformed rows are rejected with their line number. Nothing malformed
//! reaches the engine.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use xbtlab_core::domain::{Bar, BarError};
use xbtlab_core::signals::{Column, ColumnSignalFeed, SignalError, Timeframe, Tristate};

use crate::config::StrategyConfig;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("line {line}: {source}")]
    Csv { line: u64, source: csv::Error },

    #[error("csv error: {0}")]
    CsvHeader(#[from] csv::Error),

    #[error("line {line}: {source}")]
    InvalidBar { line: u64, source: BarError },

    #[error("line {line}: timestamp {timestamp} does not follow {previous}")]
    Unordered {
        line: u64,
        previous: i64,
        timestamp: i64,
    },

    #[error("line {line}, column '{column}': {message}")]
    BadCell {
        line: u64,
        column: String,
        message: String,
    },

    #[error("signal table has no 'timestamp' column")]
    MissingTimestamp,

    #[error("column '{column}' appears more than once in the signal table header")]
    DuplicateColumn { column: String },

    #[error("no signal table loaded for timeframe {0}")]
    MissingTimeframe(Timeframe),

    #[error("column '{column}' not found in the {timeframe} signal table")]
    MissingColumn { column: String, timeframe: Timeframe },

    #[error("no bars in input")]
    Empty,

    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Bars plus the hash identifying them.
#[derive(Debug, Clone)]
pub struct BarSet {
    pub bars: Vec<Bar>,
    /// BLAKE3 over the raw file bytes.
    pub dataset_hash: String,
}

/// Raw cells of one signal file, keyed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalTable {
    pub timeframe: Timeframe,
    pub timestamps: Vec<i64>,
    pub columns: BTreeMap<String, Vec<String>>,
}

impl SignalTable {
    fn column(&self, name: &str) -> Result<&[String], LoadError> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| LoadError::MissingColumn {
                column: name.to_string(),
                timeframe: self.timeframe,
            })
    }

    /// Typed signal column. Line numbers in errors refer to the source file.
    pub fn signal_column(&self, name: &str) -> Result<Column<Tristate>, LoadError> {
        let cells = self.column(name)?;
        let mut rows = Vec::with_capacity(cells.len());
        for (i, (ts, cell)) in self.timestamps.iter().zip(cells).enumerate() {
            let value = cell.parse::<Tristate>().map_err(|message| LoadError::BadCell {
                line: i as u64 + 2,
                column: name.to_string(),
                message,
            })?;
            rows.push((*ts, value));
        }
        Ok(Column::new(name, self.timeframe, rows)?)
    }

    /// Typed volatility column. Empty cells are left out, so those buckets read as missing.
    pub fn volatility_column(&self, name: &str) -> Result<Column<f64>, LoadError> {
        let cells = self.column(name)?;
        let mut rows = Vec::with_capacity(cells.len());
        for (i, (ts, cell)) in self.timestamps.iter().zip(cells).enumerate() {
            let cell = cell.trim();
            if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
                continue;
            }
            let value = cell.parse::<f64>().map_err(|e| LoadError::BadCell {
                line: i as u64 + 2,
                column: name.to_string(),
                message: e.to_string(),
            })?;
            rows.push((*ts, value));
        }
        Ok(Column::new(name, self.timeframe, rows)?)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse and validate bars from CSV.
pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut bars: Vec<Bar> = Vec::new();
    for (i, record) in rdr.deserialize::<Bar>().enumerate() {
        let line = i as u64 + 2;
        let bar = record.map_err(|source| LoadError::Csv { line, source })?;
        bar.validate()
            .map_err(|source| LoadError::InvalidBar { line, source })?;
        if let Some(prev) = bars.last() {
            if bar.timestamp <= prev.timestamp {
                return Err(LoadError::Unordered {
                    line,
                    previous: prev.timestamp,
                    timestamp: bar.timestamp,
                });
            }
        }
        bars.push(bar);
    }
    if bars.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(bars)
}

pub fn load_bars(path: &Path) -> Result<BarSet, LoadError> {
    let bytes = read_file(path)?;
    let dataset_hash = blake3::hash(&bytes).to_hex().to_string();
    let bars = read_bars(bytes.as_slice())?;
    info!(path = %path.display(), bars = bars.len(), "loaded bars");
    Ok(BarSet { bars, dataset_hash })
}

/// Parse a signal table. The `timestamp` column may be anywhere in the header.
pub fn read_signal_table<R: Read>(reader: R, timeframe: Timeframe) -> Result<SignalTable, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let ts_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("timestamp"))
        .ok_or(LoadError::MissingTimestamp)?;

    let mut timestamps = Vec::new();
    let mut columns: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (idx, header) in headers.iter().enumerate() {
        if idx == ts_idx {
            continue;
        }
        if header.eq_ignore_ascii_case("timestamp") || columns.contains_key(header) {
            return Err(LoadError::DuplicateColumn {
                column: header.to_string(),
            });
        }
        columns.insert(header.to_string(), Vec::new());
    }

    for (i, record) in rdr.records().enumerate() {
        let line = i as u64 + 2;
        let record = record.map_err(|source| LoadError::Csv { line, source })?;
        let raw_ts = record.get(ts_idx).unwrap_or_default();
        let timestamp = raw_ts.parse::<i64>().map_err(|e| LoadError::BadCell {
            line,
            column: "timestamp".into(),
            message: format!("'{raw_ts}': {e}"),
        })?;
        timestamps.push(timestamp);
        for (idx, header) in headers.iter().enumerate() {
            if idx == ts_idx {
                continue;
            }
            if let Some(cells) = columns.get_mut(header) {
                cells.push(record.get(idx).unwrap_or_default().to_string());
            }
        }
    }
    debug!(%timeframe, rows = timestamps.len(), columns = columns.len(), "read signal table");
    Ok(SignalTable {
        timeframe,
        timestamps,
        columns,
    })
}

pub fn load_signal_table(path: &Path, timeframe: Timeframe) -> Result<SignalTable, LoadError> {
    let bytes = read_file(path)?;
    let table = read_signal_table(bytes.as_slice(), timeframe)?;
    info!(path = %path.display(), %timeframe, rows = table.timestamps.len(), "loaded signal table");
    Ok(table)
}

/// Assemble the feed a strategy needs from the loaded tables.
pub fn build_feed(strategy: &StrategyConfig, tables: &[SignalTable]) -> Result<ColumnSignalFeed, LoadError> {
    let table_for = |tf: Timeframe| {
        tables
            .iter()
            .find(|t| t.timeframe == tf)
            .ok_or(LoadError::MissingTimeframe(tf))
    };

    let mut feed = ColumnSignalFeed::new();
    for spec in &strategy.signals {
        let column = table_for(spec.timeframe)?.signal_column(&spec.name)?;
        feed = feed.with_signal(column)?;
    }
    let vol = &strategy.volatility;
    let column = table_for(vol.timeframe)?.volatility_column(&vol.column)?;
    Ok(feed.with_volatility(column))
}

/// Bars plus every signal table a batch of strategies may draw from.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub bars: Vec<Bar>,
    pub dataset_hash: String,
    pub tables: Vec<SignalTable>,
}

/// Load a bar file and one signal table per `(timeframe, path)` pair.
pub fn load_market_data(
    bars_path: &Path,
    signal_paths: &[(Timeframe, PathBuf)],
) -> Result<MarketData, LoadError> {
    let BarSet { bars, dataset_hash } = load_bars(bars_path)?;
    let tables = signal_paths
        .iter()
        .map(|(tf, path)| load_signal_table(path, *tf))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MarketData {
        bars,
        dataset_hash,
        tables,
    })
}
