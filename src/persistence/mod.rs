//! CSV Persistence Module
//!
//! Loads OHLCV bars from CSV files and stores analysis output (signals,
//! trades, levels, JSON report) for charting and review.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::pipeline::AnalysisReport;
use crate::types::{Interval, RawBar};

/// Supplier of raw bars for a symbol and interval
#[cfg_attr(test, mockall::automock)]
pub trait BarSource {
    fn load_bars(&self, symbol: &str, interval: Interval) -> Result<Vec<RawBar>>;
}

/// Bar record as stored in CSV. Empty cells are missing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarRecord {
    pub timestamp: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl BarRecord {
    fn to_raw(&self) -> Result<RawBar> {
        Ok(RawBar {
            timestamp: parse_timestamp(&self.timestamp)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// Parse RFC 3339, `%Y-%m-%d %H:%M:%S` (UTC), `%Y-%m-%d` or epoch milliseconds
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(ms) = value.parse::<i64>() {
        if let Some(ts) = Utc.timestamp_millis_opt(ms).single() {
            return Ok(ts);
        }
    }
    bail!("Unrecognised timestamp: {:?}", value)
}

/// Reads `<dir>/<SYMBOL>_<interval>.csv`
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    dir: PathBuf,
}

impl CsvBarSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str, interval: Interval) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", symbol.to_uppercase(), interval))
    }

    /// Read bars from any CSV file with the expected header
    pub fn read_file(path: &Path) -> Result<Vec<RawBar>> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open bar file {}", path.display()))?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut bars = Vec::new();
        for (line, record) in reader.deserialize::<BarRecord>().enumerate() {
            let record = record
                .with_context(|| format!("Malformed row {} in {}", line + 2, path.display()))?;
            bars.push(record.to_raw().with_context(|| {
                format!("Bad timestamp on row {} in {}", line + 2, path.display())
            })?);
        }

        debug!(path = %path.display(), rows = bars.len(), "Loaded bar file");
        Ok(bars)
    }
}

impl BarSource for CsvBarSource {
    fn load_bars(&self, symbol: &str, interval: Interval) -> Result<Vec<RawBar>> {
        Self::read_file(&self.path_for(symbol, interval))
    }
}

const SIGNAL_HEADER: &[&str] = &["timestamp", "bar_index", "close", "signal"];
const TRADE_HEADER: &[&str] = &["entry_time", "entry_price", "exit_time", "exit_price", "pnl"];
const LEVEL_HEADER: &[&str] = &["timestamp", "bar_index", "confirmed_index", "kind", "price"];

/// Signal record for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: DateTime<Utc>,
    pub bar_index: usize,
    pub close: f64,
    pub signal: String,
}

/// Level record for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelRecord {
    pub timestamp: DateTime<Utc>,
    pub bar_index: usize,
    pub confirmed_index: usize,
    pub kind: String,
    pub price: f64,
}

/// Writes an analysis report under one output directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn create_writer(&self, filename: &str) -> Result<csv::Writer<fs::File>> {
        let path = self.dir.join(filename);
        let file = fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(WriterBuilder::new().has_headers(true).from_writer(file))
    }

    /// Serialize `records` into `filename`; the header is written even when empty
    fn write_records<T: Serialize>(
        &self,
        filename: &str,
        header: &[&str],
        records: impl IntoIterator<Item = T>,
    ) -> Result<usize> {
        let mut writer = self.create_writer(filename)?;
        let mut count = 0;
        for record in records {
            writer
                .serialize(record)
                .with_context(|| format!("Failed to write record to {}", filename))?;
            count += 1;
        }
        // Header row is only emitted with the first record
        if count == 0 {
            writer.write_record(header)?;
        }
        writer.flush()?;
        Ok(count)
    }

    fn file_stem(report: &AnalysisReport) -> String {
        format!("{}_{}", report.symbol.to_uppercase(), report.interval)
    }

    /// Write signals, trades and levels as CSV
    pub fn write_csv(&self, report: &AnalysisReport) -> Result<()> {
        let stem = Self::file_stem(report);

        let signals = self.write_records(
            &format!("{stem}_signals.csv"),
            SIGNAL_HEADER,
            report
                .signals
                .iter()
                .filter(|s| s.label.is_actionable())
                .map(|signal| SignalRecord {
                    timestamp: signal.timestamp,
                    bar_index: signal.bar_index,
                    close: signal.close,
                    signal: signal.label.to_string(),
                }),
        )?;

        let trades = self.write_records(
            &format!("{stem}_trades.csv"),
            TRADE_HEADER,
            report.trades.iter(),
        )?;

        let levels = self.write_records(
            &format!("{stem}_levels.csv"),
            LEVEL_HEADER,
            report.levels.iter().map(|level| LevelRecord {
                timestamp: level.timestamp,
                bar_index: level.bar_index,
                confirmed_index: level.confirmed_index,
                kind: level.kind.to_string(),
                price: level.price,
            }),
        )?;

        info!(
            dir = %self.dir.display(),
            signals,
            trades,
            levels,
            "💾 CSV output written"
        );
        Ok(())
    }

    /// Write the full report as pretty JSON
    pub fn write_json(&self, report: &AnalysisReport) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("{}_report.json", Self::file_stem(report)));
        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "💾 JSON report written");
        Ok(path)
    }
}
