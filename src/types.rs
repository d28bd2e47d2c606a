//! Core types used throughout DayTrader
//!
//! Defines bars, series, levels, signals and trades shared by every stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

/// Supported bar intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min5,
    Min15,
    Min30,
    Hour1,
    Day1,
}

impl Default for Interval {
    fn default() -> Self {
        Interval::Min15
    }
}

impl Interval {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> u64 {
        match self {
            Interval::Min1 => 60,
            Interval::Min5 => 5 * 60,
            Interval::Min15 => 15 * 60,
            Interval::Min30 => 30 * 60,
            Interval::Hour1 => 60 * 60,
            Interval::Day1 => 24 * 60 * 60,
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" => Some(Interval::Min1),
            "5m" | "5min" => Some(Interval::Min5),
            "15m" | "15min" => Some(Interval::Min15),
            "30m" | "30min" => Some(Interval::Min30),
            "1h" | "60m" | "1hour" => Some(Interval::Hour1),
            "1d" | "1day" => Some(Interval::Day1),
            _ => None,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Min1 => write!(f, "1m"),
            Interval::Min5 => write!(f, "5m"),
            Interval::Min15 => write!(f, "15m"),
            Interval::Min30 => write!(f, "30m"),
            Interval::Hour1 => write!(f, "1h"),
            Interval::Day1 => write!(f, "1d"),
        }
    }
}

/// One OHLCV record as delivered by a data source, before cleaning.
///
/// Any field may be missing; such rows never reach the indicator stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl RawBar {
    /// Convert to a complete bar, or `None` if any value is missing or not finite
    pub fn to_bar(&self) -> Option<Bar> {
        let bar = Bar {
            timestamp: self.timestamp,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume?,
        };
        bar.is_finite().then_some(bar)
    }
}

impl From<Bar> for RawBar {
    fn from(bar: Bar) -> Self {
        Self {
            timestamp: bar.timestamp,
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            close: Some(bar.close),
            volume: Some(bar.volume),
        }
    }
}

/// Price bar for one sampling interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Start of the interval
    pub timestamp: DateTime<Utc>,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Traded volume
    pub volume: f64,
}

impl Bar {
    /// Typical price used by VWAP: (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Ordered, cleaned sequence of bars for one symbol
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    symbol: String,
    interval: Interval,
    bars: Vec<Bar>,
}

impl Series {
    /// Build a series from raw rows.
    ///
    /// Rows with a missing or non-finite value are dropped. The remaining bars
    /// must have strictly increasing timestamps and must not be empty.
    pub fn new(
        symbol: impl Into<String>,
        interval: Interval,
        raw: &[RawBar],
    ) -> Result<Self, PipelineError> {
        let symbol = symbol.into();
        let bars: Vec<Bar> = raw.iter().filter_map(RawBar::to_bar).collect();

        let dropped = raw.len() - bars.len();
        if dropped > 0 {
            tracing::warn!(
                symbol = %symbol,
                dropped,
                kept = bars.len(),
                "Dropped bars with missing values"
            );
        }

        Self::from_bars(symbol, interval, bars)
    }

    /// Build a series from bars that are already complete
    pub fn from_bars(
        symbol: impl Into<String>,
        interval: Interval,
        bars: Vec<Bar>,
    ) -> Result<Self, PipelineError> {
        if bars.is_empty() {
            return Err(PipelineError::EmptySeries);
        }

        if let Some(pos) = bars
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(PipelineError::UnorderedBars { index: pos + 1 });
        }

        Ok(Self {
            symbol: symbol.into(),
            interval,
            bars,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false for a constructed series; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Last bar of the series
    pub fn last(&self) -> &Bar {
        // Construction guarantees at least one bar.
        &self.bars[self.bars.len() - 1]
    }
}

/// Which side of price a level sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelKind {
    Support,
    Resistance,
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelKind::Support => write!(f, "support"),
            LevelKind::Resistance => write!(f, "resistance"),
        }
    }
}

/// A local price extremum detected at one bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub kind: LevelKind,
    /// Index of the bar in its series
    pub bar_index: usize,
    /// First bar index at which the extremum is known (`bar_index + sensitivity`)
    pub confirmed_index: usize,
    pub timestamp: DateTime<Utc>,
    /// Low of the bar for support, high for resistance
    pub price: f64,
}

/// Per-bar classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalLabel {
    Buy,
    Sell,
    None,
}

impl Default for SignalLabel {
    fn default() -> Self {
        SignalLabel::None
    }
}

impl SignalLabel {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalLabel::None)
    }
}

impl fmt::Display for SignalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalLabel::Buy => write!(f, "BUY"),
            SignalLabel::Sell => write!(f, "SELL"),
            SignalLabel::None => write!(f, ""),
        }
    }
}

/// Signal emitted for one bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Index of the bar in its series
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    /// Close of the bar, used as the fill price in backtests
    pub close: f64,
    pub label: SignalLabel,
}

/// Completed round trip produced by the backtester
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    /// exit_price - entry_price
    pub pnl: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    /// PnL relative to the entry price
    pub fn return_pct(&self) -> f64 {
        if self.entry_price != 0.0 {
            self.pnl / self.entry_price
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap()
    }

    fn raw(minute: i64, close: Option<f64>) -> RawBar {
        RawBar {
            timestamp: ts(minute),
            open: close,
            high: close.map(|c| c + 1.0),
            low: close.map(|c| c - 1.0),
            close,
            volume: Some(100.0),
        }
    }

    #[test]
    fn test_interval_parse_and_display() {
        assert_eq!(Interval::from_str("15m"), Some(Interval::Min15));
        assert_eq!(Interval::from_str("1H"), Some(Interval::Hour1));
        assert_eq!(Interval::from_str("2w"), None);
        assert_eq!(Interval::Day1.to_string(), "1d");
        assert_eq!(Interval::Min30.duration_secs(), 1800);
    }

    #[test]
    fn test_series_drops_incomplete_rows() {
        let rows = vec![raw(0, Some(10.0)), raw(1, None), raw(2, Some(11.0))];
        let series = Series::new("AAPL", Interval::Min1, &rows).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.last().close, 11.0);
    }

    #[test]
    fn test_series_drops_non_finite_rows() {
        let mut bad = raw(1, Some(10.0));
        bad.volume = Some(f64::NAN);
        let rows = vec![raw(0, Some(10.0)), bad];
        let series = Series::new("AAPL", Interval::Min1, &rows).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_series_rejects_empty() {
        let rows = vec![raw(0, None)];
        let err = Series::new("AAPL", Interval::Min1, &rows).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySeries));
    }

    #[test]
    fn test_series_rejects_duplicate_timestamps() {
        let rows = vec![raw(0, Some(1.0)), raw(1, Some(1.0)), raw(1, Some(1.0))];
        let err = Series::new("AAPL", Interval::Min1, &rows).unwrap_err();
        assert!(matches!(err, PipelineError::UnorderedBars { index: 2 }));
    }

    #[test]
    fn test_trade_win_and_return() {
        let trade = Trade {
            entry_time: ts(0),
            entry_price: 100.0,
            exit_time: ts(5),
            exit_price: 102.0,
            pnl: 2.0,
        };
        assert!(trade.is_win());
        assert!((trade.return_pct() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_signal_label_display() {
        assert_eq!(SignalLabel::Buy.to_string(), "BUY");
        assert_eq!(SignalLabel::Sell.to_string(), "SELL");
        assert!(!SignalLabel::None.is_actionable());
    }
}
