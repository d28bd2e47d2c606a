//! Analysis pipeline
//!
//! Series -> indicators -> levels -> signals -> backtest. Each stage consumes the
//! complete output of the previous one and returns new data; nothing is shared
//! or mutated between stages, so independent symbols can be analysed in
//! parallel by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backtesting::{BacktestMetrics, Backtester};
use crate::error::PipelineError;
use crate::features::{IndicatorConfig, IndicatorEngine, IndicatorFrame, SignalInputs};
use crate::levels::{self, LevelConfig, ProximityCheck};
use crate::persistence::BarSource;
use crate::strategy::{ProximityMode, SignalClassifier, StrategyConfig};
use crate::types::{Interval, Level, Series, Signal, SignalLabel, Trade};

/// Parameters for every stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub indicators: IndicatorConfig,
    pub levels: LevelConfig,
    pub strategy: StrategyConfig,
}

/// Values shown for the most recent analysable bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatestSnapshot {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub vwap: f64,
    pub volume: f64,
    pub volume_sma: f64,
    pub near_support: bool,
    pub near_resistance: bool,
    pub label: SignalLabel,
}

/// Everything a presentation layer needs for one series
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub symbol: String,
    pub interval: Interval,
    pub indicators: IndicatorFrame,
    pub levels: Vec<Level>,
    pub signals: Vec<Signal>,
    pub trades: Vec<Trade>,
    pub metrics: BacktestMetrics,
    latest: Option<LatestSnapshot>,
}

impl AnalysisReport {
    /// Latest analysable bar, or `EmptySeries` when every bar was still warming up
    pub fn latest_signal(&self) -> Result<&LatestSnapshot, PipelineError> {
        self.latest.as_ref().ok_or(PipelineError::EmptySeries)
    }

    pub fn buy_signals(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|s| s.label == SignalLabel::Buy)
    }

    pub fn sell_signals(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|s| s.label == SignalLabel::Sell)
    }
}

/// Runs all stages with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    engine: IndicatorEngine,
    level_config: LevelConfig,
    classifier: SignalClassifier,
}

impl Pipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            engine: IndicatorEngine::new(config.indicators),
            level_config: config.levels,
            classifier: SignalClassifier::new(config.strategy),
        }
    }

    /// Analyse one cleaned series
    pub fn run(&self, series: &Series) -> Result<AnalysisReport, PipelineError> {
        let indicators = self.engine.compute(series)?;
        let levels = levels::detect_levels(series.bars(), self.level_config.sensitivity)?;

        let ready = indicators.ready_rows();
        let signals = self.classifier.classify(&ready, &levels)?;
        let mut backtester = Backtester::new();
        let metrics = backtester.run(&signals).clone();
        let trades = backtester.get_trades().to_vec();

        let latest = self.latest_snapshot(&ready, &levels, &signals);

        tracing::info!(
            symbol = series.symbol(),
            interval = %series.interval(),
            bars = series.len(),
            ready = ready.len(),
            levels = levels.len(),
            trades = trades.len(),
            latest = ?latest.map(|l| l.label),
            "Analysis completed: {}",
            metrics
        );

        Ok(AnalysisReport {
            symbol: series.symbol().to_string(),
            interval: series.interval(),
            indicators,
            levels,
            signals,
            trades,
            metrics,
            latest,
        })
    }

    /// Load bars for `symbol` from a source, then analyse them.
    ///
    /// A failing source is reported as `PipelineError::Source` before any stage runs.
    pub fn run_for_symbol(
        &self,
        source: &dyn BarSource,
        symbol: &str,
        interval: Interval,
    ) -> Result<AnalysisReport, PipelineError> {
        let raw = source
            .load_bars(symbol, interval)
            .map_err(PipelineError::Source)?;
        let series = Series::new(symbol, interval, &raw)?;
        self.run(&series)
    }

    fn latest_snapshot(
        &self,
        ready: &[SignalInputs],
        levels: &[Level],
        signals: &[Signal],
    ) -> Option<LatestSnapshot> {
        let row = ready.last()?;
        let label = signals.last().map(|s| s.label).unwrap_or_default();
        let proximity = match self.classifier.config().proximity_mode {
            ProximityMode::PerBar => self.classifier.proximity_at(row, levels),
            ProximityMode::LastClose => ProximityCheck::evaluate(
                row.close,
                levels,
                self.classifier.config().proximity_band,
            ),
        };

        Some(LatestSnapshot {
            timestamp: row.timestamp,
            close: row.close,
            rsi: row.rsi,
            macd: row.macd,
            macd_signal: row.macd_signal,
            ema_fast: row.ema_fast,
            ema_slow: row.ema_slow,
            vwap: row.vwap,
            volume: row.volume,
            volume_sma: row.volume_sma,
            near_support: proximity.near_support,
            near_resistance: proximity.near_resistance,
            label,
        })
    }
}
