//! Signal Classifier - Threshold rules over indicator rows
//!
//! Two rule sets are available:
//! - `Base`: RSI extremes confirmed by MACD and EMA crossovers
//! - `Extended`: MACD + EMA trend, price vs VWAP, a volume spike and
//!   proximity to a support (BUY) or resistance (SELL) level
//!
//! BUY is evaluated first; a bar never carries both labels.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::features::SignalInputs;
use crate::levels::ProximityCheck;
use crate::types::{Level, Signal, SignalLabel};

/// Which set of conditions produces BUY/SELL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
    /// RSI < oversold & MACD > signal & EMA fast > EMA slow (mirrored for SELL)
    Base,
    /// MACD, EMA, VWAP, volume spike and support/resistance gating
    Extended,
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::Extended
    }
}

impl RuleSet {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "base" | "rsi" => Some(RuleSet::Base),
            "extended" | "sr" | "vwap" => Some(RuleSet::Extended),
            _ => None,
        }
    }
}

/// How "near support / near resistance" is decided for each bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityMode {
    /// Each bar's close against levels detected at or before that bar
    PerBar,
    /// One flag from the last close against all levels, applied to every bar
    LastClose,
}

impl Default for ProximityMode {
    fn default() -> Self {
        ProximityMode::PerBar
    }
}

impl ProximityMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "per_bar" => Some(ProximityMode::PerBar),
            "last_close" | "global" => Some(ProximityMode::LastClose),
            _ => None,
        }
    }
}

/// Strategy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub rule_set: RuleSet,
    pub proximity_mode: ProximityMode,
    /// RSI thresholds for overbought/oversold (base rule only)
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Relative band for level proximity (extended rule only)
    pub proximity_band: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            rule_set: RuleSet::default(),
            proximity_mode: ProximityMode::default(),
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            proximity_band: 0.01,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !(in_range(self.rsi_oversold)
            && in_range(self.rsi_overbought)
            && self.rsi_oversold < self.rsi_overbought)
        {
            return Err(PipelineError::InvalidParameter {
                name: "rsi_thresholds",
                reason: format!(
                    "need 0 <= oversold < overbought <= 100, got {} / {}",
                    self.rsi_oversold, self.rsi_overbought
                ),
            });
        }
        if !(self.proximity_band.is_finite() && self.proximity_band > 0.0) {
            return Err(PipelineError::InvalidParameter {
                name: "proximity_band",
                reason: format!("must be positive, got {}", self.proximity_band),
            });
        }
        Ok(())
    }
}

/// Rule-based classifier producing one signal per ready row
#[derive(Debug, Clone, Default)]
pub struct SignalClassifier {
    config: StrategyConfig,
}

impl SignalClassifier {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Classify every row. `levels` must be in bar order.
    pub fn classify(
        &self,
        rows: &[SignalInputs],
        levels: &[Level],
    ) -> Result<Vec<Signal>, PipelineError> {
        self.config.validate()?;

        let global = rows
            .last()
            .map(|last| ProximityCheck::evaluate(last.close, levels, self.config.proximity_band))
            .unwrap_or_default();

        let signals: Vec<Signal> = rows
            .iter()
            .map(|row| {
                let proximity = match self.config.proximity_mode {
                    ProximityMode::LastClose => global,
                    ProximityMode::PerBar => self.proximity_at(row, levels),
                };
                Signal {
                    bar_index: row.bar_index,
                    timestamp: row.timestamp,
                    close: row.close,
                    label: self.label(row, proximity),
                }
            })
            .collect();

        tracing::debug!(
            rule_set = ?self.config.rule_set,
            proximity_mode = ?self.config.proximity_mode,
            rows = rows.len(),
            buys = signals.iter().filter(|s| s.label == SignalLabel::Buy).count(),
            sells = signals.iter().filter(|s| s.label == SignalLabel::Sell).count(),
            "Signal classification completed"
        );
        Ok(signals)
    }

    /// Proximity of a row's close to levels already confirmed at that bar
    pub fn proximity_at(&self, row: &SignalInputs, levels: &[Level]) -> ProximityCheck {
        let known = levels.partition_point(|l| l.confirmed_index <= row.bar_index);
        ProximityCheck::evaluate(row.close, &levels[..known], self.config.proximity_band)
    }

    /// Label a single row given its proximity flags
    pub fn label(&self, row: &SignalInputs, proximity: ProximityCheck) -> SignalLabel {
        if self.is_buy(row, proximity) {
            SignalLabel::Buy
        } else if self.is_sell(row, proximity) {
            SignalLabel::Sell
        } else {
            SignalLabel::None
        }
    }

    fn is_buy(&self, row: &SignalInputs, proximity: ProximityCheck) -> bool {
        let momentum_up = row.macd > row.macd_signal && row.ema_fast > row.ema_slow;
        match self.config.rule_set {
            RuleSet::Base => row.rsi < self.config.rsi_oversold && momentum_up,
            RuleSet::Extended => {
                momentum_up && row.close > row.vwap && row.volume_spike && proximity.near_support
            }
        }
    }

    fn is_sell(&self, row: &SignalInputs, proximity: ProximityCheck) -> bool {
        let momentum_down = row.macd < row.macd_signal && row.ema_fast < row.ema_slow;
        match self.config.rule_set {
            RuleSet::Base => row.rsi > self.config.rsi_overbought && momentum_down,
            RuleSet::Extended => {
                momentum_down
                    && row.close < row.vwap
                    && row.volume_spike
                    && proximity.near_resistance
            }
        }
    }
}
