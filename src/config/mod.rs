//! Configuration management for DayTrader
//!
//! Defaults, then optional `config/default` and `config/local` files, then
//! `DAYTRADER__*` environment variables (after `.env`).

use anyhow::{anyhow, bail, Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::features::IndicatorConfig;
use crate::levels::LevelConfig;
use crate::pipeline::AnalysisConfig;
use crate::strategy::{ProximityMode, RuleSet, StrategyConfig};
use crate::types::Interval;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub indicators: IndicatorConfig,
    pub levels: LevelConfig,
    pub strategy: StrategyCfg,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Ticker to analyse
    pub symbol: String,
    /// Bar interval (1m, 5m, 15m, 30m, 1h, 1d)
    pub interval: String,
    /// Lookback label used when the bar file was downloaded (e.g. 5d)
    pub period: String,
    /// Directory holding `<SYMBOL>_<interval>.csv` files
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyCfg {
    /// "base" or "extended"
    pub rule_set: String,
    /// "per_bar" or "last_close"
    pub proximity_mode: String,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Relative distance to a level that counts as "near"
    pub proximity_band: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory for exported signals, trades, levels and report
    pub dir: String,
    pub export_csv: bool,
    pub export_json: bool,
}

impl AppConfig {
    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let indicators = IndicatorConfig::default();
        let strategy = StrategyConfig::default();

        let builder = Config::builder()
            // Data defaults
            .set_default("data.symbol", "AAPL")?
            .set_default("data.interval", "15m")?
            .set_default("data.period", "5d")?
            .set_default("data.dir", "./data")?
            // Indicator defaults
            .set_default("indicators.rsi_period", indicators.rsi_period as i64)?
            .set_default("indicators.ema_fast", indicators.ema_fast as i64)?
            .set_default("indicators.ema_slow", indicators.ema_slow as i64)?
            .set_default("indicators.macd_fast", indicators.macd_fast as i64)?
            .set_default("indicators.macd_slow", indicators.macd_slow as i64)?
            .set_default("indicators.macd_signal", indicators.macd_signal as i64)?
            .set_default(
                "indicators.volume_sma_period",
                indicators.volume_sma_period as i64,
            )?
            .set_default(
                "indicators.volume_spike_multiplier",
                indicators.volume_spike_multiplier,
            )?
            // Level defaults
            .set_default("levels.sensitivity", LevelConfig::default().sensitivity as i64)?
            // Strategy defaults
            .set_default("strategy.rule_set", "extended")?
            .set_default("strategy.proximity_mode", "per_bar")?
            .set_default("strategy.rsi_oversold", strategy.rsi_oversold)?
            .set_default("strategy.rsi_overbought", strategy.rsi_overbought)?
            .set_default("strategy.proximity_band", strategy.proximity_band)?
            // Output defaults
            .set_default("output.dir", "./output")?
            .set_default("output.export_csv", true)?
            .set_default("output.export_json", false)?;

        Ok(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let builder = Self::defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (DAYTRADER__*)
            .add_source(Environment::with_prefix("DAYTRADER").separator("__"));

        Self::finish(builder)
    }

    /// Defaults overlaid with one explicit file, without environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let builder = Self::defaults()?.add_source(File::from(path).required(true));
        Self::finish(builder)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn interval(&self) -> Result<Interval> {
        Interval::from_str(&self.data.interval)
            .ok_or_else(|| anyhow!("Unknown interval {:?}", self.data.interval))
    }

    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::from_str(&self.strategy.rule_set)
            .ok_or_else(|| anyhow!("Unknown rule set {:?}", self.strategy.rule_set))
    }

    pub fn proximity_mode(&self) -> Result<ProximityMode> {
        ProximityMode::from_str(&self.strategy.proximity_mode)
            .ok_or_else(|| anyhow!("Unknown proximity mode {:?}", self.strategy.proximity_mode))
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output.dir)
    }

    /// Parameters for the analysis pipeline
    pub fn analysis_config(&self) -> Result<AnalysisConfig> {
        Ok(AnalysisConfig {
            indicators: self.indicators.clone(),
            levels: self.levels.clone(),
            strategy: StrategyConfig {
                rule_set: self.rule_set()?,
                proximity_mode: self.proximity_mode()?,
                rsi_oversold: self.strategy.rsi_oversold,
                rsi_overbought: self.strategy.rsi_overbought,
                proximity_band: self.strategy.proximity_band,
            },
        })
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.data.symbol.trim().is_empty() {
            bail!("data.symbol must not be empty");
        }
        if self.levels.sensitivity == 0 {
            bail!("levels.sensitivity must be at least 1");
        }

        let analysis = self.analysis_config()?;
        analysis
            .indicators
            .validate()
            .context("Invalid indicators section")?;
        analysis
            .strategy
            .validate()
            .context("Invalid strategy section")?;
        self.interval()?;

        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "symbol={} interval={} period={} rules={} proximity={} sensitivity={} band={:.3}",
            self.data.symbol,
            self.data.interval,
            self.data.period,
            self.strategy.rule_set,
            self.strategy.proximity_mode,
            self.levels.sensitivity,
            self.strategy.proximity_band
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
