//! DayTrader CLI
//!
//! Usage: daytrader [SYMBOL] [INTERVAL]
//!
//! Loads `<data.dir>/<SYMBOL>_<INTERVAL>.csv`, runs the signal pipeline and
//! logs the latest signal and backtest summary. Settings come from
//! `config/default`, `config/local` and `DAYTRADER__*` variables.

use anyhow::{anyhow, Context, Result};
use daytrader::config::AppConfig;
use daytrader::persistence::{CsvBarSource, ReportWriter};
use daytrader::types::{Interval, SignalLabel};
use daytrader::{AnalysisReport, Pipeline, PipelineError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var_os("DAYTRADER_LOG_JSON").is_some() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn log_latest(report: &AnalysisReport) {
    match report.latest_signal() {
        Ok(latest) => {
            info!(
                time = %latest.timestamp,
                close = latest.close,
                rsi = latest.rsi,
                macd = latest.macd,
                macd_signal = latest.macd_signal,
                ema_fast = latest.ema_fast,
                ema_slow = latest.ema_slow,
                vwap = latest.vwap,
                near_support = latest.near_support,
                near_resistance = latest.near_resistance,
                "📊 Latest bar"
            );
            match latest.label {
                SignalLabel::Buy => info!("🟢 Latest Signal: BUY"),
                SignalLabel::Sell => info!("🔴 Latest Signal: SELL"),
                SignalLabel::None => info!("⚪ No strong signal"),
            }
        }
        Err(PipelineError::EmptySeries) => warn!("No signal available"),
        Err(e) => warn!("No signal available: {}", e),
    }
}

fn main() -> Result<()> {
    init_logging();

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!("⚙️  Config: {}", config);

    let mut args = std::env::args().skip(1);
    let symbol = args
        .next()
        .unwrap_or_else(|| config.data.symbol.clone())
        .to_uppercase();
    let interval = match args.next() {
        Some(raw) => Interval::from_str(&raw).ok_or_else(|| anyhow!("Unknown interval {:?}", raw))?,
        None => config.interval()?,
    };

    let source = CsvBarSource::new(config.data_dir());
    let pipeline = Pipeline::new(config.analysis_config()?);

    info!(
        symbol = %symbol,
        interval = %interval,
        file = %source.path_for(&symbol, interval).display(),
        "🚀 Running analysis"
    );
    let report = pipeline
        .run_for_symbol(&source, &symbol, interval)
        .with_context(|| format!("Analysis failed for {} {}", symbol, interval))?;

    log_latest(&report);
    info!(
        buys = report.buy_signals().count(),
        sells = report.sell_signals().count(),
        levels = report.levels.len(),
        "📈 Backtest Results: {}",
        report.metrics
    );

    if config.output.export_csv || config.output.export_json {
        let writer = ReportWriter::new(config.output_dir())?;
        if config.output.export_csv {
            writer.write_csv(&report)?;
        }
        if config.output.export_json {
            writer.write_json(&report)?;
        }
    }

    Ok(())
}
