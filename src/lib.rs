//! DayTrader Library
//!
//! Intraday signal pipeline: technical indicators, support/resistance levels,
//! rule-based BUY/SELL signals and a naive long-only backtest.

pub mod backtesting;
pub mod config;
pub mod error;
pub mod features;
pub mod levels;
pub mod persistence;
pub mod pipeline;
pub mod strategy;
pub mod types;

pub use error::PipelineError;
pub use pipeline::{AnalysisConfig, AnalysisReport, LatestSnapshot, Pipeline};
