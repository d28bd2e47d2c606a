//! Backtesting Module
//!
//! Walks a chronological signal sequence as a long-only state machine:
//! - BUY while flat opens a position at the bar close
//! - SELL while in a position closes it and records a trade
//! - BUY while in a position and SELL while flat are ignored
//!
//! A position still open after the last signal is discarded.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Signal, SignalLabel, Trade};

/// Backtest performance metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Total number of completed trades
    pub total_trades: usize,
    /// Trades with pnl > 0
    pub wins: usize,
    /// Trades with pnl <= 0
    pub losses: usize,
    /// wins / total_trades, `None` without completed trades
    pub win_rate: Option<f64>,
    /// Sum of all trade PnL
    pub total_pnl: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    /// Gross profit / gross loss
    pub profit_factor: f64,
    /// Average win amount
    pub avg_win: f64,
    /// Average loss amount (positive)
    pub avg_loss: f64,
    /// Average PnL per trade
    pub expectancy: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Largest peak-to-trough drop of cumulative PnL
    pub max_drawdown: f64,
}

impl BacktestMetrics {
    /// Compute metrics from completed trades
    pub fn from_trades(trades: &[Trade]) -> Self {
        if trades.is_empty() {
            return Self::default();
        }

        let (wins, losses): (Vec<&Trade>, Vec<&Trade>) = trades.iter().partition(|t| t.is_win());

        let total_trades = trades.len();
        let win_count = wins.len();
        let loss_count = losses.len();

        let gross_profit: f64 = wins.iter().map(|t| t.pnl).sum();
        let gross_loss: f64 = losses.iter().map(|t| t.pnl.abs()).sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if win_count > 0 {
            gross_profit / win_count as f64
        } else {
            0.0
        };

        let avg_loss = if loss_count > 0 {
            gross_loss / loss_count as f64
        } else {
            0.0
        };

        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();

        let largest_win = wins.iter().map(|t| t.pnl).fold(0.0, f64::max);
        let largest_loss = losses.iter().map(|t| t.pnl.abs()).fold(0.0, f64::max);

        // Drawdown on the cumulative PnL curve, starting flat at zero
        let mut equity = 0.0;
        let mut peak: f64 = 0.0;
        let mut max_drawdown: f64 = 0.0;
        for trade in trades {
            equity += trade.pnl;
            peak = peak.max(equity);
            max_drawdown = max_drawdown.max(peak - equity);
        }

        Self {
            total_trades,
            wins: win_count,
            losses: loss_count,
            win_rate: Some(win_count as f64 / total_trades as f64),
            total_pnl,
            gross_profit,
            gross_loss,
            profit_factor,
            avg_win,
            avg_loss,
            expectancy: total_pnl / total_trades as f64,
            largest_win,
            largest_loss,
            max_drawdown,
        }
    }
}

impl fmt::Display for BacktestMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.win_rate {
            Some(rate) => write!(
                f,
                "Wins: {} | Losses: {} | Win Rate: {:.2}%",
                self.wins,
                self.losses,
                rate * 100.0
            ),
            None => write!(f, "No completed trades"),
        }
    }
}

/// Position state of the simulator
#[derive(Debug, Clone, Copy, PartialEq)]
enum PositionState {
    Flat,
    InTrade { entry: Signal },
}

/// Backtester
#[derive(Debug, Clone, Default)]
pub struct Backtester {
    /// Executed trades
    trades: Vec<Trade>,
    metrics: BacktestMetrics,
}

impl Backtester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the state machine over chronological signals
    pub fn run(&mut self, signals: &[Signal]) -> &BacktestMetrics {
        self.trades = simulate(signals);
        self.metrics = BacktestMetrics::from_trades(&self.trades);

        tracing::debug!(
            signals = signals.len(),
            trades = self.trades.len(),
            total_pnl = self.metrics.total_pnl,
            "Backtest completed: {}",
            self.metrics
        );
        &self.metrics
    }

    /// Get all trades
    pub fn get_trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn metrics(&self) -> &BacktestMetrics {
        &self.metrics
    }

    /// Export trades to CSV format
    pub fn export_trades_csv(&self) -> Result<String> {
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());
        for trade in &self.trades {
            writer
                .serialize(trade)
                .context("Failed to serialize trade")?;
        }
        // Header row is only emitted with the first record
        if self.trades.is_empty() {
            writer.write_record(["entry_time", "entry_price", "exit_time", "exit_price", "pnl"])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e))?;
        String::from_utf8(bytes).context("CSV output is not UTF-8")
    }
}

/// Pair each BUY (while flat) with the next SELL into a trade.
pub fn simulate(signals: &[Signal]) -> Vec<Trade> {
    let mut state = PositionState::Flat;
    let mut trades = Vec::new();

    for signal in signals {
        state = match (state, signal.label) {
            (PositionState::Flat, SignalLabel::Buy) => PositionState::InTrade { entry: *signal },
            (PositionState::InTrade { entry }, SignalLabel::Sell) => {
                trades.push(Trade {
                    entry_time: entry.timestamp,
                    entry_price: entry.close,
                    exit_time: signal.timestamp,
                    exit_price: signal.close,
                    pnl: signal.close - entry.close,
                });
                PositionState::Flat
            }
            (unchanged, _) => unchanged,
        };
    }

    if let PositionState::InTrade { entry } = state {
        tracing::debug!(
            entry_time = %entry.timestamp,
            entry_price = entry.close,
            "Discarding open position at end of series"
        );
    }

    trades
}
