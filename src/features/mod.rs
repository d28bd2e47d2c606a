//! Indicator Engine - Technical indicators over a bar series
//!
//! Computes, for every bar of a series:
//! - RSI (Wilder's smoothing)
//! - EMA fast/slow (9/21 by default)
//! - MACD (EMA12 - EMA26) with an EMA9 signal line
//! - VWAP (cumulative from the start of the series, no session reset)
//! - Volume SMA and volume spike flag
//!
//! Every helper is a pure function over a slice and returns one `Option<f64>`
//! per input; `None` marks the warm-up window or an undefined value.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{Bar, Series};

/// Indicator windows and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// RSI period
    pub rsi_period: usize,
    /// Fast EMA window used for the trend filter
    pub ema_fast: usize,
    /// Slow EMA window used for the trend filter
    pub ema_slow: usize,
    /// MACD periods
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    /// Volume SMA window
    pub volume_sma_period: usize,
    /// Volume above `multiplier * SMA` counts as a spike
    pub volume_spike_multiplier: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_fast: 9,
            ema_slow: 21,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            volume_sma_period: 20,
            volume_spike_multiplier: 1.5,
        }
    }
}

impl IndicatorConfig {
    /// Largest single window; a series shorter than this cannot be analysed
    pub fn required_bars(&self) -> usize {
        [
            self.rsi_period + 1,
            self.ema_fast,
            self.ema_slow,
            self.macd_fast,
            self.macd_slow,
            self.volume_sma_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Reject windows that can never fill
    pub fn validate(&self) -> Result<(), PipelineError> {
        let windows = [
            ("rsi_period", self.rsi_period),
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("volume_sma_period", self.volume_sma_period),
        ];
        for (name, window) in windows {
            if window == 0 {
                return Err(PipelineError::InvalidParameter {
                    name,
                    reason: "window must be at least 1".to_string(),
                });
            }
        }
        if !(self.volume_spike_multiplier.is_finite() && self.volume_spike_multiplier > 0.0) {
            return Err(PipelineError::InvalidParameter {
                name: "volume_spike_multiplier",
                reason: format!("must be positive, got {}", self.volume_spike_multiplier),
            });
        }
        Ok(())
    }
}

/// Indicator values attached to one bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub bar_index: usize,
    pub bar: Bar,

    // RSI (Wilder's smoothing)
    pub rsi: Option<f64>,

    // Trend
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,

    // MACD
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,

    // Volume
    pub vwap: Option<f64>,
    pub volume_sma: Option<f64>,
    /// False while the volume SMA is still warming up
    pub volume_spike: bool,
}

impl IndicatorRow {
    /// Convert to the fully-defined inputs the classifier consumes.
    ///
    /// Returns `None` for warm-up bars and bars with an undefined VWAP.
    pub fn to_inputs(&self) -> Option<SignalInputs> {
        Some(SignalInputs {
            bar_index: self.bar_index,
            timestamp: self.bar.timestamp,
            close: self.bar.close,
            volume: self.bar.volume,
            rsi: self.rsi?,
            ema_fast: self.ema_fast?,
            ema_slow: self.ema_slow?,
            macd: self.macd?,
            macd_signal: self.macd_signal?,
            vwap: self.vwap?,
            volume_sma: self.volume_sma?,
            volume_spike: self.volume_spike,
        })
    }
}

/// Fully-defined indicator values for one bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalInputs {
    pub bar_index: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub close: f64,
    pub volume: f64,
    pub rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub vwap: f64,
    pub volume_sma: f64,
    pub volume_spike: bool,
}

/// Indicator output for a whole series, one row per bar
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorFrame {
    rows: Vec<IndicatorRow>,
}

impl IndicatorFrame {
    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    /// Rows whose every indicator is defined, in bar order
    pub fn ready_rows(&self) -> Vec<SignalInputs> {
        self.rows.iter().filter_map(IndicatorRow::to_inputs).collect()
    }
}

/// Feature engine for computing technical indicators
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Compute all indicators for a series
    pub fn compute(&self, series: &Series) -> Result<IndicatorFrame, PipelineError> {
        self.config.validate()?;

        let bars = series.bars();
        let required = self.config.required_bars();
        if bars.len() < required {
            tracing::debug!(
                symbol = series.symbol(),
                available = bars.len(),
                required,
                "IndicatorEngine: not enough bars"
            );
            return Err(PipelineError::InsufficientData {
                required,
                available: bars.len(),
            });
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let cfg = &self.config;

        let rsi = rsi_series(&closes, cfg.rsi_period);
        let ema_fast = ema_series(&closes, cfg.ema_fast);
        let ema_slow = ema_series(&closes, cfg.ema_slow);
        let (macd, macd_signal) =
            macd_series(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let vwap = vwap_series(bars);
        let volume_sma = sma_series(&volumes, cfg.volume_sma_period);

        let rows: Vec<IndicatorRow> = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| IndicatorRow {
                bar_index: i,
                bar: *bar,
                rsi: rsi[i],
                ema_fast: ema_fast[i],
                ema_slow: ema_slow[i],
                macd: macd[i],
                macd_signal: macd_signal[i],
                vwap: vwap[i],
                volume_sma: volume_sma[i],
                volume_spike: volume_sma[i]
                    .map(|sma| bar.volume > cfg.volume_spike_multiplier * sma)
                    .unwrap_or(false),
            })
            .collect();

        let frame = IndicatorFrame { rows };
        tracing::debug!(
            symbol = series.symbol(),
            bars = bars.len(),
            ready = frame.rows.iter().filter(|r| r.to_inputs().is_some()).count(),
            "IndicatorEngine::compute completed"
        );
        Ok(frame)
    }
}

/// Exponential moving average with α = 2 / (window + 1).
///
/// The first defined value, at index `window - 1`, is the simple mean of the
/// first `window` inputs.
pub fn ema_series(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let alpha = 2.0 / (window as f64 + 1.0);
    let mut ema = values[..window].iter().sum::<f64>() / window as f64;
    out[window - 1] = Some(ema);

    for (i, value) in values.iter().enumerate().skip(window) {
        ema = value * alpha + ema * (1.0 - alpha);
        out[i] = Some(ema);
    }
    out
}

/// EMA over a sequence whose leading values may be undefined.
///
/// Seeding starts at the first defined input. Values after the first gap stay
/// undefined.
fn ema_of_defined(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let Some(start) = values.iter().position(Option::is_some) else {
        return out;
    };

    let defined: Vec<f64> = values[start..].iter().map_while(|v| *v).collect();
    for (offset, ema) in ema_series(&defined, window).into_iter().enumerate() {
        out[start + offset] = ema;
    }
    out
}

/// MACD line (EMA fast - EMA slow) and its EMA signal line
pub fn macd_series(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let ema_fast = ema_series(closes, fast);
    let ema_slow = ema_series(closes, slow);

    let macd: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = ema_of_defined(&macd, signal);

    (macd, signal_line)
}

/// RSI using Wilder's smoothing method.
///
/// The first value, at index `period`, averages the first `period` deltas.
/// A zero average loss yields 100.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let p = period as f64;

    let mut avg_gain = deltas[..period].iter().map(|d| d.max(0.0)).sum::<f64>() / p;
    let mut avg_loss = deltas[..period].iter().map(|d| (-d).max(0.0)).sum::<f64>() / p;
    out[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for (i, delta) in deltas.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (p - 1.0) + delta.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-delta).max(0.0)) / p;
        out[i + 1] = Some(rsi_from_averages(avg_gain, avg_loss));
    }
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// Trailing simple moving average
pub fn sma_series(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = Some(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = Some(sum / window as f64);
    }
    out
}

/// Running VWAP from the first bar of the series.
///
/// Undefined while cumulative volume is zero.
pub fn vwap_series(bars: &[Bar]) -> Vec<Option<f64>> {
    let mut sum_pv = 0.0;
    let mut sum_volume = 0.0;

    bars.iter()
        .map(|bar| {
            sum_pv += bar.typical_price() * bar.volume;
            sum_volume += bar.volume;
            (sum_volume > 0.0).then(|| sum_pv / sum_volume)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Interval;
    use chrono::{TimeZone, Utc};

    fn make_bar(i: i64, close: f64, volume: f64) -> Bar {
        Bar {
            timestamp: Utc.timestamp_opt(1_700_000_000 + i * 900, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        }
    }

    fn make_series(closes: &[f64]) -> Series {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, c)| make_bar(i as i64, *c, 1000.0))
            .collect();
        Series::from_bars("TEST", Interval::Min15, bars).unwrap()
    }

    #[test]
    fn test_ema_seed_is_simple_mean() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ema = ema_series(&values, 3);
        assert_eq!(ema[0], None);
        assert_eq!(ema[1], None);
        assert_eq!(ema[2], Some(2.0));
        // alpha = 0.5: 4 * 0.5 + 2 * 0.5
        assert_eq!(ema[3], Some(3.0));
        assert_eq!(ema[4], Some(4.0));
    }

    #[test]
    fn test_ema_converges_on_constant_input() {
        let values = vec![42.5; 60];
        let ema = ema_series(&values, 21);
        for v in ema.iter().skip(20) {
            assert!((v.unwrap() - 42.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rsi_uptrend_is_100() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let rsi = rsi_series(&closes, 14);
        assert!(rsi[13].is_none());
        assert_eq!(rsi[14], Some(100.0));
        assert_eq!(rsi[29], Some(100.0));
    }

    #[test]
    fn test_rsi_downtrend_is_zero() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let rsi = rsi_series(&closes, 14);
        assert_eq!(rsi[20], Some(0.0));
    }

    #[test]
    fn test_rsi_bounded() {
        let closes: Vec<f64> = (0..80)
            .map(|i| 100.0 + ((i * 7) % 11) as f64 - 5.0)
            .collect();
        for v in rsi_series(&closes, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn test_rsi_wilders_known_value() {
        // Two deltas: +2, -1, then +1 with period 2.
        let closes = [10.0, 12.0, 11.0, 12.0];
        let rsi = rsi_series(&closes, 2);
        // seed: gain 1.0, loss 0.5 -> rs 2 -> 66.67
        assert!((rsi[2].unwrap() - 200.0 / 3.0).abs() < 1e-9);
        // smoothed: gain (1*1+1)/2 = 1, loss (0.5*1+0)/2 = 0.25 -> rs 4 -> 80
        assert!((rsi[3].unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_sma_trailing_window() {
        let sma = sma_series(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(sma, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
    }

    #[test]
    fn test_vwap_zero_volume_is_undefined() {
        let bars = vec![make_bar(0, 10.0, 0.0), make_bar(1, 12.0, 100.0)];
        let vwap = vwap_series(&bars);
        assert_eq!(vwap[0], None);
        assert!((vwap[1].unwrap() - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_vwap_is_cumulative() {
        let bars = vec![make_bar(0, 10.0, 100.0), make_bar(1, 20.0, 300.0)];
        let vwap = vwap_series(&bars);
        assert!((vwap[1].unwrap() - 17.5).abs() < 1e-12);
    }

    #[test]
    fn test_macd_signal_first_defined_index() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64).sin()).collect();
        let (macd, signal) = macd_series(&closes, 12, 26, 9);
        assert!(macd[24].is_none());
        assert!(macd[25].is_some());
        assert!(signal[32].is_none());
        assert!(signal[33].is_some());
    }

    #[test]
    fn test_insufficient_data() {
        let engine = IndicatorEngine::default();
        let series = make_series(&[100.0; 25]);
        let err = engine.compute(&series).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData {
                required: 26,
                available: 25
            }
        ));
    }

    #[test]
    fn test_flat_series_has_no_spikes_and_zero_macd() {
        let engine = IndicatorEngine::default();
        let frame = engine.compute(&make_series(&[50.0; 40])).unwrap();
        for row in frame.rows() {
            assert!(!row.volume_spike);
            if let Some(ema) = row.ema_fast {
                assert!((ema - 50.0).abs() < 1e-9);
            }
            if let Some(macd) = row.macd {
                assert!(macd.abs() < 1e-9);
            }
            if let Some(rsi) = row.rsi {
                assert_eq!(rsi, 100.0);
            }
        }
        let ready = frame.ready_rows();
        assert_eq!(ready.len(), 40 - 33);
        assert!(ready.iter().all(|r| r.macd_signal.abs() < 1e-9));
    }

    #[test]
    fn test_volume_spike_detection() {
        let mut bars: Vec<Bar> = (0..30).map(|i| make_bar(i, 100.0, 1000.0)).collect();
        bars.push(make_bar(30, 100.0, 3000.0));
        let series = Series::from_bars("TEST", Interval::Min15, bars).unwrap();
        let frame = IndicatorEngine::default().compute(&series).unwrap();
        let last = frame.rows().last().unwrap();
        assert!(last.volume_spike);
        assert!(!frame.rows()[29].volume_spike);
    }

    #[test]
    fn test_ready_rows_never_exceed_input() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64 * 0.3).cos()).collect();
        let frame = IndicatorEngine::default()
            .compute(&make_series(&closes))
            .unwrap();
        assert_eq!(frame.rows().len(), 100);
        assert!(frame.ready_rows().len() <= 100);
        assert_eq!(frame.ready_rows()[0].bar_index, 33);
    }

    #[test]
    fn test_zero_window_rejected() {
        let engine = IndicatorEngine::new(IndicatorConfig {
            ema_fast: 0,
            ..Default::default()
        });
        let err = engine.compute(&make_series(&[1.0; 40])).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidParameter {
                name: "ema_fast",
                ..
            }
        ));
    }
}
