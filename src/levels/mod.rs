//! Level Detector - Support and resistance from local extrema
//!
//! A bar is a support when its low is strictly below every low in the
//! `sensitivity` bars on each side, and a resistance when its high is strictly
//! above every high on each side. The first and last `sensitivity` bars have
//! no full neighbourhood and never qualify. A level at bar `i` is only known
//! once bar `i + sensitivity` exists.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{Bar, Level, LevelKind};

/// Level detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Bars compared on each side of a candidate
    pub sensitivity: usize,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self { sensitivity: 3 }
    }
}

/// Scan bars for local minima/maxima, in bar order.
///
/// When a bar is both a support and a resistance, both are kept, support first.
pub fn detect_levels(bars: &[Bar], sensitivity: usize) -> Result<Vec<Level>, PipelineError> {
    if sensitivity == 0 {
        return Err(PipelineError::InvalidParameter {
            name: "sensitivity",
            reason: "must be at least 1".to_string(),
        });
    }

    let mut levels = Vec::new();
    if bars.len() <= 2 * sensitivity {
        return Ok(levels);
    }

    for i in sensitivity..bars.len() - sensitivity {
        let before = &bars[i - sensitivity..i];
        let after = &bars[i + 1..=i + sensitivity];
        let bar = &bars[i];

        let is_support = before
            .iter()
            .chain(after)
            .all(|neighbour| bar.low < neighbour.low);
        if is_support {
            levels.push(Level {
                kind: LevelKind::Support,
                bar_index: i,
                confirmed_index: i + sensitivity,
                timestamp: bar.timestamp,
                price: bar.low,
            });
        }

        let is_resistance = before
            .iter()
            .chain(after)
            .all(|neighbour| bar.high > neighbour.high);
        if is_resistance {
            levels.push(Level {
                kind: LevelKind::Resistance,
                bar_index: i,
                confirmed_index: i + sensitivity,
                timestamp: bar.timestamp,
                price: bar.high,
            });
        }
    }

    tracing::debug!(
        bars = bars.len(),
        sensitivity,
        supports = levels.iter().filter(|l| l.kind == LevelKind::Support).count(),
        resistances = levels.iter().filter(|l| l.kind == LevelKind::Resistance).count(),
        "Level detection completed"
    );
    Ok(levels)
}

/// |price - level| / price < band
pub fn is_near(price: f64, level: f64, band: f64) -> bool {
    if price == 0.0 || !price.is_finite() {
        return false;
    }
    ((price - level) / price).abs() < band
}

/// Near-support / near-resistance flags for one price
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximityCheck {
    pub near_support: bool,
    pub near_resistance: bool,
}

impl ProximityCheck {
    /// Evaluate `price` against every level in `levels`
    pub fn evaluate<'a>(
        price: f64,
        levels: impl IntoIterator<Item = &'a Level>,
        band: f64,
    ) -> Self {
        let mut check = Self::default();
        for level in levels {
            if !is_near(price, level.price, band) {
                continue;
            }
            match level.kind {
                LevelKind::Support => check.near_support = true,
                LevelKind::Resistance => check.near_resistance = true,
            }
        }
        check
    }
}
