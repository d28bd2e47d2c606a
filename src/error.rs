//! Error types for the signal pipeline

use thiserror::Error;

/// Errors raised by the analysis stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fewer bars than the largest indicator window.
    #[error("insufficient data: {available} bars available, {required} required")]
    InsufficientData { required: usize, available: usize },

    /// No bar survived cleaning or warm-up, so there is nothing to report.
    #[error("no signal available: series is empty")]
    EmptySeries,

    /// Timestamps must be strictly increasing.
    #[error("bars out of order or duplicated at index {index}")]
    UnorderedBars { index: usize },

    /// A window or threshold that cannot produce meaningful output.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The bar source failed; the stages never ran.
    #[error("bar source failed: {0}")]
    Source(#[source] anyhow::Error),
}
