// Error types for the X-ITE preprocessing and training pipeline
//
// The stages share the same failure surface (config validation, dataset IO,
// degenerate inputs), so a single PipelineError covers the library.
// Binaries wrap it in anyhow.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the preprocessing, graph-generation and training stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration value rejected by fail-fast validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A label value outside the X-ITE taxonomy.
    #[error("invalid label '{0}'")]
    InvalidLabel(i32),

    /// Requested channel is not present in the loaded recording.
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    /// Feature identifier not present in the registered function table.
    #[error("unknown feature function '{0}'")]
    UnknownFeature(String),

    /// Butterworth design produced poles on or outside the unit circle.
    #[error("unstable filter coefficients (order {order}, cutoff {cutoff} Hz)")]
    UnstableFilter { order: usize, cutoff: f64 },

    /// Dataset file could not be read or parsed.
    #[error("failed to load {path}: {reason}")]
    DatasetLoad { path: PathBuf, reason: String },

    /// Inconsistent node feature counts in the assembled graph dataset.
    #[error("inconsistent graph dataset: {0}")]
    InconsistentNodeFeatures(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Forward/backward propagation failure; aborts the run, no retry.
    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
