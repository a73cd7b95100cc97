//! Analysis error taxonomy.

use thiserror::Error;

use crate::types::ValidationError;

/// Errors that can stop an analysis run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// Input failed structural validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An observation has no recorded events where some are required.
    #[error("observation {observation} has no recorded events in the analysis window")]
    DataUnavailable { observation: String },

    /// An internal invariant was violated during computation.
    #[error("computation error: {0}")]
    Computation(String),

    /// The run was cancelled before completion.
    #[error("analysis cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// Whether this error is specific to one observation and may be skipped.
    pub const fn is_per_observation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::DataUnavailable { .. })
    }
}
