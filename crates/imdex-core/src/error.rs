//! Error types for imdex-core
//!
//! Usage errors fail immediately and are not recoverable. Numeric
//! degeneracies (zero variance, zero fold-change) are never errors: they
//! are resolved by the flooring policies in the statistics layer. Fit
//! quality problems and unresolved identifiers are logged and do not
//! interrupt processing.

use thiserror::Error;

use imdex_stats::UnknownMethodError;

/// Main error type for imdex operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImdexError {
    /// Group label not present in the grouping
    #[error("group '{label}' not recognized")]
    UnknownGroup { label: String },

    /// Partition label not present in the partitioning
    #[error("partition '{label}' not recognized")]
    UnknownPartition { label: String },

    /// Correction method name could not be parsed
    #[error(transparent)]
    UnknownCorrectionMethod(#[from] UnknownMethodError),

    /// Fold-change thresholds are ratios and must be positive
    #[error("fold-change threshold must be positive, got {value}")]
    NonPositiveFoldChangeThreshold { value: f64 },

    /// Dense accessors are unavailable on lazy pairwise results
    #[error(
        "the full {quantity} tensor is not available on a lazy pairwise result; \
         query a bounded sub-block instead"
    )]
    DenseUnavailable { quantity: &'static str },

    /// Individual sub-tests were not retained at construction
    #[error("individual tests were not retained")]
    TestsNotRetained,

    /// Arrays of one result must share a feature set
    #[error("feature sets do not match: {message}")]
    FeatureMismatch { message: String },

    /// Array dimensions are inconsistent
    #[error("dimension mismatch: {message}")]
    ShapeMismatch { message: String },

    /// Moment-based tests compare exactly two groups
    #[error("grouping must contain exactly two groups, got {count}")]
    NotTwoGroups { count: usize },

    /// The continuous decorator needs the fit's design matrix
    #[error("model fit does not carry a design matrix")]
    MissingDesign,
}

/// Result type alias for imdex operations.
pub type ImdexResult<T> = Result<T, ImdexError>;
