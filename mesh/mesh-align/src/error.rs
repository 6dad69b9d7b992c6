//! Error types for model loading and alignment.

use std::path::PathBuf;

use mesh_features::FeatureError;
use thiserror::Error;

use crate::SchemaVersion;

/// Errors that can occur while loading a shape model artifact.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// The artifact file could not be read.
    #[error("failed to read model {path}: {source}")]
    Io {
        /// Path of the artifact.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The artifact is not valid JSON for the expected schema.
    #[error("failed to parse model: {0}")]
    Parse(#[from] serde_json::Error),

    /// The artifact was written with an incompatible schema version.
    #[error("unsupported model schema {found}, expected {supported}")]
    UnsupportedVersion {
        /// Version found in the artifact.
        found: SchemaVersion,
        /// Version this build reads.
        supported: SchemaVersion,
    },

    /// An array has the wrong length.
    #[error("{field}: expected {expected} entries, got {got}")]
    DimensionMismatch {
        /// Name of the offending field.
        field: String,
        /// Required length.
        expected: usize,
        /// Length found.
        got: usize,
    },

    /// The mixture has no components.
    #[error("mixture has no components")]
    EmptyMixture,

    /// A value is NaN or infinite.
    #[error("{field} contains a non-finite value")]
    NonFinite {
        /// Name of the offending field.
        field: String,
    },

    /// Mixture weights are negative or do not sum to one.
    #[error("invalid mixture weights: {0}")]
    InvalidWeights(String),

    /// A precision Cholesky factor is not triangular with a positive diagonal.
    #[error("invalid precision factor for component {component}: {reason}")]
    InvalidPrecision {
        /// Component index.
        component: usize,
        /// What was wrong.
        reason: String,
    },

    /// A normalization standard deviation is not positive.
    #[error("normalization std for channel {channel} must be positive, got {value}")]
    InvalidStds {
        /// Feature channel.
        channel: usize,
        /// Offending value.
        value: f64,
    },
}

/// Result type for model loading.
pub type ModelResult<T> = Result<T, ModelLoadError>;

/// Errors that can occur during alignment.
///
/// A poor fit is never an error; see
/// [`Alignment::misaligned`](crate::Alignment::misaligned) and
/// [`ConvergenceStatus`](crate::ConvergenceStatus).
#[derive(Debug, Error)]
pub enum AlignError {
    /// The surface cannot be turned into features.
    #[error("invalid surface: {0}")]
    InvalidSurface(#[from] FeatureError),

    /// The shape model could not be loaded.
    #[error("model load failed: {0}")]
    ModelLoad(#[from] ModelLoadError),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for alignment operations.
pub type AlignResult<T> = Result<T, AlignError>;
