//! Error types for feature extraction.

use thiserror::Error;

/// Errors that can occur while extracting surface features.
///
/// Every variant describes a surface or configuration that cannot be
/// processed at all. Numerical trouble inside the surface (zero-area
/// vertices, degenerate triangles) is repaired, not reported.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Surface has no vertices.
    #[error("surface has no vertices")]
    EmptySurface,

    /// A face references a vertex that does not exist.
    #[error("face {face} references vertex {index}, but the surface has {vertex_count} vertices")]
    FaceIndexOutOfBounds {
        /// Face position in the face list.
        face: usize,
        /// The offending vertex index.
        index: usize,
        /// Number of vertices in the surface.
        vertex_count: usize,
    },

    /// A vertex coordinate is NaN or infinite.
    #[error("vertex {index} has a non-finite coordinate")]
    NonFiniteVertex {
        /// The offending vertex index.
        index: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for feature extraction.
pub type FeatureResult<T> = Result<T, FeatureError>;
