//! Multi-scale curvature features for statistical scan alignment.
//!
//! Every vertex of a surface is described by six numbers: its position and
//! its mean curvature smoothed at three spatial scales. Small scales keep
//! local detail such as the bridge of the nose; large scales describe the
//! overall shape of the skull.
//!
//! # Pipeline
//!
//! 1. Build the cotangent Laplacian, lumped vertex areas and vertex normals
//!    ([`CotangentLaplacian`])
//! 2. Compute mean curvature ([`mean_curvature`]) and set NaN or infinite
//!    values to zero ([`repair_non_finite`])
//! 3. Smooth the curvature field implicitly at each scale
//!    ([`ImplicitSmoother`])
//! 4. Assemble `[x, y, z, c1, c2, c3]` rows ([`FeatureMatrix`])
//!
//! # Example
//!
//! ```
//! use mesh_features::{extract_features, FeatureParams};
//! use mesh_types::IndexedMesh;
//!
//! let square = IndexedMesh::from_raw(
//!     &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
//!     &[0, 1, 2, 0, 2, 3],
//! );
//! let features = extract_features(&square, &FeatureParams::default()).unwrap();
//!
//! // A flat surface has no curvature at any scale
//! for row in features.rows() {
//!     assert!(row[3].abs() < 1e-9 && row[4].abs() < 1e-9 && row[5].abs() < 1e-9);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod curvature;
mod error;
mod features;
mod laplacian;
mod params;
mod smoothing;

pub use curvature::{mean_curvature, repair_non_finite};
pub use error::{FeatureError, FeatureResult};
pub use features::{FeatureMatrix, extract_features, validate_surface};
pub use laplacian::CotangentLaplacian;
pub use params::{CURVATURE_CHANNELS, FeatureParams};
pub use smoothing::{ImplicitSmoother, SmoothingReport, SolverSettings};
