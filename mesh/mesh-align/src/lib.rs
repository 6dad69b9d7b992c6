//! Rigid alignment of scanned surfaces against a statistical shape model.
//!
//! A [`ShapeModel`] is a 6-D Gaussian mixture over normalized per-vertex
//! features (position plus mean curvature at three scales) together with the
//! normalization statistics of its training population. Alignment finds the
//! six rigid parameters `[φ, θ, ψ, tx, ty, tz]` that make the scan's features
//! most likely under the model, then moves the scan's vertices accordingly.
//!
//! # Pipeline
//!
//! 1. Extract features ([`mesh_features::extract_features`])
//! 2. Z-score every channel and bound the curvature channels with `tanh`
//!    ([`NormalizationStats::squash`])
//! 3. Score the untransformed features and flag likely misalignment
//! 4. Minimize the negative mean log-likelihood with BFGS ([`minimize`])
//! 5. Apply the optimum to the spatial channels and undo the z-score
//!
//! # Example
//!
//! ```
//! use mesh_align::{AlignParams, GaussianMixture, NormalizationStats, ShapeModel, align_features};
//! use mesh_features::FeatureMatrix;
//! use nalgebra::{Matrix6, Vector6};
//!
//! let mixture = GaussianMixture::new(&[1.0], &[Vector6::zeros()], &[Matrix6::identity()]).unwrap();
//! let model = ShapeModel::new(NormalizationStats::identity(), mixture);
//!
//! let rows = vec![Vector6::new(0.5, 0.0, 0.0, 0.0, 0.0, 0.0); 3];
//! let features = FeatureMatrix::from_parts(rows, vec![[0, 1, 2]]);
//!
//! let result = align_features(&features, &model, &AlignParams::default()).unwrap();
//! assert!(result.final_score <= result.init_score);
//! assert!(!result.misaligned);
//! ```
//!
//! # Concurrency
//!
//! [`ShapeModel`] is immutable after loading and may be shared across
//! threads. A single objective evaluation is parallel over feature rows;
//! the reduction order is fixed, so results are reproducible.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![allow(clippy::many_single_char_names)]

mod align;
mod bfgs;
mod error;
mod mixture;
mod model;
mod normalize;
mod objective;
mod transform;

pub use align::{AlignParams, Alignment, align_features, align_surface};
pub use bfgs::{
    ConvergenceStatus, LineSearchParams, Minimum, OptimizerParams, OptimizerReport, minimize,
};
pub use error::{AlignError, AlignResult, ModelLoadError, ModelResult};
pub use mixture::GaussianMixture;
pub use model::{FEATURE_DIM, SchemaVersion, ShapeModel, ShapeModelFile};
pub use normalize::{DEFAULT_TANH_CHANNELS, NormalizationStats};
pub use objective::{AlignmentObjective, DifferentiableFunction};
pub use transform::{BlockTransform, RigidParams, rot_trans, rot3, rot3_derivatives};
