//! Statistical alignment of scanned surfaces.
//!
//! This umbrella crate re-exports the mesh-* crates behind one dependency
//! and adds the file-level [`pipeline`]. None of them install a tracing
//! subscriber; binaries choose their own.
//!
//! # Quick Start
//!
//! ```no_run
//! use mesh::prelude::*;
//!
//! let model = ShapeModel::load("model.json").unwrap();
//! let scan = load_mesh("cleaned.ply").unwrap();
//!
//! let result = align_surface(&scan, &model, &AlignParams::default()).unwrap();
//! println!("score {} -> {}", result.init_score, result.final_score);
//!
//! save_mesh(&result.mesh, "aligned.stl").unwrap();
//! ```
//!
//! # Module Organization
//!
//! - [`types`] - Core data structures: `IndexedMesh`, `Vertex`, `Triangle`
//! - [`io`] - PLY and STL load and save
//! - [`features`] - Cotangent Laplacian, mean curvature, multi-scale smoothing
//! - [`align`] - Shape model, objective, BFGS and the alignment driver
//! - [`pipeline`] - Surface file and model file in, aligned surface file out

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![doc(html_root_url = "https://docs.rs/mesh/0.7.0")]

// =============================================================================
// Re-exports
// =============================================================================

/// Core data structures: `IndexedMesh`, `Vertex`, `Triangle`.
pub use mesh_types as types;

/// PLY and STL file I/O.
pub use mesh_io as io;

/// Multi-scale curvature features.
pub use mesh_features as features;

/// Rigid alignment against a Gaussian mixture shape model.
pub use mesh_align as align;

pub mod pipeline;

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for scan alignment.
///
/// # Usage
///
/// ```
/// use mesh::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use mesh_types::{IndexedMesh, Triangle, Vertex};

    // I/O
    pub use mesh_io::{MeshFormat, load_mesh, save_mesh};

    // Features
    pub use mesh_features::{FeatureMatrix, FeatureParams, extract_features};

    // Alignment
    pub use mesh_align::{
        AlignParams, Alignment, OptimizerParams, RigidParams, ShapeModel, align_features,
        align_surface,
    };

    // Files
    pub use crate::pipeline::align_scan;
}

// =============================================================================
// Tests
// =============================================================================
