//! Core mesh types for scan alignment.
//!
//! This crate provides the minimal surface representation the alignment
//! pipeline hands between stages:
//!
//! - [`Vertex`] - A point in 3D space
//! - [`IndexedMesh`] - A triangle mesh with indexed vertices
//! - [`Triangle`] - A concrete triangle with vertex positions
//!
//! # Units
//!
//! This library is **unit-agnostic**. All coordinates are `f64`.
//! Scanner output and the shipped shape models are in millimeters.
//!
//! # Coordinate System
//!
//! Uses a **right-handed coordinate system**. Face winding is
//! **counter-clockwise (CCW) when viewed from outside**.
//!
//! # Example
//!
//! ```
//! use mesh_types::{Vertex, IndexedMesh, Point3};
//!
//! let mut mesh = IndexedMesh::new();
//! mesh.vertices.push(Vertex::new(Point3::new(0.0, 0.0, 0.0)));
//! mesh.vertices.push(Vertex::new(Point3::new(1.0, 0.0, 0.0)));
//! mesh.vertices.push(Vertex::new(Point3::new(0.5, 1.0, 0.0)));
//! mesh.faces.push([0, 1, 2]);
//!
//! assert_eq!(mesh.face_count(), 1);
//! assert!(!mesh.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod mesh;
mod triangle;
mod vertex;

pub use mesh::IndexedMesh;
pub use triangle::Triangle;
pub use vertex::Vertex;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};
