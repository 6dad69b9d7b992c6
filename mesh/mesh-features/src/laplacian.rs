//! Cotangent Laplacian of a triangle mesh.
//!
//! The discrete Laplace-Beltrami operator is split the usual way:
//!
//! - `W`: symmetric edge weights `½ (cot α + cot β)`, where α and β are the
//!   angles opposite the edge in its (one or two) adjacent triangles
//! - `V`: diagonal of row sums of `W`
//! - `D`: lumped vertex area, one third of the adjacent triangle areas
//!
//! so that `D⁻¹ (V − W)` approximates `−Δ`. Degenerate triangles contribute
//! no weight and no area.

use hashbrown::HashMap;
use mesh_types::{IndexedMesh, Point3, Vector3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Cotangent Laplacian, lumped areas and vertex normals of a surface.
///
/// Built once per surface and shared by curvature estimation and every
/// smoothing scale. Faces must reference existing vertices.
#[derive(Debug, Clone)]
pub struct CotangentLaplacian {
    /// Off-diagonal edge weights `W` in CSR format.
    weights: CsrMatrix<f64>,
    /// Row sums of `W` (the diagonal `V`).
    degree: Vec<f64>,
    /// Lumped vertex areas `D`.
    areas: Vec<f64>,
    /// Area-weighted unit vertex normals; zero where undefined.
    normals: Vec<Vector3<f64>>,
}

impl CotangentLaplacian {
    /// Assembles the operator for `mesh`.
    ///
    /// # Panics
    ///
    /// Panics if a face references a vertex index that is out of bounds.
    /// [`extract_features`](crate::extract_features) validates this first.
    #[must_use]
    pub fn from_mesh(mesh: &IndexedMesh) -> Self {
        let n = mesh.vertex_count();
        let mut areas = vec![0.0; n];
        let mut normal_sums = vec![Vector3::zeros(); n];
        let mut edges: HashMap<(u32, u32), f64> = HashMap::with_capacity(mesh.face_count() * 2);

        for (face, tri) in mesh.faces.iter().zip(mesh.triangles()) {
            let area_share = tri.area() / 3.0;
            let face_normal = tri.normal_unnormalized();
            for &vi in face {
                areas[vi as usize] += area_share;
                normal_sums[vi as usize] += face_normal;
            }

            // The cotangent at corner k weights the opposite edge.
            let cots = tri.cotangents();
            for k in 0..3 {
                let (a, b) = (face[(k + 1) % 3], face[(k + 2) % 3]);
                if a == b || !cots[k].is_finite() {
                    continue;
                }
                *edges.entry((a.min(b), a.max(b))).or_insert(0.0) += 0.5 * cots[k];
            }
        }

        let mut coo = CooMatrix::new(n, n);
        for (&(a, b), &w) in &edges {
            coo.push(a as usize, b as usize, w);
            coo.push(b as usize, a as usize, w);
        }
        let weights = CsrMatrix::from(&coo);

        // Row sums from the sorted CSR rows so the result does not depend on
        // hash iteration order.
        let degree = weights.row_iter().map(|row| row.values().iter().sum()).collect();

        let normals = normal_sums
            .into_iter()
            .map(|v| v.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros))
            .collect();

        Self {
            weights,
            degree,
            areas,
            normals,
        }
    }

    /// Number of vertices the operator acts on.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.areas.len()
    }

    /// Lumped vertex areas `D`.
    #[must_use]
    pub fn areas(&self) -> &[f64] {
        &self.areas
    }

    /// Diagonal `V` (row sums of `W`).
    #[must_use]
    pub fn degree(&self) -> &[f64] {
        &self.degree
    }

    /// Unit vertex normals, zero for vertices without a non-degenerate face.
    #[must_use]
    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.normals
    }

    /// Edge weight matrix `W`.
    #[must_use]
    pub const fn weights(&self) -> &CsrMatrix<f64> {
        &self.weights
    }

    /// Computes `(V − W) x` for a per-vertex scalar field.
    ///
    /// # Panics
    ///
    /// Panics if `x` does not have one entry per vertex.
    #[must_use]
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.vertex_count(), "one value per vertex");
        self.weights
            .row_iter()
            .enumerate()
            .map(|(i, row)| {
                let wx: f64 = row
                    .col_indices()
                    .iter()
                    .zip(row.values())
                    .map(|(&j, &w)| w * x[j])
                    .sum();
                self.degree[i] * x[i] - wx
            })
            .collect()
    }

    /// Computes `(V − W) P` for vertex positions, one vector per vertex.
    ///
    /// # Panics
    ///
    /// Panics if `positions` does not have one entry per vertex.
    #[must_use]
    pub fn apply_points(&self, positions: &[Point3<f64>]) -> Vec<Vector3<f64>> {
        assert_eq!(positions.len(), self.vertex_count(), "one position per vertex");
        self.weights
            .row_iter()
            .enumerate()
            .map(|(i, row)| {
                row.col_indices()
                    .iter()
                    .zip(row.values())
                    .fold(Vector3::zeros(), |acc, (&j, &w)| {
                        acc + (positions[i] - positions[j]) * w
                    })
            })
            .collect()
    }
}
