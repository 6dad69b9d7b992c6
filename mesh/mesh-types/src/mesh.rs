//! Indexed triangle mesh.

use crate::{Triangle, Vertex};
use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An indexed triangle mesh.
///
/// Stores vertices and faces separately, with faces referencing vertices by
/// index. Alignment rewrites vertex positions and leaves `faces` untouched,
/// so the face list of an aligned surface is always the input's.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
///
/// let mut mesh = IndexedMesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// assert_eq!(mesh.vertex_count(), 3);
/// assert_eq!(mesh.face_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexedMesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,

    /// Triangle faces as indices into the vertex array.
    /// Each face is `[v0, v1, v2]` with counter-clockwise winding.
    pub faces: Vec<[u32; 3]>,
}

impl IndexedMesh {
    /// Create a new empty mesh.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Create a mesh with pre-allocated capacity.
    #[inline]
    #[must_use]
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
        }
    }

    /// Create a mesh from vertices and faces.
    #[inline]
    #[must_use]
    pub const fn from_parts(vertices: Vec<Vertex>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Create a mesh from raw coordinate and index data.
    ///
    /// # Arguments
    ///
    /// * `positions` - Flat array of vertex positions `[x0, y0, z0, x1, y1, z1, ...]`
    /// * `indices` - Flat array of face indices `[v0a, v1a, v2a, v0b, v1b, v2b, ...]`
    ///
    /// Returns an empty mesh if either slice length is not a multiple of 3.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::IndexedMesh;
    ///
    /// let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    /// let indices = [0, 1, 2];
    ///
    /// let mesh = IndexedMesh::from_raw(&positions, &indices);
    /// assert_eq!(mesh.vertex_count(), 3);
    /// assert_eq!(mesh.face_count(), 1);
    /// ```
    #[must_use]
    pub fn from_raw(positions: &[f64], indices: &[u32]) -> Self {
        if positions.len() % 3 != 0 || indices.len() % 3 != 0 {
            return Self::new();
        }

        let vertices = positions
            .chunks_exact(3)
            .map(|c| Vertex::from_coords(c[0], c[1], c[2]))
            .collect();

        let faces = indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();

        Self { vertices, faces }
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces.
    #[inline]
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// A mesh is empty when it has no vertices or no faces.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Iterate over vertex positions.
    pub fn positions(&self) -> impl Iterator<Item = &Point3<f64>> {
        self.vertices.iter().map(|v| &v.position)
    }

    /// Get a triangle by face index with resolved vertex positions.
    ///
    /// Returns `None` if the face index, or any vertex index it holds, is
    /// out of bounds.
    #[must_use]
    pub fn triangle(&self, face_index: usize) -> Option<Triangle> {
        let [i0, i1, i2] = *self.faces.get(face_index)?;
        Some(Triangle::new(
            self.vertices.get(i0 as usize)?.position,
            self.vertices.get(i1 as usize)?.position,
            self.vertices.get(i2 as usize)?.position,
        ))
    }

    /// Iterate over all triangles with resolved vertex positions.
    ///
    /// # Panics
    ///
    /// Panics if a face references a vertex index that is out of bounds.
    /// Use [`IndexedMesh::first_invalid_face`] to check beforehand.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.faces.iter().map(|&[i0, i1, i2]| {
            Triangle::new(
                self.vertices[i0 as usize].position,
                self.vertices[i1 as usize].position,
                self.vertices[i2 as usize].position,
            )
        })
    }

    /// Index of the first face that references a missing vertex, if any.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::{IndexedMesh, Vertex};
    ///
    /// let mut mesh = IndexedMesh::new();
    /// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
    /// mesh.faces.push([0, 0, 3]);
    /// assert_eq!(mesh.first_invalid_face(), Some(0));
    /// ```
    #[must_use]
    pub fn first_invalid_face(&self) -> Option<usize> {
        let n = self.vertices.len();
        self.faces
            .iter()
            .position(|f| f.iter().any(|&i| i as usize >= n))
    }

    /// Replace vertex positions, keeping the face list.
    ///
    /// Returns `None` if the number of positions differs from the vertex
    /// count.
    #[must_use]
    pub fn with_positions(&self, positions: &[Point3<f64>]) -> Option<Self> {
        if positions.len() != self.vertices.len() {
            return None;
        }
        Some(Self {
            vertices: positions.iter().copied().map(Vertex::new).collect(),
            faces: self.faces.clone(),
        })
    }

    /// Compute the total surface area of the mesh.
    #[must_use]
    pub fn surface_area(&self) -> f64 {
        (0..self.faces.len())
            .filter_map(|i| self.triangle(i))
            .map(|tri| tri.area())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> IndexedMesh {
        IndexedMesh::from_raw(
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn mesh_is_empty() {
        let mesh = IndexedMesh::new();
        assert!(mesh.is_empty());

        let mut mesh2 = IndexedMesh::new();
        mesh2.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        assert!(mesh2.is_empty()); // no faces

        mesh2.faces.push([0, 0, 0]);
        assert!(!mesh2.is_empty());
    }

    #[test]
    fn from_raw_rejects_ragged_input() {
        let mesh = IndexedMesh::from_raw(&[0.0, 1.0], &[0, 1, 2]);
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn quad_area() {
        assert!((quad().surface_area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn triangle_out_of_bounds() {
        let mut mesh = quad();
        mesh.faces.push([0, 1, 9]);
        assert!(mesh.triangle(2).is_none());
        assert_eq!(mesh.first_invalid_face(), Some(2));
        assert!(quad().first_invalid_face().is_none());
    }

    #[test]
    fn with_positions_keeps_faces() {
        let mesh = quad();
        let moved: Vec<_> = mesh
            .positions()
            .map(|p| Point3::new(p.x + 10.0, p.y, p.z))
            .collect();
        let out = mesh.with_positions(&moved);
        assert!(out.is_some());
        if let Some(out) = out {
            assert_eq!(out.faces, mesh.faces);
            assert!((out.vertices[1].position.x - 11.0).abs() < f64::EPSILON);
        }
        assert!(mesh.with_positions(&moved[..2]).is_none());
    }
}
