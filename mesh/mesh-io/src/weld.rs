//! Exact-position vertex welding for triangle soups.

use hashbrown::HashMap;
use mesh_types::{IndexedMesh, Point3, Vertex};

/// Builds an indexed mesh from corner positions, sharing vertices whose
/// coordinates are bit-identical.
///
/// STL writers emit each shared corner with the same float bits, so exact
/// matching restores the original connectivity without an epsilon that could
/// collapse genuinely distinct scan points. `-0.0` and `0.0` are treated as
/// the same coordinate.
pub(crate) struct Welder {
    lookup: HashMap<[u64; 3], u32>,
    mesh: IndexedMesh,
}

impl Welder {
    pub(crate) fn with_capacity(face_count: usize) -> Self {
        Self {
            lookup: HashMap::with_capacity(face_count),
            mesh: IndexedMesh::with_capacity(face_count / 2 + 3, face_count),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    // Truncation: mesh indices are u32, meshes with >4B vertices are unsupported
    fn index_of(&mut self, p: Point3<f64>) -> u32 {
        let key = [key_bits(p.x), key_bits(p.y), key_bits(p.z)];
        let Self { lookup, mesh } = self;
        let next = mesh.vertices.len() as u32;
        *lookup.entry(key).or_insert_with(|| {
            mesh.vertices.push(Vertex::new(p));
            next
        })
    }

    pub(crate) fn push_triangle(&mut self, corners: [Point3<f64>; 3]) {
        let face = corners.map(|p| self.index_of(p));
        self.mesh.faces.push(face);
    }

    pub(crate) fn finish(self) -> IndexedMesh {
        self.mesh
    }
}

fn key_bits(c: f64) -> u64 {
    // Normalize signed zero so both spellings hash together
    if c == 0.0 { 0 } else { c.to_bits() }
}
