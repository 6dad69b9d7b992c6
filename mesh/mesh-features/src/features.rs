//! Per-vertex feature extraction.

use mesh_types::{IndexedMesh, Point3};
use nalgebra::Vector6;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::curvature::{mean_curvature, repair_non_finite};
use crate::smoothing::{ImplicitSmoother, SmoothingReport, SolverSettings};
use crate::{CotangentLaplacian, FeatureError, FeatureParams, FeatureResult};

/// Per-vertex feature rows `[x, y, z, c1, c2, c3]` with the surface faces.
///
/// `c_i` is mean curvature smoothed at the i-th configured scale. The face
/// list is carried unchanged so an aligned surface can be rebuilt from the
/// transformed positions.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<Vector6<f64>>,
    faces: Vec<[u32; 3]>,
    unconverged_solves: u32,
}

impl FeatureMatrix {
    /// Creates a feature matrix from rows and faces.
    #[must_use]
    pub const fn from_parts(rows: Vec<Vector6<f64>>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            rows,
            faces,
            unconverged_solves: 0,
        }
    }

    /// Feature rows, one per vertex.
    #[must_use]
    pub fn rows(&self) -> &[Vector6<f64>] {
        &self.rows
    }

    /// Face list of the source surface.
    #[must_use]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Smoothing solves, over all scales and passes, that stopped at the
    /// iteration cap before reaching the solver tolerance.
    ///
    /// Zero for matrices built with [`from_parts`](Self::from_parts).
    #[must_use]
    pub const fn unconverged_solves(&self) -> u32 {
        self.unconverged_solves
    }

    /// Spatial channels of every row.
    pub fn positions(&self) -> impl Iterator<Item = Point3<f64>> + '_ {
        self.rows.iter().map(|r| Point3::new(r[0], r[1], r[2]))
    }

    /// Splits into rows and faces.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Vector6<f64>>, Vec<[u32; 3]>) {
        (self.rows, self.faces)
    }
}

/// Checks that a surface can go through feature extraction.
///
/// # Errors
///
/// Returns an error if the surface has no vertices, a coordinate is not
/// finite, or a face references a missing vertex.
pub fn validate_surface(mesh: &IndexedMesh) -> FeatureResult<()> {
    if mesh.vertices.is_empty() {
        return Err(FeatureError::EmptySurface);
    }
    if let Some(index) = mesh.vertices.iter().position(|v| !v.is_finite()) {
        return Err(FeatureError::NonFiniteVertex { index });
    }
    if let Some(face) = mesh.first_invalid_face() {
        let vertex_count = mesh.vertex_count();
        let index = mesh.faces[face]
            .iter()
            .map(|&i| i as usize)
            .find(|&i| i >= vertex_count)
            .unwrap_or_default();
        return Err(FeatureError::FaceIndexOutOfBounds {
            face,
            index,
            vertex_count,
        });
    }
    Ok(())
}

/// Extracts the 6-channel feature matrix of a surface.
///
/// Mean curvature is computed once, non-finite values are set to zero, and
/// the result is smoothed independently at each configured scale. Solves
/// that hit `solver_max_iterations` above `solver_tolerance` are logged at
/// warn level and counted in [`FeatureMatrix::unconverged_solves`].
///
/// # Errors
///
/// Returns an error if the parameters are invalid or the surface fails
/// [`validate_surface`].
///
/// # Example
///
/// ```
/// use mesh_features::{extract_features, FeatureParams};
/// use mesh_types::IndexedMesh;
///
/// let tetra = IndexedMesh::from_raw(
///     &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
///     &[0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3],
/// );
/// let features = extract_features(&tetra, &FeatureParams::default()).unwrap();
/// assert_eq!(features.len(), 4);
/// assert_eq!(features.faces(), tetra.faces.as_slice());
/// ```
pub fn extract_features(mesh: &IndexedMesh, params: &FeatureParams) -> FeatureResult<FeatureMatrix> {
    params.validate()?;
    validate_surface(mesh)?;

    info!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        scales = ?params.smoothing_scales,
        "Extracting surface features"
    );

    let laplacian = CotangentLaplacian::from_mesh(mesh);
    let positions: Vec<Point3<f64>> = mesh.positions().copied().collect();

    let mut curvature = mean_curvature(&laplacian, &positions);
    let repaired = repair_non_finite(&mut curvature);
    if repaired > 0 {
        debug!(repaired, "Set non-finite curvature to zero");
    }

    let settings = SolverSettings {
        tolerance: params.solver_tolerance,
        max_iterations: params.solver_max_iterations,
    };
    let (channels, reports): (Vec<Vec<f64>>, Vec<SmoothingReport>) = params
        .smoothing_scales
        .par_iter()
        .map(|&scale| {
            ImplicitSmoother::new(&laplacian, scale).smooth_with_report(
                &curvature,
                params.smoothing_iterations,
                settings,
            )
        })
        .unzip();

    let unconverged_solves: u32 = reports.iter().map(|r| r.unconverged_passes).sum();
    if unconverged_solves > 0 {
        let worst_residual = reports.iter().map(|r| r.worst_residual).fold(0.0, f64::max);
        warn!(
            unconverged_solves,
            worst_residual,
            tolerance = params.solver_tolerance,
            max_iterations = params.solver_max_iterations,
            "Curvature smoothing stopped before reaching tolerance"
        );
    }

    let rows = positions
        .iter()
        .enumerate()
        .map(|(i, p)| Vector6::new(p.x, p.y, p.z, channels[0][i], channels[1][i], channels[2][i]))
        .collect();

    Ok(FeatureMatrix {
        rows,
        faces: mesh.faces.clone(),
        unconverged_solves,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mesh_types::Vertex;

    fn tetra() -> IndexedMesh {
        IndexedMesh::from_raw(
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            &[0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3],
        )
    }

    #[test]
    fn spatial_channels_are_positions() {
        let mesh = tetra();
        let features = extract_features(&mesh, &FeatureParams::default()).unwrap();
        for (p, q) in mesh.positions().zip(features.positions()) {
            assert_eq!(*p, q);
        }
        assert!(features.rows().iter().all(|r| r.iter().all(|c| c.is_finite())));
    }

    #[test]
    fn empty_surface_is_rejected() {
        let result = extract_features(&IndexedMesh::new(), &FeatureParams::default());
        assert!(matches!(result, Err(FeatureError::EmptySurface)));
    }

    #[test]
    fn dangling_face_is_rejected() {
        let mut mesh = tetra();
        mesh.faces.push([0, 1, 10]);
        assert!(matches!(
            validate_surface(&mesh),
            Err(FeatureError::FaceIndexOutOfBounds {
                face: 4,
                index: 10,
                vertex_count: 4
            })
        ));
    }

    #[test]
    fn nan_vertex_is_rejected() {
        let mut mesh = tetra();
        mesh.vertices[2] = Vertex::from_coords(0.0, f64::NAN, 0.0);
        assert!(matches!(
            validate_surface(&mesh),
            Err(FeatureError::NonFiniteVertex { index: 2 })
        ));
    }

    #[test]
    fn invalid_params_fail_before_work() {
        let params = FeatureParams {
            smoothing_scales: vec![5.0],
            ..FeatureParams::default()
        };
        assert!(matches!(
            extract_features(&tetra(), &params),
            Err(FeatureError::InvalidParameter(_))
        ));
    }

    /// Bumpy height field over a `side` x `side` grid, stretched along y.
    fn stretched_grid(side: u32) -> IndexedMesh {
        let mut mesh = IndexedMesh::new();
        for j in 0..side {
            for i in 0..side {
                let (x, y) = (f64::from(i), 0.25 * f64::from(j));
                let z = 0.3 * (1.7 * x).sin() * (3.0 * y).cos();
                mesh.vertices.push(Vertex::from_coords(x, y, z));
            }
        }
        for j in 0..side - 1 {
            for i in 0..side - 1 {
                let a = j * side + i;
                mesh.faces.push([a, a + 1, a + side + 1]);
                mesh.faces.push([a, a + side + 1, a + side]);
            }
        }
        mesh
    }

    #[test]
    fn converged_smoothing_reports_no_stalled_solves() {
        let features = extract_features(&tetra(), &FeatureParams::default()).unwrap();
        assert_eq!(features.unconverged_solves(), 0);
    }

    #[test]
    fn iteration_cap_is_counted_per_solve() {
        let mesh = stretched_grid(12);
        let params = FeatureParams::default()
            .with_solver_tolerance(1e-14)
            .with_solver_max_iterations(1);
        let capped = extract_features(&mesh, &params).unwrap();
        // Three scales, each with all its passes capped
        assert_eq!(capped.unconverged_solves(), 3 * params.smoothing_iterations);

        let full = extract_features(&mesh, &FeatureParams::default()).unwrap();
        assert_eq!(full.unconverged_solves(), 0);
        assert_ne!(capped.rows(), full.rows());
    }

    #[test]
    fn points_without_faces_get_zero_curvature() {
        let mut mesh = IndexedMesh::new();
        mesh.vertices.push(Vertex::from_coords(1.0, 2.0, 3.0));
        let features = extract_features(&mesh, &FeatureParams::default()).unwrap();
        assert_eq!(features.rows()[0], Vector6::new(1.0, 2.0, 3.0, 0.0, 0.0, 0.0));
    }
}
