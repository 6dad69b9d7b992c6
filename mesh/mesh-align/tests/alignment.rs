//! End-to-end alignment against small synthetic shape models.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use mesh_align::{
    AlignParams, GaussianMixture, NormalizationStats, OptimizerParams, RigidParams, ShapeModel,
    align_features, align_surface, rot3, rot_trans,
};
use mesh_features::FeatureMatrix;
use mesh_types::{IndexedMesh, Point3, Vertex};
use nalgebra::{Matrix6, Vector3, Vector6};

const SIGMAS: [f64; 3] = [1.5, 1.0, 0.5];

/// One component at the origin with per-axis spatial spread `SIGMAS`.
fn anisotropic_model() -> ShapeModel {
    let chol = Matrix6::from_diagonal(&Vector6::new(
        1.0 / SIGMAS[0],
        1.0 / SIGMAS[1],
        1.0 / SIGMAS[2],
        1.0,
        1.0,
        1.0,
    ));
    let mixture = GaussianMixture::new(&[1.0], &[Vector6::zeros()], &[chol]).unwrap();
    ShapeModel::new(NormalizationStats::identity(), mixture)
}

/// Points along each axis at half and a quarter of that axis' spread.
fn axis_cloud() -> Vec<Point3<f64>> {
    let mut points = Vec::new();
    for (axis, sigma) in SIGMAS.iter().enumerate() {
        for scale in [0.5, -0.5, 0.25, -0.25] {
            let mut p = Point3::origin();
            p[axis] = scale * sigma;
            points.push(p);
        }
    }
    points
}

fn features_from(points: &[Point3<f64>]) -> FeatureMatrix {
    let rows = points
        .iter()
        .map(|p| Vector6::new(p.x, p.y, p.z, 0.0, 0.0, 0.0))
        .collect();
    FeatureMatrix::from_parts(rows, Vec::new())
}

#[test]
fn recovers_a_known_rigid_motion() {
    let original = axis_cloud();
    let rotation = rot3(0.1, -0.15, 0.2);
    let translation = Vector3::new(0.2, -0.1, 0.05);
    let moved: Vec<Point3<f64>> = original
        .iter()
        .map(|p| rot_trans(p, &rotation, &translation))
        .collect();

    let params = AlignParams::default()
        .with_optimizer(OptimizerParams::default().with_gradient_tolerance(1e-8));
    let result = align_features(&features_from(&moved), &anisotropic_model(), &params).unwrap();

    assert!(result.final_score < result.init_score);
    assert_eq!(result.misaligned, result.init_score > params.misalignment_threshold);
    for (aligned, expected) in result.mesh.vertices.iter().zip(&original) {
        assert_relative_eq!(aligned.position, *expected, epsilon = 1e-4);
    }

    // The recovered motion undoes the applied one on any point
    let sample = Point3::new(0.3, -0.7, 1.1);
    let round_trip = result.params.transform_point(&rot_trans(&sample, &rotation, &translation));
    assert_relative_eq!(round_trip, sample, epsilon = 1e-4);
}

#[test]
fn features_at_a_component_mean_score_below_threshold() {
    let near = Vector6::new(0.2, -0.1, 0.3, 0.0, 0.0, 0.0);
    let far = Vector6::new(40.0, 40.0, 40.0, 0.0, 0.0, 0.0);
    let mixture = GaussianMixture::new(
        &[0.9, 0.1],
        &[near, far],
        &[Matrix6::identity(), Matrix6::identity()],
    )
    .unwrap();
    let model = ShapeModel::new(NormalizationStats::identity(), mixture);

    let features = FeatureMatrix::from_parts(vec![near; 5], Vec::new());
    let result = align_features(&features, &model, &AlignParams::default()).unwrap();

    let expected = 3.0 * (2.0 * std::f64::consts::PI).ln() - 0.9_f64.ln();
    assert_relative_eq!(result.init_score, expected, epsilon = 1e-9);
    assert!(result.init_score < 6.0);
    assert!(!result.misaligned);
}

#[test]
fn threshold_is_configuration() {
    let features = features_from(&axis_cloud());
    let strict = AlignParams::default().with_misalignment_threshold(1.0);
    let result = align_features(&features, &anisotropic_model(), &strict).unwrap();
    assert!(result.misaligned);
}

#[test]
fn initial_guess_is_honored() {
    let features = features_from(&axis_cloud());
    let params = AlignParams::default()
        .with_initial_params(RigidParams::new(0.0, 0.0, 0.0, Vector3::new(0.3, 0.0, 0.0)))
        .with_optimizer(OptimizerParams::default().with_max_iterations(0));
    let result = align_features(&features, &anisotropic_model(), &params).unwrap();

    assert_eq!(result.report.iterations, 0);
    assert_relative_eq!(result.params.translation.x, 0.3);
    assert_relative_eq!(result.mesh.vertices[0].position.x, 0.5 * SIGMAS[0] + 0.3, epsilon = 1e-12);
}

#[test]
fn shared_model_gives_identical_results_across_threads() {
    let model = Arc::new(anisotropic_model());
    let rotation = rot3(0.05, 0.1, -0.05);
    let moved: Vec<Point3<f64>> = axis_cloud()
        .iter()
        .map(|p| rot_trans(p, &rotation, &Vector3::new(0.1, 0.1, 0.1)))
        .collect();
    let features = features_from(&moved);
    let params = AlignParams::default();

    let reference = align_features(&features, &model, &params).unwrap();
    thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let model = Arc::clone(&model);
                let features = &features;
                let params = &params;
                scope.spawn(move || align_features(features, &model, params).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), reference);
        }
    });
}

#[test]
fn shape_model_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ShapeModel>();
}

/// Subdivided icosahedron of `radius` centered on `center`.
fn icosphere(radius: f64, center: Vector3<f64>, subdivisions: u32) -> IndexedMesh {
    let t = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let mut points: Vec<Vector3<f64>> = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .iter()
    .map(|&[x, y, z]| Vector3::new(x, y, z))
    .collect();
    #[rustfmt::skip]
    let mut faces: Vec<[u32; 3]> = vec![
        [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
        [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
        [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
        [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
    ];
    for _ in 0..subdivisions {
        let mut cache: HashMap<(u32, u32), u32> = HashMap::new();
        let mut split = |a: u32, b: u32, points: &mut Vec<Vector3<f64>>| {
            *cache.entry((a.min(b), a.max(b))).or_insert_with(|| {
                points.push((points[a as usize] + points[b as usize]) / 2.0);
                u32::try_from(points.len() - 1).unwrap()
            })
        };
        let mut next = Vec::with_capacity(faces.len() * 4);
        for &[a, b, c] in &faces {
            let ab = split(a, b, &mut points);
            let bc = split(b, c, &mut points);
            let ca = split(c, a, &mut points);
            next.extend_from_slice(&[[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        faces = next;
    }
    let vertices = points
        .into_iter()
        .map(|p| Vertex::new(Point3::from(p.normalize() * radius + center)))
        .collect();
    IndexedMesh::from_parts(vertices, faces)
}

#[test]
fn off_center_sphere_is_recentered() {
    let radius = 50.0;
    let mesh = icosphere(radius, Vector3::new(5.0, -3.0, 2.0), 2);

    let stats = NormalizationStats::new(
        Vector6::new(0.0, 0.0, 0.0, 2.0 / radius, 2.0 / radius, 2.0 / radius),
        Vector6::new(50.0, 50.0, 50.0, 0.01, 0.01, 0.01),
    )
    .unwrap();
    let mixture = GaussianMixture::new(&[1.0], &[Vector6::zeros()], &[Matrix6::identity()]).unwrap();
    let model = ShapeModel::new(stats, mixture);

    let result = align_surface(&mesh, &model, &AlignParams::default()).unwrap();
    assert!(result.final_score < result.init_score);
    assert_eq!(result.mesh.faces, mesh.faces);

    let n = f64::from(u32::try_from(result.mesh.vertex_count()).unwrap());
    let centroid = result
        .mesh
        .positions()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / n;
    assert!(centroid.norm() < 0.05, "centroid {centroid:?}");
    for p in result.mesh.positions() {
        assert_relative_eq!((p.coords - centroid).norm(), radius, max_relative = 1e-6);
    }
}

#[test]
fn empty_surface_fails_before_extraction() {
    let result = align_surface(&IndexedMesh::new(), &anisotropic_model(), &AlignParams::default());
    assert!(matches!(result, Err(mesh_align::AlignError::InvalidSurface(_))));
}
