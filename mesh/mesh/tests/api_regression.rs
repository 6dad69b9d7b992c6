//! API Regression Tests for the Scan Alignment Crates
//!
//! These tests keep the public API of the workspace stable. They are
//! organized in tiers of increasing scope:
//!
//! - Tier 1: Foundation (mesh-types)
//! - Tier 2: Surface I/O (mesh-io)
//! - Tier 3: Features (mesh-features)
//! - Tier 4: Alignment (mesh-align)
//! - Tier 5: Files end to end (pipeline)
//!
//! If any of these tests fail after API changes, it indicates a breaking change
//! that needs a version bump.

// Allow test-specific patterns
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::uninlined_format_args)]

use mesh::{align, features, io, prelude::*, types};

/// Regular octahedron scaled by `r`, faces wound outward.
fn octahedron(r: f64) -> IndexedMesh {
    let vertices = vec![
        Vertex::from_coords(r, 0.0, 0.0),
        Vertex::from_coords(-r, 0.0, 0.0),
        Vertex::from_coords(0.0, r, 0.0),
        Vertex::from_coords(0.0, -r, 0.0),
        Vertex::from_coords(0.0, 0.0, r),
        Vertex::from_coords(0.0, 0.0, -r),
    ];
    let faces = vec![
        [0, 2, 4],
        [2, 1, 4],
        [1, 3, 4],
        [3, 0, 4],
        [2, 0, 5],
        [1, 2, 5],
        [3, 1, 5],
        [0, 3, 5],
    ];
    IndexedMesh::from_parts(vertices, faces)
}

/// Model centered on the origin with a 50 mm spatial scale.
fn unit_model() -> align::ShapeModel {
    use nalgebra::{Matrix6, Vector6};
    let stats = align::NormalizationStats::new(
        Vector6::zeros(),
        Vector6::new(50.0, 50.0, 50.0, 1.0, 1.0, 1.0),
    )
    .unwrap();
    let mixture =
        align::GaussianMixture::new(&[1.0], &[Vector6::zeros()], &[Matrix6::identity()]).unwrap();
    align::ShapeModel::new(stats, mixture)
}

// =============================================================================
// TIER 1: Foundation - Basic Types
// =============================================================================

mod tier1_foundation {
    use super::*;

    #[test]
    fn vertex_creation_and_access() {
        let v = types::Vertex::from_coords(1.0, 2.0, 3.0);
        assert!((v.position.x - 1.0).abs() < f64::EPSILON);

        let v2 = types::Vertex::new(types::Point3::new(4.0, 5.0, 6.0));
        assert!((v2.position.x - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn indexed_mesh_construction() {
        let mesh = octahedron(1.0);
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.face_count(), 8);
        assert!(mesh.first_invalid_face().is_none());

        let raw = types::IndexedMesh::from_raw(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2]);
        assert!((raw.surface_area() - 0.5).abs() < 1e-12);
    }
}

// =============================================================================
// TIER 2: Surface I/O
// =============================================================================

mod tier2_io {
    use super::*;

    #[test]
    fn ply_and_stl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = octahedron(2.0);

        for name in ["octa.ply", "octa.stl"] {
            let path = dir.path().join(name);
            save_mesh(&mesh, &path).unwrap();
            let loaded = load_mesh(&path).unwrap();
            assert_eq!(loaded.vertex_count(), 6, "{}", name);
            assert_eq!(loaded.face_count(), 8, "{}", name);
        }
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let result = load_mesh("scan.obj");
        assert!(matches!(result, Err(io::IoError::UnknownFormat { .. })));
        assert_eq!(MeshFormat::from_path("scan.PLY"), Some(MeshFormat::Ply));
    }
}

// =============================================================================
// TIER 3: Features
// =============================================================================

mod tier3_features {
    use super::*;

    #[test]
    fn feature_rows_follow_the_surface() {
        let mesh = octahedron(1.0);
        let matrix = extract_features(&mesh, &FeatureParams::default()).unwrap();
        assert_eq!(matrix.len(), 6);
        assert_eq!(matrix.faces(), mesh.faces.as_slice());
        for (row, v) in matrix.rows().iter().zip(&mesh.vertices) {
            assert!((row[0] - v.position.x).abs() < f64::EPSILON);
            // Convex and outward wound
            assert!(row[3] > 0.0);
        }
    }

    #[test]
    fn invalid_surface_is_reported() {
        let mut mesh = octahedron(1.0);
        mesh.faces.push([0, 1, 9]);
        assert!(matches!(
            extract_features(&mesh, &FeatureParams::default()),
            Err(features::FeatureError::FaceIndexOutOfBounds { .. })
        ));
    }
}

// =============================================================================
// TIER 4: Alignment
// =============================================================================

mod tier4_align {
    use super::*;

    #[test]
    fn transform_primitives() {
        let r = align::rot3(0.0, 0.0, 0.0);
        let p = types::Point3::new(1.0, 2.0, 3.0);
        assert_eq!(align::rot_trans(&p, &r, &nalgebra::Vector3::zeros()), p);
    }

    #[test]
    fn align_surface_moves_toward_the_model() {
        let mut mesh = octahedron(10.0);
        for v in &mut mesh.vertices {
            v.position.x += 4.0;
        }
        let result = align_surface(&mesh, &unit_model(), &AlignParams::default()).unwrap();
        assert!(result.final_score <= result.init_score);
        assert_eq!(result.mesh.faces, mesh.faces);

        let mean_x: f64 = result.mesh.vertices.iter().map(|v| v.position.x).sum::<f64>() / 6.0;
        assert!(mean_x.abs() < 0.1, "mean_x = {}", mean_x);
    }

    #[test]
    fn model_artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = unit_model();
        model.save(&path).unwrap();
        assert_eq!(ShapeModel::load(&path).unwrap(), model);
    }
}

// =============================================================================
// TIER 5: Files End to End
// =============================================================================

mod tier5_pipeline {
    use super::*;
    use mesh::pipeline::PipelineError;

    #[test]
    fn ply_in_stl_out() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.ply");
        let model_path = dir.path().join("model.json");
        let output = dir.path().join("aligned.stl");

        let mut scan = octahedron(10.0);
        for v in &mut scan.vertices {
            v.position.y -= 3.0;
        }
        save_mesh(&scan, &input).unwrap();
        unit_model().save(&model_path).unwrap();

        let result = align_scan(&input, &model_path, &output, &AlignParams::default()).unwrap();
        let written = load_mesh(&output).unwrap();
        assert_eq!(written.vertex_count(), result.mesh.vertex_count());
        assert_eq!(written.face_count(), 8);
        // Welding may reorder vertices; STL stores single precision
        for w in &written.vertices {
            let nearest = result
                .mesh
                .vertices
                .iter()
                .map(|r| (w.position - r.position).norm())
                .fold(f64::INFINITY, f64::min);
            assert!(nearest < 1e-4, "nearest = {}", nearest);
        }
    }

    #[test]
    fn missing_model_is_an_align_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.ply");
        save_mesh(&octahedron(1.0), &input).unwrap();

        let result = align_scan(
            &input,
            dir.path().join("absent.json"),
            dir.path().join("out.stl"),
            &AlignParams::default(),
        );
        assert!(matches!(
            result,
            Err(PipelineError::Align(align::AlignError::ModelLoad(_)))
        ));
    }

    #[test]
    fn missing_input_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        unit_model().save(&model_path).unwrap();

        let result = align_scan(
            dir.path().join("absent.ply"),
            &model_path,
            dir.path().join("out.stl"),
            &AlignParams::default(),
        );
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }
}
