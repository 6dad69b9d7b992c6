//! Benchmarks for the alignment objective and the full optimizer.
//!
//! Run with: cargo bench -p mesh-align
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p mesh-align -- --save-baseline main
//! 2. After changes: cargo bench -p mesh-align -- --baseline main

#![allow(missing_docs, clippy::unwrap_used, clippy::cast_precision_loss)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mesh_align::{
    AlignParams, AlignmentObjective, DifferentiableFunction, GaussianMixture, NormalizationStats,
    RigidParams, ShapeModel, align_features,
};
use mesh_features::FeatureMatrix;
use nalgebra::{Matrix6, Vector6};

// =============================================================================
// Synthetic Inputs
// =============================================================================

/// Mixture with `k` components spread along a helix.
fn helix_mixture(k: usize) -> GaussianMixture {
    let weights = vec![1.0 / k as f64; k];
    let means: Vec<Vector6<f64>> = (0..k)
        .map(|i| {
            let t = i as f64 * 0.4;
            Vector6::new(t.cos(), t.sin(), 0.1 * t, 0.0, 0.1, -0.1)
        })
        .collect();
    let factor = Matrix6::from_diagonal(&Vector6::new(3.0, 3.0, 3.0, 1.0, 1.0, 1.0));
    GaussianMixture::new(&weights, &means, &vec![factor; k]).unwrap()
}

/// Deterministic pseudo-surface rows near the helix.
fn rows(n: usize) -> Vec<Vector6<f64>> {
    (0..n)
        .map(|i| {
            let t = i as f64 * 0.001;
            Vector6::new(t.cos() * 1.1, t.sin() * 0.9, 0.05 * t, (3.0 * t).sin() * 0.2, 0.1, 0.0)
        })
        .collect()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_objective(c: &mut Criterion) {
    let mixture = helix_mixture(64);
    let params = RigidParams::new(0.05, -0.02, 0.1, nalgebra::Vector3::new(0.1, 0.0, -0.1));
    let x = params.to_vector();

    let mut group = c.benchmark_group("Objective");
    for n in [1_000, 10_000, 50_000] {
        let rows = rows(n);
        let objective = AlignmentObjective::new(&mixture, &rows);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("score", n), &n, |b, _| {
            b.iter(|| objective.score(black_box(&params)));
        });
        group.bench_with_input(BenchmarkId::new("value_and_gradient", n), &n, |b, _| {
            b.iter(|| objective.value_and_gradient(black_box(&x)));
        });
    }
    group.finish();
}

fn bench_alignment(c: &mut Criterion) {
    let model = ShapeModel::new(NormalizationStats::identity(), helix_mixture(16));
    let features = FeatureMatrix::from_parts(rows(5_000), Vec::new());
    let params = AlignParams::default();

    let mut group = c.benchmark_group("Alignment");
    group.sample_size(10);
    group.bench_function("align_features_5k", |b| {
        b.iter(|| align_features(black_box(&features), &model, &params).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_objective, bench_alignment);
criterion_main!(benches);
