//! Implicit Laplacian smoothing of per-vertex scalar fields.
//!
//! One pass at scale `s` solves
//!
//! ```text
//! (D + s (V − W)) x_next = D x
//! ```
//!
//! on the vertices with non-zero lumped area. Vertices without area are
//! decoupled from the rest of the surface and come out as zero. The system
//! is symmetric; it is solved with Jacobi-preconditioned conjugate gradient,
//! warm-started from the previous pass.

use nalgebra_sparse::{CooMatrix, CsrMatrix};
use tracing::debug;

use crate::CotangentLaplacian;

/// Stopping rule for the conjugate gradient solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    /// Stop when `‖r‖ ≤ tolerance · ‖b‖`.
    pub tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
}

/// How the solves of one [`ImplicitSmoother::smooth_with_report`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SmoothingReport {
    /// Passes whose solve stopped at the iteration cap above tolerance.
    pub unconverged_passes: u32,
    /// Largest final relative residual over all passes.
    pub worst_residual: f64,
}

impl SmoothingReport {
    /// Whether every pass reached the tolerance.
    #[must_use]
    pub const fn converged(&self) -> bool {
        self.unconverged_passes == 0
    }
}

/// The smoothing system for one scale, restricted to vertices with area.
#[derive(Debug, Clone)]
pub struct ImplicitSmoother {
    scale: f64,
    vertex_count: usize,
    /// Original index of each retained vertex.
    retained: Vec<usize>,
    /// `D + s (V − W)` over retained vertices.
    system: CsrMatrix<f64>,
    /// `D` over retained vertices.
    mass: Vec<f64>,
    /// Inverse diagonal of `system`, used as preconditioner.
    inv_diagonal: Vec<f64>,
}

impl ImplicitSmoother {
    /// Assembles the smoothing system at `scale`.
    #[must_use]
    pub fn new(laplacian: &CotangentLaplacian, scale: f64) -> Self {
        let n = laplacian.vertex_count();
        let areas = laplacian.areas();

        let mut compact = vec![usize::MAX; n];
        let mut retained = Vec::with_capacity(n);
        for (i, &a) in areas.iter().enumerate() {
            if a != 0.0 {
                compact[i] = retained.len();
                retained.push(i);
            }
        }

        let m = retained.len();
        let mut coo = CooMatrix::new(m, m);
        let mut diagonal = vec![0.0; m];
        for (ci, &i) in retained.iter().enumerate() {
            diagonal[ci] = areas[i] + scale * laplacian.degree()[i];
            coo.push(ci, ci, diagonal[ci]);

            let row = laplacian.weights().row(i);
            for (&j, &w) in row.col_indices().iter().zip(row.values()) {
                if compact[j] != usize::MAX {
                    coo.push(ci, compact[j], -scale * w);
                }
            }
        }

        let inv_diagonal = diagonal
            .iter()
            .map(|&d| if d > 0.0 { 1.0 / d } else { 1.0 })
            .collect();
        let mass = retained.iter().map(|&i| areas[i]).collect();

        Self {
            scale,
            vertex_count: n,
            retained,
            system: CsrMatrix::from(&coo),
            mass,
            inv_diagonal,
        }
    }

    /// Smoothing scale this system was built for.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Runs `iterations` smoothing passes over `values`.
    ///
    /// A scale of zero returns `values` unchanged. Otherwise vertices without
    /// lumped area are zero in the output, and zero passes return `values`
    /// with those vertices zeroed.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not have one entry per vertex.
    #[must_use]
    pub fn smooth(&self, values: &[f64], iterations: u32, settings: SolverSettings) -> Vec<f64> {
        self.smooth_with_report(values, iterations, settings).0
    }

    /// Like [`smooth`](Self::smooth), also reporting passes whose solve hit
    /// the iteration cap before reaching the tolerance.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not have one entry per vertex.
    #[must_use]
    pub fn smooth_with_report(
        &self,
        values: &[f64],
        iterations: u32,
        settings: SolverSettings,
    ) -> (Vec<f64>, SmoothingReport) {
        assert_eq!(values.len(), self.vertex_count, "one value per vertex");
        let mut report = SmoothingReport::default();
        if self.scale == 0.0 {
            return (values.to_vec(), report);
        }

        let mut x: Vec<f64> = self.retained.iter().map(|&i| values[i]).collect();
        for pass in 0..iterations {
            let rhs: Vec<f64> = self.mass.iter().zip(&x).map(|(d, v)| d * v).collect();
            let outcome = self.conjugate_gradient(&rhs, &mut x, settings);
            debug!(
                scale = self.scale,
                pass,
                iterations = outcome.iterations,
                relative_residual = outcome.relative_residual,
                "Smoothing solve"
            );
            report.worst_residual = report.worst_residual.max(outcome.relative_residual);
            if outcome.relative_residual.is_nan() || outcome.relative_residual > settings.tolerance {
                report.unconverged_passes += 1;
            }
        }

        let mut out = vec![0.0; self.vertex_count];
        for (&i, v) in self.retained.iter().zip(x) {
            out[i] = v;
        }
        (out, report)
    }

    fn multiply(&self, x: &[f64]) -> Vec<f64> {
        self.system
            .row_iter()
            .map(|row| {
                row.col_indices()
                    .iter()
                    .zip(row.values())
                    .map(|(&j, &a)| a * x[j])
                    .sum()
            })
            .collect()
    }

    /// Preconditioned CG for `system · x = rhs`, starting from `x`.
    fn conjugate_gradient(&self, rhs: &[f64], x: &mut [f64], settings: SolverSettings) -> CgOutcome {
        let rhs_norm = norm(rhs);
        if rhs_norm == 0.0 {
            x.fill(0.0);
            return CgOutcome {
                iterations: 0,
                relative_residual: 0.0,
            };
        }

        let ax = self.multiply(x);
        let mut r: Vec<f64> = rhs.iter().zip(&ax).map(|(b, a)| b - a).collect();
        let mut z: Vec<f64> = r.iter().zip(&self.inv_diagonal).map(|(r, m)| r * m).collect();
        let mut p = z.clone();
        let mut rz = dot(&r, &z);

        let mut iterations = 0;
        while iterations < settings.max_iterations {
            if norm(&r) <= settings.tolerance * rhs_norm {
                break;
            }
            let ap = self.multiply(&p);
            let pap = dot(&p, &ap);
            if !(pap.is_finite() && pap > 0.0) {
                // Direction of non-positive curvature; keep the current iterate
                break;
            }
            let alpha = rz / pap;
            for ((xi, pi), (ri, api)) in x.iter_mut().zip(&p).zip(r.iter_mut().zip(&ap)) {
                *xi += alpha * pi;
                *ri -= alpha * api;
            }
            for ((zi, ri), m) in z.iter_mut().zip(&r).zip(&self.inv_diagonal) {
                *zi = ri * m;
            }
            let rz_next = dot(&r, &z);
            let beta = rz_next / rz;
            rz = rz_next;
            for (pi, zi) in p.iter_mut().zip(&z) {
                *pi = zi + beta * *pi;
            }
            iterations += 1;
        }

        CgOutcome {
            iterations,
            relative_residual: norm(&r) / rhs_norm,
        }
    }
}

struct CgOutcome {
    iterations: usize,
    relative_residual: f64,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
