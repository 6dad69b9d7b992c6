//! Negative mean log-likelihood of transformed features and its gradient.

use nalgebra::{Matrix3, Vector3, Vector6};
use rayon::prelude::*;

use crate::mixture::CHUNK_ROWS;
use crate::{GaussianMixture, RigidParams, rot3_derivatives};

/// A function of the six transform parameters with an analytic gradient.
pub trait DifferentiableFunction {
    /// Value and gradient at `x`.
    fn value_and_gradient(&self, x: &Vector6<f64>) -> (f64, Vector6<f64>);
}

impl<F> DifferentiableFunction for F
where
    F: Fn(&Vector6<f64>) -> (f64, Vector6<f64>),
{
    fn value_and_gradient(&self, x: &Vector6<f64>) -> (f64, Vector6<f64>) {
        self(x)
    }
}

/// Alignment objective over fixed, already normalized feature rows.
///
/// `score(params) = −mean_n log p(T_params(row_n))`, where `T` rotates and
/// translates the spatial channels only.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentObjective<'a> {
    mixture: &'a GaussianMixture,
    rows: &'a [Vector6<f64>],
}

/// Per-chunk sums reduced into the score and gradient.
#[derive(Debug, Clone, Copy)]
struct Partial {
    log_density: f64,
    /// `Σ g_n` over the spatial channels.
    spatial_gradient: Vector3<f64>,
    /// `Σ x_n g_nᵀ`, original spatial coordinates against spatial gradient.
    scatter: Matrix3<f64>,
}

impl Partial {
    fn zero() -> Self {
        Self {
            log_density: 0.0,
            spatial_gradient: Vector3::zeros(),
            scatter: Matrix3::zeros(),
        }
    }
}

impl<'a> AlignmentObjective<'a> {
    /// Creates the objective for `rows` under `mixture`.
    #[must_use]
    pub const fn new(mixture: &'a GaussianMixture, rows: &'a [Vector6<f64>]) -> Self {
        Self { mixture, rows }
    }

    /// Number of feature rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Score at `params`.
    #[must_use]
    pub fn score(&self, params: &RigidParams) -> f64 {
        let block = params.block_transform();
        let partials: Vec<f64> = self
            .rows
            .par_chunks(CHUNK_ROWS)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|row| self.mixture.log_prob(&block.apply(row)))
                    .sum()
            })
            .collect();
        -partials.iter().sum::<f64>() / self.count()
    }

    /// Score and gradient with respect to `[φ, θ, ψ, tx, ty, tz]`.
    #[must_use]
    pub fn score_and_gradient(&self, params: &RigidParams) -> (f64, Vector6<f64>) {
        let block = params.block_transform();
        let partials: Vec<Partial> = self
            .rows
            .par_chunks(CHUNK_ROWS)
            .map(|chunk| {
                chunk.iter().fold(Partial::zero(), |mut acc, row| {
                    let (lp, g) = self.mixture.log_prob_with_gradient(&block.apply(row));
                    let g_spatial = g.fixed_rows::<3>(0).into_owned();
                    acc.log_density += lp;
                    acc.spatial_gradient += g_spatial;
                    acc.scatter += row.fixed_rows::<3>(0) * g_spatial.transpose();
                    acc
                })
            })
            .collect();

        let total = partials.iter().fold(Partial::zero(), |mut acc, p| {
            acc.log_density += p.log_density;
            acc.spatial_gradient += p.spatial_gradient;
            acc.scatter += p.scatter;
            acc
        });

        let n = self.count();
        let derivatives = rot3_derivatives(params.angles.x, params.angles.y, params.angles.z);
        let mut gradient = Vector6::zeros();
        for (i, d) in derivatives.iter().enumerate() {
            // d/dangle of Σ log p(Rᵀx + t) = Σ xᵀ (dR) g = sum(dR ∘ S)
            gradient[i] = -d.component_mul(&total.scatter).sum() / n;
        }
        for i in 0..3 {
            gradient[3 + i] = -total.spatial_gradient[i] / n;
        }

        (-total.log_density / n, gradient)
    }

    #[allow(clippy::cast_precision_loss)]
    fn count(&self) -> f64 {
        self.rows.len() as f64
    }
}

impl DifferentiableFunction for AlignmentObjective<'_> {
    fn value_and_gradient(&self, x: &Vector6<f64>) -> (f64, Vector6<f64>) {
        self.score_and_gradient(&RigidParams::from_vector(x))
    }
}
