//! Full-covariance Gaussian mixture density over normalized feature rows.

use std::f64::consts::PI;

use nalgebra::{Matrix6, Vector6};
use rayon::prelude::*;

use crate::{ModelLoadError, ModelResult};

/// Rows per parallel work item. Partial results are reduced in chunk order,
/// so sums do not depend on the thread count.
pub(crate) const CHUNK_ROWS: usize = 1024;

/// Tolerance on `Σ weights = 1`.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// One mixture component with its precomputed log-normalizer.
#[derive(Debug, Clone, PartialEq)]
struct Component {
    weight: f64,
    log_weight: f64,
    mean: Vector6<f64>,
    /// Precision Cholesky factor `P`, precision = `P Pᵀ`.
    precision_chol: Matrix6<f64>,
    /// `Σ log diag(P)`.
    log_det_chol: f64,
}

/// Immutable Gaussian mixture density.
///
/// Each component is stored as a weight, a mean and the Cholesky factor `P`
/// of its precision matrix (`precision = P Pᵀ`), the way common fitting
/// libraries export full-covariance mixtures. `P` may be lower or upper
/// triangular.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    components: Vec<Component>,
}

impl GaussianMixture {
    /// Builds a mixture, validating every component.
    ///
    /// # Errors
    ///
    /// Returns an error if the mixture is empty, the argument lengths differ,
    /// a value is not finite, the weights are negative or do not sum to one,
    /// or a precision factor is not triangular with a positive diagonal.
    pub fn new(
        weights: &[f64],
        means: &[Vector6<f64>],
        precision_chol: &[Matrix6<f64>],
    ) -> ModelResult<Self> {
        if weights.is_empty() {
            return Err(ModelLoadError::EmptyMixture);
        }
        for (field, got) in [("means", means.len()), ("precision_cholesky", precision_chol.len())] {
            if got != weights.len() {
                return Err(ModelLoadError::DimensionMismatch {
                    field: field.to_string(),
                    expected: weights.len(),
                    got,
                });
            }
        }
        check_weights(weights)?;
        if means.iter().any(|m| m.iter().any(|v| !v.is_finite())) {
            return Err(ModelLoadError::NonFinite {
                field: "means".to_string(),
            });
        }

        let components = weights
            .iter()
            .zip(means)
            .zip(precision_chol)
            .enumerate()
            .map(|(k, ((&w, mean), p))| {
                check_precision_factor(k, p)?;
                Ok(Component {
                    weight: w,
                    log_weight: w.ln(),
                    mean: *mean,
                    precision_chol: *p,
                    log_det_chol: p.diagonal().iter().map(|d| d.ln()).sum(),
                })
            })
            .collect::<ModelResult<Vec<_>>>()?;

        Ok(Self { components })
    }

    /// Number of components.
    #[must_use]
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Component weights.
    pub fn weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.components.iter().map(|c| c.weight)
    }

    /// Component means.
    pub fn means(&self) -> impl Iterator<Item = &Vector6<f64>> + '_ {
        self.components.iter().map(|c| &c.mean)
    }

    /// Component precision Cholesky factors.
    pub fn precision_cholesky(&self) -> impl Iterator<Item = &Matrix6<f64>> + '_ {
        self.components.iter().map(|c| &c.precision_chol)
    }

    /// Log density of one row.
    #[must_use]
    pub fn log_prob(&self, x: &Vector6<f64>) -> f64 {
        let mut lse = LogSumExp::EMPTY;
        for c in &self.components {
            lse.push(c.log_weighted_prob(x).0);
        }
        lse.value()
    }

    /// Log density of one row and its gradient with respect to the row.
    ///
    /// The gradient is `−Σ_k r_k P_k y_k` with `y_k = P_kᵀ (x − μ_k)` and
    /// `r_k` the posterior responsibility of component `k`. It is zero when
    /// the density underflows to zero.
    #[must_use]
    pub fn log_prob_with_gradient(&self, x: &Vector6<f64>) -> (f64, Vector6<f64>) {
        let mut lse = LogSumExp::EMPTY;
        // Σ exp(a_k − max) P_k y_k, kept on the same scale as `lse`
        let mut weighted = Vector6::zeros();
        for c in &self.components {
            let (a, y) = c.log_weighted_prob(x);
            if let Some((rescale, w)) = lse.push(a) {
                weighted = weighted * rescale + c.precision_chol * y * w;
            }
        }

        let value = lse.value();
        if !value.is_finite() {
            return (value, Vector6::zeros());
        }
        (value, -weighted / lse.sum)
    }

    /// Per-row log density.
    #[must_use]
    pub fn score_samples(&self, rows: &[Vector6<f64>]) -> Vec<f64> {
        rows.par_iter().map(|x| self.log_prob(x)).collect()
    }

    /// Mean log density over rows; `NaN` for no rows.
    #[must_use]
    pub fn score(&self, rows: &[Vector6<f64>]) -> f64 {
        let partials: Vec<f64> = rows
            .par_chunks(CHUNK_ROWS)
            .map(|chunk| chunk.iter().map(|x| self.log_prob(x)).sum())
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let n = rows.len() as f64;
        partials.iter().sum::<f64>() / n
    }
}

impl Component {
    /// `log w + log N(x)` and the whitened residual `y = Pᵀ (x − μ)`.
    fn log_weighted_prob(&self, x: &Vector6<f64>) -> (f64, Vector6<f64>) {
        let y = self.precision_chol.tr_mul(&(x - self.mean));
        let log_prob = -0.5 * (6.0 * (2.0 * PI).ln() + y.norm_squared()) + self.log_det_chol;
        (self.log_weight + log_prob, y)
    }
}

/// Running `log Σ exp(a_k)` over terms seen one at a time.
///
/// `sum` holds `Σ exp(a_k − max)`. Terms that are `-inf` or `NaN` are
/// skipped.
#[derive(Debug, Clone, Copy)]
struct LogSumExp {
    max: f64,
    sum: f64,
}

impl LogSumExp {
    const EMPTY: Self = Self {
        max: f64::NEG_INFINITY,
        sum: 0.0,
    };

    /// Adds `exp(a)`.
    ///
    /// Returns the factor that rescales anything accumulated so far onto the
    /// new `max`, and the weight `exp(a − max)` of this term, or `None` if
    /// the term was skipped.
    fn push(&mut self, a: f64) -> Option<(f64, f64)> {
        if a.is_nan() || (a.is_infinite() && a.is_sign_negative()) {
            return None;
        }
        if a > self.max {
            let rescale = (self.max - a).exp();
            self.sum = self.sum * rescale + 1.0;
            self.max = a;
            Some((rescale, 1.0))
        } else {
            let w = (a - self.max).exp();
            self.sum += w;
            Some((1.0, w))
        }
    }

    fn value(&self) -> f64 {
        if self.max.is_finite() {
            self.max + self.sum.ln()
        } else {
            self.max
        }
    }
}

fn check_weights(weights: &[f64]) -> ModelResult<()> {
    if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(ModelLoadError::InvalidWeights(format!(
            "weight {w} is not a finite non-negative number"
        )));
    }
    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ModelLoadError::InvalidWeights(format!(
            "weights sum to {total}, expected 1"
        )));
    }
    Ok(())
}

fn check_precision_factor(component: usize, p: &Matrix6<f64>) -> ModelResult<()> {
    let invalid = |reason: &str| ModelLoadError::InvalidPrecision {
        component,
        reason: reason.to_string(),
    };
    if p.iter().any(|v| !v.is_finite()) {
        return Err(invalid("non-finite entry"));
    }
    if p.diagonal().iter().any(|d| *d <= 0.0) {
        return Err(invalid("diagonal must be positive"));
    }

    let scale = p.amax();
    let negligible = |v: f64| v.abs() <= 1e-12 * scale;
    let mut lower_zero = true;
    let mut upper_zero = true;
    for i in 0..6 {
        for j in 0..6 {
            if i > j && !negligible(p[(i, j)]) {
                lower_zero = false;
            }
            if i < j && !negligible(p[(i, j)]) {
                upper_zero = false;
            }
        }
    }
    if lower_zero || upper_zero {
        Ok(())
    } else {
        Err(invalid("factor is not triangular"))
    }
}
