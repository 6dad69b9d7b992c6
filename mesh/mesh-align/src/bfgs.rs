//! BFGS quasi-Newton minimizer with a strong-Wolfe line search.
//!
//! The inverse Hessian starts at the identity and receives the standard
//! rank-two update after every accepted step. The first trial step of each
//! line search follows the previous decrease in the objective, so early
//! iterations do not overshoot when the gradient is large.
//!
//! The line search brackets a step satisfying
//!
//! 1. sufficient decrease: `f(x + αd) ≤ f(x) + c₁ α ∇f(x)ᵀd`
//! 2. curvature: `|∇f(x + αd)ᵀd| ≤ c₂ |∇f(x)ᵀd|`
//!
//! and then shrinks the bracket with safeguarded cubic interpolation.

use std::time::{Duration, Instant};

use nalgebra::{Matrix6, Vector6};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::DifferentiableFunction;

/// Configuration for the strong-Wolfe line search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchParams {
    /// Sufficient decrease parameter c₁ (default: 1e-4).
    pub c1: f64,
    /// Curvature condition parameter c₂ (default: 0.9).
    pub c2: f64,
    /// Maximum trial steps per line search (default: 30).
    pub max_iterations: usize,
    /// Bracket width below which the search gives up (default: 1e-12).
    pub step_min: f64,
    /// Largest step considered (default: 1e10).
    pub step_max: f64,
}

impl Default for LineSearchParams {
    fn default() -> Self {
        Self {
            c1: 1e-4,
            c2: 0.9,
            max_iterations: 30,
            step_min: 1e-12,
            step_max: 1e10,
        }
    }
}

/// Configuration for [`minimize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerParams {
    /// Stop when the largest gradient component is at most this (default: 1e-5).
    pub gradient_tolerance: f64,
    /// Iteration cap (default: 1200, i.e. 200 per parameter).
    pub max_iterations: usize,
    /// Wall-clock cap; `None` means unlimited (default: `None`).
    pub max_duration: Option<Duration>,
    /// Line search configuration.
    pub line_search: LineSearchParams,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            gradient_tolerance: 1e-5,
            max_iterations: 1200,
            max_duration: None,
            line_search: LineSearchParams::default(),
        }
    }
}

impl OptimizerParams {
    /// Creates new optimizer parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gradient tolerance.
    #[must_use]
    pub const fn with_gradient_tolerance(mut self, tolerance: f64) -> Self {
        self.gradient_tolerance = tolerance;
        self
    }

    /// Sets the iteration cap.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the wall-clock cap.
    #[must_use]
    pub const fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Sets the line search configuration.
    #[must_use]
    pub fn with_line_search(mut self, line_search: LineSearchParams) -> Self {
        self.line_search = line_search;
        self
    }
}

/// Why the optimizer stopped. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    /// Gradient below tolerance.
    Converged,
    /// Reached the iteration cap.
    MaxIterations,
    /// Reached the wall-clock cap.
    TimeLimit,
    /// No step satisfying the Wolfe conditions was found; typically the
    /// iterate is already at the precision limit of the objective.
    LineSearchFailed,
    /// The objective or gradient at the starting point is not finite.
    NonFiniteStart,
}

impl ConvergenceStatus {
    /// Check if the optimization converged successfully.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Summary of a [`minimize`] run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerReport {
    /// Stop reason.
    pub status: ConvergenceStatus,
    /// Completed iterations (accepted steps).
    pub iterations: usize,
    /// Objective and gradient evaluations, including the initial one.
    pub evaluations: usize,
    /// Largest absolute gradient component at the returned point.
    pub gradient_norm: f64,
}

/// Result of [`minimize`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    /// Best parameters found.
    pub x: Vector6<f64>,
    /// Objective value at `x`.
    pub value: f64,
    /// Run summary.
    pub report: OptimizerReport,
}

/// One evaluated trial step.
#[derive(Debug, Clone, Copy)]
struct Trial {
    alpha: f64,
    value: f64,
    slope: f64,
    gradient: Vector6<f64>,
}

/// Minimizes `f` from `x0` with BFGS.
///
/// The returned point is always the last accepted iterate, whose value is
/// never above `f(x0)`.
///
/// # Example
///
/// ```
/// use mesh_align::{minimize, OptimizerParams};
/// use nalgebra::Vector6;
///
/// let target = Vector6::new(1.0, -2.0, 0.5, 0.0, 3.0, -1.0);
/// let f = |x: &Vector6<f64>| {
///     let d = x - target;
///     (d.norm_squared(), 2.0 * d)
/// };
/// let min = minimize(&f, Vector6::zeros(), &OptimizerParams::default());
/// assert!(min.report.status.is_converged());
/// assert!((min.x - target).norm() < 1e-6);
/// ```
pub fn minimize<F>(f: &F, x0: Vector6<f64>, params: &OptimizerParams) -> Minimum
where
    F: DifferentiableFunction + ?Sized,
{
    let start = Instant::now();
    let mut evaluations = 1;
    let (mut value, mut gradient) = f.value_and_gradient(&x0);
    let mut x = x0;

    let finish = |x, value, gradient: Vector6<f64>, status, iterations, evaluations| Minimum {
        x,
        value,
        report: OptimizerReport {
            status,
            iterations,
            evaluations,
            gradient_norm: gradient.amax(),
        },
    };

    if !value.is_finite() || gradient.iter().any(|g| !g.is_finite()) {
        return finish(x, value, gradient, ConvergenceStatus::NonFiniteStart, 0, evaluations);
    }

    let mut inv_hessian = Matrix6::<f64>::identity();
    let mut previous_value = value + gradient.norm() / 2.0;
    let mut iterations = 0;

    let status = loop {
        if gradient.amax() <= params.gradient_tolerance {
            break ConvergenceStatus::Converged;
        }
        if iterations >= params.max_iterations {
            break ConvergenceStatus::MaxIterations;
        }
        if params.max_duration.is_some_and(|limit| start.elapsed() >= limit) {
            break ConvergenceStatus::TimeLimit;
        }

        let mut direction = -(inv_hessian * gradient);
        let mut slope = gradient.dot(&direction);
        if slope.is_nan() || slope >= 0.0 {
            // Lost positive definiteness; restart from steepest descent
            inv_hessian = Matrix6::identity();
            direction = -gradient;
            slope = -gradient.norm_squared();
        }

        let initial_step = {
            let guess = 1.01 * 2.0 * (value - previous_value) / slope;
            if guess.is_finite() && guess > 0.0 { guess.min(1.0) } else { 1.0 }
        };

        let Some((trial, used)) = line_search(f, &x, &direction, value, slope, initial_step, &params.line_search)
        else {
            break ConvergenceStatus::LineSearchFailed;
        };
        evaluations += used;

        let step = direction * trial.alpha;
        let gradient_change = trial.gradient - gradient;
        x += step;
        previous_value = value;
        value = trial.value;
        gradient = trial.gradient;
        iterations += 1;

        debug!(
            iteration = iterations,
            value,
            gradient_norm = gradient.amax(),
            step = trial.alpha,
            "BFGS step"
        );

        let curvature = gradient_change.dot(&step);
        let rho = if curvature == 0.0 { 1000.0 } else { 1.0 / curvature };
        let identity = Matrix6::<f64>::identity();
        let left = identity - step * gradient_change.transpose() * rho;
        let right = identity - gradient_change * step.transpose() * rho;
        inv_hessian = left * inv_hessian * right + step * step.transpose() * rho;
    };

    finish(x, value, gradient, status, iterations, evaluations)
}

/// Strong-Wolfe line search along `direction` from `x`.
///
/// Returns the accepted trial and the number of evaluations it took, or
/// `None` if no acceptable step was found.
fn line_search<F>(
    f: &F,
    x: &Vector6<f64>,
    direction: &Vector6<f64>,
    value0: f64,
    slope0: f64,
    initial_step: f64,
    params: &LineSearchParams,
) -> Option<(Trial, usize)>
where
    F: DifferentiableFunction + ?Sized,
{
    let mut evaluations = 0;
    let mut evaluate = |alpha: f64| {
        evaluations += 1;
        let (value, gradient) = f.value_and_gradient(&(x + direction * alpha));
        let slope = gradient.dot(direction);
        if value.is_finite() && slope.is_finite() {
            Trial { alpha, value, slope, gradient }
        } else {
            Trial { alpha, value: f64::INFINITY, slope: f64::NAN, gradient }
        }
    };
    let sufficient = |t: &Trial| t.value <= value0 + params.c1 * t.alpha * slope0;
    let curvature_ok = |t: &Trial| t.slope.abs() <= -params.c2 * slope0;

    let origin = Trial {
        alpha: 0.0,
        value: value0,
        slope: slope0,
        gradient: Vector6::zeros(),
    };
    let mut previous = origin;
    let mut alpha = initial_step.clamp(params.step_min, params.step_max);

    for i in 0..params.max_iterations {
        let trial = evaluate(alpha);

        let bracket = if !sufficient(&trial) || (i > 0 && trial.value >= previous.value) {
            Some((previous, trial))
        } else if curvature_ok(&trial) {
            return Some((trial, evaluations));
        } else if trial.slope >= 0.0 {
            Some((trial, previous))
        } else {
            None
        };

        if let Some((lo, hi)) = bracket {
            return zoom(lo, hi, &mut evaluate, &sufficient, &curvature_ok, params)
                .map(|t| (t, evaluations));
        }

        if alpha >= params.step_max {
            return None;
        }
        previous = trial;
        alpha = (2.0 * alpha).min(params.step_max);
    }
    None
}

/// Shrinks a bracket `[lo, hi]` known to contain an acceptable step.
///
/// `lo` always satisfies sufficient decrease and has the lowest value seen.
fn zoom(
    mut lo: Trial,
    mut hi: Trial,
    evaluate: &mut impl FnMut(f64) -> Trial,
    sufficient: &impl Fn(&Trial) -> bool,
    curvature_ok: &impl Fn(&Trial) -> bool,
    params: &LineSearchParams,
) -> Option<Trial> {
    for _ in 0..params.max_iterations {
        if (hi.alpha - lo.alpha).abs() < params.step_min {
            return None;
        }

        let alpha = cubic_step(&lo, &hi);
        let trial = evaluate(alpha);

        if !sufficient(&trial) || trial.value >= lo.value {
            hi = trial;
        } else {
            if curvature_ok(&trial) {
                return Some(trial);
            }
            if trial.slope * (hi.alpha - lo.alpha) >= 0.0 {
                hi = lo;
            }
            lo = trial;
        }
    }
    None
}

/// Minimizer of the cubic through both ends, kept away from the ends;
/// bisection when the cubic is unusable.
fn cubic_step(lo: &Trial, hi: &Trial) -> f64 {
    let (a, b) = (lo.alpha, hi.alpha);
    let width = b - a;
    let d1 = lo.slope + hi.slope - 3.0 * (lo.value - hi.value) / (a - b);
    let disc = d1 * d1 - lo.slope * hi.slope;
    let midpoint = a + 0.5 * width;
    if !(disc.is_finite() && disc >= 0.0) {
        return midpoint;
    }
    let d2 = width.signum() * disc.sqrt();
    let candidate = b - width * (hi.slope + d2 - d1) / (hi.slope - lo.slope + 2.0 * d2);

    let (left, right) = (a.min(b), a.max(b));
    let margin = 0.1 * width.abs();
    if candidate.is_finite() && candidate > left + margin && candidate < right - margin {
        candidate
    } else {
        midpoint
    }
}
