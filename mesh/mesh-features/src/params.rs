//! Parameters for feature extraction.

use serde::{Deserialize, Serialize};

use crate::{FeatureError, FeatureResult};

/// Number of smoothed curvature channels in a feature row.
pub const CURVATURE_CHANNELS: usize = 3;

/// Parameters for [`extract_features`](crate::extract_features).
///
/// # Example
///
/// ```
/// use mesh_features::FeatureParams;
///
/// let params = FeatureParams::default()
///     .with_smoothing_iterations(2)
///     .with_solver_tolerance(1e-10);
/// assert_eq!(params.smoothing_scales, vec![5.0, 20.0, 200.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Smoothing scale for each curvature channel (default: `[5, 20, 200]`).
    /// Exactly three non-negative scales; `0` leaves the channel unsmoothed.
    pub smoothing_scales: Vec<f64>,
    /// Implicit smoothing passes per scale (default: 3).
    pub smoothing_iterations: u32,
    /// Relative residual at which a smoothing solve stops (default: 1e-8).
    pub solver_tolerance: f64,
    /// Iteration cap for each smoothing solve (default: 1000).
    pub solver_max_iterations: usize,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            smoothing_scales: vec![5.0, 20.0, 200.0],
            smoothing_iterations: 3,
            solver_tolerance: 1e-8,
            solver_max_iterations: 1000,
        }
    }
}

impl FeatureParams {
    /// Creates new feature parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the three smoothing scales.
    #[must_use]
    pub fn with_smoothing_scales(mut self, scales: [f64; CURVATURE_CHANNELS]) -> Self {
        self.smoothing_scales = scales.to_vec();
        self
    }

    /// Sets the number of smoothing passes per scale.
    #[must_use]
    pub const fn with_smoothing_iterations(mut self, iterations: u32) -> Self {
        self.smoothing_iterations = iterations;
        self
    }

    /// Sets the relative residual tolerance of the smoothing solver.
    #[must_use]
    pub const fn with_solver_tolerance(mut self, tolerance: f64) -> Self {
        self.solver_tolerance = tolerance;
        self
    }

    /// Sets the iteration cap of the smoothing solver.
    #[must_use]
    pub const fn with_solver_max_iterations(mut self, max_iterations: usize) -> Self {
        self.solver_max_iterations = max_iterations;
        self
    }

    /// Checks that the parameters describe a usable configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::InvalidParameter`] if there are not exactly
    /// three scales, a scale is negative or non-finite, or the solver
    /// tolerance is not positive.
    pub fn validate(&self) -> FeatureResult<()> {
        if self.smoothing_scales.len() != CURVATURE_CHANNELS {
            return Err(FeatureError::InvalidParameter(format!(
                "expected {CURVATURE_CHANNELS} smoothing scales, got {}",
                self.smoothing_scales.len()
            )));
        }
        if let Some(s) = self
            .smoothing_scales
            .iter()
            .find(|s| !s.is_finite() || **s < 0.0)
        {
            return Err(FeatureError::InvalidParameter(format!(
                "smoothing scale must be finite and non-negative, got {s}"
            )));
        }
        if !self.solver_tolerance.is_finite() || self.solver_tolerance <= 0.0 {
            return Err(FeatureError::InvalidParameter(format!(
                "solver tolerance must be positive, got {}",
                self.solver_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(FeatureParams::default().validate().is_ok());
    }

    #[test]
    fn wrong_scale_count_is_rejected() {
        let mut params = FeatureParams::default();
        params.smoothing_scales.push(1000.0);
        assert!(matches!(
            params.validate(),
            Err(FeatureError::InvalidParameter(_))
        ));
    }

    #[test]
    fn negative_scale_is_rejected() {
        let params = FeatureParams::default().with_smoothing_scales([5.0, -1.0, 200.0]);
        assert!(params.validate().is_err());
    }

    #[test]
    fn nan_tolerance_is_rejected() {
        let params = FeatureParams::default().with_solver_tolerance(f64::NAN);
        assert!(params.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let params: FeatureParams =
            serde_json::from_str(r#"{"smoothing_iterations": 1}"#).unwrap();
        assert_eq!(params.smoothing_iterations, 1);
        assert_eq!(params.solver_max_iterations, 1000);
    }
}
