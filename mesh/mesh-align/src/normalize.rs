//! Feature normalization against population statistics.

use nalgebra::Vector6;

use crate::{ModelLoadError, ModelResult};

/// Channels bounded with `tanh` after z-scoring: the three curvature scales.
pub const DEFAULT_TANH_CHANNELS: [usize; 3] = [3, 4, 5];

/// Per-channel means and standard deviations of the training population.
///
/// The spatial standard deviations are a population-wide scale rather than
/// per-axis spreads; shipped models use 50 mm on every spatial axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationStats {
    means: Vector6<f64>,
    stds: Vector6<f64>,
}

impl NormalizationStats {
    /// Creates statistics, checking that every std is positive and finite.
    ///
    /// # Errors
    ///
    /// Returns [`ModelLoadError::NonFinite`] for a non-finite mean and
    /// [`ModelLoadError::InvalidStds`] for a std that is not a positive
    /// finite number.
    pub fn new(means: Vector6<f64>, stds: Vector6<f64>) -> ModelResult<Self> {
        if means.iter().any(|m| !m.is_finite()) {
            return Err(ModelLoadError::NonFinite {
                field: "norm_means".to_string(),
            });
        }
        if let Some((channel, &value)) = stds
            .iter()
            .enumerate()
            .find(|(_, s)| !s.is_finite() || **s <= 0.0)
        {
            return Err(ModelLoadError::InvalidStds { channel, value });
        }
        Ok(Self { means, stds })
    }

    /// Statistics that leave every channel unchanged by the z-score.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            means: Vector6::zeros(),
            stds: Vector6::repeat(1.0),
        }
    }

    /// Channel means.
    #[must_use]
    pub const fn means(&self) -> &Vector6<f64> {
        &self.means
    }

    /// Channel standard deviations.
    #[must_use]
    pub const fn stds(&self) -> &Vector6<f64> {
        &self.stds
    }

    /// Z-scores every channel, then applies `tanh` to `tanh_channels`.
    ///
    /// Channel indices of 6 or more are ignored; callers validate them.
    #[must_use]
    pub fn squash(&self, row: &Vector6<f64>, tanh_channels: &[usize]) -> Vector6<f64> {
        let mut z = (row - self.means).component_div(&self.stds);
        for &c in tanh_channels.iter().filter(|&&c| c < 6) {
            z[c] = z[c].tanh();
        }
        z
    }

    /// Undoes the z-score on the spatial channels only.
    ///
    /// Curvature channels are returned as given; `tanh` is never inverted.
    #[must_use]
    pub fn unsquash_xyz(&self, row: &Vector6<f64>) -> Vector6<f64> {
        let mut out = *row;
        for c in 0..3 {
            out[c] = row[c] * self.stds[c] + self.means[c];
        }
        out
    }
}
