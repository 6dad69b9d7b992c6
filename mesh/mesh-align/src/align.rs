//! Alignment driver: features in, aligned surface out.

use mesh_features::{
    CURVATURE_CHANNELS, FeatureError, FeatureMatrix, FeatureParams, extract_features,
    repair_non_finite,
};
use mesh_types::{IndexedMesh, Point3, Vertex};
use nalgebra::Vector6;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::normalize::DEFAULT_TANH_CHANNELS;
use crate::{
    AlignError, AlignResult, AlignmentObjective, OptimizerParams, OptimizerReport, RigidParams,
    ShapeModel, minimize,
};

/// Configuration for [`align_surface`] and [`align_features`].
///
/// # Example
///
/// ```
/// use mesh_align::{AlignParams, OptimizerParams};
///
/// let params = AlignParams::new()
///     .with_misalignment_threshold(5.0)
///     .with_optimizer(OptimizerParams::new().with_max_iterations(200));
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignParams {
    /// Feature extraction settings.
    pub features: FeatureParams,

    /// BFGS settings.
    pub optimizer: OptimizerParams,

    /// Initial score above which the surface is flagged as probably
    /// misaligned before optimization (default: 6.0).
    pub misalignment_threshold: f64,

    /// Feature channels bounded with `tanh` after z-scoring
    /// (default: `[3, 4, 5]`). Only curvature channels may be listed.
    pub tanh_channels: Vec<usize>,

    /// Starting transform for the optimizer (default: identity).
    pub initial_params: RigidParams,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            features: FeatureParams::default(),
            optimizer: OptimizerParams::default(),
            misalignment_threshold: 6.0,
            tanh_channels: DEFAULT_TANH_CHANNELS.to_vec(),
            initial_params: RigidParams::zero(),
        }
    }
}

impl AlignParams {
    /// Creates new alignment parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the feature extraction settings.
    #[must_use]
    pub fn with_features(mut self, features: FeatureParams) -> Self {
        self.features = features;
        self
    }

    /// Sets the optimizer settings.
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: OptimizerParams) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the misalignment threshold.
    #[must_use]
    pub const fn with_misalignment_threshold(mut self, threshold: f64) -> Self {
        self.misalignment_threshold = threshold;
        self
    }

    /// Sets the channels bounded with `tanh`.
    #[must_use]
    pub fn with_tanh_channels(mut self, channels: Vec<usize>) -> Self {
        self.tanh_channels = channels;
        self
    }

    /// Sets the starting transform.
    #[must_use]
    pub const fn with_initial_params(mut self, initial: RigidParams) -> Self {
        self.initial_params = initial;
        self
    }

    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns [`AlignError::InvalidSurface`] for bad feature settings and
    /// [`AlignError::InvalidParameter`] for anything else out of range.
    pub fn validate(&self) -> AlignResult<()> {
        self.features.validate()?;

        if self.misalignment_threshold.is_nan() {
            return Err(AlignError::InvalidParameter(
                "misalignment_threshold must not be NaN".to_string(),
            ));
        }
        if let Some(&c) = self.tanh_channels.iter().find(|&&c| !(3..6).contains(&c)) {
            return Err(AlignError::InvalidParameter(format!(
                "tanh channel {c} is not a curvature channel (3..=5)"
            )));
        }
        if !self.initial_params.is_finite() {
            return Err(AlignError::InvalidParameter(
                "initial_params must be finite".to_string(),
            ));
        }

        let opt = &self.optimizer;
        if !opt.gradient_tolerance.is_finite() || opt.gradient_tolerance < 0.0 {
            return Err(AlignError::InvalidParameter(format!(
                "gradient_tolerance must be a non-negative number, got {}",
                opt.gradient_tolerance
            )));
        }
        let ls = &opt.line_search;
        if !(ls.c1 > 0.0 && ls.c1 < ls.c2 && ls.c2 < 1.0) {
            return Err(AlignError::InvalidParameter(format!(
                "line search needs 0 < c1 < c2 < 1, got c1 = {}, c2 = {}",
                ls.c1, ls.c2
            )));
        }
        if ls.max_iterations == 0 {
            return Err(AlignError::InvalidParameter(
                "line search max_iterations must be at least 1".to_string(),
            ));
        }
        if !(ls.step_min > 0.0 && ls.step_min < ls.step_max) {
            return Err(AlignError::InvalidParameter(format!(
                "line search needs 0 < step_min < step_max, got {} and {}",
                ls.step_min, ls.step_max
            )));
        }
        Ok(())
    }
}

/// Result of an alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// The input surface moved into the model frame, with the original faces.
    pub mesh: IndexedMesh,

    /// Optimal transform, in normalized feature units.
    pub params: RigidParams,

    /// Score of the untransformed surface.
    pub init_score: f64,

    /// Score at `params`.
    pub final_score: f64,

    /// Whether `init_score` exceeded the misalignment threshold (or was NaN).
    ///
    /// This is advisory: the surface was optimized regardless.
    pub misaligned: bool,

    /// How the optimizer stopped.
    pub report: OptimizerReport,
}

/// Aligns a surface to a shape model.
///
/// Extracts features from `mesh` and hands them to [`align_features`].
///
/// # Errors
///
/// Returns [`AlignError::InvalidSurface`] if the surface is empty, has a
/// non-finite coordinate or an out-of-range face index, and
/// [`AlignError::InvalidParameter`] if `params` fails validation. A poor fit
/// is never an error.
pub fn align_surface(
    mesh: &IndexedMesh,
    model: &ShapeModel,
    params: &AlignParams,
) -> AlignResult<Alignment> {
    params.validate()?;
    let features = extract_features(mesh, &params.features)?;
    align_features(&features, model, params)
}

/// Aligns precomputed features to a shape model.
///
/// The spatial channels of the output are the aligned vertex positions in
/// the original units.
///
/// # Errors
///
/// Returns [`AlignError::InvalidSurface`] if there are no rows or a spatial
/// channel is not finite, and [`AlignError::InvalidParameter`] if `params`
/// fails validation. Non-finite curvature channels are set to zero, as
/// [`extract_features`] does.
pub fn align_features(
    features: &FeatureMatrix,
    model: &ShapeModel,
    params: &AlignParams,
) -> AlignResult<Alignment> {
    params.validate()?;
    if features.is_empty() {
        return Err(FeatureError::EmptySurface.into());
    }
    if let Some(index) = features
        .rows()
        .iter()
        .position(|r| r.fixed_rows::<3>(0).iter().any(|v| !v.is_finite()))
    {
        return Err(FeatureError::NonFiniteVertex { index }.into());
    }

    let mut rows = features.rows().to_vec();
    let repaired: usize = rows
        .iter_mut()
        .map(|row| repair_non_finite(&mut row.as_mut_slice()[3..3 + CURVATURE_CHANNELS]))
        .sum();
    if repaired > 0 {
        debug!(repaired, "Set non-finite curvature to zero");
    }

    let stats = model.stats();
    let normalized: Vec<Vector6<f64>> = rows
        .iter()
        .map(|row| stats.squash(row, &params.tanh_channels))
        .collect();
    let objective = AlignmentObjective::new(model.mixture(), &normalized);

    let init_score = objective.score(&RigidParams::zero());
    let misaligned = init_score.is_nan() || init_score > params.misalignment_threshold;
    if misaligned {
        warn!(
            init_score,
            threshold = params.misalignment_threshold,
            "Surface is probably misaligned, optimizing anyway"
        );
    }

    let minimum = minimize(&objective, params.initial_params.to_vector(), &params.optimizer);
    let optimum = RigidParams::from_vector(&minimum.x);
    if !minimum.report.status.is_converged() {
        warn!(
            status = ?minimum.report.status,
            iterations = minimum.report.iterations,
            gradient_norm = minimum.report.gradient_norm,
            "Optimizer stopped before converging"
        );
    }

    let block = optimum.block_transform();
    let vertices = normalized
        .iter()
        .map(|row| {
            let moved = stats.unsquash_xyz(&block.apply(row));
            Vertex::new(Point3::new(moved[0], moved[1], moved[2]))
        })
        .collect();
    let mesh = IndexedMesh {
        vertices,
        faces: features.faces().to_vec(),
    };

    info!(
        init_score,
        final_score = minimum.value,
        angles = ?optimum.angles.as_slice(),
        translation = ?optimum.translation.as_slice(),
        iterations = minimum.report.iterations,
        "Alignment complete"
    );

    Ok(Alignment {
        mesh,
        params: optimum,
        init_score,
        final_score: minimum.value,
        misaligned,
        report: minimum.report,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{ConvergenceStatus, GaussianMixture, NormalizationStats};
    use approx::assert_relative_eq;
    use nalgebra::Matrix6;

    fn unit_model() -> ShapeModel {
        let mixture =
            GaussianMixture::new(&[1.0], &[Vector6::zeros()], &[Matrix6::identity()]).unwrap();
        ShapeModel::new(NormalizationStats::identity(), mixture)
    }

    #[test]
    fn origin_features_score_at_the_mode() {
        let features = FeatureMatrix::from_parts(vec![Vector6::zeros(); 4], Vec::new());
        let result = align_features(&features, &unit_model(), &AlignParams::default()).unwrap();

        let expected = 3.0 * (2.0 * std::f64::consts::PI).ln();
        assert_relative_eq!(result.init_score, expected, epsilon = 1e-12);
        assert!(!result.misaligned);
        assert_eq!(result.report.status, ConvergenceStatus::Converged);
        assert_eq!(result.report.iterations, 0);
        assert_eq!(result.params, RigidParams::zero());
    }

    #[test]
    fn distant_features_are_flagged_but_still_aligned() {
        let rows = vec![
            Vector6::new(10.0, 0.5, 0.0, 0.0, 0.0, 0.0),
            Vector6::new(10.0, -0.5, 0.0, 0.0, 0.0, 0.0),
            Vector6::new(10.5, 0.0, 0.5, 0.0, 0.0, 0.0),
        ];
        let features = FeatureMatrix::from_parts(rows, vec![[0, 1, 2]]);
        let result = align_features(&features, &unit_model(), &AlignParams::default()).unwrap();

        assert!(result.misaligned);
        assert!(result.init_score > 6.0);
        assert!(result.final_score < 6.0);
        assert_eq!(result.mesh.faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn empty_features_are_rejected() {
        let features = FeatureMatrix::from_parts(Vec::new(), Vec::new());
        assert!(matches!(
            align_features(&features, &unit_model(), &AlignParams::default()),
            Err(AlignError::InvalidSurface(FeatureError::EmptySurface))
        ));
    }

    #[test]
    fn non_finite_curvature_is_zeroed() {
        let clean = vec![
            Vector6::new(0.1, 0.0, 0.0, 0.2, 0.0, -0.1),
            Vector6::new(0.0, 0.2, 0.0, 0.1, 0.0, 0.3),
            Vector6::new(0.0, 0.0, -0.1, 0.0, 0.1, 0.0),
        ];
        let mut dirty = clean.clone();
        dirty[1][4] = f64::NAN;
        dirty[2][5] = f64::INFINITY;
        dirty[0][3] = f64::NEG_INFINITY;
        let mut zeroed = clean;
        zeroed[1][4] = 0.0;
        zeroed[2][5] = 0.0;
        zeroed[0][3] = 0.0;

        let params = AlignParams::default();
        let repaired =
            align_features(&FeatureMatrix::from_parts(dirty, Vec::new()), &unit_model(), &params)
                .unwrap();
        let expected =
            align_features(&FeatureMatrix::from_parts(zeroed, Vec::new()), &unit_model(), &params)
                .unwrap();
        assert_eq!(repaired.init_score.to_bits(), expected.init_score.to_bits());
        assert_eq!(repaired.final_score.to_bits(), expected.final_score.to_bits());
        assert_eq!(repaired.mesh, expected.mesh);
    }

    #[test]
    fn non_finite_coordinate_is_rejected() {
        let mut rows = vec![Vector6::zeros(); 3];
        rows[2][1] = f64::NAN;
        let features = FeatureMatrix::from_parts(rows, Vec::new());
        assert!(matches!(
            align_features(&features, &unit_model(), &AlignParams::default()),
            Err(AlignError::InvalidSurface(FeatureError::NonFiniteVertex { index: 2 }))
        ));
    }

    #[test]
    fn spatial_tanh_channel_is_rejected() {
        let params = AlignParams::default().with_tanh_channels(vec![0, 3]);
        assert!(matches!(params.validate(), Err(AlignError::InvalidParameter(_))));
    }

    #[test]
    fn nan_threshold_is_rejected() {
        let params = AlignParams::default().with_misalignment_threshold(f64::NAN);
        assert!(params.validate().is_err());
    }

    #[test]
    fn params_survive_json() {
        let params = AlignParams::default()
            .with_initial_params(RigidParams::new(0.1, 0.0, -0.1, nalgebra::Vector3::new(1.0, 2.0, 3.0)));
        let json = serde_json::to_string(&params).unwrap();
        let back: AlignParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let params: AlignParams = serde_json::from_str(r#"{"misalignment_threshold": 4.5}"#).unwrap();
        assert_relative_eq!(params.misalignment_threshold, 4.5);
        assert_eq!(params.tanh_channels, vec![3, 4, 5]);
    }
}
