//! Pretrained shape model and its on-disk artifact.
//!
//! The artifact is a JSON document:
//!
//! ```json
//! {
//!   "schema_version": {"major": 1, "minor": 0},
//!   "weights": [0.25, 0.75],
//!   "means": [[0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0]],
//!   "precision_cholesky": [[[1, 0, 0, 0, 0, 0], "... 6x6 per component"]],
//!   "norm_means": [0, 0, 0, 0, 0, 0],
//!   "norm_stds": [50, 50, 50, 1, 1, 1]
//! }
//! ```
//!
//! Matrices are row-major nested arrays. Only the major version must match.

use std::fs;
use std::path::Path;

use nalgebra::{Matrix6, Vector6};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{GaussianMixture, ModelLoadError, ModelResult, NormalizationStats};

/// Feature dimension of the model.
pub const FEATURE_DIM: usize = 6;

/// Schema version of a model artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct SchemaVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl SchemaVersion {
    /// Version written and read by this crate.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Creates a new schema version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Compatible means same major version.
    #[must_use]
    pub const fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Serialized form of a [`ShapeModel`].
///
/// Arrays are kept as plain vectors so a wrong length is reported as
/// [`ModelLoadError::DimensionMismatch`] with the field name rather than as
/// a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeModelFile {
    /// Artifact schema version.
    pub schema_version: SchemaVersion,
    /// Mixture weights, one per component.
    pub weights: Vec<f64>,
    /// Component means, `K × 6`.
    pub means: Vec<Vec<f64>>,
    /// Precision Cholesky factors, `K × 6 × 6`, row-major.
    pub precision_cholesky: Vec<Vec<Vec<f64>>>,
    /// Feature normalization means.
    pub norm_means: Vec<f64>,
    /// Feature normalization standard deviations.
    pub norm_stds: Vec<f64>,
}

/// A pretrained statistical shape model: normalization statistics plus a
/// Gaussian mixture over normalized features.
///
/// Immutable once loaded; share it across threads by reference or `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeModel {
    stats: NormalizationStats,
    mixture: GaussianMixture,
}

impl ShapeModel {
    /// Creates a model from its parts.
    #[must_use]
    pub const fn new(stats: NormalizationStats, mixture: GaussianMixture) -> Self {
        Self { stats, mixture }
    }

    /// Loads and validates a model artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, has an
    /// incompatible schema version, or describes an invalid model.
    pub fn load<P: AsRef<Path>>(path: P) -> ModelResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json_str(&text)?;
        info!(
            path = %path.display(),
            components = model.mixture.n_components(),
            "Loaded shape model"
        );
        Ok(model)
    }

    /// Parses and validates a model artifact held in memory.
    ///
    /// # Errors
    ///
    /// See [`ShapeModel::load`].
    pub fn from_json_str(json: &str) -> ModelResult<Self> {
        let file: ShapeModelFile = serde_json::from_str(json)?;
        Self::try_from(file)
    }

    /// Writes the model as a JSON artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ModelResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.to_file())?;
        fs::write(path, json).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Serialized form of the model.
    #[must_use]
    pub fn to_file(&self) -> ShapeModelFile {
        ShapeModelFile {
            schema_version: SchemaVersion::CURRENT,
            weights: self.mixture.weights().collect(),
            means: self.mixture.means().map(|m| m.iter().copied().collect()).collect(),
            precision_cholesky: self
                .mixture
                .precision_cholesky()
                .map(|p| {
                    p.row_iter()
                        .map(|row| row.iter().copied().collect())
                        .collect()
                })
                .collect(),
            norm_means: self.stats.means().iter().copied().collect(),
            norm_stds: self.stats.stds().iter().copied().collect(),
        }
    }

    /// Normalization statistics.
    #[must_use]
    pub const fn stats(&self) -> &NormalizationStats {
        &self.stats
    }

    /// The mixture density.
    #[must_use]
    pub const fn mixture(&self) -> &GaussianMixture {
        &self.mixture
    }

    /// Per-row log density of normalized rows.
    #[must_use]
    pub fn score_samples(&self, rows: &[Vector6<f64>]) -> Vec<f64> {
        self.mixture.score_samples(rows)
    }

    /// Mean log density of normalized rows.
    #[must_use]
    pub fn score(&self, rows: &[Vector6<f64>]) -> f64 {
        self.mixture.score(rows)
    }
}

impl TryFrom<ShapeModelFile> for ShapeModel {
    type Error = ModelLoadError;

    fn try_from(file: ShapeModelFile) -> ModelResult<Self> {
        if !file.schema_version.is_compatible(&SchemaVersion::CURRENT) {
            return Err(ModelLoadError::UnsupportedVersion {
                found: file.schema_version,
                supported: SchemaVersion::CURRENT,
            });
        }

        let norm_means = vector6("norm_means", &file.norm_means)?;
        let norm_stds = vector6("norm_stds", &file.norm_stds)?;
        let stats = NormalizationStats::new(norm_means, norm_stds)?;

        let means = file
            .means
            .iter()
            .enumerate()
            .map(|(k, m)| vector6(&format!("means[{k}]"), m))
            .collect::<ModelResult<Vec<_>>>()?;
        let factors = file
            .precision_cholesky
            .iter()
            .enumerate()
            .map(|(k, p)| matrix6(k, p))
            .collect::<ModelResult<Vec<_>>>()?;
        let mixture = GaussianMixture::new(&file.weights, &means, &factors)?;

        Ok(Self { stats, mixture })
    }
}

fn vector6(field: &str, values: &[f64]) -> ModelResult<Vector6<f64>> {
    if values.len() != FEATURE_DIM {
        return Err(ModelLoadError::DimensionMismatch {
            field: field.to_string(),
            expected: FEATURE_DIM,
            got: values.len(),
        });
    }
    Ok(Vector6::from_column_slice(values))
}

fn matrix6(component: usize, rows: &[Vec<f64>]) -> ModelResult<Matrix6<f64>> {
    let field = format!("precision_cholesky[{component}]");
    if rows.len() != FEATURE_DIM {
        return Err(ModelLoadError::DimensionMismatch {
            field,
            expected: FEATURE_DIM,
            got: rows.len(),
        });
    }
    let mut m = Matrix6::zeros();
    for (i, row) in rows.iter().enumerate() {
        let row = vector6(&format!("{field}[{i}]"), row)?;
        m.set_row(i, &row.transpose());
    }
    Ok(m)
}
