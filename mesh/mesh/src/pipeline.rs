//! File-level alignment: surface file and model artifact in, aligned surface
//! file out.

use std::path::Path;

use mesh_align::{AlignError, AlignParams, Alignment, ShapeModel, align_surface};
use mesh_io::{IoError, load_mesh, save_mesh};
use thiserror::Error;
use tracing::info;

/// Errors from [`align_scan`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading the input surface or writing the output failed.
    #[error(transparent)]
    Io(#[from] IoError),

    /// The model could not be loaded or the surface could not be aligned.
    #[error(transparent)]
    Align(#[from] AlignError),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Loads a surface and a model, aligns the surface, and writes it out.
///
/// Input and output formats follow the file extensions (`.ply` or `.stl`).
/// The output holds the aligned vertices with the input faces. The returned
/// [`Alignment`] carries the same surface plus the transform, both scores
/// and the optimizer report.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] if the input cannot be read or the output
/// cannot be written, and [`PipelineError::Align`] if the model fails to
/// load or the surface is invalid.
///
/// # Example
///
/// ```no_run
/// use mesh::pipeline::align_scan;
/// use mesh::align::AlignParams;
///
/// let result = align_scan("cleaned.ply", "model.json", "aligned.stl", &AlignParams::default())?;
/// if result.misaligned {
///     eprintln!("check the scan: initial score {}", result.init_score);
/// }
/// # Ok::<(), mesh::pipeline::PipelineError>(())
/// ```
pub fn align_scan<I, M, O>(
    input: I,
    model: M,
    output: O,
    params: &AlignParams,
) -> PipelineResult<Alignment>
where
    I: AsRef<Path>,
    M: AsRef<Path>,
    O: AsRef<Path>,
{
    let (input, output) = (input.as_ref(), output.as_ref());

    let model = ShapeModel::load(model).map_err(AlignError::from)?;
    let surface = load_mesh(input)?;
    info!(
        path = %input.display(),
        vertices = surface.vertex_count(),
        faces = surface.face_count(),
        "Loaded surface"
    );

    let alignment = align_surface(&surface, &model, params)?;
    save_mesh(&alignment.mesh, output)?;
    info!(path = %output.display(), "Wrote aligned surface");

    Ok(alignment)
}
