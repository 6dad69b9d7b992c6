//! Error types for mesh I/O operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for mesh I/O operations.
pub type IoResult<T> = Result<T, IoError>;

/// Errors that can occur during mesh I/O operations.
#[derive(Debug, Error)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was not found.
        path: PathBuf,
    },

    /// Unknown file format (unrecognized extension).
    #[error("unknown file format: .{extension}")]
    UnknownFormat {
        /// The unrecognized extension.
        extension: String,
    },

    /// Invalid file content (parse error).
    #[error("invalid file content: {message}")]
    InvalidContent {
        /// Description of what was invalid.
        message: String,
    },

    /// Invalid header in binary STL.
    #[error("invalid STL header: expected {expected} bytes, got {got}")]
    InvalidHeader {
        /// Expected header size.
        expected: usize,
        /// Actual header size.
        got: usize,
    },

    /// Invalid face count.
    #[error("invalid face count: expected {expected}, got {got}")]
    InvalidFaceCount {
        /// Expected number of faces.
        expected: u32,
        /// Actual number of faces read.
        got: u32,
    },

    /// A face references a vertex that does not exist.
    #[error("face {face} references vertex {index}, but the mesh has {vertex_count} vertices")]
    FaceIndexOutOfBounds {
        /// Face position in the face list.
        face: usize,
        /// The offending vertex index.
        index: usize,
        /// Number of vertices available.
        vertex_count: usize,
    },

    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Float parsing error.
    #[error("float parsing error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
}

impl IoError {
    /// Create an `InvalidContent` error with the given message.
    #[must_use]
    pub fn invalid_content(message: impl Into<String>) -> Self {
        Self::InvalidContent {
            message: message.into(),
        }
    }
}

/// Maps a failed `File::open` to `FileNotFound` when appropriate.
pub(crate) fn open_error(path: &std::path::Path, e: std::io::Error) -> IoError {
    if e.kind() == std::io::ErrorKind::NotFound {
        IoError::FileNotFound {
            path: path.to_path_buf(),
        }
    } else {
        IoError::Io(e)
    }
}

/// Checks that every face index refers to an existing vertex.
pub(crate) fn check_faces(mesh: &mesh_types::IndexedMesh) -> IoResult<()> {
    let vertex_count = mesh.vertices.len();
    for (face, f) in mesh.faces.iter().enumerate() {
        if let Some(&index) = f.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(IoError::FaceIndexOutOfBounds {
                face,
                index: index as usize,
                vertex_count,
            });
        }
    }
    Ok(())
}
