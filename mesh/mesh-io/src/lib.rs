//! Surface file I/O for scan alignment.
//!
//! The alignment core only needs vertex positions and a face list, so this
//! crate reads and writes exactly that, in the two formats the scan pipeline
//! hands between stages:
//!
//! - **PLY** (Polygon File Format) - Binary and ASCII; cleaned scans arrive as PLY
//! - **STL** (Stereolithography) - Binary and ASCII; aligned scans leave as STL
//!
//! STL stores an unindexed triangle soup. [`load_stl`] welds bit-identical
//! corners back into shared vertices so downstream curvature estimation sees
//! a connected surface.
//!
//! # Example
//!
//! ```no_run
//! use mesh_io::{load_mesh, save_mesh};
//!
//! // Format detected from the extension
//! let mesh = load_mesh("cleaned.ply").unwrap();
//! save_mesh(&mesh, "aligned.stl").unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod error;
mod ply;
mod stl;
mod weld;

pub use error::{IoError, IoResult};
pub use ply::{load_ply, save_ply};
pub use stl::{load_stl, save_stl};

use std::path::Path;

use mesh_types::IndexedMesh;

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshFormat {
    /// STL (Stereolithography) format.
    Stl,
    /// PLY (Polygon File Format).
    Ply,
}

impl MeshFormat {
    /// Detect format from file extension (case-insensitive).
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "stl" => Some(Self::Stl),
            "ply" => Some(Self::Ply),
            _ => None,
        }
    }

    /// Get the canonical file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Stl => "stl",
            Self::Ply => "ply",
        }
    }
}

fn detect_format(path: &Path) -> IoResult<MeshFormat> {
    MeshFormat::from_path(path).ok_or_else(|| IoError::UnknownFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })
}

/// Load a mesh from a file, detecting format from extension.
///
/// # Errors
///
/// Returns an error if:
/// - The file format cannot be determined from the extension
/// - The file cannot be read
/// - The file content is invalid for the detected format
pub fn load_mesh<P: AsRef<Path>>(path: P) -> IoResult<IndexedMesh> {
    let path = path.as_ref();
    match detect_format(path)? {
        MeshFormat::Stl => load_stl(path),
        MeshFormat::Ply => load_ply(path),
    }
}

/// Save a mesh to a file, detecting format from extension.
///
/// Both formats are written in their binary variant.
///
/// # Errors
///
/// Returns an error if:
/// - The file format cannot be determined from the extension
/// - A face references a missing vertex
/// - The file cannot be written
pub fn save_mesh<P: AsRef<Path>>(mesh: &IndexedMesh, path: P) -> IoResult<()> {
    let path = path.as_ref();
    match detect_format(path)? {
        MeshFormat::Stl => save_stl(mesh, path, true),
        MeshFormat::Ply => save_ply(mesh, path, true),
    }
}
