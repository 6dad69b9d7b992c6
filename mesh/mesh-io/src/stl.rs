//! STL (Stereolithography) file format support.
//!
//! Supports both ASCII and binary STL formats.
//!
//! # Format Detection
//!
//! The loader automatically detects whether a file is ASCII or binary:
//! - ASCII files start with "solid" (after optional whitespace)
//! - Binary files have an 80-byte header followed by face count
//!
//! # Binary Format
//!
//! ```text
//! UINT8[80]    – Header (ignored, often contains file info)
//! UINT32       – Number of triangles
//! foreach triangle
//!     REAL32[3] – Normal vector (often not accurate)
//!     REAL32[3] – Vertex 1
//!     REAL32[3] – Vertex 2
//!     REAL32[3] – Vertex 3
//!     UINT16    – Attribute byte count (usually 0)
//! end
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use mesh_types::{IndexedMesh, Point3};
use tracing::debug;

use crate::error::{IoError, IoResult, check_faces, open_error};
use crate::weld::Welder;

/// STL binary header size in bytes.
const HEADER_SIZE: usize = 80;

/// Size of one triangle in binary STL (normal + 3 vertices + attribute).
const TRIANGLE_SIZE: usize = 50;

/// Most faces reserved up front; the header count is not trusted further.
const MAX_PREALLOCATED_FACES: usize = 1 << 20;

/// Load a mesh from an STL file.
///
/// Automatically detects ASCII vs binary format. Corners with bit-identical
/// coordinates are welded into shared vertices.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The file content is not valid STL
pub fn load_stl<P: AsRef<Path>>(path: P) -> IoResult<IndexedMesh> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| open_error(path, e))?;
    let file_len = file.metadata().ok().map(|m| m.len());
    let mut reader = BufReader::new(file);

    // Read enough to determine format
    let mut header = [0u8; HEADER_SIZE + 4];
    let bytes_read = read_up_to(&mut reader, &mut header)?;

    if bytes_read < 6 {
        return Err(IoError::invalid_content("file too small to be valid STL"));
    }

    let header_str = String::from_utf8_lossy(&header[..bytes_read.min(HEADER_SIZE)]);
    let mesh = if header_str.trim_start().starts_with("solid")
        && !is_binary_stl_header(&header[..bytes_read])
    {
        // ASCII format - re-read from start
        drop(reader);
        let file = File::open(path)?;
        load_stl_ascii(BufReader::new(file))?
    } else {
        let body_len = file_len.map(|len| len.saturating_sub((HEADER_SIZE + 4) as u64));
        load_stl_binary_from_header(&header[..bytes_read], reader, body_len)?
    };

    debug!(
        path = %path.display(),
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Loaded STL"
    );
    Ok(mesh)
}

/// Fill `buf` as far as the reader allows.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> IoResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Binary headers that happen to start with "solid" usually contain NULs.
fn is_binary_stl_header(header: &[u8]) -> bool {
    header.len() >= HEADER_SIZE + 4 && header[..HEADER_SIZE].contains(&0)
}

/// Reads the triangles following a binary header.
///
/// `body_len`, when known, is the number of bytes after the header; it bounds
/// the preallocation together with [`MAX_PREALLOCATED_FACES`].
fn load_stl_binary_from_header<R: Read>(
    header: &[u8],
    mut reader: R,
    body_len: Option<u64>,
) -> IoResult<IndexedMesh> {
    if header.len() < HEADER_SIZE + 4 {
        return Err(IoError::InvalidHeader {
            expected: HEADER_SIZE + 4,
            got: header.len(),
        });
    }

    let face_count = u32::from_le_bytes([
        header[HEADER_SIZE],
        header[HEADER_SIZE + 1],
        header[HEADER_SIZE + 2],
        header[HEADER_SIZE + 3],
    ]);

    let readable = body_len.map_or(usize::MAX, |len| {
        usize::try_from(len / TRIANGLE_SIZE as u64).unwrap_or(usize::MAX)
    });
    let capacity = (face_count as usize)
        .min(readable)
        .min(MAX_PREALLOCATED_FACES);
    let mut welder = Welder::with_capacity(capacity);
    let mut triangle_buf = [0u8; TRIANGLE_SIZE];
    for i in 0..face_count {
        if read_up_to(&mut reader, &mut triangle_buf)? < TRIANGLE_SIZE {
            return Err(IoError::InvalidFaceCount {
                expected: face_count,
                got: i,
            });
        }

        // Skip normal (12 bytes), read 3 vertices (36 bytes total)
        welder.push_triangle([
            read_point(&triangle_buf[12..24]),
            read_point(&triangle_buf[24..36]),
            read_point(&triangle_buf[36..48]),
        ]);
    }

    Ok(welder.finish())
}

fn read_point(buf: &[u8]) -> Point3<f64> {
    let x = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let y = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let z = f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    Point3::new(f64::from(x), f64::from(y), f64::from(z))
}

fn load_stl_ascii<R: BufRead>(reader: R) -> IoResult<IndexedMesh> {
    let mut welder = Welder::with_capacity(1024);
    let mut in_loop = false;
    let mut corners: Vec<Point3<f64>> = Vec::with_capacity(3);

    for line in reader.lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };

        match keyword.to_lowercase().as_str() {
            "outer" => {
                in_loop = true;
                corners.clear();
            }
            "vertex" if in_loop => {
                let mut coord = || -> IoResult<f64> {
                    parts
                        .next()
                        .ok_or_else(|| IoError::invalid_content("vertex line has fewer than 3 coordinates"))?
                        .parse::<f64>()
                        .map_err(IoError::from)
                };
                let p = Point3::new(coord()?, coord()?, coord()?);
                corners.push(p);
            }
            "endloop" => {
                in_loop = false;
                if let [a, b, c] = corners[..] {
                    welder.push_triangle([a, b, c]);
                } else {
                    return Err(IoError::invalid_content(format!(
                        "facet has {} vertices, expected 3",
                        corners.len()
                    )));
                }
            }
            "endsolid" => break,
            _ => {}
        }
    }

    Ok(welder.finish())
}

/// Save a mesh to an STL file.
///
/// # Arguments
///
/// * `mesh` - The mesh to save
/// * `path` - Output file path
/// * `binary` - If true, save as binary STL; if false, save as ASCII
///
/// # Errors
///
/// Returns an error if a face references a missing vertex or the file cannot
/// be written.
pub fn save_stl<P: AsRef<Path>>(mesh: &IndexedMesh, path: P, binary: bool) -> IoResult<()> {
    check_faces(mesh)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    if binary {
        save_stl_binary(mesh, &mut writer)?;
    } else {
        save_stl_ascii(mesh, &mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Unit face normal, or zero for a degenerate face.
fn face_normal(mesh: &IndexedMesh, face_index: usize) -> [f64; 3] {
    mesh.triangle(face_index)
        .and_then(|t| t.normal())
        .map_or([0.0; 3], |n| [n.x, n.y, n.z])
}

fn save_stl_binary<W: Write>(mesh: &IndexedMesh, writer: &mut W) -> IoResult<()> {
    let mut header = [b' '; HEADER_SIZE];
    let text = b"Binary STL written by mesh-io (aligned scan)";
    header[..text.len()].copy_from_slice(text);
    writer.write_all(&header)?;

    #[allow(clippy::cast_possible_truncation)]
    // Face count: mesh faces limited to u32 range by design
    let face_count = mesh.faces.len() as u32;
    writer.write_all(&face_count.to_le_bytes())?;

    for (i, face) in mesh.faces.iter().enumerate() {
        write_f32_triplet(writer, face_normal(mesh, i))?;
        for &vi in face {
            let p = mesh.vertices[vi as usize].position;
            write_f32_triplet(writer, [p.x, p.y, p.z])?;
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }

    Ok(())
}

fn write_f32_triplet<W: Write>(writer: &mut W, v: [f64; 3]) -> IoResult<()> {
    for c in v {
        #[allow(clippy::cast_possible_truncation)]
        // Truncation: STL stores f32
        writer.write_all(&(c as f32).to_le_bytes())?;
    }
    Ok(())
}

fn save_stl_ascii<W: Write>(mesh: &IndexedMesh, writer: &mut W) -> IoResult<()> {
    writeln!(writer, "solid aligned")?;

    for (i, face) in mesh.faces.iter().enumerate() {
        let [nx, ny, nz] = face_normal(mesh, i);
        writeln!(writer, "  facet normal {nx:.6e} {ny:.6e} {nz:.6e}")?;
        writeln!(writer, "    outer loop")?;
        for &vi in face {
            let p = mesh.vertices[vi as usize].position;
            writeln!(writer, "      vertex {:.9e} {:.9e} {:.9e}", p.x, p.y, p.z)?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }

    writeln!(writer, "endsolid aligned")?;
    Ok(())
}
