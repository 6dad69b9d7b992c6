//! PLY (Polygon File Format) support.
//!
//! Cleaned scans reach the aligner as PLY. Only vertex positions and the face
//! index list are read; colors, normals and other properties are ignored.
//!
//! # Supported Properties
//!
//! - Vertex positions (x, y, z) as `float` or `double` - required
//! - Face vertex indices (`vertex_indices` or `vertex_index`) - polygons are
//!   fan-triangulated
//!
//! # Format Variants
//!
//! - **ASCII** - Human-readable, larger files
//! - **Binary Little Endian** - Compact, fast to read/write
//! - **Binary Big Endian** - Read only
//!
//! # Example
//!
//! ```no_run
//! use mesh_io::{load_ply, save_ply};
//!
//! let mesh = load_ply("cleaned.ply").unwrap();
//! save_ply(&mesh, "copy.ply", true).unwrap(); // Binary
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use mesh_types::{IndexedMesh, Vertex};
use ply_rs::parser::Parser;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;
use tracing::debug;

use crate::error::{IoError, IoResult, check_faces, open_error};

/// Load a mesh from a PLY file.
///
/// Supports ASCII, binary little-endian, and binary big-endian formats.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The file is not valid PLY format
/// - A vertex lacks an `x`, `y` or `z` property
/// - A face references a vertex that does not exist
pub fn load_ply<P: AsRef<Path>>(path: P) -> IoResult<IndexedMesh> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| open_error(path, e))?;
    let mut reader = BufReader::new(file);

    let parser = Parser::<DefaultElement>::new();
    let header = parser
        .read_header(&mut reader)
        .map_err(|e| IoError::invalid_content(format!("failed to parse PLY header: {e}")))?;
    let payload = parser
        .read_payload(&mut reader, &header)
        .map_err(|e| IoError::invalid_content(format!("failed to read PLY payload: {e}")))?;

    let mut mesh = IndexedMesh::new();

    if let Some(vertex_elements) = payload.get("vertex") {
        mesh.vertices.reserve(vertex_elements.len());
        for (i, element) in vertex_elements.iter().enumerate() {
            let coord = |key: &str| {
                scalar_property(element, key).ok_or_else(|| {
                    IoError::invalid_content(format!("vertex {i} has no numeric '{key}' property"))
                })
            };
            mesh.vertices
                .push(Vertex::from_coords(coord("x")?, coord("y")?, coord("z")?));
        }
    }

    if let Some(face_elements) = payload.get("face") {
        mesh.faces.reserve(face_elements.len());
        for element in face_elements {
            let indices = index_list(element)?;
            // Fan triangulation; convex polygons only
            for i in 1..indices.len().saturating_sub(1) {
                mesh.faces.push([indices[0], indices[i], indices[i + 1]]);
            }
        }
    }

    check_faces(&mesh)?;
    debug!(
        path = %path.display(),
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Loaded PLY"
    );
    Ok(mesh)
}

fn scalar_property(element: &DefaultElement, key: &str) -> Option<f64> {
    match element.get(key)? {
        Property::Float(v) => Some(f64::from(*v)),
        Property::Double(v) => Some(*v),
        Property::Int(v) => Some(f64::from(*v)),
        Property::UInt(v) => Some(f64::from(*v)),
        Property::Short(v) => Some(f64::from(*v)),
        Property::UShort(v) => Some(f64::from(*v)),
        _ => None,
    }
}

fn index_list(element: &DefaultElement) -> IoResult<Vec<u32>> {
    let negative = || IoError::invalid_content("face has a negative vertex index");
    for key in ["vertex_indices", "vertex_index"] {
        let Some(prop) = element.get(key) else {
            continue;
        };
        return match prop {
            Property::ListInt(v) => v
                .iter()
                .map(|&i| u32::try_from(i).map_err(|_| negative()))
                .collect(),
            Property::ListShort(v) => v
                .iter()
                .map(|&i| u32::try_from(i).map_err(|_| negative()))
                .collect(),
            Property::ListChar(v) => v
                .iter()
                .map(|&i| u32::try_from(i).map_err(|_| negative()))
                .collect(),
            Property::ListUInt(v) => Ok(v.clone()),
            Property::ListUShort(v) => Ok(v.iter().map(|&i| u32::from(i)).collect()),
            Property::ListUChar(v) => Ok(v.iter().map(|&i| u32::from(i)).collect()),
            _ => Err(IoError::invalid_content(format!(
                "face property '{key}' is not an integer list"
            ))),
        };
    }
    Err(IoError::invalid_content(
        "face element has no vertex_indices property",
    ))
}

/// Save a mesh to a PLY file.
///
/// Positions are written as `double` so a load/save cycle is lossless.
///
/// # Arguments
///
/// * `mesh` - The mesh to save
/// * `path` - Output file path
/// * `binary` - If true, save as binary little-endian; if false, save as ASCII
///
/// # Errors
///
/// Returns an error if a face references a missing vertex or the file cannot
/// be written.
pub fn save_ply<P: AsRef<Path>>(mesh: &IndexedMesh, path: P, binary: bool) -> IoResult<()> {
    check_faces(mesh)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    if binary {
        save_ply_binary(mesh, &mut writer)?;
    } else {
        save_ply_ascii(mesh, &mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Binary little-endian writer.
///
/// Written by hand: ply-rs emits the element count instead of the list
/// length for binary list properties.
fn save_ply_binary<W: Write>(mesh: &IndexedMesh, writer: &mut W) -> IoResult<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format binary_little_endian 1.0")?;
    writeln!(writer, "comment written by mesh-io")?;
    writeln!(writer, "element vertex {}", mesh.vertices.len())?;
    writeln!(writer, "property double x")?;
    writeln!(writer, "property double y")?;
    writeln!(writer, "property double z")?;
    writeln!(writer, "element face {}", mesh.faces.len())?;
    writeln!(writer, "property list uchar uint vertex_indices")?;
    writeln!(writer, "end_header")?;

    for v in &mesh.vertices {
        writer.write_all(&v.position.x.to_le_bytes())?;
        writer.write_all(&v.position.y.to_le_bytes())?;
        writer.write_all(&v.position.z.to_le_bytes())?;
    }

    for face in &mesh.faces {
        writer.write_all(&[3u8])?;
        for i in face {
            writer.write_all(&i.to_le_bytes())?;
        }
    }

    Ok(())
}

fn save_ply_ascii<W: Write>(mesh: &IndexedMesh, writer: &mut W) -> IoResult<()> {
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;
    ply.header.comments.push("written by mesh-io".to_string());

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for axis in ["x", "y", "z"] {
        vertex_def.properties.add(PropertyDef::new(
            axis.to_string(),
            PropertyType::Scalar(ScalarType::Double),
        ));
    }
    vertex_def.count = mesh.vertices.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::UInt),
    ));
    face_def.count = mesh.faces.len();
    ply.header.elements.add(face_def);

    let vertex_elements = mesh
        .vertices
        .iter()
        .map(|v| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Double(v.position.x));
            element.insert("y".to_string(), Property::Double(v.position.y));
            element.insert("z".to_string(), Property::Double(v.position.z));
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertex_elements);

    let face_elements = mesh
        .faces
        .iter()
        .map(|face| {
            let mut element = DefaultElement::new();
            element.insert("vertex_indices".to_string(), Property::ListUInt(face.to_vec()));
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), face_elements);

    Writer::new()
        .write_ply(writer, &mut ply)
        .map_err(|e| IoError::invalid_content(format!("failed to write PLY: {e}")))?;

    Ok(())
}
