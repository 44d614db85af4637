// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Minimal text serialization for the mesh entity
//!
//! The format is the classic SMF-style line format: `v x y z` vertex
//! lines and `t i j k` (or `f i j k`) triangle lines with 1-based
//! indices. Blank lines and `#` comments are skipped. Everything more
//! elaborate (format detection, binary formats, color annotations)
//! belongs to the host application, not the core.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use tracing::info;

use crate::error::{MeshError, MeshResult};
use crate::mesh::TriMesh;

fn parse_error(path: &Path, line: usize, details: impl Into<String>) -> MeshError {
    MeshError::Parse {
        path: path.to_path_buf(),
        details: format!("line {}: {}", line, details.into()),
    }
}

/// Load a mesh from an SMF-style text file, translating the 1-based
/// triangle indices to 0-based and validating them before the mesh is
/// built.
pub fn load_smf(path: impl AsRef<Path>) -> MeshResult<TriMesh> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| MeshError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut verts: Vec<Point3<f64>> = Vec::new();
    let mut tris: Vec<[u32; 3]> = Vec::new();

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let lineno = lineno + 1;
        let line = line.map_err(|source| MeshError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let tag = fields.next().unwrap_or_default();
        match tag {
            "v" => {
                let mut coord = [0.0f64; 3];
                for c in coord.iter_mut() {
                    *c = fields
                        .next()
                        .and_then(|f| f.parse().ok())
                        .ok_or_else(|| parse_error(path, lineno, "malformed vertex line"))?;
                }
                verts.push(Point3::new(coord[0], coord[1], coord[2]));
            }
            "t" | "f" => {
                let mut idx = [0u32; 3];
                for i in idx.iter_mut() {
                    let raw: i64 = fields
                        .next()
                        .and_then(|f| f.parse().ok())
                        .ok_or_else(|| parse_error(path, lineno, "malformed triangle line"))?;
                    if raw < 1 {
                        return Err(parse_error(path, lineno, "triangle index below 1"));
                    }
                    *i = (raw - 1) as u32;
                }
                tris.push(idx);
            }
            // Color/annotation lines from the wider format family.
            "c" | "bind" | "e" => continue,
            other => {
                return Err(parse_error(path, lineno, format!("unknown tag {other:?}")));
            }
        }
    }

    info!(
        vertices = verts.len(),
        triangles = tris.len(),
        path = %path.display(),
        "loaded mesh"
    );
    TriMesh::from_arrays(verts, tris)
}

/// Save the mesh as SMF-style text with 1-based triangle indices.
pub fn save_smf(mesh: &TriMesh, path: impl AsRef<Path>) -> MeshResult<()> {
    let path = path.as_ref();
    let io_err = |source| MeshError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut out = BufWriter::new(file);

    for v in mesh.vertices() {
        writeln!(out, "v {} {} {}", v.x, v.y, v.z).map_err(io_err)?;
    }
    for tri in mesh.triangles() {
        writeln!(out, "t {} {} {}", tri[0] + 1, tri[1] + 1, tri[2] + 1).map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;

    info!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        path = %path.display(),
        "saved mesh"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(name)
    }

    #[test]
    fn test_load_smf() {
        let path = temp_path("meshkit_load_test.smf");
        std::fs::write(
            &path,
            "# simple quad\n\
             v 0 0 0\n\
             v 1 0 0\n\
             v 0 1 0\n\
             v 1 1 0\n\
             t 1 2 3\n\
             t 2 4 3\n",
        )
        .unwrap();

        let mesh = load_smf(&path).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.triangle(0), [0, 1, 2]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_bad_index() {
        let path = temp_path("meshkit_badindex_test.smf");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nt 1 2 9\n").unwrap();
        assert!(load_smf(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_zero_index() {
        let path = temp_path("meshkit_zeroindex_test.smf");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nt 0 1 2\n").unwrap();
        assert!(load_smf(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_round_trip() {
        let mesh = crate::mesh::test_meshes::tetrahedron();
        let path = temp_path("meshkit_roundtrip_test.smf");
        save_smf(&mesh, &path).unwrap();

        let loaded = load_smf(&path).unwrap();
        assert_eq!(loaded.vertex_count(), mesh.vertex_count());
        assert_eq!(loaded.triangle_count(), mesh.triangle_count());
        for v in 0..mesh.vertex_count() as u32 {
            assert_eq!(loaded.vertex(v), mesh.vertex(v));
        }
        std::fs::remove_file(&path).ok();
    }
}
