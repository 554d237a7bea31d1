// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! STL gateway (ASCII and binary)

use super::{load_document_with, save, ShapeFormat};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::geometry::{Face, Shape, Shell, TessellatedMesh};
use crate::tessellate::{tessellate, TessellationParams};
use crate::utils::triangle_normal;
use ahash::AHashMap;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Write};
use std::path::Path;
use std::str::FromStr;
use stl_io::{Normal, Triangle as StlTriangle, Vertex as StlVertex};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StlMode {
    Ascii,
    #[default]
    Binary,
}

impl fmt::Display for StlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascii => f.write_str("ascii"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

impl FromStr for StlMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" => Ok(Self::Ascii),
            "binary" => Ok(Self::Binary),
            other => Err(Error::format(format!(
                "unknown STL mode '{}', expected ascii or binary",
                other
            ))),
        }
    }
}

/// STL reader/writer; shapes are tessellated with `params` before writing
#[derive(Debug, Clone, Default)]
pub struct StlFormat {
    pub mode: StlMode,
    pub params: TessellationParams,
}

impl StlFormat {
    pub fn new(mode: StlMode) -> Self {
        Self {
            mode,
            params: TessellationParams::default().with_normals(false),
        }
    }

    pub fn with_params(mut self, params: TessellationParams) -> Self {
        self.params = params;
        self
    }
}

impl ShapeFormat for StlFormat {
    fn name(&self) -> &'static str {
        "STL"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["stl"]
    }

    fn read(&self, bytes: &[u8], name: Option<String>) -> Result<Document> {
        let shell = read_shell(bytes)?;
        Ok(Document::from_shape(Shape::Shell(shell), name))
    }

    fn write(&self, shape: &Shape, out: &mut dyn Write) -> Result<()> {
        let mesh = tessellate(shape, &self.params)?.mesh;
        match self.mode {
            StlMode::Binary => write_binary(&mesh, out),
            StlMode::Ascii => write_ascii(&mesh, out),
        }
    }
}

/// Read an STL file as a shell of triangular faces
pub fn read_stl_file(path: impl AsRef<Path>) -> Result<Shape> {
    let document = load_document_with(&StlFormat::default(), path.as_ref())?;
    document
        .shapes()
        .first()
        .cloned()
        .ok_or_else(|| Error::format("STL file holds no triangles"))
}

/// Write the tessellation of `shape` in `"ascii"` or `"binary"` mode
pub fn write_stl_file(shape: &Shape, path: impl AsRef<Path>, mode: &str) -> Result<()> {
    let mode: StlMode = mode.parse()?;
    save(shape, path, &StlFormat::new(mode))
}

fn read_shell(bytes: &[u8]) -> Result<Shell> {
    let mut cursor = Cursor::new(bytes);
    let stl = stl_io::read_stl(&mut cursor)
        .map_err(|e| Error::format(format!("failed to read STL: {}", e)))?;
    if stl.faces.is_empty() {
        return Err(Error::format("STL file holds no triangles"));
    }

    let point = |i: usize| -> Point3<f64> {
        let v = &stl.vertices[i];
        Point3::new(v[0] as f64, v[1] as f64, v[2] as f64)
    };

    let mut faces = Vec::with_capacity(stl.faces.len());
    let mut edge_uses: AHashMap<(usize, usize), usize> = AHashMap::new();
    let mut skipped = 0usize;
    for triangle in &stl.faces {
        let [a, b, c] = triangle.vertices;
        if a.max(b).max(c) >= stl.vertices.len() {
            return Err(Error::format("STL triangle refers to a missing vertex"));
        }
        match Face::polygon(&[point(a), point(b), point(c)]) {
            Some(face) => faces.push(face),
            None => {
                skipped += 1;
                continue;
            }
        }
        for (p, q) in [(a, b), (b, c), (c, a)] {
            *edge_uses.entry((p.min(q), p.max(q))).or_default() += 1;
        }
    }
    if skipped > 0 {
        warn!(skipped, "dropped degenerate STL triangles");
    }
    if faces.is_empty() {
        return Err(Error::format("STL file holds only degenerate triangles"));
    }

    let closed = edge_uses.values().all(|&n| n == 2);
    debug!(triangles = faces.len(), closed, "read STL shell");
    Ok(Shell::new(faces, closed))
}

fn triangle_corners(mesh: &TessellatedMesh) -> impl Iterator<Item = [Point3<f64>; 3]> + '_ {
    mesh.triangles
        .iter()
        .map(|t| t.indices.map(|i| mesh.positions[i]))
}

fn facet_normal(corners: &[Point3<f64>; 3]) -> Vector3<f64> {
    triangle_normal(&corners[0], &corners[1], &corners[2])
}

fn write_binary(mesh: &TessellatedMesh, out: &mut dyn Write) -> Result<()> {
    let vertex = |p: &Point3<f64>| StlVertex::new([p.x as f32, p.y as f32, p.z as f32]);
    let triangles: Vec<StlTriangle> = triangle_corners(mesh)
        .map(|corners| {
            let n = facet_normal(&corners);
            StlTriangle {
                normal: Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [
                    vertex(&corners[0]),
                    vertex(&corners[1]),
                    vertex(&corners[2]),
                ],
            }
        })
        .collect();

    let mut out = out;
    stl_io::write_stl(&mut out, triangles.iter())?;
    Ok(())
}

fn write_ascii(mesh: &TessellatedMesh, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "solid cadex")?;
    for corners in triangle_corners(mesh) {
        let n = facet_normal(&corners);
        writeln!(out, "  facet normal {:e} {:e} {:e}", n.x as f32, n.y as f32, n.z as f32)?;
        writeln!(out, "    outer loop")?;
        for p in &corners {
            writeln!(
                out,
                "      vertex {:e} {:e} {:e}",
                p.x as f32, p.y as f32, p.z as f32
            )?;
        }
        writeln!(out, "    endloop")?;
        writeln!(out, "  endfacet")?;
    }
    writeln!(out, "endsolid cadex")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Primitive, ShapeKind};
    use nalgebra::Vector3;
    use tempfile::TempDir;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("ASCII".parse::<StlMode>().unwrap(), StlMode::Ascii);
        assert_eq!("binary".parse::<StlMode>().unwrap(), StlMode::Binary);
        assert!(matches!("text".parse::<StlMode>(), Err(Error::Format(_))));
    }

    #[test]
    fn test_torus_roundtrip_is_closed_in_both_modes() {
        let dir = TempDir::new().unwrap();
        let torus = Primitive::torus(20.0, 5.0).to_shape();
        for mode in ["ascii", "binary"] {
            let path = dir.path().join(format!("torus_{}.stl", mode));
            write_stl_file(&torus, &path, mode).unwrap();
            assert!(std::fs::metadata(&path).unwrap().len() > 0);

            let shape = read_stl_file(&path).unwrap();
            assert_eq!(shape.kind(), ShapeKind::Shell);
            let shells = shape.shells();
            assert_eq!(shells.len(), 1);
            assert!(shells[0].closed, "{} torus not closed", mode);
        }
    }

    #[test]
    fn test_open_surface_is_not_closed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("square.stl");
        let square = Face::polygon(&[
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
        .unwrap();
        write_stl_file(&Shape::Face(square), &path, "ascii").unwrap();

        let shape = read_stl_file(&path).unwrap();
        assert_eq!(shape.face_count(), 2);
        assert!(!shape.shells()[0].closed);
    }

    #[test]
    fn test_ascii_layout() {
        let cube = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false).to_shape();
        let mut buffer = Vec::new();
        StlFormat::new(StlMode::Ascii).write(&cube, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("solid cadex\n"));
        assert!(text.trim_end().ends_with("endsolid cadex"));
        assert_eq!(text.matches("facet normal").count(), 12);
        assert_eq!(text.matches("vertex ").count(), 36);
    }

    #[test]
    fn test_garbage_is_format_error() {
        let result = StlFormat::default().read(b"not an stl file at all", None);
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn test_wire_only_shape_cannot_be_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wire.stl");
        let edge = crate::geometry::Edge::line(Point3::origin(), Point3::new(1.0, 0.0, 0.0));
        let result = write_stl_file(&Shape::Edge(edge), &path, "binary");
        assert!(matches!(result, Err(Error::Tessellation(_))));
        assert!(!path.exists());
    }
}
