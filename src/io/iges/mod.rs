// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! IGES 5.3 gateway
//!
//! Geometry only: IGES carries no assembly structure or colors here, so a
//! read yields a single-root document.

mod parser;
mod reader;
mod writer;

pub use parser::{IgesEntity, IgesFile, Param};

use super::{load_document_with, save, ShapeFormat};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::geometry::Shape;
use crate::tessellate::TessellationParams;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct IgesFormat;

impl ShapeFormat for IgesFormat {
    fn name(&self) -> &'static str {
        "IGES"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["iges", "igs"]
    }

    fn read(&self, bytes: &[u8], name: Option<String>) -> Result<Document> {
        let text = String::from_utf8_lossy(bytes);
        let shape = reader::read_shape(&text)?;
        Ok(Document::from_shape(shape, name))
    }

    fn write(&self, shape: &Shape, out: &mut dyn Write) -> Result<()> {
        let params = TessellationParams::default().with_normals(false);
        let text = writer::write_shape(shape, "cadex", &params)?;
        out.write_all(text.as_bytes())?;
        Ok(())
    }
}

/// Read an IGES file as one shape
pub fn read_iges_file(path: impl AsRef<Path>) -> Result<Shape> {
    let document = load_document_with(&IgesFormat, path.as_ref())?;
    document
        .shapes()
        .first()
        .cloned()
        .ok_or_else(|| Error::format("IGES file contains no supported geometry"))
}

pub fn write_iges_file(shape: &Shape, path: impl AsRef<Path>) -> Result<()> {
    save(shape, path, &IgesFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Edge, Face, Frame, Primitive, ShapeKind, Wire};
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Point3, Vector3};
    use std::f64::consts::FRAC_PI_2;
    use tempfile::TempDir;

    fn roundtrip(shape: &Shape) -> Shape {
        let mut buffer = Vec::new();
        IgesFormat.write(shape, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        reader::read_shape(&text).unwrap()
    }

    #[test]
    fn test_cube_faces_survive() {
        let cube = Primitive::cube(Vector3::new(10.0, 20.0, 30.0), false).to_shape();
        let restored = roundtrip(&cube);
        assert_eq!(restored.kind(), ShapeKind::Shell);
        assert_eq!(restored.face_count(), 6);
        assert!(restored.bounding_box().approx_eq(&cube.bounding_box(), 1e-6));
    }

    #[test]
    fn test_moved_face_keeps_position_and_normal() {
        let square = Face::polygon(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ])
        .unwrap();
        let moved = Shape::Face(square).transformed(
            &(Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0))
                * Matrix4::from_euler_angles(FRAC_PI_2, 0.0, 0.0)),
        );
        let restored = roundtrip(&moved);
        let face = restored.faces()[0];
        assert_relative_eq!(face.normal(0.0, 0.0), Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-9);
        assert!(restored.bounding_box().approx_eq(&moved.bounding_box(), 1e-9));
    }

    #[test]
    fn test_face_with_hole_becomes_trimmed_surface() {
        let outer = Wire::polygon(&[
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(4.0, 0.0, 1.0),
            Point3::new(4.0, 4.0, 1.0),
            Point3::new(0.0, 4.0, 1.0),
        ]);
        let hole = Wire::polygon(&[
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, 3.0, 1.0),
            Point3::new(3.0, 3.0, 1.0),
            Point3::new(3.0, 1.0, 1.0),
        ]);
        let face = Face::planar(Frame::at(Point3::new(0.0, 0.0, 1.0)), vec![outer, hole]);
        let mut buffer = Vec::new();
        IgesFormat.write(&Shape::Face(face), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        let file = IgesFile::parse(&text).unwrap();
        assert_eq!(file.entities.iter().filter(|e| e.entity_type == 144).count(), 1);
        assert_eq!(file.entities.iter().filter(|e| e.entity_type == 142).count(), 2);

        let restored = reader::read_shape(&text).unwrap();
        assert_eq!(restored.face_count(), 1);
        assert_eq!(restored.wires().len(), 2);
    }

    #[test]
    fn test_curved_faces_are_triangulated() {
        let torus = Primitive::torus(20.0, 5.0).to_shape();
        let restored = roundtrip(&torus);
        assert!(restored.face_count() > 100);
        assert!(restored.bounding_box().approx_eq(&torus.bounding_box(), 0.5));
    }

    #[test]
    fn test_free_curves() {
        let arc = Edge::arc(Frame::at(Point3::new(1.0, 2.0, 3.0)), 2.0, 0.0, FRAC_PI_2);
        let line = Edge::line(Point3::origin(), Point3::new(0.0, 0.0, 7.0));
        let shape = Shape::Compound(vec![Shape::Edge(arc.clone()), Shape::Edge(line)]);
        let restored = roundtrip(&shape);
        let edges = restored.edges();
        assert_eq!(edges.len(), 2);
        assert_relative_eq!(edges[0].start(), arc.start(), epsilon = 1e-9);
        assert_relative_eq!(edges[0].end(), arc.end(), epsilon = 1e-9);
        assert_relative_eq!(edges[1].length(), 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_full_circle() {
        let circle = Edge::circle(Frame::new(Point3::origin(), Vector3::x(), None), 3.0);
        let restored = roundtrip(&Shape::Edge(circle));
        match restored {
            Shape::Edge(edge) => {
                assert!(edge.is_closed());
                assert_relative_eq!(edge.length(), 6.0 * std::f64::consts::PI, epsilon = 1e-9);
            }
            other => panic!("expected an edge, got {}", other.kind()),
        }
    }

    #[test]
    fn test_file_roundtrip_and_empty_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("box.igs");
        let cube = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_shape();
        write_iges_file(&cube, &path).unwrap();
        assert_eq!(read_iges_file(&path).unwrap().face_count(), 6);

        let empty = dir.path().join("empty.igs");
        assert!(write_iges_file(&Shape::Compound(vec![]), &empty).is_err());
        assert!(!empty.exists());
    }
}
