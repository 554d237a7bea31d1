// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Shapes → IGES 5.3 entities
//!
//! Planar faces without holes become bounded planes (108 form 1) over a
//! closed planar polyline (106 form 63) in the face's local frame, placed by
//! a 124 matrix. Planar faces with holes become trimmed surfaces (144) over
//! an unbounded plane. Other faces are triangulated and every triangle is
//! written as a bounded plane. Free edges and vertices keep their curve type.

use super::parser::{hollerith, DATA_COLUMNS, PARAMETER_COLUMNS};
use super::reader::types::*;
use crate::error::{Error, Result};
use crate::geometry::{Curve, Edge, Face, Frame, Shape, Surface};
use crate::tessellate::{tessellate_face, TessellationParams};
use crate::utils::{format_real, triangle_normal};
use chrono::Utc;
use nalgebra::{Point3, Vector3};
use tracing::{debug, warn};

const INDEPENDENT: &str = "00000000";
const DEPENDENT: &str = "00010000";
const CLOSED_PLANAR_CURVE: i64 = 63;
const POLYLINE_3D: i64 = 12;

pub fn write_shape(shape: &Shape, name: &str, params: &TessellationParams) -> Result<String> {
    let name: String = name
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .collect();
    let mut faces = Vec::new();
    let mut edges = Vec::new();
    let mut vertices = Vec::new();
    collect(shape, &mut faces, &mut edges, &mut vertices);

    let mut writer = IgesWriter::default();
    for face in faces {
        writer.face(face, params);
    }
    for edge in &edges {
        writer.free_edge(edge);
    }
    for p in &vertices {
        writer.add(POINT, 0, vec![real(p.x), real(p.y), real(p.z), "0".into()], 0, INDEPENDENT);
    }

    if writer.entities.is_empty() {
        return Err(Error::format(format!(
            "{} has nothing that can be written to IGES",
            shape.kind()
        )));
    }
    debug!(entities = writer.entities.len(), "wrote IGES entities");
    Ok(writer.finish(&name, shape))
}

fn collect<'a>(
    shape: &'a Shape,
    faces: &mut Vec<&'a Face>,
    edges: &mut Vec<Edge>,
    vertices: &mut Vec<Point3<f64>>,
) {
    match shape {
        Shape::Vertex(p) => vertices.push(*p),
        Shape::Edge(edge) => edges.push(edge.clone()),
        Shape::Wire(wire) => edges.extend(wire.edges.iter().cloned()),
        Shape::Compound(children) => {
            for child in children {
                collect(child, faces, edges, vertices);
            }
        }
        Shape::Face(_) | Shape::Shell(_) | Shape::Solid(_) => faces.extend(shape.faces()),
    }
}

fn real(value: f64) -> String {
    format_real(value)
}

struct PendingEntity {
    entity_type: i64,
    form: i64,
    params: Vec<String>,
    transform: usize,
    status: &'static str,
}

#[derive(Default)]
struct IgesWriter {
    entities: Vec<PendingEntity>,
}

impl IgesWriter {
    /// Queue an entity and return its DE pointer
    fn add(
        &mut self,
        entity_type: i64,
        form: i64,
        params: Vec<String>,
        transform: usize,
        status: &'static str,
    ) -> usize {
        self.entities.push(PendingEntity {
            entity_type,
            form,
            params,
            transform,
            status,
        });
        2 * self.entities.len() - 1
    }

    fn matrix(&mut self, frame: &Frame) -> usize {
        let m = frame.to_matrix();
        let params = (0..3)
            .flat_map(|row| (0..4).map(move |col| (row, col)))
            .map(|(row, col)| real(m[(row, col)]))
            .collect();
        self.add(TRANSFORMATION_MATRIX, 0, params, 0, INDEPENDENT)
    }

    fn face(&mut self, face: &Face, params: &TessellationParams) {
        if let Surface::Plane { frame } = &face.surface {
            let rings: Vec<Vec<Point3<f64>>> = face
                .wires()
                .iter()
                .map(|w| w.discretize(params.precision, params.angular_deflection))
                .filter(|ring| ring.len() >= 3)
                .collect();
            match rings.len() {
                0 => warn!("skipping planar face without a boundary"),
                1 => self.bounded_plane(frame, face.reversed, &rings[0]),
                _ => self.trimmed_plane(frame, face.reversed, &rings),
            }
            return;
        }

        match tessellate_face(face, params) {
            Ok(mesh) => {
                for triangle in &mesh.triangles {
                    let [a, b, c] = triangle.indices.map(|i| mesh.positions[i]);
                    self.triangle(&a, &b, &c);
                }
            }
            Err(err) => warn!(surface = face.surface.name(), %err, "skipping face"),
        }
    }

    fn bounded_plane(&mut self, frame: &Frame, reversed: bool, ring: &[Point3<f64>]) {
        let mut params = vec!["1".to_string(), String::new(), real(0.0)];
        let mut local: Vec<Vector3<f64>> = ring.iter().map(|p| frame.local(p)).collect();
        if let (Some(first), Some(last)) = (local.first().copied(), local.last()) {
            if (first - last).norm() > 1e-9 {
                local.push(first);
            }
        }
        params[1] = local.len().to_string();
        for p in &local {
            params.push(real(p.x));
            params.push(real(p.y));
        }
        let curve = self.add(COPIOUS_DATA, CLOSED_PLANAR_CURVE, params, 0, DEPENDENT);
        let matrix = self.matrix(frame);
        let c = if reversed { -1.0 } else { 1.0 };
        self.add(
            PLANE,
            1,
            plane_params(&Vector3::new(0.0, 0.0, c), 0.0, curve),
            matrix,
            INDEPENDENT,
        );
    }

    fn trimmed_plane(&mut self, frame: &Frame, reversed: bool, rings: &[Vec<Point3<f64>>]) {
        let normal = if reversed { -frame.z } else { frame.z };
        let d = normal.dot(&frame.origin.coords);
        let plane = self.add(PLANE, 0, plane_params(&normal, d, 0), 0, DEPENDENT);
        let loops: Vec<usize> = rings
            .iter()
            .map(|ring| {
                let curve = self.polyline(ring, DEPENDENT);
                let params = vec![
                    "0".into(),
                    plane.to_string(),
                    "0".into(),
                    curve.to_string(),
                    "2".into(),
                ];
                self.add(CURVE_ON_SURFACE, 0, params, 0, DEPENDENT)
            })
            .collect();
        let mut params = vec![
            plane.to_string(),
            "1".into(),
            (loops.len() - 1).to_string(),
        ];
        params.extend(loops.iter().map(|de| de.to_string()));
        self.add(TRIMMED_SURFACE, 0, params, 0, INDEPENDENT);
    }

    fn triangle(&mut self, a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) {
        let normal = triangle_normal(a, b, c);
        if normal == Vector3::zeros() {
            return;
        }
        let curve = self.polyline(&[*a, *b, *c, *a], DEPENDENT);
        self.add(
            PLANE,
            1,
            plane_params(&normal, normal.dot(&a.coords), curve),
            0,
            INDEPENDENT,
        );
    }

    /// 3D copious data in traversal order
    fn polyline(&mut self, points: &[Point3<f64>], status: &'static str) -> usize {
        let mut params = vec!["2".to_string(), points.len().to_string()];
        for p in points {
            params.extend([real(p.x), real(p.y), real(p.z)]);
        }
        self.add(COPIOUS_DATA, POLYLINE_3D, params, 0, status)
    }

    fn free_edge(&mut self, edge: &Edge) {
        if edge.is_degenerate() {
            return;
        }
        match &edge.curve {
            Curve::Line { .. } => {
                let (s, e) = (edge.start(), edge.end());
                let params = [s.x, s.y, s.z, e.x, e.y, e.z].map(real).to_vec();
                self.add(LINE, 0, params, 0, INDEPENDENT);
            }
            Curve::Circle { frame, radius } => {
                let matrix = self.matrix(frame);
                let start = frame.radial(edge.first) * *radius;
                let end = frame.radial(edge.last) * *radius;
                let local = |v: Vector3<f64>| (v.dot(&frame.x), v.dot(&frame.y));
                let ((x2, y2), (x3, y3)) = (local(start), local(end));
                let params = [0.0, 0.0, 0.0, x2, y2, x3, y3].map(real).to_vec();
                self.add(CIRCULAR_ARC, 0, params, matrix, INDEPENDENT);
            }
            Curve::Polyline { .. } => {
                let points = edge.discretize(0.0, 1.0);
                self.polyline(&points, INDEPENDENT);
            }
        }
    }

    fn finish(self, name: &str, shape: &Shape) -> String {
        let mut parameter_lines: Vec<String> = Vec::new();
        let mut directory_lines: Vec<String> = Vec::new();

        for (index, entity) in self.entities.iter().enumerate() {
            let de = 2 * index + 1;
            let mut tokens = vec![entity.entity_type.to_string()];
            tokens.extend(entity.params.iter().cloned());
            let chunks = wrap(&tokens, PARAMETER_COLUMNS);
            let first = parameter_lines.len() + 1;
            for chunk in &chunks {
                let seq = parameter_lines.len() + 1;
                parameter_lines.push(format!(
                    "{:<width$}{:>8}P{:>7}",
                    chunk,
                    de,
                    seq,
                    width = PARAMETER_COLUMNS
                ));
            }
            directory_lines.push(format!(
                "{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}D{:>7}",
                entity.entity_type,
                first,
                0,
                0,
                0,
                0,
                entity.transform,
                0,
                entity.status,
                de
            ));
            directory_lines.push(format!(
                "{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}D{:>7}",
                entity.entity_type,
                0,
                0,
                chunks.len(),
                entity.form,
                "",
                "",
                "",
                0,
                de + 1
            ));
        }

        let start = [format!("{} written by cadex", name)];
        let global = wrap(&global_params(name, shape), DATA_COLUMNS);

        let mut out = String::new();
        for (i, line) in start.iter().enumerate() {
            out.push_str(&format!("{:<72}S{:>7}\n", line, i + 1));
        }
        for (i, line) in global.iter().enumerate() {
            out.push_str(&format!("{:<72}G{:>7}\n", line, i + 1));
        }
        for line in directory_lines.iter().chain(&parameter_lines) {
            out.push_str(line);
            out.push('\n');
        }
        let terminate = format!(
            "S{:>7}G{:>7}D{:>7}P{:>7}",
            start.len(),
            global.len(),
            directory_lines.len(),
            parameter_lines.len()
        );
        out.push_str(&format!("{:<72}T{:>7}\n", terminate, 1));
        out
    }
}

fn plane_params(normal: &Vector3<f64>, d: f64, boundary: usize) -> Vec<String> {
    vec![
        real(normal.x),
        real(normal.y),
        real(normal.z),
        real(d),
        boundary.to_string(),
        real(0.0),
        real(0.0),
        real(0.0),
        real(0.0),
    ]
}

fn global_params(name: &str, shape: &Shape) -> Vec<String> {
    let stamp = Utc::now().format("%Y%m%d.%H%M%S").to_string();
    let bbox = shape.bounding_box();
    let extent = if bbox.is_empty() {
        1.0
    } else {
        [bbox.min.coords.amax(), bbox.max.coords.amax()]
            .into_iter()
            .fold(0.0, f64::max)
    };
    vec![
        hollerith(","),
        hollerith(";"),
        hollerith(name),
        hollerith(&format!("{}.igs", name)),
        hollerith("cadex"),
        hollerith(env!("CARGO_PKG_VERSION")),
        "32".into(),
        "38".into(),
        "6".into(),
        "308".into(),
        "15".into(),
        hollerith(name),
        real(1.0),
        "2".into(),
        hollerith("MM"),
        "1".into(),
        real(1.0),
        hollerith(&stamp),
        real(1e-7),
        real(extent),
        hollerith(""),
        hollerith(""),
        "11".into(),
        "0".into(),
        hollerith(&stamp),
    ]
}

/// Pack comma separated tokens (terminated by `;`) into lines of `width`
fn wrap(tokens: &[String], width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let last = tokens.len().saturating_sub(1);
    for (i, token) in tokens.iter().enumerate() {
        let delimiter = if i == last { ';' } else { ',' };
        let piece = format!("{}{}", token, delimiter);
        if !line.is_empty() && line.len() + piece.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if piece.len() > width {
            // long Hollerith strings continue on the next line
            let chars: Vec<char> = piece.chars().collect();
            for chunk in chars.chunks(width) {
                let chunk: String = chunk.iter().collect();
                if chunk.len() == width {
                    lines.push(chunk);
                } else {
                    line = chunk;
                }
            }
        } else {
            line.push_str(&piece);
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_respects_width() {
        let tokens: Vec<String> = (0..40).map(|i| format!("{}.5", i)).collect();
        let lines = wrap(&tokens, 20);
        assert!(lines.iter().all(|l| l.len() <= 20));
        assert!(lines.last().unwrap().ends_with(';'));
        assert_eq!(lines.concat().matches(',').count(), 39);
    }

    #[test]
    fn test_lines_are_eighty_columns() {
        let shape = crate::geometry::Primitive::cylinder(5.0, 1.0).to_shape();
        let text = write_shape(&shape, "cyl", &TessellationParams::new(0.5)).unwrap();
        for line in text.lines() {
            assert_eq!(line.len(), 80, "bad line: {:?}", line);
        }
        assert!(text.lines().last().unwrap().starts_with("S      1G"));
    }
}
