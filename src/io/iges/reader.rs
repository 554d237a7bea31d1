// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! IGES entities → shapes
//!
//! Independent entities become top-level items: bounded planes and trimmed
//! surfaces turn into planar faces gathered in one open shell, curves into
//! edges or wires and points into vertices.

use super::parser::{IgesEntity, IgesFile};
use crate::error::{Error, Result};
use crate::geometry::{newell_normal, Curve, Edge, Face, Frame, Shape, Shell, Wire};
use ahash::AHashMap;
use nalgebra::{Matrix4, Point3, Vector3};
use std::f64::consts::TAU;
use tracing::{debug, warn};

/// Nesting limit for composite curves and matrix chains
const MAX_NESTING: usize = 32;
const CLOSE_EPS: f64 = 1e-9;

pub mod types {
    pub const CIRCULAR_ARC: i64 = 100;
    pub const COMPOSITE_CURVE: i64 = 102;
    pub const COPIOUS_DATA: i64 = 106;
    pub const PLANE: i64 = 108;
    pub const LINE: i64 = 110;
    pub const POINT: i64 = 116;
    pub const TRANSFORMATION_MATRIX: i64 = 124;
    pub const RATIONAL_BSPLINE_CURVE: i64 = 126;
    pub const CURVE_ON_SURFACE: i64 = 142;
    pub const TRIMMED_SURFACE: i64 = 144;
}

use types::*;

/// Use flag of entities living in a surface's parameter space
const USE_PARAMETRIC: u8 = 5;

pub fn read_shape(text: &str) -> Result<Shape> {
    let file = IgesFile::parse(text)?;
    if let Some(units) = file.global_string(15) {
        debug!(units, "IGES model units");
    }
    IgesReader::new(&file).read()
}

struct IgesReader<'a> {
    file: &'a IgesFile,
    matrices: AHashMap<usize, Matrix4<f64>>,
    unsupported: AHashMap<i64, usize>,
}

impl<'a> IgesReader<'a> {
    fn new(file: &'a IgesFile) -> Self {
        Self {
            file,
            matrices: AHashMap::new(),
            unsupported: AHashMap::new(),
        }
    }

    fn entity(&self, de: usize) -> Result<&'a IgesEntity> {
        self.file.get(de)
    }

    fn read(mut self) -> Result<Shape> {
        let file = self.file;
        let mut faces = Vec::new();
        let mut items = Vec::new();

        for entity in &file.entities {
            if entity.is_subordinate() || entity.use_flag() == USE_PARAMETRIC {
                continue;
            }
            match entity.entity_type {
                PLANE => faces.extend(self.bounded_plane(entity)?),
                TRIMMED_SURFACE => faces.extend(self.trimmed_surface(entity)?),
                LINE | CIRCULAR_ARC | COPIOUS_DATA | COMPOSITE_CURVE | RATIONAL_BSPLINE_CURVE
                | CURVE_ON_SURFACE => {
                    let edges: Vec<Edge> = self
                        .curve(entity, 0)?
                        .into_iter()
                        .filter(|e| !e.is_degenerate())
                        .collect();
                    match edges.len() {
                        0 => {}
                        1 => items.extend(edges.into_iter().map(Shape::Edge)),
                        _ => items.push(Shape::Wire(Wire::new(edges))),
                    }
                }
                POINT => {
                    let matrix = self.matrix(entity.transform, 0)?;
                    items.push(Shape::Vertex(matrix.transform_point(&point(entity, 0)?)));
                }
                t if is_geometric(t) => *self.unsupported.entry(t).or_default() += 1,
                _ => {}
            }
        }

        for (entity_type, count) in &self.unsupported {
            warn!(entity_type, count, "skipped unsupported IGES entities");
        }

        if !faces.is_empty() {
            items.insert(0, Shape::Shell(Shell::new(faces, false)));
        }
        debug!(items = items.len(), "read IGES model");
        match items.len() {
            0 => Err(Error::format("IGES file contains no supported geometry")),
            1 => Ok(items.remove(0)),
            _ => Ok(Shape::Compound(items)),
        }
    }

    /// Accumulated 124 chain starting at `de`, identity for 0
    fn matrix(&mut self, de: usize, depth: usize) -> Result<Matrix4<f64>> {
        if de == 0 {
            return Ok(Matrix4::identity());
        }
        if let Some(m) = self.matrices.get(&de) {
            return Ok(*m);
        }
        if depth > MAX_NESTING {
            return Err(Error::format("IGES transformation matrices form a cycle"));
        }
        let entity = self.entity(de)?;
        if entity.entity_type != TRANSFORMATION_MATRIX {
            return Err(Error::format(format!(
                "IGES entity {} is used as a matrix but has type {}",
                de, entity.entity_type
            )));
        }
        let r = entity.reals(0, 12)?;
        let own = Matrix4::new(
            r[0], r[1], r[2], r[3], //
            r[4], r[5], r[6], r[7], //
            r[8], r[9], r[10], r[11], //
            0.0, 0.0, 0.0, 1.0,
        );
        let matrix = self.matrix(entity.transform, depth + 1)? * own;
        self.matrices.insert(de, matrix);
        Ok(matrix)
    }

    /// Edges of a curve entity, its own matrix applied
    fn curve(&mut self, entity: &IgesEntity, depth: usize) -> Result<Vec<Edge>> {
        if depth > MAX_NESTING {
            return Err(Error::format("IGES composite curves nest too deeply"));
        }
        let edges = match entity.entity_type {
            LINE => vec![Edge::line(point(entity, 0)?, point(entity, 3)?)],
            CIRCULAR_ARC => vec![circular_arc(entity)?],
            COPIOUS_DATA => vec![Edge::polyline(copious_points(entity)?)],
            COMPOSITE_CURVE => {
                let n = entity.count(0)?;
                let mut edges = Vec::new();
                for i in 0..n {
                    let member = self.entity(entity.pointer(1 + i)?)?;
                    edges.extend(self.curve(member, depth + 1)?);
                }
                edges
            }
            RATIONAL_BSPLINE_CURVE => vec![Edge::polyline(control_polygon(entity)?)],
            CURVE_ON_SURFACE => {
                let model = entity.pointer(3)?;
                if model == 0 {
                    return Err(Error::format(format!(
                        "IGES curve on surface {} has no model space curve",
                        entity.de
                    )));
                }
                let member = self.entity(model)?;
                self.curve(member, depth + 1)?
            }
            other => {
                return Err(Error::format(format!(
                    "IGES entity {} of type {} is not a supported curve",
                    entity.de, other
                )));
            }
        };
        let matrix = self.matrix(entity.transform, 0)?;
        Ok(transform_edges(edges, &matrix))
    }

    /// Unit normal of a 108 plane with its own matrix applied
    fn plane_normal(&mut self, plane: &IgesEntity) -> Result<Vector3<f64>> {
        let matrix = self.matrix(plane.transform, 0)?;
        let normal = Vector3::new(plane.real(0)?, plane.real(1)?, plane.real(2)?);
        matrix
            .transform_vector(&normal)
            .try_normalize(1e-12)
            .ok_or_else(|| Error::format(format!("IGES plane {} has a zero normal", plane.de)))
    }

    fn bounded_plane(&mut self, entity: &IgesEntity) -> Result<Option<Face>> {
        let boundary = entity.pointer(4)?;
        if boundary == 0 {
            warn!(de = entity.de, "skipping unbounded IGES plane");
            return Ok(None);
        }
        let matrix = self.matrix(entity.transform, 0)?;
        let curve = self.entity(boundary)?;
        let edges = transform_edges(self.curve(curve, 0)?, &matrix);
        let normal = self.plane_normal(entity)?;
        Ok(planar_face(vec![Wire::new(edges)], Some(normal)))
    }

    fn trimmed_surface(&mut self, entity: &IgesEntity) -> Result<Option<Face>> {
        let surface = self.entity(entity.pointer(0)?)?;
        let outer_is_natural = entity.integer(1)? == 0;
        let holes = entity.count(2)?;
        let matrix = self.matrix(entity.transform, 0)?;

        let mut loops = Vec::with_capacity(holes + 1);
        if outer_is_natural {
            if surface.entity_type == PLANE && surface.pointer(4)? != 0 {
                let boundary = self.entity(surface.pointer(4)?)?;
                let edges = self.curve(boundary, 0)?;
                let inner = self.matrix(surface.transform, 0)?;
                loops.push(Wire::new(transform_edges(edges, &(matrix * inner))));
            } else {
                warn!(
                    de = entity.de,
                    surface = surface.entity_type,
                    "skipping trimmed surface bounded by its natural boundary"
                );
                return Ok(None);
            }
        } else {
            let outer = self.entity(entity.pointer(3)?)?;
            loops.push(Wire::new(transform_edges(self.curve(outer, 0)?, &matrix)));
        }
        for i in 0..holes {
            let inner = self.entity(entity.pointer(4 + i)?)?;
            loops.push(Wire::new(transform_edges(self.curve(inner, 0)?, &matrix)));
        }

        let normal = if surface.entity_type == PLANE {
            Some(matrix.transform_vector(&self.plane_normal(surface)?))
        } else {
            warn!(
                de = entity.de,
                surface = surface.entity_type,
                "approximating IGES surface by its planar boundary"
            );
            None
        };
        Ok(planar_face(loops, normal))
    }
}

fn point(entity: &IgesEntity, start: usize) -> Result<Point3<f64>> {
    let c = entity.reals(start, 3)?;
    Ok(Point3::new(c[0], c[1], c[2]))
}

/// Counter-clockwise arc in the plane `z = ZT` of its definition space
fn circular_arc(entity: &IgesEntity) -> Result<Edge> {
    let v = entity.reals(0, 7)?;
    let (zt, center) = (v[0], Point3::new(v[1], v[2], v[0]));
    let start = Point3::new(v[3], v[4], zt);
    let end = Point3::new(v[5], v[6], zt);
    let radius = (start - center).norm();
    if radius < CLOSE_EPS {
        return Err(Error::format(format!(
            "IGES circular arc {} has zero radius",
            entity.de
        )));
    }
    let frame = Frame::at(center);
    let a0 = (start.y - center.y).atan2(start.x - center.x);
    let a1 = (end.y - center.y).atan2(end.x - center.x);
    if (start - end).norm() < CLOSE_EPS * radius.max(1.0) {
        Ok(Edge::new(Curve::Circle { frame, radius }, a0, a0 + TAU))
    } else {
        Ok(Edge::arc(frame, radius, a0, a1))
    }
}

fn copious_points(entity: &IgesEntity) -> Result<Vec<Point3<f64>>> {
    let layout = entity.integer(0)?;
    let n = entity.count(1)?;
    let mut points = Vec::with_capacity(n + 1);
    match layout {
        1 => {
            let zt = entity.real(2)?;
            let xy = entity.reals(3, 2 * n)?;
            points.extend(xy.chunks(2).map(|c| Point3::new(c[0], c[1], zt)));
        }
        2 | 3 => {
            let stride = if layout == 2 { 3 } else { 6 };
            let values = entity.reals(2, stride * n)?;
            points.extend(values.chunks(stride).map(|c| Point3::new(c[0], c[1], c[2])));
        }
        other => {
            return Err(Error::format(format!(
                "IGES copious data {} has unknown layout {}",
                entity.de, other
            )));
        }
    }
    if points.len() < 2 {
        return Err(Error::format(format!(
            "IGES copious data {} has fewer than two points",
            entity.de
        )));
    }
    if entity.form == 63 {
        close_ring(&mut points);
    }
    Ok(points)
}

fn close_ring(points: &mut Vec<Point3<f64>>) {
    if let (Some(first), Some(last)) = (points.first().copied(), points.last()) {
        if (first - last).norm() > CLOSE_EPS {
            points.push(first);
        }
    }
}

/// Control polygon of a rational B-spline; exact when the degree is one
fn control_polygon(entity: &IgesEntity) -> Result<Vec<Point3<f64>>> {
    let k = entity.count(0)?;
    let degree = entity.count(1)?;
    let knots = k + degree + 2;
    let start = 6 + knots + (k + 1);
    let values = entity.reals(start, 3 * (k + 1))?;
    if degree > 1 {
        warn!(
            de = entity.de,
            degree, "approximating B-spline curve by its control polygon"
        );
    }
    Ok(values
        .chunks(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect())
}

fn transform_edges(edges: Vec<Edge>, matrix: &Matrix4<f64>) -> Vec<Edge> {
    if *matrix == Matrix4::identity() {
        return edges;
    }
    edges.iter().map(|e| e.transformed(matrix)).collect()
}

/// Planar face through the first boundary point; the normal falls back to
/// the boundary's Newell normal
fn planar_face(loops: Vec<Wire>, normal: Option<Vector3<f64>>) -> Option<Face> {
    let outer = loops.first()?.discretize(1e-3, 0.1);
    let origin = *outer.first()?;
    let normal = match normal {
        Some(n) => n,
        None => newell_normal(&outer)?,
    };
    Some(Face::planar(Frame::new(origin, normal, None), loops))
}

/// Entity types describing geometry (as opposed to annotation or structure)
fn is_geometric(entity_type: i64) -> bool {
    ((100..=198).contains(&entity_type) && entity_type != TRANSFORMATION_MATRIX)
        || (500..=514).contains(&entity_type)
}
