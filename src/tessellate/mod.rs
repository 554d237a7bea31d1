// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Tessellation policy: shape → triangle mesh, optional normals and edges
//!
//! Output is a pure function of the shape and the parameters. Each face of
//! the shape contributes a contiguous run of triangles, recorded as a
//! [`FaceSpan`] so callers can attach face-level metadata to geometry.

use crate::error::{Error, Result};
use crate::geometry::{
    arc_segments, newell_normal, triangulation, Face, FaceBounds, Frame, ParamWindow, Shape,
    Surface, TessellatedCurve, TessellatedMesh, Triangle,
};
use crate::utils::quantize;
use ahash::AHashSet;
use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, warn};

/// Quality and feature switches for [`tessellate`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TessellationParams {
    /// Maximum distance between the surface and its triangles (linear deflection)
    pub precision: f64,
    /// Maximum angle, in radians, spanned by one segment of a curved edge
    pub angular_deflection: f64,
    pub compute_normals: bool,
    pub compute_edges: bool,
}

impl Default for TessellationParams {
    fn default() -> Self {
        Self {
            precision: 0.1,
            angular_deflection: 0.5,
            compute_normals: true,
            compute_edges: false,
        }
    }
}

impl TessellationParams {
    pub fn new(precision: f64) -> Self {
        Self {
            precision,
            ..Self::default()
        }
    }

    pub fn with_normals(mut self, compute_normals: bool) -> Self {
        self.compute_normals = compute_normals;
        self
    }

    pub fn with_edges(mut self, compute_edges: bool) -> Self {
        self.compute_edges = compute_edges;
        self
    }

    pub fn with_angular_deflection(mut self, angular_deflection: f64) -> Self {
        self.angular_deflection = angular_deflection;
        self
    }
}

/// Triangles `triangles` of the mesh belong to face `ordinal` of the shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceSpan {
    pub ordinal: usize,
    pub triangles: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tessellation {
    pub mesh: TessellatedMesh,
    /// `None` when edges were not requested
    pub edges: Option<Vec<TessellatedCurve>>,
    pub faces: Vec<FaceSpan>,
}

/// Triangulate every face of `shape`.
///
/// Fails with [`Error::Tessellation`] when the shape has no faces or when no
/// face yields a triangle. Faces that cannot be triangulated on their own are
/// logged and contribute an empty span.
pub fn tessellate(shape: &Shape, params: &TessellationParams) -> Result<Tessellation> {
    let faces = shape.faces();
    if faces.is_empty() {
        return Err(Error::tessellation(format!(
            "{} has no faces to tessellate",
            shape.kind()
        )));
    }

    let mut mesh = TessellatedMesh::new();
    let mut spans = Vec::with_capacity(faces.len());
    for (ordinal, face) in faces.iter().enumerate() {
        let start = mesh.triangle_count();
        match tessellate_face(face, params) {
            Ok(face_mesh) => mesh.merge(&face_mesh),
            Err(err) => warn!(ordinal, surface = face.surface.name(), %err, "skipping face"),
        }
        spans.push(FaceSpan {
            ordinal,
            triangles: start..mesh.triangle_count(),
        });
    }

    if mesh.is_empty() {
        return Err(Error::tessellation(format!(
            "{} faces produced no triangles",
            faces.len()
        )));
    }
    if !params.compute_normals {
        mesh.normals = None;
    }

    let edges = if params.compute_edges {
        Some(discretize_edges(shape, params))
    } else {
        None
    };

    debug!(
        faces = spans.len(),
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        edges = edges.as_ref().map_or(0, Vec::len),
        "tessellated shape"
    );

    Ok(Tessellation {
        mesh,
        edges,
        faces: spans,
    })
}

/// Polylines for every distinct edge of `shape`, failing when it has none
pub fn tessellate_curves(shape: &Shape, params: &TessellationParams) -> Result<Vec<TessellatedCurve>> {
    let curves = discretize_edges(shape, params);
    if curves.is_empty() {
        return Err(Error::tessellation(format!(
            "{} has no edges to discretize",
            shape.kind()
        )));
    }
    Ok(curves)
}

fn discretize_edges(shape: &Shape, params: &TessellationParams) -> Vec<TessellatedCurve> {
    let mut seen = AHashSet::new();
    let mut curves = Vec::new();
    for edge in shape.edges() {
        if edge.is_degenerate() {
            continue;
        }
        let points = edge.discretize(params.precision, params.angular_deflection);
        if points.len() < 2 || !seen.insert(polyline_key(&points)) {
            continue;
        }
        curves.push(TessellatedCurve::new(points));
    }
    curves
}

/// Direction-insensitive identity of a polyline
fn polyline_key(points: &[Point3<f64>]) -> Vec<[i64; 3]> {
    let forward: Vec<[i64; 3]> = points.iter().map(|p| quantize(p, 1e-6)).collect();
    let backward: Vec<[i64; 3]> = forward.iter().rev().copied().collect();
    forward.min(backward)
}

/// Triangulate a single face
pub fn tessellate_face(face: &Face, params: &TessellationParams) -> Result<TessellatedMesh> {
    match &face.bounds {
        FaceBounds::Loops(loops) => {
            let mut rings: Vec<Vec<Point3<f64>>> = loops
                .iter()
                .map(|w| open_ring(w.discretize(params.precision, params.angular_deflection)))
                .filter(|ring| ring.len() >= 3)
                .collect();
            if rings.is_empty() {
                return Err(Error::tessellation("face has no closed boundary loop"));
            }
            let frame = match &face.surface {
                Surface::Plane { frame } => *frame,
                _ => {
                    let normal = newell_normal(&rings[0])
                        .ok_or_else(|| Error::tessellation("degenerate face boundary"))?;
                    Frame::new(rings[0][0], normal, None)
                }
            };
            let outer = rings.remove(0);
            planar_mesh(face, &frame, outer, rings, params)
        }
        FaceBounds::Window(window) => Ok(grid_mesh(face, window, params)),
    }
}

fn open_ring(mut points: Vec<Point3<f64>>) -> Vec<Point3<f64>> {
    if points.len() > 1 {
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            if (first - last).norm() < 1e-9 {
                points.pop();
            }
        }
    }
    points
}

fn planar_mesh(
    face: &Face,
    frame: &Frame,
    outer: Vec<Point3<f64>>,
    holes: Vec<Vec<Point3<f64>>>,
    params: &TessellationParams,
) -> Result<TessellatedMesh> {
    let project = |ring: &[Point3<f64>]| -> Vec<Point2<f64>> {
        ring.iter()
            .map(|p| {
                let local = frame.local(p);
                Point2::new(local.x, local.y)
            })
            .collect()
    };
    let outer_2d = project(&outer);
    let holes_2d: Vec<Vec<Point2<f64>>> = holes.iter().map(|h| project(h)).collect();
    let indices = triangulation::triangulate_polygon_with_holes(&outer_2d, &holes_2d)?;

    let flat: Vec<Point2<f64>> = outer_2d.into_iter().chain(holes_2d.into_iter().flatten()).collect();
    let positions: Vec<Point3<f64>> = outer.into_iter().chain(holes.into_iter().flatten()).collect();

    let mut mesh = TessellatedMesh::with_capacity(positions.len(), indices.len());
    mesh.positions = positions;
    for [a, b, c] in indices {
        let area = triangulation::signed_area(&[flat[a], flat[b], flat[c]]);
        if area.abs() < 1e-14 {
            continue;
        }
        let mut triangle = Triangle::new([a, b, c]);
        if (area < 0.0) != face.reversed {
            triangle = triangle.flipped();
        }
        mesh.add_triangle(triangle);
    }

    if params.compute_normals {
        let normal = if face.reversed { -frame.z } else { frame.z };
        mesh.normals = Some(vec![normal; mesh.positions.len()]);
    }
    Ok(mesh)
}

fn grid_mesh(face: &Face, window: &ParamWindow, params: &TessellationParams) -> TessellatedMesh {
    let surface = &face.surface;
    let (u_radius, v_radius) = grid_radii(surface, window);
    let nu = match u_radius {
        Some(r) => arc_segments(r, window.u_span(), params.precision, params.angular_deflection),
        None => 1,
    };
    let nv = match v_radius {
        Some(r) => arc_segments(r, window.v_span(), params.precision, params.angular_deflection),
        None => 1,
    };
    let wrap_u = surface.u_period().map_or(false, |p| window.u_span() >= p - 1e-9);
    let wrap_v = surface.v_period().map_or(false, |p| window.v_span() >= p - 1e-9);
    let columns = if wrap_u { nu } else { nu + 1 };
    let rows = if wrap_v { nv } else { nv + 1 };

    let mut mesh = TessellatedMesh::with_capacity(columns * rows, nu * nv * 2);
    let mut normals = Vec::with_capacity(columns * rows);
    for j in 0..rows {
        let v = window.v.0 + window.v_span() * j as f64 / nv as f64;
        for i in 0..columns {
            let u = window.u.0 + window.u_span() * i as f64 / nu as f64;
            mesh.add_vertex(surface.point(u, v));
            normals.push(face.normal(u, v));
        }
    }

    let index = |i: usize, j: usize| (j % rows) * columns + (i % columns);
    for j in 0..nv {
        for i in 0..nu {
            let (a, b, c, d) = (index(i, j), index(i + 1, j), index(i + 1, j + 1), index(i, j + 1));
            for triangle in [Triangle::new([a, b, c]), Triangle::new([a, c, d])] {
                if triangle_area(&mesh.positions, &triangle) < 1e-12 {
                    continue;
                }
                mesh.add_triangle(if face.reversed {
                    triangle.flipped()
                } else {
                    triangle
                });
            }
        }
    }

    if params.compute_normals {
        mesh.normals = Some(normals);
    }
    mesh
}

/// Radii governing segment counts along u and v; `None` means straight
fn grid_radii(surface: &Surface, window: &ParamWindow) -> (Option<f64>, Option<f64>) {
    match surface {
        Surface::Plane { .. } => (None, None),
        Surface::Cylinder { radius, .. } => (Some(*radius), None),
        Surface::Cone {
            radius, semi_angle, ..
        } => {
            let r0 = (radius + window.v.0 * semi_angle.sin()).abs();
            let r1 = (radius + window.v.1 * semi_angle.sin()).abs();
            (Some(r0.max(r1)), None)
        }
        Surface::Sphere { radius, .. } => (Some(*radius), Some(*radius)),
        Surface::Torus {
            major_radius,
            minor_radius,
            ..
        } => (Some(major_radius + minor_radius), Some(*minor_radius)),
    }
}

fn triangle_area(positions: &[Point3<f64>], triangle: &Triangle) -> f64 {
    let [a, b, c] = triangle.indices;
    let cross: Vector3<f64> = (positions[b] - positions[a]).cross(&(positions[c] - positions[a]));
    cross.norm() / 2.0
}
