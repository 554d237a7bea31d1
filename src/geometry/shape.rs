// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Boundary-representation topology: faces, shells, solids and compounds

use super::{BoundingBox, Edge, Frame, Surface, Wire};
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rectangular region of a surface's parameter space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamWindow {
    pub u: (f64, f64),
    pub v: (f64, f64),
}

impl ParamWindow {
    pub fn new(u: (f64, f64), v: (f64, f64)) -> Self {
        Self { u, v }
    }

    pub fn u_span(&self) -> f64 {
        self.u.1 - self.u.0
    }

    pub fn v_span(&self) -> f64 {
        self.v.1 - self.v.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FaceBounds {
    /// Outer loop first, then holes; the loops lie in the face's plane
    Loops(Vec<Wire>),
    Window(ParamWindow),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub surface: Surface,
    pub bounds: FaceBounds,
    /// Material lies on the side the surface normal points to
    pub reversed: bool,
}

impl Face {
    pub fn planar(frame: Frame, loops: Vec<Wire>) -> Self {
        Self {
            surface: Surface::Plane { frame },
            bounds: FaceBounds::Loops(loops),
            reversed: false,
        }
    }

    pub fn window(surface: Surface, window: ParamWindow) -> Self {
        Self {
            surface,
            bounds: FaceBounds::Window(window),
            reversed: false,
        }
    }

    /// Planar polygon face; the normal follows the counter-clockwise order of
    /// `points`. Returns `None` when the points do not span an area.
    pub fn polygon(points: &[Point3<f64>]) -> Option<Self> {
        let normal = newell_normal(points)?;
        let frame = Frame::new(points[0], normal, Some(points[1] - points[0]));
        Some(Self::planar(frame, vec![Wire::polygon(points)]))
    }

    pub fn reverse(mut self) -> Self {
        self.reversed = !self.reversed;
        self
    }

    /// Outward unit normal at a parameter point
    pub fn normal(&self, u: f64, v: f64) -> Vector3<f64> {
        let n = self.surface.normal(u, v);
        if self.reversed {
            -n
        } else {
            n
        }
    }

    /// Edges bounding the face. Periodic seams are reported once and
    /// degenerate iso-curves (poles) are skipped.
    pub fn boundary_edges(&self) -> Vec<Edge> {
        match &self.bounds {
            FaceBounds::Loops(loops) => loops.iter().flat_map(|w| w.edges.clone()).collect(),
            FaceBounds::Window(window) => {
                let full_u = is_full_period(self.surface.u_period(), window.u_span());
                let full_v = is_full_period(self.surface.v_period(), window.v_span());
                let mut edges = Vec::new();
                let (v0, v1) = window.v;
                let (u0, u1) = window.u;
                edges.extend(self.surface.v_iso(v0, u0, u1));
                if !full_v {
                    edges.extend(self.surface.v_iso(v1, u0, u1));
                }
                edges.extend(self.surface.u_iso(u0, v0, v1));
                if !full_u {
                    edges.extend(self.surface.u_iso(u1, v0, v1));
                }
                edges
            }
        }
    }

    /// Boundary loops; window faces yield a single loop around the window
    pub fn wires(&self) -> Vec<Wire> {
        match &self.bounds {
            FaceBounds::Loops(loops) => loops.clone(),
            FaceBounds::Window(window) => {
                let (u0, u1) = window.u;
                let (v0, v1) = window.v;
                let edges = [
                    self.surface.v_iso(v0, u0, u1),
                    self.surface.u_iso(u1, v0, v1),
                    self.surface.v_iso(v1, u0, u1).map(Edge::reverse),
                    self.surface.u_iso(u0, v0, v1).map(Edge::reverse),
                ];
                vec![Wire::new(edges.into_iter().flatten().collect())]
            }
        }
    }

    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Self {
        let bounds = match &self.bounds {
            FaceBounds::Loops(loops) => {
                FaceBounds::Loops(loops.iter().map(|w| w.transformed(matrix)).collect())
            }
            FaceBounds::Window(window) => FaceBounds::Window(*window),
        };
        Self {
            surface: self.surface.transformed(matrix),
            bounds,
            reversed: self.reversed,
        }
    }
}

fn is_full_period(period: Option<f64>, span: f64) -> bool {
    period.map_or(false, |p| span >= p - 1e-9)
}

/// Newell's method; `None` for degenerate polygons
pub fn newell_normal(points: &[Point3<f64>]) -> Option<Vector3<f64>> {
    if points.len() < 3 {
        return None;
    }
    let mut normal = Vector3::zeros();
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        normal.x += (p.y - q.y) * (p.z + q.z);
        normal.y += (p.z - q.z) * (p.x + q.x);
        normal.z += (p.x - q.x) * (p.y + q.y);
    }
    normal.try_normalize(1e-12)
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Shell {
    pub faces: Vec<Face>,
    pub closed: bool,
}

impl Shell {
    pub fn new(faces: Vec<Face>, closed: bool) -> Self {
        Self { faces, closed }
    }
}

/// Solid bounded by an outer shell followed by optional void shells
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Solid {
    pub shells: Vec<Shell>,
}

impl Solid {
    pub fn new(shell: Shell) -> Self {
        Self {
            shells: vec![shell],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Vertex,
    Edge,
    Wire,
    Face,
    Shell,
    Solid,
    Compound,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vertex => "vertex",
            Self::Edge => "edge",
            Self::Wire => "wire",
            Self::Face => "face",
            Self::Shell => "shell",
            Self::Solid => "solid",
            Self::Compound => "compound",
        };
        f.write_str(name)
    }
}

/// Typed shape value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Vertex(Point3<f64>),
    Edge(Edge),
    Wire(Wire),
    Face(Face),
    Shell(Shell),
    Solid(Solid),
    Compound(Vec<Shape>),
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Vertex(_) => ShapeKind::Vertex,
            Self::Edge(_) => ShapeKind::Edge,
            Self::Wire(_) => ShapeKind::Wire,
            Self::Face(_) => ShapeKind::Face,
            Self::Shell(_) => ShapeKind::Shell,
            Self::Solid(_) => ShapeKind::Solid,
            Self::Compound(_) => ShapeKind::Compound,
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound(_))
    }

    /// Faces in exploration order; the index into this list is the face ordinal
    pub fn faces(&self) -> Vec<&Face> {
        let mut faces = Vec::new();
        self.collect_faces(&mut faces);
        faces
    }

    fn collect_faces<'a>(&'a self, out: &mut Vec<&'a Face>) {
        match self {
            Self::Face(face) => out.push(face),
            Self::Shell(shell) => out.extend(shell.faces.iter()),
            Self::Solid(solid) => out.extend(solid.shells.iter().flat_map(|s| s.faces.iter())),
            Self::Compound(children) => children.iter().for_each(|c| c.collect_faces(out)),
            Self::Vertex(_) | Self::Edge(_) | Self::Wire(_) => {}
        }
    }

    /// Free edges, wire edges and face boundaries (shared edges repeat)
    pub fn edges(&self) -> Vec<Edge> {
        match self {
            Self::Vertex(_) => Vec::new(),
            Self::Edge(edge) => vec![edge.clone()],
            Self::Wire(wire) => wire.edges.clone(),
            Self::Compound(children) => children.iter().flat_map(|c| c.edges()).collect(),
            _ => self.faces().iter().flat_map(|f| f.boundary_edges()).collect(),
        }
    }

    pub fn wires(&self) -> Vec<Wire> {
        match self {
            Self::Vertex(_) | Self::Edge(_) => Vec::new(),
            Self::Wire(wire) => vec![wire.clone()],
            Self::Compound(children) => children.iter().flat_map(|c| c.wires()).collect(),
            _ => self.faces().iter().flat_map(|f| f.wires()).collect(),
        }
    }

    pub fn shells(&self) -> Vec<&Shell> {
        match self {
            Self::Shell(shell) => vec![shell],
            Self::Solid(solid) => solid.shells.iter().collect(),
            Self::Compound(children) => children.iter().flat_map(|c| c.shells()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn solids(&self) -> Vec<&Solid> {
        match self {
            Self::Solid(solid) => vec![solid],
            Self::Compound(children) => children.iter().flat_map(|c| c.solids()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn vertices(&self) -> Vec<Point3<f64>> {
        match self {
            Self::Vertex(p) => vec![*p],
            Self::Compound(children) => children.iter().flat_map(|c| c.vertices()).collect(),
            _ => self.edges().iter().flat_map(|e| [e.start(), e.end()]).collect(),
        }
    }

    pub fn face_count(&self) -> usize {
        self.faces().len()
    }

    /// True when the shape carries no geometry at all
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Vertex(_) | Self::Edge(_) => false,
            Self::Wire(wire) => wire.edges.is_empty(),
            Self::Face(_) => false,
            Self::Shell(shell) => shell.faces.is_empty(),
            Self::Solid(solid) => solid.shells.iter().all(|s| s.faces.is_empty()),
            Self::Compound(children) => children.iter().all(Shape::is_empty),
        }
    }

    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Self {
        let shell = |s: &Shell| Shell {
            faces: s.faces.iter().map(|f| f.transformed(matrix)).collect(),
            closed: s.closed,
        };
        match self {
            Self::Vertex(p) => Self::Vertex(matrix.transform_point(p)),
            Self::Edge(edge) => Self::Edge(edge.transformed(matrix)),
            Self::Wire(wire) => Self::Wire(wire.transformed(matrix)),
            Self::Face(face) => Self::Face(face.transformed(matrix)),
            Self::Shell(s) => Self::Shell(shell(s)),
            Self::Solid(solid) => Self::Solid(Solid {
                shells: solid.shells.iter().map(shell).collect(),
            }),
            Self::Compound(children) => {
                Self::Compound(children.iter().map(|c| c.transformed(matrix)).collect())
            }
        }
    }

    /// Approximate bounds from vertices, edge samples and face samples
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        for p in self.vertices() {
            bbox.expand_to_include(&p);
        }
        for edge in self.edges() {
            for p in edge.discretize(f64::INFINITY, 0.5) {
                bbox.expand_to_include(&p);
            }
        }
        for face in self.faces() {
            if let FaceBounds::Window(window) = &face.bounds {
                const STEPS: usize = 8;
                for i in 0..=STEPS {
                    for j in 0..=STEPS {
                        let u = window.u.0 + window.u_span() * i as f64 / STEPS as f64;
                        let v = window.v.0 + window.v_span() * j as f64 / STEPS as f64;
                        bbox.expand_to_include(&face.surface.point(u, v));
                    }
                }
            }
        }
        bbox
    }
}

impl From<Solid> for Shape {
    fn from(solid: Solid) -> Self {
        Self::Solid(solid)
    }
}

impl From<Shell> for Shape {
    fn from(shell: Shell) -> Self {
        Self::Shell(shell)
    }
}

impl From<Face> for Shape {
    fn from(face: Face) -> Self {
        Self::Face(face)
    }
}

impl From<Edge> for Shape {
    fn from(edge: Edge) -> Self {
        Self::Edge(edge)
    }
}

impl From<Wire> for Shape {
    fn from(wire: Wire) -> Self {
        Self::Wire(wire)
    }
}
