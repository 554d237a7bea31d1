// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! STEP writer: one product with a B-rep shape representation

use super::parser::encode_string;
use crate::error::{Error, Result};
use crate::geometry::{Curve, Edge, Face, FaceBounds, Frame, Shape, Shell, Surface, Wire};
use crate::utils::{format_real as real, math};
use ahash::AHashMap;
use chrono::Utc;
use nalgebra::{Point3, Vector3};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use tracing::debug;

/// Application protocol of a written file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum StepProtocol {
    #[serde(rename = "AP203")]
    Ap203,
    #[default]
    #[serde(rename = "AP214IS")]
    Ap214,
    #[serde(rename = "AP242DIS")]
    Ap242,
}

impl StepProtocol {
    pub fn schema(&self) -> &'static str {
        match self {
            Self::Ap203 => "CONFIG_CONTROL_DESIGN",
            Self::Ap214 => "AUTOMOTIVE_DESIGN { 1 0 10303 214 1 1 1 1 }",
            Self::Ap242 => "AP242_MANAGED_MODEL_BASED_3D_ENGINEERING_MIM_LF { 1 0 10303 442 1 1 4 }",
        }
    }

    fn application(&self) -> (&'static str, &'static str, u32) {
        match self {
            Self::Ap203 => (
                "configuration controlled 3d designs of mechanical parts and assemblies",
                "config_control_design",
                1994,
            ),
            Self::Ap214 => (
                "core data for automotive mechanical design processes",
                "automotive_design",
                2000,
            ),
            Self::Ap242 => (
                "managed model based 3d engineering",
                "ap242_managed_model_based_3d_engineering",
                2014,
            ),
        }
    }
}

impl fmt::Display for StepProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ap203 => "AP203",
            Self::Ap214 => "AP214IS",
            Self::Ap242 => "AP242DIS",
        })
    }
}

impl FromStr for StepProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AP203" => Ok(Self::Ap203),
            "AP214IS" => Ok(Self::Ap214),
            "AP242DIS" => Ok(Self::Ap242),
            _ => Err(Error::format(format!(
                "unsupported application protocol '{}', expected AP203, AP214IS or AP242DIS",
                s
            ))),
        }
    }
}

/// Serialize `shape` as a complete exchange structure
pub fn write_step(shape: &Shape, protocol: StepProtocol, name: &str) -> Result<String> {
    if shape.is_empty() {
        return Err(Error::format("cannot write an empty shape to STEP"));
    }

    let mut writer = StepWriter::new();
    let context = writer.context(protocol, name);
    let origin = writer.placement(&Frame::world());

    let mut items = Vec::new();
    let mut only_solids = true;
    writer.collect_items(shape, &mut items, &mut only_solids);
    if items.is_empty() {
        return Err(Error::format(format!(
            "{} has no faces or curves to write",
            shape.kind()
        )));
    }

    let kind = if only_solids {
        "ADVANCED_BREP_SHAPE_REPRESENTATION"
    } else {
        "SHAPE_REPRESENTATION"
    };
    let refs = std::iter::once(origin)
        .chain(items.iter().copied())
        .map(|id| format!("#{}", id))
        .collect::<Vec<_>>()
        .join(",");
    let representation = writer.add_entity(format!(
        "{}({},({}),#{})",
        kind,
        encode_string(name),
        refs,
        context.geometry
    ));
    writer.add_entity(format!(
        "SHAPE_DEFINITION_REPRESENTATION(#{},#{})",
        context.shape_definition, representation
    ));

    debug!(
        protocol = %protocol,
        entities = writer.entities.len(),
        items = items.len(),
        "serialized STEP"
    );
    Ok(writer.finish(protocol, name))
}

/// Ids of the product and context entities the representation hangs on
struct ProductContext {
    shape_definition: usize,
    geometry: usize,
}

type PointKey = [i64; 3];

struct StepWriter {
    entities: Vec<String>,
    next_id: usize,
    vertices: AHashMap<PointKey, usize>,
    edges: AHashMap<[PointKey; 3], usize>,
}

impl StepWriter {
    fn new() -> Self {
        Self {
            entities: Vec::new(),
            next_id: 1,
            vertices: AHashMap::new(),
            edges: AHashMap::new(),
        }
    }

    fn add_entity(&mut self, entity: String) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.push(format!("#{}={};", id, entity));
        id
    }

    fn context(&mut self, protocol: StepProtocol, name: &str) -> ProductContext {
        let (description, schema_name, year) = protocol.application();
        let application = self.add_entity(format!("APPLICATION_CONTEXT('{}')", description));
        self.add_entity(format!(
            "APPLICATION_PROTOCOL_DEFINITION('international standard','{}',{},#{})",
            schema_name, year, application
        ));
        let product_context = self.add_entity(format!(
            "PRODUCT_CONTEXT('',#{},'mechanical')",
            application
        ));
        let quoted = encode_string(name);
        let product = self.add_entity(format!(
            "PRODUCT({},{},'',(#{}))",
            quoted, quoted, product_context
        ));
        self.add_entity(format!("PRODUCT_RELATED_PRODUCT_CATEGORY('part',$,(#{}))", product));
        let formation = match protocol {
            StepProtocol::Ap203 => self.add_entity(format!(
                "PRODUCT_DEFINITION_FORMATION_WITH_SPECIFIED_SOURCE('','',#{},.NOT_KNOWN.)",
                product
            )),
            _ => self.add_entity(format!("PRODUCT_DEFINITION_FORMATION('','',#{})", product)),
        };
        let definition_context = self.add_entity(format!(
            "PRODUCT_DEFINITION_CONTEXT('part definition',#{},'design')",
            application
        ));
        let definition = self.add_entity(format!(
            "PRODUCT_DEFINITION('design','',#{},#{})",
            formation, definition_context
        ));
        let shape_definition = self.add_entity(format!(
            "PRODUCT_DEFINITION_SHAPE('','',#{})",
            definition
        ));

        let length = self.add_entity("(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT(.MILLI.,.METRE.))".into());
        let angle = self.add_entity("(NAMED_UNIT(*)PLANE_ANGLE_UNIT()SI_UNIT($,.RADIAN.))".into());
        let solid_angle =
            self.add_entity("(NAMED_UNIT(*)SI_UNIT($,.STERADIAN.)SOLID_ANGLE_UNIT())".into());
        let uncertainty = self.add_entity(format!(
            "UNCERTAINTY_MEASURE_WITH_UNIT(LENGTH_MEASURE(1.E-07),#{},'distance_accuracy_value','confusion accuracy')",
            length
        ));
        let geometry = self.add_entity(format!(
            "(GEOMETRIC_REPRESENTATION_CONTEXT(3)GLOBAL_UNCERTAINTY_ASSIGNED_CONTEXT((#{}))GLOBAL_UNIT_ASSIGNED_CONTEXT((#{},#{},#{}))REPRESENTATION_CONTEXT('Context #1','3D Context with UNIT and UNCERTAINTY'))",
            uncertainty, length, angle, solid_angle
        ));
        ProductContext {
            shape_definition,
            geometry,
        }
    }

    fn finish(self, protocol: StepProtocol, name: &str) -> String {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S");
        let mut out = String::new();
        out.push_str("ISO-10303-21;\nHEADER;\n");
        out.push_str("FILE_DESCRIPTION(('cadex model'),'2;1');\n");
        let _ = writeln!(
            out,
            "FILE_NAME({},'{}',(''),(''),'cadex {}','cadex','');",
            encode_string(name),
            timestamp,
            env!("CARGO_PKG_VERSION")
        );
        let _ = writeln!(out, "FILE_SCHEMA(('{}'));", protocol.schema());
        out.push_str("ENDSEC;\nDATA;\n");
        for entity in &self.entities {
            out.push_str(entity);
            out.push('\n');
        }
        out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
        out
    }

    // ---- shape items -----------------------------------------------------------

    fn collect_items(&mut self, shape: &Shape, items: &mut Vec<usize>, only_solids: &mut bool) {
        match shape {
            Shape::Compound(children) => {
                for child in children {
                    self.collect_items(child, items, only_solids);
                }
            }
            Shape::Solid(solid) => {
                let mut shells = solid.shells.iter().filter(|s| !s.faces.is_empty());
                let Some(outer) = shells.next() else {
                    return;
                };
                let outer = self.shell(outer, true);
                let voids: Vec<usize> = shells
                    .map(|s| {
                        let shell = self.shell(s, true);
                        self.add_entity(format!("ORIENTED_CLOSED_SHELL('',*,#{},.F.)", shell))
                    })
                    .collect();
                let brep = if voids.is_empty() {
                    self.add_entity(format!("MANIFOLD_SOLID_BREP('',#{})", outer))
                } else {
                    self.add_entity(format!(
                        "BREP_WITH_VOIDS('',#{},({}))",
                        outer,
                        join_refs(&voids)
                    ))
                };
                items.push(brep);
            }
            Shape::Shell(shell) => {
                *only_solids = false;
                if !shell.faces.is_empty() {
                    let shell = self.shell(shell, shell.closed);
                    items.push(self.add_entity(format!("SHELL_BASED_SURFACE_MODEL('',(#{}))", shell)));
                }
            }
            Shape::Face(face) => {
                *only_solids = false;
                let single = Shell::new(vec![face.clone()], false);
                let shell = self.shell(&single, false);
                items.push(self.add_entity(format!("SHELL_BASED_SURFACE_MODEL('',(#{}))", shell)));
            }
            Shape::Edge(_) | Shape::Wire(_) => {
                *only_solids = false;
                let curves: Vec<usize> = shape
                    .edges()
                    .iter()
                    .filter(|e| !e.is_degenerate())
                    .map(|e| self.bounded_curve(e))
                    .collect();
                if !curves.is_empty() {
                    items.push(self.add_entity(format!("GEOMETRIC_CURVE_SET('',({}))", join_refs(&curves))));
                }
            }
            Shape::Vertex(_) => *only_solids = false,
        }
    }

    fn shell(&mut self, shell: &Shell, closed: bool) -> usize {
        let faces: Vec<usize> = shell.faces.iter().filter_map(|f| self.face(f)).collect();
        let kind = if closed { "CLOSED_SHELL" } else { "OPEN_SHELL" };
        self.add_entity(format!("{}('',({}))", kind, join_refs(&faces)))
    }

    fn face(&mut self, face: &Face) -> Option<usize> {
        let wires: Vec<Wire> = match &face.bounds {
            FaceBounds::Loops(loops) => loops.clone(),
            FaceBounds::Window(_) => face.wires(),
        };
        let mut bounds = Vec::new();
        for (i, wire) in wires.iter().enumerate() {
            let edges = self.oriented_edges(wire);
            if edges.is_empty() {
                continue;
            }
            let edge_loop = self.add_entity(format!("EDGE_LOOP('',({}))", join_refs(&edges)));
            let kind = if i == 0 { "FACE_OUTER_BOUND" } else { "FACE_BOUND" };
            bounds.push(self.add_entity(format!("{}('',#{},.T.)", kind, edge_loop)));
        }
        if bounds.is_empty() {
            return None;
        }
        let surface = self.surface(&face.surface);
        Some(self.add_entity(format!(
            "ADVANCED_FACE('',({}),#{},{})",
            join_refs(&bounds),
            surface,
            logical(!face.reversed)
        )))
    }

    fn oriented_edges(&mut self, wire: &Wire) -> Vec<usize> {
        let mut out = Vec::new();
        for edge in &wire.edges {
            if edge.is_degenerate() {
                continue;
            }
            if let Curve::Polyline { .. } = edge.curve {
                // Written as one straight edge per segment
                for pair in edge.discretize(f64::INFINITY, 1.0).windows(2) {
                    let segment = Edge::line(pair[0], pair[1]);
                    if !segment.is_degenerate() {
                        out.push(self.oriented_edge(&segment));
                    }
                }
            } else {
                out.push(self.oriented_edge(edge));
            }
        }
        out
    }

    fn oriented_edge(&mut self, edge: &Edge) -> usize {
        let start = edge.curve.point(edge.first);
        let mid = edge.curve.point(0.5 * (edge.first + edge.last));
        let end = edge.curve.point(edge.last);
        let key = [quantize(&start), quantize(&mid), quantize(&end)];
        let flipped = [key[2], key[1], key[0]];

        let (edge_curve, same) = if let Some(&id) = self.edges.get(&key) {
            (id, true)
        } else if let Some(&id) = self.edges.get(&flipped) {
            (id, false)
        } else {
            let v0 = self.vertex(&start);
            let v1 = self.vertex(&end);
            let curve = self.curve(&edge.curve, &start, &end);
            let id = self.add_entity(format!("EDGE_CURVE('',#{},#{},#{},.T.)", v0, v1, curve));
            self.edges.insert(key, id);
            (id, true)
        };
        let orientation = same != edge.reversed;
        self.add_entity(format!(
            "ORIENTED_EDGE('',*,*,#{},{})",
            edge_curve,
            logical(orientation)
        ))
    }

    /// Trimmed curve for a free edge
    fn bounded_curve(&mut self, edge: &Edge) -> usize {
        match &edge.curve {
            Curve::Polyline { .. } => {
                let points: Vec<usize> = edge
                    .discretize(f64::INFINITY, 1.0)
                    .iter()
                    .map(|p| self.point(p))
                    .collect();
                self.add_entity(format!("POLYLINE('',({}))", join_refs(&points)))
            }
            curve => {
                let (start, end) = (edge.start(), edge.end());
                let basis = self.curve(curve, &start, &end);
                let p0 = self.point(&edge.curve.point(edge.first));
                let p1 = self.point(&edge.curve.point(edge.last));
                let (t0, t1) = if edge.reversed { (p1, p0) } else { (p0, p1) };
                self.add_entity(format!(
                    "TRIMMED_CURVE('',#{},(#{}),(#{}),{},.CARTESIAN.)",
                    basis,
                    t0,
                    t1,
                    logical(!edge.reversed)
                ))
            }
        }
    }

    fn curve(&mut self, curve: &Curve, start: &Point3<f64>, end: &Point3<f64>) -> usize {
        match curve {
            Curve::Line { origin, direction } => {
                let origin = self.point(origin);
                let direction = self.direction(direction);
                let vector = self.add_entity(format!("VECTOR('',#{},1.)", direction));
                self.add_entity(format!("LINE('',#{},#{})", origin, vector))
            }
            Curve::Circle { frame, radius } => {
                let placement = self.placement(frame);
                self.add_entity(format!("CIRCLE('',#{},{})", placement, real(*radius)))
            }
            Curve::Polyline { .. } => {
                let a = self.point(start);
                let b = self.point(end);
                self.add_entity(format!("POLYLINE('',(#{},#{}))", a, b))
            }
        }
    }

    fn surface(&mut self, surface: &Surface) -> usize {
        let placement = self.placement(surface.frame());
        let entity = match surface {
            Surface::Plane { .. } => format!("PLANE('',#{})", placement),
            Surface::Cylinder { radius, .. } => {
                format!("CYLINDRICAL_SURFACE('',#{},{})", placement, real(*radius))
            }
            Surface::Cone {
                radius, semi_angle, ..
            } => format!(
                "CONICAL_SURFACE('',#{},{},{})",
                placement,
                real(*radius),
                real(*semi_angle)
            ),
            Surface::Sphere { radius, .. } => {
                format!("SPHERICAL_SURFACE('',#{},{})", placement, real(*radius))
            }
            Surface::Torus {
                major_radius,
                minor_radius,
                ..
            } => format!(
                "TOROIDAL_SURFACE('',#{},{},{})",
                placement,
                real(*major_radius),
                real(*minor_radius)
            ),
        };
        self.add_entity(entity)
    }

    fn vertex(&mut self, p: &Point3<f64>) -> usize {
        let key = quantize(p);
        if let Some(&id) = self.vertices.get(&key) {
            return id;
        }
        let point = self.point(p);
        let id = self.add_entity(format!("VERTEX_POINT('',#{})", point));
        self.vertices.insert(key, id);
        id
    }

    fn point(&mut self, p: &Point3<f64>) -> usize {
        self.add_entity(format!(
            "CARTESIAN_POINT('',({},{},{}))",
            real(p.x),
            real(p.y),
            real(p.z)
        ))
    }

    fn direction(&mut self, d: &Vector3<f64>) -> usize {
        self.add_entity(format!(
            "DIRECTION('',({},{},{}))",
            real(d.x),
            real(d.y),
            real(d.z)
        ))
    }

    fn placement(&mut self, frame: &Frame) -> usize {
        let origin = self.point(&frame.origin);
        let axis = self.direction(&frame.z);
        let reference = self.direction(&frame.x);
        self.add_entity(format!(
            "AXIS2_PLACEMENT_3D('',#{},#{},#{})",
            origin, axis, reference
        ))
    }
}

fn quantize(p: &Point3<f64>) -> PointKey {
    math::quantize(p, 1e-7)
}

fn join_refs(ids: &[usize]) -> String {
    ids.iter()
        .map(|id| format!("#{}", id))
        .collect::<Vec<_>>()
        .join(",")
}

fn logical(value: bool) -> &'static str {
    if value {
        ".T."
    } else {
        ".F."
    }
}
