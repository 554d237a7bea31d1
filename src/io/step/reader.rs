// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! STEP reader: B-rep geometry, product structure and presentation colors

use super::parser::{Entity, Record, StepFile, Value};
use crate::document::{Document, DocumentNode, NodeId, Rgb, MAX_DEPTH};
use crate::error::{Error, Result};
use crate::utils::deg_to_rad;
use crate::geometry::{
    newell_normal, BoundingBox, Curve, Edge, Face, FaceBounds, Frame, ParamWindow, Shape, Shell,
    Solid, Surface, Wire,
};
use ahash::{AHashMap, AHashSet};
use nalgebra::{Matrix4, Point3, Vector3};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use tracing::{debug, warn};

/// Angular step used when sampling face boundaries into parameter space
const SAMPLE_ANGLE: f64 = 0.05;
/// Largest parameter gap still treated as sampling noise on a full period
const FULL_PERIOD_GAP: f64 = 2.5 * SAMPLE_ANGLE;
const AXIS_EPS: f64 = 1e-7;
const COLOR_SEARCH_DEPTH: usize = 16;

const SHAPE_ITEMS: [&str; 11] = [
    "MANIFOLD_SOLID_BREP",
    "FACETED_BREP",
    "BREP_WITH_VOIDS",
    "SHELL_BASED_SURFACE_MODEL",
    "CLOSED_SHELL",
    "OPEN_SHELL",
    "ORIENTED_CLOSED_SHELL",
    "ADVANCED_FACE",
    "FACE_SURFACE",
    "GEOMETRIC_CURVE_SET",
    "GEOMETRIC_SET",
];

/// Geometry decoded from one representation item
struct Part {
    item: u64,
    shape: Shape,
    /// Face entities in the shape's face exploration order
    faces: Vec<u64>,
    shells: Vec<u64>,
}

enum Bound {
    Loop(Wire),
    Vertex(Point3<f64>),
}

/// Assembly links between product definitions
#[derive(Default)]
struct ProductStructure {
    /// Product definition -> representations attached by shape definitions
    representations: AHashMap<u64, Vec<u64>>,
    /// Parent product definition -> (usage occurrence, child definition)
    children: AHashMap<u64, Vec<(u64, u64)>>,
    /// Usage occurrence -> representation relationship carrying its placement
    placements: AHashMap<u64, u64>,
    /// Representations related without a transformation
    links: AHashMap<u64, Vec<u64>>,
    roots: Vec<u64>,
}

/// Parse STEP text into an assembly document
pub fn read_document(source: &str, name: Option<String>) -> Result<Document> {
    let file = StepFile::parse(source)?;
    debug!(
        entities = file.entities.len(),
        schema = file.schema().unwrap_or("unknown"),
        "parsed STEP exchange structure"
    );
    StepReader::new(&file).document(name)
}

struct StepReader<'a> {
    file: &'a StepFile,
    angle_factor: f64,
    colors: AHashMap<u64, Rgb>,
    /// Part nodes already transferred per product definition
    templates: AHashMap<u64, Vec<DocumentNode>>,
    warned: AHashSet<String>,
}

impl<'a> StepReader<'a> {
    fn new(file: &'a StepFile) -> Self {
        let mut reader = Self {
            file,
            angle_factor: plane_angle_factor(file),
            colors: AHashMap::new(),
            templates: AHashMap::new(),
            warned: AHashSet::new(),
        };
        reader.collect_colors();
        reader
    }

    fn document(mut self, name: Option<String>) -> Result<Document> {
        let mut document = Document::new();
        document.name = name;

        let structure = self.product_structure();
        for &root in &structure.roots {
            if let Some(node) = self.product_node(&mut document, &structure, root, 1)? {
                document.add_root(node)?;
            }
        }

        if document.root_ids().is_empty() {
            debug!("no product structure with geometry, using free shape items");
            let file = self.file;
            let free: Vec<u64> = file
                .entities
                .values()
                .filter(|e| {
                    [
                        "MANIFOLD_SOLID_BREP",
                        "FACETED_BREP",
                        "BREP_WITH_VOIDS",
                        "SHELL_BASED_SURFACE_MODEL",
                        "GEOMETRIC_CURVE_SET",
                    ]
                        .iter()
                        .any(|t| e.is(t))
                })
                .map(|e| e.id)
                .collect();
            for id in free {
                if let Some(part) = self.shape_item(id)? {
                    let name = file
                        .get(id)
                        .and_then(|e| e.records.first())
                        .and_then(|r| r.string(0))
                        .filter(|s| !s.is_empty())
                        .map(str::to_string);
                    let node = self.part_node(&mut document, part, name);
                    let node = document.add_node(node);
                    document.add_root(node)?;
                }
            }
        }

        if document.root_ids().is_empty() {
            return Err(Error::format("STEP file contains no transferable root shape"));
        }
        document.validate()?;
        debug!(
            roots = document.root_ids().len(),
            nodes = document.node_count(),
            shapes = document.shapes().len(),
            "transferred STEP document"
        );
        Ok(document)
    }

    fn entity(&self, id: u64) -> Result<&'a Entity> {
        let file = self.file;
        file.get(id)
            .ok_or_else(|| Error::format(format!("reference to missing entity #{}", id)))
    }

    /// The record of a simple instance of type `name`
    fn expect(&self, id: u64, name: &str) -> Result<&'a Record> {
        let entity = self.entity(id)?;
        entity.record(name).ok_or_else(|| {
            Error::format(format!(
                "entity #{} is {}, expected {}",
                id,
                entity.name(),
                name
            ))
        })
    }

    fn unsupported(&mut self, id: u64, name: &str) {
        if self.warned.insert(name.to_string()) {
            warn!(entity = id, kind = name, "unsupported STEP entity approximated or skipped");
        }
    }

    // ---- product structure -------------------------------------------------

    fn product_structure(&self) -> ProductStructure {
        let file = self.file;
        let mut structure = ProductStructure::default();
        let mut related = AHashSet::new();

        for entity in file.entities.values() {
            if let Some(sdr) = entity.record("SHAPE_DEFINITION_REPRESENTATION") {
                let pd = sdr.entity(0).and_then(|pds| self.shape_definition(pds));
                if let (Some(pd), Some(rep)) = (pd, sdr.entity(1)) {
                    structure.representations.entry(pd).or_default().push(rep);
                }
            } else if let Some(nauo) = entity.record("NEXT_ASSEMBLY_USAGE_OCCURRENCE") {
                if let (Some(parent), Some(child)) = (nauo.entity(3), nauo.entity(4)) {
                    structure
                        .children
                        .entry(parent)
                        .or_default()
                        .push((entity.id, child));
                    related.insert(child);
                }
            } else if let Some(cdsr) = entity.record("CONTEXT_DEPENDENT_SHAPE_REPRESENTATION") {
                let occurrence = cdsr.entity(1).and_then(|pds| self.shape_definition(pds));
                if let (Some(occurrence), Some(relation)) = (occurrence, cdsr.entity(0)) {
                    structure.placements.insert(occurrence, relation);
                }
            } else if !entity.is("REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION") {
                let relation = entity
                    .record("SHAPE_REPRESENTATION_RELATIONSHIP")
                    .or_else(|| entity.record("REPRESENTATION_RELATIONSHIP"));
                if let Some((a, b)) = relation.and_then(|r| r.entity(2).zip(r.entity(3))) {
                    structure.links.entry(a).or_default().push(b);
                    structure.links.entry(b).or_default().push(a);
                }
            }
        }

        structure.roots = file
            .of_type("PRODUCT_DEFINITION")
            .map(|e| e.id)
            .filter(|id| !related.contains(id))
            .collect();
        structure
    }

    /// Product definition or usage occurrence behind a product definition shape
    fn shape_definition(&self, pds: u64) -> Option<u64> {
        self.file
            .get(pds)?
            .record("PRODUCT_DEFINITION_SHAPE")?
            .entity(2)
    }

    fn product_name(&self, pd: u64) -> Option<String> {
        let file = self.file;
        let formation = file.get(pd)?.records.first()?.entity(2)?;
        let product = file.get(formation)?.records.first()?.entity(2)?;
        let product = file.get(product)?.record("PRODUCT")?;
        [product.string(1), product.string(0)]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .map(str::to_string)
    }

    /// Representations of a product definition, following plain relationships
    fn representations(&self, structure: &ProductStructure, pd: u64) -> Vec<u64> {
        let mut seen = AHashSet::new();
        let mut out = Vec::new();
        let mut queue: Vec<u64> = structure
            .representations
            .get(&pd)
            .cloned()
            .unwrap_or_default();
        queue.reverse();
        while let Some(rep) = queue.pop() {
            if !seen.insert(rep) {
                continue;
            }
            out.push(rep);
            if let Some(linked) = structure.links.get(&rep) {
                queue.extend(linked.iter().rev());
            }
        }
        out
    }

    fn product_node(
        &mut self,
        document: &mut Document,
        structure: &ProductStructure,
        pd: u64,
        depth: usize,
    ) -> Result<Option<NodeId>> {
        if depth > MAX_DEPTH {
            return Err(Error::structure(format!(
                "product structure deeper than {} levels at #{}",
                MAX_DEPTH, pd
            )));
        }

        let name = self.product_name(pd);
        let parts = match self.templates.get(&pd) {
            Some(parts) => parts.clone(),
            None => {
                let mut parts = Vec::new();
                for rep in self.representations(structure, pd) {
                    for part in self.items(rep, 0)? {
                        parts.push(self.part_node(document, part, name.clone()));
                    }
                }
                self.templates.insert(pd, parts.clone());
                parts
            }
        };

        let mut children = Vec::new();
        let occurrences = structure.children.get(&pd).cloned().unwrap_or_default();
        if occurrences.is_empty() && parts.len() == 1 {
            return Ok(parts.into_iter().next().map(|node| document.add_node(node)));
        }

        for node in parts {
            children.push(document.add_node(node));
        }
        for (occurrence, child) in occurrences {
            if let Some(node) = self.product_node(document, structure, child, depth + 1)? {
                document.node_mut(node)?.transform =
                    self.occurrence_transform(structure, occurrence, child)?;
                children.push(node);
            }
        }
        if children.is_empty() {
            return Ok(None);
        }

        let node = document.add_node(DocumentNode::new(name));
        for child in children {
            document.add_child(node, child)?;
        }
        Ok(Some(node))
    }

    fn part_node(&self, document: &mut Document, part: Part, name: Option<String>) -> DocumentNode {
        let color = self
            .colors
            .get(&part.item)
            .or_else(|| part.shells.iter().find_map(|s| self.colors.get(s)))
            .copied();
        let shape = document.add_shape(part.shape);
        for (ordinal, face) in part.faces.iter().enumerate() {
            if let Some(&face_color) = self.colors.get(face) {
                document.set_face_color(shape, ordinal, face_color);
            }
        }
        DocumentNode::new(name).with_shape(shape).with_color(color)
    }

    /// Placement of a child occurrence inside its parent
    fn occurrence_transform(
        &mut self,
        structure: &ProductStructure,
        occurrence: u64,
        child: u64,
    ) -> Result<Matrix4<f64>> {
        let Some(&relation) = structure.placements.get(&occurrence) else {
            return Ok(Matrix4::identity());
        };
        let entity = self.entity(relation)?;
        let base = entity
            .record("REPRESENTATION_RELATIONSHIP")
            .or_else(|| entity.record("SHAPE_REPRESENTATION_RELATIONSHIP"));
        let transformation = entity
            .record("REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION")
            .and_then(|r| r.entity(0));
        let (Some(base), Some(transformation)) = (base, transformation) else {
            return Ok(Matrix4::identity());
        };

        let operator = self.entity(transformation)?;
        let Some(idt) = operator.record("ITEM_DEFINED_TRANSFORMATION") else {
            self.unsupported(transformation, operator.name());
            return Ok(Matrix4::identity());
        };
        let from = self.placement_matrix(required(idt.entity(2), transformation, "transform_item_1")?)?;
        let to = self.placement_matrix(required(idt.entity(3), transformation, "transform_item_2")?)?;

        let child_reps = self.representations(structure, child);
        let child_first = base.entity(2).map_or(true, |rep| child_reps.contains(&rep));
        Ok(if child_first {
            to * rigid_inverse(&from)
        } else {
            from * rigid_inverse(&to)
        })
    }

    // ---- presentation -------------------------------------------------------

    fn collect_colors(&mut self) {
        let file = self.file;
        for entity in file.entities.values() {
            let overriding = entity.is("OVER_RIDING_STYLED_ITEM");
            let Some(styled) = entity
                .record("STYLED_ITEM")
                .or_else(|| entity.record("OVER_RIDING_STYLED_ITEM"))
            else {
                continue;
            };
            let Some(item) = styled.entity(2) else {
                continue;
            };
            let mut visited = AHashSet::new();
            let Some(color) = styled
                .param(1)
                .and_then(|styles| self.find_color(styles, 0, &mut visited))
            else {
                continue;
            };
            if overriding {
                self.colors.insert(item, color);
            } else {
                self.colors.entry(item).or_insert(color);
            }
        }
        debug!(styled = self.colors.len(), "collected presentation colors");
    }

    fn find_color(&self, value: &Value, depth: usize, visited: &mut AHashSet<u64>) -> Option<Rgb> {
        if depth > COLOR_SEARCH_DEPTH {
            return None;
        }
        match value {
            Value::List(items) | Value::Typed(_, items) => items
                .iter()
                .find_map(|v| self.find_color(v, depth + 1, visited)),
            Value::Ref(id) => {
                if !visited.insert(*id) {
                    return None;
                }
                let entity = self.file.get(*id)?;
                if let Some(rgb) = entity.record("COLOUR_RGB") {
                    return Some(Rgb::new(rgb.real(1)?, rgb.real(2)?, rgb.real(3)?));
                }
                if let Some(named) = entity.record("DRAUGHTING_PRE_DEFINED_COLOUR") {
                    return named.string(0).and_then(predefined_color);
                }
                entity
                    .records
                    .iter()
                    .flat_map(|r| r.params.iter())
                    .find_map(|v| self.find_color(v, depth + 1, visited))
            }
            _ => None,
        }
    }

    // ---- representation items ----------------------------------------------

    fn items(&mut self, rep: u64, depth: usize) -> Result<Vec<Part>> {
        if depth > MAX_DEPTH {
            return Err(Error::structure(format!(
                "mapped items nested deeper than {} levels at #{}",
                MAX_DEPTH, rep
            )));
        }
        let entity = self.entity(rep)?;
        let Some(record) = entity
            .records
            .iter()
            .find(|r| r.name.ends_with("REPRESENTATION"))
        else {
            return Ok(Vec::new());
        };

        let mut parts = Vec::new();
        for item in record.refs(1) {
            let item_entity = self.entity(item)?;
            if let Some(mapped) = item_entity.record("MAPPED_ITEM") {
                let map = self.expect(required(mapped.entity(1), item, "mapping_source")?, "REPRESENTATION_MAP")?;
                let origin = self.placement_matrix(required(map.entity(0), item, "mapping_origin")?)?;
                let target = self.placement_matrix(required(mapped.entity(2), item, "mapping_target")?)?;
                let placement = target * rigid_inverse(&origin);
                let source = required(map.entity(1), item, "mapped_representation")?;
                for mut part in self.items(source, depth + 1)? {
                    part.shape = part.shape.transformed(&placement);
                    parts.push(part);
                }
            } else if let Some(part) = self.shape_item(item)? {
                parts.push(part);
            }
        }
        Ok(parts)
    }

    fn shape_item(&mut self, id: u64) -> Result<Option<Part>> {
        let entity = self.entity(id)?;
        let Some(kind) = SHAPE_ITEMS.iter().find(|k| entity.is(k)) else {
            return Ok(None);
        };
        let Some(record) = entity.record(kind) else {
            return Ok(None);
        };

        let part = match *kind {
            "MANIFOLD_SOLID_BREP" | "FACETED_BREP" => {
                let shell_id = required(record.entity(1), id, "outer")?;
                let (shell, faces) = self.shell(shell_id)?;
                Part {
                    item: id,
                    shape: Shape::Solid(Solid::new(shell)),
                    faces,
                    shells: vec![shell_id],
                }
            }
            "BREP_WITH_VOIDS" => {
                let outer = required(record.entity(1), id, "outer")?;
                let mut shell_ids = vec![outer];
                shell_ids.extend(record.refs(2));
                let mut shells = Vec::new();
                let mut faces = Vec::new();
                for &shell_id in &shell_ids {
                    let (shell, shell_faces) = self.shell(shell_id)?;
                    shells.push(shell);
                    faces.extend(shell_faces);
                }
                Part {
                    item: id,
                    shape: Shape::Solid(Solid { shells }),
                    faces,
                    shells: shell_ids,
                }
            }
            "SHELL_BASED_SURFACE_MODEL" => {
                let shell_ids = record.refs(1);
                let mut shells = Vec::new();
                let mut faces = Vec::new();
                for &shell_id in &shell_ids {
                    let (shell, shell_faces) = self.shell(shell_id)?;
                    shells.push(Shape::Shell(shell));
                    faces.extend(shell_faces);
                }
                let shape = match shells.len() {
                    1 => shells.remove(0),
                    _ => Shape::Compound(shells),
                };
                Part {
                    item: id,
                    shape,
                    faces,
                    shells: shell_ids,
                }
            }
            "CLOSED_SHELL" | "OPEN_SHELL" | "ORIENTED_CLOSED_SHELL" => {
                let (shell, faces) = self.shell(id)?;
                Part {
                    item: id,
                    shape: Shape::Shell(shell),
                    faces,
                    shells: vec![id],
                }
            }
            "GEOMETRIC_CURVE_SET" | "GEOMETRIC_SET" => {
                let mut edges = Vec::new();
                for element in record.refs(1) {
                    edges.extend(self.free_curve(element)?);
                }
                let shape = match edges.len() {
                    0 => return Ok(None),
                    1 => Shape::Edge(edges.remove(0)),
                    _ => {
                        let wire = Wire::new(edges);
                        let connected = wire
                            .edges
                            .windows(2)
                            .all(|w| (w[0].end() - w[1].start()).norm() < 1e-6);
                        if connected {
                            Shape::Wire(wire)
                        } else {
                            Shape::Compound(wire.edges.into_iter().map(Shape::Edge).collect())
                        }
                    }
                };
                Part {
                    item: id,
                    shape,
                    faces: Vec::new(),
                    shells: Vec::new(),
                }
            }
            _ => match self.face(id)? {
                Some(face) => Part {
                    item: id,
                    shape: Shape::Face(face),
                    faces: vec![id],
                    shells: Vec::new(),
                },
                None => return Ok(None),
            },
        };
        Ok(Some(part))
    }

    fn shell(&mut self, id: u64) -> Result<(Shell, Vec<u64>)> {
        let entity = self.entity(id)?;
        if let Some(oriented) = entity
            .record("ORIENTED_CLOSED_SHELL")
            .or_else(|| entity.record("ORIENTED_OPEN_SHELL"))
        {
            let inner = required(oriented.entity(2), id, "shell_element")?;
            let (mut shell, faces) = self.shell(inner)?;
            if oriented.boolean(3) == Some(false) {
                shell.faces = shell.faces.into_iter().map(Face::reverse).collect();
            }
            return Ok((shell, faces));
        }

        let (record, closed) = match entity.record("CLOSED_SHELL") {
            Some(record) => (record, true),
            None => (self.expect(id, "OPEN_SHELL")?, false),
        };
        let mut faces = Vec::new();
        let mut face_ids = Vec::new();
        for face_id in record.refs(1) {
            match self.face(face_id)? {
                Some(face) => {
                    faces.push(face);
                    face_ids.push(face_id);
                }
                None => debug!(face = face_id, "dropped face without usable boundary"),
            }
        }
        Ok((Shell::new(faces, closed), face_ids))
    }

    // ---- topology ------------------------------------------------------------

    fn face(&mut self, id: u64) -> Result<Option<Face>> {
        let entity = self.entity(id)?;
        let record = entity
            .record("ADVANCED_FACE")
            .or_else(|| entity.record("FACE_SURFACE"))
            .or_else(|| entity.record("FACE"))
            .ok_or_else(|| Error::format(format!("entity #{} is not a face", id)))?;
        let surface_id = match record.name.as_str() {
            "FACE" => None,
            _ => record.entity(2),
        };
        let same_sense = record.boolean(3).unwrap_or(true);

        let mut outer = None;
        let mut loops = Vec::new();
        let mut points = Vec::new();
        for bound_id in record.refs(1) {
            let bound = self.entity(bound_id)?;
            let (bound_record, is_outer) = match bound.record("FACE_OUTER_BOUND") {
                Some(r) => (r, true),
                None => (self.expect(bound_id, "FACE_BOUND")?, false),
            };
            let loop_id = required(bound_record.entity(1), bound_id, "bound")?;
            match self.bound(loop_id)? {
                Some(Bound::Loop(mut wire)) => {
                    if bound_record.boolean(2) == Some(false) {
                        wire = wire.reverse();
                    }
                    if is_outer && outer.is_none() {
                        outer = Some(wire);
                    } else {
                        loops.push(wire);
                    }
                }
                Some(Bound::Vertex(p)) => points.push(p),
                None => {}
            }
        }
        match outer {
            Some(wire) => loops.insert(0, wire),
            None => move_largest_first(&mut loops),
        }

        let surface = match surface_id {
            Some(surface_id) => self.surface(surface_id)?,
            None => None,
        };
        let face = match surface {
            Some(Surface::Plane { frame }) => {
                if loops.is_empty() {
                    return Ok(None);
                }
                Face {
                    surface: Surface::Plane { frame },
                    bounds: FaceBounds::Loops(loops),
                    reversed: !same_sense,
                }
            }
            Some(surface) => match parameter_window(&surface, &loops, &points, !same_sense) {
                Some(window) => Face {
                    surface,
                    bounds: FaceBounds::Window(window),
                    reversed: !same_sense,
                },
                None => {
                    debug!(face = id, surface = surface.name(), "face boundary does not bound a window");
                    return Ok(None);
                }
            },
            None => {
                // Approximated by its boundary
                let Some(first) = loops.first() else {
                    return Ok(None);
                };
                let samples = first.discretize(f64::INFINITY, SAMPLE_ANGLE);
                let Some(normal) = newell_normal(&samples) else {
                    return Ok(None);
                };
                let frame = Frame::new(samples[0], normal, None);
                Face {
                    surface: Surface::Plane { frame },
                    bounds: FaceBounds::Loops(loops),
                    reversed: false,
                }
            }
        };
        Ok(Some(face))
    }

    fn bound(&mut self, id: u64) -> Result<Option<Bound>> {
        let entity = self.entity(id)?;
        if let Some(edge_loop) = entity.record("EDGE_LOOP") {
            let mut edges = Vec::new();
            for oriented in edge_loop.refs(1) {
                edges.extend(self.oriented_edge(oriented)?);
            }
            return Ok((!edges.is_empty()).then(|| Bound::Loop(Wire::new(edges))));
        }
        if let Some(poly_loop) = entity.record("POLY_LOOP") {
            let points = poly_loop
                .refs(1)
                .into_iter()
                .map(|p| self.point(p))
                .collect::<Result<Vec<_>>>()?;
            return Ok((points.len() >= 3).then(|| Bound::Loop(Wire::polygon(&points))));
        }
        if let Some(vertex_loop) = entity.record("VERTEX_LOOP") {
            let vertex = required(vertex_loop.entity(1), id, "loop_vertex")?;
            return Ok(Some(Bound::Vertex(self.vertex(vertex)?)));
        }
        self.unsupported(id, entity.name());
        Ok(None)
    }

    fn oriented_edge(&mut self, id: u64) -> Result<Option<Edge>> {
        let entity = self.entity(id)?;
        if entity.is("EDGE_CURVE") {
            return self.edge_curve(id);
        }
        let record = self.expect(id, "ORIENTED_EDGE")?;
        let element = required(record.entity(3), id, "edge_element")?;
        let edge = self.edge_curve(element)?;
        Ok(match record.boolean(4) {
            Some(false) => edge.map(Edge::reverse),
            _ => edge,
        })
    }

    fn edge_curve(&mut self, id: u64) -> Result<Option<Edge>> {
        let record = self.expect(id, "EDGE_CURVE")?;
        let start = self.vertex(required(record.entity(1), id, "edge_start")?)?;
        let end = self.vertex(required(record.entity(2), id, "edge_end")?)?;
        let same_sense = record.boolean(4).unwrap_or(true);
        let curve = self.curve(required(record.entity(3), id, "edge_geometry")?)?;

        let edge = match curve {
            Some(Curve::Circle { frame, radius }) => {
                let circle = Curve::Circle { frame, radius };
                let t0 = circle.parameter(&start);
                let t1 = circle.parameter(&end);
                if same_sense {
                    Edge::arc(frame, radius, t0, t1)
                } else {
                    Edge::arc(frame, radius, t1, t0).reverse()
                }
            }
            Some(Curve::Polyline { points }) => polyline_edge(&points, &start, &end, same_sense),
            Some(Curve::Line { .. }) | None => Edge::line(start, end),
        };
        Ok((!edge.is_degenerate()).then_some(edge))
    }

    /// Bounded curve of a wireframe set
    fn free_curve(&mut self, id: u64) -> Result<Option<Edge>> {
        let entity = self.entity(id)?;
        let Some(record) = entity.simple() else {
            return Ok(None);
        };
        if record.name != "TRIMMED_CURVE" {
            return Ok(match self.curve(id)? {
                Some(Curve::Circle { frame, radius }) => Some(Edge::circle(frame, radius)),
                Some(Curve::Polyline { points }) => Some(Edge::polyline(points)),
                _ => None,
            });
        }

        let sense = record.boolean(4).unwrap_or(true);
        let Some(basis) = self.curve(required(record.entity(1), id, "basis_curve")?)? else {
            return Ok(None);
        };
        let trims = [self.trim(record.param(2), &basis)?, self.trim(record.param(3), &basis)?];
        let [Some(t0), Some(t1)] = trims else {
            return Ok(None);
        };
        let edge = match &basis {
            Curve::Circle { frame, radius } if sense => Edge::arc(*frame, *radius, t0, t1),
            Curve::Circle { frame, radius } => Edge::arc(*frame, *radius, t1, t0).reverse(),
            _ => Edge::line(basis.point(t0), basis.point(t1)),
        };
        Ok((!edge.is_degenerate()).then_some(edge))
    }

    /// Curve parameter of a trimming select, preferring a cartesian point
    fn trim(&self, select: Option<&Value>, basis: &Curve) -> Result<Option<f64>> {
        let Some(values) = select.and_then(Value::as_list) else {
            return Ok(None);
        };
        if let Some(point) = values.iter().find_map(Value::as_entity) {
            return Ok(Some(basis.parameter(&self.point(point)?)));
        }
        Ok(values.iter().find_map(Value::as_real).map(|t| match basis {
            Curve::Circle { .. } => t * self.angle_factor,
            _ => t,
        }))
    }

    fn vertex(&self, id: u64) -> Result<Point3<f64>> {
        let record = self.expect(id, "VERTEX_POINT")?;
        self.point(required(record.entity(1), id, "vertex_geometry")?)
    }

    // ---- geometry ------------------------------------------------------------

    fn curve(&mut self, id: u64) -> Result<Option<Curve>> {
        let entity = self.entity(id)?;
        let Some(record) = entity.simple() else {
            self.unsupported(id, entity.name());
            return Ok(None);
        };
        let curve = match record.name.as_str() {
            "LINE" => {
                let origin = self.point(required(record.entity(1), id, "pnt")?)?;
                let vector = self.vector(required(record.entity(2), id, "dir")?)?;
                Curve::Line {
                    origin,
                    direction: vector.try_normalize(1e-12).unwrap_or_else(Vector3::x),
                }
            }
            "CIRCLE" => Curve::Circle {
                frame: self.placement(required(record.entity(1), id, "position")?)?,
                radius: required(record.real(2), id, "radius")?,
            },
            "POLYLINE" => Curve::Polyline {
                points: record
                    .refs(1)
                    .into_iter()
                    .map(|p| self.point(p))
                    .collect::<Result<Vec<_>>>()?,
            },
            "SURFACE_CURVE" | "SEAM_CURVE" | "BOUNDED_SURFACE_CURVE" | "TRIMMED_CURVE" => {
                return self.curve(required(record.entity(1), id, "curve_3d")?);
            }
            other => {
                self.unsupported(id, other);
                return Ok(None);
            }
        };
        Ok(Some(curve))
    }

    fn surface(&mut self, id: u64) -> Result<Option<Surface>> {
        let entity = self.entity(id)?;
        let Some(record) = entity.simple() else {
            self.unsupported(id, entity.name());
            return Ok(None);
        };
        let position = || required(record.entity(1), id, "position");
        let real = |index: usize, what: &str| required(record.real(index), id, what);

        let surface = match record.name.as_str() {
            "PLANE" => Surface::Plane { frame: self.placement(position()?)? },
            "CYLINDRICAL_SURFACE" => Surface::Cylinder {
                frame: self.placement(position()?)?,
                radius: real(2, "radius")?,
            },
            "CONICAL_SURFACE" => Surface::Cone {
                frame: self.placement(position()?)?,
                radius: real(2, "radius")?,
                semi_angle: real(3, "semi_angle")? * self.angle_factor,
            },
            "SPHERICAL_SURFACE" => Surface::Sphere {
                frame: self.placement(position()?)?,
                radius: real(2, "radius")?,
            },
            "TOROIDAL_SURFACE" | "DEGENERATE_TOROIDAL_SURFACE" => Surface::Torus {
                frame: self.placement(position()?)?,
                major_radius: real(2, "major_radius")?,
                minor_radius: real(3, "minor_radius")?,
            },
            other => {
                self.unsupported(id, other);
                return Ok(None);
            }
        };
        Ok(Some(surface))
    }

    fn point(&self, id: u64) -> Result<Point3<f64>> {
        let record = self.expect(id, "CARTESIAN_POINT")?;
        let coords = record.param(1).map(Value::reals).unwrap_or_default();
        match coords.as_slice() {
            [x, y] => Ok(Point3::new(*x, *y, 0.0)),
            [x, y, z, ..] => Ok(Point3::new(*x, *y, *z)),
            _ => Err(Error::format(format!("point #{} has fewer than two coordinates", id))),
        }
    }

    fn direction(&self, id: u64) -> Result<Vector3<f64>> {
        let record = self.expect(id, "DIRECTION")?;
        let ratios = record.param(1).map(Value::reals).unwrap_or_default();
        match ratios.as_slice() {
            [x, y] => Ok(Vector3::new(*x, *y, 0.0)),
            [x, y, z, ..] => Ok(Vector3::new(*x, *y, *z)),
            _ => Err(Error::format(format!("direction #{} has fewer than two ratios", id))),
        }
    }

    fn vector(&self, id: u64) -> Result<Vector3<f64>> {
        let record = self.expect(id, "VECTOR")?;
        let direction = self.direction(required(record.entity(1), id, "orientation")?)?;
        Ok(direction * record.real(2).unwrap_or(1.0))
    }

    fn placement(&self, id: u64) -> Result<Frame> {
        let record = self.expect(id, "AXIS2_PLACEMENT_3D")?;
        let location = self.point(required(record.entity(1), id, "location")?)?;
        let axis = record.entity(2).map(|d| self.direction(d)).transpose()?;
        let reference = record.entity(3).map(|d| self.direction(d)).transpose()?;
        Ok(Frame::new(location, axis.unwrap_or_else(Vector3::z), reference))
    }

    fn placement_matrix(&self, id: u64) -> Result<Matrix4<f64>> {
        Ok(self.placement(id)?.to_matrix())
    }
}

fn required<T>(value: Option<T>, id: u64, attribute: &str) -> Result<T> {
    value.ok_or_else(|| Error::format(format!("entity #{} lacks attribute {}", id, attribute)))
}

/// Inverse of a rotation plus translation
fn rigid_inverse(matrix: &Matrix4<f64>) -> Matrix4<f64> {
    matrix.try_inverse().unwrap_or_else(Matrix4::identity)
}

fn plane_angle_factor(file: &StepFile) -> f64 {
    let degrees = file.entities.values().any(|e| {
        e.is("PLANE_ANGLE_UNIT")
            && e.record("CONVERSION_BASED_UNIT")
                .and_then(|r| r.string(0))
                .map_or(false, |n| n.to_ascii_lowercase().contains("degree"))
    });
    if degrees {
        deg_to_rad(1.0)
    } else {
        1.0
    }
}

fn predefined_color(name: &str) -> Option<Rgb> {
    let rgb = match name.to_ascii_lowercase().as_str() {
        "red" => (1.0, 0.0, 0.0),
        "green" => (0.0, 1.0, 0.0),
        "blue" => (0.0, 0.0, 1.0),
        "yellow" => (1.0, 1.0, 0.0),
        "magenta" => (1.0, 0.0, 1.0),
        "cyan" => (0.0, 1.0, 1.0),
        "black" => (0.0, 0.0, 0.0),
        "white" => (1.0, 1.0, 1.0),
        _ => return None,
    };
    Some(Rgb::new(rgb.0, rgb.1, rgb.2))
}

/// Portion of a polyline between the points nearest `start` and `end`
fn polyline_edge(points: &[Point3<f64>], start: &Point3<f64>, end: &Point3<f64>, same_sense: bool) -> Edge {
    let curve = Curve::Polyline {
        points: points.to_vec(),
    };
    let a = curve.parameter(start) as usize;
    let b = curve.parameter(end) as usize;
    let mut slice = if a == b {
        points.to_vec()
    } else {
        points[a.min(b)..=a.max(b)].to_vec()
    };
    if (a > b) || (a == b && !same_sense) {
        slice.reverse();
    }
    Edge::polyline(slice)
}

fn move_largest_first(loops: &mut [Wire]) {
    let size = |w: &Wire| {
        let points = w.discretize(f64::INFINITY, SAMPLE_ANGLE);
        BoundingBox::from_points(&points).diagonal()
    };
    if let Some(largest) = (0..loops.len()).max_by(|&a, &b| size(&loops[a]).total_cmp(&size(&loops[b]))) {
        loops.swap(0, largest);
    }
}

/// Parameter window covered by a face's boundary on an analytic surface
fn parameter_window(
    surface: &Surface,
    loops: &[Wire],
    points: &[Point3<f64>],
    reversed: bool,
) -> Option<ParamWindow> {
    let samples: Vec<Point3<f64>> = loops
        .iter()
        .flat_map(|w| w.discretize(f64::INFINITY, SAMPLE_ANGLE))
        .chain(points.iter().copied())
        .collect();

    if samples.is_empty() {
        return match surface {
            Surface::Sphere { .. } => Some(ParamWindow::new((0.0, TAU), (-FRAC_PI_2, FRAC_PI_2))),
            Surface::Torus { .. } => Some(ParamWindow::new((0.0, TAU), (0.0, TAU))),
            _ => None,
        };
    }

    let frame = surface.frame();
    let mut us = Vec::new();
    let mut vs = Vec::new();
    for p in &samples {
        let (u, v) = surface.parameters(p);
        let local = frame.local(p);
        if local.x.hypot(local.y) > AXIS_EPS {
            us.push(u);
        }
        vs.push(v);
    }

    let u = if us.is_empty() {
        (0.0, TAU)
    } else {
        periodic_range(&us)
    };
    let mut v = match surface.v_period() {
        Some(_) => periodic_range(&vs),
        None => {
            let (lo, hi) = vs
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            (lo, hi)
        }
    };

    if let Surface::Sphere { .. } = surface {
        let full_u = u.1 - u.0 >= TAU - 1e-9;
        let touches_pole = vs.iter().any(|v| v.abs() > FRAC_PI_2 - 1e-6);
        if full_u && !touches_pole {
            // A cap bounded by a parallel extends towards the pole on its left
            let outer = loops.first()?.discretize(f64::INFINITY, SAMPLE_ANGLE);
            let north = (u_turn(surface, &outer) > 0.0) != reversed;
            v = if north { (v.0, FRAC_PI_2) } else { (-FRAC_PI_2, v.1) };
        }
    }

    let window = ParamWindow::new(u, v);
    (window.u_span() > 1e-9 && window.v_span() > 1e-9).then_some(window)
}

/// Smallest periodic interval covering every angle; a full turn when the
/// samples leave no real gap.
fn periodic_range(values: &[f64]) -> (f64, f64) {
    let seam = values[0];
    let mut angles: Vec<f64> = values.iter().map(|v| v.rem_euclid(TAU)).collect();
    angles.sort_by(f64::total_cmp);
    angles.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    if angles.len() < 2 {
        return (seam, seam + TAU);
    }

    let n = angles.len();
    let (gap, after) = (0..n)
        .map(|i| {
            let next = if i + 1 < n { angles[i + 1] } else { angles[0] + TAU };
            (next - angles[i], (i + 1) % n)
        })
        .fold((0.0, 0), |best, cur| if cur.0 > best.0 { cur } else { best });

    if gap <= FULL_PERIOD_GAP {
        (seam, seam + TAU)
    } else {
        let start = angles[after];
        (start, start + TAU - gap)
    }
}

/// Signed angle swept around the surface axis along a closed polyline
fn u_turn(surface: &Surface, points: &[Point3<f64>]) -> f64 {
    let us: Vec<f64> = points.iter().map(|p| surface.parameters(p).0).collect();
    us.windows(2)
        .map(|w| {
            let d = (w[1] - w[0]).rem_euclid(TAU);
            if d > PI {
                d - TAU
            } else {
                d
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(data: &str) -> String {
        format!(
            "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('AUTOMOTIVE_DESIGN'));\nENDSEC;\nDATA;\n{}\nENDSEC;\nEND-ISO-10303-21;\n",
            data
        )
    }

    /// Unit square face on z = 0 as a faceted brep
    const SQUARE: &str = "
#1 = CARTESIAN_POINT('',(0.,0.,0.));
#2 = CARTESIAN_POINT('',(1.,0.,0.));
#3 = CARTESIAN_POINT('',(1.,1.,0.));
#4 = CARTESIAN_POINT('',(0.,1.,0.));
#5 = POLY_LOOP('',(#1,#2,#3,#4));
#6 = FACE_OUTER_BOUND('',#5,.T.);
#7 = DIRECTION('',(0.,0.,1.));
#8 = DIRECTION('',(1.,0.,0.));
#9 = AXIS2_PLACEMENT_3D('',#1,#7,#8);
#10 = PLANE('',#9);
#11 = FACE_SURFACE('',(#6),#10,.T.);
#12 = OPEN_SHELL('',(#11));
#13 = SHELL_BASED_SURFACE_MODEL('plate',(#12));
#14 = COLOUR_RGB('',1.,0.,0.);
#15 = FILL_AREA_STYLE_COLOUR('',#14);
#16 = FILL_AREA_STYLE('',(#15));
#17 = SURFACE_STYLE_FILL_AREA(#16);
#18 = SURFACE_SIDE_STYLE('',(#17));
#19 = SURFACE_STYLE_USAGE(.BOTH.,#18);
#20 = PRESENTATION_STYLE_ASSIGNMENT((#19));
#21 = STYLED_ITEM('',(#20),#11);
";

    #[test]
    fn test_free_shape_items_become_roots() {
        let document = read_document(&wrap(SQUARE), None).unwrap();
        assert_eq!(document.root_ids().len(), 1);
        let root = document.roots().next().unwrap();
        assert_eq!(root.name(), Some("plate"));
        let shape = root.shape().unwrap();
        assert_eq!(shape.kind(), crate::geometry::ShapeKind::Shell);
        assert_eq!(shape.face_count(), 1);
        let shape_id = root.shape_id().unwrap();
        assert_eq!(document.face_color(shape_id, 0), Some(Rgb::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_no_geometry_is_format_error() {
        let source = wrap("#1 = CARTESIAN_POINT('',(0.,0.,0.));");
        assert!(matches!(read_document(&source, None), Err(Error::Format(_))));
    }

    #[test]
    fn test_missing_reference_is_format_error() {
        let source = wrap("#1 = MANIFOLD_SOLID_BREP('',#99);");
        assert!(matches!(read_document(&source, None), Err(Error::Format(_))));
    }

    #[test]
    fn test_periodic_range() {
        let full: Vec<f64> = (0..100).map(|i| i as f64 * TAU / 100.0).collect();
        let (a, b) = periodic_range(&full);
        assert!((b - a - TAU).abs() < 1e-9);

        let half: Vec<f64> = (0..=50).map(|i| -FRAC_PI_2 + i as f64 * PI / 50.0).collect();
        let (a, b) = periodic_range(&half);
        assert!((b - a - PI).abs() < 1e-9);
        assert!((a.rem_euclid(TAU) - (3.0 * FRAC_PI_2)).abs() < 1e-9);

        let seam = vec![1.0, 1.0, 1.0];
        assert_eq!(periodic_range(&seam), (1.0, 1.0 + TAU));
    }

    #[test]
    fn test_hemisphere_window_from_equator() {
        let sphere = Surface::Sphere {
            frame: Frame::world(),
            radius: 2.0,
        };
        let equator = Wire::new(vec![Edge::circle(Frame::world(), 2.0)]);
        let north = parameter_window(&sphere, &[equator.clone()], &[], false).unwrap();
        assert!((north.v.1 - FRAC_PI_2).abs() < 1e-9);
        assert!(north.v.0.abs() < 1e-9);

        let south = parameter_window(&sphere, &[equator], &[], true).unwrap();
        assert!((south.v.0 + FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_degree_angle_unit() {
        let source = wrap(
            "#1 = (CONVERSION_BASED_UNIT('DEGREE',#2) NAMED_UNIT(#3) PLANE_ANGLE_UNIT());
#2 = PLANE_ANGLE_MEASURE_WITH_UNIT(PLANE_ANGLE_MEASURE(0.0174532925),#4);
#3 = DIMENSIONAL_EXPONENTS(0.,0.,0.,0.,0.,0.,0.);
#4 = (NAMED_UNIT(*) PLANE_ANGLE_UNIT() SI_UNIT($,.RADIAN.));",
        );
        let file = StepFile::parse(&source).unwrap();
        assert!((plane_angle_factor(&file) - PI / 180.0).abs() < 1e-12);
    }
}
