// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Document → scene graph traversal

use super::{FaceEntry, FaceId, SceneGraph, SceneNode, SceneNodeId};
use crate::document::{Document, NodeRef, Rgb, ShapeId, MAX_DEPTH};
use crate::error::{Error, Result};
use crate::geometry::{Shape, TessellatedCurve, TessellatedMesh};
use crate::tessellate::{tessellate, tessellate_curves, FaceSpan, TessellationParams};
use ahash::AHashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Renderable geometry of one document shape
#[derive(Debug, Clone)]
struct Geometry {
    mesh: Option<TessellatedMesh>,
    edges: Option<Vec<TessellatedCurve>>,
    faces: Vec<FaceSpan>,
}

/// Builds [`SceneGraph`]s from documents.
///
/// The scene root is a synthetic node named after the document whose
/// children are the document roots. Colors are resolved top-down: a node
/// without a color takes its parent's resolved color and the scene root
/// uses the default color.
#[derive(Debug, Clone)]
pub struct SceneGraphBuilder {
    params: TessellationParams,
    default_color: Rgb,
    max_depth: usize,
}

impl Default for SceneGraphBuilder {
    fn default() -> Self {
        Self::new(TessellationParams::default())
    }
}

struct Assembly<'d> {
    document: &'d Document,
    nodes: Vec<SceneNode>,
    faces: BTreeMap<FaceId, FaceEntry>,
}

impl SceneGraphBuilder {
    pub fn new(params: TessellationParams) -> Self {
        Self {
            params,
            default_color: Rgb::NEUTRAL,
            max_depth: MAX_DEPTH,
        }
    }

    pub fn with_default_color(mut self, color: Rgb) -> Self {
        self.default_color = color;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn params(&self) -> &TessellationParams {
        &self.params
    }

    /// Sequential build: every shape is tessellated when its node is visited
    pub fn build(&self, document: &Document) -> Result<SceneGraph> {
        self.check_tree(document)?;
        self.assemble(document, &|id| self.geometry(document, id))
    }

    /// Tessellate distinct shapes on the rayon pool, then assemble in
    /// document order. The result equals [`build`](Self::build).
    pub fn build_parallel(&self, document: &Document) -> Result<SceneGraph> {
        self.check_tree(document)?;
        let shape_ids = self.shape_ids(document);
        let results: Vec<(ShapeId, Result<Geometry>)> = shape_ids
            .par_iter()
            .map(|&id| (id, self.geometry(document, id)))
            .collect();

        let mut cache = AHashMap::with_capacity(results.len());
        for (id, result) in results {
            cache.insert(id, result?);
        }
        debug!(shapes = cache.len(), "tessellated shapes in parallel");

        self.assemble(document, &|id| {
            cache
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::structure(format!("shape {} was not tessellated", id.0)))
        })
    }

    fn assemble(
        &self,
        document: &Document,
        geometry: &dyn Fn(ShapeId) -> Result<Geometry>,
    ) -> Result<SceneGraph> {
        let mut assembly = Assembly {
            document,
            nodes: Vec::new(),
            faces: BTreeMap::new(),
        };

        let name = document.name.clone().unwrap_or_else(|| "document".to_string());
        assembly
            .nodes
            .push(SceneNode::new(name, "0", self.default_color));
        let root = SceneNodeId(0);

        for (index, node) in document.roots().enumerate() {
            let child = self.visit(
                &mut assembly,
                node,
                self.default_color,
                format!("0:{}", index),
                2,
                geometry,
            )?;
            assembly.nodes[root.0].children.push(child);
        }

        let graph = SceneGraph::from_parts(assembly.nodes, root, assembly.faces);
        info!(
            nodes = graph.node_count(),
            faces = graph.face_entries().len(),
            triangles = graph.triangle_count(),
            "built scene graph"
        );
        Ok(graph)
    }

    fn visit(
        &self,
        assembly: &mut Assembly<'_>,
        node: NodeRef<'_>,
        inherited: Rgb,
        path: String,
        depth: usize,
        geometry: &dyn Fn(ShapeId) -> Result<Geometry>,
    ) -> Result<SceneNodeId> {
        if depth > self.max_depth {
            return Err(Error::structure(format!(
                "document hierarchy exceeds {} levels at {}",
                self.max_depth, path
            )));
        }

        let color = node.color().unwrap_or(inherited);
        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node {}", path));
        let id = SceneNodeId(assembly.nodes.len());
        let mut scene_node = SceneNode::new(name, path.clone(), color);
        scene_node.transform = *node.transform();

        if let Some(shape_id) = node.shape_id() {
            let Geometry { mesh, edges, faces } = geometry(shape_id)?;
            for span in faces {
                let face_id = FaceId(u32::try_from(assembly.faces.len()).map_err(|_| {
                    Error::structure("face identifiers exhausted".to_string())
                })?);
                assembly.faces.insert(
                    face_id,
                    FaceEntry {
                        node: id,
                        ordinal: span.ordinal,
                        triangles: span.triangles,
                        color: assembly.document.face_color(shape_id, span.ordinal),
                    },
                );
                scene_node.faces.push(face_id);
            }
            scene_node.mesh = mesh;
            scene_node.edges = edges;
        }
        debug!(path = %path, name = %scene_node.name, color = %color, "scene node");
        assembly.nodes.push(scene_node);

        for (index, child) in node.children().enumerate() {
            let child_id = self.visit(
                assembly,
                child,
                color,
                format!("{}:{}", path, index),
                depth + 1,
                geometry,
            )?;
            assembly.nodes[id.0].children.push(child_id);
        }
        Ok(id)
    }

    /// Every node must be reachable once, below the synthetic scene root
    fn check_tree(&self, document: &Document) -> Result<()> {
        document.validate_within(self.max_depth.saturating_sub(1))
    }

    /// Distinct shape ids in first-visit order
    fn shape_ids(&self, document: &Document) -> Vec<ShapeId> {
        let mut ids = Vec::new();
        let mut stack: Vec<NodeRef<'_>> = document.roots().collect();
        stack.reverse();
        while let Some(node) = stack.pop() {
            if let Some(id) = node.shape_id() {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            let children: Vec<_> = node.children().collect();
            stack.extend(children.into_iter().rev());
        }
        ids
    }

    fn geometry(&self, document: &Document, id: ShapeId) -> Result<Geometry> {
        let shape = document
            .shape(id)
            .ok_or_else(|| Error::structure(format!("missing shape {}", id.0)))?;
        shape_geometry(shape, &self.params)
    }
}

fn shape_geometry(shape: &Shape, params: &TessellationParams) -> Result<Geometry> {
    if shape.face_count() > 0 {
        let tessellation = tessellate(shape, params)?;
        Ok(Geometry {
            mesh: Some(tessellation.mesh),
            edges: tessellation.edges,
            faces: tessellation.faces,
        })
    } else {
        Ok(Geometry {
            mesh: None,
            edges: Some(tessellate_curves(shape, params)?),
            faces: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentNode;
    use crate::geometry::{Edge, Primitive};
    use nalgebra::{Point3, Vector3};

    fn cube() -> Shape {
        Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false).to_shape()
    }

    /// assembly(red) → [part(no color), part(blue)]
    fn colored_assembly() -> Document {
        let mut document = Document::with_name("asm");
        let shape = document.add_shape(cube());
        let plain = document.add_node(DocumentNode::new(Some("plain".into())).with_shape(shape));
        let blue = document.add_node(
            DocumentNode::new(Some("blue".into()))
                .with_shape(shape)
                .with_color(Some(Rgb::new(0.0, 0.0, 1.0))),
        );
        let assembly = document.add_node(
            DocumentNode::new(Some("assembly".into())).with_color(Some(Rgb::new(1.0, 0.0, 0.0))),
        );
        document.add_child(assembly, plain).unwrap();
        document.add_child(assembly, blue).unwrap();
        document.add_root(assembly).unwrap();
        document.set_face_color(shape, 2, Rgb::new(0.0, 1.0, 0.0));
        document
    }

    #[test]
    fn test_color_inheritance() {
        let graph = SceneGraphBuilder::default()
            .build(&colored_assembly())
            .unwrap();
        assert_eq!(graph.root().color, Rgb::NEUTRAL);
        let (assembly_id, assembly) = graph.children(graph.root_id()).next().unwrap();
        assert_eq!(assembly.color, Rgb::new(1.0, 0.0, 0.0));
        let children: Vec<_> = graph.children(assembly_id).map(|(_, n)| n).collect();
        assert_eq!(children[0].color, Rgb::new(1.0, 0.0, 0.0));
        assert_eq!(children[1].color, Rgb::new(0.0, 0.0, 1.0));
        assert_eq!(children[1].path, "0:0:1");
    }

    #[test]
    fn test_default_color_for_uncolored_documents() {
        let document = Document::from_shape(cube(), None);
        let gray = Rgb::new(0.5, 0.5, 0.5);
        let graph = SceneGraphBuilder::default()
            .with_default_color(gray)
            .build(&document)
            .unwrap();
        assert!(graph.nodes().iter().all(|n| n.color == gray));
        assert_eq!(graph.root().name, "document");
    }

    #[test]
    fn test_face_index() {
        let graph = SceneGraphBuilder::default()
            .build(&colored_assembly())
            .unwrap();
        let entries = graph.face_entries();
        assert_eq!(entries.len(), 12);
        let ids: Vec<u32> = entries.keys().map(|f| f.0).collect();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
        assert_eq!(entries[&FaceId(2)].color, Some(Rgb::new(0.0, 1.0, 0.0)));
        assert_eq!(entries[&FaceId(8)].color, Some(Rgb::new(0.0, 1.0, 0.0)));
        assert_eq!(entries[&FaceId(3)].color, None);
        for (face_id, entry) in entries {
            let node = graph.node(entry.node).unwrap();
            assert!(node.faces.contains(face_id));
            assert!(entry.triangles.end <= node.triangle_count());
        }
    }

    #[test]
    fn test_parallel_build_matches_sequential() {
        let mut document = colored_assembly();
        for i in 0..4 {
            let shape = document.add_shape(Primitive::sphere(1.0 + i as f64).to_shape());
            let node = document.add_node(DocumentNode::new(None).with_shape(shape));
            document.add_root(node).unwrap();
        }
        let builder = SceneGraphBuilder::new(TessellationParams::new(0.2).with_edges(true));
        assert_eq!(
            builder.build(&document).unwrap(),
            builder.build_parallel(&document).unwrap()
        );
    }

    #[test]
    fn test_depth_cap() {
        let mut document = Document::new();
        let mut parent = document.add_node(DocumentNode::new(None));
        document.add_root(parent).unwrap();
        for _ in 0..20 {
            let child = document.add_node(DocumentNode::new(None));
            document.add_child(parent, child).unwrap();
            parent = child;
        }
        let builder = SceneGraphBuilder::default().with_max_depth(10);
        assert!(matches!(builder.build(&document), Err(Error::Structure(_))));
        assert!(matches!(builder.build_parallel(&document), Err(Error::Structure(_))));
        assert!(SceneGraphBuilder::default().build(&document).is_ok());
    }

    #[test]
    fn test_cyclic_document_fails() {
        let mut document = Document::new();
        let a = document.add_node(DocumentNode::new(None));
        document.add_child(a, a).unwrap();
        document.add_root(a).unwrap();
        assert!(matches!(
            SceneGraphBuilder::default().build(&document),
            Err(Error::Structure(_))
        ));
    }

    #[test]
    fn test_shared_child_is_structure_error() {
        let mut document = Document::new();
        let shape = document.add_shape(cube());
        let part = document.add_node(DocumentNode::new(Some("part".into())).with_shape(shape));
        let left = document.add_node(DocumentNode::new(Some("left".into())));
        let right = document.add_node(DocumentNode::new(Some("right".into())));
        document.add_child(left, part).unwrap();
        document.add_child(right, part).unwrap();
        document.add_root(left).unwrap();
        document.add_root(right).unwrap();

        let builder = SceneGraphBuilder::default();
        assert!(matches!(builder.build(&document), Err(Error::Structure(_))));
        assert!(matches!(builder.build_parallel(&document), Err(Error::Structure(_))));
    }

    #[test]
    fn test_diamond_chain_fails_fast() {
        // Each level links the next node twice, so the unfolded tree would
        // hold 2^40 nodes
        let mut document = Document::new();
        let mut parent = document.add_node(DocumentNode::new(None));
        document.add_root(parent).unwrap();
        for _ in 0..40 {
            let child = document.add_node(DocumentNode::new(None));
            document.add_child(parent, child).unwrap();
            document.add_child(parent, child).unwrap();
            parent = child;
        }
        assert!(matches!(
            SceneGraphBuilder::default().build(&document),
            Err(Error::Structure(_))
        ));
    }

    #[test]
    fn test_wire_only_shape_yields_edges() {
        let wire = Shape::Edge(Edge::line(Point3::origin(), Point3::new(1.0, 1.0, 0.0)));
        let graph = SceneGraphBuilder::default()
            .build(&Document::from_shape(wire, None))
            .unwrap();
        let (_, node) = graph.children(graph.root_id()).next().unwrap();
        assert!(node.mesh.is_none());
        assert_eq!(node.edges.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_empty_shape_is_tessellation_error() {
        let document = Document::from_shape(Shape::Compound(Vec::new()), None);
        assert!(matches!(
            SceneGraphBuilder::default().build(&document),
            Err(Error::Tessellation(_))
        ));
    }
}
