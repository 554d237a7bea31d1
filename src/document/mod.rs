// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Assembly documents
//!
//! A [`Document`] is an arena of named, colored, transformed nodes referring
//! to shapes stored alongside them. Roots are kept in file order. Face-level
//! colors are keyed by shape and face ordinal (position in [`Shape::faces`]).

use crate::error::{Error, Result};
use crate::geometry::Shape;
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Nesting limit for traversal of document hierarchies
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(pub usize);

/// Face `ordinal` of shape `shape`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceKey {
    pub shape: ShapeId,
    pub ordinal: usize,
}

/// RGB color with components in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const NEUTRAL: Rgb = Rgb {
        r: 0.8,
        g: 0.8,
        b: 0.8,
    };

    /// Components are clamped into `[0, 1]`
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    pub fn from_array(rgb: [f64; 3]) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.r, self.g, self.b)
    }
}

/// One entry of the assembly hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    pub name: Option<String>,
    pub color: Option<Rgb>,
    /// Placement relative to the parent
    pub transform: Matrix4<f64>,
    pub shape: Option<ShapeId>,
    pub children: Vec<NodeId>,
}

impl DocumentNode {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            color: None,
            transform: Matrix4::identity(),
            shape: None,
            children: Vec::new(),
        }
    }

    pub fn with_shape(mut self, shape: ShapeId) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_color(mut self, color: Option<Rgb>) -> Self {
        self.color = color;
        self
    }

    pub fn with_transform(mut self, transform: Matrix4<f64>) -> Self {
        self.transform = transform;
        self
    }
}

/// How multiple root shapes are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootMode {
    /// One compound holding every root (a lone root is returned as is)
    #[default]
    Compound,
    /// One shape per root, in document order
    Sequence,
}

impl FromStr for RootMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compound" => Ok(Self::Compound),
            "sequence" => Ok(Self::Sequence),
            other => Err(Error::format(format!("unknown root mode '{}'", other))),
        }
    }
}

/// Root shapes of a document, in the layout requested by [`RootMode`]
#[derive(Debug, Clone, PartialEq)]
pub enum RootShapes {
    Compound(Shape),
    Sequence(Vec<Shape>),
}

impl RootShapes {
    pub fn into_shapes(self) -> Vec<Shape> {
        match self {
            Self::Compound(shape) => vec![shape],
            Self::Sequence(shapes) => shapes,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Compound(_) => 1,
            Self::Sequence(shapes) => shapes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub name: Option<String>,
    nodes: Vec<DocumentNode>,
    roots: Vec<NodeId>,
    shapes: Vec<Shape>,
    face_colors: BTreeMap<FaceKey, Rgb>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Document with a single root node holding `shape`
    pub fn from_shape(shape: Shape, name: Option<String>) -> Self {
        let mut document = Self::new();
        document.name = name.clone();
        let shape = document.add_shape(shape);
        let node = document.add_node(DocumentNode::new(name).with_shape(shape));
        document.roots.push(node);
        document
    }

    pub fn add_shape(&mut self, shape: Shape) -> ShapeId {
        self.shapes.push(shape);
        ShapeId(self.shapes.len() - 1)
    }

    pub fn add_node(&mut self, node: DocumentNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_root(&mut self, node: NodeId) -> Result<()> {
        self.check_node(node)?;
        self.roots.push(node);
        Ok(())
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_node(child)?;
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    pub fn set_face_color(&mut self, shape: ShapeId, ordinal: usize, color: Rgb) {
        self.face_colors.insert(FaceKey { shape, ordinal }, color);
    }

    pub fn face_color(&self, shape: ShapeId, ordinal: usize) -> Option<Rgb> {
        self.face_colors.get(&FaceKey { shape, ordinal }).copied()
    }

    pub fn face_colors(&self) -> &BTreeMap<FaceKey, Rgb> {
        &self.face_colors
    }

    pub fn node(&self, id: NodeId) -> Option<&DocumentNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut DocumentNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::structure(format!("node {} does not exist", id.0)))
    }

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(id.0)
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn root_ids(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeRef<'_>> + '_ {
        self.roots.iter().map(move |&id| NodeRef { document: self, id })
    }

    /// Borrowing view of a node
    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.node(id).map(|_| NodeRef { document: self, id })
    }

    /// Check that ids resolve and that every node is reached at most once
    /// from the roots within [`MAX_DEPTH`] levels.
    pub fn validate(&self) -> Result<()> {
        self.validate_within(MAX_DEPTH)
    }

    /// [`validate`](Self::validate) with roots at level 1 and at most
    /// `max_depth` levels.
    pub fn validate_within(&self, max_depth: usize) -> Result<()> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<(NodeId, usize)> = self.roots.iter().map(|&id| (id, 1)).collect();
        while let Some((id, depth)) = stack.pop() {
            if depth > max_depth {
                return Err(Error::structure(format!(
                    "hierarchy deeper than {} levels",
                    max_depth
                )));
            }
            let node = self
                .node(id)
                .ok_or_else(|| Error::structure(format!("dangling node reference {}", id.0)))?;
            if std::mem::replace(&mut seen[id.0], true) {
                return Err(Error::structure(format!(
                    "node {} is reachable more than once",
                    id.0
                )));
            }
            if let Some(shape) = node.shape {
                if self.shape(shape).is_none() {
                    return Err(Error::structure(format!(
                        "node {} refers to missing shape {}",
                        id.0, shape.0
                    )));
                }
            }
            stack.extend(node.children.iter().map(|&c| (c, depth + 1)));
        }
        Ok(())
    }

    /// Shape of the subtree under `id` with every placement applied
    pub fn flatten(&self, id: NodeId) -> Result<Shape> {
        let mut parts = Vec::new();
        self.collect_parts(id, &Matrix4::identity(), 0, &mut parts)?;
        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => Shape::Compound(parts),
        })
    }

    fn collect_parts(
        &self,
        id: NodeId,
        parent: &Matrix4<f64>,
        depth: usize,
        out: &mut Vec<Shape>,
    ) -> Result<()> {
        if depth >= MAX_DEPTH {
            return Err(Error::structure(format!(
                "hierarchy deeper than {} levels",
                MAX_DEPTH
            )));
        }
        let node = self
            .node(id)
            .ok_or_else(|| Error::structure(format!("dangling node reference {}", id.0)))?;
        let world = parent * node.transform;
        if let Some(shape_id) = node.shape {
            let shape = self
                .shape(shape_id)
                .ok_or_else(|| Error::structure(format!("missing shape {}", shape_id.0)))?;
            out.push(if world == Matrix4::identity() {
                shape.clone()
            } else {
                shape.transformed(&world)
            });
        }
        for &child in &node.children {
            self.collect_parts(child, &world, depth + 1, out)?;
        }
        Ok(())
    }

    /// Root shapes with placements baked in
    pub fn root_shapes(&self, mode: RootMode) -> Result<RootShapes> {
        self.validate()?;
        let mut shapes = self
            .roots
            .iter()
            .map(|&id| self.flatten(id))
            .collect::<Result<Vec<_>>>()?;
        Ok(match mode {
            RootMode::Sequence => RootShapes::Sequence(shapes),
            RootMode::Compound if shapes.len() == 1 => RootShapes::Compound(shapes.remove(0)),
            RootMode::Compound => RootShapes::Compound(Shape::Compound(shapes)),
        })
    }
}

/// Read-only view of a document node
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    document: &'a Document,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn data(&self) -> &'a DocumentNode {
        &self.document.nodes[self.id.0]
    }

    pub fn name(&self) -> Option<&'a str> {
        self.data().name.as_deref()
    }

    pub fn color(&self) -> Option<Rgb> {
        self.data().color
    }

    pub fn transform(&self) -> &'a Matrix4<f64> {
        &self.data().transform
    }

    pub fn shape_id(&self) -> Option<ShapeId> {
        self.data().shape
    }

    pub fn shape(&self) -> Option<&'a Shape> {
        self.data().shape.and_then(|id| self.document.shape(id))
    }

    /// Children in document order; dangling ids are skipped
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let document = self.document;
        self.data()
            .children
            .iter()
            .filter(move |id| document.node(**id).is_some())
            .map(move |&id| NodeRef { document, id })
    }

    pub fn is_assembly(&self) -> bool {
        !self.data().children.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.data().children.is_empty() && self.data().shape.is_some()
    }
}

impl Document {
    fn check_node(&self, id: NodeId) -> Result<()> {
        self.node(id)
            .map(|_| ())
            .ok_or_else(|| Error::structure(format!("node {} does not exist", id.0)))
    }
}
