// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Renderable scene graphs
//!
//! A [`SceneGraph`] is built once from a [`Document`](crate::document::Document)
//! and only read afterwards. Nodes live in an arena in pre-order; the flat
//! face index maps every tessellated face to its owning node, its triangle
//! range and any face-level color.

pub mod builder;
pub mod json;

pub use builder::SceneGraphBuilder;
pub use json::{read_scene_json, scene_from_json, scene_to_json, write_scene_json};

use crate::document::Rgb;
use crate::geometry::{TessellatedCurve, TessellatedMesh};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneNodeId(pub usize);

/// Scene-wide face identifier, allocated sequentially in traversal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceId(pub u32);

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "face{}", self.0)
    }
}

/// Face index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEntry {
    pub node: SceneNodeId,
    /// Position of the face in its shape's exploration order
    pub ordinal: usize,
    /// Triangles of the node mesh covering this face
    pub triangles: Range<usize>,
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    /// Pre-order position such as `0:1:2`
    pub path: String,
    /// Resolved color, inherited from the nearest colored ancestor
    pub color: Rgb,
    pub transform: Matrix4<f64>,
    pub mesh: Option<TessellatedMesh>,
    pub edges: Option<Vec<TessellatedCurve>>,
    pub faces: Vec<FaceId>,
    pub children: Vec<SceneNodeId>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, path: impl Into<String>, color: Rgb) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            color,
            transform: Matrix4::identity(),
            mesh: None,
            edges: None,
            faces: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.mesh.as_ref().map_or(0, |m| m.triangle_count())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    root: SceneNodeId,
    faces: BTreeMap<FaceId, FaceEntry>,
}

impl SceneGraph {
    pub(crate) fn from_parts(
        nodes: Vec<SceneNode>,
        root: SceneNodeId,
        faces: BTreeMap<FaceId, FaceEntry>,
    ) -> Self {
        Self { nodes, root, faces }
    }

    pub fn root_id(&self) -> SceneNodeId {
        self.root
    }

    pub fn root(&self) -> &SceneNode {
        &self.nodes[self.root.0]
    }

    pub fn node(&self, id: SceneNodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    /// Children of `id` in document order
    pub fn children(&self, id: SceneNodeId) -> impl Iterator<Item = (SceneNodeId, &SceneNode)> + '_ {
        self.node(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |&c| self.node(c).map(|n| (c, n)))
    }

    /// Internal face entries keyed by face identifier
    pub fn face_entries(&self) -> &BTreeMap<FaceId, FaceEntry> {
        &self.faces
    }

    pub fn face(&self, id: FaceId) -> Option<&FaceEntry> {
        self.faces.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.nodes.iter().map(SceneNode::triangle_count).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.edges.as_ref().map_or(0, Vec::len))
            .sum()
    }

    /// Number of levels below and including the root
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 1)];
        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Some(node) = self.node(id) {
                stack.extend(node.children.iter().map(|&c| (c, depth + 1)));
            }
        }
        deepest
    }

    /// Node ids in pre-order
    pub fn pre_order(&self) -> Vec<SceneNodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.node(id) {
                stack.extend(node.children.iter().rev());
            }
        }
        order
    }

    /// Node-to-world transform, composing placements from the root down
    pub fn world_transform(&self, id: SceneNodeId) -> Matrix4<f64> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(target) = current {
            chain.push(target);
            current = self
                .nodes
                .iter()
                .position(|n| n.children.contains(&target))
                .map(SceneNodeId);
        }
        chain
            .iter()
            .rev()
            .filter_map(|&id| self.node(id))
            .fold(Matrix4::identity(), |acc, n| acc * n.transform)
    }
}
