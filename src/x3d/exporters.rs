// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Shape, curve, incremental-scene and scene-graph exporters

use super::nodes::{appearance, coordinate, def_name, lines_shape, mesh_shape, transform, triangle_set};
use super::xml::XmlNode;
use super::X3dExport;
use crate::document::Rgb;
use crate::error::{Error, Result};
use crate::geometry::{Shape, Triangle};
use crate::scene::{FaceEntry, FaceId, SceneGraph, SceneNodeId};
use crate::tessellate::{tessellate, tessellate_curves, TessellationParams};
use std::collections::BTreeMap;
use tracing::debug;

const EDGE_COLOR: Rgb = Rgb {
    r: 0.0,
    g: 0.0,
    b: 0.0,
};

fn shape_nodes(shape: &Shape, params: &TessellationParams, color: Rgb, emissive: bool) -> Result<Vec<XmlNode>> {
    let tessellation = tessellate(shape, params)?;
    let mut nodes = vec![mesh_shape(&tessellation.mesh, color, emissive)];
    if let Some(edges) = tessellation.edges.filter(|e| !e.is_empty()) {
        nodes.push(lines_shape(&edges, EDGE_COLOR));
    }
    Ok(nodes)
}

/// One shape as a triangle set, with optional normals and edge lines
#[derive(Debug, Clone)]
pub struct X3dShapeExporter<'a> {
    shape: &'a Shape,
    params: TessellationParams,
    color: Rgb,
    emissive: bool,
}

impl<'a> X3dShapeExporter<'a> {
    pub fn new(shape: &'a Shape) -> Self {
        Self {
            shape,
            params: TessellationParams::default(),
            color: Rgb::NEUTRAL,
            emissive: false,
        }
    }

    pub fn with_normals(mut self, compute_normals: bool) -> Self {
        self.params.compute_normals = compute_normals;
        self
    }

    pub fn with_edges(mut self, compute_edges: bool) -> Self {
        self.params.compute_edges = compute_edges;
        self
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.params.precision = precision;
        self
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn with_emissive(mut self, emissive: bool) -> Self {
        self.emissive = emissive;
        self
    }
}

impl X3dExport for X3dShapeExporter<'_> {
    fn scene_content(&self) -> Result<Vec<XmlNode>> {
        let mut group = XmlNode::new("Group");
        group.children = shape_nodes(self.shape, &self.params, self.color, self.emissive)?;
        Ok(vec![group])
    }
}

/// Edges and wires as one line set
#[derive(Debug, Clone)]
pub struct X3dCurveExporter {
    shape: Shape,
    params: TessellationParams,
    color: Rgb,
}

impl X3dCurveExporter {
    pub fn new(curve: impl Into<Shape>) -> Self {
        Self {
            shape: curve.into(),
            params: TessellationParams::default(),
            color: EDGE_COLOR,
        }
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.params.precision = precision;
        self
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }
}

impl X3dExport for X3dCurveExporter {
    fn scene_content(&self) -> Result<Vec<XmlNode>> {
        let curves = tessellate_curves(&self.shape, &self.params)?;
        Ok(vec![lines_shape(&curves, self.color)])
    }
}

/// Scene assembled one shape at a time.
///
/// Shapes are tessellated when added, so a failing shape is reported by
/// [`add_shape`](Self::add_shape) and leaves the scene unchanged.
#[derive(Debug, Clone, Default)]
pub struct X3dSceneExporter {
    params: TessellationParams,
    title: Option<String>,
    content: Vec<XmlNode>,
}

impl X3dSceneExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(mut self, params: TessellationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn add_shape(&mut self, shape: &Shape, color: Rgb, emissive: bool) -> Result<()> {
        let nodes = shape_nodes(shape, &self.params, color, emissive)?;
        let mut group = XmlNode::new("Group").attr("DEF", format!("shape{}", self.content.len()));
        group.children = nodes;
        self.content.push(group);
        Ok(())
    }

    pub fn add_curve(&mut self, shape: &Shape, color: Rgb) -> Result<()> {
        let curves = tessellate_curves(shape, &self.params)?;
        let group = XmlNode::new("Group")
            .attr("DEF", format!("shape{}", self.content.len()))
            .child(lines_shape(&curves, color));
        self.content.push(group);
        Ok(())
    }

    /// Number of shapes and curves added so far
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl X3dExport for X3dSceneExporter {
    fn scene_content(&self) -> Result<Vec<XmlNode>> {
        Ok(self.content.clone())
    }

    fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("cadex")
    }
}

/// A built [`SceneGraph`] with one `Transform` per scene node.
///
/// Faces whose color differs from their node's color become separate `Shape`
/// groups named after their face id; they share the node's coordinates.
#[derive(Debug, Clone)]
pub struct X3dFromSceneGraph<'a> {
    scene: &'a SceneGraph,
    faces: &'a BTreeMap<FaceId, FaceEntry>,
    emissive: bool,
    edge_color: Rgb,
}

impl<'a> X3dFromSceneGraph<'a> {
    pub fn new(scene: &'a SceneGraph, faces: &'a BTreeMap<FaceId, FaceEntry>) -> Self {
        Self {
            scene,
            faces,
            emissive: false,
            edge_color: EDGE_COLOR,
        }
    }

    pub fn with_emissive(mut self, emissive: bool) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_edge_color(mut self, color: Rgb) -> Self {
        self.edge_color = color;
        self
    }

    fn node(&self, id: SceneNodeId) -> Result<XmlNode> {
        let node = self
            .scene
            .node(id)
            .ok_or_else(|| Error::structure(format!("scene node {} does not exist", id.0)))?;

        let mut element = transform(&node.transform).attr("DEF", def_name(&format!("node_{}", node.path)));
        element.push(
            XmlNode::new("MetadataString")
                .attr("containerField", "metadata")
                .attr("name", "name")
                .attr("value", format!("\"{}\"", node.name.replace('"', "\\\""))),
        );

        if let Some(mesh) = &node.mesh {
            let colored: Vec<(FaceId, Rgb, &[Triangle])> = node
                .faces
                .iter()
                .filter_map(|&id| self.faces.get(&id).map(|entry| (id, entry)))
                .filter_map(|(id, entry)| {
                    let color = entry.color.filter(|c| *c != node.color)?;
                    let triangles = mesh.triangles.get(entry.triangles.clone())?;
                    Some((id, color, triangles))
                })
                .filter(|(_, _, triangles)| !triangles.is_empty())
                .collect();

            if colored.is_empty() {
                element.push(mesh_shape(mesh, node.color, self.emissive));
            } else {
                let mut covered = vec![false; mesh.triangles.len()];
                for (id, ..) in &colored {
                    if let Some(entry) = self.faces.get(id) {
                        covered[entry.triangles.clone()].fill(true);
                    }
                }
                let base: Vec<Triangle> = mesh
                    .triangles
                    .iter()
                    .zip(&covered)
                    .filter_map(|(t, &c)| (!c).then_some(*t))
                    .collect();

                let coords = def_name(&format!("coords_{}", node.path));
                let mut groups: Vec<(Option<FaceId>, Rgb, &[Triangle])> = Vec::new();
                if !base.is_empty() {
                    groups.push((None, node.color, base.as_slice()));
                }
                groups.extend(colored.iter().map(|&(id, color, tris)| (Some(id), color, tris)));

                for (i, (face, color, triangles)) in groups.into_iter().enumerate() {
                    let coord = if i == 0 {
                        coordinate(mesh, Some(&coords))
                    } else {
                        XmlNode::new("Coordinate").attr("USE", coords.as_str())
                    };
                    let mut shape = XmlNode::new("Shape")
                        .child(appearance(color, self.emissive))
                        .child(triangle_set(mesh, triangles, coord));
                    if let Some(face) = face {
                        shape.set_attr("DEF", face.to_string());
                    }
                    element.push(shape);
                }
            }
        }

        if let Some(edges) = node.edges.as_ref().filter(|e| !e.is_empty()) {
            element.push(lines_shape(edges, self.edge_color));
        }

        for (child, _) in self.scene.children(id) {
            element.push(self.node(child)?);
        }
        Ok(element)
    }
}

impl X3dExport for X3dFromSceneGraph<'_> {
    fn scene_content(&self) -> Result<Vec<XmlNode>> {
        let root = self.node(self.scene.root_id())?;
        debug!(
            nodes = self.scene.node_count(),
            faces = self.faces.len(),
            "built X3D graph"
        );
        Ok(vec![root])
    }

    fn title(&self) -> &str {
        &self.scene.root().name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, DocumentNode};
    use crate::geometry::{Edge, Primitive, Wire};
    use crate::scene::SceneGraphBuilder;
    use nalgebra::{Matrix4, Point3, Vector3};

    fn cube() -> Shape {
        Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_shape()
    }

    /// assembly → [left(red), right(moved)], face 0 of the part is blue
    fn assembly() -> Document {
        let mut document = Document::with_name("asm");
        let part = document.add_shape(cube());
        let left = document.add_node(
            DocumentNode::new(Some("left".into()))
                .with_shape(part)
                .with_color(Some(Rgb::new(1.0, 0.0, 0.0))),
        );
        let right = document.add_node(
            DocumentNode::new(Some("right".into()))
                .with_shape(part)
                .with_transform(Matrix4::new_translation(&Vector3::new(3.0, 0.0, 0.0))),
        );
        let assembly = document.add_node(DocumentNode::new(Some("assembly".into())));
        document.add_child(assembly, left).unwrap();
        document.add_child(assembly, right).unwrap();
        document.add_root(assembly).unwrap();
        document.set_face_color(part, 0, Rgb::new(0.0, 0.0, 1.0));
        document
    }

    #[test]
    fn test_shape_exporter_flags() {
        let shape = cube();
        let plain = X3dShapeExporter::new(&shape).with_normals(false).to_x3d_graph().unwrap();
        assert!(plain.descendants("Normal").is_empty());
        assert!(plain.descendants("IndexedLineSet").is_empty());

        let full = X3dShapeExporter::new(&shape)
            .with_edges(true)
            .with_color(Rgb::new(0.5, 0.5, 0.5))
            .with_emissive(true)
            .to_x3d_graph()
            .unwrap();
        assert_eq!(full.descendants("Normal").len(), 1);
        assert_eq!(full.descendants("IndexedLineSet").len(), 1);
        assert_eq!(
            full.descendants("Material")[0].get_attr("emissiveColor"),
            Some("0.5 0.5 0.5")
        );
    }

    #[test]
    fn test_shape_exporter_requires_faces() {
        let edge = Shape::Edge(Edge::line(Point3::origin(), Point3::new(1.0, 0.0, 0.0)));
        assert!(X3dShapeExporter::new(&edge).to_xml().is_err());
    }

    #[test]
    fn test_curve_exporter() {
        let wire = Wire::polygon(&[
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ]);
        let graph = X3dCurveExporter::new(wire).to_x3d_graph().unwrap();
        let sets = graph.descendants("IndexedLineSet");
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].get_attr("coordIndex"), Some("0 1 2 3 -1"));
    }

    #[test]
    fn test_scene_exporter_accumulates() {
        let mut scene = X3dSceneExporter::new().with_title("parts");
        scene.add_shape(&cube(), Rgb::new(0.5, 0.5, 0.5), true).unwrap();
        scene
            .add_curve(
                &Shape::Edge(Edge::line(Point3::origin(), Point3::new(0.0, 0.0, 2.0))),
                Rgb::new(0.0, 1.0, 0.0),
            )
            .unwrap();
        assert!(scene.add_shape(&Shape::Compound(vec![]), Rgb::NEUTRAL, false).is_err());
        assert_eq!(scene.len(), 2);

        let html = scene.to_x3dom_html().unwrap();
        assert!(html.contains("<title>parts</title>"));
        assert!(html.contains("DEF=\"shape1\""));
    }

    #[test]
    fn test_scene_graph_transforms_and_face_groups() {
        let document = assembly();
        let scene = SceneGraphBuilder::default().build(&document).unwrap();
        let graph = X3dFromSceneGraph::new(&scene, scene.face_entries())
            .to_x3d_graph()
            .unwrap();

        let transforms = graph.descendants("Transform");
        assert_eq!(transforms.len(), scene.node_count());
        assert_eq!(transforms[3].get_attr("translation"), Some("3 0 0"));

        // Face 0 of each instance is blue; everything else follows the node color.
        let face_groups: Vec<_> = graph
            .descendants("Shape")
            .into_iter()
            .filter(|s| s.get_attr("DEF").is_some_and(|d| d.starts_with("face")))
            .collect();
        assert_eq!(face_groups.len(), 2);
        assert_eq!(graph.descendants("Coordinate").iter().filter(|c| c.get_attr("USE").is_some()).count(), 2);

        let colors: Vec<_> = graph
            .descendants("Material")
            .iter()
            .filter_map(|m| m.get_attr("diffuseColor"))
            .collect();
        assert!(colors.contains(&"1 0 0"));
        assert!(colors.contains(&"0 0 1"));
    }

    #[test]
    fn test_scene_graph_xml_and_html() {
        let document = Document::from_shape(cube(), Some("cube".to_string()));
        let scene = SceneGraphBuilder::default().build(&document).unwrap();
        let exporter = X3dFromSceneGraph::new(&scene, scene.face_entries());
        let xml = exporter.to_xml().unwrap();
        assert!(xml.contains("<Transform"));
        assert!(xml.contains("IndexedTriangleSet"));
        let html = exporter.to_x3dom_html().unwrap();
        assert!(html.contains("<title>cube</title>"));
    }
}
