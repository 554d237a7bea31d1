// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! JSON persistence of scene graphs
//!
//! The document mirrors the node hierarchy. Geometry buffers are flat
//! numeric arrays (`[x0, y0, z0, x1, ...]`), transforms are 16 numbers in
//! row-major order and colors are `[r, g, b]`.

use super::{FaceEntry, FaceId, SceneGraph, SceneNode, SceneNodeId};
use crate::document::{Rgb, MAX_DEPTH};
use crate::error::{Error, Result};
use crate::geometry::{TessellatedCurve, TessellatedMesh, Triangle};
use crate::io::atomic::write_atomic;
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub const FORMAT: &str = "cadex-scene";
pub const VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SceneFile {
    format: String,
    version: u32,
    #[serde(default)]
    generator: String,
    root: NodeRecord,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRecord {
    name: String,
    path: String,
    color: [f64; 3],
    transform: [f64; 16],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mesh: Option<MeshRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    edges: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    faces: Vec<FaceRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MeshRecord {
    vertices: Vec<f64>,
    indices: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    normals: Option<Vec<f64>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FaceRecord {
    id: u32,
    ordinal: usize,
    first_triangle: usize,
    triangle_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<[f64; 3]>,
}

/// Serialize `scene` to a JSON string
pub fn scene_to_json(scene: &SceneGraph) -> Result<String> {
    Ok(serde_json::to_string(&to_file(scene))?)
}

/// Write `scene` to `path` atomically
pub fn write_scene_json(scene: &SceneGraph, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = to_file(scene);
    write_atomic(path, |w| Ok(serde_json::to_writer(w, &file)?))?;
    info!(path = %path.display(), nodes = scene.node_count(), "wrote scene JSON");
    Ok(())
}

/// Rebuild a scene graph (geometry, hierarchy, colors, transforms, face index)
pub fn read_scene_json(path: impl AsRef<Path>) -> Result<SceneGraph> {
    let content = std::fs::read_to_string(path.as_ref())?;
    scene_from_json(&content)
}

pub fn scene_from_json(content: &str) -> Result<SceneGraph> {
    check_nesting(content)?;
    let mut deserializer = serde_json::Deserializer::from_str(content);
    deserializer.disable_recursion_limit();
    let file = SceneFile::deserialize(&mut deserializer)?;
    deserializer.end()?;
    if file.format != FORMAT {
        return Err(Error::format(format!(
            "expected a '{}' document, found '{}'",
            FORMAT, file.format
        )));
    }
    if file.version > VERSION {
        return Err(Error::format(format!(
            "unsupported scene version {}",
            file.version
        )));
    }

    let mut nodes = Vec::new();
    let mut faces = BTreeMap::new();
    let root = from_record(file.root, 1, &mut nodes, &mut faces)?;
    Ok(SceneGraph::from_parts(nodes, root, faces))
}

/// Deepest JSON nesting of a scene within the depth cap: the file object,
/// two levels per node (object and `children` array) and the leaf buffers.
const MAX_NESTING: usize = 1 + 2 * (MAX_DEPTH + 1) + 4;

/// Reject over-deep documents before the recursive deserializer sees them
fn check_nesting(content: &str) -> Result<()> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for byte in content.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(Error::structure(format!(
                        "scene nesting exceeds {} levels",
                        MAX_DEPTH
                    )));
                }
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn to_file(scene: &SceneGraph) -> SceneFile {
    SceneFile {
        format: FORMAT.to_string(),
        version: VERSION,
        generator: format!("cadex {}", env!("CARGO_PKG_VERSION")),
        root: to_record(scene, scene.root_id()),
    }
}

fn to_record(scene: &SceneGraph, id: SceneNodeId) -> NodeRecord {
    let node = &scene.nodes[id.0];
    let mut transform = [0.0; 16];
    transform.copy_from_slice(node.transform.transpose().as_slice());

    let mesh = node.mesh.as_ref().map(|mesh| MeshRecord {
        vertices: mesh.positions.iter().flat_map(|p| [p.x, p.y, p.z]).collect(),
        indices: mesh.triangles.iter().flat_map(|t| t.indices).collect(),
        normals: mesh
            .normals
            .as_ref()
            .map(|normals| normals.iter().flat_map(|n| [n.x, n.y, n.z]).collect()),
    });

    let edges = node.edges.as_ref().map(|curves| {
        curves
            .iter()
            .map(|c| c.points.iter().flat_map(|p| [p.x, p.y, p.z]).collect())
            .collect()
    });

    let faces = node
        .faces
        .iter()
        .filter_map(|id| scene.face(*id).map(|entry| (id, entry)))
        .map(|(id, entry)| FaceRecord {
            id: id.0,
            ordinal: entry.ordinal,
            first_triangle: entry.triangles.start,
            triangle_count: entry.triangles.len(),
            color: entry.color.map(Rgb::to_array),
        })
        .collect();

    NodeRecord {
        name: node.name.clone(),
        path: node.path.clone(),
        color: node.color.to_array(),
        transform,
        mesh,
        edges,
        faces,
        children: node
            .children
            .iter()
            .map(|&child| to_record(scene, child))
            .collect(),
    }
}

fn from_record(
    record: NodeRecord,
    depth: usize,
    nodes: &mut Vec<SceneNode>,
    faces: &mut BTreeMap<FaceId, FaceEntry>,
) -> Result<SceneNodeId> {
    if depth > MAX_DEPTH + 1 {
        return Err(Error::structure(format!(
            "scene nesting exceeds {} levels",
            MAX_DEPTH
        )));
    }

    let id = SceneNodeId(nodes.len());
    let mut node = SceneNode::new(record.name, record.path, Rgb::from_array(record.color));
    node.transform = Matrix4::from_row_slice(&record.transform);
    node.mesh = record.mesh.map(mesh_from_record).transpose()?;
    node.edges = record.edges.map(|curves| {
        curves
            .iter()
            .map(|flat| TessellatedCurve::new(points(flat)))
            .collect()
    });

    for face in record.faces {
        let face_id = FaceId(face.id);
        let triangles = face.first_triangle..face.first_triangle + face.triangle_count;
        if triangles.end > node.triangle_count() {
            return Err(Error::format(format!(
                "{} covers triangles {:?} beyond the mesh of '{}'",
                face_id, triangles, node.name
            )));
        }
        let entry = FaceEntry {
            node: id,
            ordinal: face.ordinal,
            triangles,
            color: face.color.map(Rgb::from_array),
        };
        if faces.insert(face_id, entry).is_some() {
            return Err(Error::format(format!("duplicate {}", face_id)));
        }
        node.faces.push(face_id);
    }
    nodes.push(node);

    for child in record.children {
        let child_id = from_record(child, depth + 1, nodes, faces)?;
        nodes[id.0].children.push(child_id);
    }
    Ok(id)
}

fn mesh_from_record(record: MeshRecord) -> Result<TessellatedMesh> {
    if record.vertices.len() % 3 != 0 || record.indices.len() % 3 != 0 {
        return Err(Error::format(
            "mesh buffers must hold whole vertices and triangles",
        ));
    }
    let mesh = TessellatedMesh {
        positions: points(&record.vertices),
        triangles: record
            .indices
            .chunks_exact(3)
            .map(|c| Triangle::new([c[0], c[1], c[2]]))
            .collect(),
        normals: record.normals.map(|flat| {
            flat.chunks_exact(3)
                .map(|c| Vector3::new(c[0], c[1], c[2]))
                .collect()
        }),
    };
    mesh.validate()?;
    Ok(mesh)
}

fn points(flat: &[f64]) -> Vec<Point3<f64>> {
    flat.chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, DocumentNode};
    use crate::geometry::Primitive;
    use crate::scene::SceneGraphBuilder;
    use crate::tessellate::TessellationParams;
    use nalgebra::Vector3;
    use tempfile::TempDir;

    fn scene() -> SceneGraph {
        let mut document = Document::with_name("fixture");
        let torus = document.add_shape(Primitive::torus(20.0, 5.0).to_shape());
        let cube = document.add_shape(Primitive::cube(Vector3::new(1.0, 2.0, 3.0), true).to_shape());
        let part = document.add_node(
            DocumentNode::new(Some("torus".into()))
                .with_shape(torus)
                .with_transform(Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0))),
        );
        let block = document.add_node(DocumentNode::new(Some("block".into())).with_shape(cube));
        let assembly = document.add_node(
            DocumentNode::new(Some("assembly".into())).with_color(Some(Rgb::new(0.1, 0.2, 0.3))),
        );
        document.add_child(assembly, part).unwrap();
        document.add_child(assembly, block).unwrap();
        document.add_root(assembly).unwrap();
        document.set_face_color(cube, 0, Rgb::new(1.0, 0.0, 0.0));
        SceneGraphBuilder::new(TessellationParams::new(1.0).with_edges(true))
            .build(&document)
            .unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_rendering_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scene.json");
        let original = scene();
        write_scene_json(&original, &path).unwrap();
        let restored = read_scene_json(&path).unwrap();

        assert_eq!(restored.node_count(), original.node_count());
        assert_eq!(restored.depth(), original.depth());
        assert_eq!(restored.triangle_count(), original.triangle_count());
        assert_eq!(restored.face_entries(), original.face_entries());
        assert_eq!(restored.edge_count(), original.edge_count());
        for (a, b) in restored.nodes().iter().zip(original.nodes()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.path, b.path);
            assert_eq!(a.children, b.children);
            assert!((a.transform - b.transform).amax() < 1e-12);
            assert!((a.color.b - b.color.b).abs() < 1e-12);
            assert_eq!(
                a.mesh.as_ref().map(|m| m.vertex_count()),
                b.mesh.as_ref().map(|m| m.vertex_count())
            );
        }
    }

    #[test]
    fn test_layout() {
        let json: serde_json::Value = serde_json::from_str(&scene_to_json(&scene()).unwrap()).unwrap();
        assert_eq!(json["format"], FORMAT);
        let assembly = &json["root"]["children"][0];
        assert_eq!(assembly["name"], "assembly");
        let torus = &assembly["children"][0];
        assert_eq!(torus["transform"][3], 1.0);
        assert_eq!(torus["transform"][7], 2.0);
        assert_eq!(torus["transform"][11], 3.0);
        assert_eq!(torus["color"][2], 0.3);
        assert!(torus["mesh"]["vertices"].as_array().unwrap().len() % 3 == 0);
        assert!(torus["faces"][0]["firstTriangle"].is_number());
    }

    /// Chain of `levels` nested assemblies ending in a cube
    fn chain(levels: usize) -> Document {
        let mut document = Document::with_name("chain");
        let cube = document.add_shape(Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false).to_shape());
        let mut parent = document.add_node(DocumentNode::new(Some("level 0".into())));
        document.add_root(parent).unwrap();
        for level in 1..levels {
            let child = document.add_node(DocumentNode::new(Some(format!("level {}", level))));
            document.add_child(parent, child).unwrap();
            parent = child;
        }
        let leaf = document.add_node(DocumentNode::new(Some("leaf".into())).with_shape(cube));
        document.add_child(parent, leaf).unwrap();
        document
    }

    #[test]
    fn test_deep_hierarchy_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep.json");
        let original = SceneGraphBuilder::default().build(&chain(100)).unwrap();
        assert_eq!(original.depth(), 102);

        write_scene_json(&original, &path).unwrap();
        let restored = read_scene_json(&path).unwrap();
        assert_eq!(restored.node_count(), original.node_count());
        assert_eq!(restored.depth(), original.depth());
        assert_eq!(restored.triangle_count(), 12);
    }

    #[test]
    fn test_nesting_beyond_depth_cap_is_rejected() {
        let deep = format!("{}{}", "[".repeat(MAX_NESTING + 1), "]".repeat(MAX_NESTING + 1));
        assert!(matches!(scene_from_json(&deep), Err(Error::Structure(_))));
        // Brackets inside strings do not count
        let quoted = format!("\"{}\"", "[".repeat(MAX_NESTING + 1));
        assert!(check_nesting(&quoted).is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_indices() {
        let content = r#"{"format":"cadex-scene","version":1,"root":{"name":"r","path":"0",
            "color":[1,1,1],"transform":[1,0,0,0,0,1,0,0,0,0,1,0,0,0,0,1],
            "mesh":{"vertices":[0,0,0,1,0,0,0,1,0],"indices":[0,1,5]}}}"#;
        assert!(matches!(scene_from_json(content), Err(Error::Format(_))));
    }

    #[test]
    fn test_rejects_foreign_documents() {
        assert!(matches!(
            scene_from_json(r#"{"format":"other","version":1,"root":{}}"#),
            Err(Error::Format(_))
        ));
        assert!(matches!(scene_from_json("[1, 2"), Err(Error::Format(_))));
    }
}
