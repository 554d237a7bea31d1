// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! X3D and X3DOM export of shapes, curves and assembly scenes

use anyhow::Result;
use cadex::document::Rgb;
use cadex::geometry::{Edge, Primitive, Shape, Wire};
use cadex::io;
use cadex::x3d::{
    X3dCurveExporter, X3dExport, X3dFromSceneGraph, X3dSceneExporter, X3dShapeExporter,
    X3DOM_SCRIPT, X3DOM_STYLESHEET,
};
use cadex::SceneGraphBuilder;
use nalgebra::{Point3, Vector3};
use std::path::PathBuf;
use tempfile::TempDir;

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

#[test]
fn test_shape_exporter_flag_combinations() -> Result<()> {
    let torus = Primitive::torus(20.0, 5.0).to_shape();

    for normals in [false, true] {
        for edges in [false, true] {
            let graph = X3dShapeExporter::new(&torus)
                .with_normals(normals)
                .with_edges(edges)
                .with_precision(0.5)
                .to_x3d_graph()?;

            assert_eq!(graph.descendants("IndexedTriangleSet").len(), 1);
            assert_eq!(graph.descendants("Normal").len(), usize::from(normals));
            assert_eq!(graph.descendants("IndexedLineSet").len(), usize::from(edges));
        }
    }
    Ok(())
}

#[test]
fn test_curve_exporter_over_edges_and_wires() -> Result<()> {
    let edge = Edge::line(Point3::origin(), Point3::new(10.0, 0.0, 0.0));
    let xml = X3dCurveExporter::new(Shape::Edge(edge)).to_xml()?;
    assert!(xml.contains("IndexedLineSet"));
    assert!(!xml.contains("IndexedTriangleSet"));

    let wire = Wire::polygon(&[
        Point3::origin(),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
    ]);
    let graph = X3dCurveExporter::new(Shape::Wire(wire))
        .with_color(Rgb::new(1.0, 0.0, 0.0))
        .to_x3d_graph()?;
    let material = graph.descendants("Material");
    assert_eq!(material[0].get_attr("emissiveColor"), Some("1 0 0"));
    Ok(())
}

#[test]
fn test_scene_exporter_collects_shapes() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("scene.x3d");

    let mut exporter = X3dSceneExporter::new().with_title("parts");
    let gray = Rgb::new(0.5, 0.5, 0.5);
    exporter.add_shape(&Primitive::sphere(5.0).to_shape(), gray, true)?;
    exporter.add_shape(
        &Primitive::cube(Vector3::new(2.0, 2.0, 2.0), true).to_shape(),
        Rgb::new(0.0, 0.0, 1.0),
        false,
    )?;
    let outline = Edge::line(Point3::origin(), Point3::new(0.0, 0.0, 8.0));
    exporter.add_curve(&Shape::Edge(outline), Rgb::new(0.0, 0.0, 0.0))?;
    assert_eq!(exporter.len(), 3);

    exporter.write_x3d(&path)?;
    let xml = std::fs::read_to_string(&path)?;
    assert!(xml.contains("<!DOCTYPE X3D"));
    assert!(xml.contains("emissiveColor=\"0.5 0.5 0.5\""));
    assert!(xml.contains("diffuseColor=\"0 0 1\""));
    assert!(xml.contains("DEF=\"shape2\""));
    Ok(())
}

#[test]
fn test_assembly_scene_to_x3d() -> Result<()> {
    let document = io::read_step_file_with_names_colors(data("as1-oc-214.stp"))?;
    let scene = SceneGraphBuilder::default().build(&document)?;
    let exporter = X3dFromSceneGraph::new(&scene, scene.face_entries());

    let graph = exporter.to_x3d_graph()?;
    assert_eq!(graph.descendants("Transform").len(), scene.node_count());

    // The rod's red face is a separate shape reusing the rod coordinates
    let materials = graph.descendants("Material");
    assert!(materials
        .iter()
        .any(|m| m.get_attr("diffuseColor") == Some("1 0 0")));
    assert!(materials
        .iter()
        .any(|m| m.get_attr("diffuseColor") == Some("1 1 0")));
    assert!(graph
        .descendants("Coordinate")
        .iter()
        .any(|c| c.get_attr("USE").is_some()));

    let xml = exporter.to_xml()?;
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("as1-oc-214"));
    Ok(())
}

#[test]
fn test_assembly_html_uses_x3dom() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("as1.html");
    let document = io::read_step_file_with_names_colors(data("as1_pe_203.stp"))?;
    let scene = SceneGraphBuilder::default().build(&document)?;

    X3dFromSceneGraph::new(&scene, scene.face_entries()).write_html(&path)?;
    let html = std::fs::read_to_string(&path)?;

    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains(X3DOM_SCRIPT));
    assert!(html.contains(X3DOM_STYLESHEET));
    assert!(html.contains("<x3d>"));
    assert!(html.contains("<Scene>"));
    assert_eq!(html.matches("<script").count(), 1);
    assert!(!html.contains("<X3D "));
    // X3DOM needs explicit end tags inside HTML
    assert!(!html.contains("/>"));
    assert!(html.contains("</Coordinate>"));
    Ok(())
}
