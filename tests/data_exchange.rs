// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Reading and writing STEP, IGES, STL and SVG files

use anyhow::Result;
use cadex::document::{Rgb, RootMode, RootShapes};
use cadex::geometry::{Primitive, ShapeKind};
use cadex::io;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tempfile::TempDir;

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Names of the shape-carrying nodes of a document
fn part_names(document: &cadex::Document) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut stack: Vec<_> = document.roots().collect();
    while let Some(node) = stack.pop() {
        if node.shape().is_some() {
            names.insert(node.name().unwrap_or_default().to_string());
        }
        stack.extend(node.children());
    }
    names
}

#[test]
fn test_read_step_ap203_assembly() -> Result<()> {
    let shape = io::read_step_file(data("as1_pe_203.stp"))?;

    assert_eq!(shape.kind(), ShapeKind::Compound);
    assert_eq!(shape.solids().len(), 18);
    assert_eq!(shape.face_count(), 200);

    let bbox = shape.bounding_box();
    assert!((bbox.min.z - 0.0).abs() < 1e-6, "min z {}", bbox.min.z);
    assert!((bbox.max.x - 180.0).abs() < 1e-6, "max x {}", bbox.max.x);
    assert!((bbox.max.y - 150.0).abs() < 1e-6, "max y {}", bbox.max.y);
    assert!((bbox.max.z - 190.0).abs() < 1e-6, "max z {}", bbox.max.z);
    Ok(())
}

#[test]
fn test_read_step_ap214_assembly_structure() -> Result<()> {
    let document = io::read_step_file_with_names_colors(data("as1-oc-214.stp"))?;

    assert_eq!(document.root_ids().len(), 1);
    let root = document.roots().next().unwrap();
    assert_eq!(root.name(), Some("as1"));
    assert!(root.is_assembly());
    assert_eq!(root.children().count(), 4);

    // Shared parts are instanced, not copied
    assert_eq!(document.shapes().len(), 5);
    assert_eq!(document.node_count(), 28);

    let expected: BTreeSet<String> = ["plate", "l-bracket", "bolt", "nut", "rod"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(part_names(&document), expected);
    Ok(())
}

#[test]
fn test_read_step_ap214_colors() -> Result<()> {
    let document = io::read_step_file_with_names_colors(data("as1-oc-214.stp"))?;

    let mut stack: Vec<_> = document.roots().collect();
    let mut seen = BTreeSet::new();
    while let Some(node) = stack.pop() {
        match node.name() {
            Some("plate") => {
                assert_eq!(node.color(), Some(Rgb::new(0.2, 0.4, 0.8)));
                seen.insert("plate");
            }
            Some("l-bracket") => {
                assert_eq!(node.color(), Some(Rgb::new(1.0, 1.0, 0.0)));
                seen.insert("l-bracket");
            }
            Some("rod") => {
                assert_eq!(node.color(), None);
                let shape = node.shape_id().unwrap();
                assert_eq!(document.face_color(shape, 0), Some(Rgb::new(1.0, 0.0, 0.0)));
                assert_eq!(document.face_color(shape, 1), None);
                seen.insert("rod");
            }
            Some("bolt") | Some("nut") => assert_eq!(node.color(), None),
            _ => {}
        }
        stack.extend(node.children());
    }
    assert_eq!(seen.len(), 3);
    Ok(())
}

#[test]
fn test_ap203_and_ap214_carry_the_same_geometry() -> Result<()> {
    let ap203 = io::read_step_file(data("as1_pe_203.stp"))?;
    let ap214 = io::read_step_file(data("as1-oc-214.stp"))?;

    assert_eq!(ap203.face_count(), ap214.face_count());
    assert!(ap203
        .bounding_box()
        .approx_eq(&ap214.bounding_box(), 1e-9));
    Ok(())
}

#[test]
fn test_multiple_roots_sequence_and_compound() -> Result<()> {
    let path = data("stp_multiple_shp_at_root.stp");

    let roots = io::read_step_file_roots(&path)?;
    assert_eq!(roots.len(), 3);
    assert!(roots.iter().all(|s| s.kind() == ShapeKind::Solid));

    match io::read_step_file_with_mode(&path, RootMode::Compound)? {
        RootShapes::Compound(shape) => {
            assert_eq!(shape.kind(), ShapeKind::Compound);
            assert_eq!(shape.solids().len(), 3);
        }
        RootShapes::Sequence(_) => panic!("compound mode returned a sequence"),
    }

    let document = io::read_step_file_with_names_colors(&path)?;
    let names: Vec<_> = document.roots().filter_map(|n| n.name()).collect();
    assert_eq!(names, ["box", "prism", "wedge"]);
    Ok(())
}

#[test]
fn test_read_iges_lens() -> Result<()> {
    let shape = io::read_iges_file(data("sunglasses_lens.igs"))?;

    // Trimmed lens surface plus a free construction line
    assert_eq!(shape.kind(), ShapeKind::Compound);
    assert_eq!(shape.face_count(), 1);
    assert!(!shape.edges().is_empty());

    let bbox = shape.bounding_box();
    assert!((bbox.min.x + 45.0).abs() < 1e-6);
    assert!((bbox.max.x - 45.0).abs() < 1e-6);
    assert!((bbox.max.y - 25.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_read_stl_ascii_and_binary() -> Result<()> {
    let bottle = io::read_stl_file(data("bottle_ascii.stl"))?;
    assert_eq!(bottle.kind(), ShapeKind::Shell);
    assert_eq!(bottle.face_count(), 288);
    assert!(bottle.shells()[0].closed);

    let cube = io::read_stl_file(data("cube_binary.stl"))?;
    assert_eq!(cube.face_count(), 12);
    assert!(cube.shells()[0].closed);
    let size = cube.bounding_box().size();
    assert!((size.x - 10.0).abs() < 1e-6 && (size.z - 10.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_load_picks_format_from_extension() -> Result<()> {
    assert_eq!(io::load(data("cube_binary.stl"))?.face_count(), 12);
    assert_eq!(io::load(data("sunglasses_lens.igs"))?.face_count(), 1);
    assert_eq!(io::load(data("stp_multiple_shp_at_root.stp"))?.solids().len(), 3);
    assert!(io::load(data("notes.txt")).is_err());
    Ok(())
}

#[test]
fn test_write_step_all_protocols_preserves_solids() -> Result<()> {
    let dir = TempDir::new()?;
    let shape = io::read_step_file(data("as1_pe_203.stp"))?;

    for protocol in ["AP203", "AP214IS", "AP242DIS"] {
        let path = dir.path().join(format!("as1_{}.step", protocol));
        io::write_step_file(&shape, &path, protocol)?;

        let text = std::fs::read_to_string(&path)?;
        assert!(text.starts_with("ISO-10303-21;"));

        let restored = io::read_step_file(&path)?;
        assert_eq!(restored.solids().len(), 18, "{}", protocol);
        assert_eq!(restored.face_count(), 200, "{}", protocol);
        assert!(restored
            .bounding_box()
            .approx_eq(&shape.bounding_box(), 1e-6));
    }
    Ok(())
}

#[test]
fn test_write_iges_roundtrip() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("as1.igs");
    let shape = io::read_step_file(data("as1-oc-214.stp"))?;

    io::write_iges_file(&shape, &path)?;
    let restored = io::read_iges_file(&path)?;
    assert_eq!(restored.face_count(), 200);
    assert!(restored
        .bounding_box()
        .approx_eq(&shape.bounding_box(), 1e-4));
    Ok(())
}

#[test]
fn test_write_stl_torus_is_closed() -> Result<()> {
    let dir = TempDir::new()?;
    let torus = Primitive::torus(200.0, 50.0).to_shape();

    for mode in ["ascii", "binary"] {
        let path = dir.path().join(format!("torus_{}.stl", mode));
        io::write_stl_file(&torus, &path, mode)?;

        let restored = io::read_stl_file(&path)?;
        let shells = restored.shells();
        assert_eq!(shells.len(), 1);
        assert!(shells[0].closed, "{} torus is open", mode);
    }
    Ok(())
}

#[cfg(feature = "svg")]
#[test]
fn test_export_svg_of_step_assembly() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("as1.svg");
    let shape = io::read_step_file(data("as1_pe_203.stp"))?;

    io::export_shape_to_svg(&shape, &path, &io::SvgOptions::default())?;
    let svg = std::fs::read_to_string(&path)?;
    assert!(svg.contains("<svg"));
    assert!(svg.matches("<polyline").count() > 100);
    Ok(())
}

#[test]
fn test_failed_write_leaves_no_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nothing.step");

    let empty = cadex::Shape::Compound(Vec::new());
    assert!(io::write_step_file(&empty, &path, "AP214IS").is_err());
    assert!(!path.exists());

    let leftovers = std::fs::read_dir(dir.path())?.count();
    assert_eq!(leftovers, 0);
    Ok(())
}
