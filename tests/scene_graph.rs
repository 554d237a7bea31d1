// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene graphs built from STEP assemblies and their JSON form

use anyhow::Result;
use cadex::document::Rgb;
use cadex::io;
use cadex::scene::{read_scene_json, write_scene_json, SceneGraph, SceneNodeId};
use cadex::{SceneGraphBuilder, TessellationParams};
use std::path::PathBuf;
use tempfile::TempDir;

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

fn find(scene: &SceneGraph, name: &str) -> Vec<SceneNodeId> {
    scene
        .pre_order()
        .into_iter()
        .filter(|&id| scene.node(id).map_or(false, |n| n.name == name))
        .collect()
}

#[test]
fn test_scene_from_step_assembly() -> Result<()> {
    let document = io::read_step_file_with_names_colors(data("as1-oc-214.stp"))?;
    let scene = SceneGraphBuilder::default().build(&document)?;

    // Synthetic root named after the file, then the as1 tree
    assert_eq!(scene.root().name, "as1-oc-214");
    assert_eq!(scene.node_count(), document.node_count() + 1);
    assert_eq!(scene.depth(), 5);

    let as1: Vec<_> = scene.children(scene.root_id()).map(|(_, n)| n.name.clone()).collect();
    assert_eq!(as1, ["as1"]);

    assert_eq!(find(&scene, "bolt").len(), 6);
    assert_eq!(find(&scene, "nut").len(), 8);
    assert!(scene.triangle_count() > 0);
    Ok(())
}

#[test]
fn test_instances_are_placed() -> Result<()> {
    let document = io::read_step_file_with_names_colors(data("as1_pe_203.stp"))?;
    let scene = SceneGraphBuilder::default().build(&document)?;

    let mut origins: Vec<(i64, i64, i64)> = find(&scene, "bolt")
        .into_iter()
        .map(|id| {
            let m = scene.world_transform(id);
            (
                m[(0, 3)].round() as i64,
                m[(1, 3)].round() as i64,
                m[(2, 3)].round() as i64,
            )
        })
        .collect();
    origins.sort();
    assert_eq!(
        origins,
        [
            (25, 25, 10),
            (25, 50, 10),
            (55, 25, 10),
            (125, 25, 10),
            (125, 50, 10),
            (155, 25, 10),
        ]
    );
    Ok(())
}

#[test]
fn test_color_inheritance_and_face_colors() -> Result<()> {
    let document = io::read_step_file_with_names_colors(data("as1-oc-214.stp"))?;
    let default = Rgb::new(0.3, 0.3, 0.3);
    let scene = SceneGraphBuilder::default()
        .with_default_color(default)
        .build(&document)?;

    for id in find(&scene, "plate") {
        assert_eq!(scene.node(id).unwrap().color, Rgb::new(0.2, 0.4, 0.8));
    }
    for id in find(&scene, "l-bracket") {
        assert_eq!(scene.node(id).unwrap().color, Rgb::new(1.0, 1.0, 0.0));
    }
    // No color anywhere above the bolts
    for id in find(&scene, "bolt") {
        assert_eq!(scene.node(id).unwrap().color, default);
    }

    let rod = find(&scene, "rod")[0];
    let rod_faces: Vec<_> = scene
        .face_entries()
        .values()
        .filter(|f| f.node == rod)
        .collect();
    assert_eq!(rod_faces.len(), 6);
    let red: Vec<_> = rod_faces.iter().filter(|f| f.color.is_some()).collect();
    assert_eq!(red.len(), 1);
    assert_eq!(red[0].ordinal, 0);
    assert_eq!(red[0].color, Some(Rgb::new(1.0, 0.0, 0.0)));
    Ok(())
}

#[test]
fn test_parallel_build_matches_sequential() -> Result<()> {
    let document = io::read_step_file_with_names_colors(data("as1-oc-214.stp"))?;
    let builder = SceneGraphBuilder::new(TessellationParams::new(0.5).with_edges(true));

    let sequential = builder.build(&document)?;
    let parallel = builder.build_parallel(&document)?;
    assert_eq!(sequential, parallel);
    Ok(())
}

#[test]
fn test_json_roundtrip_of_assembly_scene() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("as1.json");
    let document = io::read_step_file_with_names_colors(data("as1_pe_203.stp"))?;
    let scene = SceneGraphBuilder::default().build(&document)?;

    write_scene_json(&scene, &path)?;
    let restored = read_scene_json(&path)?;

    assert_eq!(restored.node_count(), scene.node_count());
    assert_eq!(restored.depth(), scene.depth());
    assert_eq!(restored.triangle_count(), scene.triangle_count());
    assert_eq!(restored.face_entries().len(), scene.face_entries().len());
    assert_eq!(restored.root().name, scene.root().name);
    Ok(())
}

#[test]
fn test_stl_and_iges_scenes_have_one_part() -> Result<()> {
    for name in ["bottle_ascii.stl", "sunglasses_lens.igs"] {
        let scene = cadex::scene_from_file(data(name))?;
        assert_eq!(scene.node_count(), 2, "{}", name);
        assert!(scene.triangle_count() > 0, "{}", name);
    }
    Ok(())
}

#[test]
fn test_shallow_depth_limit_rejects_assembly() -> Result<()> {
    let document = io::read_step_file_with_names_colors(data("as1_pe_203.stp"))?;
    let result = SceneGraphBuilder::default()
        .with_max_depth(3)
        .build(&document);
    assert!(matches!(result, Err(cadex::Error::Structure(_))));
    Ok(())
}
