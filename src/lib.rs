// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! cadex - CAD data exchange
//!
//! Reads STEP, IGES and STL into assembly [`Document`]s, builds renderable
//! [`SceneGraph`]s from them and writes STEP, IGES, STL, scene JSON, X3D,
//! X3DOM HTML and SVG.

pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod geometry;
pub mod io;
pub mod scene;
pub mod tessellate;
pub mod utils;
pub mod x3d;

pub use document::{Document, DocumentNode, NodeId, Rgb, RootMode, RootShapes, ShapeId};
pub use error::{Error, Result};
pub use geometry::{Primitive, Shape, ShapeKind};
pub use io::{load, load_document, save};
pub use scene::{SceneGraph, SceneGraphBuilder};
pub use tessellate::{tessellate, Tessellation, TessellationParams};
pub use x3d::X3dExport;

/// Read a file and build its scene graph with default settings
pub fn scene_from_file(path: impl AsRef<std::path::Path>) -> Result<SceneGraph> {
    let document = load_document(path)?;
    SceneGraphBuilder::default().build(&document)
}
