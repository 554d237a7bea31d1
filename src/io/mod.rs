// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Format gateways: STEP, IGES and STL readers/writers over one trait

pub mod atomic;
pub mod iges;
pub mod step;
pub mod stl;
#[cfg(feature = "svg")]
pub mod svg;

pub use atomic::{write_atomic, write_bytes_atomic};
pub use iges::{read_iges_file, write_iges_file, IgesFormat};
pub use step::{
    read_step_file, read_step_file_roots, read_step_file_with_mode,
    read_step_file_with_names_colors, write_step_file, StepFormat, StepProtocol,
};
pub use stl::{read_stl_file, write_stl_file, StlFormat, StlMode};
#[cfg(feature = "svg")]
pub use svg::{export_shape_to_svg, SvgOptions};

use crate::document::{Document, RootMode, RootShapes};
use crate::error::{Error, Result};
use crate::geometry::Shape;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Whether SVG export was compiled in
pub const HAVE_SVG: bool = cfg!(feature = "svg");

/// Reader/writer for one interchange format
pub trait ShapeFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower-case file extensions handled by this format
    fn extensions(&self) -> &'static [&'static str];

    fn read(&self, bytes: &[u8], name: Option<String>) -> Result<Document>;

    fn write(&self, shape: &Shape, out: &mut dyn Write) -> Result<()>;
}

/// Lower-cased extension of `path`
pub fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub(crate) fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

/// Pick the gateway for a file extension
pub fn format_for_path(path: impl AsRef<Path>) -> Result<Box<dyn ShapeFormat>> {
    let path = path.as_ref();
    let ext = extension(path).unwrap_or_default();
    let formats: [Box<dyn ShapeFormat>; 3] = [
        Box::new(StepFormat::default()),
        Box::new(IgesFormat),
        Box::new(StlFormat::default()),
    ];
    formats
        .into_iter()
        .find(|f| f.extensions().contains(&ext.as_str()))
        .ok_or_else(|| {
            Error::format(format!(
                "unsupported file extension '{}' for {}",
                ext,
                path.display()
            ))
        })
}

/// Read an assembly document, format chosen from the extension
pub fn load_document(path: impl AsRef<Path>) -> Result<Document> {
    let path = path.as_ref();
    let format = format_for_path(path)?;
    load_document_with(format.as_ref(), path)
}

/// Read a file as one shape (compound when it has several roots)
pub fn load(path: impl AsRef<Path>) -> Result<Shape> {
    let document = load_document(path)?;
    match document.root_shapes(RootMode::Compound)? {
        RootShapes::Compound(shape) => Ok(shape),
        RootShapes::Sequence(shapes) => Ok(Shape::Compound(shapes)),
    }
}

pub(crate) fn load_document_with(format: &dyn ShapeFormat, path: &Path) -> Result<Document> {
    let bytes = std::fs::read(path)?;
    let document = format.read(&bytes, file_stem(path))?;
    if document.root_ids().is_empty() {
        return Err(Error::format(format!(
            "{} file {} has no root shape",
            format.name(),
            path.display()
        )));
    }
    info!(
        path = %path.display(),
        format = format.name(),
        roots = document.root_ids().len(),
        shapes = document.shapes().len(),
        "read document"
    );
    Ok(document)
}

/// Write `shape` atomically with `format`
pub fn save(shape: &Shape, path: impl AsRef<Path>, format: &dyn ShapeFormat) -> Result<()> {
    let path = path.as_ref();
    if shape.is_empty() {
        return Err(Error::format(format!(
            "cannot write an empty shape to {}",
            path.display()
        )));
    }
    write_atomic(path, |out| format.write(shape, out))?;
    info!(path = %path.display(), format = format.name(), "wrote shape");
    Ok(())
}
