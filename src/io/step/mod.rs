// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! STEP (ISO 10303-21) gateway

mod parser;
mod reader;
mod writer;

pub use parser::{Entity, Record, StepFile, Value};
pub use writer::StepProtocol;

use super::{file_stem, load_document_with, save, ShapeFormat};
use crate::document::{Document, RootMode, RootShapes};
use crate::error::{Error, Result};
use crate::geometry::Shape;
use std::io::Write;
use std::path::Path;

/// STEP reader/writer bound to an application protocol
#[derive(Debug, Clone)]
pub struct StepFormat {
    pub protocol: StepProtocol,
    pub product_name: String,
}

impl StepFormat {
    pub fn new(protocol: StepProtocol) -> Self {
        Self {
            protocol,
            product_name: "cadex".to_string(),
        }
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }
}

impl Default for StepFormat {
    fn default() -> Self {
        Self::new(StepProtocol::default())
    }
}

impl ShapeFormat for StepFormat {
    fn name(&self) -> &'static str {
        "STEP"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["step", "stp"]
    }

    fn read(&self, bytes: &[u8], name: Option<String>) -> Result<Document> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::format(format!("STEP file is not valid text: {}", e)))?;
        reader::read_document(text, name)
    }

    fn write(&self, shape: &Shape, out: &mut dyn Write) -> Result<()> {
        let text = writer::write_step(shape, self.protocol, &self.product_name)?;
        out.write_all(text.as_bytes())?;
        Ok(())
    }
}

/// Read a STEP file as one shape (a compound when it has several roots)
pub fn read_step_file(path: impl AsRef<Path>) -> Result<Shape> {
    match read_step_file_with_mode(path, RootMode::Compound)? {
        RootShapes::Compound(shape) => Ok(shape),
        RootShapes::Sequence(shapes) => Ok(Shape::Compound(shapes)),
    }
}

/// Read a STEP file as one shape per root
pub fn read_step_file_roots(path: impl AsRef<Path>) -> Result<Vec<Shape>> {
    Ok(read_step_file_with_mode(path, RootMode::Sequence)?.into_shapes())
}

pub fn read_step_file_with_mode(path: impl AsRef<Path>, mode: RootMode) -> Result<RootShapes> {
    read_step_file_with_names_colors(path)?.root_shapes(mode)
}

/// Read the assembly structure with product names and presentation colors
pub fn read_step_file_with_names_colors(path: impl AsRef<Path>) -> Result<Document> {
    load_document_with(&StepFormat::default(), path.as_ref())
}

/// Write `shape` with the protocol named `"AP203"`, `"AP214IS"` or `"AP242DIS"`
pub fn write_step_file(shape: &Shape, path: impl AsRef<Path>, protocol: &str) -> Result<()> {
    let path = path.as_ref();
    let protocol: StepProtocol = protocol.parse()?;
    let format = StepFormat::new(protocol).with_product_name(file_stem(path).unwrap_or_else(|| "cadex".into()));
    save(shape, path, &format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Primitive, ShapeKind};
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_preserves_solids() {
        let dir = TempDir::new().unwrap();
        let shape = Shape::Compound(vec![
            Primitive::torus(200.0, 50.0).to_shape(),
            Primitive::cylinder(10.0, 2.0).to_shape(),
        ]);
        for protocol in ["AP203", "AP214IS", "AP242DIS"] {
            let path = dir.path().join(format!("pair_{}.stp", protocol));
            write_step_file(&shape, &path, protocol).unwrap();
            let restored = read_step_file(&path).unwrap();
            assert_eq!(restored.solids().len(), 2);
            assert_eq!(restored.face_count(), shape.face_count());
        }
    }

    #[test]
    fn test_unknown_protocol_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.stp");
        let shape = Primitive::sphere(1.0).to_shape();
        assert!(matches!(
            write_step_file(&shape, &path, "AP209"),
            Err(Error::Format(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_single_solid_roundtrip_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ball.step");
        write_step_file(&Primitive::sphere(5.0).to_shape(), &path, "AP214IS").unwrap();

        let document = read_step_file_with_names_colors(&path).unwrap();
        assert_eq!(document.name.as_deref(), Some("ball"));
        let root = document.roots().next().unwrap();
        assert_eq!(root.name(), Some("ball"));
        assert_eq!(read_step_file(&path).unwrap().kind(), ShapeKind::Solid);
        assert_eq!(read_step_file_roots(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            read_step_file("/nonexistent/dir/missing.stp"),
            Err(Error::Io(_))
        ));
    }
}
