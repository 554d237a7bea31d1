// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Single-file conversion runner

use crate::config::ExchangeConfig;
use crate::document::{Document, RootShapes};
use crate::geometry::Shape;
use crate::io::{self, IgesFormat, StepFormat, StlFormat};
use crate::scene::{write_scene_json, SceneGraph};
use crate::x3d::{X3dExport, X3dFromSceneGraph};
use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Output format selected from a file extension or `--format`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Step,
    Iges,
    Stl,
    Json,
    X3d,
    Html,
    Svg,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 7] = [
        Self::Step,
        Self::Iges,
        Self::Stl,
        Self::Json,
        Self::X3d,
        Self::Html,
        Self::Svg,
    ];

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = io::extension(path)
            .ok_or_else(|| anyhow!("Output file has no extension: {}", path.display()))?;
        ext.parse()
    }

    /// Extension used for generated file names
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Iges => "igs",
            Self::Stl => "stl",
            Self::Json => "json",
            Self::X3d => "x3d",
            Self::Html => "html",
            Self::Svg => "svg",
        }
    }

    /// Whether the output is derived from a scene graph rather than raw shapes
    pub fn needs_scene(&self) -> bool {
        matches!(self, Self::Json | Self::X3d | Self::Html)
    }
}

impl FromStr for TargetFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "step" | "stp" => Ok(Self::Step),
            "iges" | "igs" => Ok(Self::Iges),
            "stl" => Ok(Self::Stl),
            "json" => Ok(Self::Json),
            "x3d" => Ok(Self::X3d),
            "html" | "htm" => Ok(Self::Html),
            "svg" => Ok(Self::Svg),
            other => bail!(
                "Unsupported output format: {} (expected step, iges, stl, json, x3d, html or svg)",
                other
            ),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Step => "STEP",
            Self::Iges => "IGES",
            Self::Stl => "STL",
            Self::Json => "JSON",
            Self::X3d => "X3D",
            Self::Html => "X3DOM HTML",
            Self::Svg => "SVG",
        };
        f.write_str(name)
    }
}

/// Outcome of one conversion
#[derive(Debug, Clone)]
pub struct Conversion {
    pub input: PathBuf,
    pub outputs: Vec<PathBuf>,
    pub format: TargetFormat,
    pub nodes: usize,
    pub triangles: usize,
    pub duration: Duration,
}

/// Runs conversions with one set of settings
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: ExchangeConfig,
}

impl Runner {
    pub fn new(config: ExchangeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Read any supported input into a document
    pub fn load(&self, input: &Path) -> Result<Document> {
        if !input.exists() {
            bail!("Input file not found: {}", input.display());
        }
        io::load_document(input).with_context(|| format!("Failed to read {}", input.display()))
    }

    pub fn build_scene(&self, document: &Document) -> Result<SceneGraph> {
        let builder = self.config.scene_builder();
        let scene = if self.config.parallelism == Some(1) {
            builder.build(document)
        } else {
            builder.build_parallel(document)
        };
        scene.context("Failed to build scene graph")
    }

    /// Convert `input` to `output`, the format taken from the output extension
    pub fn convert(&self, input: &Path, output: &Path) -> Result<Conversion> {
        let format = TargetFormat::from_path(output)?;
        self.convert_to(input, output, format)
    }

    /// Convert with an explicit format.
    ///
    /// In sequence root mode, shape formats write one file per root, suffixed
    /// with the root index, when the input has several roots.
    pub fn convert_to(&self, input: &Path, output: &Path, format: TargetFormat) -> Result<Conversion> {
        let start = Instant::now();
        let document = self.load(input)?;
        debug!(input = %input.display(), %format, "converting");

        let mut conversion = Conversion {
            input: input.to_path_buf(),
            outputs: Vec::new(),
            format,
            nodes: document.node_count(),
            triangles: 0,
            duration: Duration::ZERO,
        };

        if format.needs_scene() {
            let scene = self.build_scene(&document)?;
            conversion.nodes = scene.node_count();
            conversion.triangles = scene.triangle_count();
            match format {
                TargetFormat::Json => write_scene_json(&scene, output)?,
                TargetFormat::X3d => X3dFromSceneGraph::new(&scene, scene.face_entries()).write_x3d(output)?,
                _ => X3dFromSceneGraph::new(&scene, scene.face_entries()).write_html(output)?,
            }
            conversion.outputs.push(output.to_path_buf());
        } else {
            let shapes = match document.root_shapes(self.config.root_mode)? {
                RootShapes::Compound(shape) => vec![shape],
                RootShapes::Sequence(shapes) => shapes,
            };
            let split = shapes.len() > 1;
            for (index, shape) in shapes.iter().enumerate() {
                let target = if split {
                    indexed_path(output, index)
                } else {
                    output.to_path_buf()
                };
                self.write_shape(shape, &target, format)
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                conversion.outputs.push(target);
            }
        }

        conversion.duration = start.elapsed();
        Ok(conversion)
    }

    fn write_shape(&self, shape: &Shape, output: &Path, format: TargetFormat) -> Result<()> {
        match format {
            TargetFormat::Step => {
                let mut step = StepFormat::new(self.config.step_protocol);
                if let Some(stem) = output.file_stem().and_then(|s| s.to_str()) {
                    step = step.with_product_name(stem);
                }
                io::save(shape, output, &step)?;
            }
            TargetFormat::Iges => io::save(shape, output, &IgesFormat)?,
            TargetFormat::Stl => {
                let stl = StlFormat::new(self.config.stl_mode).with_params(self.config.tessellation);
                io::save(shape, output, &stl)?;
            }
            TargetFormat::Svg => write_svg(shape, output)?,
            other => bail!("{} output requires a scene graph", other),
        }
        Ok(())
    }
}

#[cfg(feature = "svg")]
fn write_svg(shape: &Shape, output: &Path) -> Result<()> {
    io::export_shape_to_svg(shape, output, &io::SvgOptions::default())?;
    Ok(())
}

#[cfg(not(feature = "svg"))]
fn write_svg(_shape: &Shape, _output: &Path) -> Result<()> {
    bail!("SVG export is not available in this build")
}

/// `out/part.step` → `out/part_2.step`
fn indexed_path(path: &Path, index: usize) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("shape");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, index, ext),
        None => format!("{}_{}", stem, index),
    };
    path.with_file_name(name)
}

/// Output path for `input` in `dir` with the format's extension
pub fn output_path(input: &Path, dir: &Path, format: TargetFormat) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    dir.join(format!("{}.{}", stem, format.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RootMode;
    use crate::geometry::Primitive;
    use nalgebra::Vector3;
    use tempfile::TempDir;

    fn cube_file(dir: &Path) -> PathBuf {
        let path = dir.join("cube.step");
        let cube = Primitive::cube(Vector3::new(2.0, 2.0, 2.0), false).to_shape();
        io::write_step_file(&cube, &path, "AP214IS").unwrap();
        path
    }

    #[test]
    fn test_target_format_parsing() {
        assert_eq!("STP".parse::<TargetFormat>().unwrap(), TargetFormat::Step);
        assert_eq!(TargetFormat::from_path(Path::new("a/b.htm")).unwrap(), TargetFormat::Html);
        assert!(TargetFormat::from_path(Path::new("noext")).is_err());
        assert!("obj".parse::<TargetFormat>().is_err());
        for format in TargetFormat::ALL {
            assert_eq!(format.extension().parse::<TargetFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_indexed_and_output_paths() {
        assert_eq!(indexed_path(Path::new("out/part.step"), 2), PathBuf::from("out/part_2.step"));
        assert_eq!(
            output_path(Path::new("in/bracket.stp"), Path::new("out"), TargetFormat::Json),
            PathBuf::from("out/bracket.json")
        );
    }

    #[test]
    fn test_convert_to_every_format() {
        let dir = TempDir::new().unwrap();
        let input = cube_file(dir.path());
        let runner = Runner::default();
        for format in TargetFormat::ALL {
            if format == TargetFormat::Svg && !io::HAVE_SVG {
                continue;
            }
            let output = output_path(&input, &dir.path().join("out"), format);
            std::fs::create_dir_all(output.parent().unwrap()).unwrap();
            let conversion = runner.convert(&input, &output).unwrap();
            assert_eq!(conversion.outputs, vec![output.clone()]);
            assert!(std::fs::metadata(&output).unwrap().len() > 0, "{} is empty", format);
            if format.needs_scene() {
                assert_eq!(conversion.triangles, 12);
            }
        }
    }

    #[test]
    fn test_missing_input() {
        let dir = TempDir::new().unwrap();
        let err = Runner::default()
            .convert(&dir.path().join("none.step"), &dir.path().join("out.stl"))
            .unwrap_err();
        assert!(err.to_string().contains("Input file not found"));
    }

    #[test]
    fn test_sequence_mode_splits_roots() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("pair.step");
        let pair = Shape::Compound(vec![
            Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false).to_shape(),
            Primitive::sphere(1.0).to_shape(),
        ]);
        io::write_step_file(&pair, &input, "AP203").unwrap();

        let config = ExchangeConfig {
            root_mode: RootMode::Sequence,
            ..ExchangeConfig::default()
        };
        let document = Runner::new(config.clone()).load(&input).unwrap();
        let roots = document.root_ids().len();

        let output = dir.path().join("pair.stl");
        let conversion = Runner::new(config).convert(&input, &output).unwrap();
        assert_eq!(conversion.outputs.len(), roots);
        if roots > 1 {
            assert!(dir.path().join("pair_0.stl").exists());
            assert!(!output.exists());
        }
    }
}
