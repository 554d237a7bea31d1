// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Parallel projection of shape edges to SVG

use super::write_atomic;
use crate::document::Rgb;
use crate::error::{Error, Result};
use crate::geometry::Shape;
use crate::tessellate::{tessellate_curves, TessellationParams};
use nalgebra::{Point2, Vector3};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::io::Write as _;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct SvgOptions {
    /// View direction, from the eye towards the model
    pub direction: Vector3<f64>,
    /// Output width in user units; height follows the drawing's aspect ratio
    pub width: f64,
    pub margin: f64,
    pub stroke: Rgb,
    pub stroke_width: f64,
    pub precision: f64,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            direction: Vector3::new(-1.0, -1.0, -1.0),
            width: 800.0,
            margin: 10.0,
            stroke: Rgb::new(0.0, 0.0, 0.0),
            stroke_width: 1.0,
            precision: 0.1,
        }
    }
}

impl SvgOptions {
    pub fn with_direction(mut self, direction: Vector3<f64>) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }
}

/// Screen axes for a view direction; world Z stays up unless looking along it
fn view_axes(direction: &Vector3<f64>) -> Result<(Vector3<f64>, Vector3<f64>)> {
    let view = direction
        .try_normalize(1e-12)
        .ok_or_else(|| Error::format("SVG view direction must be non-zero"))?;
    let up = if view.cross(&Vector3::z()).norm() < 1e-9 {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let right = view.cross(&up).normalize();
    let screen_up = right.cross(&view);
    Ok((right, screen_up))
}

/// Projected polylines of every edge of `shape`
fn project(shape: &Shape, options: &SvgOptions) -> Result<Vec<Vec<Point2<f64>>>> {
    let (right, up) = view_axes(&options.direction)?;
    let params = TessellationParams::new(options.precision).with_normals(false);
    let curves = tessellate_curves(shape, &params)?;
    Ok(curves
        .iter()
        .filter(|c| c.points.len() > 1)
        .map(|c| {
            c.points
                .iter()
                .map(|p| Point2::new(p.coords.dot(&right), -p.coords.dot(&up)))
                .collect()
        })
        .collect())
}

fn hex(color: Rgb) -> String {
    let [r, g, b] = color.to_array().map(|c| (c * 255.0).round() as u8);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

fn xml_error(err: impl std::fmt::Display) -> Error {
    Error::Io(std::io::Error::other(err.to_string()))
}

/// SVG document for the edges of `shape` seen along `options.direction`
pub fn shape_to_svg(shape: &Shape, options: &SvgOptions) -> Result<String> {
    let polylines = project(shape, options)?;

    let (mut min, mut max) = (
        Point2::new(f64::INFINITY, f64::INFINITY),
        Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
    );
    for p in polylines.iter().flatten() {
        min = min.inf(p);
        max = max.sup(p);
    }
    let extent = max - min;
    let span = extent.x.max(extent.y).max(1e-9);
    let scale = (options.width - 2.0 * options.margin).max(1.0) / span;
    let width = extent.x * scale + 2.0 * options.margin;
    let height = extent.y * scale + 2.0 * options.margin;

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;

    let mut svg = BytesStart::new("svg");
    svg.push_attribute(("xmlns", "http://www.w3.org/2000/svg"));
    svg.push_attribute(("width", format!("{:.2}", width).as_str()));
    svg.push_attribute(("height", format!("{:.2}", height).as_str()));
    svg.push_attribute(("viewBox", format!("0 0 {:.2} {:.2}", width, height).as_str()));
    writer.write_event(Event::Start(svg)).map_err(xml_error)?;

    let mut group = BytesStart::new("g");
    group.push_attribute(("fill", "none"));
    group.push_attribute(("stroke", hex(options.stroke).as_str()));
    group.push_attribute(("stroke-width", options.stroke_width.to_string().as_str()));
    group.push_attribute(("stroke-linecap", "round"));
    writer.write_event(Event::Start(group)).map_err(xml_error)?;

    for line in &polylines {
        let points = line
            .iter()
            .map(|p| {
                format!(
                    "{:.3},{:.3}",
                    (p.x - min.x) * scale + options.margin,
                    (p.y - min.y) * scale + options.margin
                )
            })
            .collect::<Vec<_>>()
            .join(" ");
        let mut element = BytesStart::new("polyline");
        element.push_attribute(("points", points.as_str()));
        writer.write_event(Event::Empty(element)).map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("g")))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("svg")))
        .map_err(xml_error)?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| Error::format(format!("SVG output is not UTF-8: {}", e)))
}

/// Write the projected edges of `shape` to `path`
pub fn export_shape_to_svg(shape: &Shape, path: impl AsRef<Path>, options: &SvgOptions) -> Result<()> {
    let path = path.as_ref();
    let text = shape_to_svg(shape, options)?;
    write_atomic(path, |out| {
        out.write_all(text.as_bytes())?;
        Ok(())
    })?;
    info!(path = %path.display(), bytes = text.len(), "wrote SVG");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Edge, Primitive};
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use tempfile::TempDir;

    #[test]
    fn test_view_axes_are_orthonormal() {
        for direction in [Vector3::new(-1.0, -1.0, -1.0), Vector3::z(), -Vector3::z()] {
            let (right, up) = view_axes(&direction).unwrap();
            assert_relative_eq!(right.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(up.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(right.dot(&up), 0.0, epsilon = 1e-12);
            assert_relative_eq!(right.dot(&direction), 0.0, epsilon = 1e-12);
        }
        assert!(view_axes(&Vector3::zeros()).is_err());
    }

    #[test]
    fn test_cube_drawing() {
        let cube = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_shape();
        let svg = shape_to_svg(&cube, &SvgOptions::default()).unwrap();
        assert!(svg.starts_with("<?xml"));
        assert!(svg.contains("viewBox=\"0 0 "));
        assert_eq!(svg.matches("<polyline").count(), 12);
    }

    #[test]
    fn test_top_view_keeps_aspect_ratio() {
        let line = Edge::line(Point3::origin(), Point3::new(10.0, 0.0, 0.0));
        let options = SvgOptions::default()
            .with_direction(-Vector3::z())
            .with_width(120.0);
        let svg = shape_to_svg(&Shape::Edge(line), &options).unwrap();
        assert!(svg.contains("width=\"120.00\""));
        assert!(svg.contains("height=\"20.00\""));
    }

    #[test]
    fn test_export_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("torus.svg");
        let torus = Primitive::torus(20.0, 5.0).to_shape();
        export_shape_to_svg(&torus, &path, &SvgOptions::default()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("</svg>"));
    }

    #[test]
    fn test_shape_without_edges_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.svg");
        let result = export_shape_to_svg(&Shape::Compound(vec![]), &path, &SvgOptions::default());
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
