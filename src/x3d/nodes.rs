// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Builders for the X3D elements every exporter emits

use super::xml::XmlNode;
use crate::document::Rgb;
use crate::geometry::{TessellatedCurve, TessellatedMesh, Triangle};
use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3};
use std::fmt::Write;

/// Compact decimal for attribute lists
pub(crate) fn number(value: f64) -> String {
    let rounded = (value * 1e6).round() / 1e6;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        rounded.to_string()
    }
}

fn vectors(items: impl IntoIterator<Item = [f64; 3]>) -> String {
    let mut out = String::new();
    for [x, y, z] in items {
        if !out.is_empty() {
            out.push(' ');
        }
        let _ = write!(out, "{} {} {}", number(x), number(y), number(z));
    }
    out
}

pub(crate) fn color_attr(color: Rgb) -> String {
    vectors([color.to_array()])
}

/// `Appearance` with a diffuse or, when `emissive`, self-lit material
pub fn appearance(color: Rgb, emissive: bool) -> XmlNode {
    let material = if emissive {
        XmlNode::new("Material")
            .attr("diffuseColor", "0 0 0")
            .attr("emissiveColor", color_attr(color))
    } else {
        XmlNode::new("Material").attr("diffuseColor", color_attr(color))
    };
    XmlNode::new("Appearance").child(material)
}

/// `Coordinate` node for the mesh positions, optionally named for reuse
pub fn coordinate(mesh: &TessellatedMesh, def: Option<&str>) -> XmlNode {
    let mut node = XmlNode::new("Coordinate");
    if let Some(def) = def {
        node.set_attr("DEF", def);
    }
    node.attr("point", vectors(mesh.positions.iter().map(|p| [p.x, p.y, p.z])))
}

/// `IndexedTriangleSet` over a subset of the mesh triangles.
///
/// `coord` is either a full `Coordinate` or a `USE` reference to one.
pub fn triangle_set(mesh: &TessellatedMesh, triangles: &[Triangle], coord: XmlNode) -> XmlNode {
    let index = triangles
        .iter()
        .flat_map(|t| t.indices)
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let mut set = XmlNode::new("IndexedTriangleSet")
        .attr("solid", "false")
        .attr("index", index)
        .child(coord);
    if let Some(normals) = &mesh.normals {
        set.set_attr("normalPerVertex", "true");
        set.push(XmlNode::new("Normal").attr("vector", vectors(normals.iter().map(|n| [n.x, n.y, n.z]))));
    }
    set
}

/// `Shape` drawing every triangle of `mesh`
pub fn mesh_shape(mesh: &TessellatedMesh, color: Rgb, emissive: bool) -> XmlNode {
    XmlNode::new("Shape")
        .child(appearance(color, emissive))
        .child(triangle_set(mesh, &mesh.triangles, coordinate(mesh, None)))
}

/// `Shape` with an `IndexedLineSet`, one polyline per curve
pub fn lines_shape(curves: &[TessellatedCurve], color: Rgb) -> XmlNode {
    let mut points = Vec::new();
    let mut index = Vec::new();
    for curve in curves.iter().filter(|c| c.points.len() > 1) {
        for p in &curve.points {
            index.push(points.len().to_string());
            points.push([p.x, p.y, p.z]);
        }
        index.push("-1".to_string());
    }
    let set = XmlNode::new("IndexedLineSet")
        .attr("coordIndex", index.join(" "))
        .child(XmlNode::new("Coordinate").attr("point", vectors(points)));
    XmlNode::new("Shape").child(appearance(color, true)).child(set)
}

/// `Transform` carrying `matrix` as translation, rotation and scale.
///
/// Shear is not representable and is dropped by projecting the linear part
/// onto the nearest rotation.
pub fn transform(matrix: &Matrix4<f64>) -> XmlNode {
    let mut node = XmlNode::new("Transform");
    let translation = Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
    if translation.norm() > 1e-12 {
        node.set_attr("translation", vectors([[translation.x, translation.y, translation.z]]));
    }

    let mut linear: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    let mut scale = Vector3::new(
        linear.column(0).norm(),
        linear.column(1).norm(),
        linear.column(2).norm(),
    );
    for i in 0..3 {
        if scale[i] > 1e-12 {
            let unit = linear.column(i) / scale[i];
            linear.set_column(i, &unit);
        }
    }
    if linear.determinant() < 0.0 {
        scale.x = -scale.x;
        let flipped = -linear.column(0);
        linear.set_column(0, &flipped);
    }

    let rotation = Rotation3::from_matrix(&linear);
    if let Some((axis, angle)) = rotation.axis_angle() {
        if angle.abs() > 1e-12 {
            node.set_attr(
                "rotation",
                format!("{} {}", vectors([[axis.x, axis.y, axis.z]]), number(angle)),
            );
        }
    }
    if (scale - Vector3::repeat(1.0)).norm() > 1e-9 {
        node.set_attr("scale", vectors([[scale.x, scale.y, scale.z]]));
    }
    node
}

/// `DEF` identifier from a free-form label
pub fn def_name(label: &str) -> String {
    let mut name: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use std::f64::consts::FRAC_PI_2;

    fn triangle() -> TessellatedMesh {
        let mut mesh = TessellatedMesh::new();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        mesh.add_vertex(Point3::new(0.0, 1.5, 0.0));
        mesh.add_triangle(Triangle::new([0, 1, 2]));
        mesh
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(number(1.0), "1");
        assert_eq!(number(-0.0000001), "0");
        assert_eq!(number(0.25), "0.25");
    }

    #[test]
    fn test_mesh_shape() {
        let shape = mesh_shape(&triangle(), Rgb::new(1.0, 0.0, 0.0), false);
        let set = shape.find("IndexedTriangleSet").unwrap();
        assert_eq!(set.get_attr("index"), Some("0 1 2"));
        assert_eq!(
            set.find("Coordinate").and_then(|c| c.get_attr("point")),
            Some("0 0 0 1 0 0 0 1.5 0")
        );
        assert!(set.find("Normal").is_none());
        let material = &shape.descendants("Material")[0];
        assert_eq!(material.get_attr("diffuseColor"), Some("1 0 0"));
    }

    #[test]
    fn test_emissive_material() {
        let node = appearance(Rgb::new(0.5, 0.5, 0.5), true);
        let material = node.find("Material").unwrap();
        assert_eq!(material.get_attr("emissiveColor"), Some("0.5 0.5 0.5"));
    }

    #[test]
    fn test_line_set_separators() {
        let curves = vec![
            TessellatedCurve::new(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]),
            TessellatedCurve::new(vec![
                Point3::origin(),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 1.0),
            ]),
        ];
        let shape = lines_shape(&curves, Rgb::NEUTRAL);
        let set = shape.find("IndexedLineSet").unwrap();
        assert_eq!(set.get_attr("coordIndex"), Some("0 1 -1 2 3 4 -1"));
    }

    #[test]
    fn test_identity_transform_has_no_attributes() {
        assert!(transform(&Matrix4::identity()).attributes.is_empty());
    }

    #[test]
    fn test_transform_decomposition() {
        let matrix = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0))
            * Matrix4::from_euler_angles(0.0, 0.0, FRAC_PI_2)
            * Matrix4::new_scaling(2.0);
        let node = transform(&matrix);
        assert_eq!(node.get_attr("translation"), Some("1 2 3"));
        assert_eq!(node.get_attr("rotation"), Some("0 0 1 1.570796"));
        assert_eq!(node.get_attr("scale"), Some("2 2 2"));
    }

    #[test]
    fn test_def_name() {
        assert_eq!(def_name("0:1:2"), "_0_1_2");
        assert_eq!(def_name("Bolt M6"), "Bolt_M6");
    }
}
