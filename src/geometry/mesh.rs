// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Triangle meshes and polylines produced by tessellation

use super::BoundingBox;
use crate::error::{Error, Result};
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Triangle defined by three vertex indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    pub indices: [usize; 3],
}

impl Triangle {
    pub fn new(indices: [usize; 3]) -> Self {
        Self { indices }
    }

    pub fn flipped(self) -> Self {
        let [a, b, c] = self.indices;
        Self::new([a, c, b])
    }
}

/// Indexed triangle mesh. Normals, when present, run parallel to `positions`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TessellatedMesh {
    pub positions: Vec<Point3<f64>>,
    pub triangles: Vec<Triangle>,
    pub normals: Option<Vec<Vector3<f64>>>,
}

impl TessellatedMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertex_count: usize, triangle_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertex_count),
            triangles: Vec::with_capacity(triangle_count),
            normals: None,
        }
    }

    /// Add a vertex and return its index
    pub fn add_vertex(&mut self, position: Point3<f64>) -> usize {
        self.positions.push(position);
        self.positions.len() - 1
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Append `other`, offsetting its indices. Normals survive only when both
    /// sides carry them.
    pub fn merge(&mut self, other: &TessellatedMesh) {
        let offset = self.positions.len();
        let was_empty = offset == 0;
        self.positions.extend_from_slice(&other.positions);
        self.triangles.extend(other.triangles.iter().map(|t| {
            Triangle::new([
                t.indices[0] + offset,
                t.indices[1] + offset,
                t.indices[2] + offset,
            ])
        }));
        self.normals = match (self.normals.take(), &other.normals) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend_from_slice(theirs);
                Some(mine)
            }
            (None, Some(theirs)) if was_empty => Some(theirs.clone()),
            _ => None,
        };
    }

    /// Transform positions, and normals with the inverse transpose
    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        for p in &mut self.positions {
            *p = matrix.transform_point(p);
        }
        if let Some(normals) = &mut self.normals {
            let normal_matrix = matrix
                .try_inverse()
                .map(|m| m.transpose())
                .unwrap_or(*matrix);
            for n in normals.iter_mut() {
                *n = normal_matrix
                    .transform_vector(n)
                    .try_normalize(1e-12)
                    .unwrap_or(*n);
            }
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.positions)
    }

    /// Check index ranges and normal count
    pub fn validate(&self) -> Result<()> {
        let count = self.positions.len();
        if let Some(bad) = self
            .triangles
            .iter()
            .find(|t| t.indices.iter().any(|&i| i >= count))
        {
            return Err(Error::format(format!(
                "triangle {:?} references a vertex outside 0..{}",
                bad.indices, count
            )));
        }
        if let Some(normals) = &self.normals {
            if normals.len() != count {
                return Err(Error::format(format!(
                    "{} normals for {} vertices",
                    normals.len(),
                    count
                )));
            }
        }
        Ok(())
    }

    /// Area-weighted vertex normals from triangle geometry
    pub fn vertex_normals(&self) -> Vec<Vector3<f64>> {
        let mut sums = vec![Vector3::zeros(); self.positions.len()];
        for triangle in &self.triangles {
            let [a, b, c] = triangle.indices;
            let face_normal = (self.positions[b] - self.positions[a])
                .cross(&(self.positions[c] - self.positions[a]));
            if face_normal.norm() > 1e-12 {
                for &i in &triangle.indices {
                    sums[i] += face_normal;
                }
            }
        }
        sums.into_iter()
            .map(|n| n.try_normalize(1e-12).unwrap_or_else(Vector3::z))
            .collect()
    }

    /// Sum of triangle areas
    pub fn area(&self) -> f64 {
        self.triangles
            .iter()
            .map(|t| {
                let [a, b, c] = t.indices;
                (self.positions[b] - self.positions[a])
                    .cross(&(self.positions[c] - self.positions[a]))
                    .norm()
                    / 2.0
            })
            .sum()
    }
}

/// Polyline approximation of an edge or wire
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TessellatedCurve {
    pub points: Vec<Point3<f64>>,
}

impl TessellatedCurve {
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) if self.points.len() > 2 => (a - b).norm() < 1e-9,
            _ => false,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        for p in &mut self.points {
            *p = matrix.transform_point(p);
        }
    }
}
