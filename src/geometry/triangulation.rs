// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygon triangulation
//!
//! Wrapper around earcutr for planar loops with holes.

use crate::error::{Error, Result};
use nalgebra::Point2;

/// Signed area (positive for counter-clockwise loops)
pub fn signed_area(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let p = points[i];
            let q = points[(i + 1) % n];
            p.x * q.y - q.x * p.y
        })
        .sum::<f64>()
        / 2.0
}

/// Triangulate an outer loop with optional holes. The loops must not repeat
/// their first point at the end. Returns triangle indices into the
/// concatenation `outer ++ holes[0] ++ holes[1] ...`.
pub fn triangulate_polygon_with_holes(
    outer: &[Point2<f64>],
    holes: &[Vec<Point2<f64>>],
) -> Result<Vec<[usize; 3]>> {
    if outer.len() < 3 {
        return Err(Error::tessellation(
            "need at least 3 points in outer boundary",
        ));
    }

    // Triangle: nothing to do
    if outer.len() == 3 && holes.is_empty() {
        return Ok(vec![[0, 1, 2]]);
    }

    let total: usize = outer.len() + holes.iter().map(Vec::len).sum::<usize>();
    let mut vertices = Vec::with_capacity(total * 2);
    let mut hole_indices = Vec::with_capacity(holes.len());

    for p in outer {
        vertices.push(p.x);
        vertices.push(p.y);
    }
    for hole in holes {
        hole_indices.push(vertices.len() / 2);
        for p in hole {
            vertices.push(p.x);
            vertices.push(p.y);
        }
    }

    let indices = earcutr::earcut(&vertices, &hole_indices, 2)
        .map_err(|e| Error::tessellation(format!("triangulation failed: {:?}", e)))?;

    Ok(indices
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64, offset: f64) -> Vec<Point2<f64>> {
        vec![
            Point2::new(offset, offset),
            Point2::new(offset + size, offset),
            Point2::new(offset + size, offset + size),
            Point2::new(offset, offset + size),
        ]
    }

    #[test]
    fn test_signed_area() {
        assert!((signed_area(&square(2.0, 0.0)) - 4.0).abs() < 1e-12);
        let mut cw = square(2.0, 0.0);
        cw.reverse();
        assert!(signed_area(&cw) < 0.0);
    }

    #[test]
    fn test_square_with_hole() {
        let triangles = triangulate_polygon_with_holes(&square(10.0, 0.0), &[square(2.0, 4.0)])
            .unwrap();
        assert_eq!(triangles.len(), 8);
        assert!(triangles.iter().flatten().all(|&i| i < 8));
    }

    #[test]
    fn test_too_few_points() {
        assert!(triangulate_polygon_with_holes(&square(1.0, 0.0)[..2], &[]).is_err());
    }
}
