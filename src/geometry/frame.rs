// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Right-handed orthonormal placement frames

use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Local coordinate system: origin plus three orthonormal axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub origin: Point3<f64>,
    pub x: Vector3<f64>,
    pub y: Vector3<f64>,
    pub z: Vector3<f64>,
}

impl Frame {
    pub fn world() -> Self {
        Self {
            origin: Point3::origin(),
            x: Vector3::x(),
            y: Vector3::y(),
            z: Vector3::z(),
        }
    }

    /// World-aligned frame translated to `origin`
    pub fn at(origin: Point3<f64>) -> Self {
        Self {
            origin,
            ..Self::world()
        }
    }

    /// Build a frame from a main axis and an optional reference direction.
    ///
    /// The reference direction is projected onto the plane normal to `z`;
    /// when it is missing or parallel to `z` an arbitrary perpendicular is used.
    pub fn new(origin: Point3<f64>, z: Vector3<f64>, x_ref: Option<Vector3<f64>>) -> Self {
        let z = z.try_normalize(1e-12).unwrap_or_else(Vector3::z);
        let x = x_ref
            .map(|x| x - z * x.dot(&z))
            .and_then(|x| x.try_normalize(1e-9))
            .unwrap_or_else(|| perpendicular(&z));
        let y = z.cross(&x);
        Self { origin, x, y, z }
    }

    /// Frame whose first two axes are `x` and `y` (re-orthogonalized)
    pub fn from_axes(origin: Point3<f64>, x: Vector3<f64>, y: Vector3<f64>) -> Self {
        Self::new(origin, x.cross(&y), Some(x))
    }

    pub fn point(&self, a: f64, b: f64, c: f64) -> Point3<f64> {
        self.origin + self.x * a + self.y * b + self.z * c
    }

    /// Unit direction at `angle` in the XY plane of the frame
    pub fn radial(&self, angle: f64) -> Vector3<f64> {
        self.x * angle.cos() + self.y * angle.sin()
    }

    /// Coordinates of `p` expressed in this frame
    pub fn local(&self, p: &Point3<f64>) -> Vector3<f64> {
        let d = p - self.origin;
        Vector3::new(d.dot(&self.x), d.dot(&self.y), d.dot(&self.z))
    }

    /// Matrix mapping local coordinates to world coordinates
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let (x, y, z, o) = (self.x, self.y, self.z, self.origin);
        Matrix4::new(
            x.x, y.x, z.x, o.x, //
            x.y, y.y, z.y, o.y, //
            x.z, y.z, z.z, o.z, //
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Apply an affine transform; returns the moved frame and the length scale
    /// it applied along the frame's x axis.
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> (Self, f64) {
        let x = matrix.transform_vector(&self.x);
        let z = matrix.transform_vector(&self.z);
        let scale = x.norm();
        let frame = Self::new(matrix.transform_point(&self.origin), z, Some(x));
        (frame, if scale > 0.0 { scale } else { 1.0 })
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::world()
    }
}

fn perpendicular(z: &Vector3<f64>) -> Vector3<f64> {
    let seed = if z.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    (seed - z * seed.dot(z)).normalize()
}
