// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Math utilities

use nalgebra::{Point3, Vector3};

/// Unit normal of a counter-clockwise triangle, zero when degenerate
pub fn triangle_normal(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Vector3<f64> {
    let v1 = p1 - p0;
    let v2 = p2 - p0;
    v1.cross(&v2).try_normalize(1e-12).unwrap_or_else(Vector3::zeros)
}

/// Check if two floats are approximately equal
pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// Convert degrees to radians
pub fn deg_to_rad(deg: f64) -> f64 {
    deg * std::f64::consts::PI / 180.0
}

/// Real literal accepted by STEP and IGES readers: always carries a decimal
/// point, switching to exponent form for very small or large magnitudes.
pub fn format_real(value: f64) -> String {
    // normalizes -0.0
    let value = if value == 0.0 { 0.0 } else { value };
    let magnitude = value.abs();
    if value == 0.0 || (1e-4..1e15).contains(&magnitude) {
        let text = value.to_string();
        if text.contains('.') {
            text
        } else {
            format!("{}.", text)
        }
    } else {
        let text = format!("{:E}", value);
        match text.split_once('E') {
            Some((mantissa, exponent)) if !mantissa.contains('.') => {
                format!("{}.E{}", mantissa, exponent)
            }
            _ => text,
        }
    }
}

/// Integer lattice key of a point, used to merge coincident vertices
pub fn quantize(p: &Point3<f64>, resolution: f64) -> [i64; 3] {
    [
        (p.x / resolution).round() as i64,
        (p.y / resolution).round() as i64,
        (p.z / resolution).round() as i64,
    ]
}
