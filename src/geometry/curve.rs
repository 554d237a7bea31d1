// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Curves, edges and wires

use super::Frame;
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

const MAX_SEGMENTS: usize = 1024;
const LINEAR_EPS: f64 = 1e-9;

/// Number of chords needed to approximate an arc of `radius` spanning `span` radians.
///
/// The step angle is the smaller of the angular deflection and the angle whose
/// chord stays within `precision` of the arc.
pub fn arc_segments(radius: f64, span: f64, precision: f64, angular_deflection: f64) -> usize {
    let mut step = angular_deflection.max(1e-3);
    if precision > 0.0 && radius > precision {
        let chord_step = 2.0 * (1.0 - precision / radius).acos();
        if chord_step > 0.0 {
            step = step.min(chord_step);
        }
    }
    ((span.abs() / step).ceil() as usize).clamp(1, MAX_SEGMENTS)
}

/// Unbounded parametric curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Curve {
    /// `origin + t * direction`, direction is unit length
    Line {
        origin: Point3<f64>,
        direction: Vector3<f64>,
    },
    /// `frame.origin + radius * (cos t * x + sin t * y)`
    Circle { frame: Frame, radius: f64 },
    /// Piecewise linear, parameter `i` is the i-th point
    Polyline { points: Vec<Point3<f64>> },
}

impl Curve {
    pub fn point(&self, t: f64) -> Point3<f64> {
        match self {
            Self::Line { origin, direction } => origin + direction * t,
            Self::Circle { frame, radius } => frame.origin + frame.radial(t) * *radius,
            Self::Polyline { points } => match points.len() {
                0 => Point3::origin(),
                1 => points[0],
                n => {
                    let t = t.clamp(0.0, (n - 1) as f64);
                    let i = (t.floor() as usize).min(n - 2);
                    let s = t - i as f64;
                    points[i] + (points[i + 1] - points[i]) * s
                }
            },
        }
    }

    /// Parameter of the point on the curve closest to `p`
    pub fn parameter(&self, p: &Point3<f64>) -> f64 {
        match self {
            Self::Line { origin, direction } => (p - origin).dot(direction),
            Self::Circle { frame, .. } => {
                let local = frame.local(p);
                local.y.atan2(local.x)
            }
            Self::Polyline { points } => points
                .iter()
                .enumerate()
                .min_by(|a, b| {
                    let da = (a.1 - p).norm_squared();
                    let db = (b.1 - p).norm_squared();
                    da.total_cmp(&db)
                })
                .map(|(i, _)| i as f64)
                .unwrap_or(0.0),
        }
    }

    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Self {
        match self {
            Self::Line { origin, direction } => Self::Line {
                origin: matrix.transform_point(origin),
                direction: matrix
                    .transform_vector(direction)
                    .try_normalize(1e-12)
                    .unwrap_or(*direction),
            },
            Self::Circle { frame, radius } => {
                let (frame, scale) = frame.transformed(matrix);
                Self::Circle {
                    frame,
                    radius: radius * scale,
                }
            }
            Self::Polyline { points } => Self::Polyline {
                points: points.iter().map(|p| matrix.transform_point(p)).collect(),
            },
        }
    }
}

/// Bounded, oriented piece of a curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub curve: Curve,
    pub first: f64,
    pub last: f64,
    /// Traversed from `last` to `first` when set
    pub reversed: bool,
}

impl Edge {
    pub fn new(curve: Curve, first: f64, last: f64) -> Self {
        Self {
            curve,
            first,
            last,
            reversed: false,
        }
    }

    pub fn line(start: Point3<f64>, end: Point3<f64>) -> Self {
        let delta = end - start;
        let length = delta.norm();
        let direction = if length > 0.0 {
            delta / length
        } else {
            Vector3::x()
        };
        Self::new(
            Curve::Line {
                origin: start,
                direction,
            },
            0.0,
            length,
        )
    }

    pub fn circle(frame: Frame, radius: f64) -> Self {
        Self::new(Curve::Circle { frame, radius }, 0.0, TAU)
    }

    /// Counter-clockwise arc around `frame.z` from angle `first` to `last`
    pub fn arc(frame: Frame, radius: f64, first: f64, mut last: f64) -> Self {
        while last <= first {
            last += TAU;
        }
        while last - first > TAU + LINEAR_EPS {
            last -= TAU;
        }
        Self::new(Curve::Circle { frame, radius }, first, last)
    }

    pub fn polyline(points: Vec<Point3<f64>>) -> Self {
        let last = points.len().saturating_sub(1) as f64;
        Self::new(Curve::Polyline { points }, 0.0, last)
    }

    pub fn reverse(mut self) -> Self {
        self.reversed = !self.reversed;
        self
    }

    pub fn start(&self) -> Point3<f64> {
        if self.reversed {
            self.curve.point(self.last)
        } else {
            self.curve.point(self.first)
        }
    }

    pub fn end(&self) -> Point3<f64> {
        if self.reversed {
            self.curve.point(self.first)
        } else {
            self.curve.point(self.last)
        }
    }

    pub fn is_closed(&self) -> bool {
        (self.start() - self.end()).norm() < LINEAR_EPS
    }

    pub fn length(&self) -> f64 {
        match &self.curve {
            Curve::Line { .. } => (self.last - self.first).abs(),
            Curve::Circle { radius, .. } => radius * (self.last - self.first).abs(),
            Curve::Polyline { points } => points.windows(2).map(|w| (w[1] - w[0]).norm()).sum(),
        }
    }

    /// True when the edge collapses to a point
    pub fn is_degenerate(&self) -> bool {
        self.length() < LINEAR_EPS
    }

    /// Polyline approximation in traversal order
    pub fn discretize(&self, precision: f64, angular_deflection: f64) -> Vec<Point3<f64>> {
        let mut points = match &self.curve {
            Curve::Line { .. } => vec![self.curve.point(self.first), self.curve.point(self.last)],
            Curve::Circle { radius, .. } => {
                let span = self.last - self.first;
                let n = arc_segments(*radius, span, precision, angular_deflection);
                (0..=n)
                    .map(|i| self.curve.point(self.first + span * i as f64 / n as f64))
                    .collect()
            }
            Curve::Polyline { points } => points.clone(),
        };
        if self.reversed {
            points.reverse();
        }
        points
    }

    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Self {
        Self {
            curve: self.curve.transformed(matrix),
            ..self.clone()
        }
    }
}

/// Ordered chain of edges
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Wire {
    pub edges: Vec<Edge>,
}

impl Wire {
    pub fn new(edges: Vec<Edge>) -> Self {
        Self { edges }
    }

    /// Closed wire made of straight segments through `points`
    pub fn polygon(points: &[Point3<f64>]) -> Self {
        let mut closed = points.to_vec();
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            if (first - last).norm() > LINEAR_EPS {
                closed.push(*first);
            }
        }
        Self::new(vec![Edge::polyline(closed)])
    }

    /// Same loop traversed the other way
    pub fn reverse(self) -> Self {
        Self::new(self.edges.into_iter().rev().map(Edge::reverse).collect())
    }

    pub fn is_closed(&self) -> bool {
        match (self.edges.first(), self.edges.last()) {
            (Some(first), Some(last)) => (first.start() - last.end()).norm() < 1e-6,
            _ => false,
        }
    }

    /// Chained discretization with junction points emitted once
    pub fn discretize(&self, precision: f64, angular_deflection: f64) -> Vec<Point3<f64>> {
        let mut points: Vec<Point3<f64>> = Vec::new();
        for edge in &self.edges {
            for p in edge.discretize(precision, angular_deflection) {
                if points.last().map_or(true, |q| (q - p).norm() > LINEAR_EPS) {
                    points.push(p);
                }
            }
        }
        points
    }

    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Self {
        Self::new(self.edges.iter().map(|e| e.transformed(matrix)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_arc_segments_respects_deflection() {
        let coarse = arc_segments(10.0, TAU, 1.0, PI);
        let fine = arc_segments(10.0, TAU, 0.01, PI);
        assert!(fine > coarse);
        assert_eq!(arc_segments(10.0, TAU, 100.0, PI / 2.0), 4);
    }

    #[test]
    fn test_reversed_edge_endpoints() {
        let edge = Edge::line(Point3::origin(), Point3::new(2.0, 0.0, 0.0)).reverse();
        assert_relative_eq!(edge.start(), Point3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(edge.end(), Point3::origin());
        assert_eq!(edge.discretize(0.1, 0.5)[0], Point3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_circle_is_closed() {
        let edge = Edge::circle(Frame::world(), 3.0);
        assert!(edge.is_closed());
        let points = edge.discretize(0.01, 0.2);
        assert!(points.len() > 10);
        for p in &points {
            assert_relative_eq!(p.coords.norm(), 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_arc_normalizes_range() {
        let edge = Edge::arc(Frame::world(), 1.0, PI, -PI / 2.0);
        assert_relative_eq!(edge.last - edge.first, PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(edge.end(), Point3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_polygon_wire_closes() {
        let wire = Wire::polygon(&[
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        assert!(wire.is_closed());
        assert_eq!(wire.discretize(0.1, 0.5).len(), 4);
    }
}
