// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Analytic surfaces
//!
//! Every surface is parameterized so that `∂P/∂u × ∂P/∂v` points away from
//! the material of a primitive solid. `u` is the angle around `frame.z` for
//! all surfaces of revolution.

use super::{Curve, Edge, Frame};
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

const DEGENERATE_RADIUS: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Surface {
    Plane {
        frame: Frame,
    },
    Cylinder {
        frame: Frame,
        radius: f64,
    },
    /// Radius at `v = 0` is `radius`; `v` runs along the generator
    Cone {
        frame: Frame,
        radius: f64,
        semi_angle: f64,
    },
    /// `v` is the latitude in `[-π/2, π/2]`
    Sphere {
        frame: Frame,
        radius: f64,
    },
    Torus {
        frame: Frame,
        major_radius: f64,
        minor_radius: f64,
    },
}

impl Surface {
    pub fn frame(&self) -> &Frame {
        match self {
            Self::Plane { frame }
            | Self::Cylinder { frame, .. }
            | Self::Cone { frame, .. }
            | Self::Sphere { frame, .. }
            | Self::Torus { frame, .. } => frame,
        }
    }

    pub fn is_planar(&self) -> bool {
        matches!(self, Self::Plane { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Plane { .. } => "plane",
            Self::Cylinder { .. } => "cylinder",
            Self::Cone { .. } => "cone",
            Self::Sphere { .. } => "sphere",
            Self::Torus { .. } => "torus",
        }
    }

    pub fn u_period(&self) -> Option<f64> {
        match self {
            Self::Plane { .. } => None,
            _ => Some(TAU),
        }
    }

    pub fn v_period(&self) -> Option<f64> {
        match self {
            Self::Torus { .. } => Some(TAU),
            _ => None,
        }
    }

    pub fn point(&self, u: f64, v: f64) -> Point3<f64> {
        match self {
            Self::Plane { frame } => frame.point(u, v, 0.0),
            Self::Cylinder { frame, radius } => {
                frame.origin + frame.radial(u) * *radius + frame.z * v
            }
            Self::Cone {
                frame,
                radius,
                semi_angle,
            } => {
                frame.origin
                    + frame.radial(u) * (radius + v * semi_angle.sin())
                    + frame.z * (v * semi_angle.cos())
            }
            Self::Sphere { frame, radius } => {
                frame.origin + frame.radial(u) * (radius * v.cos()) + frame.z * (radius * v.sin())
            }
            Self::Torus {
                frame,
                major_radius,
                minor_radius,
            } => {
                frame.origin
                    + frame.radial(u) * (major_radius + minor_radius * v.cos())
                    + frame.z * (minor_radius * v.sin())
            }
        }
    }

    /// Unit normal following the natural parameter orientation
    pub fn normal(&self, u: f64, v: f64) -> Vector3<f64> {
        match self {
            Self::Plane { frame } => frame.z,
            Self::Cylinder { frame, .. } => frame.radial(u),
            Self::Cone {
                frame, semi_angle, ..
            } => frame.radial(u) * semi_angle.cos() - frame.z * semi_angle.sin(),
            Self::Sphere { frame, .. } | Self::Torus { frame, .. } => {
                frame.radial(u) * v.cos() + frame.z * v.sin()
            }
        }
    }

    /// Parameters of the projection of `p` onto the surface
    pub fn parameters(&self, p: &Point3<f64>) -> (f64, f64) {
        let local = self.frame().local(p);
        let u = local.y.atan2(local.x);
        let rho = (local.x * local.x + local.y * local.y).sqrt();
        match self {
            Self::Plane { .. } => (local.x, local.y),
            Self::Cylinder { .. } => (u, local.z),
            Self::Cone {
                radius, semi_angle, ..
            } => (u, (rho - radius) * semi_angle.sin() + local.z * semi_angle.cos()),
            Self::Sphere { .. } => (u, local.z.atan2(rho)),
            Self::Torus { major_radius, .. } => (u, local.z.atan2(rho - major_radius)),
        }
    }

    /// Curve along `v` at constant `u`
    pub fn u_iso(&self, u: f64, v0: f64, v1: f64) -> Option<Edge> {
        let edge = match self {
            Self::Plane { .. } | Self::Cylinder { .. } | Self::Cone { .. } => {
                Edge::line(self.point(u, v0), self.point(u, v1))
            }
            Self::Sphere { frame, radius } => {
                let circle = Frame::from_axes(frame.origin, frame.radial(u), frame.z);
                meridian(circle, *radius, v0, v1)
            }
            Self::Torus {
                frame,
                major_radius,
                minor_radius,
            } => {
                let center = frame.origin + frame.radial(u) * *major_radius;
                let circle = Frame::from_axes(center, frame.radial(u), frame.z);
                meridian(circle, *minor_radius, v0, v1)
            }
        };
        (!edge.is_degenerate()).then_some(edge)
    }

    /// Curve along `u` at constant `v`
    pub fn v_iso(&self, v: f64, u0: f64, u1: f64) -> Option<Edge> {
        let (frame, radius) = match self {
            Self::Plane { .. } => {
                let edge = Edge::line(self.point(u0, v), self.point(u1, v));
                return (!edge.is_degenerate()).then_some(edge);
            }
            Self::Cylinder { frame, radius } => (frame.origin + frame.z * v, *radius),
            Self::Cone {
                frame,
                radius,
                semi_angle,
            } => (
                frame.origin + frame.z * (v * semi_angle.cos()),
                radius + v * semi_angle.sin(),
            ),
            Self::Sphere { frame, radius } => {
                (frame.origin + frame.z * (radius * v.sin()), radius * v.cos())
            }
            Self::Torus {
                frame,
                major_radius,
                minor_radius,
            } => (
                frame.origin + frame.z * (minor_radius * v.sin()),
                major_radius + minor_radius * v.cos(),
            ),
        };
        if radius.abs() < DEGENERATE_RADIUS {
            return None;
        }
        let base = self.frame();
        let circle = Frame {
            origin: frame,
            ..*base
        };
        Some(Edge::new(Curve::Circle { frame: circle, radius }, u0, u1))
    }

    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Self {
        let (frame, scale) = self.frame().transformed(matrix);
        match self {
            Self::Plane { .. } => Self::Plane { frame },
            Self::Cylinder { radius, .. } => Self::Cylinder {
                frame,
                radius: radius * scale,
            },
            Self::Cone {
                radius, semi_angle, ..
            } => Self::Cone {
                frame,
                radius: radius * scale,
                semi_angle: *semi_angle,
            },
            Self::Sphere { radius, .. } => Self::Sphere {
                frame,
                radius: radius * scale,
            },
            Self::Torus {
                major_radius,
                minor_radius,
                ..
            } => Self::Torus {
                frame,
                major_radius: major_radius * scale,
                minor_radius: minor_radius * scale,
            },
        }
    }
}

fn meridian(frame: Frame, radius: f64, v0: f64, v1: f64) -> Edge {
    if v1 >= v0 {
        Edge::new(Curve::Circle { frame, radius }, v0, v1)
    } else {
        Edge::new(Curve::Circle { frame, radius }, v1, v0).reverse()
    }
}
