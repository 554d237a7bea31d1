// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Primitive solids built as boundary representations

use super::{Edge, Face, Frame, ParamWindow, Shape, Shell, Solid, Surface, Wire};
use nalgebra::{Point3, Vector3};
use std::f64::consts::{FRAC_PI_2, TAU};

/// Geometric primitives
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Cube { size: Vector3<f64>, center: bool },
    Sphere { r: f64 },
    Cylinder { h: f64, r: f64 },
    Cone { h: f64, r1: f64, r2: f64 },
    Torus { major: f64, minor: f64 },
}

impl Primitive {
    pub fn cube(size: Vector3<f64>, center: bool) -> Self {
        Self::Cube { size, center }
    }

    pub fn sphere(r: f64) -> Self {
        Self::Sphere { r }
    }

    pub fn cylinder(h: f64, r: f64) -> Self {
        Self::Cylinder { h, r }
    }

    pub fn cone(h: f64, r1: f64, r2: f64) -> Self {
        Self::Cone { h, r1, r2 }
    }

    pub fn torus(major: f64, minor: f64) -> Self {
        Self::Torus { major, minor }
    }

    /// Solid with a single closed shell
    pub fn to_shape(&self) -> Shape {
        let faces = match *self {
            Self::Cube { size, center } => cube_faces(size, center),
            Self::Sphere { r } => vec![Face::window(
                Surface::Sphere {
                    frame: Frame::world(),
                    radius: r,
                },
                ParamWindow::new((0.0, TAU), (-FRAC_PI_2, FRAC_PI_2)),
            )],
            Self::Cylinder { h, r } => {
                let mut faces = vec![Face::window(
                    Surface::Cylinder {
                        frame: Frame::world(),
                        radius: r,
                    },
                    ParamWindow::new((0.0, TAU), (0.0, h)),
                )];
                faces.extend(disk(0.0, r, false));
                faces.extend(disk(h, r, true));
                faces
            }
            Self::Cone { h, r1, r2 } => {
                let semi_angle = ((r2 - r1) / h).atan();
                let generator = h / semi_angle.cos();
                let mut faces = vec![Face::window(
                    Surface::Cone {
                        frame: Frame::world(),
                        radius: r1,
                        semi_angle,
                    },
                    ParamWindow::new((0.0, TAU), (0.0, generator)),
                )];
                faces.extend(disk(0.0, r1, false));
                faces.extend(disk(h, r2, true));
                faces
            }
            Self::Torus { major, minor } => vec![Face::window(
                Surface::Torus {
                    frame: Frame::world(),
                    major_radius: major,
                    minor_radius: minor,
                },
                ParamWindow::new((0.0, TAU), (0.0, TAU)),
            )],
        };
        Shape::Solid(Solid::new(Shell::new(faces, true)))
    }
}

/// Planar cap at height `z`, facing up when `top` is set
fn disk(z: f64, r: f64, top: bool) -> Option<Face> {
    if r <= 0.0 {
        return None;
    }
    let normal = if top { Vector3::z() } else { -Vector3::z() };
    let frame = Frame::new(Point3::new(0.0, 0.0, z), normal, Some(Vector3::x()));
    Some(Face::planar(
        frame,
        vec![Wire::new(vec![Edge::circle(frame, r)])],
    ))
}

fn cube_faces(size: Vector3<f64>, center: bool) -> Vec<Face> {
    let min = if center { -size / 2.0 } else { Vector3::zeros() };
    let corner = |i: usize, j: usize, k: usize| {
        Point3::new(
            min.x + size.x * i as f64,
            min.y + size.y * j as f64,
            min.z + size.z * k as f64,
        )
    };

    // Counter-clockwise seen from outside
    let loops = [
        [(0, 0, 0), (0, 1, 0), (1, 1, 0), (1, 0, 0)],
        [(0, 0, 1), (1, 0, 1), (1, 1, 1), (0, 1, 1)],
        [(0, 0, 0), (1, 0, 0), (1, 0, 1), (0, 0, 1)],
        [(0, 1, 0), (0, 1, 1), (1, 1, 1), (1, 1, 0)],
        [(0, 0, 0), (0, 0, 1), (0, 1, 1), (0, 1, 0)],
        [(1, 0, 0), (1, 1, 0), (1, 1, 1), (1, 0, 1)],
    ];

    loops
        .iter()
        .map(|quad| {
            let points: Vec<Point3<f64>> = quad.iter().map(|&(i, j, k)| corner(i, j, k)).collect();
            let edges = (0..4)
                .map(|n| Edge::line(points[n], points[(n + 1) % 4]))
                .collect();
            let normal = (points[1] - points[0]).cross(&(points[2] - points[0]));
            let frame = Frame::new(points[0], normal, Some(points[1] - points[0]));
            Face::planar(frame, vec![Wire::new(edges)])
        })
        .collect()
}
