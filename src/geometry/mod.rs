// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - B-rep shapes, primitives and triangle meshes

mod bbox;
mod curve;
mod frame;
mod mesh;
mod primitives;
mod shape;
mod surface;
pub mod triangulation;

pub use bbox::BoundingBox;
pub use curve::{arc_segments, Curve, Edge, Wire};
pub use frame::Frame;
pub use mesh::{TessellatedCurve, TessellatedMesh, Triangle};
pub use primitives::Primitive;
pub use shape::{newell_normal, Face, FaceBounds, ParamWindow, Shape, ShapeKind, Shell, Solid};
pub use surface::Surface;
