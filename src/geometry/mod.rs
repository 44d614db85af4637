// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry primitives shared by the mesh engine and its algorithms

mod bbox;
mod sphere;

pub use bbox::BoundingBox;
pub use sphere::Sphere;
