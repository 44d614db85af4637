// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometric processing algorithms layered on the mesh contract
//!
//! Everything here consumes a [`TriMesh`](crate::TriMesh) through its
//! public editing operations plus the broad-phase
//! [`SphereCache`](crate::SphereCache); none of it owns topology state.

mod cache;
mod extract;
mod intersect;
mod sharp;
mod split;

pub use cache::{build_element_cache, count_intersecting, push_intersecting};
pub use extract::{extract_class, merge_elements, merge_vertices};
pub use intersect::{line_triangle_intersection, nearest_point_on_triangle};
pub use sharp::{count_sharp_edges, flip_sharp_edges};
pub use split::{split_edges, split_intersecting};

/// Tolerance shared by the intersection and containment tests.
pub(crate) const INT_EPS: f64 = 1e-8;
