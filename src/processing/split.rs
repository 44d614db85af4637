// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Refinement: long-edge splitting and self-intersection splitting

use std::collections::BTreeSet;

use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

use crate::error::{MeshError, MeshResult};
use crate::geometry::Sphere;
use crate::mesh::TriMesh;

use super::cache::build_element_cache;

/// Split every edge longer than `threshold` at its midpoint.
///
/// Midpoint vertices are parked in each edge's scratch slot first;
/// every triangle then emits 1, 2, 3, or 4 sub-triangles depending on
/// how many of its edges were split, and the whole triangle array is
/// replaced in one batch. Returns the number of edges split.
pub fn split_edges(mesh: &mut TriMesh, threshold: f64) -> MeshResult<usize> {
    let pairs: Vec<(u32, u32)> = mesh.edges.iter().map(|(_, e)| e.nodes()).collect();
    let mut split = 0;

    for (a, b) in pairs {
        let p1 = mesh.vertex(a);
        let p2 = mesh.vertex(b);
        let store = if (p2 - p1).norm() < threshold {
            None
        } else {
            split += 1;
            Some(mesh.add_vertex(Point3::from((p1.coords + p2.coords) / 2.0)))
        };
        if let Some(edge) = mesh.edges.get_mut(a, b) {
            edge.store = store;
        }
    }

    let mut faces = Vec::with_capacity(mesh.triangle_count());
    for e in 0..mesh.triangle_count() as u32 {
        split_element(mesh, e, &mut faces)?;
    }
    mesh.replace_elements(faces)?;

    info!(split, threshold, "edge splitting complete");
    Ok(split)
}

/// Emit the sub-triangles of `e` according to the midpoints parked on
/// its edges. Returns how many triangles were emitted.
fn split_element(mesh: &TriMesh, e: u32, faces: &mut Vec<[u32; 3]>) -> MeshResult<usize> {
    let [p1, p2, p3] = mesh.triangle(e);
    let store = |a: u32, b: u32| -> MeshResult<Option<u32>> {
        Ok(mesh
            .edges
            .get(a, b)
            .ok_or(MeshError::MissingEdge(a.min(b), a.max(b)))?
            .store)
    };
    let c1 = store(p1, p2)?;
    let c2 = store(p2, p3)?;
    let c3 = store(p3, p1)?;

    let emitted = match (c1, c2, c3) {
        (None, None, None) => {
            faces.push([p1, p2, p3]);
            1
        }
        (None, None, Some(c3)) => {
            faces.push([p1, p2, c3]);
            faces.push([c3, p2, p3]);
            2
        }
        (None, Some(c2), None) => {
            faces.push([p1, p2, c2]);
            faces.push([p1, c2, p3]);
            2
        }
        (Some(c1), None, None) => {
            faces.push([p1, c1, p3]);
            faces.push([c1, p2, p3]);
            2
        }
        (None, Some(c2), Some(c3)) => {
            split_element_two(mesh, faces, p1, p2, p3, c2, c3);
            3
        }
        (Some(c1), None, Some(c3)) => {
            split_element_two(mesh, faces, p2, p3, p1, c3, c1);
            3
        }
        (Some(c1), Some(c2), None) => {
            split_element_two(mesh, faces, p3, p1, p2, c1, c2);
            3
        }
        (Some(c1), Some(c2), Some(c3)) => {
            faces.push([p1, c1, c3]);
            faces.push([c1, p2, c2]);
            faces.push([c3, c2, p3]);
            faces.push([c1, c2, c3]);
            4
        }
    };
    Ok(emitted)
}

/// Two-split case: the edges opposite `p1` and `p2` carry midpoints
/// `c2` and `c3`. The quad left beside the common corner triangle is
/// cut along the shorter of the two possible internal diagonals.
fn split_element_two(
    mesh: &TriMesh,
    faces: &mut Vec<[u32; 3]>,
    p1: u32,
    p2: u32,
    p3: u32,
    c2: u32,
    c3: u32,
) {
    let d1 = mesh.vertex(p1) - mesh.vertex(c2);
    let d2 = mesh.vertex(p2) - mesh.vertex(c3);

    faces.push([c3, c2, p3]);
    if d1.norm_squared() < d2.norm_squared() {
        faces.push([p1, c2, c3]);
        faces.push([p1, p2, c2]);
    } else {
        faces.push([p2, c2, c3]);
        faces.push([p1, p2, c3]);
    }
}

fn tri_normal(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Vector3<f64> {
    (a - b).cross(&(a - c))
}

/// Resolve self-intersections by inserting a vertex at every confirmed
/// edge/triangle crossing and re-triangulating each affected triangle
/// over its accumulated point set. Returns the number of triangles
/// re-triangulated.
///
/// When a crossing lands exactly on an edge endpoint, that endpoint is
/// reused instead of inserting a duplicate vertex.
pub fn split_intersecting(mesh: &mut TriMesh) -> MeshResult<usize> {
    let ne = mesh.triangle_count();
    let cache = build_element_cache(mesh);
    let mut elemnodes: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); ne];

    // The edge walk inserts vertices as it confirms hits, so it runs
    // over a snapshot of the edge list with incident faces attached.
    let edge_snapshot: Vec<(u32, u32, Vec<u32>)> = mesh
        .edges
        .iter()
        .map(|(_, e)| (e.node1(), e.node2(), e.faces().to_vec()))
        .collect();

    for (n1, n2, efaces) in edge_snapshot {
        let p1 = mesh.vertex(n1);
        let p2 = mesh.vertex(n2);
        if p1 == p2 {
            debug!(n1, n2, "skipping zero-length edge");
            continue;
        }

        let query = Sphere::new(
            Point3::from((p1.coords + p2.coords) / 2.0),
            (p2 - p1).norm() / 2.0,
        );

        for e in cache.intersect(&query) {
            let [ia, ib, ic] = mesh.triangle(e);
            if [ia, ib, ic].iter().any(|&v| v == n1 || v == n2) {
                continue;
            }
            let Some(pi) = super::intersect::line_triangle_intersection(mesh, e, &p1, &p2) else {
                continue;
            };
            if [ia, ib, ic].iter().any(|&v| mesh.vertex(v) == pi) {
                continue;
            }

            debug!(n1, n2, element = e, "edge intersects element");
            if pi == p1 {
                elemnodes[e as usize].insert(n1);
            } else if pi == p2 {
                elemnodes[e as usize].insert(n2);
            } else {
                let idx = mesh.add_vertex(pi);
                debug!(vertex = idx, element = e, "inserted intersection vertex");
                elemnodes[e as usize].insert(idx);
                // The edge's own faces must also learn the new vertex.
                for &ei in &efaces {
                    elemnodes[ei as usize].insert(idx);
                }
            }
        }
    }

    let mut faces = Vec::with_capacity(ne);
    let mut retriangulated = 0;
    for e in 0..ne {
        if elemnodes[e].is_empty() {
            faces.push(mesh.triangle(e as u32));
        } else {
            let [ia, ib, ic] = mesh.triangle(e as u32);
            elemnodes[e].insert(ia);
            elemnodes[e].insert(ib);
            elemnodes[e].insert(ic);
            debug!(element = e, points = elemnodes[e].len(), "triangulating element");
            triangulate_element(mesh, e as u32, &mut faces, &elemnodes[e]);
            retriangulated += 1;
        }
    }

    mesh.replace_elements(faces)?;
    info!(retriangulated, "intersection splitting complete");
    Ok(retriangulated)
}

/// Brute-force empty-circumsphere triangulation of a point set lying
/// on triangle `e`: every vertex triple whose circumsphere contains no
/// other candidate is emitted, wound to match the original face.
/// O(n^4), acceptable for the handful of points a split produces.
fn triangulate_element(mesh: &TriMesh, e: u32, faces: &mut Vec<[u32; 3]>, nodes: &BTreeSet<u32>) {
    let ids: Vec<u32> = nodes.iter().copied().collect();
    let pts: Vec<Point3<f64>> = ids.iter().map(|&id| mesh.vertex(id)).collect();
    let np = ids.len();
    debug_assert!(np >= 3);

    let [ia, ib, ic] = mesh.triangle(e);
    let en = tri_normal(&mesh.vertex(ia), &mesh.vertex(ib), &mesh.vertex(ic));

    for i in 0..np.saturating_sub(2) {
        for j in i + 1..np - 1 {
            for k in j + 1..np {
                let Some(sphere) = Sphere::circumsphere(&pts[i], &pts[j], &pts[k]) else {
                    debug!("degenerate candidate triple");
                    continue;
                };

                let mut nearest = sphere.radius * 2.0;
                for (l, p) in pts.iter().enumerate() {
                    if l == i || l == j || l == k {
                        continue;
                    }
                    nearest = nearest.min((sphere.center - p).norm());
                }
                if nearest < sphere.radius {
                    continue;
                }

                let et = tri_normal(&pts[i], &pts[j], &pts[k]);
                if en.dot(&et) > 0.0 {
                    faces.push([ids[i], ids[j], ids[k]]);
                } else {
                    faces.push([ids[i], ids[k], ids[j]]);
                }
            }
        }
    }
}
