// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Broad-phase self-intersection queries through the sphere cache

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

use crate::error::MeshResult;
use crate::geometry::Sphere;
use crate::mesh::TriMesh;
use crate::scache::SphereCache;

use super::intersect::line_triangle_intersection;

/// Build a sphere cache holding every triangle's circumsphere, grown
/// by 1% so boundary contacts stay conservative. Degenerate triangles
/// are skipped.
pub fn build_element_cache(mesh: &TriMesh) -> SphereCache {
    let mut cache = SphereCache::new(mesh.min_corner(), mesh.extent(), 16);

    debug!("constructing element cache");
    for e in 0..mesh.triangle_count() as u32 {
        let [ia, ib, ic] = mesh.triangle(e);
        let (pa, pb, pc) = (mesh.vertex(ia), mesh.vertex(ib), mesh.vertex(ic));
        match Sphere::circumsphere(&pa, &pb, &pc) {
            Some(mut sphere) => {
                sphere.radius *= 1.01;
                cache.insert(e, sphere);
            }
            None => debug!(element = e, "skipping degenerate element"),
        }
    }
    cache
}

/// A confirmed edge/triangle crossing: the edge endpoints, the pierced
/// triangle, and the intersection point.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EdgeFaceHit {
    pub n1: u32,
    pub n2: u32,
    pub face: u32,
    pub point: Point3<f64>,
}

/// Run every edge against the cache and confirm candidates with the
/// exact line-triangle test. Candidates sharing a vertex with the edge
/// are not self-intersections and are skipped; so are zero-length
/// edges.
pub(crate) fn collect_edge_face_hits(mesh: &TriMesh, cache: &SphereCache) -> Vec<EdgeFaceHit> {
    let mut hits = Vec::new();

    debug!("intersecting edges with elements");
    for (_, edge) in mesh.edges.iter() {
        if edge.face_count() == 0 {
            debug!(n1 = edge.node1(), n2 = edge.node2(), "skipping unreferenced edge");
            continue;
        }
        let (n1, n2) = edge.nodes();
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
            if let Some(point) = line_triangle_intersection(mesh, e, &p1, &p2) {
                hits.push(EdgeFaceHit {
                    n1,
                    n2,
                    face: e,
                    point,
                });
            }
        }
    }
    hits
}

/// A hit exactly on one of the pierced triangle's corners is a contact,
/// not a crossing.
fn is_corner_contact(mesh: &TriMesh, hit: &EdgeFaceHit) -> bool {
    mesh.triangle(hit.face)
        .iter()
        .any(|&v| mesh.vertex(v) == hit.point)
}

/// Count confirmed self-intersections without modifying the mesh.
pub fn count_intersecting(mesh: &mut TriMesh) -> usize {
    let cache = build_element_cache(mesh);
    let count = collect_edge_face_hits(mesh, &cache)
        .iter()
        .filter(|hit| !is_corner_contact(mesh, hit))
        .count();
    info!(count, "self-intersection count");
    count
}

/// Separate intersecting regions by nudging the vertices of every
/// crossing edge along the pierced triangles' normals.
///
/// Each affected vertex accumulates the normals of the triangles its
/// edges pierce; the sum is normalized and scaled to 1% of the
/// vertex's shortest incident edge before being applied. Returns the
/// number of confirmed intersections.
pub fn push_intersecting(mesh: &mut TriMesh) -> MeshResult<usize> {
    mesh.calc_face_normals();
    let cache = build_element_cache(mesh);
    let hits: Vec<_> = collect_edge_face_hits(mesh, &cache)
        .into_iter()
        .filter(|hit| !is_corner_contact(mesh, hit))
        .collect();

    let mut push: HashMap<u32, Vector3<f64>> = HashMap::new();
    for hit in &hits {
        let normal = mesh.face_normal(hit.face);
        *push.entry(hit.n1).or_insert_with(Vector3::zeros) += normal;
        *push.entry(hit.n2).or_insert_with(Vector3::zeros) += normal;
    }

    let mut moves: Vec<(u32, Vector3<f64>)> = push.into_iter().collect();
    moves.sort_unstable_by_key(|(v, _)| *v);

    for (v, dir) in moves {
        let Some(dir) = dir.try_normalize(f64::MIN_POSITIVE) else {
            continue;
        };
        let step = dir * (mesh.minimum_edge_length_at(v) * 0.01);
        debug!(vertex = v, "pushing vertex");
        let target = mesh.vertex(v) + step;
        mesh.move_vertex(v, target)?;
    }

    info!(intersections = hits.len(), "push pass complete");
    Ok(hits.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriMesh;

    /// A small horizontal patch pierced by a vertical triangle whose
    /// long edge passes through the patch interior.
    fn piercing_pair() -> TriMesh {
        TriMesh::from_arrays(
            vec![
                Point3::new(-2.0, -2.0, 0.0),
                Point3::new(2.0, -2.0, 0.0),
                Point3::new(0.0, 2.0, 0.0),
                Point3::new(0.0, 0.0, -1.0),
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(3.0, 0.0, 1.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        )
        .unwrap()
    }

    #[test]
    fn test_count_intersecting_finds_piercing_edge() {
        let mut mesh = piercing_pair();
        // Edge (3, 4) crosses the patch at the origin; edge (3, 5)
        // crosses it as well.
        assert!(count_intersecting(&mut mesh) >= 1);
    }

    #[test]
    fn test_count_intersecting_clean_mesh() {
        let mut mesh = crate::mesh::test_meshes::tetrahedron();
        assert_eq!(count_intersecting(&mut mesh), 0);
    }

    #[test]
    fn test_push_moves_piercing_vertices() {
        let mut mesh = piercing_pair();
        let before3 = mesh.vertex(3);
        let before4 = mesh.vertex(4);

        let n = push_intersecting(&mut mesh).unwrap();
        assert!(n >= 1);
        // The piercing edge endpoints moved.
        assert!(mesh.vertex(3) != before3 || mesh.vertex(4) != before4);
    }

    #[test]
    fn test_element_cache_covers_all_triangles() {
        let mesh = crate::mesh::test_meshes::tetrahedron();
        let cache = build_element_cache(&mesh);
        assert_eq!(cache.len(), mesh.triangle_count());
    }
}
