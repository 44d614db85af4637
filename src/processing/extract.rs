// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Class extraction and duplicate merging

use tracing::{debug, info, warn};

use crate::error::MeshResult;
use crate::geometry::Sphere;
use crate::mesh::TriMesh;
use crate::scache::SphereCache;

use super::INT_EPS;

/// Copy one connected class out of the mesh into a fresh mesh with a
/// dense 0-based index space. Returns `None` for an out-of-range
/// class.
pub fn extract_class(mesh: &TriMesh, cls: usize) -> MeshResult<Option<TriMesh>> {
    if cls >= mesh.class_count() {
        return Ok(None);
    }
    info!(class = cls, "extracting class");

    let start: usize = mesh.class_sizes()[..cls].iter().sum();
    let size = mesh.class_size(cls);

    // Dense remap in first-seen order.
    let mut fmap: Vec<Option<u32>> = vec![None; mesh.vertex_count()];
    let mut rmap: Vec<u32> = Vec::new();
    for f in start..start + size {
        for v in mesh.triangle(f as u32) {
            if fmap[v as usize].is_none() {
                fmap[v as usize] = Some(rmap.len() as u32);
                rmap.push(v);
            }
        }
    }

    info!(faces = size, vertices = rmap.len(), "class contents");

    let verts = rmap.iter().map(|&v| mesh.vertex(v)).collect();
    let tris = (start..start + size)
        .map(|f| {
            let [a, b, c] = mesh.triangle(f as u32);
            [
                fmap[a as usize].expect("mapped above"),
                fmap[b as usize].expect("mapped above"),
                fmap[c as usize].expect("mapped above"),
            ]
        })
        .collect();

    TriMesh::from_arrays(verts, tris).map(Some)
}

/// Merge vertices occupying the same position (within the intersection
/// tolerance), re-pointing every face of the duplicate at the earlier
/// vertex. Candidate pairs are gathered through a sphere cache of
/// radius `dist` (defaulting to 1% of the average edge length when
/// non-positive). Returns the number of vertices merged away.
pub fn merge_vertices(mesh: &mut TriMesh, dist: f64) -> MeshResult<usize> {
    let dist = if dist <= 0.0 {
        mesh.average_edge_length() / 100.0
    } else {
        dist
    };
    debug!(eps = dist, "checking for coincident vertices");

    let mut cache = SphereCache::new(mesh.min_corner(), mesh.extent(), 16);
    let mut merged = 0;

    for v in 0..mesh.vertex_count() as u32 {
        let pv = mesh.vertex(v);
        let probe = Sphere::new(pv, dist);

        let candidates = cache.intersect(&probe);
        let mut absorbed = false;
        for vi in candidates {
            if (mesh.vertex(vi) - pv).norm() > INT_EPS {
                continue;
            }
            info!(duplicate = v, canonical = vi, "merging coincident vertices");
            if mesh.edge(v, vi).is_some() {
                warn!(v, vi, "edge between coincident vertices");
            }

            while let Some(e) = mesh.face_neighbors(v).first() {
                let tri = mesh.triangle(e).map(|u| if u == v { vi } else { u });
                if tri[0] == tri[1] || tri[0] == tri[2] || tri[1] == tri[2] {
                    // Re-pointing would degenerate this face; drop it.
                    warn!(element = e, "dropping face degenerated by merge");
                    mesh.delete_element(e)?;
                } else {
                    mesh.change_element(e, tri[0], tri[1], tri[2])?;
                }
            }
            absorbed = true;
            merged += 1;
            break;
        }

        if !absorbed {
            cache.insert(v, probe);
        }
    }

    if merged > 0 {
        mesh.recalculate_edges()?;
    }
    info!(merged, "vertex merge complete");
    Ok(merged)
}

/// Delete faces that duplicate an earlier face (same vertex set in any
/// order). Candidates are narrowed through a centroid sphere cache.
/// Returns the number of faces removed.
pub fn merge_elements(mesh: &mut TriMesh) -> MeshResult<usize> {
    let dist = mesh.average_edge_length() / 100.0;
    debug!(eps = dist, "checking for identical elements");

    let mut cache = SphereCache::new(mesh.min_corner(), mesh.extent(), 16);
    let mut victims: Vec<u32> = Vec::new();

    for e in 0..mesh.triangle_count() as u32 {
        let [ia, ib, ic] = mesh.triangle(e);
        let centroid = nalgebra::Point3::from(
            (mesh.vertex(ia).coords + mesh.vertex(ib).coords + mesh.vertex(ic).coords) / 3.0,
        );
        let probe = Sphere::new(centroid, dist);

        let duplicate = cache.intersect(&probe).into_iter().any(|ei| {
            let other = mesh.triangle(ei);
            [ia, ib, ic].iter().all(|v| other.contains(v))
        });

        if duplicate {
            info!(element = e, "duplicate element");
            victims.push(e);
        } else {
            cache.insert(e, probe);
        }
    }

    // Deleting from the highest id down keeps the remaining victim ids
    // valid across swap-with-last relabeling.
    let removed = victims.len();
    for &e in victims.iter().rev() {
        mesh.delete_element(e)?;
    }

    if removed > 0 {
        mesh.recalculate_edges()?;
    }
    info!(removed, "element merge complete");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriMesh;
    use nalgebra::Point3;

    /// Quad plus a distant island triangle: two classes.
    fn two_component_mesh() -> TriMesh {
        TriMesh::from_arrays(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(5.0, 0.0, 0.0),
                Point3::new(6.0, 0.0, 0.0),
                Point3::new(5.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [1, 3, 2], [4, 5, 6]],
        )
        .unwrap()
    }

    #[test]
    fn test_extract_class_remaps_densely() {
        let mesh = two_component_mesh();
        assert_eq!(mesh.class_count(), 2);

        // Class 1 is the island (smaller class sorted last).
        let island = extract_class(&mesh, 1).unwrap().expect("class exists");
        assert_eq!(island.vertex_count(), 3);
        assert_eq!(island.triangle_count(), 1);
        assert_eq!(island.triangle(0), [0, 1, 2]);
        assert_eq!(island.vertex(0), Point3::new(5.0, 0.0, 0.0));

        let quad = extract_class(&mesh, 0).unwrap().expect("class exists");
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.triangle_count(), 2);
    }

    #[test]
    fn test_extract_class_out_of_range() {
        let mesh = two_component_mesh();
        assert!(extract_class(&mesh, 5).unwrap().is_none());
    }

    #[test]
    fn test_merge_vertices_joins_coincident_seam() {
        // Two triangles forming a quad, but the diagonal endpoints are
        // duplicated: vertices 4 and 5 coincide with 1 and 2.
        let mut mesh = TriMesh::from_arrays(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [4, 3, 5]],
        )
        .unwrap();

        let merged = merge_vertices(&mut mesh, 0.1).unwrap();
        assert_eq!(merged, 2);
        // The duplicates became isolated and were dropped by the
        // rebuild; the diagonal is now a real shared edge.
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.edge(1, 2).map(|e| e.face_count()), Some(2));
    }

    #[test]
    fn test_merge_elements_drops_duplicate_face() {
        let mut mesh = TriMesh::from_arrays(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 1]],
        )
        .unwrap();

        let removed = merge_elements(&mut mesh).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(mesh.triangle_count(), 1);
    }
}
