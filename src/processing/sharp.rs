// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Sharp-edge detection and repair

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::error::MeshResult;
use crate::mesh::TriMesh;

/// Two faces meeting below this normal dot product (about 169 degrees
/// dihedral) form a sharp crease that almost always indicates a folded
/// sliver rather than real geometry.
const SHARP_THRESH: f64 = -0.98;

/// Collect the neighbors of `el` across edge `(v1, v2)` whose face
/// normal opposes `el`'s. Face normals must be current.
fn check_sharp_edge(
    mesh: &TriMesh,
    el: u32,
    v1: u32,
    v2: u32,
    eset: &mut BTreeSet<u32>,
) -> usize {
    let Some(edge) = mesh.edge(v1, v2) else {
        warn!(v1, v2, element = el, "invalid edge on element");
        return 0;
    };

    let n1 = mesh.face_normals[el as usize];
    let mut sharp = 0;
    for &f in edge.faces() {
        if f == el {
            continue;
        }
        if n1.dot(&mesh.face_normals[f as usize]) < SHARP_THRESH {
            debug!(v1, v2, a = el, b = f, "sharp edge");
            eset.insert(f);
            sharp += 1;
        }
    }
    sharp
}

/// Sharp neighbors of `el` across all three of its edges.
fn sharp_neighbors(mesh: &TriMesh, el: u32) -> BTreeSet<u32> {
    let [v1, v2, v3] = mesh.triangle(el);
    let mut eset = BTreeSet::new();
    check_sharp_edge(mesh, el, v1, v2, &mut eset);
    check_sharp_edge(mesh, el, v1, v3, &mut eset);
    check_sharp_edge(mesh, el, v3, v2, &mut eset);
    eset
}

/// Count triangles with at least one sharp incident edge.
pub fn count_sharp_edges(mesh: &mut TriMesh) -> usize {
    debug!("checking for sharp edges");
    mesh.calc_face_normals();

    let mut count = 0;
    for e in 0..mesh.triangle_count() as u32 {
        let eset = sharp_neighbors(mesh, e);
        if !eset.is_empty() {
            debug!(element = e, neighbors = eset.len(), "element has sharp edges");
            count += 1;
        }
    }
    count
}

/// Remove the folded configuration around `e0`: delete its two sharp
/// neighbors and re-point `e0` across the fold, dropping the shared
/// opposite vertex `v0` diagonal.
fn flip_sharp(mesh: &mut TriMesh, e0: u32, e1: u32, e2: u32, v0: u32) -> MeshResult<bool> {
    let t0 = mesh.triangle(e0);
    let contains = |e: u32, v: u32| mesh.triangle(e).contains(&v);

    // Vertices of e0 on exactly one neighbor bound the replacement
    // triangle; the vertex on both is the fold diagonal to drop.
    let mut vl = Vec::new();
    let mut vx = None;
    for v in t0 {
        let matches = contains(e1, v) as usize + contains(e2, v) as usize;
        if matches == 1 {
            vl.push(v);
        } else if matches == 2 {
            vx = Some(v);
        }
    }
    let Some(vx) = vx else {
        warn!(element = e0, "unexpected sharp configuration");
        return Ok(false);
    };
    if vl.len() != 2 {
        warn!(element = e0, "unexpected sharp configuration");
        return Ok(false);
    }
    let (va, vb) = (vl[0], vl[1]);

    // Delete the larger id first and track how swap-with-last
    // relabeling moves the ids we still hold.
    let mut e0 = e0;
    let (hi, lo) = if e1 > e2 { (e1, e2) } else { (e2, e1) };
    for victim in [hi, lo] {
        let last = mesh.triangle_count() as u32 - 1;
        mesh.delete_element(victim)?;
        if e0 == last {
            e0 = victim;
        }
    }

    mesh.change_element(e0, v0, va, vb)?;
    mesh.node_nbrs[vx as usize].remove(v0);

    debug!(element = e0, v0, vx, "sharp configuration removed");
    mesh.recalculate_edges()?;
    Ok(true)
}

/// Repair sharp creases: a triangle with 2 (or 3) sharp neighbors that
/// share a common opposite vertex is replaced together with those
/// neighbors by a single re-triangulation without the crease. Restarts
/// the scan after every modification and iterates to a fixpoint.
/// Returns the number of configurations removed.
pub fn flip_sharp_edges(mesh: &mut TriMesh) -> MeshResult<usize> {
    info!("flipping sharp edges");

    let mut removed = 0;
    loop {
        mesh.calc_face_normals();
        let ne = mesh.triangle_count() as u32;
        let mut modified = false;

        for e in 0..ne {
            let eset = sharp_neighbors(mesh, e);
            if eset.len() < 2 || eset.len() > 3 {
                continue;
            }
            debug!(element = e, neighbors = eset.len(), "sharp element");

            // For each sharp neighbor, its vertex outside e.
            let t0 = mesh.triangle(e);
            let outside: Vec<(u32, u32)> = eset
                .iter()
                .filter_map(|&f| {
                    mesh.triangle(f)
                        .into_iter()
                        .find(|v| !t0.contains(v))
                        .map(|v| (f, v))
                })
                .collect();

            let flipped = match outside.as_slice() {
                [(f1, a), (f2, b)] if a == b => flip_sharp(mesh, e, *f1, *f2, *a)?,
                [(f1, a), (f2, b), (_, c)] if a == b && a != c => {
                    flip_sharp(mesh, e, *f1, *f2, *a)?
                }
                [(f1, a), (_, b), (f3, c)] if a == c && a != b => {
                    flip_sharp(mesh, e, *f1, *f3, *a)?
                }
                [(_, a), (f2, b), (f3, c)] if b == c && a != b => {
                    flip_sharp(mesh, e, *f2, *f3, *b)?
                }
                _ => false,
            };

            if flipped {
                removed += 1;
                modified = true;
                break;
            }
        }

        if !modified {
            break;
        }
    }

    info!(removed, "sharp edge pass complete");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriMesh;
    use nalgebra::Point3;

    /// A flat quad region with a sliver triangle folded back over one
    /// face: edge (1, 2) is shared by a triangle and its fold.
    fn folded_mesh() -> TriMesh {
        TriMesh::from_arrays(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.9, 0.9, 0.0),
            ],
            // [1, 2, 3] folds back over [0, 1, 2]: their normals are
            // opposed while sharing edge (1, 2).
            vec![[0, 1, 2], [1, 2, 3]],
        )
        .unwrap()
    }

    #[test]
    fn test_count_sharp_edges_detects_fold() {
        let mut mesh = folded_mesh();
        // from_arrays' orientation pass may reverse the fold; rebuild
        // the opposing winding directly.
        mesh.tris[1] = [1, 2, 3];
        mesh.invalidate_normals();
        assert_eq!(count_sharp_edges(&mut mesh), 2);
    }

    #[test]
    fn test_no_sharp_edges_on_flat_patch() {
        let mut mesh = crate::mesh::test_meshes::grid(1);
        assert_eq!(count_sharp_edges(&mut mesh), 0);
    }

    #[test]
    fn test_no_sharp_edges_on_tetrahedron() {
        let mut mesh = crate::mesh::test_meshes::tetrahedron();
        assert_eq!(count_sharp_edges(&mut mesh), 0);
    }
}
