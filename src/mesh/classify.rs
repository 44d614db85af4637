// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Connected-component classification and orientation checking

use std::cmp::Reverse;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::MeshResult;

use super::TriMesh;

/// Outcome of an orientation pass over all classes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OrientationReport {
    /// Triangles whose winding was reversed to match their neighbors.
    pub reversed: usize,
    /// Triangles with checked neighbors of conflicting orientation.
    pub disoriented: usize,
    /// Triangles touching an edge shared by more than 2 faces, which
    /// orientation propagation cannot cross.
    pub connectivity_errors: usize,
    /// Triangles never reached from their class seed.
    pub unreachable: usize,
}

impl OrientationReport {
    pub fn is_clean(&self) -> bool {
        self.reversed == 0
            && self.disoriented == 0
            && self.connectivity_errors == 0
            && self.unreachable == 0
    }
}

impl fmt::Display for OrientationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reversed, {} disoriented, {} connectivity errors, {} unreachable",
            self.reversed, self.disoriented, self.connectivity_errors, self.unreachable
        )
    }
}

// Orientation flag values, as tracked per triangle during the sweep.
const ORIENT_UNCHECKED: u8 = 0;
const ORIENT_CHECKED: u8 = 1;
const ORIENT_PROCESSED: u8 = 2;
const ORIENT_CONFLICT: u8 = 3;
const ORIENT_BROKEN: u8 = 4;

impl TriMesh {
    /// Partition triangles into connected classes and reorder the
    /// triangle array into contiguous per-class ranges, largest class
    /// first. Returns the class count.
    ///
    /// Connectivity spreads through shared vertices; vertex order is
    /// untouched and the result is deterministic for a given input
    /// order. Edges and neighbors are rebuilt for the new ordering.
    pub fn classify(&mut self) -> MeshResult<usize> {
        debug!("classifying faces");
        self.rebuild_neighbors()?;

        let n = self.tris.len();
        let mut fclass = vec![usize::MAX; n];
        let mut count = 0usize;

        for seed in 0..n {
            if fclass[seed] != usize::MAX {
                continue;
            }
            fclass[seed] = count;
            let mut queue = vec![seed];
            while let Some(f) = queue.pop() {
                for &v in &self.tris[f] {
                    for nb in self.face_nbrs[v as usize].iter() {
                        let nb = nb as usize;
                        if fclass[nb] == usize::MAX {
                            fclass[nb] = count;
                            queue.push(nb);
                        }
                    }
                }
            }
            count += 1;
        }

        let mut buckets: Vec<Vec<[u32; 3]>> = vec![Vec::new(); count];
        for (f, &c) in fclass.iter().enumerate() {
            buckets[c].push(self.tris[f]);
        }

        let mut order: Vec<usize> = (0..count).collect();
        order.sort_by_key(|&c| (Reverse(buckets[c].len()), c));

        self.tris.clear();
        self.class_sizes.clear();
        for &c in &order {
            self.class_sizes.push(buckets[c].len());
            self.tris.extend_from_slice(&buckets[c]);
        }

        self.invalidate_normals();
        self.edges.clear();
        self.find_edges()?;
        self.rebuild_neighbors()?;

        info!(classes = count, "classification complete");
        Ok(count)
    }

    /// Check and repair winding consistency class by class.
    ///
    /// The first triangle of each class seeds a breadth-first sweep of
    /// face adjacency. Two triangles sharing an edge must traverse its
    /// vertex pair in opposite order; a disagreeing neighbor is fixed
    /// by swapping two of its indices. Edges with more than 2 faces
    /// cannot be crossed and are reported as connectivity errors.
    pub fn check_orientation(&mut self) -> OrientationReport {
        debug!("checking orientation");
        let n = self.tris.len();
        let mut fflags = vec![ORIENT_UNCHECKED; n];

        let mut start = 0;
        for cls in 0..self.class_sizes.len() {
            if start < n {
                fflags[start] = ORIENT_CHECKED;
            }
            start += self.class_sizes[cls];
        }

        let mut reversed = 0usize;
        loop {
            let mut found = false;
            for e in 0..n {
                if fflags[e] != ORIENT_CHECKED {
                    continue;
                }
                found = true;
                fflags[e] = self.orient_neighbors(&mut fflags, e as u32, &mut reversed);
            }
            if !found {
                break;
            }
        }

        let mut report = OrientationReport {
            reversed,
            ..Default::default()
        };
        for &f in &fflags {
            match f {
                ORIENT_CONFLICT => report.disoriented += 1,
                ORIENT_BROKEN => report.connectivity_errors += 1,
                ORIENT_UNCHECKED => report.unreachable += 1,
                _ => {}
            }
        }

        if report.is_clean() {
            debug!(triangles = n, "orientation consistent");
        } else {
            warn!(triangles = n, %report, "orientation check found defects");
        }
        report
    }

    /// Visit the face neighbors of a checked triangle, orienting each
    /// unchecked one against its already-checked neighborhood.
    fn orient_neighbors(&mut self, fflags: &mut [u8], elem: u32, reversed: &mut usize) -> u8 {
        let tri = self.tris[elem as usize];
        let mut n2 = tri[2];
        for m in 0..3 {
            let n1 = tri[m];
            let Some(edge) = self.edges.get(n1, n2) else {
                n2 = n1;
                continue;
            };
            if edge.face_count() > 2 {
                return ORIENT_BROKEN;
            }
            if edge.face_count() == 2 {
                if let Some(el) = edge.other_face(elem) {
                    if fflags[el as usize] == ORIENT_UNCHECKED {
                        fflags[el as usize] = self.orient_element(fflags, el, reversed);
                    }
                }
            }
            n2 = n1;
        }
        ORIENT_PROCESSED
    }

    /// Orient one triangle against its checked neighbors. Returns the
    /// new flag value: checked, conflict, or broken connectivity.
    fn orient_element(&mut self, fflags: &[u8], elem: u32, reversed: &mut usize) -> u8 {
        let tri = self.tris[elem as usize];
        let mut n2 = tri[2];
        let mut rev = false;
        let mut cnt = 0;

        for m in 0..3 {
            let n1 = tri[m];
            let edge = match self.edges.get(n1, n2) {
                Some(e) => e,
                None => {
                    n2 = n1;
                    continue;
                }
            };
            if edge.face_count() > 2 {
                return ORIENT_CHECKED;
            }
            if edge.face_count() < 2 {
                n2 = n1;
                continue;
            }
            let el = edge.other_face(elem).expect("2-face edge has a partner");
            if fflags[el as usize] != ORIENT_CHECKED && fflags[el as usize] != ORIENT_PROCESSED {
                n2 = n1;
                continue;
            }

            let etri = self.tris[el as usize];
            let i = etri
                .iter()
                .position(|&v| v == n1)
                .expect("incident face contains edge endpoint");

            // The neighbor must walk the shared pair in the opposite
            // direction of `elem`; same direction means `elem` is
            // wound backwards relative to it.
            let rr = if etri[(i + 1) % 3] == n2 {
                false
            } else if etri[(i + 2) % 3] == n2 {
                true
            } else {
                return ORIENT_BROKEN;
            };

            if cnt > 0 && rr != rev {
                return ORIENT_CONFLICT;
            }
            rev = rr;
            cnt += 1;
            n2 = n1;
        }

        if cnt == 0 {
            return ORIENT_BROKEN;
        }

        if rev {
            self.tris[elem as usize].swap(0, 1);
            debug!(element = elem, "element reversed");
            self.invalidate_normals();
            *reversed += 1;
        }

        ORIENT_CHECKED
    }

    /// Partition the faces around `v` into fans connected through
    /// manifold (at most 2-face) edges incident to `v`. Returns the
    /// per-face class assignment (parallel to the face-neighbor list)
    /// and the class count.
    pub(crate) fn vertex_fan_classes(&self, v: u32) -> (Vec<u32>, Vec<usize>, usize) {
        let faces: Vec<u32> = self.face_nbrs[v as usize].as_slice().to_vec();
        let nf = faces.len();
        let mut fclass = vec![usize::MAX; nf];
        let mut count = 0usize;

        let local = |faces: &[u32], f: u32| faces.iter().position(|&x| x == f);

        for seed in 0..nf {
            if fclass[seed] != usize::MAX {
                continue;
            }
            fclass[seed] = count;
            let mut queue = vec![seed];
            while let Some(fi) = queue.pop() {
                let tri = self.tris[faces[fi] as usize];
                for u in tri {
                    if u == v {
                        continue;
                    }
                    let Some(edge) = self.edges.get(v, u) else {
                        continue;
                    };
                    if edge.face_count() > 2 {
                        continue;
                    }
                    for &g in edge.faces() {
                        if let Some(gi) = local(&faces, g) {
                            if fclass[gi] == usize::MAX {
                                fclass[gi] = count;
                                queue.push(gi);
                            }
                        }
                    }
                }
            }
            count += 1;
        }

        (faces, fclass, count)
    }

    /// True when the triangles incident to `v` do not form a single
    /// connected fan, i.e. `v` is a pinch point joining otherwise
    /// unconnected sheets.
    pub fn is_singular_vertex(&self, v: u32) -> bool {
        let (_, _, count) = self.vertex_fan_classes(v);
        count > 1
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_meshes::*;
    use super::*;
    use crate::TriMesh;
    use nalgebra::Point3;

    #[test]
    fn test_classify_partition() {
        // Two disconnected components of different sizes.
        let mut mesh = TriMesh::from_arrays(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(5.0, 0.0, 0.0),
                Point3::new(6.0, 0.0, 0.0),
                Point3::new(5.0, 1.0, 0.0),
            ],
            vec![[4, 5, 6], [0, 1, 2], [1, 3, 2]],
        )
        .unwrap();

        let count = mesh.classify().unwrap();
        assert_eq!(count, 2);
        // Largest class comes first.
        assert_eq!(mesh.class_sizes(), &[2, 1]);
        assert_eq!(
            mesh.class_sizes().iter().sum::<usize>(),
            mesh.triangle_count()
        );
        // Classes are contiguous: the first two triangles are the quad,
        // the last is the island.
        assert_eq!(mesh.triangle(2), [4, 5, 6]);
    }

    #[test]
    fn test_classify_single_component() {
        let mut mesh = tetrahedron();
        assert_eq!(mesh.classify().unwrap(), 1);
        assert_eq!(mesh.class_sizes(), &[4]);
    }

    #[test]
    fn test_orientation_consistent_mesh_untouched() {
        let mut mesh = tetrahedron();
        let before: Vec<[u32; 3]> = mesh.triangles().to_vec();
        let report = mesh.check_orientation();
        assert!(report.is_clean());
        assert_eq!(mesh.triangles(), &before[..]);
    }

    #[test]
    fn test_orientation_fixes_reversed_triangle() {
        // Quad with the second triangle deliberately wound backwards.
        let mut mesh = TriMesh::from_arrays(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [1, 2, 3]],
        )
        .unwrap();
        // from_arrays already runs an orientation pass; rebuild the
        // reversed winding and run it directly.
        mesh.tris[1] = [1, 2, 3];
        let report = mesh.check_orientation();
        assert_eq!(report.reversed, 1);
        assert_eq!(mesh.triangle(1), [2, 1, 3]);

        let report = mesh.check_orientation();
        assert!(report.is_clean());
    }

    #[test]
    fn test_singular_vertex_bowtie() {
        let mesh = bowtie();
        assert!(mesh.is_singular_vertex(0));
        for v in 1..5 {
            assert!(!mesh.is_singular_vertex(v));
        }
    }

    #[test]
    fn test_singular_vertex_disc() {
        let mesh = grid(1);
        for v in 0..mesh.vertex_count() as u32 {
            assert!(!mesh.is_singular_vertex(v));
        }
    }
}
