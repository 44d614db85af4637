// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Boundary extraction, hole filling, and stitching

use tracing::{debug, info, warn};

use crate::error::MeshResult;

use super::TriMesh;

/// One boundary edge captured at extraction time: its endpoints plus
/// the single incident face, kept for orientation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundaryEdge {
    n1: u32,
    n2: u32,
    face: u32,
}

impl BoundaryEdge {
    fn touches(&self, v: u32) -> bool {
        self.n1 == v || self.n2 == v
    }

    fn shares_endpoint(&self, other: &BoundaryEdge) -> bool {
        other.touches(self.n1) || other.touches(self.n2)
    }
}

impl TriMesh {
    /// Snapshot of all boundary edges (exactly 1 incident face).
    fn boundary_edges(&self) -> Vec<BoundaryEdge> {
        self.edges
            .iter()
            .filter(|(_, e)| e.face_count() == 1)
            .map(|(_, e)| BoundaryEdge {
                n1: e.node1(),
                n2: e.node2(),
                face: e.faces()[0],
            })
            .collect()
    }

    /// Grow one connected boundary out of `elist`, starting from its
    /// first edge. Extension tracks the chain's two free ends and
    /// detects closure when they coincide.
    fn generate_boundary(elist: &mut Vec<BoundaryEdge>) -> Vec<BoundaryEdge> {
        let first = elist.remove(0);
        let mut blist = vec![first];
        let mut n1 = first.n1;
        let mut n2 = first.n2;

        loop {
            let mut added = false;
            let mut i = 0;
            while i < elist.len() {
                let e = elist[i];
                if blist.iter().any(|b| b.shares_endpoint(&e)) {
                    elist.remove(i);
                    blist.push(e);
                    added = true;

                    if e.n1 == n1 {
                        n1 = e.n2;
                    } else if e.n2 == n1 {
                        n1 = e.n1;
                    } else if e.n1 == n2 {
                        n2 = e.n2;
                    } else if e.n2 == n2 {
                        n2 = e.n1;
                    }
                    if n1 == n2 {
                        return blist;
                    }
                } else {
                    i += 1;
                }
            }
            if !added {
                break;
            }
        }

        if n1 != n2 {
            warn!(n1, n2, "incomplete boundary");
        }
        blist
    }

    /// Bridge one pair of loop-adjacent boundary edges with a new
    /// triangle, with winding chosen to match the orientation of an
    /// existing incident face. Returns whether a pair was found.
    fn fill_next_pair(&mut self, blist: &mut Vec<BoundaryEdge>) -> MeshResult<bool> {
        let mut pair = None;
        'outer: for i in 0..blist.len() {
            for j in i + 1..blist.len() {
                if blist[i].shares_endpoint(&blist[j]) {
                    pair = Some((i, j));
                    break 'outer;
                }
            }
        }
        let Some((i, j)) = pair else {
            return Ok(false);
        };
        let ed1 = blist[i];
        let ed2 = blist[j];

        let (v0, mut v1, mut v2) = if ed1.n1 == ed2.n1 {
            (ed1.n1, ed1.n2, ed2.n2)
        } else if ed1.n1 == ed2.n2 {
            (ed1.n1, ed1.n2, ed2.n1)
        } else if ed1.n2 == ed2.n1 {
            (ed1.n2, ed1.n1, ed2.n2)
        } else {
            (ed1.n2, ed1.n1, ed2.n1)
        };

        // Wind the bridge opposite to ed1's existing face so the patch
        // stays consistently oriented.
        let tri = self.tris[ed1.face as usize];
        let m = tri
            .iter()
            .position(|&v| v == v0)
            .expect("boundary face contains its edge endpoint");
        if tri[(m + 1) % 3] == v1 {
            std::mem::swap(&mut v1, &mut v2);
        }

        debug!(v0, v1, v2, "adding element");
        let face = self.add_element(v0, v1, v2)?;

        let bridge = self
            .edges
            .get(v1, v2)
            .expect("bridge edge exists after insertion");
        if bridge.face_count() == 1 {
            debug!(v1, v2, "adding edge to boundary");
            blist.insert(0, BoundaryEdge { n1: v1, n2: v2, face });
        } else {
            debug!(v1, v2, "removing edge from boundary");
            blist.retain(|b| !(b.touches(v1) && b.touches(v2)));
        }

        blist.retain(|b| *b != ed1 && *b != ed2);
        Ok(true)
    }

    /// Close every hole by walking each boundary loop and bridging
    /// adjacent edge pairs until the loop is empty. Returns the number
    /// of triangles added.
    pub fn fill_holes(&mut self) -> MeshResult<usize> {
        let mut filled = 0;
        let mut elist = self.boundary_edges();

        while !elist.is_empty() {
            let mut blist = Self::generate_boundary(&mut elist);
            debug!(edges = blist.len(), "filling boundary");
            while !blist.is_empty() {
                if !self.fill_next_pair(&mut blist)? {
                    break;
                }
                filled += 1;
            }
        }

        if filled > 0 {
            self.invalidate_normals();
            self.edges.clear();
            self.find_edges()?;
            self.rebuild_neighbors()?;
            self.process_vertices()?;
        }
        info!(filled, "hole filling complete");
        Ok(filled)
    }

    /// Root of a vertex's origin chain; the vertex itself when it was
    /// never split.
    fn origin_root(&self, v: u32) -> u32 {
        let mut root = v;
        while let Some(o) = self.origin.get(root as usize).copied().flatten() {
            root = o;
        }
        root
    }

    /// Two boundary edges are stitchable when they share one endpoint
    /// exactly and their opposite endpoints descend from the same
    /// original vertex.
    fn is_stitchable(&self, e1: &BoundaryEdge, e2: &BoundaryEdge) -> bool {
        let pairs = [
            (e1.n1, e1.n2, e2.n1, e2.n2),
            (e1.n1, e1.n2, e2.n2, e2.n1),
            (e1.n2, e1.n1, e2.n1, e2.n2),
            (e1.n2, e1.n1, e2.n2, e2.n1),
        ];
        pairs.iter().any(|&(s1, o1, s2, o2)| {
            s1 == s2 && o1 != o2 && self.origin_root(o1) == self.origin_root(o2)
        })
    }

    /// Merge one stitchable pair of boundary edges, preferring a pair
    /// that continues at the previously stitched vertex `pv`. Returns
    /// the pivot vertex and the merged pair `(kept, removed)`.
    fn stitch_next_pair(
        &mut self,
        blist: &mut Vec<BoundaryEdge>,
        pv: Option<u32>,
    ) -> MeshResult<Option<(u32, u32, u32)>> {
        let mut pair = None;
        'outer: for i in 0..blist.len() {
            for j in i + 1..blist.len() {
                if !self.is_stitchable(&blist[i], &blist[j]) {
                    continue;
                }
                if pair.is_none() {
                    pair = Some((i, j));
                }
                if let Some(v) = pv {
                    if blist[i].touches(v) {
                        pair = Some((i, j));
                        break 'outer;
                    }
                } else {
                    break 'outer;
                }
            }
        }
        let Some((i, j)) = pair else {
            return Ok(None);
        };
        let ed1 = blist[i];
        let ed2 = blist[j];

        let (v0, v1, v2) = if ed1.n1 == ed2.n1 {
            (ed1.n1, ed1.n2, ed2.n2)
        } else if ed1.n1 == ed2.n2 {
            (ed1.n1, ed1.n2, ed2.n1)
        } else if ed1.n2 == ed2.n1 {
            (ed1.n2, ed1.n1, ed2.n2)
        } else {
            (ed1.n2, ed1.n1, ed2.n1)
        };
        let (v1, v2) = if v2 < v1 { (v2, v1) } else { (v1, v2) };

        blist.retain(|b| *b != ed1 && *b != ed2);

        if v1 == v2 {
            debug!("edges already stitched");
            return Ok(None);
        }
        info!(v0, removed = v2, kept = v1, "stitching edge pair");

        // Re-point remaining boundary records at the surviving vertex.
        for b in blist.iter_mut() {
            if b.n1 == v2 {
                b.n1 = v1;
            }
            if b.n2 == v2 {
                b.n2 = v1;
            }
        }

        // Move the faces of v2 onto v1; node neighbors and the edge
        // table are rebuilt wholesale once stitching finishes.
        while let Some(f) = self.face_nbrs[v2 as usize].first() {
            self.face_nbrs[v2 as usize].remove(f);
            self.face_nbrs[v1 as usize].insert(v1, f)?;
            for idx in self.tris[f as usize].iter_mut() {
                if *idx == v2 {
                    *idx = v1;
                    break;
                }
            }
        }

        Ok(Some((v0, v1, v2)))
    }

    /// Rejoin sheets that were split by desingularization: merge
    /// boundary-edge endpoint pairs descending from the same original
    /// vertex, then rebuild the derived structures. Returns the number
    /// of merges performed.
    ///
    /// Pair matching runs over the full boundary set rather than one
    /// extracted loop at a time: a cut seam's two sides can land in
    /// different loops, and per-loop matching would miss them.
    pub fn stitch(&mut self) -> MeshResult<usize> {
        let mut stitched = 0;
        let mut blist = self.boundary_edges();
        debug!(edges = blist.len(), "stitching boundary edges");

        let mut pv = None;
        while !blist.is_empty() {
            match self.stitch_next_pair(&mut blist, pv)? {
                Some((v0, _, _)) => {
                    pv = Some(v0);
                    stitched += 1;
                }
                None => break,
            }
        }

        if stitched > 0 {
            self.invalidate_normals();
            self.rebuild_neighbors()?;
            self.edges.clear();
            self.find_edges()?;
            self.process_vertices()?;
        }
        info!(stitched, "stitching complete");
        Ok(stitched)
    }

    /// Group all non-manifold and boundary edges (face count != 2) into
    /// connected boundaries and return their endpoint chains. Purely
    /// diagnostic.
    pub fn intersection_boundaries(&self) -> Vec<Vec<(u32, u32)>> {
        let mut elist: Vec<BoundaryEdge> = self
            .edges
            .iter()
            .filter(|(_, e)| e.face_count() != 2)
            .map(|(_, e)| BoundaryEdge {
                n1: e.node1(),
                n2: e.node2(),
                face: e.faces().first().copied().unwrap_or(0),
            })
            .collect();

        let mut boundaries = Vec::new();
        while !elist.is_empty() {
            let blist = Self::generate_boundary(&mut elist);
            boundaries.push(blist.into_iter().map(|b| (b.n1, b.n2)).collect());
        }
        boundaries
    }
}
