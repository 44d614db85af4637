// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Editing primitives: insert, change, delete, collapse, and flip
//!
//! Every primitive updates the neighbor sets and the edge table on the
//! same call, so the derived structures stay consistent with the
//! triangle array at every step.

use std::f64::consts::PI;

use nalgebra::Point3;
use tracing::{debug, info};

use crate::error::{MeshError, MeshResult};

use super::TriMesh;

/// Dihedral angle below which [`TriMesh::check_flip_edge`] considers a
/// pair of faces flat enough to flip (10 degrees).
const FLIP_ANGLE_THRESH: f64 = PI / 18.0;

impl TriMesh {
    /// Append a vertex and return its id. O(1) amortized.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> u32 {
        let id = self.verts.len() as u32;
        self.verts.push(position);
        self.vert_normals.push(nalgebra::Vector3::zeros());
        self.flags.push(false);
        self.node_nbrs.push(Default::default());
        self.face_nbrs.push(Default::default());
        if !self.origin.is_empty() {
            self.origin.push(None);
        }
        id
    }

    fn check_element_verts(&self, i: u32, j: u32, k: u32) -> MeshResult<()> {
        self.check_vertex(i)?;
        self.check_vertex(j)?;
        self.check_vertex(k)?;
        if i == j || i == k {
            return Err(MeshError::DuplicateVertex(i));
        }
        if j == k {
            return Err(MeshError::DuplicateVertex(j));
        }
        Ok(())
    }

    /// Write triangle `e` and register it with the neighbor sets, the
    /// edge table, and the face-normal cache.
    fn set_elem(&mut self, e: u32, i: u32, j: u32, k: u32) -> MeshResult<()> {
        self.tris[e as usize] = [i, j, k];

        for v in [i, j, k] {
            self.face_nbrs[v as usize].insert(v, e)?;
        }
        for (a, b) in [(i, j), (i, k), (j, i), (j, k), (k, i), (k, j)] {
            self.node_nbrs[a as usize].insert(a, b)?;
        }

        self.edges.attach(i, j, e)?;
        self.edges.attach(j, k, e)?;
        self.edges.attach(k, i, e)?;

        self.update_face_normal(e);
        self.invalidate_vertex_normals();
        Ok(())
    }

    /// Insert a triangle over existing vertices and return its id.
    ///
    /// Fails with [`MeshError::InvalidIndex`] or
    /// [`MeshError::DuplicateVertex`] before any state changes.
    pub fn add_element(&mut self, i: u32, j: u32, k: u32) -> MeshResult<u32> {
        self.check_element_verts(i, j, k)?;

        let e = self.tris.len() as u32;
        self.tris.push([0; 3]);
        self.set_elem(e, i, j, k)?;
        Ok(e)
    }

    /// Re-point triangle `e` at new vertices, reusing its id.
    ///
    /// The old edge and neighbor memberships are removed (dropping an
    /// edge entirely when this was its last face), then the triangle is
    /// re-registered as in [`add_element`](Self::add_element). Removal
    /// and re-insertion are not atomic across a capacity failure.
    pub fn change_element(&mut self, e: u32, i: u32, j: u32, k: u32) -> MeshResult<()> {
        self.check_triangle(e)?;
        self.check_element_verts(i, j, k)?;

        debug!(element = e, "changing element");
        let [u0, u1, u2] = self.tris[e as usize];

        for (a, b) in [(u0, u1), (u0, u2), (u1, u2)] {
            if self.edges.detach(a, b, e)? == 0 {
                self.node_nbrs[a as usize].remove(b);
                self.node_nbrs[b as usize].remove(a);
                self.edges.remove(a, b);
            }
        }
        for v in [u0, u1, u2] {
            self.face_nbrs[v as usize].remove(e);
        }

        self.set_elem(e, i, j, k)
    }

    /// Delete triangle `e` in O(1) by moving the last triangle into its
    /// slot, dropping any edge this was the last face of. Ids above `e`
    /// are unaffected; the id of the previously last triangle becomes
    /// `e`. The class partition becomes stale until the next
    /// [`classify`](Self::classify).
    pub fn delete_element(&mut self, e: u32) -> MeshResult<()> {
        self.check_triangle(e)?;
        let last = self.tris.len() as u32 - 1;

        debug!(element = e, "deleting element");
        let [u0, u1, u2] = self.tris[e as usize];

        for (a, b) in [(u0, u1), (u0, u2), (u1, u2)] {
            if self.edges.detach(a, b, e)? == 0 {
                self.node_nbrs[a as usize].remove(b);
                self.node_nbrs[b as usize].remove(a);
                self.edges.remove(a, b);
            }
        }
        for v in [u0, u1, u2] {
            self.face_nbrs[v as usize].remove(e);
        }

        if e < last {
            let [l0, l1, l2] = self.tris[last as usize];
            self.tris[e as usize] = [l0, l1, l2];
            for v in [l0, l1, l2] {
                self.face_nbrs[v as usize].remove(last);
                self.face_nbrs[v as usize].insert(v, e)?;
            }
            // Attach under the new id before detaching the old one so
            // the records never empty out mid-relabel.
            self.edges.attach(l0, l1, e)?;
            self.edges.attach(l0, l2, e)?;
            self.edges.attach(l1, l2, e)?;
            self.edges.detach(l0, l1, last)?;
            self.edges.detach(l0, l2, last)?;
            self.edges.detach(l1, l2, last)?;
        }

        self.tris.pop();
        if self.face_normals.len() == self.tris.len() + 1 {
            self.face_normals.swap_remove(e as usize);
        } else {
            self.face_normals.truncate(self.tris.len());
        }
        self.invalidate_normals();
        Ok(())
    }

    /// Delete an isolated vertex in O(1) by moving the last vertex into
    /// its slot, re-pointing the relabeled vertex's edges, neighbors,
    /// and triangles. Fails with [`MeshError::VertexStillLinked`] if
    /// the vertex still has faces or node neighbors.
    pub fn delete_vertex(&mut self, v: u32) -> MeshResult<()> {
        self.check_vertex(v)?;
        if !self.face_nbrs[v as usize].is_empty() || !self.node_nbrs[v as usize].is_empty() {
            return Err(MeshError::VertexStillLinked(v));
        }

        let last = self.verts.len() as u32 - 1;
        debug!(vertex = v, total = last, "deleting vertex");
        self.invalidate_normals();

        if v < last {
            let moved_pos = self.verts[last as usize];
            self.verts[v as usize] = moved_pos;
            let moved_normal = self.vert_normals[last as usize];
            self.vert_normals[v as usize] = moved_normal;
            let moved_flag = self.flags[last as usize];
            self.flags[v as usize] = moved_flag;
            if !self.origin.is_empty() {
                let moved_origin = self.origin[last as usize];
                self.origin[v as usize] = moved_origin;
            }

            let partners: Vec<u32> = self.node_nbrs[last as usize].as_slice().to_vec();
            self.edges.rename_vertex(last, v, &partners)?;
            for vn in partners {
                self.node_nbrs[vn as usize].remove(last);
                self.node_nbrs[vn as usize].insert(vn, v)?;
            }

            let moved_nodes = self.node_nbrs[last as usize];
            self.node_nbrs[v as usize] = moved_nodes;
            let moved_faces = self.face_nbrs[last as usize];
            self.face_nbrs[v as usize] = moved_faces;
            let faces: Vec<u32> = self.face_nbrs[v as usize].as_slice().to_vec();
            for f in faces {
                for idx in self.tris[f as usize].iter_mut() {
                    if *idx == last {
                        *idx = v;
                    }
                }
            }
        }

        self.verts.pop();
        self.vert_normals.pop();
        self.flags.pop();
        self.node_nbrs.pop();
        self.face_nbrs.pop();
        if !self.origin.is_empty() {
            self.origin.pop();
        }
        Ok(())
    }

    /// Drop every edge record and node-neighbor link of `v`.
    pub(crate) fn unlink_vertex_edges(&mut self, v: u32) {
        while let Some(vn) = self.node_nbrs[v as usize].first() {
            self.edges.remove(v, vn);
            self.node_nbrs[v as usize].remove(vn);
            self.node_nbrs[vn as usize].remove(v);
        }
    }

    /// Reconstruct the edges and node links of `v` from its face list.
    fn relink_vertex_edges(&mut self, v: u32) -> MeshResult<()> {
        let faces: Vec<u32> = self.face_nbrs[v as usize].as_slice().to_vec();
        for f in faces {
            let tri = self.tris[f as usize];
            for u in tri {
                if u != v {
                    self.edges.attach(v, u, f)?;
                    self.node_nbrs[v as usize].insert(v, u)?;
                    self.node_nbrs[u as usize].insert(u, v)?;
                }
            }
        }
        Ok(())
    }

    /// Move every face of `from` onto `to`, rewriting indices and
    /// rebuilding the affected edges and node links.
    fn absorb_vertex_faces(&mut self, to: u32, from: u32) -> MeshResult<()> {
        while let Some(f) = self.face_nbrs[from as usize].first() {
            self.face_nbrs[from as usize].remove(f);
            self.face_nbrs[to as usize].insert(to, f)?;

            for m in 0..3 {
                if self.tris[f as usize][m] == from {
                    self.tris[f as usize][m] = to;
                }
            }
            let tri = self.tris[f as usize];
            for u in tri {
                if u != to {
                    self.edges.attach(to, u, f)?;
                    self.node_nbrs[to as usize].insert(to, u)?;
                    self.node_nbrs[u as usize].insert(u, to)?;
                }
            }
        }
        Ok(())
    }

    /// Collapse the edge `(v1, v2)` to its midpoint.
    ///
    /// All triangles incident to the edge are deleted, `v1` absorbs the
    /// surviving faces and adjacency of `v2`, and the now-isolated `v2`
    /// is deleted. Returns `Ok(false)` without touching the mesh when
    /// the edge's incident-face count differs from the number of
    /// vertices common to both endpoints' neighbor sets, which signals
    /// a collapse that would fuse unrelated sheets.
    pub fn collapse_edge(&mut self, v1: u32, v2: u32) -> MeshResult<bool> {
        self.check_vertex(v1)?;
        self.check_vertex(v2)?;
        let edge = self
            .edges
            .get(v1, v2)
            .ok_or(MeshError::MissingEdge(v1.min(v2), v1.max(v2)))?;
        let nelem = edge.face_count();

        let common = self.node_nbrs[v1 as usize]
            .iter()
            .filter(|&n| self.node_nbrs[v2 as usize].contains(n))
            .count();
        if common != nelem {
            debug!(v1, v2, common, nelem, "not collapsing edge");
            return Ok(false);
        }

        debug!(v1, v2, "collapsing edge");
        self.invalidate_normals();

        while let Some(f) = self
            .edges
            .get(v1, v2)
            .and_then(|e| e.faces().first().copied())
        {
            self.delete_element(f)?;
        }

        self.verts[v1 as usize] =
            Point3::from((self.verts[v1 as usize].coords + self.verts[v2 as usize].coords) / 2.0);

        self.unlink_vertex_edges(v1);
        self.unlink_vertex_edges(v2);
        self.relink_vertex_edges(v1)?;
        self.absorb_vertex_faces(v1, v2)?;

        self.delete_vertex(v2)?;
        Ok(true)
    }

    /// Collapse triangle `e` to the centroid of its three vertices,
    /// deleting every triangle incident to any of its edges and
    /// merging all three vertices into the first.
    pub fn collapse_element(&mut self, e: u32) -> MeshResult<()> {
        self.check_triangle(e)?;
        let [v0, v1, v2] = self.tris[e as usize];

        info!(element = e, "collapsing element");
        self.invalidate_normals();

        for (a, b) in [(v0, v1), (v0, v2), (v1, v2)] {
            while let Some(f) = self
                .edges
                .get(a, b)
                .and_then(|ed| ed.faces().first().copied())
            {
                self.delete_element(f)?;
            }
        }

        self.verts[v0 as usize] = Point3::from(
            (self.verts[v0 as usize].coords
                + self.verts[v1 as usize].coords
                + self.verts[v2 as usize].coords)
                / 3.0,
        );

        for v in [v0, v1, v2] {
            self.unlink_vertex_edges(v);
        }
        self.relink_vertex_edges(v0)?;
        self.absorb_vertex_faces(v0, v1)?;
        self.absorb_vertex_faces(v0, v2)?;

        // Delete the larger id first; its removal relabels only the
        // last vertex, which cannot be the smaller survivor.
        let (hi, lo) = if v1 > v2 { (v1, v2) } else { (v2, v1) };
        self.delete_vertex(hi)?;
        self.delete_vertex(lo)?;
        Ok(())
    }

    /// Swap the diagonal of the quad formed by the two triangles of
    /// edge `(v1, v2)`. Returns `Ok(false)` when the edge does not have
    /// exactly 2 faces, the opposite vertices coincide, or the flipped
    /// diagonal already exists.
    pub fn flip_edge(&mut self, v1: u32, v2: u32) -> MeshResult<bool> {
        let edge = self
            .edges
            .get(v1, v2)
            .ok_or(MeshError::MissingEdge(v1.min(v2), v1.max(v2)))?;
        if edge.face_count() != 2 {
            return Ok(false);
        }
        let (n1, n2) = edge.nodes();
        let (e1, e2) = (edge.faces()[0], edge.faces()[1]);
        debug_assert_ne!(e1, e2);

        let opposite = |tri: [u32; 3]| tri.into_iter().find(|&v| v != n1 && v != n2);
        let Some(p1) = opposite(self.tris[e1 as usize]) else {
            return Ok(false);
        };
        let Some(p2) = opposite(self.tris[e2 as usize]) else {
            return Ok(false);
        };

        if p1 == p2 || self.edges.contains(p1, p2) {
            debug!(n1, n2, "not flipping edge");
            return Ok(false);
        }

        debug!(n1, n2, "flipping edge");

        // Swap face and node neighbor memberships.
        self.face_nbrs[n1 as usize].remove(e2);
        self.face_nbrs[p1 as usize].insert(p1, e2)?;
        self.face_nbrs[n2 as usize].remove(e1);
        self.face_nbrs[p2 as usize].insert(p2, e1)?;

        self.node_nbrs[n1 as usize].remove(n2);
        self.node_nbrs[n2 as usize].remove(n1);
        self.node_nbrs[p1 as usize].insert(p1, p2)?;
        self.node_nbrs[p2 as usize].insert(p2, p1)?;

        // Swap the diagonal in the triangle records.
        for idx in self.tris[e1 as usize].iter_mut() {
            if *idx == n2 {
                *idx = p2;
            }
        }
        for idx in self.tris[e2 as usize].iter_mut() {
            if *idx == n1 {
                *idx = p1;
            }
        }

        self.update_face_normal(e1);
        self.update_face_normal(e2);
        self.invalidate_vertex_normals();

        // Replace the old diagonal and exchange the quad's side edges.
        self.edges.remove(n1, n2);
        self.edges.attach(p1, p2, e1)?;
        self.edges.attach(p1, p2, e2)?;

        self.edges.detach(p1, n2, e1)?;
        self.edges.detach(n1, p2, e2)?;
        self.edges.attach(p1, n2, e2)?;
        self.edges.attach(n1, p2, e1)?;

        Ok(true)
    }

    /// Interior angle at `n1` of the triangle `(n1, n2, n3)`, by the
    /// law of cosines. Degenerate corners yield 0.
    pub(crate) fn node_angle(&self, n1: u32, n2: u32, n3: u32) -> f64 {
        let a2 = (self.verts[n2 as usize] - self.verts[n1 as usize]).norm_squared();
        let b2 = (self.verts[n3 as usize] - self.verts[n1 as usize]).norm_squared();
        let c2 = (self.verts[n3 as usize] - self.verts[n2 as usize]).norm_squared();

        let denom = 2.0 * (a2 * b2).sqrt();
        if denom == 0.0 {
            return 0.0;
        }
        ((a2 + b2 - c2) / denom).clamp(-1.0, 1.0).acos()
    }

    /// Flip edge `(v1, v2)` only when it improves triangle quality:
    /// the faces must be nearly coplanar (dihedral below 10 degrees),
    /// the angles opposite the shared edge must sum past pi, and the
    /// flip must bring that sum closer to pi. Returns whether a flip
    /// occurred.
    pub fn check_flip_edge(&mut self, v1: u32, v2: u32) -> MeshResult<bool> {
        self.calc_face_normals();
        let Some(edge) = self.edges.get(v1, v2) else {
            return Ok(false);
        };
        if edge.face_count() != 2 {
            return Ok(false);
        }
        let (n1, n2) = edge.nodes();
        let (e1, e2) = (edge.faces()[0], edge.faces()[1]);

        let dot = self.face_normals[e1 as usize]
            .dot(&self.face_normals[e2 as usize])
            .clamp(-1.0, 1.0);
        if dot.acos() > FLIP_ANGLE_THRESH {
            return Ok(false);
        }

        let opposite = |tri: [u32; 3]| tri.into_iter().find(|&v| v != n1 && v != n2);
        let Some(p1) = opposite(self.tris[e1 as usize]) else {
            return Ok(false);
        };
        let Some(p2) = opposite(self.tris[e2 as usize]) else {
            return Ok(false);
        };

        let a1 = self.node_angle(p1, n1, n2);
        let a2 = self.node_angle(p2, n1, n2);
        if a1 + a2 <= PI {
            return Ok(false);
        }

        let b1 = self.node_angle(n1, p1, p2);
        let b2 = self.node_angle(n2, p2, p1);
        if a1 + a2 <= b1 + b2 {
            return Ok(false);
        }

        self.flip_edge(v1, v2)
    }

    /// Replace the whole triangle array in one batch and rebuild every
    /// derived structure.
    pub fn replace_elements(&mut self, faces: Vec<[u32; 3]>) -> MeshResult<()> {
        info!(
            before = self.tris.len(),
            after = faces.len(),
            "replacing element vector"
        );
        self.tris = faces;
        self.invalidate_normals();

        self.edges.clear();
        self.find_edges()?;
        self.rebuild_neighbors()?;
        self.classify()?;
        self.calc_vertex_normals();
        Ok(())
    }
}
