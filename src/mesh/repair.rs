// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Non-manifold correction: counting, cutting, and consolidation

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};

use super::{OrientationReport, TriMesh};

/// Maximum number of desingularization passes a single
/// [`TriMesh::correct_mesh`] call attempts. Empirical bound carried
/// over from the reference data sets.
pub const CORRECTION_PASSES: usize = 2;

/// Summary of a full correction run. A mesh may exit only partially
/// corrected; that is reported here, not escalated to an error.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CorrectionReport {
    /// Triangles with a repeated vertex index remaining after the run.
    pub degenerate_faces: usize,
    /// Isolated vertices deleted during the run.
    pub isolated_vertices_removed: usize,
    /// Edges with more than 2 incident faces before correction.
    pub nonmanifold_edges_before: usize,
    /// Edges with more than 2 incident faces remaining after the run.
    pub nonmanifold_edges_after: usize,
    /// Vertices duplicated while cutting singular configurations.
    pub vertices_split: usize,
    /// Connected classes found by the final classification.
    pub classes: usize,
    /// Outcome of the final orientation pass.
    pub orientation: OrientationReport,
    /// True when no defects remain.
    pub converged: bool,
}

impl fmt::Display for CorrectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Correction report:")?;
        writeln!(f, "  Degenerate faces: {}", self.degenerate_faces)?;
        writeln!(
            f,
            "  Isolated vertices removed: {}",
            self.isolated_vertices_removed
        )?;
        writeln!(
            f,
            "  Non-manifold edges: {} before, {} after",
            self.nonmanifold_edges_before, self.nonmanifold_edges_after
        )?;
        writeln!(f, "  Vertices split: {}", self.vertices_split)?;
        writeln!(f, "  Classes: {}", self.classes)?;
        writeln!(f, "  Orientation: {}", self.orientation)?;
        write!(
            f,
            "  Converged: {}",
            if self.converged { "yes" } else { "NO" }
        )
    }
}

impl TriMesh {
    /// Count triangles that repeat a vertex index.
    pub(crate) fn process_faces(&self) -> usize {
        let bad = self
            .tris
            .iter()
            .filter(|t| t[0] == t[1] || t[0] == t[2] || t[1] == t[2])
            .count();
        info!(faces = self.tris.len(), bad, "face check");
        bad
    }

    /// Count edges shared by more than 2 triangles.
    pub(crate) fn process_edges(&self) -> usize {
        let mut nmin = usize::MAX;
        let mut nmax = 0;
        let mut bad = 0;
        for (_, edge) in self.edges.iter() {
            nmin = nmin.min(edge.face_count());
            nmax = nmax.max(edge.face_count());
            if edge.face_count() > 2 {
                bad += 1;
            }
        }
        info!(
            edges = self.edges.len(),
            bad,
            min = if nmin == usize::MAX { 0 } else { nmin },
            max = nmax,
            "edge check"
        );
        bad
    }

    /// Delete every vertex with no incident faces. Stray node links of
    /// such vertices are unlinked first. Returns the number deleted.
    pub(crate) fn process_vertices(&mut self) -> MeshResult<usize> {
        let mut bad = 0;
        let mut n = 0;
        while n < self.verts.len() {
            if self.face_nbrs[n].is_empty() {
                bad += 1;
                self.unlink_vertex_edges(n as u32);
                self.delete_vertex(n as u32)?;
                // The last vertex was relabeled into slot n; revisit it.
            } else {
                n += 1;
            }
        }
        info!(vertices = self.verts.len(), bad, "vertex check");
        Ok(bad)
    }

    /// Cut every singular vertex and every vertex touching a
    /// non-manifold edge by duplicating it per connected fan, recording
    /// provenance in the origin map for later stitching. Returns the
    /// number of vertices split.
    ///
    /// Fails with [`MeshError::CorrectionStalled`] if a sweep leaves
    /// marked vertices without repairing any of them.
    pub(crate) fn correct_edges(&mut self) -> MeshResult<usize> {
        self.origin = vec![None; self.verts.len()];
        for flag in &mut self.flags {
            *flag = false;
        }

        for (_, edge) in self.edges.iter() {
            if edge.face_count() > 2 {
                let (n1, n2) = edge.nodes();
                self.flags[n1 as usize] = true;
                self.flags[n2 as usize] = true;
            }
        }
        for n in 0..self.verts.len() {
            if !self.flags[n] {
                self.flags[n] = self.is_singular_vertex(n as u32);
            }
        }

        let mut split_total = 0;
        loop {
            let mut found = false;
            let mut fixed = 0;
            let mut n = 0;
            while n < self.verts.len() {
                if self.flags[n] {
                    found = true;
                    if self.process_bad_vertex(n as u32)? {
                        fixed += 1;
                        split_total += 1;
                    }
                }
                n += 1;
            }

            if !found {
                break;
            }
            if fixed == 0 {
                let remaining = self.flags.iter().filter(|&&f| f).count();
                if remaining > 0 {
                    return Err(MeshError::CorrectionStalled(remaining));
                }
            }
        }

        Ok(split_total)
    }

    /// Desingularize one vertex: partition its incident faces into fans
    /// connected through manifold edges, and give each extra fan its
    /// own duplicate of the vertex. Returns whether the mesh changed.
    pub(crate) fn process_bad_vertex(&mut self, v: u32) -> MeshResult<bool> {
        self.check_vertex(v)?;
        if self.origin.len() != self.verts.len() {
            self.origin = vec![None; self.verts.len()];
        }

        let (faces, fclass, count) = self.vertex_fan_classes(v);
        if count <= 1 {
            self.flags[v as usize] = false;
            return Ok(false);
        }

        // Detach the whole neighborhood of v; it is rebuilt below from
        // the reassigned faces.
        let partners: Vec<u32> = self.node_nbrs[v as usize].as_slice().to_vec();
        for &nt in &partners {
            self.node_nbrs[nt as usize].remove(v);
            self.edges.remove(v, nt);
            for &f in &faces {
                self.face_nbrs[nt as usize].remove(f);
            }
        }
        self.node_nbrs[v as usize].clear();
        self.face_nbrs[v as usize].clear();
        self.flags[v as usize] = false;

        let mut root = v;
        while let Some(o) = self.origin[root as usize] {
            root = o;
        }
        info!(vertex = v, origin = root, fans = count, "splitting vertex");

        // One duplicate per extra fan; fan c maps to vertex nbase + c.
        let nbase = self.verts.len() - 1;
        let position = self.verts[v as usize];
        let normal = self.vert_normals[v as usize];
        for _ in 1..count {
            let nv = self.add_vertex(position);
            self.vert_normals[nv as usize] = normal;
            self.origin[nv as usize] = Some(root);
            debug!(vertex = nv, origin = root, "added split vertex");
        }

        for (i, &f) in faces.iter().enumerate() {
            let c = fclass[i];
            if c == 0 {
                continue;
            }
            let vnew = (nbase + c) as u32;
            for idx in self.tris[f as usize].iter_mut() {
                if *idx == v {
                    *idx = vnew;
                    break;
                }
            }
        }

        for &f in &faces {
            let [a, b, c] = self.tris[f as usize];
            self.edges.attach(a, b, f)?;
            self.edges.attach(b, c, f)?;
            self.edges.attach(c, a, f)?;
            for m in 0..3 {
                let vm = self.tris[f as usize][m];
                self.face_nbrs[vm as usize].insert(vm, f)?;
                for k in 0..3 {
                    if k != m {
                        let vk = self.tris[f as usize][k];
                        self.node_nbrs[vm as usize].insert(vm, vk)?;
                    }
                }
            }
        }

        self.invalidate_normals();
        Ok(true)
    }

    /// Bounded iterative repair: count degenerate faces, drop isolated
    /// vertices, cut singular and non-manifold configurations, then
    /// re-classify and re-orient. The cutting pass runs at most
    /// [`CORRECTION_PASSES`] times; remaining defects are reported in
    /// the returned [`CorrectionReport`] rather than escalated.
    pub fn correct_mesh(&mut self) -> MeshResult<CorrectionReport> {
        self.rebuild_neighbors()?;
        self.find_edges()?;

        let mut report = CorrectionReport {
            degenerate_faces: self.process_faces(),
            ..Default::default()
        };
        report.isolated_vertices_removed = self.process_vertices()?;
        report.nonmanifold_edges_before = self.process_edges();

        report.vertices_split += self.correct_edges()?;

        info!("after correction:");
        report.degenerate_faces = self.process_faces();
        report.isolated_vertices_removed += self.process_vertices()?;
        let mut bad_edges = self.process_edges();

        let mut passes = 1;
        while bad_edges > 0 && passes < CORRECTION_PASSES {
            warn!(bad_edges, "bad edges remain, trying once more");
            report.vertices_split += self.correct_edges()?;
            bad_edges = self.process_edges();
            passes += 1;
        }
        if bad_edges > 0 {
            warn!(bad_edges, "bad edges remain after final pass");
        }
        report.nonmanifold_edges_after = bad_edges;

        report.classes = self.classify()?;
        report.orientation = self.check_orientation();
        report.converged = bad_edges == 0 && report.degenerate_faces == 0;

        self.calc_limits();
        self.calc_vertex_normals();
        info!(converged = report.converged, "mesh correction finished");
        Ok(report)
    }

    /// Provenance of a vertex created by desingularization: the
    /// original vertex it was split from, if any.
    pub fn split_origin(&self, v: u32) -> Option<u32> {
        self.origin.get(v as usize).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_meshes::*;
    use super::*;
    use crate::TriMesh;
    use nalgebra::Point3;

    #[test]
    fn test_correct_mesh_idempotent_on_clean_mesh() {
        let mut mesh = tetrahedron();
        let verts = mesh.vertex_count();
        let tris = mesh.triangle_count();

        let report = mesh.correct_mesh().unwrap();
        assert!(report.converged);
        assert_eq!(report.degenerate_faces, 0);
        assert_eq!(report.isolated_vertices_removed, 0);
        assert_eq!(report.nonmanifold_edges_before, 0);
        assert_eq!(report.vertices_split, 0);
        assert!(report.orientation.is_clean());
        assert_eq!(mesh.vertex_count(), verts);
        assert_eq!(mesh.triangle_count(), tris);
    }

    #[test]
    fn test_correct_mesh_removes_isolated_vertices() {
        let mut mesh = quad();
        mesh.add_vertex(Point3::new(9.0, 9.0, 9.0));
        let report = mesh.correct_mesh().unwrap();
        assert_eq!(report.isolated_vertices_removed, 1);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_correct_mesh_splits_bowtie() {
        let mut mesh = bowtie();
        assert!(mesh.is_singular_vertex(0));

        let report = mesh.correct_mesh().unwrap();
        assert!(report.converged);
        assert_eq!(report.vertices_split, 1);
        // The pinch vertex was duplicated; the two fans no longer share
        // a vertex and form two classes.
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(report.classes, 2);
        for v in 0..mesh.vertex_count() as u32 {
            assert!(!mesh.is_singular_vertex(v));
        }
    }

    #[test]
    fn test_process_bad_vertex_records_origin() {
        let mut mesh = bowtie();
        mesh.correct_edges().unwrap();
        // Exactly one new vertex, split from vertex 0.
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.split_origin(5), Some(0));
        assert_eq!(mesh.split_origin(0), None);
    }

    #[test]
    fn test_correct_mesh_nonmanifold_edge() {
        // Three triangles sharing edge (0, 1): a T-junction.
        let mut mesh = TriMesh::from_arrays(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
                Point3::new(0.5, -1.0, 0.0),
                Point3::new(0.5, 0.0, 1.0),
            ],
            vec![[0, 1, 2], [0, 3, 1], [0, 1, 4]],
        )
        .unwrap();
        assert_eq!(mesh.process_edges(), 1);

        let report = mesh.correct_mesh().unwrap();
        assert_eq!(report.nonmanifold_edges_before, 1);
        assert_eq!(report.nonmanifold_edges_after, 0);
        assert!(report.vertices_split >= 1);
        // Every edge is manifold now.
        for edge in mesh.edge_iter() {
            assert!(edge.face_count() <= 2);
        }
    }

    #[test]
    fn test_report_display() {
        let mut mesh = tetrahedron();
        let report = mesh.correct_mesh().unwrap();
        let text = format!("{}", report);
        assert!(text.contains("Non-manifold edges: 0 before, 0 after"));
        assert!(text.contains("Converged: yes"));
    }
}
