// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Taubin low-pass smoothing

use nalgebra::Vector3;
use tracing::debug;

use super::TriMesh;

impl TriMesh {
    /// Inverse-distance weight between two vertices; coincident
    /// vertices get a huge finite weight instead of dividing by zero.
    fn smoothing_weight(&self, i: u32, j: u32) -> f64 {
        let dist = (self.verts[i as usize] - self.verts[j as usize]).norm();
        if dist == 0.0 {
            1e20
        } else {
            1.0 / dist
        }
    }

    /// Inverse-distance-weighted Laplacian displacement of `v` toward
    /// its node neighbors.
    fn laplacian_displacement(&self, v: u32) -> Vector3<f64> {
        let nbrs = &self.node_nbrs[v as usize];
        let mut weights = [0.0f64; crate::neighbors::MAX_NEIGHBORS];
        let mut sum = 0.0;
        for (n, u) in nbrs.iter().enumerate() {
            let w = self.smoothing_weight(v, u);
            weights[n] = w;
            sum += w;
        }
        if sum == 0.0 {
            return Vector3::zeros();
        }

        let mut del = Vector3::zeros();
        for (n, u) in nbrs.iter().enumerate() {
            del += (weights[n] / sum) * (self.verts[u as usize] - self.verts[v as usize]);
        }
        del
    }

    /// Taubin smoothing: per iteration a shrink pass scaled by lambda
    /// followed by an expand pass scaled by mu, which sign-corrects
    /// the shrink to suppress volume loss. Flagged (pinned) vertices
    /// are left in place. Normals are recomputed at the end.
    pub fn smooth(&mut self, iterations: usize) {
        debug!(iterations, "smoothing");
        for _ in 0..iterations {
            self.invalidate_normals();
            for factor in [self.lambda, self.mu] {
                for n in 0..self.verts.len() {
                    if self.flags[n] {
                        continue;
                    }
                    let dv = self.laplacian_displacement(n as u32);
                    self.verts[n] += factor * dv;
                }
            }
        }
        self.calc_vertex_normals();
    }

    /// Pin or release a vertex; pinned vertices are skipped by
    /// [`smooth`](Self::smooth).
    pub fn pin_vertex(&mut self, v: u32, pinned: bool) {
        self.flags[v as usize] = pinned;
    }

    /// Pin every vertex touching a boundary or non-manifold edge, so
    /// smoothing cannot erode open borders.
    pub fn pin_boundary_vertices(&mut self) {
        for (_, edge) in self.edges.iter() {
            if edge.face_count() != 2 {
                self.flags[edge.node1() as usize] = true;
                self.flags[edge.node2() as usize] = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_meshes::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_smooth_planar_patch_interior_fixed() {
        let mut mesh = grid(1);
        mesh.pin_boundary_vertices();
        let before = mesh.vertices().to_vec();

        mesh.smooth(1);

        // The patch is planar and uniformly spaced: every interior
        // Laplacian displacement is zero, so nothing moves.
        for (v, p) in mesh.vertices().iter().enumerate() {
            assert_relative_eq!(p.x, before[v].x, epsilon = 1e-12);
            assert_relative_eq!(p.y, before[v].y, epsilon = 1e-12);
            assert_relative_eq!(p.z, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_smooth_stays_planar() {
        let mut mesh = grid(2);
        mesh.smooth(3);
        // Neighbors all lie in z = 0, so smoothing cannot leave the plane.
        for p in mesh.vertices() {
            assert_relative_eq!(p.z, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_smooth_moves_curved_mesh_and_refreshes_normals() {
        let mut mesh = tetrahedron();
        let original = mesh.vertices().to_vec();
        mesh.smooth(2);

        let drift: f64 = mesh
            .vertices()
            .iter()
            .zip(&original)
            .map(|(a, b)| (a - b).norm())
            .sum();
        assert!(drift > 0.0);
        // Topology is untouched and normals are valid again.
        assert_eq!(mesh.triangle_count(), 4);
        assert!(mesh.norms_valid);
    }

    #[test]
    fn test_pinned_vertex_does_not_move() {
        let mut mesh = tetrahedron();
        let fixed = mesh.vertex(0);
        mesh.pin_vertex(0, true);
        mesh.smooth(2);
        assert_eq!(mesh.vertex(0), fixed);
    }
}
