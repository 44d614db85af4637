// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Quality-driven simplification: small edges, slivers, flips

use tracing::info;

use crate::error::MeshResult;

use super::TriMesh;

impl TriMesh {
    /// Mean edge length over the whole mesh; 0 for an empty mesh.
    pub fn average_edge_length(&self) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (_, edge) in self.edges.iter() {
            let (a, b) = edge.nodes();
            sum += (self.verts[a as usize] - self.verts[b as usize]).norm();
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Shortest edge length in the mesh; 0 for an empty mesh.
    pub fn minimum_edge_length(&self) -> f64 {
        let min = self
            .edges
            .iter()
            .map(|(_, edge)| {
                let (a, b) = edge.nodes();
                (self.verts[a as usize] - self.verts[b as usize]).norm()
            })
            .fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            min
        } else {
            0.0
        }
    }

    /// Shortest incident edge length at `v`; 0 when the vertex has no
    /// neighbors.
    pub fn minimum_edge_length_at(&self, v: u32) -> f64 {
        let p0 = self.verts[v as usize];
        let min = self.node_nbrs[v as usize]
            .iter()
            .map(|u| (self.verts[u as usize] - p0).norm())
            .fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            min
        } else {
            0.0
        }
    }

    /// Edge lengths of triangle `e` as (shortest, longest) with the
    /// matching vertex pair of the shortest edge.
    fn triangle_edge_extremes(&self, e: u32) -> (f64, f64, (u32, u32)) {
        let [a, b, c] = self.tris[e as usize];
        let d1 = (self.verts[a as usize] - self.verts[b as usize]).norm();
        let d2 = (self.verts[a as usize] - self.verts[c as usize]).norm();
        let d3 = (self.verts[b as usize] - self.verts[c as usize]).norm();

        let dmax = d1.max(d2).max(d3);
        let (dmin, pair) = if d1 <= d2 && d1 <= d3 {
            (d1, (a, b))
        } else if d2 <= d3 {
            (d2, (a, c))
        } else {
            (d3, (b, c))
        };
        (dmin, dmax, pair)
    }

    /// Collapse edges shorter than `threshold` until none remain.
    /// Returns the number of triangles removed.
    pub fn remove_small_edges(&mut self, threshold: f64) -> MeshResult<usize> {
        let before = self.tris.len();

        loop {
            let mut modified = false;
            for (a, b) in self
                .edges
                .iter()
                .map(|(_, e)| e.nodes())
                .collect::<Vec<_>>()
            {
                if self.edges.get(a, b).is_none() {
                    continue;
                }
                let len = (self.verts[a as usize] - self.verts[b as usize]).norm();
                if len < threshold && self.collapse_edge(a, b)? {
                    modified = true;
                    break;
                }
            }
            if !modified {
                break;
            }
        }

        let removed = before - self.tris.len();
        if removed > 0 {
            self.calc_vertex_normals();
        }
        info!(removed, threshold, "small-edge removal complete");
        Ok(removed)
    }

    /// Collapse the shortest edge of every triangle whose
    /// shortest/longest edge ratio falls below `threshold`. Returns the
    /// number of triangles removed.
    pub fn remove_bad_aspect_elements(&mut self, threshold: f64) -> MeshResult<usize> {
        let before = self.tris.len();
        let mut start = 0usize;

        loop {
            let mut modified = false;
            let mut n = start;
            while n < self.tris.len() {
                let [a, b, c] = self.tris[n];
                if a == b || b == c || a == c {
                    n += 1;
                    continue;
                }
                let (dmin, dmax, pair) = self.triangle_edge_extremes(n as u32);
                // The comparison also handles the fully degenerate 0/0 case.
                if dmin > threshold * dmax {
                    n += 1;
                    continue;
                }
                if self.collapse_edge(pair.0, pair.1)? {
                    // Ids above the collapse site were relabeled; back
                    // up a little and rescan.
                    start = n.saturating_sub(10);
                    modified = true;
                    break;
                }
                n += 1;
            }
            if !modified {
                break;
            }
        }

        let removed = before - self.tris.len();
        if removed > 0 {
            self.calc_vertex_normals();
        }
        info!(removed, threshold, "aspect-ratio cleanup complete");
        Ok(removed)
    }

    /// Collapse whole triangles whose shortest times longest edge
    /// length falls below `size` squared. Returns the number of
    /// triangles removed.
    pub fn remove_small_elements(&mut self, size: f64) -> MeshResult<usize> {
        let before = self.tris.len();
        let mut start = 0usize;

        loop {
            let mut modified = false;
            let mut n = start;
            while n < self.tris.len() {
                let [a, b, c] = self.tris[n];
                if a == b || b == c || a == c {
                    n += 1;
                    continue;
                }
                let (dmin, dmax, _) = self.triangle_edge_extremes(n as u32);
                if dmin * dmax > size * size {
                    n += 1;
                    continue;
                }
                self.collapse_element(n as u32)?;
                start = n.saturating_sub(10);
                modified = true;
                break;
            }
            if !modified {
                break;
            }
        }

        let removed = before - self.tris.len();
        self.calc_vertex_normals();
        info!(removed, size, "small-element removal complete");
        Ok(removed)
    }

    /// Apply the quality flip heuristic to every edge once. Returns the
    /// number of flips performed.
    pub fn flip_elements(&mut self) -> MeshResult<usize> {
        self.calc_vertex_normals();

        let mut flipped = 0;
        let pairs: Vec<(u32, u32)> = self.edges.iter().map(|(_, e)| e.nodes()).collect();
        for (a, b) in pairs {
            if self.edges.get(a, b).is_none() {
                continue;
            }
            if self.check_flip_edge(a, b)? {
                flipped += 1;
            }
        }

        if flipped > 0 {
            self.calc_vertex_normals();
        }
        info!(flipped, "edge flip pass complete");
        Ok(flipped)
    }
}
