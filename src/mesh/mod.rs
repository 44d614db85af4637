// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mutable indexed triangle mesh with derived adjacency structures
//!
//! The mesh owns all topology state: the vertex and triangle arrays
//! plus the derived neighbor sets, edge table, cached normals, and the
//! connected-component (class) partition. Editing primitives keep the
//! derived structures consistent on every call; batch operations
//! rebuild them wholesale.
//!
//! Vertex and triangle ids are array indices and are **unstable across
//! deletion**: deleting relabels the last entry into the freed slot.
//! Callers must re-resolve ids after any deleting operation.

mod classify;
mod holes;
mod quality;
mod repair;
mod smooth;
mod topology;

pub use classify::OrientationReport;
pub use repair::{CorrectionReport, CORRECTION_PASSES};

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::edges::{Edge, EdgeTable};
use crate::error::{MeshError, MeshResult};
use crate::neighbors::NeighborSet;

/// Taubin pass-band constant; with lambda this fixes the expand factor.
const K_PB: f64 = 0.5;
/// Taubin shrink factor.
const LAMBDA: f64 = 0.6307;

/// Mutable triangulated surface mesh.
pub struct TriMesh {
    pub(crate) verts: Vec<Point3<f64>>,
    pub(crate) vert_normals: Vec<Vector3<f64>>,
    pub(crate) flags: Vec<bool>,
    pub(crate) tris: Vec<[u32; 3]>,
    pub(crate) face_normals: Vec<Vector3<f64>>,
    pub(crate) class_sizes: Vec<usize>,
    /// Provenance of vertices duplicated by desingularization; indexed
    /// per vertex, populated only while a correction pass is active.
    pub(crate) origin: Vec<Option<u32>>,
    pub(crate) node_nbrs: Vec<NeighborSet>,
    pub(crate) face_nbrs: Vec<NeighborSet>,
    pub(crate) edges: EdgeTable,

    pub(crate) norms_valid: bool,
    pub(crate) fnorms_valid: bool,

    mean: Point3<f64>,
    min: Point3<f64>,
    size: Vector3<f64>,

    pub(crate) lambda: f64,
    pub(crate) mu: f64,
}

impl TriMesh {
    pub fn new() -> Self {
        Self {
            verts: Vec::new(),
            vert_normals: Vec::new(),
            flags: Vec::new(),
            tris: Vec::new(),
            face_normals: Vec::new(),
            class_sizes: Vec::new(),
            origin: Vec::new(),
            node_nbrs: Vec::new(),
            face_nbrs: Vec::new(),
            edges: EdgeTable::new(),
            norms_valid: false,
            fnorms_valid: false,
            mean: Point3::origin(),
            min: Point3::origin(),
            size: Vector3::zeros(),
            lambda: LAMBDA,
            mu: 1.0 / (K_PB - 1.0 / LAMBDA),
        }
    }

    pub fn with_capacity(vertex_count: usize, triangle_count: usize) -> Self {
        let mut mesh = Self::new();
        mesh.verts.reserve(vertex_count);
        mesh.vert_normals.reserve(vertex_count);
        mesh.flags.reserve(vertex_count);
        mesh.node_nbrs.reserve(vertex_count);
        mesh.face_nbrs.reserve(vertex_count);
        mesh.tris.reserve(triangle_count);
        mesh.face_normals.reserve(triangle_count);
        mesh
    }

    /// Build a mesh from parsed vertex positions and 0-based index
    /// triples, deriving adjacency, edges, classes, orientation, and
    /// normals. Malformed input (out-of-range index, self-referential
    /// triangle) is rejected before any state is built.
    pub fn from_arrays(verts: Vec<Point3<f64>>, tris: Vec<[u32; 3]>) -> MeshResult<Self> {
        let len = verts.len();
        for tri in &tris {
            for &v in tri {
                if v as usize >= len {
                    return Err(MeshError::InvalidIndex { index: v, len });
                }
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
                let dup = if tri[0] == tri[1] { tri[0] } else { tri[2] };
                return Err(MeshError::DuplicateVertex(dup));
            }
        }

        let mut mesh = Self::new();
        let nverts = verts.len();
        mesh.verts = verts;
        mesh.tris = tris;
        mesh.vert_normals = vec![Vector3::zeros(); nverts];
        mesh.flags = vec![false; nverts];
        mesh.node_nbrs = vec![NeighborSet::new(); nverts];
        mesh.face_nbrs = vec![NeighborSet::new(); nverts];

        mesh.calc_limits();
        mesh.rebuild_neighbors()?;
        mesh.find_edges()?;
        mesh.classify()?;
        mesh.check_orientation();
        mesh.calc_vertex_normals();

        Ok(mesh)
    }

    // ----- counts and read queries -------------------------------------

    pub fn vertex_count(&self) -> usize {
        self.verts.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.tris.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertex(&self, v: u32) -> Point3<f64> {
        self.verts[v as usize]
    }

    pub fn triangle(&self, e: u32) -> [u32; 3] {
        self.tris[e as usize]
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.verts
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.tris
    }

    /// Cached outward vertex normal, recomputed lazily.
    pub fn vertex_normal(&mut self, v: u32) -> Vector3<f64> {
        self.calc_vertex_normals();
        self.vert_normals[v as usize]
    }

    /// Cached face normal, recomputed lazily.
    pub fn face_normal(&mut self, e: u32) -> Vector3<f64> {
        self.calc_face_normals();
        self.face_normals[e as usize]
    }

    pub fn node_neighbors(&self, v: u32) -> &NeighborSet {
        &self.node_nbrs[v as usize]
    }

    pub fn face_neighbors(&self, v: u32) -> &NeighborSet {
        &self.face_nbrs[v as usize]
    }

    pub fn edge(&self, a: u32, b: u32) -> Option<&Edge> {
        self.edges.get(a, b)
    }

    pub fn edge_iter(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().map(|(_, e)| e)
    }

    /// Number of connected triangle classes found by [`classify`](Self::classify).
    pub fn class_count(&self) -> usize {
        self.class_sizes.len()
    }

    /// Triangle count of class `cls`; classes are contiguous ranges of
    /// the triangle array, largest class first.
    pub fn class_size(&self, cls: usize) -> usize {
        self.class_sizes.get(cls).copied().unwrap_or(0)
    }

    pub fn class_sizes(&self) -> &[usize] {
        &self.class_sizes
    }

    pub fn mean(&self) -> Point3<f64> {
        self.mean
    }

    pub fn min_corner(&self) -> Point3<f64> {
        self.min
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.size
    }

    /// True when two triangles share at least one vertex.
    pub fn is_element_neighbor(&self, e1: u32, e2: u32) -> bool {
        self.tris[e1 as usize]
            .iter()
            .any(|&v| self.face_nbrs[v as usize].contains(e2))
    }

    // ----- geometry-only mutation --------------------------------------

    /// Move a vertex; only normals are invalidated.
    pub fn move_vertex(&mut self, v: u32, position: Point3<f64>) -> MeshResult<()> {
        self.check_vertex(v)?;
        self.verts[v as usize] = position;
        self.invalidate_normals();
        Ok(())
    }

    /// Translate every vertex by `delta`.
    pub fn translate(&mut self, delta: Vector3<f64>) {
        for v in &mut self.verts {
            *v += delta;
        }
        self.calc_limits();
    }

    /// Scale every vertex component-wise.
    pub fn scale(&mut self, factors: Vector3<f64>) {
        for v in &mut self.verts {
            v.x *= factors.x;
            v.y *= factors.y;
            v.z *= factors.z;
        }
        self.calc_limits();
        self.invalidate_normals();
    }

    // ----- internal consistency helpers --------------------------------

    pub(crate) fn check_vertex(&self, v: u32) -> MeshResult<()> {
        if (v as usize) < self.verts.len() {
            Ok(())
        } else {
            Err(MeshError::InvalidIndex {
                index: v,
                len: self.verts.len(),
            })
        }
    }

    pub(crate) fn check_triangle(&self, e: u32) -> MeshResult<()> {
        if (e as usize) < self.tris.len() {
            Ok(())
        } else {
            Err(MeshError::InvalidIndex {
                index: e,
                len: self.tris.len(),
            })
        }
    }

    pub(crate) fn invalidate_normals(&mut self) {
        self.norms_valid = false;
        self.fnorms_valid = false;
    }

    pub(crate) fn invalidate_vertex_normals(&mut self) {
        self.norms_valid = false;
    }

    /// Recompute the cached normal of a single face.
    pub(crate) fn update_face_normal(&mut self, e: u32) {
        if self.face_normals.len() != self.tris.len() {
            self.face_normals.resize(self.tris.len(), Vector3::zeros());
        }
        let [i, j, k] = self.tris[e as usize];
        let v1 = self.verts[j as usize] - self.verts[i as usize];
        let v2 = self.verts[k as usize] - self.verts[j as usize];
        // Degenerate faces keep a zero normal instead of propagating NaN.
        self.face_normals[e as usize] = v1
            .cross(&v2)
            .try_normalize(f64::MIN_POSITIVE)
            .unwrap_or_else(Vector3::zeros);
    }

    pub(crate) fn calc_face_normals(&mut self) {
        if self.fnorms_valid {
            return;
        }
        self.face_normals.resize(self.tris.len(), Vector3::zeros());
        for e in 0..self.tris.len() {
            self.update_face_normal(e as u32);
        }
        self.fnorms_valid = true;
    }

    pub(crate) fn calc_vertex_normals(&mut self) {
        if self.norms_valid {
            return;
        }
        self.calc_face_normals();
        self.vert_normals.resize(self.verts.len(), Vector3::zeros());

        for v in 0..self.verts.len() {
            let mut sum = Vector3::zeros();
            for f in self.face_nbrs[v].iter() {
                sum += self.face_normals[f as usize];
            }
            self.vert_normals[v] = if self.face_nbrs[v].is_empty() {
                Vector3::x()
            } else {
                sum.try_normalize(f64::MIN_POSITIVE).unwrap_or_else(Vector3::x)
            };
        }
        self.norms_valid = true;
    }

    /// Recompute mean, minimum corner, and extent over all vertices.
    pub(crate) fn calc_limits(&mut self) {
        if self.verts.is_empty() {
            self.mean = Point3::origin();
            self.min = Point3::origin();
            self.size = Vector3::zeros();
            return;
        }

        let mut min = self.verts[0];
        let mut max = self.verts[0];
        let mut sum = Vector3::zeros();
        for v in &self.verts {
            sum += v.coords;
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            min.z = min.z.min(v.z);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
            max.z = max.z.max(v.z);
        }

        self.mean = Point3::from(sum / self.verts.len() as f64);
        self.min = min;
        self.size = max - min;
    }

    /// Rebuild both neighbor sets from the triangle array.
    pub(crate) fn rebuild_neighbors(&mut self) -> MeshResult<()> {
        debug!("calculating neighbors");
        self.node_nbrs
            .resize(self.verts.len(), NeighborSet::new());
        self.face_nbrs
            .resize(self.verts.len(), NeighborSet::new());
        for set in &mut self.node_nbrs {
            set.clear();
        }
        for set in &mut self.face_nbrs {
            set.clear();
        }

        for e in 0..self.tris.len() {
            let tri = self.tris[e];
            for m in 0..3 {
                let vm = tri[m];
                self.face_nbrs[vm as usize].insert(vm, e as u32)?;
                for k in 0..3 {
                    if k != m {
                        self.node_nbrs[vm as usize].insert(vm, tri[k])?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Populate the edge table from the triangle array. No-op when the
    /// table is already populated.
    pub(crate) fn find_edges(&mut self) -> MeshResult<()> {
        if !self.edges.is_empty() {
            return Ok(());
        }
        debug!("calculating edges");
        for e in 0..self.tris.len() {
            let [i, j, k] = self.tris[e];
            self.edges.attach(i, j, e as u32)?;
            self.edges.attach(j, k, e as u32)?;
            self.edges.attach(k, i, e as u32)?;
        }
        Ok(())
    }

    /// Rebuild everything derived from the triangle array: neighbors,
    /// edges, classes. Isolated vertices are dropped first.
    pub(crate) fn recalculate_edges(&mut self) -> MeshResult<()> {
        self.process_vertices()?;
        self.edges.clear();
        self.find_edges()?;
        self.rebuild_neighbors()?;
        self.classify()?;
        Ok(())
    }
}

impl Default for TriMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_meshes {
    use super::*;

    /// Closed tetrahedron, consistently oriented.
    pub fn tetrahedron() -> TriMesh {
        TriMesh::from_arrays(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
                Point3::new(0.5, 0.5, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]],
        )
        .unwrap()
    }

    /// Unit square split along the (1, 2) diagonal.
    pub fn quad() -> TriMesh {
        TriMesh::from_arrays(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        )
        .unwrap()
    }

    /// Two triangle fans joined only at vertex 0 (a pinch point).
    pub fn bowtie() -> TriMesh {
        TriMesh::from_arrays(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(-1.0, 0.5, 0.0),
                Point3::new(-1.0, -0.5, 0.0),
                Point3::new(1.0, 0.5, 0.0),
                Point3::new(1.0, -0.5, 0.0),
            ],
            vec![[0, 1, 2], [0, 3, 4]],
        )
        .unwrap()
    }

    /// Flat (2n+1) x (2n+1) grid of unit quads in the XY plane, each
    /// split into two triangles. The center vertex is interior and
    /// uniformly surrounded.
    pub fn grid(n: usize) -> TriMesh {
        let side = 2 * n + 1;
        let mut verts = Vec::new();
        for y in 0..=side {
            for x in 0..=side {
                verts.push(Point3::new(x as f64, y as f64, 0.0));
            }
        }
        let idx = |x: usize, y: usize| (y * (side + 1) + x) as u32;
        let mut tris = Vec::new();
        for y in 0..side {
            for x in 0..side {
                tris.push([idx(x, y), idx(x + 1, y), idx(x, y + 1)]);
                tris.push([idx(x + 1, y), idx(x + 1, y + 1), idx(x, y + 1)]);
            }
        }
        TriMesh::from_arrays(verts, tris).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_meshes::*;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_arrays_builds_derived_state() {
        let mesh = tetrahedron();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 4);
        assert_eq!(mesh.edge_count(), 6);
        assert_eq!(mesh.class_count(), 1);
        for v in 0..4 {
            assert_eq!(mesh.node_neighbors(v).len(), 3);
            assert_eq!(mesh.face_neighbors(v).len(), 3);
        }
    }

    #[test]
    fn test_from_arrays_rejects_bad_input() {
        let verts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let out_of_range = TriMesh::from_arrays(verts.clone(), vec![[0, 1, 7]]);
        assert!(matches!(
            out_of_range,
            Err(MeshError::InvalidIndex { index: 7, .. })
        ));

        let self_ref = TriMesh::from_arrays(verts, vec![[0, 1, 1]]);
        assert!(matches!(self_ref, Err(MeshError::DuplicateVertex(1))));
    }

    #[test]
    fn test_limits() {
        let mesh = quad();
        assert_eq!(mesh.min_corner(), Point3::new(0.0, 0.0, 0.0));
        assert_eq!(mesh.extent(), Vector3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(mesh.mean().x, 0.5);
        assert_relative_eq!(mesh.mean().y, 0.5);
    }

    #[test]
    fn test_move_vertex_invalidates_only_normals() {
        let mut mesh = quad();
        let edges_before = mesh.edge_count();
        mesh.calc_vertex_normals();
        assert!(mesh.norms_valid);

        mesh.move_vertex(0, Point3::new(0.0, 0.0, 0.5)).unwrap();
        assert!(!mesh.norms_valid);
        assert_eq!(mesh.edge_count(), edges_before);

        assert!(mesh.move_vertex(99, Point3::origin()).is_err());
    }

    #[test]
    fn test_face_normals_planar_quad() {
        let mut mesh = quad();
        for e in 0..2 {
            let n = mesh.face_normal(e);
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-12);
        }
        let n = mesh.vertex_normal(0);
        assert_relative_eq!(n.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scale_and_translate() {
        let mut mesh = quad();
        mesh.translate(Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(mesh.min_corner(), Point3::new(1.0, 0.0, 0.0));
        mesh.scale(Vector3::new(2.0, 2.0, 2.0));
        assert_eq!(mesh.extent(), Vector3::new(2.0, 2.0, 0.0));
    }
}
