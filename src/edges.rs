// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Edge table keyed by unordered vertex pairs
//!
//! Edges are stored in a growable slab and looked up through a hash map
//! keyed by the canonical `(min, max)` vertex pair, so records can be
//! referenced by stable [`EdgeId`] while topology is edited.

use hashbrown::HashMap;

use crate::error::{MeshError, MeshResult};

/// Maximum triangles that may share a single edge.
///
/// A well-formed mesh uses 1 (boundary) or 2 (interior); anything above
/// 2 is a non-manifold defect the correction pass removes. The limit
/// bounds how degenerate an input may be before it is rejected.
pub const MAX_EDGE_FACES: usize = 10;

/// Index of an edge record inside the table slab.
pub type EdgeId = u32;

/// Edge record: canonical vertex pair plus bounded incident-face list.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    node1: u32,
    node2: u32,
    faces: [u32; MAX_EDGE_FACES],
    nfaces: usize,
    /// Scratch slot parking the id of a not-yet-committed midpoint
    /// vertex during refinement.
    pub store: Option<u32>,
}

impl Edge {
    fn new(node1: u32, node2: u32) -> Self {
        debug_assert!(node1 < node2);
        Self {
            node1,
            node2,
            faces: [0; MAX_EDGE_FACES],
            nfaces: 0,
            store: None,
        }
    }

    pub fn node1(&self) -> u32 {
        self.node1
    }

    pub fn node2(&self) -> u32 {
        self.node2
    }

    pub fn nodes(&self) -> (u32, u32) {
        (self.node1, self.node2)
    }

    pub fn faces(&self) -> &[u32] {
        &self.faces[..self.nfaces]
    }

    pub fn face_count(&self) -> usize {
        self.nfaces
    }

    /// For a 2-face edge, the incident face other than `face`.
    pub fn other_face(&self, face: u32) -> Option<u32> {
        self.faces().iter().copied().find(|&f| f != face)
    }

    fn attach(&mut self, face: u32) -> MeshResult<bool> {
        if self.faces().contains(&face) {
            return Ok(false);
        }
        if self.nfaces == MAX_EDGE_FACES {
            return Err(MeshError::EdgeCapacity(self.node1, self.node2));
        }
        self.faces[self.nfaces] = face;
        self.nfaces += 1;
        Ok(true)
    }

    fn detach(&mut self, face: u32) -> bool {
        let mut dest = 0;
        for n in 0..self.nfaces {
            if self.faces[n] == face {
                continue;
            }
            if dest != n {
                self.faces[dest] = self.faces[n];
            }
            dest += 1;
        }
        let removed = dest != self.nfaces;
        self.nfaces = dest;
        removed
    }
}

/// Associative edge store for the whole mesh.
#[derive(Debug, Clone, Default)]
pub struct EdgeTable {
    slots: Vec<Option<Edge>>,
    index: HashMap<(u32, u32), EdgeId>,
    free: Vec<EdgeId>,
}

impl EdgeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.free.clear();
    }

    fn key(a: u32, b: u32) -> (u32, u32) {
        debug_assert_ne!(a, b);
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn contains(&self, a: u32, b: u32) -> bool {
        self.index.contains_key(&Self::key(a, b))
    }

    pub fn id(&self, a: u32, b: u32) -> Option<EdgeId> {
        self.index.get(&Self::key(a, b)).copied()
    }

    pub fn get(&self, a: u32, b: u32) -> Option<&Edge> {
        self.id(a, b).and_then(|id| self.edge(id))
    }

    pub fn get_mut(&mut self, a: u32, b: u32) -> Option<&mut Edge> {
        let id = self.id(a, b)?;
        self.edge_mut(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.slots.get(id as usize).and_then(|s| s.as_ref())
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.slots.get_mut(id as usize).and_then(|s| s.as_mut())
    }

    /// Register `face` as incident to the edge `(a, b)`, creating the
    /// edge record if it does not exist yet. Registering a face that is
    /// already attached is a no-op.
    pub fn attach(&mut self, a: u32, b: u32, face: u32) -> MeshResult<EdgeId> {
        let key = Self::key(a, b);
        if let Some(&id) = self.index.get(&key) {
            self.slots[id as usize]
                .as_mut()
                .expect("indexed edge slot is live")
                .attach(face)?;
            return Ok(id);
        }

        let mut edge = Edge::new(key.0, key.1);
        edge.attach(face)?;

        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(edge);
                id
            }
            None => {
                let id = self.slots.len() as EdgeId;
                self.slots.push(Some(edge));
                id
            }
        };
        self.index.insert(key, id);
        Ok(id)
    }

    /// Detach `face` from the edge `(a, b)` and return the remaining
    /// incident-face count. The record stays in the table even when
    /// empty; callers decide when to [`remove`](Self::remove) it.
    pub fn detach(&mut self, a: u32, b: u32, face: u32) -> MeshResult<usize> {
        let edge = self
            .get_mut(a, b)
            .ok_or(MeshError::MissingEdge(a.min(b), a.max(b)))?;
        edge.detach(face);
        Ok(edge.face_count())
    }

    /// Drop the edge record for `(a, b)` entirely.
    /// Returns whether an edge was removed.
    pub fn remove(&mut self, a: u32, b: u32) -> bool {
        let key = Self::key(a, b);
        match self.index.remove(&key) {
            Some(id) => {
                self.slots[id as usize] = None;
                self.free.push(id);
                true
            }
            None => false,
        }
    }

    /// Re-key every edge incident to `old` so it references `new`
    /// instead, merging incident-face lists when the renamed edge
    /// already exists. Used by swap-with-last vertex relabeling.
    pub fn rename_vertex(&mut self, old: u32, new: u32, partners: &[u32]) -> MeshResult<()> {
        for &vn in partners {
            if let Some(edge) = self.get(old, vn).copied() {
                for &f in edge.faces() {
                    self.attach(new, vn, f)?;
                }
                if let Some(store) = edge.store {
                    if let Some(e) = self.get_mut(new, vn) {
                        e.store = Some(store);
                    }
                }
                self.remove(old, vn);
            }
        }
        Ok(())
    }

    /// Snapshot of live edge ids, in slab order. Taking a snapshot lets
    /// callers mutate the table while walking edges.
    pub fn ids(&self) -> Vec<EdgeId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| i as EdgeId)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (i as EdgeId, e)))
    }
}
