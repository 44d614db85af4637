// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Uniform-grid spatial cache for broad-phase sphere queries
//!
//! Bounding spheres are hashed into every grid cell their bounding box
//! overlaps. The cell gather is conservative (cell/AABB overlap, not
//! exact sphere/cell overlap), but every query candidate passes an
//! exact sphere-sphere test before it is returned, so there are no
//! false positives and no false negatives.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};

use crate::geometry::Sphere;

const DIV_MIN: usize = 2;
const DIV_MAX: usize = 64;

/// Uniform grid index over bounding spheres keyed by caller-chosen ids.
#[derive(Debug, Clone)]
pub struct SphereCache {
    cells: Vec<HashSet<u32>>,
    spheres: HashMap<u32, Sphere>,
    div: usize,
    origin: Point3<f64>,
    step: Vector3<f64>,
}

impl SphereCache {
    /// Build a `divisions`-cubed grid over the box `[origin, origin + size]`.
    ///
    /// `divisions` is clamped to `[2, 64]`; degenerate (zero or
    /// negative) extents fall back to a unit step on that axis.
    pub fn new(origin: Point3<f64>, size: Vector3<f64>, divisions: usize) -> Self {
        let div = divisions.clamp(DIV_MIN, DIV_MAX);

        let mut step = size / div as f64;
        if step.x <= 0.0 {
            step.x = 1.0;
        }
        if step.y <= 0.0 {
            step.y = 1.0;
        }
        if step.z <= 0.0 {
            step.z = 1.0;
        }

        Self {
            cells: vec![HashSet::new(); div * div * div],
            spheres: HashMap::new(),
            div,
            origin,
            step,
        }
    }

    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    /// Map a point to clamped discrete grid coordinates.
    fn grid_coord(&self, p: &Point3<f64>) -> (usize, usize, usize) {
        let rel = p - self.origin;
        let clamp = |v: f64, step: f64| -> usize {
            let c = (v / step).floor();
            if c < 0.0 {
                0
            } else if c >= self.div as f64 {
                self.div - 1
            } else {
                c as usize
            }
        };
        (
            clamp(rel.x, self.step.x),
            clamp(rel.y, self.step.y),
            clamp(rel.z, self.step.z),
        )
    }

    fn grid_index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.div + y) * self.div + z
    }

    /// Indices of all grid cells overlapped by the sphere's bounding box.
    fn hash_sphere(&self, s: &Sphere) -> Vec<usize> {
        let r = Vector3::new(s.radius, s.radius, s.radius);
        let (x0, y0, z0) = self.grid_coord(&(s.center - r));
        let (x1, y1, z1) = self.grid_coord(&(s.center + r));

        let mut ids = Vec::with_capacity((x1 - x0 + 1) * (y1 - y0 + 1) * (z1 - z0 + 1));
        for x in x0..=x1 {
            for y in y0..=y1 {
                for z in z0..=z1 {
                    ids.push(self.grid_index(x, y, z));
                }
            }
        }
        ids
    }

    /// Insert (or replace) the sphere stored under `id`.
    pub fn insert(&mut self, id: u32, sphere: Sphere) {
        if self.spheres.contains_key(&id) {
            self.remove(id);
        }
        for cell in self.hash_sphere(&sphere) {
            self.cells[cell].insert(id);
        }
        self.spheres.insert(id, sphere);
    }

    /// Remove the sphere stored under `id`, if any.
    pub fn remove(&mut self, id: u32) -> bool {
        match self.spheres.remove(&id) {
            Some(sphere) => {
                for cell in self.hash_sphere(&sphere) {
                    self.cells[cell].remove(&id);
                }
                true
            }
            None => false,
        }
    }

    /// Ids of all stored spheres that exactly intersect `query`.
    ///
    /// The grid narrows candidates; the final sphere-sphere distance
    /// test is exact. The result is sorted for determinism.
    pub fn intersect(&self, query: &Sphere) -> Vec<u32> {
        let mut hits: Vec<u32> = Vec::new();
        let mut seen: HashSet<u32> = HashSet::new();

        for cell in self.hash_sphere(query) {
            for &id in &self.cells[cell] {
                if !seen.insert(id) {
                    continue;
                }
                if self.spheres[&id].intersects(query) {
                    hits.push(id);
                }
            }
        }

        hits.sort_unstable();
        hits
    }
}
