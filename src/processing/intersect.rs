// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Line-triangle intersection and nearest-point queries
//!
//! Containment uses the solid-angle test: a point lies inside a
//! triangle when the angles it subtends at each vertex pair sum to
//! 2 pi. The test is robust to the triangle's orientation in space.

use nalgebra::Point3;

use crate::mesh::TriMesh;

use super::INT_EPS;

/// Solid-angle containment: the three angles subtended at `p` by each
/// pair of triangle vertices must sum to 2 pi. A point coinciding with
/// a vertex counts as contained.
fn solid_angle_contains(
    pa: &Point3<f64>,
    pb: &Point3<f64>,
    pc: &Point3<f64>,
    p: &Point3<f64>,
) -> bool {
    let (Some(a1), Some(a2), Some(a3)) = (
        (pa - p).try_normalize(f64::MIN_POSITIVE),
        (pb - p).try_normalize(f64::MIN_POSITIVE),
        (pc - p).try_normalize(f64::MIN_POSITIVE),
    ) else {
        return true;
    };

    let total = a1.dot(&a2).clamp(-1.0, 1.0).acos()
        + a2.dot(&a3).clamp(-1.0, 1.0).acos()
        + a3.dot(&a1).clamp(-1.0, 1.0).acos();

    (total - 2.0 * std::f64::consts::PI).abs() <= INT_EPS
}

/// Intersect the segment `p1..p2` with triangle `tri` of the mesh.
///
/// Returns the intersection point, or `None` when the segment is
/// parallel to the triangle's plane, the intersection parameter falls
/// outside `[0, 1]`, or the plane point lies outside the triangle.
pub fn line_triangle_intersection(
    mesh: &TriMesh,
    tri: u32,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
) -> Option<Point3<f64>> {
    let [ia, ib, ic] = mesh.triangle(tri);
    let pa = mesh.vertex(ia);
    let pb = mesh.vertex(ib);
    let pc = mesh.vertex(ic);

    let v1 = pb - pa;
    let v2 = pc - pa;
    let v3 = p2 - p1;

    let n = v1.cross(&v2).try_normalize(f64::MIN_POSITIVE)?;

    let denom = n.dot(&v3);
    if denom.abs() < INT_EPS {
        return None; // segment parallel to the plane
    }

    let d = -n.dot(&pa.coords);
    let mu = -(d + n.dot(&p1.coords)) / denom;
    if !(0.0..=1.0).contains(&mu) {
        return None; // intersection not within the segment
    }

    let pi = p1 + mu * v3;
    if (n.dot(&pi.coords) + d).abs() > INT_EPS {
        return None;
    }

    solid_angle_contains(&pa, &pb, &pc, &pi).then_some(pi)
}

/// Closest point on the bounded segment `p1..p2` to `pt`, or `None`
/// when the perpendicular foot falls outside the segment.
fn edge_nearest(p1: &Point3<f64>, p2: &Point3<f64>, pt: &Point3<f64>) -> Option<Point3<f64>> {
    let v = p2 - p1;
    let len = v.norm();
    let dir = v.try_normalize(f64::MIN_POSITIVE)?;

    let d = (pt - p1).dot(&dir);
    if d < 0.0 || d > len {
        return None;
    }
    Some(p1 + dir * d)
}

/// Closest point of triangle `tri` to `p`: the plane projection when
/// it is contained, otherwise the best of the three bounded edge
/// projections and the three vertices.
pub fn nearest_point_on_triangle(mesh: &TriMesh, tri: u32, p: &Point3<f64>) -> Point3<f64> {
    let [ia, ib, ic] = mesh.triangle(tri);
    let pa = mesh.vertex(ia);
    let pb = mesh.vertex(ib);
    let pc = mesh.vertex(ic);

    if let Some(n) = (pb - pa).cross(&(pc - pa)).try_normalize(f64::MIN_POSITIVE) {
        let proj = p - n * n.dot(&(p - pa));
        if solid_angle_contains(&pa, &pb, &pc, &proj) {
            return proj;
        }
    }

    let mut best: Option<(f64, Point3<f64>)> = None;
    let mut consider = |candidate: Point3<f64>| {
        let d = (candidate - p).norm();
        if best.map_or(true, |(bd, _)| d < bd) {
            best = Some((d, candidate));
        }
    };

    for (q1, q2) in [(&pa, &pb), (&pa, &pc), (&pb, &pc)] {
        if let Some(pt) = edge_nearest(q1, q2, p) {
            consider(pt);
        }
    }
    for q in [pa, pb, pc] {
        consider(q);
    }

    best.expect("vertex candidates always exist").1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriMesh;
    use approx::assert_relative_eq;

    fn single_triangle() -> TriMesh {
        TriMesh::from_arrays(
            vec![
                Point3::new(-1.0, -1.0, 0.0),
                Point3::new(1.0, -1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap()
    }

    #[test]
    fn test_segment_through_triangle() {
        let mesh = single_triangle();
        let hit = line_triangle_intersection(
            &mesh,
            0,
            &Point3::new(0.0, 0.0, -1.0),
            &Point3::new(0.0, 0.0, 1.0),
        )
        .expect("segment crosses the triangle");
        assert_relative_eq!(hit.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(hit.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(hit.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_segment_misses_triangle() {
        let mesh = single_triangle();
        // Same segment shifted far along x: plane hit, containment fails.
        assert!(line_triangle_intersection(
            &mesh,
            0,
            &Point3::new(5.0, 0.0, -1.0),
            &Point3::new(5.0, 0.0, 1.0),
        )
        .is_none());
    }

    #[test]
    fn test_segment_short_of_plane() {
        let mesh = single_triangle();
        assert!(line_triangle_intersection(
            &mesh,
            0,
            &Point3::new(0.0, 0.0, -3.0),
            &Point3::new(0.0, 0.0, -1.0),
        )
        .is_none());
    }

    #[test]
    fn test_segment_parallel_to_plane() {
        let mesh = single_triangle();
        assert!(line_triangle_intersection(
            &mesh,
            0,
            &Point3::new(-1.0, 0.0, 1.0),
            &Point3::new(1.0, 0.0, 1.0),
        )
        .is_none());
    }

    #[test]
    fn test_nearest_point_inside() {
        let mesh = single_triangle();
        let p = Point3::new(0.0, 0.0, 2.0);
        let nearest = nearest_point_on_triangle(&mesh, 0, &p);
        assert_relative_eq!(nearest.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(nearest.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(nearest.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nearest_point_clamps_to_edge() {
        let mesh = single_triangle();
        // Directly below the bottom edge, outside the triangle.
        let p = Point3::new(0.0, -2.0, 0.0);
        let nearest = nearest_point_on_triangle(&mesh, 0, &p);
        assert_relative_eq!(nearest.y, -1.0, epsilon = 1e-9);
        assert_relative_eq!(nearest.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nearest_point_clamps_to_vertex() {
        let mesh = single_triangle();
        let p = Point3::new(0.0, 3.0, 0.0);
        let nearest = nearest_point_on_triangle(&mesh, 0, &p);
        assert_relative_eq!(nearest.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(nearest.y, 1.0, epsilon = 1e-9);
    }
}
