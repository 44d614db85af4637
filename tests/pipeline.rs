// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! End-to-end pipeline tests over the public API: build, repair,
//! refine, extract.

use meshkit::processing;
use meshkit::TriMesh;
use nalgebra::Point3;

/// Closed, consistently wound tetrahedron.
fn tetrahedron() -> TriMesh {
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

/// Two fans joined at a single pinch vertex plus an unused vertex.
fn dirty_mesh() -> TriMesh {
    TriMesh::from_arrays(
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-1.0, 0.5, 0.0),
            Point3::new(-1.0, -0.5, 0.0),
            Point3::new(1.0, 0.5, 0.0),
            Point3::new(1.0, -0.5, 0.0),
            Point3::new(9.0, 9.0, 9.0), // isolated
        ],
        vec![[0, 1, 2], [0, 3, 4]],
    )
    .unwrap()
}

#[test]
fn correct_then_reextract_classes() {
    let mut mesh = dirty_mesh();
    let report = mesh.correct_mesh().unwrap();

    assert!(report.converged);
    assert_eq!(report.isolated_vertices_removed, 1);
    assert_eq!(report.vertices_split, 1);
    assert_eq!(report.classes, 2);

    // Each class extracts into a standalone single-triangle mesh with
    // dense indices.
    for cls in 0..mesh.class_count() {
        let part = processing::extract_class(&mesh, cls)
            .unwrap()
            .expect("class in range");
        assert_eq!(part.triangle_count(), 1);
        assert_eq!(part.vertex_count(), 3);
        assert_eq!(part.class_count(), 1);
    }
}

#[test]
fn refine_then_simplify_round_trip() {
    let mut mesh = tetrahedron();

    let split = processing::split_edges(&mut mesh, 0.5).unwrap();
    assert_eq!(split, 6); // every tetrahedron edge splits
    assert_eq!(mesh.triangle_count(), 16);

    // Refinement must preserve watertightness.
    let mut boundary = 0;
    for edge in mesh.edge_iter() {
        assert!(edge.face_count() <= 2);
        if edge.face_count() == 1 {
            boundary += 1;
        }
    }
    assert_eq!(boundary, 0);

    // Collapsing all short edges brings the count back down.
    let removed = mesh.remove_small_edges(0.6).unwrap();
    assert!(removed > 0);
    let report = mesh.correct_mesh().unwrap();
    assert!(report.converged);
}

#[test]
fn fill_holes_restores_watertightness() {
    let mut mesh = tetrahedron();
    mesh.delete_element(2).unwrap();
    assert!(mesh.edge_iter().any(|e| e.face_count() == 1));

    let filled = mesh.fill_holes().unwrap();
    assert_eq!(filled, 1);
    assert!(mesh.edge_iter().all(|e| e.face_count() == 2));

    // The filled mesh still passes a correction run untouched.
    let report = mesh.correct_mesh().unwrap();
    assert!(report.converged);
    assert!(report.orientation.is_clean());
}

#[test]
fn smooth_preserves_topology() {
    let mut mesh = tetrahedron();
    let tris = mesh.triangle_count();
    let verts = mesh.vertex_count();
    let edges = mesh.edge_count();

    mesh.smooth(5);

    assert_eq!(mesh.triangle_count(), tris);
    assert_eq!(mesh.vertex_count(), verts);
    assert_eq!(mesh.edge_count(), edges);
}

#[test]
fn id_instability_contract_after_delete() {
    // Deleting relabels the last element into the freed slot; callers
    // must re-resolve ids afterwards. This pins the documented contract.
    let mut mesh = tetrahedron();
    let last_before = mesh.triangle(3);

    mesh.delete_element(1).unwrap();
    assert_eq!(mesh.triangle_count(), 3);
    assert_eq!(mesh.triangle(1), last_before);
}

#[test]
fn push_intersecting_reduces_crossings() {
    // A patch pierced by a separate triangle; pushing moves vertices by
    // 1% of their shortest incident edge along the pierced normals.
    let mut mesh = TriMesh::from_arrays(
        vec![
            Point3::new(-2.0, -2.0, 0.0),
            Point3::new(2.0, -2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 0.0, -1.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(3.0, 0.0, 1.0),
        ],
        vec![[0, 1, 2], [3, 4, 5]],
    )
    .unwrap();

    let before = processing::count_intersecting(&mut mesh);
    assert!(before > 0);

    let pushed = processing::push_intersecting(&mut mesh).unwrap();
    assert_eq!(pushed, before);
}

#[test]
fn split_intersecting_rebuilds_valid_mesh() {
    let mut mesh = TriMesh::from_arrays(
        vec![
            Point3::new(-2.0, -2.0, 0.0),
            Point3::new(2.0, -2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 0.0, -1.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(3.0, 0.0, 1.0),
        ],
        vec![[0, 1, 2], [3, 4, 5]],
    )
    .unwrap();

    let affected = processing::split_intersecting(&mut mesh).unwrap();
    assert!(affected >= 1);

    // The rebuilt mesh has a coherent partition and adjacency.
    assert_eq!(
        mesh.class_sizes().iter().sum::<usize>(),
        mesh.triangle_count()
    );
    for e in 0..mesh.triangle_count() as u32 {
        let [a, b, c] = mesh.triangle(e);
        for v in [a, b, c] {
            assert!(mesh.face_neighbors(v).contains(e));
        }
    }
}
