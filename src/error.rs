// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types for mesh operations

use std::path::PathBuf;
use thiserror::Error;

use crate::edges::MAX_EDGE_FACES;
use crate::neighbors::MAX_NEIGHBORS;

/// Result type alias for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors that can occur during mesh construction and editing.
///
/// Locally recoverable conditions (a flip that cannot be performed, a
/// collapse that would merge unrelated sheets) are reported as `bool`
/// or count return values instead; only conditions that would leave
/// the mesh in an undefined state surface as a `MeshError`.
#[derive(Debug, Error)]
pub enum MeshError {
    /// A vertex or triangle index is out of range.
    #[error("index {index} out of range ({len} entries)")]
    InvalidIndex { index: u32, len: usize },

    /// A triangle references the same vertex more than once.
    #[error("triangle references vertex {0} more than once")]
    DuplicateVertex(u32),

    /// Attempted to delete a vertex that still has incident faces or edges.
    #[error("vertex {0} is still linked to faces or neighbors")]
    VertexStillLinked(u32),

    /// A vertex neighbor set exceeded its fixed capacity.
    #[error("vertex {0} exceeds the neighbor capacity of {MAX_NEIGHBORS}")]
    NeighborCapacity(u32),

    /// An edge exceeded its fixed incident-face capacity.
    #[error("edge ({0}, {1}) exceeds the incident-face capacity of {MAX_EDGE_FACES}")]
    EdgeCapacity(u32, u32),

    /// An operation required an edge that does not exist.
    #[error("no edge between vertices {0} and {1}")]
    MissingEdge(u32, u32),

    /// The correction loop marked vertices but could not repair any of them.
    #[error("mesh correction stalled with {0} unrepaired vertices")]
    CorrectionStalled(usize),

    /// Error reading or writing a mesh file.
    #[error("failed to access mesh file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a mesh file.
    #[error("failed to parse mesh from {path}: {details}")]
    Parse { path: PathBuf, details: String },
}
