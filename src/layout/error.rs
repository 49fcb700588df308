use thiserror::Error;

use super::cluster::ClusterPhase;

/// Internal-consistency failures.
///
/// These abort the current layout attempt: they describe a topology or call
/// sequence the cluster algorithms cannot express. Degenerate geometry is not
/// reported here; see [`super::diagnostics`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("cluster {cluster}: expected phase {expected:?}, found {found:?}")]
    PhaseOrder {
        cluster: String,
        expected: ClusterPhase,
        found: ClusterPhase,
    },
    #[error("link {link} ({src} -> {trg}) has no recognized ownership class in cluster {cluster}")]
    UnclassifiedLink {
        cluster: String,
        link: String,
        src: String,
        trg: String,
    },
    #[error("node {node} needs pad {requested} but holds {capacity} and cannot grow")]
    PadCapacity {
        node: String,
        requested: usize,
        capacity: usize,
    },
    #[error("grouping for {found} supplied to cluster {cluster}")]
    GroupMismatch { cluster: String, found: String },
    #[error("cluster {0}: dimensions requested before pad planning")]
    MissingDims(String),
    #[error("unknown node {0}")]
    UnknownNode(String),
    #[error("unknown link {0}")]
    UnknownLink(String),
    #[error("node {node} already occupies grid cell ({row}, {col})")]
    DuplicateCell { node: String, row: usize, col: usize },
    #[error("grid cell ({row}, {col}) is outside a {rows}x{cols} grid")]
    CellOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("node {0} has not been placed")]
    Unplaced(String),
}

pub type LayoutResult<T> = Result<T, LayoutError>;
