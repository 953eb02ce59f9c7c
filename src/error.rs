use crate::graph_types::{EdgeId, NodeId};
use thiserror::Error;

/// Everything that can stop a cleaning run.
///
/// Bad input geometry is never an error: it is skipped at load time and
/// reported as a marker. What remains is cancellation, configuration the
/// engine refuses to start with, and broken graph invariants (bugs).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CleanError {
    #[error("cleaning run was cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("node {0} is referenced but not present in the graph")]
    MissingNode(NodeId),
    #[error("edge {0} is referenced but not present in the graph")]
    MissingEdge(EdgeId),
    #[error("graph invariant violated after {context}: {detail}")]
    InvariantViolation { context: String, detail: String },
}

impl CleanError {
    pub fn invariant(context: &str, detail: impl Into<String>) -> Self {
        CleanError::InvariantViolation {
            context: context.to_string(),
            detail: detail.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CleanError::Cancelled)
    }
}

pub type CleanResult<T> = Result<T, CleanError>;
