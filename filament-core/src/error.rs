//! Error Types
//!
//! All fallible operations in the crate return [`GraphError`]. Failures fall
//! into two families:
//!
//! - Structural errors (`GraphDropped`, `NodeDestroyed`, `WriteToComputed`,
//!   `NoSpring`, `NotAnimatable`, `InvalidParam`) are returned to the caller
//!   at the call site, so misuse fails fast with a descriptive message.
//!
//! - Computation errors (`Computation`) are contained at the node boundary:
//!   the scheduler logs them, keeps the node's previous value, and skips
//!   propagation for that cycle. They only surface directly from the eager
//!   first evaluation of a computed node, which has no previous value to
//!   fall back on.

use crate::graph::NodeId;
use crate::value::ValueKind;

/// Errors produced by graph, scheduler, and animation operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GraphError {
    /// The graph behind this handle has been dropped.
    #[error("graph has been dropped")]
    GraphDropped,

    /// The node behind this handle has been destroyed.
    #[error("node {0:?} has been destroyed")]
    NodeDestroyed(NodeId),

    /// Direct writes to computed nodes are rejected; their value is always
    /// the result of their computation.
    #[error("node {0:?} is computed and cannot be written directly")]
    WriteToComputed(NodeId),

    /// A computation body reported a failure.
    #[error("computation failed: {0}")]
    Computation(String),

    /// The value kind cannot be decomposed into numeric channels.
    #[error("values of kind {0:?} have no numeric channels")]
    NotAnimatable(ValueKind),

    /// A spring operation was requested on a node without a spring driver.
    #[error("node {0:?} has no spring attached")]
    NoSpring(NodeId),

    /// A construction-time parameter was rejected.
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),
}

impl GraphError {
    /// Convenience constructor for failures inside computation bodies.
    pub fn computation(message: impl std::fmt::Display) -> Self {
        GraphError::Computation(message.to_string())
    }
}
