//! Graph Nodes
//!
//! This module defines the identifier types and the internal record that
//! backs every node in the dependency graph.
//!
//! A node record holds the current value, the edge sets to its dependencies
//! and dependents, the optional computation that derives its value, the
//! registered bindings and connections, and the optional animation driver.
//! Records live in the graph's arena; the public [`Node`](crate::Node)
//! handle only carries a [`NodeId`] plus a weak graph reference.
//!
//! Edge sets are kept symmetric at all times: if X is in A's dependencies,
//! then A is in X's dependents. The graph enforces this by always mutating
//! both sides together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;

use crate::animation::{SpringState, TweenState};
use crate::error::GraphError;
use crate::value::Value;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier for a connection callback registered on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier for an external binding registered on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

impl BindingId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for [`Node::set_with`](crate::Node::set_with).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOpts {
    /// Enqueue an update even if the new value is cheap-equal to the old.
    pub force: bool,
    /// Bypass any attached spring or tween: assign the value directly and
    /// snap the driver state onto it (position = value, velocity = 0).
    pub skip_animation: bool,
}

impl WriteOpts {
    /// Options for a forced write.
    pub fn forced() -> Self {
        Self { force: true, skip_animation: false }
    }

    /// Options for a write that bypasses animation drivers.
    pub fn skipping_animation() -> Self {
        Self { force: false, skip_animation: true }
    }
}

/// Callback invoked with a node's settled value (bindings and connections).
pub(crate) type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// A computation that derives a node's value from its dependencies.
pub(crate) type ComputeFn = Arc<dyn Fn() -> Result<Value, GraphError> + Send + Sync>;

/// The animation driver attached to a node. A node carries at most one;
/// the enum makes spring/tween coexistence unrepresentable.
pub(crate) enum Driver {
    Spring(SpringState),
    Tween(TweenState),
}

/// Internal record backing one node in the graph arena.
pub(crate) struct NodeRecord {
    /// Current published value.
    pub(crate) value: Value,

    /// Computation that derives the value, if this is a computed node.
    /// Set once at creation and never written through `set`.
    pub(crate) compute: Option<ComputeFn>,

    /// Nodes this node read during its last computation. Rebuilt from
    /// scratch on every recomputation.
    pub(crate) dependencies: IndexSet<NodeId>,

    /// Nodes whose computations read this node. Non-owning back-references,
    /// pruned when a dependent is destroyed.
    pub(crate) dependents: IndexSet<NodeId>,

    /// External binding hooks, fired before connections on every publish.
    pub(crate) bindings: Vec<(BindingId, Callback)>,

    /// Connection callbacks, fired after bindings on every publish.
    pub(crate) connections: Vec<(ConnectionId, Callback)>,

    /// Attached animation driver, if any.
    pub(crate) driver: Option<Driver>,

    /// Memoization cache key, for computed nodes created through a
    /// `Computation` handle. Evicted on destruction.
    pub(crate) memo_key: Option<usize>,
}

impl NodeRecord {
    /// Create a record for a plain state node holding `value`.
    pub(crate) fn new(value: Value) -> Self {
        Self {
            value,
            compute: None,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            bindings: Vec::new(),
            connections: Vec::new(),
            driver: None,
            memo_key: None,
        }
    }

    /// Whether this node derives its value from a computation.
    pub(crate) fn is_computed(&self) -> bool {
        self.compute.is_some()
    }

    pub(crate) fn spring_mut(&mut self) -> Option<&mut SpringState> {
        match self.driver {
            Some(Driver::Spring(ref mut spring)) => Some(spring),
            _ => None,
        }
    }

    pub(crate) fn spring(&self) -> Option<&SpringState> {
        match self.driver {
            Some(Driver::Spring(ref spring)) => Some(spring),
            _ => None,
        }
    }

    pub(crate) fn tween_mut(&mut self) -> Option<&mut TweenState> {
        match self.driver {
            Some(Driver::Tween(ref mut tween)) => Some(tween),
            _ => None,
        }
    }
}
