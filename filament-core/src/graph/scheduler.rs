//! Deferred Scheduler
//!
//! Writes do not propagate the moment they land. They enqueue the written
//! node into one pending table, and a flush applies everything queued in
//! dependency-respecting order. Repeated enqueues of one node within a
//! tick coalesce into a single entry, so a burst of writes costs one
//! downstream recomputation pass.
//!
//! # Flush Algorithm
//!
//! Each pass snapshots the table and processes every node none of whose
//! dependencies are themselves still pending. Processing a node cascades
//! into its dependents (which enqueue themselves), so passes repeat until
//! the table drains. Two exits guard against pathologies:
//!
//! - a pass that makes no progress means the remaining entries block each
//!   other (a dependency cycle); they are dropped for this flush with a
//!   warning rather than spinning.
//! - a pass-count ceiling stops callbacks that perpetually re-enqueue;
//!   leftovers carry to the next tick.
//!
//! The guard gives a partial order only: within one flush a node applies
//! after all of its currently-pending dependencies, but ordering across
//! independent subgraphs is unspecified.
//!
//! In [`UpdateMode::Immediate`] every enqueue triggers a flush on the
//! spot; enqueues made re-entrantly while a flush is running are picked
//! up by the outer pass loop instead of recursing.

use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use super::node::NodeId;
use super::GraphShared;

/// Ceiling on flush passes, against callbacks that re-enqueue forever.
const MAX_FLUSH_PASSES: usize = 1024;

/// When enqueued updates are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Batch until the next tick or explicit flush.
    #[default]
    Deferred,
    /// Flush on every enqueue.
    Immediate,
}

/// Flags describing one pending update, merged across coalesced enqueues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PendingFlags {
    /// Publish even if the recomputed value is unchanged.
    pub(crate) force: bool,
    /// Bypass animation drivers downstream; inherited by cascaded entries.
    pub(crate) skip_animation: bool,
    /// A spring/tween sample: the value is already in place, so the
    /// node's computation (if any) is not re-run.
    pub(crate) animation_step: bool,
}

impl PendingFlags {
    pub(crate) fn forced() -> Self {
        Self { force: true, ..Self::default() }
    }

    pub(crate) fn animation_step() -> Self {
        Self { animation_step: true, ..Self::default() }
    }

    /// Coalesce with another enqueue of the same node. `force` and
    /// `skip_animation` accumulate; `animation_step` survives only if
    /// every merged enqueue was an animation step, since any real write
    /// upgrades the entry to a full update.
    fn merge(self, other: Self) -> Self {
        Self {
            force: self.force || other.force,
            skip_animation: self.skip_animation || other.skip_animation,
            animation_step: self.animation_step && other.animation_step,
        }
    }
}

/// The pending table plus the deferred/immediate toggle.
pub(crate) struct Scheduler {
    pending: Mutex<IndexMap<NodeId, PendingFlags>>,
    mode: Mutex<UpdateMode>,
    flushing: AtomicBool,
}

impl Scheduler {
    pub(crate) fn new(mode: UpdateMode) -> Self {
        Self {
            pending: Mutex::new(IndexMap::new()),
            mode: Mutex::new(mode),
            flushing: AtomicBool::new(false),
        }
    }

    /// Queue `node` for the next flush, coalescing with any existing entry.
    pub(crate) fn enqueue(&self, node: NodeId, flags: PendingFlags) {
        let mut pending = self.pending.lock();
        let merged = match pending.get(&node) {
            Some(existing) => existing.merge(flags),
            None => flags,
        };
        pending.insert(node, merged);
    }

    /// Drop any pending entry for `node` (destruction path).
    pub(crate) fn remove(&self, node: NodeId) {
        self.pending.lock().shift_remove(&node);
    }

    pub(crate) fn is_pending(&self, node: NodeId) -> bool {
        self.pending.lock().contains_key(&node)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub(crate) fn mode(&self) -> UpdateMode {
        *self.mode.lock()
    }

    pub(crate) fn set_mode(&self, mode: UpdateMode) {
        *self.mode.lock() = mode;
    }

    /// Apply every unblocked pending update. No-op when a flush is
    /// already running; the outer loop will pick up anything enqueued in
    /// the meantime.
    pub(crate) fn flush(&self, graph: &GraphShared) {
        if self.flushing.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut passes = 0;
        loop {
            let snapshot: Vec<NodeId> = self.pending.lock().keys().copied().collect();
            if snapshot.is_empty() {
                break;
            }

            let mut progressed = false;
            for node in snapshot {
                // The entry may have been consumed or destroyed by an
                // earlier node's callbacks in this same pass.
                if !self.is_pending(node) {
                    continue;
                }
                // Pending-dependency guard: wait for upstream entries;
                // their cascade re-enqueues this node.
                if graph.has_pending_dependency(node) {
                    continue;
                }
                let Some(flags) = self.pending.lock().shift_remove(&node) else {
                    continue;
                };
                graph.process(node, flags);
                progressed = true;
            }

            if !progressed {
                let stuck: Vec<NodeId> = self.pending.lock().drain(..).map(|(id, _)| id).collect();
                warn!(
                    ?stuck,
                    "propagation stalled on mutually pending nodes; dropping their updates for this flush"
                );
                break;
            }

            passes += 1;
            trace!(pass = passes, remaining = self.pending_count(), "flush pass complete");
            if passes >= MAX_FLUSH_PASSES {
                warn!(
                    remaining = self.pending_count(),
                    "flush pass ceiling reached; deferring leftovers to the next tick"
                );
                break;
            }
        }

        self.flushing.store(false, Ordering::Release);
    }
}
