//! Execution Context
//!
//! The execution context tracks which node is currently being derived, so
//! that reads made inside a computation body register dependency edges
//! against the right node.
//!
//! # Implementation
//!
//! Each graph owns one stack of `(ThreadId, NodeId)` frames. Keying frames
//! by OS thread keeps concurrent evaluations on different threads from
//! seeing each other's frames, and keeping the stack per graph (rather
//! than in a `thread_local!`) keeps two graphs in one process from
//! cross-registering edges.
//!
//! A frame is pushed before a computation body runs and popped on every
//! exit path, including failure, by the returned [`EvalGuard`]. Nested
//! computations on one thread stack naturally; the innermost frame wins.

use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::node::NodeId;

/// Per-graph stack of active computations.
pub(crate) struct EvalStack {
    frames: Mutex<Vec<(ThreadId, NodeId)>>,
}

impl EvalStack {
    pub(crate) fn new() -> Self {
        Self { frames: Mutex::new(Vec::new()) }
    }

    /// Push `node` as the active computation for the current thread.
    ///
    /// The frame is popped when the returned guard is dropped.
    pub(crate) fn enter(&self, node: NodeId) -> EvalGuard<'_> {
        self.frames.lock().push((thread::current().id(), node));
        EvalGuard { stack: self, node }
    }

    /// The node currently being derived on this thread, if any.
    pub(crate) fn current(&self) -> Option<NodeId> {
        let current = thread::current().id();
        self.frames
            .lock()
            .iter()
            .rev()
            .find(|(tid, _)| *tid == current)
            .map(|(_, node)| *node)
    }
}

/// Guard that pops its frame when dropped.
pub(crate) struct EvalGuard<'a> {
    stack: &'a EvalStack,
    node: NodeId,
}

impl Drop for EvalGuard<'_> {
    fn drop(&mut self) {
        let current = thread::current().id();
        let mut frames = self.stack.frames.lock();
        // Guards nest per thread, so the last frame for this thread is ours
        // even if other threads pushed frames above it.
        if let Some(index) = frames.iter().rposition(|(tid, _)| *tid == current) {
            let (_, node) = frames.remove(index);
            debug_assert_eq!(
                node, self.node,
                "evaluation stack mismatch: expected {:?}, got {:?}",
                self.node, node
            );
        } else {
            debug_assert!(false, "evaluation stack underflow for {:?}", self.node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_tracks_active_node() {
        let stack = EvalStack::new();
        let node = NodeId::new();

        assert!(stack.current().is_none());
        {
            let _guard = stack.enter(node);
            assert_eq!(stack.current(), Some(node));
        }
        assert!(stack.current().is_none());
    }

    #[test]
    fn nested_frames_innermost_wins() {
        let stack = EvalStack::new();
        let outer = NodeId::new();
        let inner = NodeId::new();

        let _outer_guard = stack.enter(outer);
        assert_eq!(stack.current(), Some(outer));
        {
            let _inner_guard = stack.enter(inner);
            assert_eq!(stack.current(), Some(inner));
        }
        assert_eq!(stack.current(), Some(outer));
    }

    #[test]
    fn threads_do_not_see_each_others_frames() {
        let stack = EvalStack::new();
        let node = NodeId::new();
        let _guard = stack.enter(node);

        thread::scope(|scope| {
            scope
                .spawn(|| {
                    // This thread never entered a computation.
                    assert!(stack.current().is_none());

                    let own = NodeId::new();
                    let _own_guard = stack.enter(own);
                    assert_eq!(stack.current(), Some(own));
                })
                .join()
                .unwrap();
        });

        // The other thread's frames never disturbed ours.
        assert_eq!(stack.current(), Some(node));
    }
}
