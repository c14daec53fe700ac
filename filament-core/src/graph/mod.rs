//! Dependency Graph
//!
//! The graph is the arena that owns every reactive node. A [`Node`] handle
//! is just a [`NodeId`] plus a weak reference back to the graph, so
//! handles are cheap to clone, safe to capture in computation closures,
//! and cannot keep the graph alive on their own.
//!
//! # How values move
//!
//! A write lands on a node and is either redirected into an attached
//! spring/tween driver or assigned directly. Direct assignments enqueue
//! the node into the scheduler; the next flush publishes it — bindings
//! fire, dependents are enqueued for recomputation, connections fire
//! last. Driver samples re-enter the same pipeline as animation-step
//! updates each tick.
//!
//! # Dependency capture
//!
//! A computed node's dependency set is rebuilt from scratch on every run:
//! before the computation re-runs, all of its previous edges are severed
//! (both directions), and every [`Node::get`] made while the computation
//! is on the evaluation stack registers a fresh bidirectional edge. The
//! two edge sets stay symmetric at all times.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};
use tracing::{error, warn};

use crate::animation::{
    SpringConfig, SpringParam, SpringState, SpringStep, TweenProfile, TweenState, TweenStep,
};
use crate::codec::{ChannelCodec, ChannelLerp, Interpolate, StandardCodec};
use crate::error::GraphError;
use crate::value::Value;

mod context;
mod node;
mod scheduler;

pub use node::{BindingId, ConnectionId, NodeId, WriteOpts};
pub use scheduler::UpdateMode;

use context::EvalStack;
use node::{Callback, ComputeFn, Driver, NodeRecord};
use scheduler::{PendingFlags, Scheduler};

/// A reactive value graph with a deferred scheduler and animation drivers.
///
/// Cloning is cheap (one `Arc`); all clones address the same graph.
/// Dropping the last clone drops every node; outstanding [`Node`] handles
/// then return [`GraphError::GraphDropped`].
#[derive(Clone)]
pub struct Graph {
    shared: Arc<GraphShared>,
}

/// A non-owning graph reference, for long-lived drivers.
#[derive(Clone)]
pub struct WeakGraph {
    shared: Weak<GraphShared>,
}

impl WeakGraph {
    pub fn upgrade(&self) -> Option<Graph> {
        self.shared.upgrade().map(|shared| Graph { shared })
    }
}

/// Handle to one node in a [`Graph`].
#[derive(Clone)]
pub struct Node {
    graph: Weak<GraphShared>,
    id: NodeId,
}

/// A memoized computation identity.
///
/// The graph caches computed nodes by the identity of this handle (its
/// inner `Arc` pointer), so two [`Graph::computed`] calls with clones of
/// one `Computation` return the same node, while two structurally
/// identical but separately constructed closures get distinct nodes.
#[derive(Clone)]
pub struct Computation {
    body: ComputeFn,
}

impl Computation {
    pub fn new(body: impl Fn() -> Result<Value, GraphError> + Send + Sync + 'static) -> Self {
        Self { body: Arc::new(body) }
    }

    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.body) as *const () as usize
    }
}

/// Configures a [`Graph`] before construction.
pub struct GraphBuilder {
    codec: Box<dyn ChannelCodec>,
    interpolator: Box<dyn Interpolate>,
    mode: UpdateMode,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self {
            codec: Box::new(StandardCodec),
            interpolator: Box::new(ChannelLerp::default()),
            mode: UpdateMode::Deferred,
        }
    }
}

impl GraphBuilder {
    /// Replace the channel codec used by springs.
    pub fn codec(mut self, codec: impl ChannelCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Replace the interpolator used by tweens.
    pub fn interpolator(mut self, interpolator: impl Interpolate + 'static) -> Self {
        self.interpolator = Box::new(interpolator);
        self
    }

    pub fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Graph {
        Graph {
            shared: Arc::new(GraphShared {
                nodes: RwLock::new(HashMap::new()),
                eval: EvalStack::new(),
                scheduler: Scheduler::new(self.mode),
                memo: DashMap::new(),
                active: Mutex::new(IndexSet::new()),
                codec: self.codec,
                interpolator: self.interpolator,
            }),
        }
    }
}

impl Graph {
    /// A graph with the standard codec and interpolator, deferred mode.
    pub fn new() -> Self {
        GraphBuilder::default().build()
    }

    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Create a plain state node holding `value`.
    pub fn state(&self, value: impl Into<Value>) -> Node {
        let id = NodeId::new();
        self.shared.nodes.write().insert(id, NodeRecord::new(value.into()));
        self.handle(id)
    }

    /// Return the memoized node for `computation`, creating and eagerly
    /// evaluating it on first use.
    ///
    /// The eager evaluation establishes the initial value and dependency
    /// edges. It has no prior value to retain, so a failure rolls the
    /// half-built node back and surfaces to the caller.
    pub fn computed(&self, computation: &Computation) -> Result<Node, GraphError> {
        let key = computation.key();
        if let Some(existing) = self.shared.memo.get(&key).map(|entry| *entry.value()) {
            if self.shared.nodes.read().contains_key(&existing) {
                return Ok(self.handle(existing));
            }
            self.shared.memo.remove(&key);
        }

        let id = NodeId::new();
        {
            let mut nodes = self.shared.nodes.write();
            let mut record = NodeRecord::new(Value::Nil);
            record.compute = Some(computation.body.clone());
            record.memo_key = Some(key);
            nodes.insert(id, record);
        }

        let result = {
            let _guard = self.shared.eval.enter(id);
            (computation.body)()
        };
        match result {
            Ok(value) => {
                if let Some(record) = self.shared.nodes.write().get_mut(&id) {
                    record.value = value;
                }
                self.shared.memo.insert(key, id);
                Ok(self.handle(id))
            }
            Err(err) => {
                self.shared.destroy(id);
                Err(err)
            }
        }
    }

    /// Switch between deferred (default) and immediate flushing.
    /// Switching to immediate drains any backlog right away.
    pub fn set_update_mode(&self, mode: UpdateMode) {
        self.shared.scheduler.set_mode(mode);
        if mode == UpdateMode::Immediate {
            self.shared.scheduler.flush(&self.shared);
        }
    }

    pub fn update_mode(&self) -> UpdateMode {
        self.shared.scheduler.mode()
    }

    /// Apply all pending updates now.
    pub fn flush(&self) {
        self.shared.scheduler.flush(&self.shared);
    }

    /// Advance time by `delta`: step every active spring and tween, then
    /// flush. This is the periodic tick entry point.
    pub fn step(&self, delta: Duration) {
        let dt = delta.as_secs_f64();
        let active: Vec<NodeId> = self.shared.active.lock().iter().copied().collect();
        for id in active {
            self.shared.step_node(id, dt);
        }
        self.shared.scheduler.flush(&self.shared);
    }

    pub fn node_count(&self) -> usize {
        self.shared.nodes.read().len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.scheduler.pending_count()
    }

    pub fn downgrade(&self) -> WeakGraph {
        WeakGraph { shared: Arc::downgrade(&self.shared) }
    }

    fn handle(&self, id: NodeId) -> Node {
        Node { graph: Arc::downgrade(&self.shared), id }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn shared(&self) -> Result<Arc<GraphShared>, GraphError> {
        self.graph.upgrade().ok_or(GraphError::GraphDropped)
    }

    /// Read the current value. Inside a computation this registers a
    /// dependency edge from the computation to this node.
    pub fn get(&self) -> Result<Value, GraphError> {
        let shared = self.shared()?;
        if let Some(reader) = shared.eval.current() {
            if reader != self.id {
                let mut nodes = shared.nodes.write();
                if nodes.contains_key(&self.id) && nodes.contains_key(&reader) {
                    if let Some(record) = nodes.get_mut(&reader) {
                        record.dependencies.insert(self.id);
                    }
                    if let Some(record) = nodes.get_mut(&self.id) {
                        record.dependents.insert(reader);
                    }
                }
            }
        }
        self.get_untracked()
    }

    /// Read the current value without registering a dependency edge.
    pub fn get_untracked(&self) -> Result<Value, GraphError> {
        let shared = self.shared()?;
        let nodes = shared.nodes.read();
        nodes
            .get(&self.id)
            .map(|record| record.value.clone())
            .ok_or(GraphError::NodeDestroyed(self.id))
    }

    /// Write a value with default options.
    pub fn set(&self, value: impl Into<Value>) -> Result<(), GraphError> {
        self.set_with(value, WriteOpts::default())
    }

    /// Write a value.
    ///
    /// An attached tween or spring intercepts the write and animates
    /// toward it unless `opts.skip_animation` is set, in which case the
    /// driver snaps onto the value and the write applies directly. A
    /// direct write enqueues an update when the value changed under cheap
    /// equality, is composite, or `opts.force` is set.
    pub fn set_with(&self, value: impl Into<Value>, opts: WriteOpts) -> Result<(), GraphError> {
        let shared = self.shared()?;
        {
            let nodes = shared.nodes.read();
            let record = nodes.get(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
            if record.is_computed() {
                return Err(GraphError::WriteToComputed(self.id));
            }
        }
        match shared.route(self.id, value.into(), opts.skip_animation, opts.force) {
            Some(Routed::Assigned { changed }) if changed => {
                shared.enqueue(
                    self.id,
                    PendingFlags {
                        force: opts.force,
                        skip_animation: opts.skip_animation,
                        ..PendingFlags::default()
                    },
                );
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(GraphError::NodeDestroyed(self.id)),
        }
    }

    /// Closure-based read-modify-write (untracked read, then `set`).
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) -> Result<(), GraphError> {
        let current = self.get_untracked()?;
        self.set(f(&current))
    }

    /// Force-enqueue this node for recomputation on the next flush.
    pub fn invalidate(&self) -> Result<(), GraphError> {
        let shared = self.shared()?;
        if !shared.nodes.read().contains_key(&self.id) {
            return Err(GraphError::NodeDestroyed(self.id));
        }
        shared.enqueue(self.id, PendingFlags::forced());
        Ok(())
    }

    /// Subscribe a connection callback, fired with every settled value
    /// after bindings and cascading.
    pub fn connect(
        &self,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<ConnectionId, GraphError> {
        let shared = self.shared()?;
        let mut nodes = shared.nodes.write();
        let record = nodes.get_mut(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
        let id = ConnectionId::new();
        let callback: Callback = Arc::new(callback);
        record.connections.push((id, callback));
        Ok(id)
    }

    pub fn disconnect(&self, connection: ConnectionId) -> Result<(), GraphError> {
        let shared = self.shared()?;
        let mut nodes = shared.nodes.write();
        let record = nodes.get_mut(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
        record.connections.retain(|(id, _)| *id != connection);
        Ok(())
    }

    /// Register an external binding hook, fired with every settled value
    /// before connections.
    pub fn bind(
        &self,
        apply: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<BindingId, GraphError> {
        let shared = self.shared()?;
        let mut nodes = shared.nodes.write();
        let record = nodes.get_mut(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
        let id = BindingId::new();
        let apply: Callback = Arc::new(apply);
        record.bindings.push((id, apply));
        Ok(id)
    }

    pub fn unbind(&self, binding: BindingId) -> Result<(), GraphError> {
        let shared = self.shared()?;
        let mut nodes = shared.nodes.write();
        let record = nodes.get_mut(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
        record.bindings.retain(|(id, _)| *id != binding);
        Ok(())
    }

    /// Attach a spring driver, replacing any existing driver. The node
    /// snaps onto the initial goal and publishes it.
    pub fn attach_spring(&self, config: SpringConfig) -> Result<(), GraphError> {
        let shared = self.shared()?;
        let speed = initial_tuning(
            &config.speed,
            10.0,
            "spring speed must be a finite non-negative number",
        )?;
        let damping = initial_tuning(
            &config.damping,
            1.0,
            "spring damping must be a finite non-negative number",
        )?;
        let goal = config
            .goal
            .sample()
            .ok_or(GraphError::InvalidParam("spring goal node has been destroyed"))?;
        let target = shared
            .codec
            .channels(&goal)
            .ok_or(GraphError::NotAnimatable(goal.kind()))?;
        {
            let mut nodes = shared.nodes.write();
            let record = nodes.get_mut(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
            let state = SpringState::new(
                config.goal,
                config.speed,
                config.damping,
                goal.clone(),
                target,
                speed,
                damping,
            );
            record.driver = Some(Driver::Spring(state));
            record.value = goal;
        }
        // Spring nodes stay on the tick list even at rest so node-backed
        // goal/speed/damping are sampled every tick.
        shared.active.lock().insert(self.id);
        shared.enqueue(self.id, PendingFlags::forced());
        Ok(())
    }

    /// Attach a tween profile, replacing any existing driver. The next
    /// write starts a run from the current value toward the written one.
    pub fn attach_tween(&self, profile: TweenProfile) -> Result<(), GraphError> {
        let shared = self.shared()?;
        {
            let mut nodes = shared.nodes.write();
            let record = nodes.get_mut(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
            let current = record.value.clone();
            record.driver = Some(Driver::Tween(TweenState::new(profile, current)));
        }
        shared.active.lock().swap_remove(&self.id);
        Ok(())
    }

    /// Rebase the attached spring at its current position with this
    /// velocity and set it in motion.
    pub fn set_velocity(&self, velocity: Value) -> Result<(), GraphError> {
        self.with_spring_velocity(velocity, |spring, channels| spring.set_velocity(channels))
    }

    /// Add this velocity onto the attached spring's current velocity.
    pub fn add_velocity(&self, velocity: Value) -> Result<(), GraphError> {
        self.with_spring_velocity(velocity, |spring, channels| spring.add_velocity(channels))
    }

    fn with_spring_velocity(
        &self,
        velocity: Value,
        apply: impl FnOnce(&mut SpringState, crate::codec::Channels),
    ) -> Result<(), GraphError> {
        let shared = self.shared()?;
        let channels = shared
            .codec
            .channels(&velocity)
            .ok_or(GraphError::NotAnimatable(velocity.kind()))?;
        {
            let mut nodes = shared.nodes.write();
            let record = nodes.get_mut(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
            let spring = record.spring_mut().ok_or(GraphError::NoSpring(self.id))?;
            if channels.len() != spring.target.len() {
                return Err(GraphError::InvalidParam(
                    "velocity channel count does not match the spring",
                ));
            }
            apply(spring, channels);
        }
        shared.active.lock().insert(self.id);
        Ok(())
    }

    /// The attached spring's current interpolated velocity, packed as the
    /// node's value kind.
    pub fn spring_velocity(&self) -> Result<Value, GraphError> {
        let shared = self.shared()?;
        let (kind, velocity) = {
            let nodes = shared.nodes.read();
            let record = nodes.get(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
            let spring = record.spring().ok_or(GraphError::NoSpring(self.id))?;
            (spring.kind, spring.velocity())
        };
        shared
            .codec
            .pack(kind, &velocity)
            .ok_or(GraphError::NotAnimatable(kind))
    }

    /// Ids of the nodes this node read during its last computation.
    pub fn dependency_ids(&self) -> Result<Vec<NodeId>, GraphError> {
        let shared = self.shared()?;
        let nodes = shared.nodes.read();
        let record = nodes.get(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
        Ok(record.dependencies.iter().copied().collect())
    }

    /// Ids of the nodes whose computations read this node.
    pub fn dependent_ids(&self) -> Result<Vec<NodeId>, GraphError> {
        let shared = self.shared()?;
        let nodes = shared.nodes.read();
        let record = nodes.get(&self.id).ok_or(GraphError::NodeDestroyed(self.id))?;
        Ok(record.dependents.iter().copied().collect())
    }

    /// Destroy the node: sever every edge in both directions, cancel its
    /// pending update, evict its memo entry, and drop its driver and
    /// callbacks. Idempotent; safe mid-cascade. Dependents stay alive.
    pub fn destroy(&self) {
        if let Some(shared) = self.graph.upgrade() {
            shared.destroy(self.id);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("id", &self.id).finish()
    }
}

/// Validate a spring tuning parameter at attach time. Constants must be
/// finite and non-negative; node-backed parameters fall back to the
/// default until a usable sample arrives.
fn initial_tuning(
    param: &SpringParam,
    default: f64,
    message: &'static str,
) -> Result<f64, GraphError> {
    match param {
        SpringParam::Value(value) => match value.as_float() {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
            _ => Err(GraphError::InvalidParam(message)),
        },
        SpringParam::Node(node) => Ok(node
            .get_untracked()
            .ok()
            .and_then(|v| v.as_float())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(default)),
    }
}

/// Sample a spring tuning parameter mid-flight. Bad samples keep the
/// previous value in force.
fn sample_tuning(param: &SpringParam) -> Option<f64> {
    let value = param.sample()?;
    match value.as_float() {
        Some(v) if v.is_finite() && v >= 0.0 => Some(v),
        _ => {
            warn!("spring tuning sample is not a finite non-negative number; keeping the previous value");
            None
        }
    }
}

/// How a routed value landed on its node.
enum Routed {
    /// Assigned directly; `changed` reflects the cheap-equality gate
    /// (composite values and forced writes always count as changed).
    Assigned { changed: bool },
    /// Intercepted by a driver; publication happens through ticking.
    Redirected,
}

/// State shared by every [`Graph`] clone and referenced weakly by nodes.
pub(crate) struct GraphShared {
    nodes: RwLock<HashMap<NodeId, NodeRecord>>,
    eval: EvalStack,
    scheduler: Scheduler,
    /// Computed-node cache, keyed by `Computation` pointer identity.
    memo: DashMap<usize, NodeId>,
    /// Nodes whose drivers need ticking.
    active: Mutex<IndexSet<NodeId>>,
    codec: Box<dyn ChannelCodec>,
    interpolator: Box<dyn Interpolate>,
}

impl GraphShared {
    /// Enqueue and, in immediate mode, flush on the spot. Re-entrant
    /// calls during a flush only enqueue; the running flush picks the
    /// entry up.
    pub(crate) fn enqueue(&self, id: NodeId, flags: PendingFlags) {
        self.scheduler.enqueue(id, flags);
        if self.scheduler.mode() == UpdateMode::Immediate {
            self.scheduler.flush(self);
        }
    }

    /// Whether any dependency of `id` still has a pending update.
    pub(crate) fn has_pending_dependency(&self, id: NodeId) -> bool {
        let nodes = self.nodes.read();
        match nodes.get(&id) {
            Some(record) => record
                .dependencies
                .iter()
                .any(|dep| self.scheduler.is_pending(*dep)),
            None => false,
        }
    }

    /// Apply one pending update: recompute if needed, then publish.
    pub(crate) fn process(&self, id: NodeId, flags: PendingFlags) {
        let compute = {
            let nodes = self.nodes.read();
            let Some(record) = nodes.get(&id) else { return };
            record.compute.clone()
        };

        if let Some(compute) = compute {
            if !flags.animation_step {
                // The dependency set is rebuilt fresh, not diffed.
                self.sever_dependencies(id);
                let result = {
                    let _guard = self.eval.enter(id);
                    compute()
                };
                let value = match result {
                    Ok(value) => value,
                    Err(err) => {
                        error!(node = %id, error = %err, "computation failed; keeping the previous value");
                        return;
                    }
                };
                match self.route(id, value, flags.skip_animation, flags.force) {
                    Some(Routed::Assigned { changed }) if changed => {}
                    // Unchanged, redirected into a driver, or destroyed
                    // mid-computation: nothing to publish this cycle.
                    Some(_) | None => return,
                }
            }
        }

        self.publish(id, flags.skip_animation);
    }

    /// Fire bindings, cascade to dependents, fire connections.
    fn publish(&self, id: NodeId, skip_animation: bool) {
        let (value, bindings, connections, dependents) = {
            let nodes = self.nodes.read();
            let Some(record) = nodes.get(&id) else { return };
            (
                record.value.clone(),
                record.bindings.iter().map(|(_, cb)| cb.clone()).collect::<Vec<_>>(),
                record.connections.iter().map(|(_, cb)| cb.clone()).collect::<Vec<_>>(),
                record.dependents.iter().copied().collect::<Vec<_>>(),
            )
        };

        // Callback lists are cloned out above so no lock is held across
        // user code.
        for binding in &bindings {
            binding(&value);
        }
        for dependent in dependents {
            self.enqueue(
                dependent,
                PendingFlags { skip_animation, ..PendingFlags::default() },
            );
        }
        for connection in &connections {
            connection(&value);
        }
    }

    /// Land `value` on the node: snap or feed the driver, or assign
    /// directly. `None` if the node is gone.
    fn route(&self, id: NodeId, value: Value, skip_animation: bool, force: bool) -> Option<Routed> {
        // Codec runs before the lock is taken.
        let channels = self.codec.channels(&value);

        let mut nodes = self.nodes.write();
        let record = nodes.get_mut(&id)?;

        if skip_animation {
            match record.driver {
                Some(Driver::Spring(ref mut spring)) => match channels {
                    Some(ch) => spring.snap_to(value.kind(), ch),
                    None => spring.elapsed = None,
                },
                Some(Driver::Tween(ref mut tween)) => tween.snap_to(value.clone()),
                None => {}
            }
        } else {
            match record.driver {
                Some(Driver::Tween(ref mut tween)) => {
                    let start = record.value.clone();
                    tween.begin(start, value);
                    drop(nodes);
                    self.active.lock().insert(id);
                    return Some(Routed::Redirected);
                }
                Some(Driver::Spring(ref mut spring)) => match channels {
                    Some(ch) => {
                        // A direct write overrides the goal source until
                        // the sampled goal next changes, so `last_goal`
                        // is left untouched here.
                        if spring.retarget(&value, ch) {
                            // Kind changed: publish the new target now.
                            record.value = value;
                            return Some(Routed::Assigned { changed: true });
                        }
                        return Some(Routed::Redirected);
                    }
                    None => {
                        warn!(node = %id, kind = ?value.kind(), "value has no numeric channels; bypassing the spring");
                    }
                },
                None => {}
            }
        }

        let changed = force || value.is_composite() || value != record.value;
        record.value = value;
        Some(Routed::Assigned { changed })
    }

    /// Remove all of a node's dependency edges, both directions.
    fn sever_dependencies(&self, id: NodeId) {
        let mut nodes = self.nodes.write();
        let dependencies: Vec<NodeId> = match nodes.get_mut(&id) {
            Some(record) => std::mem::take(&mut record.dependencies).into_iter().collect(),
            None => return,
        };
        for dependency in dependencies {
            if let Some(record) = nodes.get_mut(&dependency) {
                record.dependents.swap_remove(&id);
            }
        }
    }

    /// Fully unlink and drop a node. Idempotent.
    pub(crate) fn destroy(&self, id: NodeId) {
        let removed = {
            let mut nodes = self.nodes.write();
            let Some(record) = nodes.remove(&id) else { return };
            for dependency in &record.dependencies {
                if let Some(other) = nodes.get_mut(dependency) {
                    other.dependents.swap_remove(&id);
                }
            }
            for dependent in &record.dependents {
                if let Some(other) = nodes.get_mut(dependent) {
                    other.dependencies.swap_remove(&id);
                }
            }
            record
        };
        if let Some(key) = removed.memo_key {
            self.memo.remove(&key);
        }
        self.scheduler.remove(id);
        self.active.lock().swap_remove(&id);
    }

    /// Advance one node's driver by `dt` seconds.
    fn step_node(&self, id: NodeId, dt: f64) {
        enum Kind {
            Spring,
            Tween,
        }
        let kind = {
            let nodes = self.nodes.read();
            match nodes.get(&id).and_then(|record| record.driver.as_ref()) {
                Some(Driver::Spring(_)) => Some(Kind::Spring),
                Some(Driver::Tween(_)) => Some(Kind::Tween),
                None => None,
            }
        };
        match kind {
            Some(Kind::Spring) => self.step_spring(id, dt),
            Some(Kind::Tween) => self.step_tween(id, dt),
            None => {
                self.active.lock().swap_remove(&id);
            }
        }
    }

    fn step_spring(&self, id: NodeId, dt: f64) {
        // Parameter sources are cloned out and sampled without the node
        // lock, since node-backed parameters read back into the graph.
        let params = {
            let nodes = self.nodes.read();
            nodes.get(&id).and_then(|record| record.spring()).map(|spring| {
                (
                    spring.goal.clone(),
                    spring.speed.clone(),
                    spring.damping.clone(),
                    spring.last_goal.clone(),
                )
            })
        };
        let Some((goal, speed, damping, last_goal)) = params else {
            self.active.lock().swap_remove(&id);
            return;
        };

        let goal_sample = goal.sample().filter(|sample| *sample != last_goal);
        let goal_channels = goal_sample.as_ref().map(|sample| self.codec.channels(sample));
        let speed_sample = sample_tuning(&speed);
        let damping_sample = sample_tuning(&damping);

        let mut publish = false;
        let mut packed: Option<Value> = None;
        {
            let mut nodes = self.nodes.write();
            let Some(record) = nodes.get_mut(&id) else {
                drop(nodes);
                self.active.lock().swap_remove(&id);
                return;
            };
            let Some(spring) = record.spring_mut() else {
                drop(nodes);
                self.active.lock().swap_remove(&id);
                return;
            };

            if let Some(sample) = goal_sample {
                match goal_channels.flatten() {
                    Some(channels) => {
                        let discontinuous = spring.retarget(&sample, channels);
                        spring.last_goal = sample.clone();
                        if discontinuous {
                            packed = Some(sample);
                        }
                    }
                    None => warn!(
                        node = %id,
                        "spring goal sample has no numeric channels; keeping the previous target"
                    ),
                }
            }
            if let Some(sample) = speed_sample {
                spring.speed_value = sample;
            }
            if let Some(sample) = damping_sample {
                spring.damping_value = sample;
            }

            let step = spring.advance(dt);
            let kind = spring.kind;
            match step {
                SpringStep::Idle => {}
                SpringStep::Moving(channels) | SpringStep::Rested(channels) => {
                    drop(nodes);
                    // Pack outside the node lock, then land the sample.
                    match self.codec.pack(kind, &channels) {
                        Some(value) => packed = Some(value),
                        None => warn!(node = %id, ?kind, "codec declined to pack spring channels"),
                    }
                }
            }
        }

        if let Some(value) = packed {
            let mut nodes = self.nodes.write();
            if let Some(record) = nodes.get_mut(&id) {
                record.value = value;
                publish = true;
            }
        }
        if publish {
            self.enqueue(id, PendingFlags::animation_step());
        }
    }

    fn step_tween(&self, id: NodeId, dt: f64) {
        enum Outcome {
            Nothing,
            Blend { start: Value, goal: Value, eased: f64 },
            Settle(Value),
        }

        let mut deactivate = false;
        let outcome = {
            let mut nodes = self.nodes.write();
            let Some(record) = nodes.get_mut(&id) else {
                drop(nodes);
                self.active.lock().swap_remove(&id);
                return;
            };
            let Some(tween) = record.tween_mut() else {
                drop(nodes);
                self.active.lock().swap_remove(&id);
                return;
            };
            match tween.advance(dt) {
                TweenStep::Idle => {
                    deactivate = true;
                    Outcome::Nothing
                }
                TweenStep::Waiting => Outcome::Nothing,
                TweenStep::Moving(eased) => Outcome::Blend {
                    start: tween.start.clone(),
                    goal: tween.goal.clone(),
                    eased,
                },
                TweenStep::Finished(value) => {
                    deactivate = true;
                    Outcome::Settle(value)
                }
            }
        };

        let value = match outcome {
            Outcome::Nothing => None,
            // Interpolation runs outside the node lock.
            Outcome::Blend { start, goal, eased } => {
                Some(self.interpolator.interpolate(&start, &goal, eased))
            }
            Outcome::Settle(value) => Some(value),
        };

        if let Some(value) = value {
            {
                let mut nodes = self.nodes.write();
                if let Some(record) = nodes.get_mut(&id) {
                    record.value = value;
                }
            }
            self.enqueue(id, PendingFlags::animation_step());
        }
        if deactivate {
            self.active.lock().swap_remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float(node: &Node) -> f64 {
        node.get_untracked().unwrap().as_float().unwrap()
    }

    #[test]
    fn state_nodes_hold_and_return_values() {
        let graph = Graph::new();
        let node = graph.state(7.0);
        assert_eq!(node.get().unwrap(), Value::Float(7.0));
        node.set(8.0).unwrap();
        assert_eq!(float(&node), 8.0);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn reads_inside_computations_register_edges() {
        let graph = Graph::new();
        let source = graph.state(2.0);
        let reader = source.clone();
        let derived = graph
            .computed(&Computation::new(move || {
                Ok(Value::Float(reader.get()?.as_float().unwrap_or(0.0) + 1.0))
            }))
            .unwrap();

        assert_eq!(float(&derived), 3.0);
        assert_eq!(derived.dependency_ids().unwrap(), vec![source.id()]);
        assert_eq!(source.dependent_ids().unwrap(), vec![derived.id()]);
    }

    #[test]
    fn untracked_reads_register_nothing() {
        let graph = Graph::new();
        let source = graph.state(2.0);
        let reader = source.clone();
        let derived = graph
            .computed(&Computation::new(move || {
                reader.get_untracked()?;
                Ok(Value::Float(1.0))
            }))
            .unwrap();

        assert!(derived.dependency_ids().unwrap().is_empty());
        assert!(source.dependent_ids().unwrap().is_empty());
    }

    #[test]
    fn reads_outside_computations_register_nothing() {
        let graph = Graph::new();
        let node = graph.state(1.0);
        node.get().unwrap();
        assert!(node.dependent_ids().unwrap().is_empty());
    }

    #[test]
    fn computed_nodes_reject_direct_writes() {
        let graph = Graph::new();
        let derived = graph
            .computed(&Computation::new(|| Ok(Value::Float(1.0))))
            .unwrap();
        assert!(matches!(derived.set(2.0), Err(GraphError::WriteToComputed(_))));
    }

    #[test]
    fn update_applies_a_closure_over_the_current_value() {
        let graph = Graph::new();
        let node = graph.state(10.0);
        node.update(|v| Value::Float(v.as_float().unwrap_or(0.0) / 2.0)).unwrap();
        assert_eq!(float(&node), 5.0);
    }

    #[test]
    fn dropped_graph_fails_handle_operations() {
        let graph = Graph::new();
        let node = graph.state(1.0);
        drop(graph);
        assert!(matches!(node.get_untracked(), Err(GraphError::GraphDropped)));
        assert!(matches!(node.set(2.0), Err(GraphError::GraphDropped)));
    }

    #[test]
    fn connect_and_disconnect_manage_callbacks() {
        let graph = Graph::builder().update_mode(UpdateMode::Immediate).build();
        let node = graph.state(0.0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let connection = node
            .connect(move |value| sink.lock().push(value.clone()))
            .unwrap();

        node.set(1.0).unwrap();
        node.disconnect(connection).unwrap();
        node.set(2.0).unwrap();

        assert_eq!(seen.lock().as_slice(), &[Value::Float(1.0)]);
    }

    #[test]
    fn later_driver_attachment_replaces_the_former() {
        let graph = Graph::new();
        let node = graph.state(0.0);
        node.attach_spring(SpringConfig::new(0.0)).unwrap();
        node.attach_tween(TweenProfile::new(Duration::from_secs(1))).unwrap();
        graph.flush();

        // A write now starts a tween run instead of retargeting a spring.
        node.set(10.0).unwrap();
        assert!(matches!(node.spring_velocity(), Err(GraphError::NoSpring(_))));
        graph.step(Duration::from_millis(500));
        assert!((float(&node) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn attach_spring_snaps_onto_the_initial_goal() {
        let graph = Graph::new();
        let node = graph.state(Value::Vec2([0.0, 0.0]));
        node.attach_spring(SpringConfig::new(Value::Vec2([1.0, -2.0]))).unwrap();
        graph.flush();
        assert_eq!(node.get_untracked().unwrap(), Value::Vec2([1.0, -2.0]));
    }

    #[test]
    fn invalid_spring_parameters_fail_fast() {
        let graph = Graph::new();
        let node = graph.state(0.0);
        assert!(matches!(
            node.attach_spring(SpringConfig::new(Value::from("goal"))),
            Err(GraphError::NotAnimatable(_))
        ));
        assert!(matches!(
            node.attach_spring(SpringConfig::new(1.0).speed(-2.0)),
            Err(GraphError::InvalidParam(_))
        ));
        assert!(matches!(
            node.attach_spring(SpringConfig::new(1.0).damping(f64::NAN)),
            Err(GraphError::InvalidParam(_))
        ));
    }

    #[test]
    fn memo_cache_is_keyed_by_handle_identity() {
        let graph = Graph::new();
        let computation = Computation::new(|| Ok(Value::Float(42.0)));
        let first = graph.computed(&computation).unwrap();
        let second = graph.computed(&computation).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(graph.node_count(), 1);

        let other = graph
            .computed(&Computation::new(|| Ok(Value::Float(42.0))))
            .unwrap();
        assert_ne!(first.id(), other.id());

        // Destruction evicts the entry; the next call builds fresh.
        first.destroy();
        let rebuilt = graph.computed(&computation).unwrap();
        assert_ne!(rebuilt.id(), first.id());
    }

    #[test]
    fn eager_evaluation_failure_rolls_the_node_back() {
        let graph = Graph::new();
        let before = graph.node_count();
        let result = graph.computed(&Computation::new(|| {
            Err(GraphError::computation("boom"))
        }));
        assert!(result.is_err());
        assert_eq!(graph.node_count(), before);
    }
}
