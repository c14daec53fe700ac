//! Filament Core
//!
//! This crate provides the core runtime for the Filament reactive
//! animation framework. It implements:
//!
//! - A reactive dependency-tracking value graph (state nodes plus
//!   memoized computed nodes) whose edges are re-derived on every
//!   recomputation
//! - A deferred scheduler that batches writes per tick and applies them
//!   in dependency-respecting order
//! - An analytic animation layer: springs with closed-form
//!   damped-oscillator motion and eased tweens, both publishing through
//!   the same propagation pipeline as ordinary writes
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: the node arena, dependency capture, write routing, and the
//!   deferred scheduler
//! - `animation`: spring and tween drivers plus easing curves
//! - `value` / `codec`: the dynamic value model and the channel
//!   decomposition / interpolation seams
//! - `driver`: a tokio-based periodic tick loop
//!
//! # Example
//!
//! ```rust
//! use filament_core::{Computation, Graph, Value};
//!
//! let graph = Graph::new();
//! let count = graph.state(1.0);
//!
//! let source = count.clone();
//! let doubled = graph
//!     .computed(&Computation::new(move || {
//!         Ok(Value::Float(source.get()?.as_float().unwrap_or(0.0) * 2.0))
//!     }))
//!     .unwrap();
//! assert_eq!(doubled.get_untracked().unwrap(), Value::Float(2.0));
//!
//! // Writes batch until the next flush or tick.
//! count.set(5.0).unwrap();
//! graph.flush();
//! assert_eq!(doubled.get_untracked().unwrap(), Value::Float(10.0));
//! ```

pub mod animation;
pub mod codec;
pub mod driver;
pub mod error;
pub mod graph;
pub mod value;

pub use animation::{Easing, SpringConfig, SpringParam, TweenProfile};
pub use codec::{ChannelCodec, ChannelLerp, Channels, Interpolate, StandardCodec};
pub use error::GraphError;
pub use graph::{
    BindingId, Computation, ConnectionId, Graph, GraphBuilder, Node, NodeId, UpdateMode,
    WeakGraph, WriteOpts,
};
pub use value::{Value, ValueKind};
