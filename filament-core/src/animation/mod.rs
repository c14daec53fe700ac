//! Animation Drivers
//!
//! Springs and tweens are drivers attached to graph nodes. A driver
//! intercepts writes to its node and turns them into motion over time;
//! each tick produces samples that publish through the same scheduler
//! pipeline as ordinary writes, so dependents, bindings and connections
//! observe animated values exactly like direct ones.

pub mod easing;
pub mod spring;
pub mod tween;

pub use easing::Easing;
pub use spring::{SpringConfig, SpringParam};
pub use tween::TweenProfile;

pub(crate) use spring::{SpringState, SpringStep};
pub(crate) use tween::{TweenState, TweenStep};
