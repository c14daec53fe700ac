//! Tick Driver
//!
//! Adapts a tokio interval to [`Graph::step`](crate::Graph::step). The
//! loop holds only a [`WeakGraph`], so it winds down on its own once the
//! last strong graph handle is dropped; there is no explicit shutdown
//! signal to plumb.
//!
//! Hosts with their own frame clock can skip this module entirely and
//! call `Graph::step` themselves.

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::graph::WeakGraph;

/// Drive `graph` with one [`Graph::step`](crate::Graph::step) per
/// `period` until the graph is dropped.
///
/// The delta passed to each step is the measured time between ticks, not
/// the nominal period, so springs and tweens stay on wall-clock time
/// when the runtime falls behind.
pub async fn run(graph: WeakGraph, period: Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; it establishes the baseline.
    let mut last = interval.tick().await;
    loop {
        let now = interval.tick().await;
        let delta = now.duration_since(last);
        last = now;
        let Some(graph) = graph.upgrade() else {
            debug!("graph dropped; stopping the tick driver");
            break;
        };
        graph.step(delta);
    }
}
