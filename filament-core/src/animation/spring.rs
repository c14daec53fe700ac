//! Spring Engine
//!
//! Closed-form damped-harmonic-oscillator motion. Instead of integrating
//! step by step, the engine keeps an origin state (start position and
//! velocity per channel, captured when the spring last retargeted) and
//! evaluates the exact solution at the accumulated elapsed time. This
//! makes motion independent of tick rate and free of integration drift.
//!
//! # How Stepping Works
//!
//! For elapsed time `t`, damping ratio `zeta` and angular speed `omega`,
//! the solution is a 2x2 linear map from (start displacement, start
//! velocity) to (displacement, velocity). [`coefficients`] computes that
//! map per regime:
//!
//! - overdamped (`zeta > 1`): two real decaying exponentials
//! - critically damped (`zeta = 1`): the repeated-root solution
//! - underdamped (`zeta < 1`): decaying sinusoid
//!
//! Displacement is measured from the target, so the published position is
//! `target + displacement` per channel.
//!
//! # Retargeting
//!
//! Moving the goal mid-flight preserves continuity: the current
//! interpolated position and velocity become the new origin and elapsed
//! time restarts at zero. Only a runtime kind change (or channel-count
//! change) is discontinuous, snapping the spring onto the new target at
//! rest.

use smallvec::smallvec;
use tracing::warn;

use crate::codec::Channels;
use crate::graph::Node;
use crate::value::{Value, ValueKind};

/// Rest threshold on per-channel displacement and velocity.
pub(crate) const REST_EPSILON: f64 = 1e-4;

/// A spring input: either a fixed value or a node sampled raw every tick.
#[derive(Clone)]
pub enum SpringParam {
    Value(Value),
    Node(Node),
}

impl SpringParam {
    /// Sample the parameter without dependency tracking. `None` if the
    /// backing node is gone; the caller keeps its last sample in force.
    pub(crate) fn sample(&self) -> Option<Value> {
        match self {
            SpringParam::Value(value) => Some(value.clone()),
            SpringParam::Node(node) => node.get_untracked().ok(),
        }
    }
}

impl From<Value> for SpringParam {
    fn from(value: Value) -> Self {
        SpringParam::Value(value)
    }
}

impl From<f64> for SpringParam {
    fn from(value: f64) -> Self {
        SpringParam::Value(Value::Float(value))
    }
}

impl From<Node> for SpringParam {
    fn from(node: Node) -> Self {
        SpringParam::Node(node)
    }
}

impl From<&Node> for SpringParam {
    fn from(node: &Node) -> Self {
        SpringParam::Node(node.clone())
    }
}

/// Configuration for [`Node::attach_spring`](crate::Node::attach_spring).
///
/// Goal is required; `speed` defaults to 10.0 and `damping` to 1.0
/// (critically damped). Each may be a fixed value or a node.
#[derive(Clone)]
pub struct SpringConfig {
    pub(crate) goal: SpringParam,
    pub(crate) speed: SpringParam,
    pub(crate) damping: SpringParam,
}

impl SpringConfig {
    pub fn new(goal: impl Into<SpringParam>) -> Self {
        Self {
            goal: goal.into(),
            speed: SpringParam::Value(Value::Float(10.0)),
            damping: SpringParam::Value(Value::Float(1.0)),
        }
    }

    /// Angular speed in radians per second.
    pub fn speed(mut self, speed: impl Into<SpringParam>) -> Self {
        self.speed = speed.into();
        self
    }

    /// Damping ratio: below 1.0 oscillates, 1.0 settles fastest, above
    /// 1.0 approaches without overshoot.
    pub fn damping(mut self, damping: impl Into<SpringParam>) -> Self {
        self.damping = damping.into();
        self
    }
}

/// The 2x2 solution map at a given elapsed time.
#[derive(Debug, Clone, Copy)]
struct Coefficients {
    pos_pos: f64,
    pos_vel: f64,
    vel_pos: f64,
    vel_vel: f64,
}

const IDENTITY: Coefficients = Coefficients {
    pos_pos: 1.0,
    pos_vel: 0.0,
    vel_pos: 0.0,
    vel_vel: 1.0,
};

/// Closed-form oscillator coefficients at elapsed time `t`.
fn coefficients(t: f64, damping: f64, speed: f64) -> Coefficients {
    if t == 0.0 || speed == 0.0 {
        return IDENTITY;
    }

    if damping > 1.0 {
        // Overdamped: two real roots z1 < z2 < 0.
        let alpha = (damping * damping - 1.0).sqrt();
        let z1 = -speed * (alpha + damping);
        let z2 = speed * (alpha - damping);
        let e1 = (t * z1).exp();
        let e2 = (t * z2).exp();
        let inv = 1.0 / (z1 - z2);
        Coefficients {
            pos_pos: (z1 * e2 - z2 * e1) * inv,
            pos_vel: (e1 - e2) * inv,
            vel_pos: speed * speed * (e2 - e1) * inv,
            vel_vel: (z1 * e1 - z2 * e2) * inv,
        }
    } else if damping == 1.0 {
        // Critically damped: repeated root at -speed.
        let decay = (-speed * t).exp();
        Coefficients {
            pos_pos: decay * (1.0 + speed * t),
            pos_vel: decay * t,
            vel_pos: -speed * speed * t * decay,
            vel_vel: decay * (1.0 - speed * t),
        }
    } else {
        // Underdamped: decaying sinusoid at frequency alpha.
        let alpha = speed * (1.0 - damping * damping).sqrt();
        let beta = speed * damping;
        let decay = (-beta * t).exp();
        let sin = (alpha * t).sin();
        let cos = (alpha * t).cos();
        let pos_vel = decay * sin / alpha;
        Coefficients {
            pos_pos: decay * (cos + (beta / alpha) * sin),
            pos_vel,
            vel_pos: -speed * speed * pos_vel,
            vel_vel: decay * (cos - (beta / alpha) * sin),
        }
    }
}

/// Outcome of advancing a spring by one tick.
pub(crate) enum SpringStep {
    /// At rest; nothing to publish.
    Idle,
    /// In motion; publish these position channels.
    Moving(Channels),
    /// Just reached rest; publish these channels (the exact target) and
    /// stop ticking.
    Rested(Channels),
}

/// Per-node spring driver state.
pub(crate) struct SpringState {
    pub(crate) goal: SpringParam,
    pub(crate) speed: SpringParam,
    pub(crate) damping: SpringParam,

    /// Runtime kind of the target; a kind change is a discontinuity.
    pub(crate) kind: ValueKind,
    /// Goal decomposed into channels.
    pub(crate) target: Channels,
    /// Absolute position at the current origin.
    pub(crate) start_pos: Channels,
    /// Velocity at the current origin.
    pub(crate) start_vel: Channels,
    /// Time since the origin. `None` while at rest.
    pub(crate) elapsed: Option<f64>,

    /// Last goal sample, for change detection. A directly written target
    /// stays in force until the sampled goal differs from this.
    pub(crate) last_goal: Value,
    /// Last valid tuning samples; bad samples keep these in force.
    pub(crate) speed_value: f64,
    pub(crate) damping_value: f64,
}

impl SpringState {
    /// State for a freshly attached spring, at rest on its initial goal.
    pub(crate) fn new(
        goal: SpringParam,
        speed: SpringParam,
        damping: SpringParam,
        initial_goal: Value,
        target: Channels,
        speed_value: f64,
        damping_value: f64,
    ) -> Self {
        let len = target.len();
        Self {
            goal,
            speed,
            damping,
            kind: initial_goal.kind(),
            start_pos: target.clone(),
            start_vel: smallvec![0.0; len],
            target,
            elapsed: None,
            last_goal: initial_goal,
            speed_value,
            damping_value,
        }
    }

    /// Evaluate absolute position and velocity at elapsed time `t`.
    ///
    /// Non-finite channels are a recoverable fault: the channel resets to
    /// the target at zero velocity instead of leaking NaN/Inf.
    pub(crate) fn eval(&self, t: f64) -> (Channels, Channels) {
        let c = coefficients(t, self.damping_value, self.speed_value);
        let mut pos: Channels = smallvec![0.0; self.target.len()];
        let mut vel: Channels = smallvec![0.0; self.target.len()];
        for i in 0..self.target.len() {
            let d0 = self.start_pos[i] - self.target[i];
            let v0 = self.start_vel[i];
            let disp = d0 * c.pos_pos + v0 * c.pos_vel;
            let v = d0 * c.vel_pos + v0 * c.vel_vel;
            if disp.is_finite() && v.is_finite() {
                pos[i] = self.target[i] + disp;
                vel[i] = v;
            } else {
                warn!(channel = i, "non-finite spring channel, resetting to target");
                pos[i] = self.target[i];
                vel[i] = 0.0;
            }
        }
        (pos, vel)
    }

    /// Current interpolated position and velocity.
    pub(crate) fn current(&self) -> (Channels, Channels) {
        match self.elapsed {
            Some(t) => self.eval(t),
            None => (self.target.clone(), smallvec![0.0; self.target.len()]),
        }
    }

    /// Move the goal. Returns `true` if the move was discontinuous (kind
    /// or channel count changed), in which case the caller publishes the
    /// new target immediately.
    pub(crate) fn retarget(&mut self, goal: &Value, channels: Channels) -> bool {
        if goal.kind() != self.kind || channels.len() != self.target.len() {
            self.kind = goal.kind();
            self.start_pos = channels.clone();
            self.start_vel = smallvec![0.0; channels.len()];
            self.target = channels;
            self.elapsed = None;
            true
        } else {
            let (pos, vel) = self.current();
            self.start_pos = pos;
            self.start_vel = vel;
            self.target = channels;
            self.elapsed = Some(0.0);
            false
        }
    }

    /// Snap onto `channels` at rest (a write that bypasses animation).
    pub(crate) fn snap_to(&mut self, kind: ValueKind, channels: Channels) {
        self.kind = kind;
        self.start_pos = channels.clone();
        self.start_vel = smallvec![0.0; channels.len()];
        self.target = channels;
        self.elapsed = None;
    }

    /// Rebase at the current position with the given velocity and re-arm.
    pub(crate) fn set_velocity(&mut self, velocity: Channels) {
        let (pos, _) = self.current();
        self.start_pos = pos;
        self.start_vel = velocity;
        self.elapsed = Some(0.0);
    }

    /// Rebase at the current position, summing the given velocity onto the
    /// current one, and re-arm.
    pub(crate) fn add_velocity(&mut self, velocity: Channels) {
        let (pos, mut vel) = self.current();
        for (v, add) in vel.iter_mut().zip(velocity.iter()) {
            *v += add;
        }
        self.start_pos = pos;
        self.start_vel = vel;
        self.elapsed = Some(0.0);
    }

    /// Current interpolated velocity channels.
    pub(crate) fn velocity(&self) -> Channels {
        self.current().1
    }

    /// Advance by `dt` seconds and report what to publish.
    pub(crate) fn advance(&mut self, dt: f64) -> SpringStep {
        let Some(origin) = self.elapsed else {
            return SpringStep::Idle;
        };
        let t = origin + dt;
        self.elapsed = Some(t);

        let (pos, vel) = self.eval(t);
        let rested = pos
            .iter()
            .zip(self.target.iter())
            .all(|(p, target)| (p - target).abs() < REST_EPSILON)
            && vel.iter().all(|v| v.abs() < REST_EPSILON);

        if rested {
            self.start_pos = self.target.clone();
            self.start_vel = smallvec![0.0; self.target.len()];
            self.elapsed = None;
            SpringStep::Rested(self.target.clone())
        } else {
            SpringStep::Moving(pos)
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
