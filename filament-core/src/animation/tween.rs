//! Tween Engine
//!
//! Time-based eased interpolation between a start and a goal value. A
//! tween activates when a write is redirected into it: the node's current
//! value becomes the start, the written value the goal, and the node then
//! publishes interpolated samples each tick until the run finishes.
//!
//! # Timeline
//!
//! Progress `alpha` is elapsed time over duration. A profile that
//! reverses plays over the span `[0, 2)`: alpha in `[1, 2)` is mirrored
//! back onto `[0, 1]`, producing ping-pong motion that returns to the
//! start. Each repeat restarts the timeline from `-delay`, so the delay
//! applies again on every repeat. A finished run publishes exactly the
//! start (if reversing) or the goal, never a rounded interpolation of it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::animation::easing::Easing;
use crate::value::Value;

/// Timing and shape of a tween run. Serde-derivable so hosts can load
/// profiles from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TweenProfile {
    /// Length of one playback span. Zero completes instantly.
    pub duration: Duration,
    /// Wait before playback, re-applied on every repeat.
    #[serde(default)]
    pub delay: Duration,
    #[serde(default)]
    pub easing: Easing,
    /// Play back to the start after reaching the goal.
    #[serde(default)]
    pub reverses: bool,
    /// Number of extra runs after the first.
    #[serde(default)]
    pub repeat_count: u32,
}

impl TweenProfile {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            delay: Duration::ZERO,
            easing: Easing::default(),
            reverses: false,
            repeat_count: 0,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn reverses(mut self, reverses: bool) -> Self {
        self.reverses = reverses;
        self
    }

    pub fn repeat(mut self, count: u32) -> Self {
        self.repeat_count = count;
        self
    }
}

/// Outcome of advancing a tween by one tick.
pub(crate) enum TweenStep {
    /// No run in progress.
    Idle,
    /// Inside the delay window; nothing to publish.
    Waiting,
    /// Publish the interpolation of (start, goal) at this eased parameter.
    Moving(f64),
    /// Run complete; publish exactly this value and deactivate.
    Finished(Value),
}

/// Per-node tween driver state.
pub(crate) struct TweenState {
    pub(crate) profile: TweenProfile,
    pub(crate) start: Value,
    pub(crate) goal: Value,
    /// Time since playback began; negative while inside the delay.
    pub(crate) elapsed: f64,
    pub(crate) repeats_left: u32,
    pub(crate) active: bool,
}

impl TweenState {
    /// State for a freshly attached tween, idle on the node's value.
    pub(crate) fn new(profile: TweenProfile, current: Value) -> Self {
        Self {
            profile,
            start: current.clone(),
            goal: current,
            elapsed: 0.0,
            repeats_left: 0,
            active: false,
        }
    }

    /// Begin a run from `start` toward `goal`.
    pub(crate) fn begin(&mut self, start: Value, goal: Value) {
        self.start = start;
        self.goal = goal;
        self.elapsed = -self.profile.delay.as_secs_f64();
        self.repeats_left = self.profile.repeat_count;
        self.active = true;
    }

    /// Cancel any run and settle on `value` (a write that bypasses
    /// animation).
    pub(crate) fn snap_to(&mut self, value: Value) {
        self.start = value.clone();
        self.goal = value;
        self.active = false;
    }

    /// Advance by `dt` seconds and report what to publish.
    pub(crate) fn advance(&mut self, dt: f64) -> TweenStep {
        if !self.active {
            return TweenStep::Idle;
        }
        self.elapsed += dt;
        if self.elapsed < 0.0 {
            return TweenStep::Waiting;
        }

        let span = if self.profile.reverses { 2.0 } else { 1.0 };
        let duration = self.profile.duration.as_secs_f64();
        let alpha = if duration <= 0.0 {
            span
        } else {
            self.elapsed / duration
        };

        if alpha < span {
            let mirrored = if alpha >= 1.0 { 1.0 - (alpha - 1.0) } else { alpha };
            TweenStep::Moving(self.profile.easing.apply(mirrored))
        } else if self.repeats_left > 0 {
            self.repeats_left -= 1;
            self.elapsed = -self.profile.delay.as_secs_f64();
            TweenStep::Waiting
        } else {
            self.active = false;
            let settled = if self.profile.reverses {
                self.start.clone()
            } else {
                self.goal.clone()
            };
            TweenStep::Finished(settled)
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn eased(step: TweenStep) -> f64 {
        match step {
            TweenStep::Moving(t) => t,
            TweenStep::Idle => panic!("tween idle"),
            TweenStep::Waiting => panic!("tween waiting"),
            TweenStep::Finished(_) => panic!("tween finished"),
        }
    }

    #[test]
    fn inactive_tween_is_idle() {
        let mut state = TweenState::new(
            TweenProfile::new(Duration::from_secs(1)),
            Value::Float(0.0),
        );
        assert!(matches!(state.advance(0.5), TweenStep::Idle));
    }

    #[test]
    fn plain_run_finishes_on_goal() {
        let mut state = TweenState::new(
            TweenProfile::new(Duration::from_secs(1)),
            Value::Float(0.0),
        );
        state.begin(Value::Float(0.0), Value::Float(10.0));

        assert_eq!(eased(state.advance(0.25)), 0.25);
        assert_eq!(eased(state.advance(0.25)), 0.5);
        assert_eq!(eased(state.advance(0.25)), 0.75);
        match state.advance(0.5) {
            TweenStep::Finished(value) => assert_eq!(value, Value::Float(10.0)),
            _ => panic!("expected finish"),
        }
        assert!(!state.active);
        assert!(matches!(state.advance(0.1), TweenStep::Idle));
    }

    #[test]
    fn reversing_run_mirrors_and_finishes_on_start() {
        let mut state = TweenState::new(
            TweenProfile::new(Duration::from_secs(1)).reverses(true),
            Value::Float(0.0),
        );
        state.begin(Value::Float(0.0), Value::Float(10.0));

        assert_eq!(eased(state.advance(0.5)), 0.5);
        // alpha = 1.0 is the peak: exactly the goal.
        assert_eq!(eased(state.advance(0.5)), 1.0);
        // alpha = 1.5 mirrors back to 0.5.
        assert_eq!(eased(state.advance(0.5)), 0.5);
        match state.advance(0.5) {
            TweenStep::Finished(value) => assert_eq!(value, Value::Float(0.0)),
            _ => panic!("expected finish on start"),
        }
    }

    #[test]
    fn repeat_restarts_the_timeline_with_delay() {
        let profile = TweenProfile::new(Duration::from_secs(1))
            .delay(Duration::from_millis(500))
            .repeat(1);
        let mut state = TweenState::new(profile, Value::Float(0.0));
        state.begin(Value::Float(0.0), Value::Float(1.0));

        // First delay window.
        assert!(matches!(state.advance(0.25), TweenStep::Waiting));
        assert_eq!(eased(state.advance(0.25)), 0.0);
        assert_eq!(eased(state.advance(0.9)), 0.9);

        // Span exceeded with a repeat left: restart, delay re-applies.
        assert!(matches!(state.advance(0.2), TweenStep::Waiting));
        assert_eq!(state.repeats_left, 0);
        assert!(matches!(state.advance(0.25), TweenStep::Waiting));
        assert_eq!(eased(state.advance(0.25)), 0.0);

        // Second run out of repeats: finish on the goal.
        match state.advance(1.5) {
            TweenStep::Finished(value) => assert_eq!(value, Value::Float(1.0)),
            _ => panic!("expected finish"),
        }
    }

    #[test]
    fn zero_duration_completes_instantly() {
        let mut state = TweenState::new(
            TweenProfile::new(Duration::ZERO),
            Value::Float(0.0),
        );
        state.begin(Value::Float(0.0), Value::Float(4.0));
        match state.advance(1.0 / 60.0) {
            TweenStep::Finished(value) => assert_eq!(value, Value::Float(4.0)),
            _ => panic!("zero duration should finish on the first tick"),
        }
    }

    #[test]
    fn snap_cancels_an_active_run() {
        let mut state = TweenState::new(
            TweenProfile::new(Duration::from_secs(1)),
            Value::Float(0.0),
        );
        state.begin(Value::Float(0.0), Value::Float(10.0));
        state.advance(0.25);

        state.snap_to(Value::Float(7.0));
        assert!(!state.active);
        assert!(matches!(state.advance(0.25), TweenStep::Idle));
        assert_eq!(state.goal, Value::Float(7.0));
    }

    #[test]
    fn profiles_deserialize_with_defaults() {
        let profile: TweenProfile =
            serde_json::from_str(r#"{"duration":{"secs":1,"nanos":0}}"#).unwrap();
        assert_eq!(profile.duration, Duration::from_secs(1));
        assert_eq!(profile.delay, Duration::ZERO);
        assert_eq!(profile.easing, Easing::Linear);
        assert!(!profile.reverses);
        assert_eq!(profile.repeat_count, 0);

        let profile: TweenProfile = serde_json::from_str(
            r#"{
                "duration": {"secs": 0, "nanos": 400000000},
                "delay": {"secs": 0, "nanos": 100000000},
                "easing": "ease_out_back",
                "reverses": true,
                "repeat_count": 2
            }"#,
        )
        .unwrap();
        assert_eq!(profile.duration, Duration::from_millis(400));
        assert_eq!(profile.delay, Duration::from_millis(100));
        assert_eq!(profile.easing, Easing::EaseOutBack);
        assert!(profile.reverses);
        assert_eq!(profile.repeat_count, 2);
    }
}
