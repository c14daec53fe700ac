//! Channel Codec and Interpolation
//!
//! The animation engines are written against flat `f64` channel buffers,
//! not against [`Value`] variants. Two seams connect the two worlds:
//!
//! - [`ChannelCodec`] decomposes a value into channels and packs channels
//!   back into a value of the same kind. A value the codec declines to
//!   decompose is simply not animatable.
//! - [`Interpolate`] blends two values at a parameter `t` for the tween
//!   engine. The default blends channel-wise through the codec and falls
//!   back to a step function for everything else.
//!
//! Both have default implementations ([`StandardCodec`], [`ChannelLerp`])
//! and both can be replaced per graph through the builder, so host
//! embeddings can teach the engines about their own value kinds.

use smallvec::SmallVec;

use crate::value::{Value, ValueKind};

/// Flat channel buffer. Inline capacity covers every built-in kind.
pub type Channels = SmallVec<[f64; 4]>;

/// Decomposes values into numeric channels and packs them back.
///
/// Implementations must be symmetric for the kinds they support: if
/// `channels` returns `Some(buf)` for a value of kind `k`, then
/// `pack(k, &buf)` must return `Some` of a value of kind `k` with the
/// same channel count.
pub trait ChannelCodec: Send + Sync {
    /// Decompose a value into channels, or `None` if the value does not
    /// have a numeric channel form.
    fn channels(&self, value: &Value) -> Option<Channels>;

    /// Rebuild a value of `kind` from channels, or `None` if `kind` is
    /// unsupported or `channels` has the wrong length.
    fn pack(&self, kind: ValueKind, channels: &[f64]) -> Option<Value>;
}

/// Blends two values at parameter `t` (typically eased, may overshoot
/// `[0, 1]` for elastic/back curves).
pub trait Interpolate: Send + Sync {
    fn interpolate(&self, a: &Value, b: &Value, t: f64) -> Value;
}

/// Default codec covering `Float`, `Vec2`, `Vec3` and `Color`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCodec;

impl ChannelCodec for StandardCodec {
    fn channels(&self, value: &Value) -> Option<Channels> {
        match value {
            Value::Float(v) => Some(SmallVec::from_slice(&[*v])),
            Value::Vec2(v) => Some(SmallVec::from_slice(v)),
            Value::Vec3(v) => Some(SmallVec::from_slice(v)),
            Value::Color(v) => Some(SmallVec::from_slice(v)),
            _ => None,
        }
    }

    fn pack(&self, kind: ValueKind, channels: &[f64]) -> Option<Value> {
        match (kind, channels) {
            (ValueKind::Float, [x]) => Some(Value::Float(*x)),
            (ValueKind::Vec2, [x, y]) => Some(Value::Vec2([*x, *y])),
            (ValueKind::Vec3, [x, y, z]) => Some(Value::Vec3([*x, *y, *z])),
            (ValueKind::Color, [r, g, b, a]) => Some(Value::Color([*r, *g, *b, *a])),
            _ => None,
        }
    }
}

/// Default interpolator: channel-wise linear blend through a codec, step
/// fallback (`a` until `t >= 1`, then `b`) for kinds the codec declines
/// or when the two endpoints have different kinds.
pub struct ChannelLerp<C: ChannelCodec> {
    codec: C,
}

impl<C: ChannelCodec> ChannelLerp<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }
}

impl Default for ChannelLerp<StandardCodec> {
    fn default() -> Self {
        Self::new(StandardCodec)
    }
}

impl<C: ChannelCodec> Interpolate for ChannelLerp<C> {
    fn interpolate(&self, a: &Value, b: &Value, t: f64) -> Value {
        if a.kind() == b.kind() {
            if let (Some(ca), Some(cb)) = (self.codec.channels(a), self.codec.channels(b)) {
                if ca.len() == cb.len() {
                    let mixed: Channels = ca
                        .iter()
                        .zip(cb.iter())
                        .map(|(x, y)| x + (y - x) * t)
                        .collect();
                    if let Some(packed) = self.codec.pack(a.kind(), &mixed) {
                        return packed;
                    }
                }
            }
        }
        // Step fallback for non-numeric or mismatched endpoints.
        if t < 1.0 {
            a.clone()
        } else {
            b.clone()
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
