//! Value Model
//!
//! Nodes hold dynamically typed [`Value`]s. The variant set covers the
//! scalar and small-vector types the animation layer can decompose into
//! numeric channels, plus two composite kinds for everything else:
//!
//! - `List` holds nested values.
//! - `Opaque` holds an arbitrary host object behind `Arc<dyn Any>`.
//!
//! # Equality and change detection
//!
//! The write path only propagates a value that actually changed. That check
//! relies on cheap structural equality, which cannot be assumed for
//! composite values: `List` may be arbitrarily large and `Opaque` may have
//! interior mutability invisible to us. [`Value::is_composite`] marks the
//! kinds that must always propagate regardless of comparison.
//!
//! Two float details are deliberate: `NaN != NaN`, so a NaN write always
//! counts as a change, and `Opaque` compares by pointer identity only.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A dynamically typed value stored in a graph node.
#[derive(Clone)]
pub enum Value {
    /// The absence of a value.
    Nil,
    /// A boolean.
    Bool(bool),
    /// A scalar number. One numeric channel.
    Float(f64),
    /// A string.
    Text(String),
    /// A two-component vector. Channels in `[x, y]` order.
    Vec2([f64; 2]),
    /// A three-component vector. Channels in `[x, y, z]` order.
    Vec3([f64; 3]),
    /// An RGBA color. Channels in `[r, g, b, a]` order.
    Color([f64; 4]),
    /// A list of nested values. Composite: always propagates on write.
    List(Vec<Value>),
    /// An opaque host object. Composite: always propagates on write.
    Opaque(Arc<dyn Any + Send + Sync>),
}

/// The variant of a [`Value`], used to key codec decomposition and to
/// detect runtime type changes on animated nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    Bool,
    Float,
    Text,
    Vec2,
    Vec3,
    Color,
    List,
    Opaque,
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(_) => ValueKind::Bool,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Vec2(_) => ValueKind::Vec2,
            Value::Vec3(_) => ValueKind::Vec3,
            Value::Color(_) => ValueKind::Color,
            Value::List(_) => ValueKind::List,
            Value::Opaque(_) => ValueKind::Opaque,
        }
    }

    /// Whether this value is a composite/reference kind, for which cheap
    /// equality cannot be assumed and writes must always propagate.
    pub fn is_composite(&self) -> bool {
        matches!(self, Value::List(_) | Value::Opaque(_))
    }

    /// Wrap an arbitrary host object.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(Arc::new(value))
    }

    /// Build a [`Value::Color`] from RGBA components.
    pub fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Value::Color([r, g, b, a])
    }

    /// The scalar payload, if this is a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// The boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The string payload, if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Downcast an `Opaque` payload to a concrete type.
    pub fn downcast_opaque<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Value::Opaque(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Vec2(a), Value::Vec2(b)) => a == b,
            (Value::Vec3(a), Value::Vec3(b)) => a == b,
            (Value::Color(a), Value::Color(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Identity only: structural comparison of host objects is not
            // our business.
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Value::Text(v) => f.debug_tuple("Text").field(v).finish(),
            Value::Vec2(v) => f.debug_tuple("Vec2").field(v).finish(),
            Value::Vec3(v) => f.debug_tuple("Vec3").field(v).finish(),
            Value::Color(v) => f.debug_tuple("Color").field(v).finish(),
            Value::List(v) => f.debug_tuple("List").field(v).finish(),
            Value::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<[f64; 2]> for Value {
    fn from(v: [f64; 2]) -> Self {
        Value::Vec2(v)
    }
}

impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Value::Vec3(v)
    }
}

impl From<[f64; 4]> for Value {
    fn from(v: [f64; 4]) -> Self {
        Value::Color(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}
