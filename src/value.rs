#![forbid(unsafe_code)]

//! Dynamic property values.
//!
//! Everything a bound property can hold is a [`Value`]: the unset marker
//! [`Value::Null`], a primitive, or a handle to another [`Object`] (which is
//! what makes multi-segment paths traversable). Values are cheap to clone —
//! objects clone by handle, not by contents.
//!
//! # Invariants
//!
//! 1. [`Value::same`] is the identity comparison used for change detection:
//!    numbers compare by value with `NaN` equal to `NaN`, objects compare by
//!    handle identity, everything else by `==`.
//! 2. `Null` is the single "no value" marker; reading a property that was
//!    never written yields `Null`.

use core::fmt;

use crate::object::Object;

/// The kind of value a checked property accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// Boolean.
    Bool,
    /// `f64` number.
    Number,
    /// Owned string.
    String,
    /// Object handle (required for intermediate path segments).
    Object,
    /// Any value; disables the write-time kind check.
    Any,
}

impl ValueKind {
    /// Human-readable kind name used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamic property value.
#[derive(Clone, Debug)]
pub enum Value {
    /// No value. Reading an unset property yields `Null`; writing it through
    /// a binding restores the binding's fallback on the far side.
    Null,
    /// Boolean.
    Bool(bool),
    /// `f64` number.
    Number(f64),
    /// Owned string.
    Str(String),
    /// Handle to another object.
    Object(Object),
}

impl Value {
    /// Whether this is the unset marker.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The kind of a non-null value.
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Number(_) => Some(ValueKind::Number),
            Self::Str(_) => Some(ValueKind::String),
            Self::Object(_) => Some(ValueKind::Object),
        }
    }

    /// Kind name for diagnostics (`"null"` for the unset marker).
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        self.kind().map_or("null", ValueKind::name)
    }

    /// Identity comparison used for change detection.
    ///
    /// Numbers compare by value and treat `NaN` as equal to `NaN`; objects
    /// compare by handle identity; other kinds compare by `==`. Values of
    /// different kinds are never the same.
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Borrow the object handle, if this is an object value.
    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Borrow the string contents, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The numeric contents, if this is a number value.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Display form used by template interpolation: `Null` renders empty,
/// integral numbers render without a fractional part, objects render as
/// their label.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Self::Str(s) => f.write_str(s),
            Self::Object(o) => f.write_str(&o.label()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Self::Object(v)
    }
}
