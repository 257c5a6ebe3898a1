#![forbid(unsafe_code)]

//! Error taxonomy for subscriptions, conversion, and propagation.
//!
//! Construction problems (bad paths, bad selectors, unchecked properties in
//! strict mode, claim conflicts) surface synchronously and are fatal to that
//! one binding only. Runtime propagation and conversion failures are wrapped
//! with the binding's two endpoints into a single diagnostic string and
//! re-thrown to whoever triggered the originating mutation; there is no
//! structured cause chaining.

use core::fmt;

/// Errors raised by path subscriptions and bindings.
#[derive(Debug, Clone)]
pub enum BindError {
    /// A dotted path was empty or contained an empty segment, or a binding's
    /// local path had the wrong number of segments.
    InvalidPath(String),
    /// A one-way template did not contain exactly one `${path}` placeholder.
    InvalidTemplate {
        /// The offending template text.
        template: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A selector string could not be parsed.
    InvalidSelector(String),
    /// A selector matched no object.
    SelectorNotFound(String),
    /// A selector matched more than one object.
    SelectorAmbiguous {
        /// The offending selector.
        selector: String,
        /// How many objects matched.
        matches: usize,
    },
    /// A bound property does not participate in change notification
    /// (strict activation only; non-strict logs a warning instead).
    NotChecked {
        /// Type owning the property.
        type_name: String,
        /// The unchecked property.
        property: String,
    },
    /// The property is already the receiving end of an active binding.
    ReceiverConflict {
        /// Label of the object owning the property.
        target: String,
        /// The contested property or path.
        property: String,
    },
    /// A binding was declared on a type that cannot host bindings. The
    /// message is produced (and logged) when the declaration completes and
    /// repeated verbatim on every later access.
    IncompatibleHost(String),
    /// An intermediate path segment resolved to a non-object primitive.
    ExpectedObject {
        /// The intermediate property.
        property: String,
        /// Kind name of the value actually found.
        actual: &'static str,
    },
    /// A checked write carried a value of the wrong kind.
    TypeMismatch {
        /// Type owning the property.
        type_name: String,
        /// The written property.
        property: String,
        /// Kind declared by the schema.
        expected: &'static str,
        /// Kind of the rejected value.
        actual: &'static str,
    },
    /// A converter misused the conversion protocol or failed outright.
    Conversion(String),
    /// A propagation step failed; names both endpoints and the root cause.
    Propagation {
        /// Local endpoint label (`Type.path`).
        local: String,
        /// Remote endpoint label (`selector.property`).
        remote: String,
        /// The step that failed.
        action: &'static str,
        /// Root cause message.
        cause: String,
    },
    /// A compiled one-way binding was used before its tree ever attached to
    /// a binding root.
    NotAttached {
        /// Dotted path of the dangling binding.
        binding: String,
        /// Label of the target object.
        target: String,
    },
    /// One-way activation was attempted against a root whose type is not a
    /// binding root.
    NotABindingRoot(String),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPath(msg) => write!(f, "invalid binding path: {msg}"),
            Self::InvalidTemplate { template, reason } => {
                write!(f, "invalid template \"{template}\": {reason}")
            }
            Self::InvalidSelector(sel) => write!(f, "invalid selector \"{sel}\""),
            Self::SelectorNotFound(sel) => write!(f, "selector \"{sel}\" matched no object"),
            Self::SelectorAmbiguous { selector, matches } => {
                write!(f, "selector \"{selector}\" is ambiguous ({matches} matches)")
            }
            Self::NotChecked {
                type_name,
                property,
            } => write!(
                f,
                "property \"{property}\" of type {type_name} does not emit change notifications"
            ),
            Self::ReceiverConflict { target, property } => write!(
                f,
                "property \"{property}\" of {target} is already the receiving end of a binding"
            ),
            Self::IncompatibleHost(msg) => f.write_str(msg),
            Self::ExpectedObject { property, actual } => write!(
                f,
                "value of property \"{property}\" is of type {actual}, expected object"
            ),
            Self::TypeMismatch {
                type_name,
                property,
                expected,
                actual,
            } => write!(
                f,
                "cannot set property \"{property}\" of type {type_name}: expected {expected}, got {actual}"
            ),
            Self::Conversion(msg) => write!(f, "conversion failed: {msg}"),
            Self::Propagation {
                local,
                remote,
                action,
                cause,
            } => write!(f, "Binding \"{local}\" <-> \"{remote}\" failed to {action}: {cause}"),
            Self::NotAttached { binding, target } => write!(
                f,
                "one-way binding \"{binding}\" on {target} is not attached to a binding root"
            ),
            Self::NotABindingRoot(type_name) => {
                write!(f, "type {type_name} is not a binding root")
            }
        }
    }
}

impl std::error::Error for BindError {}
