#![forbid(unsafe_code)]

//! Per-type property schemas.
//!
//! A [`TypeSchema`] is explicit, registration-time data: a map from property
//! name to a [`PropertySchema`] descriptor. A property listed here is
//! *checked* — writes are kind-validated, optionally coerced, and emit a
//! change notification. Properties absent from the schema are stored
//! silently, with no validation and no events.
//!
//! A schema may be marked as a *component*: a type that can host declared
//! bindings and serve as a binding root. Binding descriptors are declared on
//! the schema while it is being built; [`TypeSchema::seal`] completes the
//! declaration and runs the checks that have no caller left to fail into —
//! bindings declared on a non-component type are logged and poisoned, and
//! every later use of the affected property repeats the same diagnostic
//! synchronously.
//!
//! # Invariants
//!
//! 1. A sealed schema is immutable; objects share it by `Rc`.
//! 2. `coerce` runs on every checked write, after the kind check and before
//!    storage, so subscribers always observe the stored (coerced) value.

use std::rc::Rc;

use ahash::AHashMap;

use crate::binding::BindingDescriptor;
use crate::value::{Value, ValueKind};

/// Write-time normalization hook for a checked property.
pub type CoerceFn = Rc<dyn Fn(&Value) -> Value>;

/// Descriptor for one checked property.
#[derive(Clone)]
pub struct PropertySchema {
    kind: ValueKind,
    coerce: Option<CoerceFn>,
}

impl PropertySchema {
    /// The kind of value this property accepts.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Apply the property's coercion hook, if any.
    #[must_use]
    pub fn coerce(&self, value: &Value) -> Value {
        match &self.coerce {
            Some(f) => f(value),
            None => value.clone(),
        }
    }
}

impl core::fmt::Debug for PropertySchema {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertySchema")
            .field("kind", &self.kind)
            .field("coerce", &self.coerce.is_some())
            .finish()
    }
}

/// Schema for one object type: its checked properties and declared bindings.
///
/// Built with consuming builder methods and finished with [`seal`], which
/// returns the shared handle objects are created from:
///
/// ```
/// use tether::{TypeSchema, ValueKind};
///
/// let schema = TypeSchema::new("Slider")
///     .component()
///     .checked("value", ValueKind::Number)
///     .seal();
/// assert!(schema.is_component());
/// ```
///
/// [`seal`]: TypeSchema::seal
pub struct TypeSchema {
    name: String,
    component: bool,
    properties: AHashMap<String, PropertySchema>,
    bindings: Vec<Rc<BindingDescriptor>>,
    poisoned: AHashMap<String, String>,
}

impl TypeSchema {
    /// Start declaring a type.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component: false,
            properties: AHashMap::new(),
            bindings: Vec::new(),
            poisoned: AHashMap::new(),
        }
    }

    /// Mark the type as a component: a binding-capable host and a qualifying
    /// binding root.
    #[must_use]
    pub fn component(mut self) -> Self {
        self.component = true;
        self
    }

    /// Declare a checked property of the given kind.
    #[must_use]
    pub fn checked(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.properties
            .insert(name.into(), PropertySchema { kind, coerce: None });
        self
    }

    /// Declare a checked property with a write-time coercion hook.
    ///
    /// The hook normalizes every written value (clamping, rounding, ...);
    /// subscribers observe the coerced value, and a binding that wrote the
    /// pre-coercion value will detect the difference and sync back.
    #[must_use]
    pub fn checked_with(
        mut self,
        name: impl Into<String>,
        kind: ValueKind,
        coerce: impl Fn(&Value) -> Value + 'static,
    ) -> Self {
        self.properties.insert(
            name.into(),
            PropertySchema {
                kind,
                coerce: Some(Rc::new(coerce)),
            },
        );
        self
    }

    /// Declare a binding on this type. Descriptors live for the lifetime of
    /// the type and are activated per instance.
    #[must_use]
    pub fn binding(mut self, descriptor: BindingDescriptor) -> Self {
        self.bindings.push(Rc::new(descriptor));
        self
    }

    /// Complete the declaration.
    ///
    /// Runs the deferred declaration checks: bindings declared on a
    /// non-component type are logged via `tracing::error!` (no caller
    /// remains on the stack to receive an error), the descriptor is
    /// poisoned, and later writes to the binding's first local segment as
    /// well as activation attempts fail synchronously with the same message.
    #[must_use]
    pub fn seal(mut self) -> Rc<Self> {
        if !self.component && !self.bindings.is_empty() {
            for descriptor in &self.bindings {
                let message = format!(
                    "binding \"{}\" declared on type {}, which is not a component",
                    descriptor.local_path(),
                    self.name
                );
                tracing::error!(
                    binding = %descriptor.local_path(),
                    type_name = %self.name,
                    "{message}"
                );
                descriptor.poison(&message);
                self.poisoned
                    .insert(descriptor.local_path().segments()[0].clone(), message);
            }
        }
        Rc::new(self)
    }

    /// The type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the type is a binding-capable component.
    #[must_use]
    pub fn is_component(&self) -> bool {
        self.component
    }

    /// Descriptor for a checked property, or `None` if the property is
    /// unchecked.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.get(name)
    }

    /// Bindings declared on this type.
    #[must_use]
    pub fn bindings(&self) -> &[Rc<BindingDescriptor>] {
        &self.bindings
    }

    /// Diagnostic attached to a property by a failed declaration check.
    #[must_use]
    pub fn poison_message(&self, property: &str) -> Option<&str> {
        self.poisoned.get(property).map(String::as_str)
    }
}

impl core::fmt::Debug for TypeSchema {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypeSchema")
            .field("name", &self.name)
            .field("component", &self.component)
            .field("properties", &self.properties.len())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_properties_are_listed() {
        let schema = TypeSchema::new("Slider")
            .checked("value", ValueKind::Number)
            .checked("label", ValueKind::String)
            .seal();
        assert_eq!(schema.property("value").unwrap().kind(), ValueKind::Number);
        assert!(schema.property("missing").is_none());
    }

    #[test]
    fn coercion_hook_runs_on_demand() {
        let schema = TypeSchema::new("Slider")
            .checked_with("value", ValueKind::Number, |v| {
                Value::Number(v.as_number().unwrap_or(0.0).clamp(0.0, 10.0))
            })
            .seal();
        let desc = schema.property("value").unwrap();
        assert!(desc.coerce(&Value::from(99)).same(&Value::from(10)));
        assert!(desc.coerce(&Value::from(3)).same(&Value::from(3)));
    }

    #[test]
    fn plain_property_coerces_to_itself() {
        let schema = TypeSchema::new("T").checked("x", ValueKind::Any).seal();
        let v = Value::from("untouched");
        assert!(schema.property("x").unwrap().coerce(&v).same(&v));
    }

    #[test]
    fn sealing_without_bindings_poisons_nothing() {
        let schema = TypeSchema::new("Plain")
            .checked("x", ValueKind::Number)
            .seal();
        assert!(schema.poison_message("x").is_none());
    }
}
