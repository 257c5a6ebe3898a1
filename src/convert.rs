#![forbid(unsafe_code)]

//! Direction-aware value conversion.
//!
//! A single converter function serves both directions of a binding. Each
//! [`convert`] invocation hands it a fresh [`ConversionContext`] naming the
//! concrete destination (type and property), so the converter can branch on
//! where its output is headed without static knowledge of the call site.
//!
//! A converter either returns its result directly (`Ok(Some(value))`),
//! declines (`Ok(None)`, which yields the fallback), or uses the two-step
//! protocol: call [`targets`](ConversionContext::targets) to test the
//! destination and, only after it returned `true`, supply the result with
//! [`resolve`](ConversionContext::resolve).
//!
//! # Invariants (violations are [`BindError::Conversion`])
//!
//! 1. `targets()` must not be called again after it returned `true`.
//! 2. `resolve()` must not be called more than once.
//! 3. A converter that called `resolve()` must not also return a value.
//! 4. If `targets()` returned `true`, `resolve()` must be called before the
//!    converter returns.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::BindError;
use crate::value::Value;

/// Shared converter function of a binding.
pub type ConvertFn =
    Rc<dyn Fn(&Value, &ConversionContext) -> Result<Option<Value>, BindError>>;

/// Per-invocation conversion helper carrying the destination identity and
/// the one-shot `targets`/`resolve` operations.
///
/// Created fresh for every [`convert`] call; never reused.
pub struct ConversionContext {
    target_type: String,
    target_property: String,
    matched: Cell<bool>,
    resolved: RefCell<Option<Value>>,
    did_resolve: Cell<bool>,
}

impl ConversionContext {
    fn new(target_type: &str, target_property: &str) -> Self {
        Self {
            target_type: target_type.to_owned(),
            target_property: target_property.to_owned(),
            matched: Cell::new(false),
            resolved: RefCell::new(None),
            did_resolve: Cell::new(false),
        }
    }

    /// Name of the type owning the destination property.
    #[must_use]
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    /// Name of the destination property.
    #[must_use]
    pub fn target_property(&self) -> &str {
        &self.target_property
    }

    /// Test whether this invocation converts for the given destination type.
    pub fn targets(&self, type_name: &str) -> Result<bool, BindError> {
        self.check(type_name, None)
    }

    /// Test whether this invocation converts for the given destination
    /// type *and* property.
    pub fn targets_property(
        &self,
        type_name: &str,
        property: &str,
    ) -> Result<bool, BindError> {
        self.check(type_name, Some(property))
    }

    fn check(&self, type_name: &str, property: Option<&str>) -> Result<bool, BindError> {
        if self.matched.get() {
            return Err(BindError::Conversion(
                "targets() called again after a previous call matched".into(),
            ));
        }
        let hit = type_name == self.target_type
            && property.is_none_or(|p| p == self.target_property);
        if hit {
            self.matched.set(true);
        }
        Ok(hit)
    }

    /// Supply the conversion result after a matching `targets()` call.
    pub fn resolve(&self, value: Value) -> Result<(), BindError> {
        if self.did_resolve.replace(true) {
            return Err(BindError::Conversion(
                "resolve() called more than once".into(),
            ));
        }
        *self.resolved.borrow_mut() = Some(value);
        Ok(())
    }

    /// Fold the converter's return value and the protocol state into the
    /// final result, enforcing the protocol invariants.
    fn finish(&self, returned: Option<Value>) -> Result<Option<Value>, BindError> {
        if self.did_resolve.get() {
            if returned.is_some() {
                return Err(BindError::Conversion(
                    "converter returned a value after calling resolve()".into(),
                ));
            }
            return Ok(self.resolved.borrow_mut().take());
        }
        if self.matched.get() {
            return Err(BindError::Conversion(
                "targets() matched but resolve() was never called".into(),
            ));
        }
        Ok(returned)
    }
}

impl core::fmt::Debug for ConversionContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConversionContext")
            .field("target_type", &self.target_type)
            .field("target_property", &self.target_property)
            .finish()
    }
}

/// Arguments to one [`convert`] invocation.
#[derive(Clone, Copy)]
pub struct ConvertArgs<'a> {
    /// The value to convert.
    pub value: &'a Value,
    /// Name of the type owning the destination property.
    pub target_type: &'a str,
    /// Name of the destination property.
    pub target_property: &'a str,
    /// The binding's converter, if any.
    pub convert: Option<&'a ConvertFn>,
    /// Fallback used when the input or the converted result is null.
    pub fallback: Option<&'a Value>,
}

/// Convert a value for a destination.
///
/// A null input yields the fallback without invoking the converter; a
/// missing converter passes the value through unchanged; a converter whose
/// final result is null also yields the fallback.
pub fn convert(args: ConvertArgs<'_>) -> Result<Value, BindError> {
    let fallback = || args.fallback.cloned().unwrap_or(Value::Null);
    if args.value.is_null() {
        return Ok(fallback());
    }
    let Some(converter) = args.convert else {
        return Ok(args.value.clone());
    };
    let context = ConversionContext::new(args.target_type, args.target_property);
    let returned = converter(args.value, &context)?;
    match context.finish(returned)? {
        Some(value) if !value.is_null() => Ok(value),
        _ => Ok(fallback()),
    }
}
