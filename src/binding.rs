#![forbid(unsafe_code)]

//! Two-way and directed property bindings.
//!
//! A [`BindingDescriptor`] is declared once per binding, at type-registration
//! time, and *activated* per owning instance: the remote object is resolved
//! through a [`SelectorResolver`], the remote property's current value is
//! captured as the fallback, and one or two [`PathObserver`]s are installed
//! according to the [`Direction`].
//!
//! Propagation is synchronous and potentially re-entrant: a write dispatches
//! its change notification inline, which may trigger nested writes on the
//! same call stack. The sole concurrency-safety mechanism is the binding's
//! per-instance boolean re-entrancy guard, held through a scoped acquisition
//! so it is released on every exit path, including errors. It is a flag, not
//! a counter: nested re-entrant calls during one propagation are collapsed,
//! never queued.
//!
//! # Invariants
//!
//! 1. A property is the receiving end of at most one active binding; the
//!    second activation fails.
//! 2. The fallback is captured before any subscription installs, and is
//!    restored on the far side whenever the converted value is null.
//! 3. After writing a converted value, the stored value is re-read; if the
//!    destination coerced it, the difference is converted back and
//!    force-written to the origin side while the guard is still held.
//! 4. Each installed direction applies exactly one initial value at
//!    activation.
//! 5. Subscriptions are released when the owning instance is disposed, or
//!    when the [`ActiveBinding`] handle is dropped, whichever comes first.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Selector mismatch | 0 or >1 matches | Activation fails, binding only |
//! | Unchecked endpoint | Property not in schema | Strict: activation fails; lenient: warn, proceed unsafely |
//! | Converter error | Converter threw or misused the protocol | Wrapped with both endpoints, re-thrown to the mutator |
//! | Write rejected | Kind check failed downstream | Wrapped with both endpoints, re-thrown to the mutator |

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::convert::{ConversionContext, ConvertArgs, ConvertFn, convert};
use crate::error::BindError;
use crate::object::{Object, Subscription};
use crate::path::{Path, PathObserver};
use crate::selector::{Selector, SelectorResolver};
use crate::value::Value;

/// Which way values flow through a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Changes on either side propagate to the other.
    Bidirectional,
    /// Only local changes propagate to the remote property.
    SendOnly,
    /// Only remote changes propagate to the local property.
    ReceiveOnly,
}

/// Activation context shared by a host's bindings.
#[derive(Clone, Copy, Debug)]
pub struct BindingContext {
    /// Whether unchecked endpoints fail activation. When `false`, a warning
    /// is logged and the binding proceeds unsafely typed.
    pub strict: bool,
}

impl BindingContext {
    /// Strict context: unchecked endpoints are activation failures.
    #[must_use]
    pub fn strict() -> Self {
        Self { strict: true }
    }

    /// Lenient context: unchecked endpoints log a warning.
    #[must_use]
    pub fn lenient() -> Self {
        Self { strict: false }
    }
}

impl Default for BindingContext {
    fn default() -> Self {
        Self::strict()
    }
}

/// A declared binding between a local path and a remote property.
///
/// Descriptors live for the lifetime of the type they are declared on;
/// [`activate`](BindingDescriptor::activate) is called per instance.
pub struct BindingDescriptor {
    local: Path,
    direction: Direction,
    selector: Selector,
    remote_property: String,
    convert: Option<ConvertFn>,
    poisoned: RefCell<Option<String>>,
}

impl BindingDescriptor {
    /// Declare a binding.
    ///
    /// The local path must have one or two segments (a component's own
    /// property, or `property.subProperty`).
    pub fn new(
        local: Path,
        direction: Direction,
        selector: Selector,
        remote_property: impl Into<String>,
    ) -> Result<Self, BindError> {
        let segments = local.segments().len();
        if segments > 2 {
            return Err(BindError::InvalidPath(format!(
                "local binding path \"{local}\" must have one or two segments, got {segments}"
            )));
        }
        let remote_property = remote_property.into();
        if remote_property.is_empty() {
            return Err(BindError::InvalidPath(
                "remote property name is empty".into(),
            ));
        }
        Ok(Self {
            local,
            direction,
            selector,
            remote_property,
            convert: None,
            poisoned: RefCell::new(None),
        })
    }

    /// Attach a shared converter, used for both directions.
    #[must_use]
    pub fn with_converter(
        mut self,
        converter: impl Fn(&Value, &ConversionContext) -> Result<Option<Value>, BindError>
        + 'static,
    ) -> Self {
        self.convert = Some(Rc::new(converter));
        self
    }

    /// The binding's local path.
    #[must_use]
    pub fn local_path(&self) -> &Path {
        &self.local
    }

    /// The binding's direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The remote side's selector.
    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// The remote side's property name.
    #[must_use]
    pub fn remote_property(&self) -> &str {
        &self.remote_property
    }

    /// Mark the descriptor unusable with a diagnostic that every later
    /// activation repeats verbatim. Set by the deferred declaration check.
    pub(crate) fn poison(&self, message: &str) {
        *self.poisoned.borrow_mut() = Some(message.to_owned());
    }

    /// Activate the binding for one owning instance.
    pub fn activate(
        &self,
        owner: &Object,
        resolver: &dyn SelectorResolver,
        context: &BindingContext,
    ) -> Result<ActiveBinding, BindError> {
        if let Some(message) = self.poisoned.borrow().as_ref() {
            return Err(BindError::IncompatibleHost(message.clone()));
        }
        let remote = resolver.resolve(owner, &self.selector)?;
        self.check_endpoints(owner, &remote, context.strict)?;

        let mut claims: Vec<(Object, String)> = Vec::new();
        if let Err(err) = self.claim_receivers(owner, &remote, &mut claims) {
            for (object, key) in &claims {
                object.release_receiver(key);
            }
            return Err(err);
        }

        // Fallback is the remote property's value before any subscription
        // installs.
        let fallback = remote.get(&self.remote_property);
        let state = Rc::new(BindingState {
            owner: owner.clone(),
            local: self.local.clone(),
            remote: remote.clone(),
            remote_property: self.remote_property.clone(),
            convert: self.convert.clone(),
            fallback,
            guard: Cell::new(false),
            local_label: format!("{}.{}", owner.type_name(), self.local),
            remote_label: format!("{}.{}", self.selector, self.remote_property),
        });
        let inner = Rc::new(ActiveInner {
            state: Rc::clone(&state),
            send: RefCell::new(None),
            receive: RefCell::new(None),
            dispose_hook: RefCell::new(None),
            claims: RefCell::new(claims),
            cancelled: Cell::new(false),
        });

        let install = || -> Result<(), BindError> {
            if self.direction != Direction::ReceiveOnly {
                let st = Rc::clone(&state);
                let observer = PathObserver::observe(owner, &self.local, move |value| {
                    propagate_to_remote(&st, value)
                })?;
                *inner.send.borrow_mut() = Some(observer);
            }
            if self.direction != Direction::SendOnly {
                let remote_path = Path::from_segments(vec![self.remote_property.clone()])?;
                let st = Rc::clone(&state);
                let observer = PathObserver::observe(&remote, &remote_path, move |value| {
                    propagate_to_local(&st, value)
                })?;
                *inner.receive.borrow_mut() = Some(observer);
            }
            let weak = Rc::downgrade(&inner);
            *inner.dispose_hook.borrow_mut() = Some(owner.on_dispose(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.cancel();
                }
            }));
            Ok(())
        };
        if let Err(err) = install() {
            inner.cancel();
            return Err(err);
        }
        tracing::debug!(
            local = %state.local_label,
            remote = %state.remote_label,
            direction = ?self.direction,
            "binding activated"
        );
        Ok(ActiveBinding { inner })
    }

    fn check_endpoints(
        &self,
        owner: &Object,
        remote: &Object,
        strict: bool,
    ) -> Result<(), BindError> {
        ensure_checked(remote, &self.remote_property, strict)?;
        let segments = self.local.segments();
        ensure_checked(owner, &segments[0], strict)?;
        if segments.len() == 2 {
            match owner.get(&segments[0]) {
                Value::Object(intermediate) => {
                    ensure_checked(&intermediate, &segments[1], strict)?;
                }
                Value::Null => {
                    // Cannot verify until the intermediate appears.
                    tracing::warn!(
                        path = %self.local,
                        type_name = %owner.type_name(),
                        "intermediate object is unset; terminal property cannot be verified"
                    );
                }
                other => {
                    return Err(BindError::ExpectedObject {
                        property: segments[0].clone(),
                        actual: other.kind_name(),
                    });
                }
            }
        }
        Ok(())
    }

    fn claim_receivers(
        &self,
        owner: &Object,
        remote: &Object,
        claims: &mut Vec<(Object, String)>,
    ) -> Result<(), BindError> {
        if self.direction != Direction::ReceiveOnly {
            remote.claim_receiver(&self.remote_property)?;
            claims.push((remote.clone(), self.remote_property.clone()));
        }
        if self.direction != Direction::SendOnly {
            let key = self.local.to_string();
            owner.claim_receiver(&key)?;
            claims.push((owner.clone(), key));
        }
        Ok(())
    }
}

impl core::fmt::Debug for BindingDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BindingDescriptor")
            .field("local", &self.local.to_string())
            .field("direction", &self.direction)
            .field("selector", &self.selector.to_string())
            .field("remote_property", &self.remote_property)
            .field("converter", &self.convert.is_some())
            .finish()
    }
}

fn ensure_checked(object: &Object, property: &str, strict: bool) -> Result<(), BindError> {
    if object.schema().property(property).is_some() {
        return Ok(());
    }
    if strict {
        return Err(BindError::NotChecked {
            type_name: object.type_name(),
            property: property.to_owned(),
        });
    }
    tracing::warn!(
        type_name = %object.type_name(),
        property,
        "binding over unchecked property; changes will not be observed"
    );
    Ok(())
}

/// Activate every binding declared on the owner's type.
///
/// Each failure is fatal to that one binding only, so results are returned
/// per descriptor in declaration order.
pub fn activate_declared(
    owner: &Object,
    resolver: &dyn SelectorResolver,
    context: &BindingContext,
) -> Vec<Result<ActiveBinding, BindError>> {
    let schema = owner.schema();
    schema
        .bindings()
        .iter()
        .map(|descriptor| descriptor.activate(owner, resolver, context))
        .collect()
}

struct BindingState {
    owner: Object,
    local: Path,
    remote: Object,
    remote_property: String,
    convert: Option<ConvertFn>,
    fallback: Value,
    guard: Cell<bool>,
    local_label: String,
    remote_label: String,
}

impl BindingState {
    fn wrap(&self, action: &'static str, cause: &BindError) -> BindError {
        BindError::Propagation {
            local: self.local_label.clone(),
            remote: self.remote_label.clone(),
            action,
            cause: cause.to_string(),
        }
    }

    /// Resolve the object and property the local path currently ends in.
    ///
    /// `None` while a two-segment path's intermediate is unset: there is no
    /// destination yet, and the send-side observer re-fires once it appears.
    fn local_target(&self) -> Result<Option<(Object, String)>, BindError> {
        let segments = self.local.segments();
        if segments.len() == 1 {
            return Ok(Some((self.owner.clone(), segments[0].clone())));
        }
        match self.owner.get(&segments[0]) {
            Value::Object(intermediate) => Ok(Some((intermediate, segments[1].clone()))),
            Value::Null => Ok(None),
            other => Err(BindError::ExpectedObject {
                property: segments[0].clone(),
                actual: other.kind_name(),
            }),
        }
    }
}

/// Scoped acquisition of the re-entrancy guard; released on drop, so every
/// exit path (including `?`) clears it.
struct GuardScope<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> GuardScope<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for GuardScope<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

fn propagate_to_remote(state: &BindingState, value: &Value) -> Result<(), BindError> {
    if state.guard.get() {
        return Ok(());
    }
    let _guard = GuardScope::enter(&state.guard);

    let remote_schema = state.remote.schema();
    let converted = convert(ConvertArgs {
        value,
        target_type: remote_schema.name(),
        target_property: &state.remote_property,
        convert: state.convert.as_ref(),
        fallback: Some(&state.fallback),
    })
    .map_err(|e| state.wrap("convert", &e))?;
    state
        .remote
        .set(&state.remote_property, converted.clone())
        .map_err(|e| state.wrap("set remote property", &e))?;

    // If the remote side coerced the value, mirror the stored value back.
    let stored = state.remote.get(&state.remote_property);
    if !stored.same(&converted) {
        let Some((holder, property)) = state
            .local_target()
            .map_err(|e| state.wrap("sync back", &e))?
        else {
            return Ok(());
        };
        let holder_schema = holder.schema();
        let back = convert(ConvertArgs {
            value: &stored,
            target_type: holder_schema.name(),
            target_property: &property,
            convert: state.convert.as_ref(),
            fallback: Some(&state.fallback),
        })
        .map_err(|e| state.wrap("convert", &e))?;
        holder
            .set_forced(&property, back)
            .map_err(|e| state.wrap("sync back", &e))?;
    }
    Ok(())
}

fn propagate_to_local(state: &BindingState, value: &Value) -> Result<(), BindError> {
    if state.guard.get() {
        return Ok(());
    }
    let _guard = GuardScope::enter(&state.guard);

    let Some((holder, property)) = state
        .local_target()
        .map_err(|e| state.wrap("set local property", &e))?
    else {
        // Intermediate object not set yet; the value is absorbed.
        return Ok(());
    };
    let holder_schema = holder.schema();
    let converted = convert(ConvertArgs {
        value,
        target_type: holder_schema.name(),
        target_property: &property,
        convert: state.convert.as_ref(),
        fallback: Some(&state.fallback),
    })
    .map_err(|e| state.wrap("convert", &e))?;
    holder
        .set(&property, converted.clone())
        .map_err(|e| state.wrap("set local property", &e))?;

    // If the local side coerced the value, mirror the stored value back.
    let stored = holder.get(&property);
    if !stored.same(&converted) {
        let remote_schema = state.remote.schema();
        let back = convert(ConvertArgs {
            value: &stored,
            target_type: remote_schema.name(),
            target_property: &state.remote_property,
            convert: state.convert.as_ref(),
            fallback: Some(&state.fallback),
        })
        .map_err(|e| state.wrap("convert", &e))?;
        state
            .remote
            .set_forced(&state.remote_property, back)
            .map_err(|e| state.wrap("sync back", &e))?;
    }
    Ok(())
}

struct ActiveInner {
    state: Rc<BindingState>,
    send: RefCell<Option<PathObserver>>,
    receive: RefCell<Option<PathObserver>>,
    dispose_hook: RefCell<Option<Subscription>>,
    claims: RefCell<Vec<(Object, String)>>,
    cancelled: Cell<bool>,
}

impl ActiveInner {
    fn cancel(&self) {
        if self.cancelled.replace(true) {
            return;
        }
        if let Some(observer) = self.send.borrow_mut().take() {
            observer.cancel();
        }
        if let Some(observer) = self.receive.borrow_mut().take() {
            observer.cancel();
        }
        if let Some(hook) = self.dispose_hook.borrow_mut().take() {
            hook.cancel();
        }
        for (object, key) in self.claims.borrow_mut().drain(..) {
            object.release_receiver(&key);
        }
    }
}

/// An activated binding.
///
/// Cancels on drop; also cancelled automatically when the owning instance
/// is disposed. Cancelling releases both observers and the receiving-end
/// claims.
pub struct ActiveBinding {
    inner: Rc<ActiveInner>,
}

impl ActiveBinding {
    /// Release the binding's subscriptions and claims. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Whether the binding still propagates.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.inner.cancelled.get()
    }
}

impl Drop for ActiveBinding {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

impl core::fmt::Debug for ActiveBinding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActiveBinding")
            .field("local", &self.inner.state.local_label)
            .field("remote", &self.inner.state.remote_label)
            .field("active", &self.is_active())
            .finish()
    }
}
