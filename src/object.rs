#![forbid(unsafe_code)]

//! Objects with checked properties and inline change notification.
//!
//! An [`Object`] is a shared handle (`Rc<RefCell<..>>`) to a bag of dynamic
//! properties governed by a [`TypeSchema`]. Writing a checked property
//! kind-validates, coerces, stores, and fires a [`ChangeEvent`] to that
//! property's listeners — synchronously, on the same call stack, which may
//! trigger nested writes recursively. Unchecked properties are stored
//! silently.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order.
//! 2. No user callback runs while the interior borrow is held: listeners
//!    and coercion hooks may both read and write this object re-entrantly.
//! 3. Every listener runs even if an earlier one failed; the first error is
//!    returned to the caller that performed the write.
//! 4. Disposal is one-shot: dispose listeners fire once, all change
//!    listeners are dropped, and later `dispose()` calls are no-ops.
//! 5. Dropping (or cancelling) a [`Subscription`] removes the listener
//!    before the next dispatch; cancelling twice is a no-op.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Kind mismatch | Checked write of wrong kind | `BindError::TypeMismatch`, nothing stored |
//! | Poisoned property | Binding declared on non-component type | `BindError::IncompatibleHost`, nothing stored |
//! | Listener error | Propagation failed downstream | First error returned to the writer |

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};

use crate::error::BindError;
use crate::schema::TypeSchema;
use crate::value::Value;

/// A property change notification.
///
/// `forced` marks an explicitly-forced evaluation (initial subscription
/// sweep, or a binding's sync-back write); `cause` carries the originating
/// sub-event when the notification was produced by an internal mutation
/// rather than a replacement. Path subscribers treat an event as a no-op
/// only when the value is unchanged *and* it is neither forced nor carries
/// a cause.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    /// Name of the property that changed.
    pub property: String,
    /// The stored (post-coercion) value.
    pub value: Value,
    /// Whether this evaluation was explicitly forced.
    pub forced: bool,
    /// The embedded originating sub-event, if any.
    pub cause: Option<Rc<ChangeEvent>>,
}

type ChangeListener = Rc<dyn Fn(&ChangeEvent) -> Result<(), BindError>>;
type DisposeListener = Rc<dyn Fn()>;

struct ObjectInner {
    schema: Rc<TypeSchema>,
    id: Option<String>,
    values: AHashMap<String, Value>,
    listeners: AHashMap<String, Vec<(u64, ChangeListener)>>,
    dispose_listeners: Vec<(u64, DisposeListener)>,
    receivers: AHashSet<String>,
    next_listener: u64,
    disposed: bool,
}

/// Shared handle to a property-bearing object.
#[derive(Clone)]
pub struct Object {
    inner: Rc<RefCell<ObjectInner>>,
}

impl Object {
    /// Create an instance of the given type.
    #[must_use]
    pub fn new(schema: &Rc<TypeSchema>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObjectInner {
                schema: Rc::clone(schema),
                id: None,
                values: AHashMap::new(),
                listeners: AHashMap::new(),
                dispose_listeners: Vec::new(),
                receivers: AHashSet::new(),
                next_listener: 0,
                disposed: false,
            })),
        }
    }

    /// Create an instance with an id for selector matching.
    #[must_use]
    pub fn with_id(schema: &Rc<TypeSchema>, id: impl Into<String>) -> Self {
        let object = Self::new(schema);
        object.inner.borrow_mut().id = Some(id.into());
        object
    }

    /// The object's type schema.
    #[must_use]
    pub fn schema(&self) -> Rc<TypeSchema> {
        Rc::clone(&self.inner.borrow().schema)
    }

    /// The object's type name.
    #[must_use]
    pub fn type_name(&self) -> String {
        self.inner.borrow().schema.name().to_owned()
    }

    /// The object's id, if one was assigned.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.inner.borrow().id.clone()
    }

    /// Diagnostic label: the type name, suffixed with `#id` when present.
    #[must_use]
    pub fn label(&self) -> String {
        let inner = self.inner.borrow();
        match &inner.id {
            Some(id) => format!("{}#{id}", inner.schema.name()),
            None => inner.schema.name().to_owned(),
        }
    }

    /// Whether two handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a property. Unset properties read as [`Value::Null`].
    #[must_use]
    pub fn get(&self, property: &str) -> Value {
        self.inner
            .borrow()
            .values
            .get(property)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Write a property.
    ///
    /// Checked properties are kind-validated (null is always accepted),
    /// coerced, stored, and their change event is dispatched inline before
    /// this call returns. Unchecked properties are stored silently.
    pub fn set(&self, property: &str, value: Value) -> Result<(), BindError> {
        self.write(property, value, false)
    }

    /// Write a property and mark the resulting event as forced, so
    /// subscribers re-evaluate even if they consider the value unchanged.
    pub fn set_forced(&self, property: &str, value: Value) -> Result<(), BindError> {
        self.write(property, value, true)
    }

    /// Announce that a property's value was mutated internally (rather than
    /// replaced), firing a change event that carries the originating
    /// sub-event. Subscribers forward such events even when the value
    /// compares identical.
    pub fn notify_mutation(
        &self,
        property: &str,
        cause: ChangeEvent,
    ) -> Result<(), BindError> {
        let event = ChangeEvent {
            property: property.to_owned(),
            value: self.get(property),
            forced: false,
            cause: Some(Rc::new(cause)),
        };
        self.dispatch(&event)
    }

    fn write(&self, property: &str, value: Value, forced: bool) -> Result<(), BindError> {
        let descriptor = {
            let inner = self.inner.borrow();
            if let Some(message) = inner.schema.poison_message(property) {
                return Err(BindError::IncompatibleHost(message.to_owned()));
            }
            let Some(descriptor) = inner.schema.property(property) else {
                drop(inner);
                // Unchecked: stored without validation or notification.
                self.inner
                    .borrow_mut()
                    .values
                    .insert(property.to_owned(), value);
                return Ok(());
            };
            if let Some(kind) = value.kind() {
                let expected = descriptor.kind();
                if expected != crate::value::ValueKind::Any && kind != expected {
                    return Err(BindError::TypeMismatch {
                        type_name: inner.schema.name().to_owned(),
                        property: property.to_owned(),
                        expected: expected.name(),
                        actual: kind.name(),
                    });
                }
            }
            descriptor.clone()
        };
        // The hook runs without the interior borrow held, so it may read
        // this object (clamping against a sibling limit, for example).
        let stored = descriptor.coerce(&value);
        self.inner
            .borrow_mut()
            .values
            .insert(property.to_owned(), stored.clone());
        self.dispatch(&ChangeEvent {
            property: property.to_owned(),
            value: stored,
            forced,
            cause: None,
        })
    }

    fn dispatch(&self, event: &ChangeEvent) -> Result<(), BindError> {
        // Snapshot outside the borrow; listeners may subscribe, cancel, or
        // write back into this object while running.
        let snapshot: Vec<(u64, ChangeListener)> = self
            .inner
            .borrow()
            .listeners
            .get(&event.property)
            .cloned()
            .unwrap_or_default();
        let mut first_error = None;
        for (id, listener) in snapshot {
            let still_registered = self
                .inner
                .borrow()
                .listeners
                .get(&event.property)
                .is_some_and(|list| list.iter().any(|(lid, _)| *lid == id));
            if !still_registered {
                continue;
            }
            if let Err(err) = listener(event) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Subscribe to change events of one property.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// cancelled or dropped, or the object is disposed.
    pub fn on_change(
        &self,
        property: impl Into<String>,
        listener: impl Fn(&ChangeEvent) -> Result<(), BindError> + 'static,
    ) -> Subscription {
        let property = property.into();
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner
            .listeners
            .entry(property.clone())
            .or_default()
            .push((id, Rc::new(listener)));
        Subscription {
            object: Rc::downgrade(&self.inner),
            key: ListenerKey::Change { property, id },
            active: Cell::new(true),
        }
    }

    /// Register a one-shot disposal listener.
    pub fn on_dispose(&self, listener: impl Fn() + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.dispose_listeners.push((id, Rc::new(listener)));
        Subscription {
            object: Rc::downgrade(&self.inner),
            key: ListenerKey::Dispose { id },
            active: Cell::new(true),
        }
    }

    /// Dispose the object: fire the one-shot disposal notification and drop
    /// every registered listener. Subsequent calls are no-ops.
    pub fn dispose(&self) {
        let listeners = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.listeners.clear();
            std::mem::take(&mut inner.dispose_listeners)
        };
        for (_, listener) in listeners {
            listener();
        }
    }

    /// Whether the object has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Claim a property (or dotted path) as the receiving end of a binding.
    ///
    /// At most one active binding may receive into a given endpoint; a
    /// second claim fails until the first is released.
    pub fn claim_receiver(&self, endpoint: &str) -> Result<(), BindError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.receivers.insert(endpoint.to_owned()) {
            let target = match &inner.id {
                Some(id) => format!("{}#{id}", inner.schema.name()),
                None => inner.schema.name().to_owned(),
            };
            return Err(BindError::ReceiverConflict {
                target,
                property: endpoint.to_owned(),
            });
        }
        Ok(())
    }

    /// Release a receiving-end claim.
    pub fn release_receiver(&self, endpoint: &str) {
        self.inner.borrow_mut().receivers.remove(endpoint);
    }
}

impl core::fmt::Debug for Object {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Object")
            .field("type", &inner.schema.name())
            .field("id", &inner.id)
            .field("properties", &inner.values.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

#[derive(Clone, Debug)]
enum ListenerKey {
    Change { property: String, id: u64 },
    Dispose { id: u64 },
}

/// RAII guard over a registered listener.
///
/// Cancelled on drop; [`cancel`](Subscription::cancel) is explicit and
/// idempotent. Holds only a weak reference, so a subscription never keeps
/// its object alive.
pub struct Subscription {
    object: Weak<RefCell<ObjectInner>>,
    key: ListenerKey,
    active: Cell<bool>,
}

impl Subscription {
    /// Remove the listener. Calling this more than once is a no-op.
    pub fn cancel(&self) {
        if !self.active.replace(false) {
            return;
        }
        let Some(object) = self.object.upgrade() else {
            return;
        };
        let mut inner = object.borrow_mut();
        match &self.key {
            ListenerKey::Change { property, id } => {
                if let Some(list) = inner.listeners.get_mut(property) {
                    list.retain(|(lid, _)| lid != id);
                }
            }
            ListenerKey::Dispose { id } => {
                inner.dispose_listeners.retain(|(lid, _)| lid != id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.active.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn counter_schema() -> Rc<TypeSchema> {
        TypeSchema::new("Counter")
            .checked("count", ValueKind::Number)
            .checked("label", ValueKind::String)
            .seal()
    }

    #[test]
    fn checked_write_fires_change_event() {
        let object = Object::new(&counter_schema());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = object.on_change("count", move |ev| {
            sink.borrow_mut().push(ev.value.clone());
            Ok(())
        });

        object.set("count", Value::from(3)).unwrap();
        object.set("count", Value::from(4)).unwrap();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].same(&Value::from(3)));
        assert!(seen[1].same(&Value::from(4)));
    }

    #[test]
    fn kind_mismatch_is_rejected_and_not_stored() {
        let object = Object::new(&counter_schema());
        let err = object.set("count", Value::from("nope")).unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { .. }));
        assert!(object.get("count").is_null());
    }

    #[test]
    fn null_write_is_always_accepted() {
        let object = Object::new(&counter_schema());
        object.set("count", Value::from(1)).unwrap();
        object.set("count", Value::Null).unwrap();
        assert!(object.get("count").is_null());
    }

    #[test]
    fn unchecked_write_is_silent() {
        let object = Object::new(&counter_schema());
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let _sub = object.on_change("scratch", move |_| {
            flag.set(true);
            Ok(())
        });
        object.set("scratch", Value::from("anything")).unwrap();
        assert!(!fired.get(), "unchecked properties must not notify");
        assert_eq!(object.get("scratch").as_str(), Some("anything"));
    }

    #[test]
    fn coercion_applies_before_dispatch() {
        let schema = TypeSchema::new("Slider")
            .checked_with("value", ValueKind::Number, |v| {
                Value::Number(v.as_number().unwrap_or(0.0).clamp(0.0, 10.0))
            })
            .seal();
        let object = Object::new(&schema);
        let seen = Rc::new(RefCell::new(Value::Null));
        let sink = Rc::clone(&seen);
        let _sub = object.on_change("value", move |ev| {
            *sink.borrow_mut() = ev.value.clone();
            Ok(())
        });
        object.set("value", Value::from(99)).unwrap();
        assert!(seen.borrow().same(&Value::from(10)));
        assert!(object.get("value").same(&Value::from(10)));
    }

    #[test]
    fn coercion_hook_may_read_the_object_being_written() {
        // A clamp against a sibling limit property reads the object from
        // inside its own write.
        let slot: Rc<RefCell<Option<Object>>> = Rc::new(RefCell::new(None));
        let handle = Rc::clone(&slot);
        let schema = TypeSchema::new("Field")
            .checked("max", ValueKind::Number)
            .checked_with("value", ValueKind::Number, move |v| {
                let limit = handle
                    .borrow()
                    .as_ref()
                    .and_then(|o| o.get("max").as_number())
                    .unwrap_or(f64::MAX);
                Value::Number(v.as_number().unwrap_or(0.0).min(limit))
            })
            .seal();
        let object = Object::new(&schema);
        *slot.borrow_mut() = Some(object.clone());

        object.set("max", Value::from(5)).unwrap();
        object.set("value", Value::from(9)).unwrap();
        assert!(object.get("value").same(&Value::from(5)));

        object.set("max", Value::from(20)).unwrap();
        object.set("value", Value::from(9)).unwrap();
        assert!(object.get("value").same(&Value::from(9)));
    }

    #[test]
    fn subscription_cancel_twice_is_noop() {
        let object = Object::new(&counter_schema());
        let hits = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&hits);
        let sub = object.on_change("count", move |_| {
            sink.set(sink.get() + 1);
            Ok(())
        });
        object.set("count", Value::from(1)).unwrap();
        sub.cancel();
        sub.cancel();
        object.set("count", Value::from(2)).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn subscription_drop_unsubscribes() {
        let object = Object::new(&counter_schema());
        let hits = Rc::new(Cell::new(0u32));
        {
            let sink = Rc::clone(&hits);
            let _sub = object.on_change("count", move |_| {
                sink.set(sink.get() + 1);
                Ok(())
            });
            object.set("count", Value::from(1)).unwrap();
        }
        object.set("count", Value::from(2)).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn reentrant_write_during_dispatch() {
        let object = Object::new(&counter_schema());
        let other = object.clone();
        let _sub = object.on_change("count", move |ev| {
            if let Some(n) = ev.value.as_number() {
                if n < 3.0 {
                    other.set("label", Value::from(format!("saw {n}")))?;
                }
            }
            Ok(())
        });
        object.set("count", Value::from(1)).unwrap();
        assert_eq!(object.get("label").as_str(), Some("saw 1"));
    }

    #[test]
    fn listener_error_reaches_the_writer_but_others_still_run() {
        let object = Object::new(&counter_schema());
        let _failing = object.on_change("count", |_| {
            Err(BindError::Conversion("deliberate".into()))
        });
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let _ok = object.on_change("count", move |_| {
            flag.set(true);
            Ok(())
        });
        let err = object.set("count", Value::from(1)).unwrap_err();
        assert!(matches!(err, BindError::Conversion(_)));
        assert!(ran.get(), "later listeners must still run");
        assert!(object.get("count").same(&Value::from(1)), "value stays stored");
    }

    #[test]
    fn dispose_is_one_shot_and_clears_listeners() {
        let object = Object::new(&counter_schema());
        let disposals = Rc::new(Cell::new(0u32));
        let changes = Rc::new(Cell::new(0u32));
        let d = Rc::clone(&disposals);
        let c = Rc::clone(&changes);
        let _dispose = object.on_dispose(move || d.set(d.get() + 1));
        let _change = object.on_change("count", move |_| {
            c.set(c.get() + 1);
            Ok(())
        });

        object.dispose();
        object.dispose();
        assert_eq!(disposals.get(), 1);
        assert!(object.is_disposed());

        object.set("count", Value::from(1)).unwrap();
        assert_eq!(changes.get(), 0, "change listeners are gone after dispose");
    }

    #[test]
    fn receiver_claim_is_exclusive_until_released() {
        let object = Object::new(&counter_schema());
        object.claim_receiver("count").unwrap();
        let err = object.claim_receiver("count").unwrap_err();
        assert!(matches!(err, BindError::ReceiverConflict { .. }));
        object.release_receiver("count");
        object.claim_receiver("count").unwrap();
    }

    #[test]
    fn forced_write_marks_event() {
        let object = Object::new(&counter_schema());
        let forced = Rc::new(Cell::new(false));
        let flag = Rc::clone(&forced);
        let _sub = object.on_change("count", move |ev| {
            flag.set(ev.forced);
            Ok(())
        });
        object.set_forced("count", Value::from(1)).unwrap();
        assert!(forced.get());
    }

    #[test]
    fn notify_mutation_carries_cause() {
        let object = Object::new(&counter_schema());
        object.set("count", Value::from(5)).unwrap();
        let saw_cause = Rc::new(Cell::new(false));
        let flag = Rc::clone(&saw_cause);
        let _sub = object.on_change("count", move |ev| {
            flag.set(ev.cause.is_some());
            Ok(())
        });
        let origin = ChangeEvent {
            property: "items".into(),
            value: Value::from(1),
            forced: false,
            cause: None,
        };
        object.notify_mutation("count", origin).unwrap();
        assert!(saw_cause.get());
    }

    #[test]
    fn label_includes_id_when_present() {
        let schema = counter_schema();
        assert_eq!(Object::new(&schema).label(), "Counter");
        assert_eq!(Object::with_id(&schema, "main").label(), "Counter#main");
    }
}
