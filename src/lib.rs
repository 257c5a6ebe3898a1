#![forbid(unsafe_code)]

//! Reactive property synchronization for object trees.
//!
//! Tether keeps properties of loosely coupled objects in sync:
//!
//! - [`Object`]: A schema-checked property bag with change notification,
//!   receiver claims and one-shot disposal.
//! - [`PathObserver`]: Recursive observation of a dotted property path,
//!   re-subscribing through intermediate objects as they are replaced.
//! - [`BindingDescriptor`] / [`ActiveBinding`]: Declarative two-way bindings
//!   between a component property (or sub-property) and a property of an
//!   object selected from the component's scope.
//! - [`OneWayBinding`] / [`BoundProperty`]: Root-to-leaf bindings compiled
//!   from a direct path or a single-placeholder string template.
//! - [`ConversionContext`]: Direction-aware value conversion via the
//!   one-shot `targets()` / `resolve()` protocol.
//!
//! # Architecture
//!
//! Objects use `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Listeners are dispatched from a snapshot taken outside the borrow, so
//! handlers may freely mutate the object graph. Every observation hands
//! back an RAII guard ([`Subscription`], [`PathObserver`],
//! [`ActiveBinding`]) that cancels on drop.
//!
//! Propagation is re-entrancy guarded per binding: while one side is being
//! written, echoes from that write are absorbed instead of bouncing back.
//! A successfully written value that the receiving side coerced is synced
//! back to the sender with a forced write under the same guard, so each
//! user mutation settles in a bounded number of writes.
//!
//! # Invariants
//!
//! 1. A change event carrying a value identical to the stored one is
//!    dropped unless it is forced or carries an originating cause.
//! 2. A property may be the receiving end of at most one active binding at
//!    a time; violations fail at activation, not silently.
//! 3. Cancelling any guard is idempotent and severs every subscription it
//!    installed, including those on intermediate path objects.
//! 4. Null travelling through a binding is replaced by the fallback value
//!    captured when the binding was activated.
//! 5. A converter either matches and resolves exactly once, or returns its
//!    result without touching the context. Anything else is an error.

pub mod binding;
pub mod convert;
pub mod error;
pub mod object;
pub mod path;
pub mod schema;
pub mod selector;
pub mod template;
pub mod value;

pub use binding::{ActiveBinding, BindingContext, BindingDescriptor, Direction, activate_declared};
pub use convert::{ConversionContext, ConvertArgs, ConvertFn, convert};
pub use error::BindError;
pub use object::{ChangeEvent, Object, Subscription};
pub use path::{Path, PathObserver};
pub use schema::{PropertySchema, TypeSchema};
pub use selector::{ObjectScope, Selector, SelectorResolver};
pub use template::{BoundProperty, OneWayActivation, OneWayBinding};
pub use value::{Value, ValueKind};
