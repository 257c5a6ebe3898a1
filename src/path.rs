#![forbid(unsafe_code)]

//! Dotted property paths and path observation.
//!
//! A [`PathObserver`] keeps a callback informed of the value at the end of a
//! [`Path`], across arbitrarily deep and dynamically-replaced object graphs.
//! It is a recursive subscription tree: one node per path depth, each node
//! listening to one property of one object and owning at most one nested
//! child for the remaining segments. Replacing an intermediate object
//! cancels the child rooted in the old object and attaches a fresh one to
//! the replacement.
//!
//! # Invariants
//!
//! 1. The callback fires exactly once, synchronously, when observation
//!    starts, with the currently resolved value.
//! 2. A change notification is a no-op when the new first-segment value is
//!    identical (NaN-aware, objects by handle) to the last observed one,
//!    unless the event is forced or carries an originating sub-event.
//! 3. At most one nested child exists per node; cancelling a node
//!    recursively cancels its child. Cancelling twice is a no-op.
//! 4. After `cancel()` no further callbacks occur, and mutations of objects
//!    the path no longer traverses are never observed.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Null intermediate | Segment unset or cleared | Callback invoked with `Null` |
//! | Primitive intermediate | Segment holds a non-object | `BindError::ExpectedObject` to the mutator |
//! | Callback error | Downstream propagation failed | Error flows back to the mutator |

use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::str::FromStr;

use crate::error::BindError;
use crate::object::{ChangeEvent, Object, Subscription};
use crate::value::Value;

/// An ordered, non-empty sequence of property names.
///
/// Immutable once built; both construction paths reject empty paths and
/// empty segments synchronously.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// Parse a dotted path such as `"a.b"`.
    pub fn parse(text: &str) -> Result<Self, BindError> {
        if text.is_empty() {
            return Err(BindError::InvalidPath("path is empty".into()));
        }
        let segments: Vec<String> = text.split('.').map(str::to_owned).collect();
        Self::from_segments(segments)
    }

    /// Build a path from pre-split segments.
    pub fn from_segments(segments: Vec<String>) -> Result<Self, BindError> {
        if segments.is_empty() {
            return Err(BindError::InvalidPath("path is empty".into()));
        }
        if segments.iter().any(String::is_empty) {
            return Err(BindError::InvalidPath(format!(
                "path \"{}\" contains an empty segment",
                segments.join(".")
            )));
        }
        Ok(Self { segments })
    }

    /// The path's segments, in traversal order. Never empty.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for Path {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Callback invoked with the resolved terminal value of a path.
pub type PathCallback = Rc<dyn Fn(&Value) -> Result<(), BindError>>;

struct PathNode {
    /// First segment observed by this node (for diagnostics).
    segment: String,
    /// Remaining segments handled by the nested child.
    rest: Vec<String>,
    callback: PathCallback,
    subscription: RefCell<Option<Subscription>>,
    nested: RefCell<Option<Rc<PathNode>>>,
    last: RefCell<Value>,
    cancelled: Cell<bool>,
}

impl PathNode {
    fn on_change(self: &Rc<Self>, event: &ChangeEvent) -> Result<(), BindError> {
        if self.cancelled.get() {
            return Ok(());
        }
        // No-op filter: unchanged value, not forced, no originating
        // sub-event.
        if !event.forced
            && event.cause.is_none()
            && event.value.same(&self.last.borrow())
        {
            return Ok(());
        }
        *self.last.borrow_mut() = event.value.clone();

        if self.rest.is_empty() {
            return (self.callback)(&event.value);
        }
        if let Some(old) = self.nested.borrow_mut().take() {
            old.cancel();
        }
        match &event.value {
            Value::Object(object) => {
                let child = attach(object, &self.rest, Rc::clone(&self.callback))?;
                *self.nested.borrow_mut() = Some(child);
                Ok(())
            }
            Value::Null => (self.callback)(&Value::Null),
            other => Err(BindError::ExpectedObject {
                property: self.segment.clone(),
                actual: other.kind_name(),
            }),
        }
    }

    fn cancel(&self) {
        if self.cancelled.replace(true) {
            return;
        }
        drop(self.subscription.borrow_mut().take());
        if let Some(nested) = self.nested.borrow_mut().take() {
            nested.cancel();
        }
    }
}

fn attach(
    root: &Object,
    segments: &[String],
    callback: PathCallback,
) -> Result<Rc<PathNode>, BindError> {
    let node = Rc::new(PathNode {
        segment: segments[0].clone(),
        rest: segments[1..].to_vec(),
        callback,
        subscription: RefCell::new(None),
        nested: RefCell::new(None),
        last: RefCell::new(Value::Null),
        cancelled: Cell::new(false),
    });
    let weak = Rc::downgrade(&node);
    let subscription = root.on_change(&segments[0], move |event| {
        weak.upgrade().map_or(Ok(()), |node| node.on_change(event))
    });
    *node.subscription.borrow_mut() = Some(subscription);

    // Forced initial evaluation with the currently resolved value.
    let initial = ChangeEvent {
        property: segments[0].clone(),
        value: root.get(&segments[0]),
        forced: true,
        cause: None,
    };
    if let Err(err) = node.on_change(&initial) {
        node.cancel();
        return Err(err);
    }
    Ok(node)
}

/// Live observation of the value at the end of a [`Path`].
///
/// Created by [`observe`](PathObserver::observe); cancelled explicitly or on
/// drop.
pub struct PathObserver {
    root: Rc<PathNode>,
}

impl PathObserver {
    /// Observe `path` from `root`, invoking `callback` once immediately with
    /// the currently resolved value and again on every effective change.
    ///
    /// Errors raised by the callback (or by an invalid partial state found
    /// during the initial evaluation) are returned here; later errors flow
    /// back to whichever write triggered them.
    pub fn observe(
        root: &Object,
        path: &Path,
        callback: impl Fn(&Value) -> Result<(), BindError> + 'static,
    ) -> Result<Self, BindError> {
        let node = attach(root, path.segments(), Rc::new(callback))?;
        Ok(Self { root: node })
    }

    /// Detach the whole subscription tree. Idempotent.
    pub fn cancel(&self) {
        self.root.cancel();
    }
}

impl Drop for PathObserver {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl fmt::Debug for PathObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathObserver")
            .field("segment", &self.root.segment)
            .field("cancelled", &self.root.cancelled.get())
            .finish()
    }
}
