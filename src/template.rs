#![forbid(unsafe_code)]

//! One-way and template bindings.
//!
//! A [`OneWayBinding`] is compiled at tree-construction time from either a
//! direct path attribute or a single-placeholder string template
//! (`"Hello, ${user.name}!"` — exactly one `${path}` segment; zero or more
//! than one is a construction failure). Activation against a qualifying
//! binding root installs a [`PathObserver`] that assigns the converted
//! value into the target property; the observation is released when the
//! returned handle drops or the target is disposed, whichever comes first.
//!
//! [`BoundProperty`] carries a compiled binding together with its target
//! while the owning tree is still dangling; if the tree never attaches to a
//! binding root, the first subsequent use reports the distinct "not
//! attached to a binding root" failure.

use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::convert::{ConversionContext, ConvertArgs, ConvertFn, convert};
use crate::error::BindError;
use crate::object::{Object, Subscription};
use crate::path::{Path, PathObserver};
use crate::value::Value;

/// A compiled one-way binding descriptor.
pub struct OneWayBinding {
    path: Path,
    convert: Option<ConvertFn>,
    fallback: Option<Value>,
}

impl OneWayBinding {
    /// Compile from a direct path.
    #[must_use]
    pub fn from_path(path: Path) -> Self {
        Self {
            path,
            convert: None,
            fallback: None,
        }
    }

    /// Compile from a string template containing exactly one `${path}`
    /// placeholder. The surrounding text becomes the interpolating
    /// converter.
    pub fn from_template(template: &str) -> Result<Self, BindError> {
        let (prefix, rest) = match template.split_once("${") {
            Some(parts) => parts,
            None => {
                return Err(BindError::InvalidTemplate {
                    template: template.to_owned(),
                    reason: "expected exactly one ${path} placeholder, found 0".into(),
                });
            }
        };
        let (inner, suffix) = rest.split_once('}').ok_or_else(|| BindError::InvalidTemplate {
            template: template.to_owned(),
            reason: "unterminated ${ placeholder".into(),
        })?;
        if suffix.contains("${") {
            return Err(BindError::InvalidTemplate {
                template: template.to_owned(),
                reason: "expected exactly one ${path} placeholder, found 2 or more".into(),
            });
        }
        let path = Path::parse(inner).map_err(|err| BindError::InvalidTemplate {
            template: template.to_owned(),
            reason: err.to_string(),
        })?;
        let prefix = prefix.to_owned();
        let suffix = suffix.to_owned();
        let interpolate: ConvertFn = Rc::new(move |value: &Value, _: &ConversionContext| {
            Ok(Some(Value::Str(format!("{prefix}{value}{suffix}"))))
        });
        Ok(Self {
            path,
            convert: Some(interpolate),
            fallback: None,
        })
    }

    /// Attach a converter.
    #[must_use]
    pub fn with_converter(
        mut self,
        converter: impl Fn(&Value, &ConversionContext) -> Result<Option<Value>, BindError>
        + 'static,
    ) -> Self {
        self.convert = Some(Rc::new(converter));
        self
    }

    /// Supply a compile-time fallback. Without one, activation captures the
    /// target property's current value.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// The observed path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Activate against a binding root: observe the path from `root` and
    /// assign every converted value into `target[property]`.
    ///
    /// The root's type must be a component (a qualifying binding root).
    /// The returned handle cancels on drop, and is also cancelled when the
    /// target is disposed.
    pub fn activate(
        &self,
        root: &Object,
        target: &Object,
        property: impl Into<String>,
    ) -> Result<OneWayActivation, BindError> {
        if !root.schema().is_component() {
            return Err(BindError::NotABindingRoot(root.type_name()));
        }
        let property = property.into();
        let fallback = self
            .fallback
            .clone()
            .unwrap_or_else(|| target.get(&property));
        let converter = self.convert.clone();
        let sink = target.clone();
        let observer = PathObserver::observe(root, &self.path, move |value| {
            let converted = convert(ConvertArgs {
                value,
                target_type: &sink.type_name(),
                target_property: &property,
                convert: converter.as_ref(),
                fallback: Some(&fallback),
            })?;
            sink.set(&property, converted)
        })?;

        let inner = Rc::new(OneWayInner {
            observer: RefCell::new(Some(observer)),
            dispose_hook: RefCell::new(None),
            cancelled: Cell::new(false),
        });
        let weak = Rc::downgrade(&inner);
        *inner.dispose_hook.borrow_mut() = Some(target.on_dispose(move || {
            if let Some(inner) = weak.upgrade() {
                inner.cancel();
            }
        }));
        Ok(OneWayActivation { inner })
    }
}

impl fmt::Debug for OneWayBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneWayBinding")
            .field("path", &self.path.to_string())
            .field("converter", &self.convert.is_some())
            .field("fallback", &self.fallback)
            .finish()
    }
}

struct OneWayInner {
    observer: RefCell<Option<PathObserver>>,
    dispose_hook: RefCell<Option<Subscription>>,
    cancelled: Cell<bool>,
}

impl OneWayInner {
    fn cancel(&self) {
        if self.cancelled.replace(true) {
            return;
        }
        if let Some(observer) = self.observer.borrow_mut().take() {
            observer.cancel();
        }
        if let Some(hook) = self.dispose_hook.borrow_mut().take() {
            hook.cancel();
        }
    }
}

/// An activated one-way binding.
///
/// Cancels on drop; also cancelled automatically when the target is
/// disposed.
pub struct OneWayActivation {
    inner: Rc<OneWayInner>,
}

impl OneWayActivation {
    /// Stop the observation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Whether the binding still applies values.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.inner.cancelled.get()
    }
}

impl Drop for OneWayActivation {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

impl fmt::Debug for OneWayActivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneWayActivation")
            .field("active", &self.is_active())
            .finish()
    }
}

/// A compiled one-way binding waiting for its tree to attach.
///
/// Construction wires the binding to its target but installs nothing; the
/// owning tree calls [`attach`](BoundProperty::attach) once it reaches a
/// qualifying root. Using the target before that point surfaces the
/// dangling state as [`BindError::NotAttached`].
pub struct BoundProperty {
    binding: OneWayBinding,
    target: Object,
    property: String,
    active: RefCell<Option<OneWayActivation>>,
}

impl BoundProperty {
    /// Wire a compiled binding to its target property.
    #[must_use]
    pub fn new(binding: OneWayBinding, target: &Object, property: impl Into<String>) -> Self {
        Self {
            binding,
            target: target.clone(),
            property: property.into(),
            active: RefCell::new(None),
        }
    }

    /// Activate now that the owning tree reached `root`. Re-attaching to a
    /// different root replaces the previous observation.
    pub fn attach(&self, root: &Object) -> Result<(), BindError> {
        let activation = self
            .binding
            .activate(root, &self.target, self.property.clone())?;
        if let Some(previous) = self.active.borrow_mut().replace(activation) {
            previous.cancel();
        }
        Ok(())
    }

    /// Whether the binding is attached to a root and still applying values.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.active
            .borrow()
            .as_ref()
            .is_some_and(OneWayActivation::is_active)
    }

    /// Fail if the owning tree never attached to a binding root.
    ///
    /// Called by the first pass that needs the bound value on a dangling
    /// target.
    pub fn ensure_attached(&self) -> Result<(), BindError> {
        if self.is_attached() {
            return Ok(());
        }
        Err(BindError::NotAttached {
            binding: self.binding.path.to_string(),
            target: self.target.label(),
        })
    }

    /// Cancel the observation, returning the target to its dangling state.
    pub fn detach(&self) {
        if let Some(activation) = self.active.borrow_mut().take() {
            activation.cancel();
        }
    }
}

impl fmt::Debug for BoundProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundProperty")
            .field("path", &self.binding.path.to_string())
            .field("target", &self.target.label())
            .field("property", &self.property)
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeSchema;
    use crate::value::ValueKind;

    fn root_schema() -> Rc<TypeSchema> {
        TypeSchema::new("App")
            .component()
            .checked("user", ValueKind::Object)
            .checked("title", ValueKind::String)
            .seal()
    }

    fn label_schema() -> Rc<TypeSchema> {
        TypeSchema::new("Label")
            .checked("text", ValueKind::String)
            .seal()
    }

    #[test]
    fn template_requires_exactly_one_placeholder() {
        assert!(OneWayBinding::from_template("no placeholder").is_err());
        assert!(OneWayBinding::from_template("${a} and ${b}").is_err());
        assert!(OneWayBinding::from_template("broken ${a").is_err());
        assert!(OneWayBinding::from_template("ok: ${a.b}").is_ok());
    }

    #[test]
    fn direct_path_binding_assigns_target_property() {
        let root = Object::new(&root_schema());
        root.set("title", Value::from("first")).unwrap();
        let label = Object::new(&label_schema());

        let binding = OneWayBinding::from_path(Path::parse("title").unwrap());
        let _observer = binding.activate(&root, &label, "text").unwrap();
        assert_eq!(label.get("text").as_str(), Some("first"));

        root.set("title", Value::from("second")).unwrap();
        assert_eq!(label.get("text").as_str(), Some("second"));
    }

    #[test]
    fn template_interpolates_around_the_value() {
        let root = Object::new(&root_schema());
        root.set("title", Value::from("tether")).unwrap();
        let label = Object::new(&label_schema());

        let binding = OneWayBinding::from_template("Welcome to ${title}!").unwrap();
        let _observer = binding.activate(&root, &label, "text").unwrap();
        assert_eq!(label.get("text").as_str(), Some("Welcome to tether!"));

        root.set("title", Value::from("somewhere else")).unwrap();
        assert_eq!(
            label.get("text").as_str(),
            Some("Welcome to somewhere else!")
        );
    }

    #[test]
    fn broken_path_restores_the_captured_fallback() {
        let user_schema = TypeSchema::new("User")
            .checked("name", ValueKind::String)
            .seal();
        let root = Object::new(&root_schema());
        let user = Object::new(&user_schema);
        user.set("name", Value::from("ada")).unwrap();
        root.set("user", Value::from(user)).unwrap();

        let label = Object::new(&label_schema());
        label.set("text", Value::from("anonymous")).unwrap();

        let binding = OneWayBinding::from_path(Path::parse("user.name").unwrap());
        let _observer = binding.activate(&root, &label, "text").unwrap();
        assert_eq!(label.get("text").as_str(), Some("ada"));

        root.set("user", Value::Null).unwrap();
        assert_eq!(
            label.get("text").as_str(),
            Some("anonymous"),
            "null resolution restores the target's pre-binding value"
        );
    }

    #[test]
    fn compile_time_fallback_wins_over_captured_value() {
        let root = Object::new(&root_schema());
        let label = Object::new(&label_schema());
        label.set("text", Value::from("captured")).unwrap();

        let binding = OneWayBinding::from_path(Path::parse("title").unwrap())
            .with_fallback(Value::from("declared"));
        let _observer = binding.activate(&root, &label, "text").unwrap();
        assert_eq!(label.get("text").as_str(), Some("declared"));
    }

    #[test]
    fn non_component_root_is_rejected() {
        let plain = Object::new(&label_schema());
        let label = Object::new(&label_schema());
        let binding = OneWayBinding::from_path(Path::parse("text").unwrap());
        let err = binding.activate(&plain, &label, "text").unwrap_err();
        assert!(matches!(err, BindError::NotABindingRoot(_)));
    }

    #[test]
    fn dangling_target_reports_not_attached() {
        let label = Object::with_id(&label_schema(), "greeting");
        let binding = OneWayBinding::from_template("Hi ${user.name}").unwrap();
        let bound = BoundProperty::new(binding, &label, "text");

        assert!(!bound.is_attached());
        let err = bound.ensure_attached().unwrap_err();
        assert_eq!(
            err.to_string(),
            "one-way binding \"user.name\" on Label#greeting is not attached to a binding root"
        );
    }

    #[test]
    fn attach_then_detach_stops_updates() {
        let root = Object::new(&root_schema());
        root.set("title", Value::from("live")).unwrap();
        let label = Object::new(&label_schema());

        let binding = OneWayBinding::from_path(Path::parse("title").unwrap());
        let bound = BoundProperty::new(binding, &label, "text");
        bound.attach(&root).unwrap();
        assert!(bound.is_attached());
        bound.ensure_attached().unwrap();
        assert_eq!(label.get("text").as_str(), Some("live"));

        bound.detach();
        root.set("title", Value::from("unseen")).unwrap();
        assert_eq!(label.get("text").as_str(), Some("live"));
    }

    #[test]
    fn target_disposal_cancels_the_observation() {
        let root = Object::new(&root_schema());
        root.set("title", Value::from("first")).unwrap();
        let label = Object::new(&label_schema());

        let binding = OneWayBinding::from_path(Path::parse("title").unwrap());
        let active = binding.activate(&root, &label, "text").unwrap();
        assert!(active.is_active());
        assert_eq!(label.get("text").as_str(), Some("first"));

        label.dispose();
        assert!(!active.is_active());

        root.set("title", Value::from("second")).unwrap();
        assert_eq!(
            label.get("text").as_str(),
            Some("first"),
            "no writes into a disposed target"
        );
    }

    #[test]
    fn template_renders_numbers_without_fraction_noise() {
        let schema = TypeSchema::new("App")
            .component()
            .checked("count", ValueKind::Number)
            .seal();
        let root = Object::new(&schema);
        root.set("count", Value::from(3)).unwrap();
        let label = Object::new(&label_schema());

        let binding = OneWayBinding::from_template("${count} items").unwrap();
        let _observer = binding.activate(&root, &label, "text").unwrap();
        assert_eq!(label.get("text").as_str(), Some("3 items"));
    }
}
