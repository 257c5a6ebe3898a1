#![forbid(unsafe_code)]

//! Selectors naming a binding's remote object.
//!
//! A [`Selector`] identifies exactly one object relative to a scope: by id
//! (`#input`), by type name (`TextInput`), or the scope itself (`:host`).
//! [`SelectorResolver`] is the lookup seam; bindings consume it once, at
//! activation. [`ObjectScope`] is the bundled registry implementation.

use core::fmt;
use std::str::FromStr;

use crate::error::BindError;
use crate::object::Object;

/// A parsed selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// `#some-id` — match by assigned id.
    Id(String),
    /// `TypeName` — match by type name.
    Type(String),
    /// `:host` — the scope object itself.
    Host,
}

impl Selector {
    /// Parse a selector string.
    pub fn parse(text: &str) -> Result<Self, BindError> {
        if text == ":host" {
            return Ok(Self::Host);
        }
        if let Some(id) = text.strip_prefix('#') {
            if id.is_empty() {
                return Err(BindError::InvalidSelector(text.to_owned()));
            }
            return Ok(Self::Id(id.to_owned()));
        }
        if text.is_empty() || text.starts_with(':') {
            return Err(BindError::InvalidSelector(text.to_owned()));
        }
        Ok(Self::Type(text.to_owned()))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Type(name) => f.write_str(name),
            Self::Host => f.write_str(":host"),
        }
    }
}

impl FromStr for Selector {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Resolves a selector to exactly one object within a scope.
///
/// Zero matches and multiple matches are distinct failures; both are fatal
/// to the binding being activated, and to it only.
pub trait SelectorResolver {
    /// Resolve `selector` relative to `scope`.
    fn resolve(&self, scope: &Object, selector: &Selector) -> Result<Object, BindError>;
}

/// A flat registry of candidate objects.
///
/// Embedders with a real widget tree supply their own [`SelectorResolver`];
/// this one serves tests and simple hosts.
#[derive(Default)]
pub struct ObjectScope {
    objects: Vec<Object>,
}

impl ObjectScope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a candidate object.
    pub fn register(&mut self, object: &Object) -> &mut Self {
        self.objects.push(object.clone());
        self
    }

    /// Number of registered candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the scope has no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl SelectorResolver for ObjectScope {
    fn resolve(&self, scope: &Object, selector: &Selector) -> Result<Object, BindError> {
        let matches: Vec<&Object> = match selector {
            Selector::Host => return Ok(scope.clone()),
            Selector::Id(id) => self
                .objects
                .iter()
                .filter(|o| o.id().as_deref() == Some(id))
                .collect(),
            Selector::Type(name) => self
                .objects
                .iter()
                .filter(|o| o.type_name() == *name)
                .collect(),
        };
        match matches.as_slice() {
            [] => Err(BindError::SelectorNotFound(selector.to_string())),
            [single] => Ok((*single).clone()),
            many => Err(BindError::SelectorAmbiguous {
                selector: selector.to_string(),
                matches: many.len(),
            }),
        }
    }
}

impl fmt::Debug for ObjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectScope")
            .field("objects", &self.objects.len())
            .finish()
    }
}
