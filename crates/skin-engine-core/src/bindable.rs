//! Objects that expose observable properties by name.
//!
//! Bindings and commands address their sources by name at runtime, so every
//! participant implements [`Bindable`]: a name lookup returning a
//! [`PropertyCell`] and, optionally, a method table for commands. Host models
//! either implement the trait directly or use [`ObservableObject`], a
//! dictionary-backed implementation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::command::Method;
use crate::error::{CoreError, CoreResult};
use crate::property::PropertyCell;
use crate::value::Value;

/// Name-based access to an object's observable state.
pub trait Bindable: Send + Sync + 'static {
    /// Look up a property cell.
    fn property(&self, name: &str) -> Option<PropertyCell>;

    /// Look up a method for command binding.
    fn method(&self, name: &str) -> Option<Method> {
        let _ = name;
        None
    }

    /// A key describing the object's type, used for implicit template selection.
    fn type_key(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A shared reference to a bindable model object.
pub type ObjectRef = Arc<dyn Bindable>;

/// A model object whose properties and methods are registered at runtime.
pub struct ObservableObject {
    type_key: String,
    properties: RwLock<BTreeMap<String, PropertyCell>>,
    methods: RwLock<HashMap<String, Method>>,
}

impl ObservableObject {
    /// Create an empty object reporting `type_key`.
    pub fn new(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            properties: RwLock::new(BTreeMap::new()),
            methods: RwLock::new(HashMap::new()),
        }
    }

    /// Builder form of [`define`](Self::define).
    pub fn with_property(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.define(name, value);
        self
    }

    /// Builder form of [`define_method`](Self::define_method).
    pub fn with_method(self, name: impl Into<String>, method: Method) -> Self {
        self.define_method(name, method);
        self
    }

    /// Add a property, or return the existing cell if the name is taken.
    pub fn define(&self, name: impl Into<String>, value: impl Into<Value>) -> PropertyCell {
        self.properties
            .write()
            .entry(name.into())
            .or_insert_with(|| PropertyCell::new(value))
            .clone()
    }

    /// Add or replace a method.
    pub fn define_method(&self, name: impl Into<String>, method: Method) {
        self.methods.write().insert(name.into(), method);
    }

    /// Set a property by name. Returns whether the value changed.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> CoreResult<bool> {
        let cell = self.property(name).ok_or_else(|| CoreError::PropertyNotFound {
            name: name.to_string(),
        })?;
        Ok(cell.set(value))
    }

    /// Read a property by name.
    pub fn get(&self, name: &str) -> CoreResult<Value> {
        self.property(name)
            .map(|cell| cell.get())
            .ok_or_else(|| CoreError::PropertyNotFound {
                name: name.to_string(),
            })
    }

    /// Property names in sorted order.
    pub fn property_names(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }

    /// Wrap into a shared [`ObjectRef`].
    pub fn into_ref(self) -> ObjectRef {
        Arc::new(self)
    }
}

impl Bindable for ObservableObject {
    fn property(&self, name: &str) -> Option<PropertyCell> {
        self.properties.read().get(name).cloned()
    }

    fn method(&self, name: &str) -> Option<Method> {
        self.methods.read().get(name).cloned()
    }

    fn type_key(&self) -> &str {
        &self.type_key
    }
}

impl fmt::Debug for ObservableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableObject")
            .field("type_key", &self.type_key)
            .field("properties", &self.property_names())
            .finish()
    }
}
