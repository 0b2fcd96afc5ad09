//! Resource dictionaries and name scopes.
//!
//! A [`ResourceDictionary`] is a string-keyed store of [`Value`]s plus a name
//! table. Both are looked up through a chain of non-owning parent scopes:
//! a miss in one dictionary continues in its parent, and the nearest match
//! wins.
//!
//! Dictionaries can pull in other dictionaries. [`ResourceDictionary::initialize`]
//! merges the declared merged dictionaries in order and then the dictionary
//! loaded from `source`, each merge overriding keys set before it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::copy::{CopyManager, DeepCopy, ExternalRefs, deep_copy_graph};
use crate::element::{Shared, WeakShared};
use crate::error::{CoreError, CoreResult};
use crate::logging::targets;
use crate::signal::Signal;
use crate::value::Value;

/// Resolves `Source` references to already-parsed skin objects.
///
/// Implemented by the host. Returned values are treated as read-only
/// originals; the engine copies them before use.
pub trait SkinSource: Send + Sync {
    /// Load the object at `path`.
    fn load(&self, path: &str) -> CoreResult<Value>;
}

/// A [`SkinSource`] backed by an in-memory map.
#[derive(Default)]
pub struct MemorySkinSource {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemorySkinSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `path`.
    pub fn insert(&self, path: impl Into<String>, value: impl Into<Value>) {
        self.entries.write().insert(path.into(), value.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(path, value);
        self
    }
}

impl SkinSource for MemorySkinSource {
    fn load(&self, path: &str) -> CoreResult<Value> {
        self.entries
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| CoreError::SourceNotFound {
                path: path.to_string(),
            })
    }
}

/// A keyed resource store and name scope.
#[derive(Default)]
pub struct ResourceDictionary {
    resources: HashMap<String, Value>,
    names: HashMap<String, Value>,
    merged: Vec<Shared<ResourceDictionary>>,
    source: Option<String>,
    parent: WeakShared<ResourceDictionary>,
    initialized: bool,
    resources_changed: Signal<()>,
}

impl ResourceDictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder form of [`add_merged`](Self::add_merged).
    pub fn with_merged(mut self, dictionary: Shared<ResourceDictionary>) -> Self {
        self.add_merged(dictionary);
        self
    }

    /// Builder form of [`set_source`](Self::set_source).
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.set_source(source);
        self
    }

    /// Insert or replace a resource. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.resources.insert(key.into(), value.into())
    }

    /// Get a resource from this dictionary only.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.resources.get(key).cloned()
    }

    /// Remove a resource.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.resources.remove(key)
    }

    /// Whether this dictionary holds `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.resources.contains_key(key)
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether there are no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resource keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Iterate over resources.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Register `instance` under `name`.
    ///
    /// Registering the same instance again is a no-op; a different instance
    /// under a taken name is [`CoreError::DuplicateName`].
    pub fn register_name(&mut self, name: impl Into<String>, instance: Value) -> CoreResult<()> {
        let name = name.into();
        match self.names.get(&name) {
            Some(existing) if *existing == instance => Ok(()),
            Some(_) => {
                tracing::warn!(target: targets::TREE, %name, "duplicate name in scope");
                Err(CoreError::DuplicateName { name })
            }
            None => {
                self.names.insert(name, instance);
                Ok(())
            }
        }
    }

    /// Remove a name registration. Returns whether it existed.
    pub fn unregister_name(&mut self, name: &str) -> bool {
        self.names.remove(name).is_some()
    }

    /// Find a named instance here or in the nearest enclosing scope.
    pub fn find_name(&self, name: &str) -> Option<Value> {
        if let Some(found) = self.names.get(name) {
            return Some(found.clone());
        }
        self.parent.upgrade().and_then(|p| p.read().find_name(name))
    }

    /// Find a resource here or in the nearest enclosing scope.
    pub fn find_resource(&self, key: &str) -> Option<Value> {
        if let Some(found) = self.resources.get(key) {
            return Some(found.clone());
        }
        self.parent.upgrade().and_then(|p| p.read().find_resource(key))
    }

    /// Like [`find_resource`](Self::find_resource), failing with [`CoreError::ResourceNotFound`].
    pub fn require_resource(&self, key: &str) -> CoreResult<Value> {
        self.find_resource(key).ok_or_else(|| CoreError::ResourceNotFound {
            key: key.to_string(),
        })
    }

    /// Chain this scope to `parent`.
    pub fn set_parent_scope(&mut self, parent: &Shared<ResourceDictionary>) {
        self.parent = Arc::downgrade(parent);
    }

    /// Detach from the parent scope.
    pub fn clear_parent_scope(&mut self) {
        self.parent = Weak::new();
    }

    /// The parent scope, if it is still alive.
    pub fn parent_scope(&self) -> Option<Shared<ResourceDictionary>> {
        self.parent.upgrade()
    }

    /// Declare a merged dictionary, applied by [`initialize`](Self::initialize).
    pub fn add_merged(&mut self, dictionary: Shared<ResourceDictionary>) {
        self.merged.push(dictionary);
    }

    /// The declared merged dictionaries, in order.
    pub fn merged_dictionaries(&self) -> &[Shared<ResourceDictionary>] {
        &self.merged
    }

    /// The `Source` path, if declared.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Declare a file-backed dictionary merged last by [`initialize`](Self::initialize).
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = Some(source.into());
    }

    /// Signal emitted after the dictionary's contents were merged.
    pub fn resources_changed(&self) -> &Signal<()> {
        &self.resources_changed
    }

    /// Move all entries of `other` into this dictionary.
    ///
    /// Resources from `other` replace existing keys. Names replace existing
    /// names only when `overwrite_names` is set.
    pub fn take_over(&mut self, other: ResourceDictionary, overwrite_names: bool) {
        self.resources.extend(other.resources);
        for (name, instance) in other.names {
            if overwrite_names || !self.names.contains_key(&name) {
                self.names.insert(name, instance);
            }
        }
    }

    /// Merge a copy of `dictionary` into this one; its keys override ours.
    ///
    /// The copy is cut from `dictionary`'s parent scope.
    pub fn merge(&mut self, dictionary: &Shared<ResourceDictionary>) {
        let copy = deep_copy_graph(dictionary, ExternalRefs::Cut);
        let taken = std::mem::take(&mut *copy.write());
        tracing::trace!(target: targets::TREE, entries = taken.len(), "merging resource dictionary");
        self.take_over(taken, true);
    }

    /// Resolve merged dictionaries and `source`, once.
    ///
    /// Declared merged dictionaries are merged in order, then the `source`
    /// dictionary; later merges override earlier keys. The declared
    /// dictionaries are left untouched: each is copied and the copy is
    /// initialized and merged. A dictionary that reaches itself again fails
    /// with [`CoreError::CircularDictionary`].
    pub fn initialize(&mut self, skin_source: &dyn SkinSource) -> CoreResult<()> {
        let mut chain = vec![self as *const Self];
        self.initialize_chain(skin_source, &mut chain)
    }

    fn initialize_chain(&mut self, skin_source: &dyn SkinSource, chain: &mut Vec<*const Self>) -> CoreResult<()> {
        if self.initialized {
            return Ok(());
        }
        for (index, dictionary) in self.merged.clone().iter().enumerate() {
            let taken = Self::initialized_copy(dictionary, skin_source, chain, || format!("merged dictionary #{index}"))?;
            tracing::trace!(target: targets::TREE, entries = taken.len(), "merging resource dictionary");
            self.take_over(taken, true);
        }
        if let Some(path) = self.source.clone() {
            let loaded = skin_source.load(&path)?;
            let dictionary = match loaded {
                Value::Dictionary(d) => d,
                other => {
                    tracing::warn!(target: targets::TREE, %path, kind = other.kind().name(), "source is not a dictionary");
                    return Err(CoreError::NotADictionary { path });
                }
            };
            let taken = Self::initialized_copy(&dictionary, skin_source, chain, || format!("source '{path}'"))?;
            tracing::trace!(target: targets::TREE, %path, entries = taken.len(), "merging source dictionary");
            self.take_over(taken, true);
        }
        self.initialized = true;
        self.resources_changed.emit(());
        Ok(())
    }

    /// Copy `dictionary`, initialize the copy and hand back its contents.
    fn initialized_copy(
        dictionary: &Shared<ResourceDictionary>,
        skin_source: &dyn SkinSource,
        chain: &mut Vec<*const Self>,
        via: impl FnOnce() -> String,
    ) -> CoreResult<ResourceDictionary> {
        let original = dictionary.data_ptr() as *const Self;
        if chain.contains(&original) {
            let via = via();
            tracing::warn!(target: targets::TREE, %via, "resource dictionary includes itself");
            return Err(CoreError::CircularDictionary { via });
        }
        let copy = deep_copy_graph(dictionary, ExternalRefs::Cut);
        chain.push(original);
        let result = copy.write().initialize_chain(skin_source, chain);
        chain.pop();
        result?;
        Ok(std::mem::take(&mut *copy.write()))
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl DeepCopy for ResourceDictionary {
    fn empty_copy(&self) -> Self {
        ResourceDictionary::new()
    }

    fn deep_copy(&mut self, source: &Self, cm: &mut CopyManager) {
        self.resources = source
            .resources
            .iter()
            .map(|(k, v)| (k.clone(), cm.copy_value(v)))
            .collect();
        self.names = source
            .names
            .iter()
            .map(|(k, v)| (k.clone(), cm.copy_value(v)))
            .collect();
        // Merged dictionaries are shared, not copied.
        self.merged = source.merged.clone();
        self.source = source.source.clone();
        self.initialized = source.initialized;
        self.parent = cm.copy_weak(&source.parent);
    }
}

impl fmt::Debug for ResourceDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ResourceDictionary")
            .field("resources", &keys)
            .field("names", &self.names.len())
            .field("merged", &self.merged.len())
            .field("source", &self.source)
            .finish()
    }
}
