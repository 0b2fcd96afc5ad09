//! Deep copying of skin object graphs.
//!
//! Every use of a template gets its own, independent copy of the template's
//! element graph. A [`CopyManager`] lives for exactly one copy operation and
//! memoizes every object it has copied, keyed by the source's address:
//!
//! - an object reachable twice from the root is copied once, and both
//!   references in the copy point at that one copy;
//! - reference cycles terminate, because the copy is memoized *before* its
//!   fields are filled in;
//! - weak back references ([`WeakShared`]) into the copied graph are rewritten
//!   to point at the copies.
//!
//! Weak references to objects outside the copied graph are handled according
//! to [`ExternalRefs`].
//!
//! ```
//! use skin_engine_core::copy::{deep_copy_graph, ExternalRefs};
//! use skin_engine_core::element::{shared, Element, ElementKind};
//!
//! let label = shared(Element::new(ElementKind::Label).with_property("Text", "Hello"));
//! let copy = deep_copy_graph(&label, ExternalRefs::Cut);
//! assert!(!std::sync::Arc::ptr_eq(&label, &copy));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::element::{Shared, WeakShared, shared};
use crate::logging::targets;
use crate::value::Value;

/// An object that can be copied by a [`CopyManager`].
///
/// Copying happens in two steps so that the manager can memoize the new object
/// before its fields, which may refer back to it, are copied.
pub trait DeepCopy: Any + Send + Sync {
    /// Create a blank instance to be filled by [`deep_copy`](Self::deep_copy).
    fn empty_copy(&self) -> Self
    where
        Self: Sized;

    /// Fill `self` from `source`, obtaining copies of referenced objects from `cm`.
    fn deep_copy(&mut self, source: &Self, cm: &mut CopyManager);
}

/// What to do with weak references to objects outside the copied graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExternalRefs {
    /// Keep pointing at the original object.
    #[default]
    Keep,
    /// Drop the reference.
    Cut,
}

/// Memoizing copier for one copy operation.
pub struct CopyManager {
    memo: HashMap<usize, Box<dyn Any + Send + Sync>>,
    external: ExternalRefs,
}

impl CopyManager {
    /// Create a manager with the given external reference policy.
    pub fn new(external: ExternalRefs) -> Self {
        Self {
            memo: HashMap::new(),
            external,
        }
    }

    /// The external reference policy.
    pub fn external_refs(&self) -> ExternalRefs {
        self.external
    }

    /// Number of distinct objects copied so far.
    pub fn copied(&self) -> usize {
        self.memo.len()
    }

    fn key<T>(source: &Shared<T>) -> usize {
        Arc::as_ptr(source) as *const () as usize
    }

    fn lookup<T: DeepCopy>(&self, key: usize) -> Option<Shared<T>> {
        self.memo
            .get(&key)
            .and_then(|copy| copy.downcast_ref::<Shared<T>>())
            .cloned()
    }

    /// Get the copy of `source`, copying it if this manager has not seen it yet.
    pub fn copy<T: DeepCopy>(&mut self, source: &Shared<T>) -> Shared<T> {
        let key = Self::key(source);
        if let Some(existing) = self.lookup::<T>(key) {
            return existing;
        }

        let target = shared(source.read().empty_copy());
        self.memo.insert(key, Box::new(target.clone()));
        {
            let src = source.read();
            let mut dst = target.write();
            dst.deep_copy(&src, self);
        }
        target
    }

    /// Rewrite a weak reference into the new graph.
    ///
    /// Targets already copied by this manager map to their copies. Anything
    /// else is treated as external.
    pub fn copy_weak<T: DeepCopy>(&mut self, source: &WeakShared<T>) -> WeakShared<T> {
        let Some(target) = source.upgrade() else {
            return Weak::new();
        };
        if let Some(copy) = self.lookup::<T>(Self::key(&target)) {
            return Arc::downgrade(&copy);
        }
        match self.external {
            ExternalRefs::Keep => source.clone(),
            ExternalRefs::Cut => {
                tracing::trace!(target: targets::COPY, "cutting external back reference");
                Weak::new()
            }
        }
    }

    /// Copy a value: skin sub-graphs are copied, model objects and templates shared.
    pub fn copy_value(&mut self, value: &Value) -> Value {
        match value {
            Value::Element(e) => Value::Element(self.copy(e)),
            Value::Dictionary(d) => Value::Dictionary(self.copy(d)),
            Value::Command(c) => Value::Command(Box::new(c.deep_copy(self))),
            Value::List(items) => Value::List(items.iter().map(|v| self.copy_value(v)).collect()),
            other => other.clone(),
        }
    }
}

/// Copy the graph rooted at `root` with a fresh [`CopyManager`].
pub fn deep_copy_graph<T: DeepCopy>(root: &Shared<T>, external: ExternalRefs) -> Shared<T> {
    let mut cm = CopyManager::new(external);
    let copy = cm.copy(root);
    tracing::debug!(target: targets::COPY, objects = cm.copied(), "deep copy complete");
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindable::ObservableObject;
    use crate::binding::BindingSource;
    use crate::command::{CommandDecl, CommandParameter};
    use crate::element::{Element, ElementKind};
    use crate::path::PropertyPath;

    #[test]
    fn test_shared_reference_preserved() {
        let brush = shared(Element::new(ElementKind::Image).with_property("Source", "bg.png"));
        let root = shared(
            Element::new(ElementKind::Panel)
                .with_property("Background", brush.clone())
                .with_property("Border", brush.clone()),
        );

        let copy = deep_copy_graph(&root, ExternalRefs::Cut);
        let copied = copy.read();
        let background = copied.property("Background").unwrap().as_element().unwrap().clone();
        let border = copied.property("Border").unwrap().as_element().unwrap().clone();

        assert!(Arc::ptr_eq(&background, &border));
        assert!(!Arc::ptr_eq(&background, &brush));
        assert_eq!(background.read().property("Source"), Some(&Value::from("bg.png")));
    }

    #[test]
    fn test_cycle_terminates_and_is_preserved() {
        let a = shared(Element::new(ElementKind::Panel).named("A"));
        let b = shared(Element::new(ElementKind::Panel).named("B"));
        a.write().properties.insert("Peer".into(), Value::Element(b.clone()));
        b.write().properties.insert("Peer".into(), Value::Element(a.clone()));

        let mut cm = CopyManager::new(ExternalRefs::Keep);
        let a2 = cm.copy(&a);
        assert_eq!(cm.copied(), 2);

        let b2 = a2.read().property("Peer").unwrap().as_element().unwrap().clone();
        let back = b2.read().property("Peer").unwrap().as_element().unwrap().clone();
        assert!(Arc::ptr_eq(&back, &a2));
        assert!(!Arc::ptr_eq(&b2, &b));
        assert_eq!(b2.read().name.as_deref(), Some("B"));

        // Break the originals' cycle so the test does not leak.
        a.write().properties.clear();
        a2.write().properties.clear();
    }

    #[test]
    fn test_back_references_rewritten() {
        let root = shared(Element::new(ElementKind::StackPanel {
            orientation: Default::default(),
        }));
        let child = shared(Element::new(ElementKind::Label));
        Element::add_child(&root, child);

        let copy = deep_copy_graph(&root, ExternalRefs::Keep);
        let new_child = copy.read().children[0].clone();
        let parent = new_child.read().logical_parent.upgrade().unwrap();
        assert!(Arc::ptr_eq(&parent, &copy));
    }

    #[test]
    fn test_external_reference_policy() {
        let outer = shared(Element::new(ElementKind::Panel));
        let inner = shared(Element::new(ElementKind::Label));
        Element::add_child(&outer, inner.clone());

        let kept = deep_copy_graph(&inner, ExternalRefs::Keep);
        let parent = kept.read().logical_parent.upgrade().unwrap();
        assert!(Arc::ptr_eq(&parent, &outer));

        let cut = deep_copy_graph(&inner, ExternalRefs::Cut);
        assert!(cut.read().logical_parent.upgrade().is_none());
    }

    #[test]
    fn test_command_values_follow_the_copy() {
        let root = shared(Element::new(ElementKind::Panel));
        let player = shared(Element::new(ElementKind::Button));
        Element::add_child(&root, player.clone());
        let command = CommandDecl::method(
            BindingSource::Explicit(Value::Element(player.clone())),
            PropertyPath::default(),
            "Play",
        )
        .with_parameter(CommandParameter::Value(Value::from(CommandDecl::direct(|_| {}))));
        root.write().properties.insert("OnPlay".into(), Value::from(command));

        let copy = deep_copy_graph(&root, ExternalRefs::Cut);
        let copy = copy.read();
        let copied_player = copy.children[0].clone();
        let decl = copy.property("OnPlay").unwrap().as_command().unwrap();
        assert_eq!(
            decl.target_source(),
            Some(&BindingSource::Explicit(Value::Element(copied_player)))
        );
        assert_ne!(
            decl.target_source(),
            Some(&BindingSource::Explicit(Value::Element(player)))
        );
        assert!(matches!(
            &decl.parameter,
            Some(CommandParameter::Value(Value::Command(_)))
        ));
    }

    #[test]
    fn test_model_objects_are_shared() {
        let model = ObservableObject::new("Item").into_ref();
        let root = shared(Element::new(ElementKind::Label).with_property("DataContext", model.clone()));
        let copy = deep_copy_graph(&root, ExternalRefs::Cut);
        assert_eq!(copy.read().property("DataContext"), Some(&Value::Object(model)));
    }
}
