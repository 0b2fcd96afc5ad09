//! Observable property cells.
//!
//! A [`PropertyCell`] is the unit of state in the skin engine: one value slot
//! with a type tag and an ordered list of change subscribers. Bindings and
//! triggers observe cells, element attributes live in cells, and model objects
//! expose their state as cells through [`Bindable`](crate::Bindable).
//!
//! # Notification rules
//!
//! - Setting a value equal to the current one does nothing and notifies no one.
//! - Otherwise every subscriber is called synchronously, in registration order,
//!   with the new value. The value lock is released before notification, so a
//!   subscriber may read or write the cell again.
//! - Subscribing twice under the same [`SubscriberKey`] keeps one subscription.
//!
//! # Example
//!
//! ```
//! use skin_engine_core::{PropertyCell, Value};
//!
//! let title = PropertyCell::new("Episode 1");
//! let sub = title.on_change(|v| println!("title is now {v:?}"));
//!
//! assert!(title.set("Episode 2"));
//! assert!(!title.set("Episode 2"));
//! assert_eq!(title.get(), Value::from("Episode 2"));
//! drop(sub);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::error::{CoreError, CoreResult};
use crate::logging::targets;
use crate::signal::{ConnectionId, Signal};
use crate::thread_check::ThreadAffinity;
use crate::value::{Value, ValueKind};

/// Identifies one subscriber across subscribe/unsubscribe calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberKey(u64);

impl SubscriberKey {
    /// Allocate a process-unique key.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

struct CellInner {
    type_tag: ValueKind,
    value: RwLock<Value>,
    changed: Signal<Value>,
    subscribers: Mutex<HashMap<SubscriberKey, ConnectionId>>,
    affinity: ThreadAffinity,
}

/// A shared, observable value slot.
///
/// Cloning a `PropertyCell` clones the handle; both handles address the same
/// slot.
#[derive(Clone)]
pub struct PropertyCell {
    inner: Arc<CellInner>,
}

impl PropertyCell {
    /// Create an untyped cell holding `value`.
    pub fn new(value: impl Into<Value>) -> Self {
        Self::typed(ValueKind::Any, value)
    }

    /// Create a cell that only accepts values of `kind` through [`try_set`](Self::try_set).
    pub fn typed(kind: ValueKind, value: impl Into<Value>) -> Self {
        Self {
            inner: Arc::new(CellInner {
                type_tag: kind,
                value: RwLock::new(value.into()),
                changed: Signal::new(),
                subscribers: Mutex::new(HashMap::new()),
                affinity: ThreadAffinity::current(),
            }),
        }
    }

    /// The declared kind of this cell.
    pub fn type_tag(&self) -> ValueKind {
        self.inner.type_tag
    }

    /// Clone out the current value.
    pub fn get(&self) -> Value {
        self.inner.value.read().clone()
    }

    /// Inspect the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Whether two handles address the same slot.
    pub fn ptr_eq(&self, other: &PropertyCell) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Store `value` and notify subscribers if it differs from the current value.
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        self.inner.affinity.check("PropertyCell::set");
        {
            let mut current = self.inner.value.write();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }
        tracing::trace!(target: targets::PROPERTY, new = ?value, "property changed");
        self.inner.changed.emit(value);
        true
    }

    /// Like [`set`](Self::set), but rejects values the type tag does not accept.
    pub fn try_set(&self, value: impl Into<Value>) -> CoreResult<bool> {
        let value = value.into();
        if !self.inner.type_tag.accepts(value.kind()) {
            return Err(CoreError::TypeMismatch {
                expected: self.inner.type_tag.name(),
                got: value.kind().name(),
            });
        }
        Ok(self.set(value))
    }

    /// Store `value` without notifying anyone.
    pub fn set_silent(&self, value: impl Into<Value>) {
        *self.inner.value.write() = value.into();
    }

    /// Subscribe under `key`. A second subscription under the same key is ignored.
    pub fn subscribe<F>(&self, key: SubscriberKey, f: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut subscribers = self.inner.subscribers.lock();
        if subscribers.contains_key(&key) {
            return;
        }
        let id = self.inner.changed.connect(f);
        subscribers.insert(key, id);
    }

    /// Remove the subscription under `key`. Returns `false` if there was none.
    pub fn unsubscribe(&self, key: SubscriberKey) -> bool {
        let removed = self.inner.subscribers.lock().remove(&key);
        match removed {
            Some(id) => self.inner.changed.disconnect(id),
            None => false,
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Subscribe with a fresh key and return a guard that unsubscribes on drop.
    pub fn on_change<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let key = SubscriberKey::next();
        self.subscribe(key, f);
        Subscription {
            cell: Arc::downgrade(&self.inner),
            key,
        }
    }

    /// A non-owning handle to this cell.
    pub fn downgrade(&self) -> WeakPropertyCell {
        WeakPropertyCell(Arc::downgrade(&self.inner))
    }
}

impl fmt::Debug for PropertyCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCell")
            .field("type_tag", &self.inner.type_tag)
            .field("value", &*self.inner.value.read())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// A non-owning handle to a cell.
#[derive(Clone)]
pub struct WeakPropertyCell(Weak<CellInner>);

impl WeakPropertyCell {
    /// The cell, if it is still alive.
    pub fn upgrade(&self) -> Option<PropertyCell> {
        self.0.upgrade().map(|inner| PropertyCell { inner })
    }
}

/// Unsubscribes from its cell when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cell: Weak<CellInner>,
    key: SubscriberKey,
}

impl Subscription {
    /// The key this subscription was registered under.
    pub fn key(&self) -> SubscriberKey {
        self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.cell.upgrade() {
            PropertyCell { inner }.unsubscribe(self.key);
        }
    }
}

static_assertions::assert_impl_all!(PropertyCell: Send, Sync, Clone);
