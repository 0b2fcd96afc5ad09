//! Data bindings between property cells.
//!
//! A binding links a source (a path resolved against a source root) to a
//! target [`PropertyCell`]. The declaration ([`BindingDecl`]) is part of the
//! skin object model and is copied with templates; the live link ([`Binding`])
//! is created when the declaring node is activated and disposed with it.
//!
//! # Propagation
//!
//! | Mode | Initial push | Source change | Target change |
//! |------|--------------|---------------|---------------|
//! | `OneWay` | source → target | → target | ignored |
//! | `TwoWay` | source → target | → target | → source |
//! | `OneWayToSource` | target → source | ignored | → source |
//! | `OneTime` | source → target | ignored | ignored |
//!
//! Each binding carries an update flag. While the binding is writing in one
//! direction, any write it would make in response to the resulting
//! notifications is dropped. Within one propagation pass the first write a
//! binding makes wins; the loop settles instead of ping-ponging.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::copy::CopyManager;
use crate::error::CoreResult;
use crate::logging::targets;
use crate::path::{PathTarget, PropertyPath};
use crate::property::{PropertyCell, SubscriberKey};
use crate::value::Value;

/// Direction of data flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingMode {
    /// Source to target, continuously.
    #[default]
    OneWay,
    /// Both directions.
    TwoWay,
    /// Target to source, continuously.
    OneWayToSource,
    /// Source to target once, then detached.
    OneTime,
}

impl BindingMode {
    fn follows_source(self) -> bool {
        matches!(self, Self::OneWay | Self::TwoWay)
    }

    fn follows_target(self) -> bool {
        matches!(self, Self::TwoWay | Self::OneWayToSource)
    }
}

/// Converts values flowing through a binding.
pub trait ValueConverter: Send + Sync {
    /// Convert a source value for the target. `None` means the value cannot be converted.
    fn convert(&self, value: &Value, parameter: Option<&Value>) -> Option<Value>;

    /// Convert a target value back for the source.
    fn convert_back(&self, value: &Value, parameter: Option<&Value>) -> Option<Value> {
        let _ = parameter;
        Some(value.clone())
    }
}

/// A [`ValueConverter`] built from a closure (forward direction only).
pub struct FnConverter<F>(pub F);

impl<F> ValueConverter for FnConverter<F>
where
    F: Fn(&Value, Option<&Value>) -> Option<Value> + Send + Sync,
{
    fn convert(&self, value: &Value, parameter: Option<&Value>) -> Option<Value> {
        (self.0)(value, parameter)
    }
}

/// Where a declared binding takes its source root from.
///
/// Everything except `Explicit` is resolved by the visual tree at activation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BindingSource {
    /// A fixed value or object.
    Explicit(Value),
    /// The element registered under this name in the enclosing name scope.
    ElementName(String),
    /// The nearest data context on the node or its ancestors.
    #[default]
    DataContext,
    /// The declaring node itself.
    RelativeSelf,
    /// The node the enclosing template was applied to.
    TemplatedParent,
    /// The `level`-th ancestor (1 = nearest) whose element kind is named `kind`.
    FindAncestor {
        /// Element kind name, e.g. `"ListItem"`.
        kind: String,
        /// Which matching ancestor to pick, starting at 1.
        level: usize,
    },
}

impl BindingSource {
    pub(crate) fn deep_copy(&self, cm: &mut CopyManager) -> Self {
        match self {
            Self::Explicit(v) => Self::Explicit(cm.copy_value(v)),
            other => other.clone(),
        }
    }
}

/// A declared binding, as produced by the skin loader.
#[derive(Clone)]
pub struct BindingDecl {
    /// The property on the declaring element that receives values.
    pub target_property: String,
    /// Where the source root comes from.
    pub source: BindingSource,
    /// Path from the source root to the source value.
    pub path: PropertyPath,
    /// Direction of data flow.
    pub mode: BindingMode,
    /// Optional converter.
    pub converter: Option<Arc<dyn ValueConverter>>,
    /// Parameter handed to the converter.
    pub converter_parameter: Option<Value>,
}

impl BindingDecl {
    /// Declare a binding of `target_property` to `path` on the data context.
    pub fn new(target_property: impl Into<String>, path: PropertyPath) -> Self {
        Self {
            target_property: target_property.into(),
            source: BindingSource::DataContext,
            path,
            mode: BindingMode::OneWay,
            converter: None,
            converter_parameter: None,
        }
    }

    /// Set the source.
    pub fn source(mut self, source: BindingSource) -> Self {
        self.source = source;
        self
    }

    /// Set the mode.
    pub fn mode(mut self, mode: BindingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the converter.
    pub fn converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Set the converter parameter.
    pub fn converter_parameter(mut self, parameter: impl Into<Value>) -> Self {
        self.converter_parameter = Some(parameter.into());
        self
    }

    pub(crate) fn deep_copy(&self, cm: &mut CopyManager) -> Self {
        Self {
            target_property: self.target_property.clone(),
            source: self.source.deep_copy(cm),
            path: self.path.clone(),
            mode: self.mode,
            converter: self.converter.clone(),
            converter_parameter: self.converter_parameter.as_ref().map(|p| cm.copy_value(p)),
        }
    }
}

impl fmt::Debug for BindingDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingDecl")
            .field("target_property", &self.target_property)
            .field("source", &self.source)
            .field("path", &self.path.to_string())
            .field("mode", &self.mode)
            .field("converter", &self.converter.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Observed {
    intermediates: Vec<PropertyCell>,
    leaf: Option<PathTarget>,
}

struct BindingInner {
    decl: BindingDecl,
    root: Value,
    target: PropertyCell,
    source_key: SubscriberKey,
    target_key: SubscriberKey,
    observed: Mutex<Observed>,
    updating: AtomicBool,
    disposed: AtomicBool,
}

/// Resets the update flag when a propagation step ends.
struct UpdateGuard<'a>(&'a AtomicBool);

impl<'a> UpdateGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A live binding. Dropping it detaches it from every cell it observes.
pub struct Binding {
    inner: Arc<BindingInner>,
}

impl Binding {
    /// Resolve `decl.path` against `source_root`, subscribe, and push the initial value.
    ///
    /// Fails with [`CoreError::PathUnresolved`] when the path cannot be walked and
    /// no observable step exists that could make it resolvable later.
    pub fn initialize(decl: BindingDecl, source_root: Value, target: PropertyCell) -> CoreResult<Self> {
        let inner = Arc::new(BindingInner {
            decl,
            root: source_root,
            target,
            source_key: SubscriberKey::next(),
            target_key: SubscriberKey::next(),
            observed: Mutex::new(Observed::default()),
            updating: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        });

        let resolved = inner.decl.path.resolve(&inner.root);
        if let Err(e) = &resolved.leaf {
            if resolved.intermediates.is_empty() {
                tracing::debug!(
                    target: targets::BINDING,
                    path = %inner.decl.path,
                    target_property = %inner.decl.target_property,
                    "binding source path unresolved"
                );
                return Err(e.clone());
            }
            tracing::trace!(target: targets::BINDING, path = %inner.decl.path, "binding waiting for source");
        }

        let mode = inner.decl.mode;
        if mode == BindingMode::OneTime {
            if let Ok(leaf) = &resolved.leaf {
                inner.push_to_target(leaf.value());
            }
            inner.disposed.store(true, Ordering::Release);
            return Ok(Self { inner });
        }

        inner.observe(resolved.intermediates, resolved.leaf.ok());
        if mode.follows_target() {
            let weak = Arc::downgrade(&inner);
            inner.target.subscribe(inner.target_key, move |_| {
                // Re-read: a nested write may have landed after this notification was sent.
                if let Some(inner) = weak.upgrade() {
                    inner.push_to_source(inner.target.get());
                }
            });
        }

        if mode == BindingMode::OneWayToSource {
            inner.push_to_source(inner.target.get());
        } else {
            inner.push_current_source();
        }
        tracing::trace!(
            target: targets::BINDING,
            path = %inner.decl.path,
            target_property = %inner.decl.target_property,
            ?mode,
            "binding initialized"
        );
        Ok(Self { inner })
    }

    /// The binding's declaration.
    pub fn decl(&self) -> &BindingDecl {
        &self.inner.decl
    }

    /// The direction of data flow.
    pub fn mode(&self) -> BindingMode {
        self.inner.decl.mode
    }

    /// The target cell.
    pub fn target(&self) -> &PropertyCell {
        &self.inner.target
    }

    /// The cell currently at the end of the source path, if any.
    pub fn source_cell(&self) -> Option<PropertyCell> {
        self.inner
            .observed
            .lock()
            .leaf
            .as_ref()
            .and_then(|leaf| leaf.cell().cloned())
    }

    /// Push the current source value to the target now.
    pub fn update_target(&self) {
        self.inner.push_current_source();
    }

    /// Push the current target value to the source now.
    pub fn update_source(&self) {
        self.inner.push_to_source(self.inner.target.get());
    }

    /// Whether the binding has been detached.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Detach from all observed cells. Further changes are not propagated.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.unobserve();
        self.inner.target.unsubscribe(self.inner.target_key);
        tracing::trace!(target: targets::BINDING, path = %self.inner.decl.path, "binding disposed");
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("decl", &self.inner.decl)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl BindingInner {
    fn observe(self: &Arc<Self>, intermediates: Vec<PropertyCell>, leaf: Option<PathTarget>) {
        for cell in &intermediates {
            let weak: Weak<Self> = Arc::downgrade(self);
            cell.subscribe(self.source_key, move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.reresolve();
                }
            });
        }
        if self.decl.mode.follows_source() {
            if let Some(cell) = leaf.as_ref().and_then(PathTarget::cell) {
                let weak: Weak<Self> = Arc::downgrade(self);
                cell.subscribe(self.source_key, move |_| {
                    if let Some(inner) = weak.upgrade() {
                        inner.push_current_source();
                    }
                });
            }
        }
        *self.observed.lock() = Observed { intermediates, leaf };
    }

    fn unobserve(&self) {
        let old = std::mem::take(&mut *self.observed.lock());
        for cell in &old.intermediates {
            cell.unsubscribe(self.source_key);
        }
        if let Some(cell) = old.leaf.as_ref().and_then(PathTarget::cell) {
            cell.unsubscribe(self.source_key);
        }
    }

    /// An intermediate step changed: walk the path again and push the new leaf.
    fn reresolve(self: &Arc<Self>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.unobserve();
        let resolved = self.decl.path.resolve(&self.root);
        if resolved.leaf.is_err() {
            tracing::trace!(target: targets::BINDING, path = %self.decl.path, "binding source went away");
        }
        self.observe(resolved.intermediates, resolved.leaf.ok());
        if self.decl.mode == BindingMode::OneWayToSource {
            self.push_to_source(self.target.get());
        } else {
            self.push_current_source();
        }
    }

    fn push_current_source(&self) {
        let value = self.observed.lock().leaf.as_ref().map(PathTarget::value);
        if let Some(value) = value {
            self.push_to_target(value);
        }
    }

    fn push_to_target(&self, value: Value) {
        let Some(_guard) = UpdateGuard::enter(&self.updating) else {
            tracing::trace!(target: targets::BINDING, path = %self.decl.path, "re-entrant target write dropped");
            return;
        };
        let converted = match &self.decl.converter {
            Some(converter) => converter.convert(&value, self.decl.converter_parameter.as_ref()),
            None => Some(value),
        };
        match converted {
            Some(v) => {
                self.target.set(v);
            }
            None => tracing::debug!(
                target: targets::BINDING,
                path = %self.decl.path,
                "conversion failed, target left unchanged"
            ),
        }
    }

    fn push_to_source(&self, value: Value) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let Some(_guard) = UpdateGuard::enter(&self.updating) else {
            tracing::trace!(target: targets::BINDING, path = %self.decl.path, "re-entrant source write dropped");
            return;
        };
        let cell = self.observed.lock().leaf.as_ref().and_then(|l| l.cell().cloned());
        let Some(cell) = cell else {
            tracing::trace!(target: targets::BINDING, path = %self.decl.path, "source not writable");
            return;
        };
        let converted = match &self.decl.converter {
            Some(converter) => converter.convert_back(&value, self.decl.converter_parameter.as_ref()),
            None => Some(value),
        };
        match converted {
            Some(v) => {
                cell.set(v);
            }
            None => tracing::debug!(
                target: targets::BINDING,
                path = %self.decl.path,
                "back conversion failed, source left unchanged"
            ),
        }
    }
}

/// Bind `target` to `path` on `object` without going through a visual tree.
pub fn bind_to_object(
    target: PropertyCell,
    object: Value,
    path: &str,
    mode: BindingMode,
) -> CoreResult<Binding> {
    let path = PropertyPath::parse(path)?;
    Binding::initialize(BindingDecl::new("", path).mode(mode), object, target)
}
