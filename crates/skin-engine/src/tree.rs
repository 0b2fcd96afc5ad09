//! The live visual tree.
//!
//! A [`VisualTree`] is an arena of nodes built from parsed skin [`Element`]s.
//! Parents own their children through the arena; every other reference
//! (templated parent, named lookup results, focus) is a [`NodeId`] that may
//! go stale and is checked on use.
//!
//! # Mounting and activation
//!
//! Mounting an element creates one node per element in its sub-graph,
//! registers names in the enclosing name scope and copies literal properties
//! into observable cells. Declared bindings, commands and triggers are
//! *activated* separately: immediately when [`EngineConfig::lazy_bindings`]
//! is off, otherwise once the subtree joins the live tree (see
//! [`set_root`](VisualTree::set_root) and
//! [`attach_to_live_root`](VisualTree::attach_to_live_root)). A template can
//! therefore be instantiated and parked without its bindings firing against
//! an incomplete context.
//!
//! # Data context
//!
//! Every node carries a `DataContext` cell. A node without an explicit data
//! context follows its parent's cell for as long as it stays inheriting, so a
//! change anywhere up the chain (including one made by a binding) reaches
//! every inheriting descendant. A binding declared with
//! [`BindingSource::DataContext`] is rooted at the node itself and observes
//! `DataContext` as the first step of its path. A node whose own
//! `DataContext` is bound counts as explicit; such a binding starts from the
//! parent's data context.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use slotmap::{Key, KeyData, SlotMap, new_key_type};

use skin_engine_core::logging::targets;
use skin_engine_core::{
    Bindable, Binding, BindingSource, BoundCommand, CommandDecl, CommandParameter, CoreError,
    Element, ElementKind, EngineConfig, ExternalRefs, MemorySkinSource, ObjectRef, PropertyCell,
    PropertyPath, ResourceDictionary, Shared, SkinSource, Subscription, Trigger, TriggerAction,
    Value, deep_copy_graph, shared,
};
use skin_engine_render::{BatchCompiler, PrimitiveId, Rect, RenderPrimitive};

use crate::error::{SkinError, SkinResult};

/// The inherited data context of a node.
pub const DATA_CONTEXT: &str = "DataContext";
/// Set to `true` on the node holding focus.
pub const HAS_FOCUS: &str = "HasFocus";
/// Visibility flag; mirrors [`VisualTree::set_visible`].
pub const IS_VISIBLE: &str = "IsVisible";
/// Disabled nodes and their subtrees never take focus.
pub const IS_ENABLED: &str = "IsEnabled";

new_key_type! {
    /// A handle to a node in a [`VisualTree`].
    ///
    /// Handles stay valid until the node is destroyed.
    pub struct NodeId;
}

impl NodeId {
    /// Convert to a raw `u64`, the form stored in name scopes.
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.data().as_ffi()
    }

    /// Rebuild a handle from [`as_raw`](Self::as_raw). Does not check that the node exists.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self::from(KeyData::from_ffi(raw))
    }
}

/// The observable properties of one node.
///
/// This is what bindings and commands see when their source is a node
/// (`RelativeSelf`, `ElementName`, `TemplatedParent`, `FindAncestor`).
pub struct NodeProperties {
    id: NodeId,
    kind: &'static str,
    cells: RwLock<BTreeMap<String, PropertyCell>>,
}

impl NodeProperties {
    fn new(id: NodeId, kind: &'static str, literals: &BTreeMap<String, Value>) -> Self {
        let mut cells: BTreeMap<String, PropertyCell> = literals
            .iter()
            .map(|(name, value)| (name.clone(), PropertyCell::new(value.clone())))
            .collect();
        cells
            .entry(DATA_CONTEXT.to_string())
            .or_insert_with(|| PropertyCell::new(Value::Null));
        Self {
            id,
            kind,
            cells: RwLock::new(cells),
        }
    }

    /// The node these properties belong to.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The cell for `name`, created holding `Null` if the node has none yet.
    pub fn cell(&self, name: &str) -> PropertyCell {
        if let Some(cell) = self.cells.read().get(name) {
            return cell.clone();
        }
        self.cells
            .write()
            .entry(name.to_string())
            .or_insert_with(|| PropertyCell::new(Value::Null))
            .clone()
    }

    /// Names of all cells, sorted.
    pub fn names(&self) -> Vec<String> {
        self.cells.read().keys().cloned().collect()
    }
}

impl Bindable for NodeProperties {
    fn property(&self, name: &str) -> Option<PropertyCell> {
        self.cells.read().get(name).cloned()
    }

    fn type_key(&self) -> &str {
        self.kind
    }
}

impl fmt::Debug for NodeProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeProperties")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

/// A trigger action with its target resolved.
enum PreparedAction {
    Set(PropertyCell, Value),
    Invoke(BoundCommand),
}

impl PreparedAction {
    fn run(&self) {
        match self {
            Self::Set(cell, value) => {
                cell.set(value.clone());
            }
            Self::Invoke(command) => command.execute(None),
        }
    }
}

struct VisualNode {
    kind: ElementKind,
    name: Option<String>,
    element: Shared<Element>,
    properties: Arc<NodeProperties>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// The name scope this node opens, if any.
    scope: Option<Shared<ResourceDictionary>>,
    /// The scope holding this node's name.
    registered_in: Option<Shared<ResourceDictionary>>,
    templated_parent: Option<NodeId>,
    explicit_data_context: bool,
    /// Keeps an inheriting node's `DataContext` in step with its parent's.
    data_context_link: Option<Subscription>,
    focusable: bool,
    visible: bool,
    bounds: Rect,
    activated: bool,
    bindings: Vec<Binding>,
    commands: BTreeMap<String, BoundCommand>,
    triggers: Vec<Subscription>,
    primitives: Vec<RenderPrimitive>,
    live_primitives: Vec<PrimitiveId>,
}

#[derive(Clone, Copy, Default)]
struct MountOptions<'a> {
    /// Open a fresh name scope at the mounted root.
    new_scope: bool,
    templated_parent: Option<NodeId>,
    data_context: Option<&'a Value>,
    skin_source: Option<&'a dyn SkinSource>,
}

/// The live hierarchy of UI nodes for one screen.
pub struct VisualTree {
    nodes: SlotMap<NodeId, VisualNode>,
    live_root: Option<NodeId>,
    config: EngineConfig,
    pipeline: Option<Arc<BatchCompiler>>,
    skin_source: Option<Arc<dyn SkinSource>>,
}

impl VisualTree {
    /// Create an empty tree with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty tree.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            live_root: None,
            config,
            pipeline: None,
            skin_source: None,
        }
    }

    /// Register visible nodes' primitives with `pipeline`.
    pub fn with_pipeline(mut self, pipeline: Arc<BatchCompiler>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Resolve includes and dictionary sources through `source`.
    pub fn with_skin_source(mut self, source: Arc<dyn SkinSource>) -> Self {
        self.skin_source = Some(source);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> Option<&Arc<BatchCompiler>> {
        self.pipeline.as_ref()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes without a parent, in arena order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    fn node(&self, id: NodeId) -> SkinResult<&VisualNode> {
        self.nodes.get(id).ok_or(SkinError::InvalidNode)
    }

    fn node_mut(&mut self, id: NodeId) -> SkinResult<&mut VisualNode> {
        self.nodes.get_mut(id).ok_or(SkinError::InvalidNode)
    }

    // -------------------------------------------------------------------------
    // Mounting
    // -------------------------------------------------------------------------

    /// Mount `element` as a new root with its own name scope.
    pub fn insert_root(&mut self, element: &Shared<Element>) -> SkinResult<NodeId> {
        self.mount_with(
            element,
            None,
            MountOptions {
                new_scope: true,
                ..Default::default()
            },
        )
    }

    /// Mount `element` as the last child of `parent`.
    pub fn mount(&mut self, element: &Shared<Element>, parent: NodeId) -> SkinResult<NodeId> {
        self.node(parent)?;
        self.mount_with(element, Some(parent), MountOptions::default())
    }

    /// Mount a template copy under `parent`, which becomes its templated parent.
    pub(crate) fn mount_template(
        &mut self,
        element: &Shared<Element>,
        parent: NodeId,
        data_context: Option<&Value>,
    ) -> SkinResult<NodeId> {
        self.node(parent)?;
        self.mount_with(
            element,
            Some(parent),
            MountOptions {
                new_scope: true,
                templated_parent: Some(parent),
                data_context,
                skin_source: None,
            },
        )
    }

    /// Mount an include element under `parent`, loading its content from `source`.
    pub(crate) fn mount_include(
        &mut self,
        include: &Shared<Element>,
        parent: NodeId,
        source: &dyn SkinSource,
    ) -> SkinResult<NodeId> {
        self.node(parent)?;
        self.mount_with(
            include,
            Some(parent),
            MountOptions {
                skin_source: Some(source),
                ..Default::default()
            },
        )
    }

    /// Build, then activate if the parent is active. A failure leaves nothing behind.
    fn mount_with(
        &mut self,
        element: &Shared<Element>,
        parent: Option<NodeId>,
        options: MountOptions<'_>,
    ) -> SkinResult<NodeId> {
        let mut created = None;
        let id = match self.build(element, parent, options, true, &mut created) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(target: targets::TREE, error = %e, "mount failed");
                if let Some(root) = created {
                    self.destroy(root)?;
                }
                return Err(e);
            }
        };

        let activate = !self.config.lazy_bindings
            || parent.is_some_and(|p| self.nodes.get(p).is_some_and(|n| n.activated));
        if activate {
            if let Err(e) = self.activate_subtree(id) {
                tracing::warn!(target: targets::TREE, error = %e, "activation failed");
                self.destroy(id)?;
                return Err(e);
            }
        }
        self.sync_subtree_primitives(id);
        Ok(id)
    }

    fn build(
        &mut self,
        element: &Shared<Element>,
        parent: Option<NodeId>,
        options: MountOptions<'_>,
        is_root: bool,
        created: &mut Option<NodeId>,
    ) -> SkinResult<NodeId> {
        let (kind, name, literals, resources, focusable, children, bound_data_context) = {
            let e = element.read();
            (
                e.kind.clone(),
                e.name.clone(),
                e.properties.clone(),
                e.resources.clone(),
                e.focusable,
                e.children.clone(),
                e.bindings.iter().any(|b| b.target_property == DATA_CONTEXT),
            )
        };

        let origin = parent
            .and_then(|p| self.nodes.get(p))
            .map(|n| n.bounds.origin)
            .unwrap_or_default();
        let bounds = layout_hint(&literals).offset(origin.x, origin.y);
        let visible = literals
            .get(IS_VISIBLE)
            .and_then(|v| v.as_bool().ok())
            .unwrap_or(true);
        let type_key = kind.name();

        let id = self.nodes.insert_with_key(|id| VisualNode {
            kind: kind.clone(),
            name: name.clone(),
            element: element.clone(),
            properties: Arc::new(NodeProperties::new(id, type_key, &literals)),
            parent,
            children: Vec::new(),
            scope: None,
            registered_in: None,
            templated_parent: options.templated_parent,
            explicit_data_context: bound_data_context || literals.contains_key(DATA_CONTEXT),
            data_context_link: None,
            focusable,
            visible,
            bounds,
            activated: false,
            bindings: Vec::new(),
            commands: BTreeMap::new(),
            triggers: Vec::new(),
            primitives: Vec::new(),
            live_primitives: Vec::new(),
        });
        if created.is_none() {
            *created = Some(id);
        }
        if let Some(p) = parent {
            self.node_mut(p)?.children.push(id);
        }
        tracing::trace!(target: targets::TREE, ?id, kind = type_key, "mounted node");

        let owned_source = self.skin_source.clone();
        let empty = MemorySkinSource::new();
        let source: &dyn SkinSource = options
            .skin_source
            .or(owned_source.as_deref())
            .unwrap_or(&empty);

        // The parsed dictionary stays untouched; the live scope is a private copy.
        let scope = match resources {
            Some(dictionary) => Some(deep_copy_graph(&dictionary, ExternalRefs::Cut)),
            None if is_root && options.new_scope => Some(shared(ResourceDictionary::new())),
            None => None,
        };
        if let Some(scope) = scope {
            scope.write().initialize(source)?;
            if let Some(outer) = parent.and_then(|p| self.nearest_scope(p)) {
                scope.write().set_parent_scope(&outer);
            }
            self.node_mut(id)?.scope = Some(scope);
        }

        if let Some(name) = &name {
            self.register_name(id, name)?;
        }

        if let (true, Some(data)) = (is_root, options.data_context) {
            let node = self.node_mut(id)?;
            node.explicit_data_context = true;
            node.properties.cell(DATA_CONTEXT).set_silent(data.clone());
        } else {
            self.link_data_context(id)?;
        }

        if let ElementKind::Include { source: path } = &kind {
            self.expand_include(id, path, source, options, created)?;
        }

        let child_options = MountOptions {
            new_scope: false,
            data_context: None,
            ..options
        };
        for child in &children {
            self.build(child, Some(id), child_options, false, created)?;
        }
        Ok(id)
    }

    fn expand_include(
        &mut self,
        include: NodeId,
        path: &str,
        source: &dyn SkinSource,
        options: MountOptions<'_>,
        created: &mut Option<NodeId>,
    ) -> SkinResult<NodeId> {
        let loaded = source.load(path)?;
        let root = match loaded {
            Value::Element(element) => deep_copy_graph(&element, ExternalRefs::Cut),
            Value::Template(template) => deep_copy_graph(&template.root, ExternalRefs::Cut),
            other => {
                tracing::warn!(target: targets::TEMPLATE, %path, kind = other.kind().name(), "include source is not an element");
                return Err(CoreError::TypeMismatch {
                    expected: "element",
                    got: other.kind().name(),
                }
                .into());
            }
        };
        tracing::debug!(target: targets::TEMPLATE, %path, "expanding include");
        let include_options = MountOptions {
            new_scope: true,
            data_context: None,
            skin_source: Some(source),
            ..options
        };
        self.build(&root, Some(include), include_options, true, created)
    }

    // -------------------------------------------------------------------------
    // Activation
    // -------------------------------------------------------------------------

    /// Make `id` the live root and activate its subtree.
    ///
    /// If any node fails to activate, nothing in the subtree stays active and
    /// the previous live root is kept.
    pub fn set_root(&mut self, id: NodeId) -> SkinResult<()> {
        self.node(id)?;
        self.activate_subtree(id)?;
        self.live_root = Some(id);
        Ok(())
    }

    /// The live root, if one is set.
    pub fn live_root(&self) -> Option<NodeId> {
        self.live_root
    }

    /// Whether `id` is the live root or one of its descendants.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.live_root
            .is_some_and(|root| self.is_ancestor_of(root, id))
    }

    /// Activate the deferred bindings, commands and triggers of a subtree that
    /// now belongs to the live tree.
    ///
    /// Returns `false` and does nothing if `id` is not under the live root.
    pub fn attach_to_live_root(&mut self, id: NodeId) -> SkinResult<bool> {
        self.node(id)?;
        if !self.is_live(id) {
            tracing::debug!(target: targets::TREE, ?id, "attach skipped, node is not under the live root");
            return Ok(false);
        }
        self.activate_subtree(id)?;
        Ok(true)
    }

    /// Whether the node's bindings, commands and triggers are active.
    pub fn is_activated(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.activated)
    }

    /// Activate every inactive node under `root`, all or nothing.
    fn activate_subtree(&mut self, root: NodeId) -> SkinResult<()> {
        let mut activated = Vec::new();
        for id in self.preorder(root) {
            if self.node(id)?.activated {
                continue;
            }
            if let Err(e) = self.activate(id) {
                tracing::warn!(
                    target: targets::TREE,
                    ?id,
                    error = %e,
                    rolled_back = activated.len(),
                    "activation failed"
                );
                for done in activated.into_iter().rev() {
                    self.deactivate(done);
                }
                return Err(e);
            }
            activated.push(id);
        }
        Ok(())
    }

    /// Drop a node's live bindings, commands and triggers.
    fn deactivate(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        for binding in node.bindings.drain(..) {
            binding.dispose();
        }
        node.commands.clear();
        node.triggers.clear();
        node.activated = false;
    }

    fn activate(&mut self, id: NodeId) -> SkinResult<()> {
        let (element, properties) = {
            let node = self.node(id)?;
            (node.element.clone(), node.properties.clone())
        };
        let (decls, command_decls, triggers) = {
            let e = element.read();
            (e.bindings.clone(), e.commands.clone(), e.triggers.clone())
        };

        let mut bindings = Vec::with_capacity(decls.len());
        for mut decl in decls {
            let (root, path) = self.binding_root(id, &decl.target_property, &decl.source, &decl.path)?;
            decl.path = path;
            let target = properties.cell(&decl.target_property);
            bindings.push(Binding::initialize(decl, root, target)?);
        }

        let mut commands = BTreeMap::new();
        for (event, decl) in &command_decls {
            commands.insert(event.clone(), self.bind_command(id, decl)?);
        }

        let mut subscriptions = Vec::with_capacity(triggers.len());
        for trigger in &triggers {
            subscriptions.push(self.activate_trigger(id, trigger)?);
        }

        let node = self.node_mut(id)?;
        node.bindings.extend(bindings);
        node.commands = commands;
        node.triggers = subscriptions;
        node.activated = true;
        tracing::trace!(
            target: targets::TREE,
            ?id,
            bindings = node.bindings.len(),
            commands = node.commands.len(),
            triggers = node.triggers.len(),
            "activated node"
        );
        Ok(())
    }

    /// Where a declared binding starts, and the path from there.
    fn binding_root(
        &self,
        id: NodeId,
        target_property: &str,
        source: &BindingSource,
        path: &PropertyPath,
    ) -> SkinResult<(Value, PropertyPath)> {
        match source {
            // A bound DataContext starts from the parent's data context.
            BindingSource::DataContext if target_property == DATA_CONTEXT => {
                let parent = self.node(id)?.parent.ok_or_else(|| {
                    tracing::warn!(target: targets::BINDING, ?id, "DataContext bound to itself on a root");
                    SkinError::BindingSource("a root node has no parent data context".into())
                })?;
                Ok((self.object(parent)?, path.prefixed(DATA_CONTEXT)))
            }
            BindingSource::DataContext => Ok((self.object(id)?, path.prefixed(DATA_CONTEXT))),
            other => Ok((self.resolve_source(id, other)?, path.clone())),
        }
    }

    /// The current value a binding source refers to, seen from `id`.
    pub fn resolve_source(&self, id: NodeId, source: &BindingSource) -> SkinResult<Value> {
        let node = self.node(id)?;
        match source {
            BindingSource::Explicit(value) => Ok(value.clone()),
            BindingSource::DataContext => Ok(node.properties.cell(DATA_CONTEXT).get()),
            BindingSource::RelativeSelf => self.object(id),
            BindingSource::TemplatedParent => {
                let parent = node.templated_parent.ok_or_else(|| {
                    tracing::warn!(target: targets::BINDING, ?id, "no templated parent");
                    SkinError::BindingSource("node was not created from a template".into())
                })?;
                self.object(parent)
            }
            BindingSource::ElementName(name) => {
                let found = self.find_name(id, name).ok_or_else(|| {
                    tracing::warn!(target: targets::BINDING, %name, "element name not found");
                    SkinError::BindingSource(format!("no element named '{name}'"))
                })?;
                match self.node_of(&found) {
                    Some(target) => self.object(target),
                    None => Ok(found),
                }
            }
            BindingSource::FindAncestor { kind, level } => {
                let ancestor = self
                    .ancestors(id)
                    .into_iter()
                    .filter(|a| self.nodes.get(*a).is_some_and(|n| n.kind.name() == kind))
                    .nth(level.saturating_sub(1))
                    .ok_or_else(|| {
                        tracing::warn!(target: targets::BINDING, %kind, depth = *level, "ancestor not found");
                        SkinError::BindingSource(format!("no ancestor {kind} at level {level}"))
                    })?;
                self.object(ancestor)
            }
        }
    }

    fn bind_command(&self, id: NodeId, decl: &CommandDecl) -> SkinResult<BoundCommand> {
        let target = decl
            .target_source()
            .map(|source| self.resolve_source(id, source))
            .transpose()?;
        let parameter_cell = match &decl.parameter {
            Some(CommandParameter::Property(name)) => Some(self.node(id)?.properties.cell(name)),
            _ => None,
        };
        Ok(decl.bind(target.as_ref(), parameter_cell)?)
    }

    fn prepare_actions(&self, id: NodeId, actions: &[TriggerAction]) -> SkinResult<Vec<PreparedAction>> {
        let mut prepared = Vec::with_capacity(actions.len());
        for action in actions {
            match action {
                TriggerAction::Set {
                    target,
                    property,
                    value,
                } => {
                    let node = match target {
                        None => id,
                        Some(name) => self.find_node(id, name).ok_or_else(|| {
                            tracing::warn!(target: targets::TREE, %name, "trigger target not found");
                            SkinError::BindingSource(format!("no element named '{name}'"))
                        })?,
                    };
                    let cell = self.node(node)?.properties.cell(property);
                    prepared.push(PreparedAction::Set(cell, value.clone()));
                }
                TriggerAction::Invoke(command) => {
                    prepared.push(PreparedAction::Invoke(self.bind_command(id, command)?));
                }
            }
        }
        Ok(prepared)
    }

    fn activate_trigger(&self, id: NodeId, trigger: &Shared<Trigger>) -> SkinResult<Subscription> {
        let (property, value, enter, exit) = {
            let t = trigger.read();
            (
                t.property.clone(),
                t.value.clone(),
                t.enter_actions.clone(),
                t.exit_actions.clone(),
            )
        };
        let enter = self.prepare_actions(id, &enter)?;
        let exit = self.prepare_actions(id, &exit)?;
        let watched = self.node(id)?.properties.cell(&property);

        let active = AtomicBool::new(false);
        let evaluate = move |current: &Value| {
            let matches = *current == value;
            let was = active.swap(matches, Ordering::SeqCst);
            let actions = match (was, matches) {
                (false, true) => &enter,
                (true, false) => &exit,
                _ => return,
            };
            for action in actions {
                action.run();
            }
        };
        evaluate(&watched.get());
        Ok(watched.on_change(evaluate))
    }

    // -------------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------------

    /// Destroy a node and its whole subtree.
    ///
    /// Bindings are disposed, trigger subscriptions dropped, names
    /// unregistered and render primitives removed from the pipeline.
    #[tracing::instrument(skip(self), target = "skin_engine::tree", level = "trace")]
    pub fn destroy(&mut self, id: NodeId) -> SkinResult<()> {
        let mut doomed = Vec::new();
        self.collect_descendants(id, &mut doomed)?;
        doomed.push(id);

        if let Some(parent) = self.node(id)?.parent {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.retain(|c| *c != id);
            }
        }

        let mut primitives = Vec::new();
        for node_id in &doomed {
            let Some(mut node) = self.nodes.remove(*node_id) else {
                continue;
            };
            for binding in node.bindings.drain(..) {
                binding.dispose();
            }
            node.triggers.clear();
            if let (Some(scope), Some(name)) = (&node.registered_in, &node.name) {
                scope.write().unregister_name(name);
            }
            primitives.append(&mut node.live_primitives);
        }
        if let Some(pipeline) = &self.pipeline {
            if !primitives.is_empty() {
                pipeline.remove_many(primitives);
            }
        }
        if self.live_root.is_some_and(|root| doomed.contains(&root)) {
            self.live_root = None;
        }
        tracing::trace!(target: targets::TREE, ?id, count = doomed.len(), "destroyed subtree");
        Ok(())
    }

    /// Collect descendants depth-first, children before parents.
    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) -> SkinResult<()> {
        for &child in &self.node(id)?.children {
            self.collect_descendants(child, out)?;
            out.push(child);
        }
        Ok(())
    }

    /// `id` and its descendants, parents before children.
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get(next) else {
                continue;
            };
            out.push(next);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        std::iter::successors(self.parent(id).ok().flatten(), |p| {
            self.parent(*p).ok().flatten()
        })
        .collect()
    }

    /// Move a node under `new_parent`, or make it a root with `None`.
    ///
    /// Names move to the new enclosing scope, the data context is
    /// re-inherited, and the subtree is activated if the new parent is. If
    /// that activation fails the node keeps its new parent but no node in
    /// the subtree that was inactive before becomes active.
    pub fn set_parent(&mut self, id: NodeId, new_parent: Option<NodeId>) -> SkinResult<()> {
        self.node(id)?;
        if let Some(parent) = new_parent {
            self.node(parent)?;
            if self.is_ancestor_of(id, parent) {
                return Err(SkinError::CircularParentage);
            }
        }

        if let Some(old) = self.node(id)?.parent {
            if let Some(old_node) = self.nodes.get_mut(old) {
                old_node.children.retain(|c| *c != id);
            }
        }
        self.node_mut(id)?.parent = new_parent;
        if let Some(parent) = new_parent {
            self.node_mut(parent)?.children.push(id);
        }

        self.rescope_subtree(id)?;
        self.link_data_context(id)?;
        self.sync_subtree_primitives(id);
        if new_parent.is_some_and(|p| self.is_activated(p)) {
            self.activate_subtree(id)?;
        }
        Ok(())
    }

    /// Whether `potential_ancestor` is `id` or one of its ancestors.
    fn is_ancestor_of(&self, potential_ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(current_id) = current {
            if current_id == potential_ancestor {
                return true;
            }
            current = self.nodes.get(current_id).and_then(|n| n.parent);
        }
        false
    }

    pub fn parent(&self, id: NodeId) -> SkinResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: NodeId) -> SkinResult<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    pub fn kind(&self, id: NodeId) -> SkinResult<&ElementKind> {
        Ok(&self.node(id)?.kind)
    }

    pub fn name(&self, id: NodeId) -> SkinResult<Option<&str>> {
        Ok(self.node(id)?.name.as_deref())
    }

    /// The element copy the node was built from.
    pub fn element(&self, id: NodeId) -> SkinResult<Shared<Element>> {
        Ok(self.node(id)?.element.clone())
    }

    /// The node a template copy was applied to.
    pub fn templated_parent(&self, id: NodeId) -> SkinResult<Option<NodeId>> {
        Ok(self.node(id)?.templated_parent)
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    /// The node as a bindable object value.
    pub fn object(&self, id: NodeId) -> SkinResult<Value> {
        let object: ObjectRef = self.node(id)?.properties.clone();
        Ok(Value::Object(object))
    }

    /// Read a property.
    pub fn property(&self, id: NodeId, name: &str) -> SkinResult<Value> {
        self.node(id)?
            .properties
            .property(name)
            .map(|cell| cell.get())
            .ok_or_else(|| {
                CoreError::PropertyNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Names of the node's properties, sorted.
    pub fn property_names(&self, id: NodeId) -> SkinResult<Vec<String>> {
        Ok(self.node(id)?.properties.names())
    }

    /// The cell behind a property, created if missing.
    pub fn property_cell(&self, id: NodeId, name: &str) -> SkinResult<PropertyCell> {
        Ok(self.node(id)?.properties.cell(name))
    }

    /// Write a property. Returns whether the value changed.
    pub fn set_property(&self, id: NodeId, name: &str, value: impl Into<Value>) -> SkinResult<bool> {
        Ok(self.node(id)?.properties.cell(name).set(value))
    }

    /// Number of live bindings on a node.
    pub fn binding_count(&self, id: NodeId) -> usize {
        self.nodes.get(id).map_or(0, |n| n.bindings.len())
    }

    /// Set an explicit data context. Inheriting descendants follow it.
    pub fn set_data_context(&mut self, id: NodeId, value: impl Into<Value>) -> SkinResult<()> {
        let node = self.node_mut(id)?;
        node.explicit_data_context = true;
        node.data_context_link = None;
        node.properties.cell(DATA_CONTEXT).set(value);
        Ok(())
    }

    /// Drop the explicit data context; the node inherits its parent's again.
    pub fn clear_data_context(&mut self, id: NodeId) -> SkinResult<()> {
        self.node_mut(id)?.explicit_data_context = false;
        self.link_data_context(id)
    }

    /// The node's current data context.
    pub fn data_context(&self, id: NodeId) -> SkinResult<Value> {
        Ok(self.node(id)?.properties.cell(DATA_CONTEXT).get())
    }

    /// Whether the node follows its parent's data context.
    pub fn inherits_data_context(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| !n.explicit_data_context)
    }

    /// Point an inheriting node's `DataContext` at its current parent.
    fn link_data_context(&mut self, id: NodeId) -> SkinResult<()> {
        let (explicit, parent, own) = {
            let node = self.node(id)?;
            (node.explicit_data_context, node.parent, node.properties.cell(DATA_CONTEXT))
        };
        if explicit {
            return Ok(());
        }
        let upstream = parent
            .and_then(|p| self.nodes.get(p))
            .map(|p| p.properties.cell(DATA_CONTEXT));
        let link = match upstream {
            Some(upstream) => {
                let source = upstream.downgrade();
                let target = own.clone();
                let link = upstream.on_change(move |_| {
                    if let Some(source) = source.upgrade() {
                        target.set(source.get());
                    }
                });
                own.set(upstream.get());
                Some(link)
            }
            None => {
                own.set(Value::Null);
                None
            }
        };
        self.node_mut(id)?.data_context_link = link;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Name scopes and resources
    // -------------------------------------------------------------------------

    /// The name scope enclosing `id`, starting at `id` itself.
    pub fn scope(&self, id: NodeId) -> Option<Shared<ResourceDictionary>> {
        let mut current = Some(id);
        while let Some(current_id) = current {
            let node = self.nodes.get(current_id)?;
            if let Some(scope) = &node.scope {
                return Some(scope.clone());
            }
            current = node.parent;
        }
        None
    }

    fn nearest_scope(&self, id: NodeId) -> Option<Shared<ResourceDictionary>> {
        self.scope(id)
    }

    fn register_name(&mut self, id: NodeId, name: &str) -> SkinResult<()> {
        let Some(scope) = self.nearest_scope(id) else {
            tracing::trace!(target: targets::TREE, %name, "no scope to register name in");
            return Ok(());
        };
        scope.write().register_name(name, Value::Handle(id.as_raw()))?;
        self.node_mut(id)?.registered_in = Some(scope);
        Ok(())
    }

    /// Move names in a re-parented subtree to their new scopes.
    fn rescope_subtree(&mut self, id: NodeId) -> SkinResult<()> {
        for node_id in self.preorder(id) {
            let (scope, name, registered, parent) = {
                let node = self.node(node_id)?;
                (
                    node.scope.clone(),
                    node.name.clone(),
                    node.registered_in.clone(),
                    node.parent,
                )
            };
            if let Some(scope) = &scope {
                match parent.and_then(|p| self.nearest_scope(p)) {
                    Some(outer) => scope.write().set_parent_scope(&outer),
                    None => scope.write().clear_parent_scope(),
                }
            }
            let Some(name) = name else {
                continue;
            };
            let target = self.nearest_scope(node_id);
            let unchanged = match (&registered, &target) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if !unchanged {
                if let Some(old) = registered {
                    old.write().unregister_name(&name);
                }
                self.node_mut(node_id)?.registered_in = None;
                self.register_name(node_id, &name)?;
            }
        }
        Ok(())
    }

    /// Look up `name` in the scope chain enclosing `id`.
    pub fn find_name(&self, id: NodeId, name: &str) -> Option<Value> {
        self.nearest_scope(id)?.read().find_name(name)
    }

    /// Like [`find_name`](Self::find_name), for names that refer to nodes.
    pub fn find_node(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.find_name(id, name).and_then(|v| self.node_of(&v))
    }

    fn node_of(&self, value: &Value) -> Option<NodeId> {
        match value {
            Value::Handle(raw) => {
                let id = NodeId::from_raw(*raw);
                self.nodes.contains_key(id).then_some(id)
            }
            _ => None,
        }
    }

    /// Look up a resource in the scope chain enclosing `id`.
    pub fn find_resource(&self, id: NodeId, key: &str) -> Option<Value> {
        self.nearest_scope(id)?.read().find_resource(key)
    }

    // -------------------------------------------------------------------------
    // Geometry, visibility and rendering
    // -------------------------------------------------------------------------

    /// Store the screen-space rectangle computed by layout.
    pub fn set_bounds(&mut self, id: NodeId, bounds: Rect) -> SkinResult<()> {
        self.node_mut(id)?.bounds = bounds;
        Ok(())
    }

    pub fn bounds(&self, id: NodeId) -> SkinResult<Rect> {
        Ok(self.node(id)?.bounds)
    }

    /// Show or hide a node. Hiding removes the subtree's primitives from the pipeline.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> SkinResult<()> {
        let node = self.node_mut(id)?;
        node.visible = visible;
        node.properties.cell(IS_VISIBLE).set(visible);
        self.sync_subtree_primitives(id);
        Ok(())
    }

    /// The node's own visibility flag.
    pub fn is_visible(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.visible)
    }

    /// Visible, with every ancestor visible too.
    pub fn is_effectively_visible(&self, id: NodeId) -> bool {
        self.is_visible(id) && self.ancestors(id).into_iter().all(|a| self.is_visible(a))
    }

    /// `false` only when the node's `IsEnabled` property is `false`.
    pub fn is_enabled(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| {
            n.properties
                .property(IS_ENABLED)
                .is_none_or(|cell| cell.get() != Value::Bool(false))
        })
    }

    /// Whether the node can take focus right now.
    pub fn is_focusable(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.focusable)
            && self.is_effectively_visible(id)
            && self.is_enabled(id)
    }

    /// Replace the primitives a node draws. They reach the pipeline while the node is visible.
    pub fn set_primitives(&mut self, id: NodeId, primitives: Vec<RenderPrimitive>) -> SkinResult<()> {
        let live = std::mem::take(&mut self.node_mut(id)?.live_primitives);
        self.remove_from_pipeline(live);
        self.node_mut(id)?.primitives = primitives;
        self.sync_primitives(id);
        Ok(())
    }

    /// Ids of the node's primitives currently registered with the pipeline.
    pub fn live_primitives(&self, id: NodeId) -> SkinResult<&[PrimitiveId]> {
        Ok(&self.node(id)?.live_primitives)
    }

    fn sync_subtree_primitives(&mut self, id: NodeId) {
        if self.pipeline.is_none() {
            return;
        }
        for node_id in self.preorder(id) {
            self.sync_primitives(node_id);
        }
    }

    fn sync_primitives(&mut self, id: NodeId) {
        let Some(pipeline) = self.pipeline.clone() else {
            return;
        };
        let visible = self.is_effectively_visible(id);
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if visible && node.live_primitives.is_empty() {
            node.live_primitives = node
                .primitives
                .iter()
                .cloned()
                .map(|p| pipeline.add(p))
                .collect();
        } else if !visible && !node.live_primitives.is_empty() {
            let live = std::mem::take(&mut node.live_primitives);
            self.remove_from_pipeline(live);
        }
    }

    fn remove_from_pipeline(&self, ids: Vec<PrimitiveId>) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        for id in ids {
            if let Err(e) = pipeline.remove(id) {
                tracing::debug!(target: targets::TREE, error = %e, "primitive already gone");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Run the command bound to `event` with its declared parameter.
    pub fn execute_command(&self, id: NodeId, event: &str) -> SkinResult<()> {
        self.execute_command_with(id, event, None)
    }

    /// Run the command bound to `event`, overriding the declared parameter.
    pub fn execute_command_with(
        &self,
        id: NodeId,
        event: &str,
        parameter: Option<Value>,
    ) -> SkinResult<()> {
        let command = self.node(id)?.commands.get(event).ok_or_else(|| {
            tracing::debug!(target: targets::TREE, ?id, %event, "no command bound");
            SkinError::CommandNotFound {
                event: event.to_string(),
            }
        })?;
        command.execute(parameter);
        Ok(())
    }
}

impl Default for VisualTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VisualTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualTree")
            .field("nodes", &self.nodes.len())
            .field("live_root", &self.live_root)
            .field("config", &self.config)
            .field("pipeline", &self.pipeline.is_some())
            .finish()
    }
}

/// The `Left`/`Top`/`Width`/`Height` hint, relative to the parent.
fn layout_hint(literals: &BTreeMap<String, Value>) -> Rect {
    let read = |name: &str| {
        literals
            .get(name)
            .and_then(|v| v.as_f64().ok())
            .unwrap_or(0.0) as f32
    };
    Rect::new(read("Left"), read("Top"), read("Width"), read("Height"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use skin_engine_core::{BindingDecl, BindingMode, ObservableObject, TriggerAction};
    use skin_engine_render::{BatchKey, EffectId, GeometryHandle, RenderDevice};

    fn eager() -> VisualTree {
        VisualTree::with_config(EngineConfig {
            lazy_bindings: false,
            ..EngineConfig::default()
        })
    }

    fn label(name: &str) -> Shared<Element> {
        shared(Element::new(ElementKind::Label).named(name))
    }

    fn path(text: &str) -> PropertyPath {
        PropertyPath::parse(text).unwrap()
    }

    #[test]
    fn test_mount_builds_hierarchy() {
        let mut tree = VisualTree::new();
        let panel = shared(Element::new(ElementKind::Panel).named("Root"));
        Element::add_child(&panel, label("A"));
        Element::add_child(&panel, label("B"));

        let root = tree.insert_root(&panel).unwrap();
        assert_eq!(tree.len(), 3);
        let children = tree.children(root).unwrap().to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(tree.parent(children[0]).unwrap(), Some(root));
        assert_eq!(tree.find_node(root, "B"), Some(children[1]));
        assert_eq!(tree.preorder(root), vec![root, children[0], children[1]]);
    }

    #[test]
    fn test_duplicate_name_fails_whole_mount() {
        let mut tree = VisualTree::new();
        let panel = shared(Element::new(ElementKind::Panel));
        Element::add_child(&panel, label("Twin"));
        Element::add_child(&panel, label("Twin"));

        let result = tree.insert_root(&panel);
        assert!(matches!(
            result,
            Err(SkinError::Core(CoreError::DuplicateName { .. }))
        ));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_destroy_cascades_and_unregisters() {
        let mut tree = VisualTree::new();
        let panel = shared(Element::new(ElementKind::Panel));
        let inner = shared(Element::new(ElementKind::StackPanel {
            orientation: Default::default(),
        }));
        Element::add_child(&inner, label("Leaf"));
        Element::add_child(&panel, inner);

        let root = tree.insert_root(&panel).unwrap();
        let stack = tree.children(root).unwrap()[0];
        assert!(tree.find_node(root, "Leaf").is_some());

        tree.destroy(stack).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.children(root).unwrap().is_empty());
        assert_eq!(tree.find_name(root, "Leaf"), None);
        assert_eq!(tree.destroy(stack), Err(SkinError::InvalidNode));
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let mut tree = VisualTree::new();
        let panel = shared(Element::new(ElementKind::Panel));
        Element::add_child(&panel, shared(Element::new(ElementKind::Panel)));
        let root = tree.insert_root(&panel).unwrap();
        let child = tree.children(root).unwrap()[0];

        assert_eq!(
            tree.set_parent(root, Some(child)),
            Err(SkinError::CircularParentage)
        );
        assert_eq!(tree.set_parent(root, Some(root)), Err(SkinError::CircularParentage));

        tree.set_parent(child, None).unwrap();
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn test_lazy_bindings_wait_for_live_root() {
        let model = ObservableObject::new("Model").with_property("Title", "Hello").into_ref();
        let mut tree = VisualTree::new();
        let element = shared(
            Element::new(ElementKind::Label)
                .with_property(DATA_CONTEXT, Value::Object(model))
                .with_binding(BindingDecl::new("Text", path("Title"))),
        );

        let id = tree.insert_root(&element).unwrap();
        assert!(!tree.is_activated(id));
        assert!(tree.property(id, "Text").is_err());

        tree.set_root(id).unwrap();
        assert!(tree.is_activated(id));
        assert_eq!(tree.property(id, "Text").unwrap(), Value::from("Hello"));
    }

    #[test]
    fn test_data_context_inherits_and_rebinds() {
        let first = ObservableObject::new("Item").with_property("Title", "One").into_ref();
        let second = ObservableObject::new("Item").with_property("Title", "Two").into_ref();

        let mut tree = eager();
        let panel = shared(Element::new(ElementKind::Panel));
        Element::add_child(
            &panel,
            shared(Element::new(ElementKind::Label).with_binding(BindingDecl::new("Text", path("Title")))),
        );
        let root = tree.insert_root(&panel).unwrap();
        let text = tree.children(root).unwrap()[0];
        assert_eq!(tree.property(text, "Text").unwrap(), Value::Null);

        tree.set_data_context(root, Value::Object(first)).unwrap();
        assert_eq!(tree.property(text, "Text").unwrap(), Value::from("One"));

        tree.set_data_context(root, Value::Object(second.clone())).unwrap();
        assert_eq!(tree.property(text, "Text").unwrap(), Value::from("Two"));

        second.property("Title").unwrap().set("Deux");
        assert_eq!(tree.property(text, "Text").unwrap(), Value::from("Deux"));
    }

    #[test]
    fn test_bound_data_context_reaches_descendants() {
        let episode = |title: &str| {
            Value::Object(ObservableObject::new("Episode").with_property("Title", title).into_ref())
        };
        let screen = ObservableObject::new("Screen")
            .with_property("Current", episode("Episode 1"))
            .into_ref();

        let mut tree = eager();
        let panel = shared(Element::new(ElementKind::Panel).with_binding(
            BindingDecl::new(DATA_CONTEXT, path("Current"))
                .source(BindingSource::Explicit(Value::Object(screen.clone()))),
        ));
        let group = shared(Element::new(ElementKind::Panel));
        Element::add_child(
            &group,
            shared(Element::new(ElementKind::Label).with_binding(BindingDecl::new("Text", path("Title")))),
        );
        Element::add_child(&panel, group);

        let root = tree.insert_root(&panel).unwrap();
        let group = tree.children(root).unwrap()[0];
        let text = tree.children(group).unwrap()[0];
        assert!(!tree.inherits_data_context(root));
        assert!(tree.inherits_data_context(text));
        assert_eq!(tree.property(text, "Text").unwrap(), Value::from("Episode 1"));

        screen.property("Current").unwrap().set(episode("Episode 2"));
        assert_eq!(tree.property(text, "Text").unwrap(), Value::from("Episode 2"));

        // Re-parenting under a new data context leaves the bound one alone.
        let host = tree
            .insert_root(&shared(Element::new(ElementKind::Panel).with_property(DATA_CONTEXT, "other")))
            .unwrap();
        tree.set_parent(root, Some(host)).unwrap();
        assert_eq!(tree.property(text, "Text").unwrap(), Value::from("Episode 2"));

        // A detached subtree stops following its old parent.
        tree.set_parent(group, None).unwrap();
        assert_eq!(tree.data_context(text).unwrap(), Value::Null);
        screen.property("Current").unwrap().set(episode("Episode 3"));
        assert_eq!(tree.data_context(text).unwrap(), Value::Null);
    }

    #[test]
    fn test_data_context_bound_from_parent_context() {
        let show = ObservableObject::new("Show")
            .with_property(
                "Latest",
                Value::Object(ObservableObject::new("Episode").with_property("Title", "Pilot").into_ref()),
            )
            .into_ref();

        let mut tree = eager();
        let panel = shared(Element::new(ElementKind::Panel).with_property(DATA_CONTEXT, Value::Object(show)));
        let item = shared(
            Element::new(ElementKind::ListItem).with_binding(BindingDecl::new(DATA_CONTEXT, path("Latest"))),
        );
        Element::add_child(
            &item,
            shared(Element::new(ElementKind::Label).with_binding(BindingDecl::new("Text", path("Title")))),
        );
        Element::add_child(&panel, item);

        let root = tree.insert_root(&panel).unwrap();
        let item = tree.children(root).unwrap()[0];
        let text = tree.children(item).unwrap()[0];
        assert_eq!(tree.property(text, "Text").unwrap(), Value::from("Pilot"));

        let orphan = shared(
            Element::new(ElementKind::Label).with_binding(BindingDecl::new(DATA_CONTEXT, path("Latest"))),
        );
        assert!(matches!(tree.insert_root(&orphan), Err(SkinError::BindingSource(_))));
    }

    #[test]
    fn test_failed_activation_leaves_nothing_live() {
        let model = ObservableObject::new("Model").with_property("Title", "x").into_ref();
        let panel = shared(Element::new(ElementKind::Panel));
        Element::add_child(
            &panel,
            shared(
                Element::new(ElementKind::Label).named("A").with_binding(
                    BindingDecl::new("Text", path("Title"))
                        .source(BindingSource::Explicit(Value::Object(model.clone()))),
                ),
            ),
        );
        Element::add_child(
            &panel,
            shared(Element::new(ElementKind::Label).with_binding(
                BindingDecl::new("Text", path("Text")).source(BindingSource::ElementName("Missing".into())),
            )),
        );

        let mut tree = VisualTree::new();
        let root = tree.insert_root(&panel).unwrap();
        let a = tree.find_node(root, "A").unwrap();

        assert!(matches!(tree.set_root(root), Err(SkinError::BindingSource(_))));
        assert_eq!(tree.live_root(), None);
        assert!(!tree.is_activated(root));
        assert!(!tree.is_activated(a));
        assert_eq!(tree.binding_count(a), 0);

        model.property("Title").unwrap().set("y");
        assert_ne!(tree.property(a, "Text").unwrap(), Value::from("y"));
        assert_eq!(model.property("Title").unwrap().subscriber_count(), 0);
    }

    #[test]
    fn test_same_element_mounts_twice() {
        let resources = shared(ResourceDictionary::new().with("Accent", "#ff8800"));
        let panel = shared(Element::new(ElementKind::Panel).with_resources(resources.clone()));
        Element::add_child(&panel, label("Title"));

        let mut tree = VisualTree::new();
        let first = tree.insert_root(&panel).unwrap();
        let second = tree.insert_root(&panel).unwrap();
        let (a, b) = (tree.find_node(first, "Title"), tree.find_node(second, "Title"));
        assert!(a.is_some() && b.is_some());
        assert_ne!(a, b);
        assert_eq!(tree.find_resource(b.unwrap(), "Accent"), Some(Value::from("#ff8800")));

        // The parsed dictionary never sees the live names.
        assert_eq!(resources.read().find_name("Title"), None);
        assert!(!Arc::ptr_eq(&tree.scope(first).unwrap(), &resources));
    }

    #[test]
    fn test_element_name_binding() {
        let mut tree = eager();
        let panel = shared(Element::new(ElementKind::Panel));
        Element::add_child(
            &panel,
            shared(
                Element::new(ElementKind::Label)
                    .named("Source")
                    .with_property("Text", "abc"),
            ),
        );
        Element::add_child(
            &panel,
            shared(Element::new(ElementKind::Label).with_binding(
                BindingDecl::new("Text", path("Text"))
                    .source(BindingSource::ElementName("Source".into())),
            )),
        );
        let root = tree.insert_root(&panel).unwrap();
        let [source, mirror] = tree.children(root).unwrap() else {
            panic!("expected two children");
        };
        let (source, mirror) = (*source, *mirror);
        assert_eq!(tree.property(mirror, "Text").unwrap(), Value::from("abc"));

        tree.set_property(source, "Text", "xyz").unwrap();
        assert_eq!(tree.property(mirror, "Text").unwrap(), Value::from("xyz"));
    }

    #[test]
    fn test_missing_element_name_is_a_load_error() {
        let mut tree = eager();
        let element = shared(Element::new(ElementKind::Label).with_binding(
            BindingDecl::new("Text", path("Text")).source(BindingSource::ElementName("Nope".into())),
        ));
        assert!(matches!(
            tree.insert_root(&element),
            Err(SkinError::BindingSource(_))
        ));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_find_ancestor_and_two_way() {
        let mut tree = eager();
        let item = shared(
            Element::new(ElementKind::ListItem).with_property("Selected", false),
        );
        let check = shared(Element::new(ElementKind::Button).with_binding(
            BindingDecl::new("IsChecked", path("Selected"))
                .source(BindingSource::FindAncestor {
                    kind: "ListItem".into(),
                    level: 1,
                })
                .mode(BindingMode::TwoWay),
        ));
        Element::add_child(&item, check);
        let root = tree.insert_root(&item).unwrap();
        let button = tree.children(root).unwrap()[0];

        tree.set_property(button, "IsChecked", true).unwrap();
        assert_eq!(tree.property(root, "Selected").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_trigger_sets_property_on_enter_and_exit() {
        let mut tree = eager();
        let button = shared(Element::new(ElementKind::Button).with_property("Opacity", 0.5));
        Element::add_trigger(
            &button,
            Trigger::new(HAS_FOCUS, true)
                .on_enter(TriggerAction::Set {
                    target: None,
                    property: "Opacity".into(),
                    value: Value::from(1.0),
                })
                .on_exit(TriggerAction::Set {
                    target: None,
                    property: "Opacity".into(),
                    value: Value::from(0.5),
                }),
        );
        let id = tree.insert_root(&button).unwrap();

        tree.set_property(id, HAS_FOCUS, true).unwrap();
        assert_eq!(tree.property(id, "Opacity").unwrap(), Value::from(1.0));
        tree.set_property(id, HAS_FOCUS, false).unwrap();
        assert_eq!(tree.property(id, "Opacity").unwrap(), Value::from(0.5));
    }

    #[test]
    fn test_command_binding_with_property_parameter() {
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let c = calls.clone();
        let model = ObservableObject::new("Menu")
            .with_method(
                "Select",
                skin_engine_core::Method::with_arg(move |v| c.lock().push(v)),
            )
            .into_ref();

        let mut tree = eager();
        let button = shared(
            Element::new(ElementKind::Button)
                .with_property(DATA_CONTEXT, Value::Object(model))
                .with_property("Tag", "settings")
                .with_command(
                    "Click",
                    CommandDecl::method(BindingSource::DataContext, PropertyPath::default(), "Select")
                        .with_parameter(CommandParameter::Property("Tag".into())),
                ),
        );
        let id = tree.insert_root(&button).unwrap();

        tree.execute_command(id, "Click").unwrap();
        tree.set_property(id, "Tag", "home").unwrap();
        tree.execute_command(id, "Click").unwrap();
        assert_eq!(*calls.lock(), vec![Value::from("settings"), Value::from("home")]);

        assert!(matches!(
            tree.execute_command(id, "Hover"),
            Err(SkinError::CommandNotFound { .. })
        ));
    }

    #[test]
    fn test_destroy_disposes_bindings() {
        let model = ObservableObject::new("Model");
        let title = model.define("Title", "x");
        let model = model.into_ref();
        let mut tree = eager();
        let element = shared(
            Element::new(ElementKind::Label)
                .with_binding(BindingDecl::new("Text", path("Title")).source(BindingSource::Explicit(Value::Object(model)))),
        );
        let id = tree.insert_root(&element).unwrap();
        assert_eq!(tree.binding_count(id), 1);
        assert_eq!(title.subscriber_count(), 1);

        tree.destroy(id).unwrap();
        assert_eq!(title.subscriber_count(), 0);
    }

    #[test]
    fn test_reparent_moves_names_between_scopes() {
        let mut tree = VisualTree::new();
        let a = tree.insert_root(&shared(Element::new(ElementKind::Panel))).unwrap();
        let b = tree.insert_root(&shared(Element::new(ElementKind::Panel))).unwrap();
        let leaf = tree.mount(&label("Leaf"), a).unwrap();
        assert_eq!(tree.find_node(a, "Leaf"), Some(leaf));

        tree.set_parent(leaf, Some(b)).unwrap();
        assert_eq!(tree.find_node(a, "Leaf"), None);
        assert_eq!(tree.find_node(b, "Leaf"), Some(leaf));
    }

    #[derive(Default)]
    struct CountingDevice {
        primitives: usize,
    }

    impl RenderDevice for CountingDevice {
        fn draw(&mut self, _key: &BatchKey, geometry: &[GeometryHandle]) -> bool {
            self.primitives += geometry.len();
            true
        }
    }

    #[test]
    fn test_visibility_drives_pipeline() {
        let pipeline = Arc::new(BatchCompiler::new());
        let mut tree = VisualTree::new().with_pipeline(pipeline.clone());
        let panel = shared(Element::new(ElementKind::Panel));
        Element::add_child(&panel, label("Text"));
        let root = tree.insert_root(&panel).unwrap();
        let text = tree.children(root).unwrap()[0];

        tree.set_primitives(text, vec![RenderPrimitive::new(GeometryHandle(1), EffectId(0))])
            .unwrap();
        assert_eq!(pipeline.primitive_count(), 1);

        tree.set_visible(root, false).unwrap();
        assert_eq!(pipeline.primitive_count(), 0);
        assert!(!tree.is_effectively_visible(text));

        tree.set_visible(root, true).unwrap();
        let mut device = CountingDevice::default();
        pipeline.render(&mut device).unwrap();
        assert_eq!(device.primitives, 1);

        tree.destroy(root).unwrap();
        assert_eq!(pipeline.primitive_count(), 0);
    }

    #[test]
    fn test_trigger_invokes_command() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut tree = eager();
        let item = shared(Element::new(ElementKind::ListItem));
        Element::add_trigger(
            &item,
            Trigger::new(HAS_FOCUS, true).on_enter(TriggerAction::Invoke(CommandDecl::direct(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }))),
        );
        let id = tree.insert_root(&item).unwrap();
        tree.set_property(id, HAS_FOCUS, true).unwrap();
        tree.set_property(id, HAS_FOCUS, true).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_layout_hint_is_parent_relative() {
        let mut tree = VisualTree::new();
        let panel = shared(Element::new(ElementKind::Panel).at(100.0, 50.0, 400.0, 300.0));
        Element::add_child(&panel, shared(Element::new(ElementKind::Button).at(10.0, 20.0, 80.0, 30.0)));
        let root = tree.insert_root(&panel).unwrap();
        let button = tree.children(root).unwrap()[0];
        assert_eq!(tree.bounds(button).unwrap(), Rect::new(110.0, 70.0, 80.0, 30.0));
    }
}
