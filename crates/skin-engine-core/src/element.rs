//! The skin object model.
//!
//! These are the already-parsed objects a skin loader hands to the engine:
//! element sub-graphs with their declared bindings, commands and triggers,
//! resource dictionaries, and templates. They are plain data. Nothing here is
//! live; the visual tree instantiates deep copies of them.
//!
//! Element graphs are shared through [`Shared`] handles (`Arc<RwLock<_>>`).
//! Back references such as [`Element::logical_parent`] and [`Trigger::owner`]
//! are [`WeakShared`] and are rewritten by the [`CopyManager`] when a graph is
//! copied.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::binding::BindingDecl;
use crate::command::CommandDecl;
use crate::copy::{CopyManager, DeepCopy};
use crate::resources::ResourceDictionary;
use crate::value::Value;

/// A shared, lockable node of the skin object graph.
pub type Shared<T> = Arc<RwLock<T>>;

/// A non-owning reference into the skin object graph.
pub type WeakShared<T> = Weak<RwLock<T>>;

/// Wrap a value in a [`Shared`] handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// Stacking direction of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Left to right.
    Horizontal,
    /// Top to bottom.
    #[default]
    Vertical,
}

/// What an element is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// A plain container.
    Panel,
    /// A container stacking its children.
    StackPanel {
        /// Stacking direction.
        orientation: Orientation,
    },
    /// A text label.
    Label,
    /// A clickable button.
    Button,
    /// An image.
    Image,
    /// One entry in an items control.
    ListItem,
    /// A container generating one child per data item.
    ItemsControl,
    /// A clipping container; focus search stays inside its viewport.
    ScrollViewer,
    /// A placeholder showing its `Content` property.
    ContentPresenter,
    /// A fragment loaded from another skin file.
    Include {
        /// Host path of the included fragment.
        source: String,
    },
}

impl ElementKind {
    /// The kind's name as written in skin files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Panel => "Panel",
            Self::StackPanel { .. } => "StackPanel",
            Self::Label => "Label",
            Self::Button => "Button",
            Self::Image => "Image",
            Self::ListItem => "ListItem",
            Self::ItemsControl => "ItemsControl",
            Self::ScrollViewer => "ScrollViewer",
            Self::ContentPresenter => "ContentPresenter",
            Self::Include { .. } => "Include",
        }
    }

    /// Whether elements of this kind take focus unless told otherwise.
    pub fn focusable_by_default(&self) -> bool {
        matches!(self, Self::Button | Self::ListItem)
    }
}

/// One parsed skin element.
#[derive(Debug)]
pub struct Element {
    /// Element kind.
    pub kind: ElementKind,
    /// Optional `x:Name`, registered in the enclosing name scope.
    pub name: Option<String>,
    /// Literal property values.
    pub properties: BTreeMap<String, Value>,
    /// Declared bindings.
    pub bindings: Vec<BindingDecl>,
    /// Declared commands, keyed by the event that runs them (e.g. `"Click"`).
    pub commands: BTreeMap<String, CommandDecl>,
    /// Property triggers.
    pub triggers: Vec<Shared<Trigger>>,
    /// Resources declared on the element.
    pub resources: Option<Shared<ResourceDictionary>>,
    /// Child elements, in order.
    pub children: Vec<Shared<Element>>,
    /// Whether the element takes focus.
    pub focusable: bool,
    /// The element this one was declared inside.
    pub logical_parent: WeakShared<Element>,
}

impl Element {
    /// Create an element of `kind` with no properties.
    pub fn new(kind: ElementKind) -> Self {
        let focusable = kind.focusable_by_default();
        Self {
            kind,
            name: None,
            properties: BTreeMap::new(),
            bindings: Vec::new(),
            commands: BTreeMap::new(),
            triggers: Vec::new(),
            resources: None,
            children: Vec::new(),
            focusable,
            logical_parent: Weak::new(),
        }
    }

    /// Set the name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a literal property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Add a binding.
    pub fn with_binding(mut self, binding: BindingDecl) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Add a command for `event`.
    pub fn with_command(mut self, event: impl Into<String>, command: CommandDecl) -> Self {
        self.commands.insert(event.into(), command);
        self
    }

    /// Attach a resource dictionary.
    pub fn with_resources(mut self, resources: Shared<ResourceDictionary>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Override the focusable flag.
    pub fn focusable(mut self, focusable: bool) -> Self {
        self.focusable = focusable;
        self
    }

    /// Set the layout rectangle hint (`Left`, `Top`, `Width`, `Height`).
    pub fn at(self, left: f64, top: f64, width: f64, height: f64) -> Self {
        self.with_property("Left", left)
            .with_property("Top", top)
            .with_property("Width", width)
            .with_property("Height", height)
    }

    /// Look up a literal property.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Append `child` to `parent` and point the child's logical parent at it.
    pub fn add_child(parent: &Shared<Element>, child: Shared<Element>) {
        child.write().logical_parent = Arc::downgrade(parent);
        parent.write().children.push(child);
    }

    /// Attach `trigger` to `owner` and point the trigger's owner at it.
    pub fn add_trigger(owner: &Shared<Element>, trigger: Trigger) {
        let mut trigger = trigger;
        trigger.owner = Arc::downgrade(owner);
        owner.write().triggers.push(shared(trigger));
    }
}

impl DeepCopy for Element {
    fn empty_copy(&self) -> Self {
        Element::new(self.kind.clone())
    }

    fn deep_copy(&mut self, source: &Self, cm: &mut CopyManager) {
        self.name = source.name.clone();
        self.properties = source
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), cm.copy_value(v)))
            .collect();
        self.bindings = source.bindings.iter().map(|b| b.deep_copy(cm)).collect();
        self.commands = source
            .commands
            .iter()
            .map(|(k, c)| (k.clone(), c.deep_copy(cm)))
            .collect();
        self.triggers = source.triggers.iter().map(|t| cm.copy(t)).collect();
        self.resources = source.resources.as_ref().map(|r| cm.copy(r));
        self.children = source.children.iter().map(|c| cm.copy(c)).collect();
        self.focusable = source.focusable;
        self.logical_parent = cm.copy_weak(&source.logical_parent);
    }
}

/// What a trigger does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerAction {
    /// Set a property on the owner, or on a named element in its scope.
    Set {
        /// Target element name; `None` means the trigger's owner.
        target: Option<String>,
        /// Property to set.
        property: String,
        /// Value to store.
        value: Value,
    },
    /// Run a command.
    Invoke(CommandDecl),
}

impl TriggerAction {
    fn deep_copy(&self, cm: &mut CopyManager) -> Self {
        match self {
            Self::Set { target, property, value } => Self::Set {
                target: target.clone(),
                property: property.clone(),
                value: cm.copy_value(value),
            },
            Self::Invoke(command) => Self::Invoke(command.deep_copy(cm)),
        }
    }
}

/// Runs actions when a property of its owner enters or leaves a value.
#[derive(Debug, Default)]
pub struct Trigger {
    /// The watched property.
    pub property: String,
    /// The value that activates the trigger.
    pub value: Value,
    /// Actions run when the property becomes equal to `value`.
    pub enter_actions: Vec<TriggerAction>,
    /// Actions run when the property stops being equal to `value`.
    pub exit_actions: Vec<TriggerAction>,
    /// The element carrying the trigger.
    pub owner: WeakShared<Element>,
}

impl Trigger {
    /// A trigger watching `property` for `value`.
    pub fn new(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Add an enter action.
    pub fn on_enter(mut self, action: TriggerAction) -> Self {
        self.enter_actions.push(action);
        self
    }

    /// Add an exit action.
    pub fn on_exit(mut self, action: TriggerAction) -> Self {
        self.exit_actions.push(action);
        self
    }
}

impl DeepCopy for Trigger {
    fn empty_copy(&self) -> Self {
        Trigger::default()
    }

    fn deep_copy(&mut self, source: &Self, cm: &mut CopyManager) {
        self.property = source.property.clone();
        self.value = cm.copy_value(&source.value);
        self.enter_actions = source.enter_actions.iter().map(|a| a.deep_copy(cm)).collect();
        self.exit_actions = source.exit_actions.iter().map(|a| a.deep_copy(cm)).collect();
        self.owner = cm.copy_weak(&source.owner);
    }
}

/// An unexpanded element sub-graph, cloned on every use.
#[derive(Debug)]
pub struct Template {
    /// Resource key, if the template is keyed.
    pub key: Option<String>,
    /// Data type key for implicit selection.
    pub data_type: Option<String>,
    /// The sub-graph to clone.
    pub root: Shared<Element>,
}

impl Template {
    /// Wrap `root` as an unkeyed template.
    pub fn new(root: Element) -> Self {
        Self {
            key: None,
            data_type: None,
            root: shared(root),
        }
    }

    /// Set the resource key.
    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Select this template implicitly for data of `data_type`.
    pub fn for_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Wrap into a shareable handle.
    pub fn into_shared(self) -> Arc<Template> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::{deep_copy_graph, ExternalRefs};

    #[test]
    fn test_add_child_sets_logical_parent() {
        let panel = shared(Element::new(ElementKind::Panel));
        let label = shared(Element::new(ElementKind::Label));
        Element::add_child(&panel, label.clone());
        let parent = label.read().logical_parent.upgrade().unwrap();
        assert!(Arc::ptr_eq(&parent, &panel));
    }

    #[test]
    fn test_trigger_owner_rewritten_by_copy() {
        let button = shared(Element::new(ElementKind::Button).named("Play"));
        Element::add_trigger(
            &button,
            Trigger::new("HasFocus", true).on_enter(TriggerAction::Set {
                target: None,
                property: "Opacity".into(),
                value: Value::from(1.0),
            }),
        );

        let copy = deep_copy_graph(&button, ExternalRefs::Cut);
        let copied = copy.read();
        let trigger = copied.triggers[0].read();
        let owner = trigger.owner.upgrade().unwrap();
        assert!(Arc::ptr_eq(&owner, &copy));
        assert!(!Arc::ptr_eq(&owner, &button));
        assert_eq!(copied.name.as_deref(), Some("Play"));
    }

    #[test]
    fn test_focusable_defaults() {
        assert!(Element::new(ElementKind::Button).focusable);
        assert!(!Element::new(ElementKind::Label).focusable);
        assert!(Element::new(ElementKind::Label).focusable(true).focusable);
    }
}
