//! Template instantiation, includes and items generation.
//!
//! A [`Template`] is never mounted directly. Each use deep-copies its root
//! with [`ExternalRefs::Cut`], so every instance owns private elements,
//! triggers and resource dictionaries, then mounts the copy under the host
//! node with a fresh name scope. Names declared inside a template therefore
//! never collide between instances.

use std::sync::Arc;

use skin_engine_core::logging::{span_names, targets};
use skin_engine_core::{
    CoreError, Element, ExternalRefs, PerfSpan, ResourceDictionary, Shared, SkinSource, Template,
    Value, deep_copy_graph,
};

use crate::error::SkinResult;
use crate::tree::{NodeId, VisualTree};

/// Expands templates and includes into a [`VisualTree`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateLoader;

impl TemplateLoader {
    pub fn new() -> Self {
        Self
    }

    /// Mount a private copy of `template` under `parent`.
    ///
    /// `parent` becomes the templated parent of every node in the copy. With
    /// `data_context` the copy's root gets an explicit data context;
    /// otherwise it inherits the parent's.
    #[tracing::instrument(skip(self, tree, template, data_context), target = "skin_engine::template", level = "debug")]
    pub fn instantiate(
        &self,
        tree: &mut VisualTree,
        template: &Template,
        parent: NodeId,
        data_context: Option<Value>,
    ) -> SkinResult<NodeId> {
        let _span = PerfSpan::new(span_names::INSTANTIATE);
        let root = deep_copy_graph(&template.root, ExternalRefs::Cut);
        let id = tree.mount_template(&root, parent, data_context.as_ref())?;
        tracing::debug!(
            target: targets::TEMPLATE,
            key = template.key.as_deref().unwrap_or("(implicit)"),
            nodes = tree.preorder(id).len(),
            "template instantiated"
        );
        Ok(id)
    }

    /// Mount an include element, loading the referenced fragment from `source`.
    ///
    /// The fragment is copied before mounting and gets its own name scope
    /// below the include node.
    pub fn load_include(
        &self,
        tree: &mut VisualTree,
        include: &Shared<Element>,
        parent: NodeId,
        source: &dyn SkinSource,
    ) -> SkinResult<NodeId> {
        tree.mount_include(include, parent, source)
    }

    /// Pick the template for `data` from `resources` and its outer scopes.
    ///
    /// A template stored under the item's type key (or its value kind for
    /// plain data) wins. Otherwise templates are matched on their data type,
    /// and among several matches the one with the smallest key is used.
    pub fn select_template(&self, resources: &ResourceDictionary, data: &Value) -> Option<Arc<Template>> {
        let type_key = match data {
            Value::Object(object) => object.type_key().to_string(),
            other => other.kind().name().to_string(),
        };
        let matches = |dictionary: &ResourceDictionary| {
            if let Some(template) = dictionary.get(&type_key).and_then(|v| v.as_template().ok().cloned()) {
                return Some(template);
            }
            let mut candidates: Vec<(&str, &Arc<Template>)> = dictionary
                .iter()
                .filter_map(|(key, value)| value.as_template().ok().map(|t| (key, t)))
                .filter(|(_, template)| template.data_type.as_deref() == Some(type_key.as_str()))
                .collect();
            candidates.sort_by_key(|(key, _)| *key);
            candidates.first().map(|(_, template)| Arc::clone(template))
        };

        if let Some(found) = matches(resources) {
            return Some(found);
        }
        let mut scope = resources.parent_scope();
        while let Some(current) = scope {
            let dictionary = current.read();
            if let Some(found) = matches(&dictionary) {
                return Some(found);
            }
            scope = dictionary.parent_scope();
        }
        tracing::debug!(target: targets::TEMPLATE, %type_key, "no template for item type");
        None
    }

    /// Replace the children of `items_control` with one template instance per item.
    ///
    /// Each instance gets its item as data context. Without an explicit
    /// `template`, one is selected per item from the control's scope chain.
    pub fn populate_items(
        &self,
        tree: &mut VisualTree,
        items_control: NodeId,
        items: &[Value],
        template: Option<&Arc<Template>>,
    ) -> SkinResult<Vec<NodeId>> {
        for child in tree.children(items_control)?.to_vec() {
            tree.destroy(child)?;
        }

        let mut created = Vec::with_capacity(items.len());
        for item in items {
            let selected = match template {
                Some(template) => template.clone(),
                None => tree
                    .scope(items_control)
                    .and_then(|scope| self.select_template(&scope.read(), item))
                    .ok_or_else(|| CoreError::ResourceNotFound {
                        key: match item {
                            Value::Object(object) => object.type_key().to_string(),
                            other => other.kind().name().to_string(),
                        },
                    })?,
            };
            created.push(self.instantiate(tree, &selected, items_control, Some(item.clone()))?);
        }
        tracing::debug!(target: targets::TEMPLATE, count = created.len(), "items populated");
        Ok(created)
    }
}
