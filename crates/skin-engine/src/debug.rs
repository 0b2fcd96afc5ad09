//! Visual tree debugging utilities.
//!
//! [`TreeDebug`] renders a [`VisualTree`] (or one subtree) as an indented
//! outline, for logging and for inspecting template expansion by eye:
//!
//! ```text
//! Visual tree (3 nodes):
//! Root [NodeId(1v1)] (Panel)
//! ├── Play [NodeId(2v1)] (Button)
//! └── (unnamed) [NodeId(3v1)] (Label)
//! ```

use std::fmt;

use skin_engine_core::{TreeFormatOptions, TreeStyle, Value};

use crate::tree::{NodeId, VisualTree};

/// Formats a visual tree for display.
pub struct TreeDebug<'a> {
    tree: &'a VisualTree,
    options: TreeFormatOptions,
    root: Option<NodeId>,
}

impl<'a> TreeDebug<'a> {
    /// Format every root of `tree` with default options.
    pub fn new(tree: &'a VisualTree) -> Self {
        Self {
            tree,
            options: TreeFormatOptions::default(),
            root: None,
        }
    }

    pub fn with_options(mut self, options: TreeFormatOptions) -> Self {
        self.options = options;
        self
    }

    /// Only format the subtree rooted at `root`.
    pub fn subtree(mut self, root: NodeId) -> Self {
        self.root = Some(root);
        self
    }

    fn write_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: NodeId,
        depth: usize,
        indent: &str,
        last: bool,
    ) -> fmt::Result {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }
        let Ok(kind) = self.tree.kind(id) else {
            return writeln!(f, "{indent}(destroyed) [{id:?}]");
        };
        let style = self.options.style;

        let connector = if depth == 0 { "" } else { style.branch(last) };
        let name = self.tree.name(id).ok().flatten().unwrap_or("(unnamed)");
        write!(f, "{indent}{connector}{name}")?;
        if self.options.show_ids {
            write!(f, " [{id:?}]")?;
        }
        if self.options.show_kinds {
            write!(f, " ({})", kind.name())?;
        }
        if self.options.show_bounds {
            if let Ok(b) = self.tree.bounds(id) {
                write!(f, " @ {},{} {}x{}", b.left(), b.top(), b.width(), b.height())?;
            }
            if !self.tree.is_visible(id) {
                f.write_str(" hidden")?;
            }
        }
        writeln!(f)?;

        let child_indent = if depth == 0 {
            indent.to_string()
        } else {
            format!("{indent}{}", style.continuation(last))
        };

        if self.options.show_properties {
            for (name, value) in self.properties(id) {
                let pad = if style == TreeStyle::Compact { "  " } else { "" };
                writeln!(f, "{child_indent}{pad}  .{name} = {value:?}")?;
            }
        }

        let children = self.tree.children(id).map(<[NodeId]>::to_vec).unwrap_or_default();
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            let child_indent = if style == TreeStyle::Compact {
                format!("{child_indent}  ")
            } else {
                child_indent.clone()
            };
            self.write_node(f, child, depth + 1, &child_indent, i + 1 == count)?;
        }
        Ok(())
    }

    fn properties(&self, id: NodeId) -> Vec<(String, Value)> {
        let names = self.tree.property_names(id).unwrap_or_default();
        names
            .into_iter()
            .filter_map(|name| self.tree.property(id, &name).ok().map(|value| (name, value)))
            .collect()
    }
}

impl fmt::Display for TreeDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(root) = self.root {
            return self.write_node(f, root, 0, "", true);
        }
        writeln!(f, "Visual tree ({} nodes):", self.tree.len())?;
        let roots = self.tree.roots();
        if roots.is_empty() {
            return writeln!(f, "  (empty)");
        }
        for root in roots {
            self.write_node(f, root, 0, "", true)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TreeDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeDebug")
            .field("options", &self.options)
            .field("root", &self.root)
            .finish()
    }
}
