//! Directional focus navigation.
//!
//! [`FocusNavigator`] tracks the focused node of one screen and moves focus
//! in response to directional input. Prediction is a spatial search over the
//! screen-space bounds of focusable nodes: candidates must lie in the
//! requested direction, the nearest border wins, and center distance breaks
//! ties.
//!
//! # Strict mode
//!
//! With `strict` set, a candidate must lie entirely past the current node's
//! edge *and* share its row (for `Left`/`Right`) or column (for `Up`/`Down`).
//! A diagonal neighbour is never chosen. Without `strict`, comparing centers
//! is enough.
//!
//! # Candidates
//!
//! Collection walks the tree from the screen root. Hidden or disabled
//! subtrees contribute nothing, and a `ScrollViewer` only offers descendants
//! that intersect its viewport.
//!
//! No candidate is a normal outcome: focus stays where it is and
//! [`move_focus`](FocusNavigator::move_focus) reports the input unhandled.

use std::cmp::Ordering;

use skin_engine_core::logging::targets;
use skin_engine_core::{ElementKind, EngineConfig};
use skin_engine_render::Rect;

use crate::tree::{HAS_FOCUS, NodeId, VisualTree};

/// A navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Tracks and moves focus within a visual tree.
#[derive(Debug, Default)]
pub struct FocusNavigator {
    /// The currently focused node, if any.
    focused: Option<NodeId>,
    strict: bool,
}

impl FocusNavigator {
    /// Create a navigator with nothing focused.
    pub fn new(strict: bool) -> Self {
        Self {
            focused: None,
            strict,
        }
    }

    /// Create a navigator using [`EngineConfig::strict_focus`].
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.strict_focus)
    }

    #[inline]
    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    #[inline]
    pub fn has_focus(&self, id: NodeId) -> bool {
        self.focused == Some(id)
    }

    #[inline]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Focus `id`.
    ///
    /// Sets `HasFocus` to `false` on the previously focused node and `true` on
    /// `id`. Returns `false`, leaving focus unchanged, if `id` cannot take
    /// focus.
    pub fn set_focus(&mut self, tree: &VisualTree, id: NodeId) -> bool {
        if !tree.is_focusable(id) {
            tracing::trace!(target: targets::FOCUS, ?id, "node cannot take focus");
            return false;
        }
        if self.focused == Some(id) {
            return true;
        }
        if let Some(old) = self.focused.take() {
            Self::mark(tree, old, false);
        }
        Self::mark(tree, id, true);
        self.focused = Some(id);
        tracing::debug!(target: targets::FOCUS, ?id, "focus changed");
        true
    }

    /// Clear focus. The previously focused node's `HasFocus` becomes `false`.
    pub fn clear_focus(&mut self, tree: &VisualTree) {
        if let Some(old) = self.focused.take() {
            Self::mark(tree, old, false);
        }
    }

    fn mark(tree: &VisualTree, id: NodeId, focused: bool) {
        // The old node may have been destroyed since it took focus.
        if let Ok(cell) = tree.property_cell(id, HAS_FOCUS) {
            cell.set(focused);
        }
    }

    /// The best node to focus when moving in `direction` from `current`.
    ///
    /// Without a current node, the first focusable node in tree order is
    /// returned. `None` means there is nowhere to go.
    pub fn predict_focus(
        &self,
        tree: &VisualTree,
        root: NodeId,
        current: Option<NodeId>,
        direction: FocusDirection,
    ) -> Option<NodeId> {
        if !tree.contains(root) {
            return None;
        }
        let mut candidates = Vec::new();
        collect_candidates(tree, root, None, &mut candidates);

        let Some(current) = current.filter(|c| tree.contains(*c)) else {
            return candidates.first().map(|(id, _)| *id);
        };
        let from = tree.bounds(current).ok()?;
        let from_center = from.center();

        let best = candidates
            .into_iter()
            .filter(|(id, rect)| *id != current && rect.center() != from_center)
            .filter(|(_, rect)| self.lies_toward(direction, &from, rect))
            .map(|(id, rect)| {
                let score = (
                    from.border_distance(&rect),
                    from_center.distance(rect.center()),
                );
                (id, score)
            })
            .min_by(|(_, a), (_, b)| compare_scores(*a, *b))
            .map(|(id, _)| id);

        tracing::trace!(target: targets::FOCUS, ?current, ?direction, ?best, "predicted focus");
        best
    }

    /// Move focus in `direction`. Returns whether focus moved.
    pub fn move_focus(&mut self, tree: &VisualTree, root: NodeId, direction: FocusDirection) -> bool {
        match self.predict_focus(tree, root, self.focused, direction) {
            Some(next) => self.set_focus(tree, next),
            None => {
                tracing::debug!(target: targets::FOCUS, ?direction, "no focus candidate");
                false
            }
        }
    }

    /// Focus the next focusable node in tree order, wrapping at the end.
    pub fn focus_next(&mut self, tree: &VisualTree, root: NodeId) -> bool {
        self.focus_in_order(tree, root, true)
    }

    /// Focus the previous focusable node in tree order, wrapping at the start.
    pub fn focus_previous(&mut self, tree: &VisualTree, root: NodeId) -> bool {
        self.focus_in_order(tree, root, false)
    }

    fn focus_in_order(&mut self, tree: &VisualTree, root: NodeId, forward: bool) -> bool {
        let mut order = Vec::new();
        collect_candidates(tree, root, None, &mut order);
        if order.is_empty() {
            return false;
        }
        let len = order.len();
        let next = match self.focused.and_then(|f| order.iter().position(|(id, _)| *id == f)) {
            Some(pos) if forward => (pos + 1) % len,
            Some(pos) => (pos + len - 1) % len,
            None if forward => 0,
            None => len - 1,
        };
        self.set_focus(tree, order[next].0)
    }

    fn lies_toward(&self, direction: FocusDirection, from: &Rect, to: &Rect) -> bool {
        if self.strict {
            match direction {
                FocusDirection::Down => to.top() >= from.bottom() && from.overlaps_horizontally(to),
                FocusDirection::Up => to.bottom() <= from.top() && from.overlaps_horizontally(to),
                FocusDirection::Right => to.left() >= from.right() && from.overlaps_vertically(to),
                FocusDirection::Left => to.right() <= from.left() && from.overlaps_vertically(to),
            }
        } else {
            let (a, b) = (from.center(), to.center());
            match direction {
                FocusDirection::Down => b.y > a.y,
                FocusDirection::Up => b.y < a.y,
                FocusDirection::Right => b.x > a.x,
                FocusDirection::Left => b.x < a.x,
            }
        }
    }
}

fn compare_scores(a: (f32, f32), b: (f32, f32)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1))
}

/// Focusable nodes under `id` in tree order, with their bounds.
fn collect_candidates(
    tree: &VisualTree,
    id: NodeId,
    viewport: Option<Rect>,
    out: &mut Vec<(NodeId, Rect)>,
) {
    if !tree.is_visible(id) || !tree.is_enabled(id) {
        return;
    }
    let Ok(bounds) = tree.bounds(id) else {
        return;
    };
    let in_view = viewport.is_none_or(|v| v.overlaps_horizontally(&bounds) && v.overlaps_vertically(&bounds));
    if in_view && tree.is_focusable(id) {
        out.push((id, bounds));
    }

    let viewport = match tree.kind(id) {
        Ok(ElementKind::ScrollViewer) => match viewport {
            None => Some(bounds),
            Some(outer) => match outer.intersect(&bounds) {
                Some(inner) => Some(inner),
                None => return,
            },
        },
        _ => viewport,
    };
    let Ok(children) = tree.children(id) else {
        return;
    };
    for &child in children {
        collect_candidates(tree, child, viewport, out);
    }
}
