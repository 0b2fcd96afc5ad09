//! Logging and debugging facilities for the skin engine.
//!
//! This module provides:
//! - Target and span names for the `tracing` crate
//! - Shared formatting options for visual tree dumps
//! - Performance tracing hooks for profiling
//!
//! # Tracing Integration
//!
//! The engine uses the `tracing` crate for instrumentation. To see logs, the
//! host installs a subscriber:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("skin_engine_core::binding=trace,skin_engine::focus=debug")
//!     .init();
//! ```

/// Span names used for tracing.
pub mod span_names {
    /// Render pass span.
    pub const RENDER: &str = "skin_engine::render";
    /// Template instantiation span.
    pub const INSTANTIATE: &str = "skin_engine::instantiate";
    /// Subtree teardown span.
    pub const DESTROY: &str = "skin_engine::destroy";
    /// Dispatcher queue processing span.
    pub const DISPATCH: &str = "skin_engine::dispatch";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Property cell target.
    pub const PROPERTY: &str = "skin_engine_core::property";
    /// Binding and command target.
    pub const BINDING: &str = "skin_engine_core::binding";
    /// Signal target.
    pub const SIGNAL: &str = "skin_engine_core::signal";
    /// UI dispatcher target.
    pub const DISPATCH: &str = "skin_engine_core::dispatch";
    /// Deep copy target.
    pub const COPY: &str = "skin_engine::copy";
    /// Render batch compiler target.
    pub const BATCH: &str = "skin_engine_render::batch";
    /// Visual tree and name scope target.
    pub const TREE: &str = "skin_engine::tree";
    /// Template and include loading target.
    pub const TEMPLATE: &str = "skin_engine::template";
    /// Focus navigation target.
    pub const FOCUS: &str = "skin_engine::focus";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

impl TreeStyle {
    /// Branch connector for an entry; `last` marks the final sibling.
    pub fn branch(self, last: bool) -> &'static str {
        match (self, last) {
            (Self::Ascii, false) => "|-- ",
            (Self::Ascii, true) => "`-- ",
            (Self::Unicode, false) => "├── ",
            (Self::Unicode, true) => "└── ",
            (Self::Compact, _) => "",
        }
    }

    /// Continuation prefix below an entry; `last` marks the final sibling.
    pub fn continuation(self, last: bool) -> &'static str {
        match (self, last) {
            (Self::Ascii, false) => "|   ",
            (Self::Unicode, false) => "│   ",
            (Self::Ascii | Self::Unicode, true) => "    ",
            (Self::Compact, _) => "",
        }
    }
}

/// Configuration for tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show node ids.
    pub show_ids: bool,
    /// Whether to show element kinds.
    pub show_kinds: bool,
    /// Whether to show property values.
    pub show_properties: bool,
    /// Whether to show screen bounds.
    pub show_bounds: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_kinds: true,
            show_properties: false,
            show_bounds: false,
            max_depth: None,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_properties: true,
            show_bounds: true,
            ..Default::default()
        }
    }

    /// Create options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_kinds: false,
            ..Default::default()
        }
    }
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a performance span named `name`.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "skin_engine::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}
