//! Error types for the visual tree.

use skin_engine_core::CoreError;
use thiserror::Error;

/// Errors raised while building or driving the live visual tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkinError {
    /// The node id is invalid or the node has been destroyed.
    #[error("invalid or destroyed node id")]
    InvalidNode,

    /// Attempted to make a node its own parent or ancestor.
    #[error("cannot set a node as its own parent or ancestor")]
    CircularParentage,

    /// A binding, command or trigger refers to a source that does not exist.
    #[error("unresolvable binding source: {0}")]
    BindingSource(String),

    /// No command is registered for the event.
    #[error("no command for event '{event}'")]
    CommandNotFound {
        /// The event name, e.g. `"Click"`.
        event: String,
    },

    /// An error from the skin object model.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for visual tree operations.
pub type SkinResult<T> = Result<T, SkinError>;
