//! Error types for the skin engine core.

use thiserror::Error;

/// Errors raised by the property, binding, command and resource systems.
///
/// Everything here is a configuration error in the sense of the skin loader:
/// it is reported when a fragment is loaded or a binding is activated, and the
/// affected fragment is expected not to go live.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// The named property does not exist on the object.
    #[error("property '{name}' not found")]
    PropertyNotFound {
        /// The name of the missing property.
        name: String,
    },

    /// A value had a different kind than required.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// The kind that was required.
        expected: &'static str,
        /// The kind that was found.
        got: &'static str,
    },

    /// A binding or command path could not be resolved against its source.
    #[error("path '{path}' could not be resolved")]
    PathUnresolved {
        /// The textual path expression.
        path: String,
    },

    /// The command target does not expose the requested method.
    #[error("method '{name}' not found on command target")]
    MethodNotFound {
        /// The method name.
        name: String,
    },

    /// A method command was bound without a target object.
    #[error("command target could not be resolved")]
    CommandTargetMissing,

    /// The UI dispatcher has been dropped and no longer accepts work.
    #[error("UI dispatcher has been shut down")]
    DispatcherClosed,

    /// A different instance is already registered under this name in the scope.
    #[error("name '{name}' is already registered in this scope")]
    DuplicateName {
        /// The conflicting name.
        name: String,
    },

    /// A keyed resource could not be found in the scope chain.
    #[error("resource '{key}' not found")]
    ResourceNotFound {
        /// The resource key.
        key: String,
    },

    /// The host could not resolve a `Source` reference.
    #[error("skin source '{path}' could not be resolved")]
    SourceNotFound {
        /// The unresolved source path.
        path: String,
    },

    /// A `ResourceDictionary.Source` resolved to something other than a dictionary.
    #[error("skin source '{path}' does not contain a resource dictionary")]
    NotADictionary {
        /// The offending source path.
        path: String,
    },

    /// A resource dictionary merges itself, directly or through other dictionaries.
    #[error("resource dictionary includes itself via {via}")]
    CircularDictionary {
        /// The merged dictionary or source path that closed the loop.
        via: String,
    },

    /// Engine configuration could not be parsed.
    #[error("invalid engine configuration: {0}")]
    Config(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
