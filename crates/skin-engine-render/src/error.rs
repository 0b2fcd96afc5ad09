//! Error types for the render crate.

use thiserror::Error;

use crate::batch::PrimitiveId;

/// Errors that can occur during batch compilation and rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The primitive is not registered with the compiler.
    #[error("unknown render primitive {0:?}")]
    UnknownPrimitive(PrimitiveId),

    /// The render device is gone; nothing can be drawn until it is recreated.
    #[error("render device lost")]
    DeviceLost,
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
