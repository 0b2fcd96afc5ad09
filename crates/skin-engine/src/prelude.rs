//! Prelude module for the skin engine.
//!
//! ```
//! use skin_engine::prelude::*;
//! ```
//!
//! This provides access to:
//! - Values and observable properties (`Value`, `PropertyCell`, `ObservableObject`)
//! - Bindings and commands (`BindingDecl`, `BindingSource`, `CommandDecl`)
//! - The skin object model (`Element`, `Template`, `Trigger`, `ResourceDictionary`)
//! - The live tree, templates and focus (`VisualTree`, `TemplateLoader`, `FocusNavigator`)
//! - Geometry and render types (`Rect`, `RenderPrimitive`, `BatchCompiler`)

// ============================================================================
// Values and Properties
// ============================================================================

pub use crate::{Bindable, ObjectRef, ObservableObject, PropertyCell, Value};

// ============================================================================
// Bindings and Commands
// ============================================================================

pub use crate::{
    BindingDecl, BindingMode, BindingSource, CommandDecl, CommandParameter, Method, PropertyPath,
    ValueConverter,
};

// ============================================================================
// Skin Object Model
// ============================================================================

pub use crate::{
    Element, ElementKind, MemorySkinSource, ResourceDictionary, Shared, SkinSource, Template,
    Trigger, TriggerAction, shared,
};

// ============================================================================
// Live Tree
// ============================================================================

pub use crate::{
    FocusDirection, FocusNavigator, NodeId, SkinError, SkinResult, TemplateLoader, TreeDebug,
    VisualTree,
};

// ============================================================================
// Threading and Configuration
// ============================================================================

pub use crate::{DispatchHandle, EngineConfig, UiDispatcher};

// ============================================================================
// Rendering
// ============================================================================

pub use crate::render::{
    BatchCompiler, Color, EffectId, GeometryHandle, Point, Rect, RenderDevice, RenderPrimitive,
    Size, TextureHandle,
};
