//! Skin Engine - a declarative UI scene-graph runtime.
//!
//! This is the umbrella crate. It re-exports the object model from
//! [`skin_engine_core`], exposes the batch compiler as [`render`], and adds
//! the live [`VisualTree`], template instantiation and focus navigation.
//!
//! # Example
//!
//! ```
//! use skin_engine::prelude::*;
//!
//! let model = ObservableObject::new("NowPlaying").with_property("Title", "Intro").into_ref();
//!
//! let label = Element::new(ElementKind::Label)
//!     .with_binding(BindingDecl::new("Text", PropertyPath::parse("Title").unwrap()));
//! let panel = shared(Element::new(ElementKind::Panel).with_property("DataContext", model.clone()));
//! Element::add_child(&panel, shared(label));
//!
//! let mut tree = VisualTree::new();
//! let root = tree.insert_root(&panel).unwrap();
//! tree.set_root(root).unwrap();
//!
//! let text = tree.children(root).unwrap()[0];
//! assert_eq!(tree.property(text, "Text").unwrap(), Value::from("Intro"));
//!
//! model.property("Title").unwrap().set("Chapter 1");
//! assert_eq!(tree.property(text, "Text").unwrap(), Value::from("Chapter 1"));
//! ```
//!
//! # Threading
//!
//! A [`VisualTree`] and everything mounted in it belong to one owner thread.
//! Worker threads hand results over through a
//! [`DispatchHandle`](skin_engine_core::DispatchHandle); the owner drains
//! them with [`UiDispatcher::process_pending`](skin_engine_core::UiDispatcher::process_pending).
//! The [`render::BatchCompiler`] is internally locked and may be shared with
//! a render thread.

pub use skin_engine_core::*;

/// Render batch compilation.
pub mod render {
    pub use skin_engine_render::*;
}

pub mod debug;
mod error;
pub mod focus;
pub mod prelude;
pub mod template;
pub mod tree;

pub use debug::TreeDebug;
pub use error::{SkinError, SkinResult};
pub use focus::{FocusDirection, FocusNavigator};
pub use template::TemplateLoader;
pub use tree::{DATA_CONTEXT, HAS_FOCUS, IS_ENABLED, IS_VISIBLE, NodeId, NodeProperties, VisualTree};

static_assertions::assert_impl_all!(VisualTree: Send, Sync);
static_assertions::assert_impl_all!(NodeProperties: Send, Sync);
