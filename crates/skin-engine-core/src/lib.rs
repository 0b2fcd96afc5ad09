//! Core systems for the skin engine.
//!
//! This crate provides the data layer of the declarative UI runtime:
//!
//! - **Values**: a tagged union for loosely typed skin data, with cast-or-fail accessors
//! - **Signals and property cells**: synchronous, ordered change notification
//! - **Bindings**: path-based data flow between cells, with converters and a loop guard
//! - **Commands**: method references resolved once at bind time
//! - **Skin object model**: elements, triggers, templates and resource dictionaries
//! - **Deep copy**: memoizing graph copies for template instantiation
//! - **UI dispatcher**: delivery of worker-thread results to the owner thread
//!
//! # Binding Example
//!
//! ```
//! use skin_engine_core::{
//!     Binding, BindingDecl, BindingSource, ObservableObject, PropertyCell, PropertyPath, Value,
//! };
//!
//! let item = ObservableObject::new("Episode").with_property("Title", "Episode 1").into_ref();
//! let text = PropertyCell::new(Value::Null);
//!
//! let decl = BindingDecl::new("Text", PropertyPath::parse("Title").unwrap())
//!     .source(BindingSource::Explicit(Value::Object(item.clone())));
//! let binding = Binding::initialize(decl, Value::Object(item.clone()), text.clone()).unwrap();
//! assert_eq!(text.get(), Value::from("Episode 1"));
//!
//! item.property("Title").unwrap().set("Episode 2");
//! assert_eq!(text.get(), Value::from("Episode 2"));
//!
//! binding.dispose();
//! ```
//!
//! # Threading
//!
//! Property cells, bindings and the skin object graph belong to a single
//! owner thread. Worker threads post closures through a [`DispatchHandle`];
//! the owner thread runs them with [`UiDispatcher::process_pending`].

pub mod bindable;
pub mod binding;
pub mod command;
pub mod config;
pub mod copy;
pub mod dispatch;
pub mod element;
mod error;
pub mod logging;
pub mod path;
pub mod property;
pub mod resources;
pub mod signal;
pub mod thread_check;
pub mod value;

pub use bindable::{Bindable, ObjectRef, ObservableObject};
pub use binding::{
    Binding, BindingDecl, BindingMode, BindingSource, FnConverter, ValueConverter, bind_to_object,
};
pub use command::{BoundCommand, Callable, CommandDecl, CommandDescriptor, CommandParameter, Method};
pub use config::EngineConfig;
pub use copy::{CopyManager, DeepCopy, ExternalRefs, deep_copy_graph};
pub use dispatch::{DispatchHandle, QueuedInvocation, UiDispatcher};
pub use element::{
    Element, ElementKind, Orientation, Shared, Template, Trigger, TriggerAction, WeakShared, shared,
};
pub use error::{CoreError, CoreResult};
pub use logging::{PerfSpan, TreeFormatOptions, TreeStyle};
pub use path::{PathSegment, PathTarget, PropertyPath};
pub use property::{PropertyCell, SubscriberKey, Subscription, WeakPropertyCell};
pub use resources::{MemorySkinSource, ResourceDictionary, SkinSource};
pub use signal::{ConnectionGuard, ConnectionId, Signal};
pub use thread_check::{ThreadAffinity, set_thread_checks_enabled, thread_checks_enabled};
pub use value::{LocalizedString, Localizer, Value, ValueKind};
