//! Render batch compilation for the skin engine.
//!
//! This crate turns the per-frame visual output of a skin into a small number
//! of draw calls. It knows nothing about any graphics API: primitives carry
//! opaque handles and batches are drawn through the [`RenderDevice`] trait.
//!
//! # Batching
//!
//! Primitives that share an effect, an effect parameter set and a texture are
//! drawn together:
//!
//! ```
//! use skin_engine_render::{
//!     BatchCompiler, BatchKey, EffectId, GeometryHandle, RenderDevice, RenderPrimitive,
//!     TextureHandle,
//! };
//!
//! struct CountingDevice(usize);
//!
//! impl RenderDevice for CountingDevice {
//!     fn draw(&mut self, _key: &BatchKey, _geometry: &[GeometryHandle]) -> bool {
//!         self.0 += 1;
//!         true
//!     }
//! }
//!
//! let compiler = BatchCompiler::new();
//! let poster = TextureHandle(9);
//! for g in 0..10 {
//!     compiler.add(RenderPrimitive::new(GeometryHandle(g), EffectId(1)).with_texture(poster));
//! }
//!
//! let mut device = CountingDevice(0);
//! compiler.render(&mut device).unwrap();
//! assert_eq!(device.0, 1);
//! ```
//!
//! # Geometry
//!
//! [`Point`], [`Size`] and [`Rect`] are shared with layout and focus search in
//! the engine crate.

pub mod batch;
mod error;
pub mod types;

pub use batch::{
    BatchCompiler, BatchId, BatchKey, EffectId, EffectParameters, GeometryHandle, ParamValue,
    PrimitiveId, RenderBatch, RenderDevice, RenderPrimitive, RenderStats, TextureHandle,
};
pub use error::{RenderError, RenderResult};
pub use types::{Color, Point, Rect, Size};
