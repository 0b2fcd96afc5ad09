//! Render batch compilation.
//!
//! Visual nodes register [`RenderPrimitive`]s with a [`BatchCompiler`]. The
//! compiler groups primitives that share an (effect, parameters, texture)
//! key into [`RenderBatch`]es so each group is drawn with one state change.
//!
//! # Frame modes
//!
//! Each [`render`](BatchCompiler::render) call runs in one of two modes:
//!
//! - **Stable**: existing batches are kept and only primitives added since the
//!   previous frame are placed. Placement is additive; placed primitives never
//!   move.
//! - **Dirty**: every batch is discarded and rebuilt from all known
//!   primitives. Entered after [`remove_many`](BatchCompiler::remove_many) or
//!   [`invalidate`](BatchCompiler::invalidate).
//!
//! Batches are drawn in creation order. Z-order is whatever order the
//! primitives were added in; the compiler never sorts.
//!
//! # Example
//!
//! ```
//! use skin_engine_render::{BatchCompiler, BatchKey, EffectId, GeometryHandle, RenderDevice, RenderPrimitive};
//!
//! struct NullDevice;
//!
//! impl RenderDevice for NullDevice {
//!     fn draw(&mut self, _key: &BatchKey, _geometry: &[GeometryHandle]) -> bool {
//!         true
//!     }
//! }
//!
//! let compiler = BatchCompiler::new();
//! compiler.add(RenderPrimitive::new(GeometryHandle(1), EffectId(0)));
//! compiler.add(RenderPrimitive::new(GeometryHandle(2), EffectId(0)));
//!
//! let stats = compiler.render(&mut NullDevice).unwrap();
//! assert_eq!(stats.batches_drawn, 1);
//! assert_eq!(stats.primitives_drawn, 2);
//! ```

use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::{RenderError, RenderResult};
use crate::types::{Color, Point};

const TARGET: &str = "skin_engine_render::batch";

new_key_type! {
    /// Identifies a primitive registered with a [`BatchCompiler`].
    pub struct PrimitiveId;

    /// Identifies a batch inside a [`BatchCompiler`].
    pub struct BatchId;
}

/// Opaque handle to device geometry (a vertex buffer range).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryHandle(pub u64);

/// Opaque effect (shader program) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(pub u32);

/// Opaque handle to a device texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// A single effect parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Point),
    Color(Color),
}

impl ParamValue {
    fn to_vec4(self) -> Vec4 {
        let v = match self {
            ParamValue::Float(f) => [f, 0.0, 0.0, 0.0],
            ParamValue::Int(i) => [i as f32, 0.0, 0.0, 0.0],
            ParamValue::Bool(b) => [if b { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
            ParamValue::Vec2(p) => [p.x, p.y, 0.0, 0.0],
            ParamValue::Color(c) => c.to_array(),
        };
        Vec4(v)
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct Vec4([f32; 4]);

/// Named effect parameters, compared by value.
///
/// Parameters are kept sorted by name so two sets with the same entries are
/// equal regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectParameters {
    values: BTreeMap<String, ParamValue>,
}

impl EffectParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Pack the parameters into a uniform buffer, one 16-byte slot per
    /// parameter in name order.
    pub fn to_uniform_bytes(&self) -> Vec<u8> {
        let slots: Vec<Vec4> = self.values.values().map(|v| v.to_vec4()).collect();
        bytemuck::cast_slice(&slots).to_vec()
    }
}

/// The state a batch is drawn with. Two primitives share a batch exactly when
/// their keys are equal.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchKey {
    pub effect: EffectId,
    pub parameters: EffectParameters,
    pub texture: Option<TextureHandle>,
}

/// One drawable unit. References device resources, never owns them.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPrimitive {
    pub geometry: GeometryHandle,
    pub effect: EffectId,
    pub parameters: EffectParameters,
    pub texture: Option<TextureHandle>,
}

impl RenderPrimitive {
    pub fn new(geometry: GeometryHandle, effect: EffectId) -> Self {
        Self {
            geometry,
            effect,
            parameters: EffectParameters::default(),
            texture: None,
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.parameters.set(name, value);
        self
    }

    pub fn with_texture(mut self, texture: TextureHandle) -> Self {
        self.texture = Some(texture);
        self
    }

    /// The grouping key of this primitive.
    pub fn batch_key(&self) -> BatchKey {
        BatchKey {
            effect: self.effect,
            parameters: self.parameters.clone(),
            texture: self.texture,
        }
    }

    fn matches(&self, key: &BatchKey) -> bool {
        self.effect == key.effect && self.texture == key.texture && self.parameters == key.parameters
    }
}

/// Primitives drawn together under one [`BatchKey`], in placement order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBatch {
    pub key: BatchKey,
    pub members: Vec<PrimitiveId>,
}

impl RenderBatch {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The graphics backend a [`BatchCompiler`] draws through.
pub trait RenderDevice {
    /// Draw one batch. Returning `false` means the batch's device resources
    /// are gone; the compiler retires the batch and re-places its primitives
    /// on the next frame.
    fn draw(&mut self, key: &BatchKey, geometry: &[GeometryHandle]) -> bool;

    /// Whether the device itself has been lost.
    fn is_lost(&self) -> bool {
        false
    }
}

/// Counters for one [`render`](BatchCompiler::render) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub batches_drawn: usize,
    pub primitives_drawn: usize,
    pub batches_failed: usize,
    pub batches_pruned: usize,
    pub rebuilt: bool,
}

struct Entry {
    primitive: RenderPrimitive,
    batch: Option<BatchId>,
}

#[derive(Default)]
struct CompilerState {
    primitives: SlotMap<PrimitiveId, Entry>,
    /// Placed primitives, in placement order.
    committed: Vec<PrimitiveId>,
    /// Added but not yet placed.
    pending: Vec<PrimitiveId>,
    batches: SlotMap<BatchId, RenderBatch>,
    /// Draw order.
    order: Vec<BatchId>,
    /// Batches that became empty and are removed at the start of the next frame.
    prune: Vec<BatchId>,
    dirty: bool,
}

impl CompilerState {
    fn place(&mut self, id: PrimitiveId) {
        let Some(entry) = self.primitives.get(id) else {
            return;
        };
        let existing = self
            .order
            .iter()
            .copied()
            .find(|b| self.batches.get(*b).is_some_and(|batch| entry.primitive.matches(&batch.key)));

        let batch_id = match existing {
            Some(b) => b,
            None => {
                let b = self.batches.insert(RenderBatch {
                    key: entry.primitive.batch_key(),
                    members: Vec::new(),
                });
                self.order.push(b);
                b
            }
        };
        if let Some(batch) = self.batches.get_mut(batch_id) {
            batch.members.push(id);
        }
        if let Some(entry) = self.primitives.get_mut(id) {
            entry.batch = Some(batch_id);
        }
    }

    fn detach(&mut self, id: PrimitiveId, batch: Option<BatchId>) {
        if let Some(b) = batch {
            if let Some(batch) = self.batches.get_mut(b) {
                batch.members.retain(|m| *m != id);
                if batch.members.is_empty() {
                    self.prune.push(b);
                }
            }
        }
        self.committed.retain(|m| *m != id);
        self.pending.retain(|m| *m != id);
    }

    fn remove(&mut self, id: PrimitiveId) -> Option<RenderPrimitive> {
        let entry = self.primitives.remove(id)?;
        self.detach(id, entry.batch);
        Some(entry.primitive)
    }

    fn prune_empty(&mut self) -> usize {
        let mut pruned = 0;
        for b in std::mem::take(&mut self.prune) {
            if self.batches.get(b).is_some_and(RenderBatch::is_empty) {
                self.batches.remove(b);
                self.order.retain(|o| *o != b);
                pruned += 1;
            }
        }
        pruned
    }

    fn create_batches(&mut self) {
        self.batches.clear();
        self.order.clear();
        self.prune.clear();

        let mut all = std::mem::take(&mut self.committed);
        all.append(&mut self.pending);
        for entry in self.primitives.values_mut() {
            entry.batch = None;
        }
        for id in &all {
            self.place(*id);
        }
        self.committed = all;
        self.dirty = false;
        tracing::debug!(
            target: TARGET,
            primitives = self.committed.len(),
            batches = self.order.len(),
            "rebuilt batches"
        );
    }

    fn place_new_primitives_in_batches(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for id in &pending {
            self.place(*id);
        }
        tracing::trace!(target: TARGET, placed = pending.len(), "placed pending primitives");
        self.committed.extend(pending);
    }

    fn retire(&mut self, b: BatchId) {
        let Some(batch) = self.batches.remove(b) else {
            return;
        };
        self.order.retain(|o| *o != b);
        for id in batch.members {
            if let Some(entry) = self.primitives.get_mut(id) {
                entry.batch = None;
                self.committed.retain(|m| *m != id);
                self.pending.push(id);
            }
        }
    }
}

/// Groups registered primitives into batches and draws them.
///
/// All operations take one coarse lock, so primitives may be added or
/// removed from any thread while another thread renders.
pub struct BatchCompiler {
    state: Mutex<CompilerState>,
}

impl BatchCompiler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CompilerState::default()),
        }
    }

    /// Register a primitive. It is placed into a batch on the next render.
    pub fn add(&self, primitive: RenderPrimitive) -> PrimitiveId {
        let mut state = self.state.lock();
        let id = state.primitives.insert(Entry {
            primitive,
            batch: None,
        });
        state.pending.push(id);
        id
    }

    /// Unregister a primitive and return it.
    ///
    /// A batch left empty by the removal is dropped on the next render.
    pub fn remove(&self, id: PrimitiveId) -> RenderResult<RenderPrimitive> {
        self.state
            .lock()
            .remove(id)
            .ok_or(RenderError::UnknownPrimitive(id))
    }

    /// Unregister several primitives at once and force a rebuild.
    ///
    /// Unknown ids are skipped. Returns how many were removed.
    pub fn remove_many(&self, ids: impl IntoIterator<Item = PrimitiveId>) -> usize {
        let mut state = self.state.lock();
        let removed = ids.into_iter().filter(|id| state.remove(*id).is_some()).count();
        state.dirty = true;
        removed
    }

    /// Replace a registered primitive. It leaves its batch and is placed again
    /// on the next render.
    pub fn update(&self, id: PrimitiveId, primitive: RenderPrimitive) -> RenderResult<()> {
        let mut state = self.state.lock();
        let batch = match state.primitives.get_mut(id) {
            Some(entry) => {
                entry.primitive = primitive;
                entry.batch.take()
            }
            None => return Err(RenderError::UnknownPrimitive(id)),
        };
        state.detach(id, batch);
        state.pending.push(id);
        Ok(())
    }

    /// Force a full rebuild on the next render.
    pub fn invalidate(&self) {
        self.state.lock().dirty = true;
    }

    /// A copy of a registered primitive.
    pub fn primitive(&self, id: PrimitiveId) -> Option<RenderPrimitive> {
        self.state.lock().primitives.get(id).map(|e| e.primitive.clone())
    }

    /// Run one frame.
    ///
    /// Prunes empty batches, rebuilds or places pending primitives, then draws
    /// every batch in order. Batches the device fails to draw are retired and
    /// their primitives queued for placement on the next frame.
    #[tracing::instrument(level = "trace", skip_all, target = "skin_engine_render::batch")]
    pub fn render(&self, device: &mut dyn RenderDevice) -> RenderResult<RenderStats> {
        if device.is_lost() {
            tracing::warn!(target: TARGET, "render skipped, device lost");
            return Err(RenderError::DeviceLost);
        }

        let mut state = self.state.lock();
        let mut stats = RenderStats {
            batches_pruned: state.prune_empty(),
            ..RenderStats::default()
        };

        if state.dirty {
            state.create_batches();
            stats.rebuilt = true;
        } else if !state.pending.is_empty() {
            state.place_new_primitives_in_batches();
        }

        let mut failed = Vec::new();
        let mut geometry = Vec::new();
        for b in &state.order {
            let Some(batch) = state.batches.get(*b) else {
                continue;
            };
            geometry.clear();
            geometry.extend(
                batch
                    .members
                    .iter()
                    .filter_map(|m| state.primitives.get(*m))
                    .map(|e| e.primitive.geometry),
            );
            if device.draw(&batch.key, &geometry) {
                stats.batches_drawn += 1;
                stats.primitives_drawn += geometry.len();
            } else {
                failed.push(*b);
            }
        }

        stats.batches_failed = failed.len();
        for b in failed {
            tracing::debug!(target: TARGET, batch = ?b, "retiring batch after failed draw");
            state.retire(b);
        }

        Ok(stats)
    }

    /// Number of registered primitives, placed or not.
    pub fn primitive_count(&self) -> usize {
        self.state.lock().primitives.len()
    }

    /// Number of primitives waiting for placement.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of batches, including empty ones awaiting pruning.
    pub fn batch_count(&self) -> usize {
        self.state.lock().order.len()
    }

    /// A snapshot of the batches in draw order.
    pub fn batches(&self) -> Vec<RenderBatch> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|b| state.batches.get(*b).cloned())
            .collect()
    }

    /// Whether the next render rebuilds all batches.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }
}

impl Default for BatchCompiler {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(BatchCompiler: Send, Sync);
