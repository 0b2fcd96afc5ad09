//! Change-notification signals.
//!
//! A [`Signal`] holds an ordered list of slots (callbacks). Emitting the signal
//! invokes every connected slot synchronously, in registration order, on the
//! emitting thread. Cross-thread delivery is not the signal's job: producers on
//! worker threads post closures through the [`crate::dispatch::UiDispatcher`]
//! and the owner thread emits.
//!
//! The connection list is not locked while slots run, so a slot may emit,
//! connect or disconnect on the same signal. A slot disconnected by an earlier
//! slot during an emit is skipped for the rest of that emit.
//!
//! # Example
//!
//! ```
//! use skin_engine_core::Signal;
//!
//! let text_changed = Signal::<String>::new();
//! let id = text_changed.connect(|text| println!("text is now {text}"));
//! text_changed.emit("Hello".to_string());
//! assert!(text_changed.disconnect(id));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// Identifies one signal-slot connection.
    ///
    /// Returned by [`Signal::connect`]; pass it to [`Signal::disconnect`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

struct Connections<Args> {
    slots: SlotMap<ConnectionId, Slot<Args>>,
    /// Registration order; slotmap iteration order is not stable across reuse.
    order: Vec<ConnectionId>,
}

/// A type-safe signal with any number of connected slots.
///
/// `Args` is the payload passed by reference to each slot. Use `()` for
/// signals without a payload.
pub struct Signal<Args> {
    connections: Mutex<Connections<Args>>,
    blocked: AtomicBool,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Signal<Args> {
    /// Create a signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(Connections {
                slots: SlotMap::with_key(),
                order: Vec::new(),
            }),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a slot. Slots run in the order they were connected.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let mut connections = self.connections.lock();
        let id = connections.slots.insert(Arc::new(slot));
        connections.order.push(id);
        id
    }

    /// Disconnect a slot. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.lock();
        if connections.slots.remove(id).is_some() {
            connections.order.retain(|&c| c != id);
            true
        } else {
            false
        }
    }

    /// Disconnect every slot.
    pub fn disconnect_all(&self) {
        let mut connections = self.connections.lock();
        connections.slots.clear();
        connections.order.clear();
    }

    /// Whether `id` is still connected.
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.lock().slots.contains_key(id)
    }

    /// Number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().slots.len()
    }

    /// Suppress (or re-enable) emission.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Whether emission is currently suppressed.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Invoke every connected slot with `args`.
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: targets::SIGNAL, "signal blocked, skipping emit");
            return;
        }

        let snapshot: Vec<(ConnectionId, Slot<Args>)> = {
            let connections = self.connections.lock();
            connections
                .order
                .iter()
                .filter_map(|&id| connections.slots.get(id).map(|slot| (id, slot.clone())))
                .collect()
        };
        tracing::trace!(target: targets::SIGNAL, connection_count = snapshot.len(), "emitting signal");

        for (id, slot) in snapshot {
            if self.is_connected(id) {
                slot(&args);
            }
        }
    }
}

/// Disconnects its connection when dropped.
pub struct ConnectionGuard<Args: 'static> {
    signal: std::sync::Weak<Signal<Args>>,
    id: ConnectionId,
}

impl<Args: 'static> ConnectionGuard<Args> {
    /// Connect `slot` to a shared signal and guard the connection.
    pub fn connect<F>(signal: &Arc<Signal<Args>>, slot: F) -> Self
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = signal.connect(slot);
        Self {
            signal: Arc::downgrade(signal),
            id,
        }
    }

    /// The guarded connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args: 'static> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.disconnect(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_in_registration_order() {
        let signal = Signal::<i32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = signal.connect({
            let log = log.clone();
            move |v| log.lock().push(("first", *v))
        });
        signal.connect({
            let log = log.clone();
            move |v| log.lock().push(("second", *v))
        });

        // Free a slot and reconnect: the new slot still runs last.
        signal.disconnect(first);
        signal.connect({
            let log = log.clone();
            move |v| log.lock().push(("third", *v))
        });

        signal.emit(7);
        assert_eq!(*log.lock(), vec![("second", 7), ("third", 7)]);
    }

    #[test]
    fn test_blocked_signal() {
        let signal = Signal::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        signal.connect(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        signal.set_blocked(true);
        signal.emit(());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        signal.set_blocked(false);
        signal.emit(());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slot_may_reenter_signal() {
        let signal = Arc::new(Signal::<u32>::new());
        let count = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&signal);
        let c = count.clone();
        signal.connect(move |depth| {
            c.fetch_add(1, Ordering::SeqCst);
            if *depth < 2 {
                if let Some(signal) = weak.upgrade() {
                    signal.emit(depth + 1);
                }
            }
        });

        signal.emit(0);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_disconnect_during_emit_skips_slot() {
        let signal = Arc::new(Signal::<()>::new());
        let count = Arc::new(AtomicUsize::new(0));
        let victim = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&signal);
        let v = victim.clone();
        signal.connect(move |_| {
            if let (Some(signal), Some(id)) = (weak.upgrade(), *v.lock()) {
                signal.disconnect(id);
            }
        });
        let c = count.clone();
        let id = signal.connect(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        *victim.lock() = Some(id);

        signal.emit(());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(signal.connection_count(), 1);
    }

    #[test]
    fn test_connection_guard() {
        let signal = Arc::new(Signal::<i32>::new());
        {
            let _guard = ConnectionGuard::connect(&signal, |_| {});
            assert_eq!(signal.connection_count(), 1);
        }
        assert_eq!(signal.connection_count(), 0);
    }
}
