//! Owner-thread checks for the scene graph.
//!
//! The property system is single-owner: cells are mutated on the UI thread,
//! and worker threads hand results over through the
//! [`UiDispatcher`](crate::dispatch::UiDispatcher). [`ThreadAffinity`]
//! records the owner thread so that accidental cross-thread writes can be
//! reported. Checks are on by default in debug builds and can be toggled with
//! [`set_thread_checks_enabled`] (or `EngineConfig::thread_checks`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

use crate::logging::targets;

/// Global switch for runtime thread checks.
static THREAD_CHECKS_ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

/// Enable or disable cross-thread access reporting.
pub fn set_thread_checks_enabled(enabled: bool) {
    THREAD_CHECKS_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether cross-thread access reporting is enabled.
#[inline]
pub fn thread_checks_enabled() -> bool {
    THREAD_CHECKS_ENABLED.load(Ordering::Relaxed)
}

/// Remembers the thread that owns an object.
#[derive(Debug, Clone, Copy)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::current()
    }
}

impl ThreadAffinity {
    /// Bind to the calling thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// The owning thread.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Whether the caller runs on the owning thread.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Report a cross-thread `operation` when checks are enabled.
    ///
    /// Returns `true` when the access happened on the owner thread (or checks
    /// are off). Ordering of notifications is undefined for violating calls.
    pub fn check(&self, operation: &'static str) -> bool {
        if !thread_checks_enabled() || self.is_same_thread() {
            return true;
        }
        tracing::warn!(
            target: targets::PROPERTY,
            operation,
            owner = ?self.thread_id,
            current = ?std::thread::current().id(),
            "cross-thread access; marshal through the UI dispatcher"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_thread() {
        let affinity = ThreadAffinity::current();
        assert!(affinity.is_same_thread());
        assert!(affinity.check("test"));
    }

    #[test]
    fn test_other_thread_detected() {
        let affinity = ThreadAffinity::current();
        let same = std::thread::spawn(move || affinity.is_same_thread())
            .join()
            .unwrap();
        assert!(!same);
    }
}
