//! Message delivery from worker threads to the UI thread.
//!
//! The scene graph has a single owner thread. Background work (library
//! queries, plugin loading, network I/O) never touches property cells
//! directly; it posts a closure through a [`DispatchHandle`], and the owner
//! thread runs queued closures with [`UiDispatcher::process_pending`], usually
//! once per frame before rendering.
//!
//! ```
//! use skin_engine_core::{PropertyCell, UiDispatcher, Value};
//!
//! let dispatcher = UiDispatcher::new();
//! let title = PropertyCell::new("Episode 1");
//!
//! let handle = dispatcher.handle();
//! let cell = title.clone();
//! std::thread::spawn(move || {
//!     let _ = handle.post(move || {
//!         cell.set("Episode 2");
//!     });
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(dispatcher.process_pending(), 1);
//! assert_eq!(title.get(), Value::from("Episode 2"));
//! ```

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::logging::{span_names, targets};
use crate::thread_check::ThreadAffinity;

/// A type-erased closure waiting to run on the owner thread.
pub struct QueuedInvocation {
    invoke: Box<dyn FnOnce() + Send>,
}

impl QueuedInvocation {
    /// Wrap a closure.
    pub fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
        }
    }

    /// Run the closure.
    pub fn execute(self) {
        (self.invoke)();
    }
}

/// The owner-thread end of the dispatch queue.
pub struct UiDispatcher {
    sender: Sender<QueuedInvocation>,
    receiver: Receiver<QueuedInvocation>,
    affinity: ThreadAffinity,
}

impl Default for UiDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl UiDispatcher {
    /// Create a dispatcher with an unbounded queue, owned by the calling thread.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            affinity: ThreadAffinity::current(),
        }
    }

    /// Create a dispatcher whose queue holds at most `capacity` closures.
    ///
    /// Posting to a full queue blocks the posting worker.
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self {
            sender,
            receiver,
            affinity: ThreadAffinity::current(),
        }
    }

    /// Create a dispatcher sized by `config.dispatcher_capacity`.
    pub fn from_config(config: &EngineConfig) -> Self {
        match config.dispatcher_capacity {
            Some(capacity) => Self::bounded(capacity),
            None => Self::new(),
        }
    }

    /// A cloneable, `Send` handle for posting work.
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            sender: self.sender.clone(),
        }
    }

    /// Number of queued closures.
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Run every closure queued so far. Returns how many ran.
    ///
    /// Closures posted while processing run in the same call.
    pub fn process_pending(&self) -> usize {
        self.affinity.check("UiDispatcher::process_pending");
        let _span = tracing::trace_span!(target: targets::DISPATCH, span_names::DISPATCH).entered();
        let mut executed = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(invocation) => {
                    invocation.execute();
                    executed += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        if executed > 0 {
            tracing::trace!(target: targets::DISPATCH, executed, "processed queued invocations");
        }
        executed
    }
}

/// Posts closures to a [`UiDispatcher`] from any thread.
#[derive(Clone)]
pub struct DispatchHandle {
    sender: Sender<QueuedInvocation>,
}

impl DispatchHandle {
    /// Queue `f` for the owner thread.
    ///
    /// Fails with [`CoreError::DispatcherClosed`] once the dispatcher is gone.
    pub fn post<F>(&self, f: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(QueuedInvocation::new(f)).map_err(|_| {
            tracing::debug!(target: targets::DISPATCH, "post after dispatcher shutdown");
            CoreError::DispatcherClosed
        })
    }
}
