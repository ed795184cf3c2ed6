//! Deferred release queue for engine references.
//!
//! ## Problem
//!
//! A wrapper's last intrinsic reference can be dropped from places that have
//! no engine access: inside a collector-driven finalizer (the engine is busy
//! collecting), or from an `ObjectRef` going out of scope anywhere in native
//! code. Its engine reference still has to be deleted.
//!
//! ## Solution
//!
//! Queue the reference handle, then process the queue whenever the bridge
//! next gets engine access (`Bridge::engine_mut()`, factories, collection,
//! cleanup).
//!
//! ## Usage
//!
//! ```ignore
//! use crate::gc::DeferredReleaseQueue;
//!
//! let queue = DeferredReleaseQueue::new();
//!
//! // From a wrapper's destructor
//! queue.defer(value_ref);
//!
//! // With engine access
//! queue.process_all(&mut engine);
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::engine::{Engine, RefHandle};

/// Per-bridge queue of engine references waiting for deletion.
pub struct DeferredReleaseQueue {
    queue: RefCell<VecDeque<RefHandle>>,
}

impl Default for DeferredReleaseQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredReleaseQueue {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::with_capacity(8)),
        }
    }

    /// Queue a reference for deletion. Needs no engine access.
    pub fn defer(&self, reference: RefHandle) {
        let pending = {
            let mut queue = self.queue.borrow_mut();
            queue.push_back(reference);
            queue.len()
        };

        tracing::trace!("Deferred engine reference release (pending: {})", pending);
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Delete every queued reference. Returns how many were processed.
    ///
    /// Failures are logged and dropped: a reference the engine no longer
    /// knows is already gone.
    pub fn process_all(&self, engine: &mut dyn Engine) -> usize {
        // Fast path: nothing pending
        if !self.has_pending() {
            return 0;
        }

        // Take the queue first so deletions can't observe a held borrow
        let references = std::mem::take(&mut *self.queue.borrow_mut());
        let count = references.len();

        for reference in references {
            if let Err(err) = engine.delete_reference(reference) {
                tracing::warn!("Failed to delete engine reference {:?}: {}", reference, err);
            }
        }

        tracing::trace!("Processed {} deferred reference releases", count);

        count
    }
}

impl std::fmt::Debug for DeferredReleaseQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredReleaseQueue")
            .field("pending", &self.len())
            .finish()
    }
}
