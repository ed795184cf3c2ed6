//! Native pointer -> wrapper registry.

use std::collections::HashMap;

use crate::engine::NativePtr;
use crate::object::{ObjectRef, WrapperId};

/// Bijective index from bound native pointers to their wrappers.
///
/// Each entry owns one intrinsic reference on its wrapper, released when the
/// entry is erased (collector finalizer or teardown sweep).
#[derive(Default)]
pub struct NativePtrRegistry {
    entries: HashMap<NativePtr, ObjectRef>,
}

impl NativePtrRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `native -> object`.
    ///
    /// # Panics
    ///
    /// If `native` is already registered: one native pointer maps to exactly
    /// one wrapper.
    pub fn register(&mut self, native: NativePtr, object: ObjectRef) {
        assert!(
            !self.entries.contains_key(&native),
            "native pointer {:?} is already bound to a wrapper",
            native
        );

        tracing::trace!("Registered {:?} -> wrapper {:?}", native, object.id());
        self.entries.insert(native, object);
    }

    /// Wrapper bound to `native`, as a new owning handle.
    pub fn lookup(&self, native: NativePtr) -> Option<ObjectRef> {
        self.entries.get(&native).cloned()
    }

    pub fn contains(&self, native: NativePtr) -> bool {
        self.entries.contains_key(&native)
    }

    /// Remove the entry for `native`. Absent entries are not an error.
    pub fn unregister(&mut self, native: NativePtr) -> Option<ObjectRef> {
        let removed = self.entries.remove(&native);

        if removed.is_some() {
            tracing::trace!("Unregistered {:?}", native);
        }

        removed
    }

    /// Remove the entry for `native` only while it still belongs to wrapper
    /// `id`. A finalizer for an older binding of the same address leaves the
    /// current entry alone.
    pub fn unregister_bound(&mut self, native: NativePtr, id: WrapperId) -> Option<ObjectRef> {
        match self.entries.get(&native) {
            Some(object) if object.id() == id => self.unregister(native),
            Some(object) => {
                tracing::trace!(
                    "{:?} now bound to wrapper {:?}, not {:?}",
                    native,
                    object.id(),
                    id
                );
                None
            }
            None => None,
        }
    }

    /// Remove every entry, in wrapper creation order.
    pub fn drain(&mut self) -> Vec<(NativePtr, ObjectRef)> {
        let mut entries: Vec<_> = self.entries.drain().collect();
        entries.sort_by_key(|(_, object)| object.id());
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for NativePtrRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativePtrRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}
