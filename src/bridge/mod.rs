//! The bridge: one engine environment plus its wrapper bookkeeping.
//!
//! ## Lifecycle
//!
//! ```text
//! Bridge::new(engine)
//!     │
//!     ▼
//! setup()            live-wrapper table created
//!     │
//!     ▼
//! create_* / set_private_data / root / attach_object ...
//!     │                    ▲
//!     │                    │ collector finalizers erase registry entries
//!     ▼                    │
//! collect_garbage() ───────┘
//!     │
//!     ▼
//! cleanup()          every remaining native pointer detached and finalized,
//!                    roots reset, private-data holders released
//! ```
//!
//! The registry and live table live in a [`BridgeState`] shared (weakly) with
//! every wrapper and finalizer, so nothing reaches for a global.

mod binding;
mod factory;
mod introspect;
mod keep_alive;
mod properties;

#[cfg(test)]
mod tests;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::config::BridgeConfig;
use crate::engine::{Engine, EnvId, NativePtr, ObjectHandle};
use crate::error::Result;
use crate::gc::{DeferredReleaseQueue, LiveWrapperTable, NativePtrRegistry};
use crate::object::{Class, ObjectRef, Wrapper, WrapperId};

/// Bookkeeping shared between a bridge, its wrappers and its finalizers.
pub(crate) struct BridgeState {
    pub(crate) registry: RefCell<NativePtrRegistry>,
    pub(crate) live: RefCell<Option<LiveWrapperTable>>,
    pub(crate) deferred: DeferredReleaseQueue,
    /// Extra owning references of private-data holders, keyed by wrapper.
    holders: RefCell<BTreeMap<WrapperId, ObjectRef>>,
    next_wrapper_id: Cell<u64>,
}

impl BridgeState {
    fn new() -> Self {
        Self {
            registry: RefCell::new(NativePtrRegistry::new()),
            live: RefCell::new(None),
            deferred: DeferredReleaseQueue::new(),
            holders: RefCell::new(BTreeMap::new()),
            next_wrapper_id: Cell::new(1),
        }
    }

    fn next_wrapper_id(&self) -> WrapperId {
        let id = self.next_wrapper_id.get();
        self.next_wrapper_id.set(id + 1);
        WrapperId::new(id)
    }

    /// Drop a destroyed wrapper from the live table, if one is installed.
    pub(crate) fn forget_live(&self, id: WrapperId) {
        // Teardown takes the table out before walking it.
        if let Ok(mut live) = self.live.try_borrow_mut()
            && let Some(table) = live.as_mut()
        {
            table.remove(id);
        }
    }

    fn keep_holder(&self, holder: ObjectRef) {
        self.holders.borrow_mut().insert(holder.id(), holder);
    }

    /// Give back the extra reference of holder `id`, if it has one.
    fn release_holder(&self, id: WrapperId) {
        let holder = self.holders.borrow_mut().remove(&id);
        // Dropped after the borrow ends: destruction reaches back into the state.
        drop(holder);
    }

    fn release_all_holders(&self) -> usize {
        let holders = std::mem::take(&mut *self.holders.borrow_mut());
        holders.len()
    }
}

pub struct Bridge<E: Engine> {
    engine: E,
    config: BridgeConfig,
    state: Rc<BridgeState>,
    private_data_class: Rc<Class>,
}

impl<E: Engine> Bridge<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, BridgeConfig::default())
    }

    pub fn with_config(engine: E, config: BridgeConfig) -> Self {
        let private_data_class = Rc::new(Class::new(config.private_data_class.clone()));

        Self {
            engine,
            config,
            state: Rc::new(BridgeState::new()),
            private_data_class,
        }
    }

    /// Install the live-wrapper table. Wrappers created before `setup()` are
    /// not tracked by it.
    pub fn setup(&mut self) {
        let mut live = self.state.live.borrow_mut();

        if live.is_some() {
            tracing::debug!("Bridge for {:?} already set up", self.engine.env());
            return;
        }

        *live = Some(LiveWrapperTable::new());
        tracing::debug!("Bridge for {:?} set up", self.engine.env());
    }

    pub fn is_set_up(&self) -> bool {
        self.state.live.borrow().is_some()
    }

    /// Tear down: finalize every registered native pointer, reset all roots,
    /// release private-data holders and drop the live table.
    ///
    /// Runs regardless of collector timing; calling it again is a no-op.
    pub fn cleanup(&mut self) {
        let env = self.engine.env();

        let entries = self.state.registry.borrow_mut().drain();
        let finalized = entries.len();

        for (native, object) in entries {
            // A later collection of the script value must not finalize again.
            self.detach_private_data(&object, native);
            object.run_finalizer(env, native, None);
            // Dropping `object` gives back the registry's reference.
        }

        let table = self.state.live.borrow_mut().take();
        if let Some(table) = table {
            for wrapper in table.into_live() {
                wrapper.reset_root(&mut self.engine);
            }
        }

        let released = self.state.release_all_holders();

        let deleted = self.state.deferred.process_all(&mut self.engine);

        tracing::debug!(
            "Bridge for {:?} cleaned up: {} finalized, {} holders released, {} references deleted",
            env,
            finalized,
            released,
            deleted
        );
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Engine access. Pending reference releases are applied first.
    pub fn engine_mut(&mut self) -> &mut E {
        self.process_deferred();
        &mut self.engine
    }

    pub fn env(&self) -> EnvId {
        self.engine.env()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run an engine collection. Returns the number of finalizers run.
    pub fn collect_garbage(&mut self) -> usize {
        self.process_deferred();
        let finalized = self.engine.collect_garbage();
        self.process_deferred();
        finalized
    }

    /// Wrapper bound to `native`, as a new owning handle.
    pub fn object_with_ptr(&self, native: NativePtr) -> Option<ObjectRef> {
        self.state.registry.borrow().lookup(native)
    }

    /// Wrap an existing engine value in a new wrapper.
    pub fn object_from_handle(
        &mut self,
        handle: ObjectHandle,
        class: Option<Rc<Class>>,
    ) -> Result<ObjectRef> {
        self.process_deferred();
        self.wrap_handle(handle, class)
    }

    pub fn registry_len(&self) -> usize {
        self.state.registry.borrow().len()
    }

    /// Wrappers in the live table (0 when not set up).
    pub fn live_wrapper_count(&self) -> usize {
        self.state
            .live
            .borrow()
            .as_ref()
            .map_or(0, LiveWrapperTable::len)
    }

    pub fn pending_releases(&self) -> usize {
        self.state.deferred.len()
    }

    fn process_deferred(&mut self) {
        self.state.deferred.process_all(&mut self.engine);
    }

    fn wrap_handle(&mut self, handle: ObjectHandle, class: Option<Rc<Class>>) -> Result<ObjectRef> {
        let value_ref = self.engine.create_reference(handle, 0)?;

        let wrapper = Wrapper::new(
            self.state.next_wrapper_id(),
            self.engine.env(),
            value_ref,
            class,
            Rc::downgrade(&self.state),
        );

        if let Some(live) = self.state.live.borrow_mut().as_mut() {
            live.insert(&wrapper);
        }

        tracing::trace!(
            "Created wrapper {:?} ({})",
            wrapper.id(),
            wrapper.class_name().unwrap_or("<no class>")
        );

        Ok(ObjectRef::adopt(wrapper))
    }
}

impl<E: Engine> Drop for Bridge<E> {
    fn drop(&mut self) {
        if self.is_set_up() || self.registry_len() > 0 {
            tracing::debug!("Bridge dropped without cleanup, cleaning up");
            self.cleanup();
        }
    }
}

impl<E: Engine> std::fmt::Debug for Bridge<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("env", &self.engine.env())
            .field("registry", &self.registry_len())
            .field("live_wrappers", &self.live_wrapper_count())
            .field("pending_releases", &self.pending_releases())
            .finish()
    }
}
