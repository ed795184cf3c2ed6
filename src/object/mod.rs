//! Script-visible wrappers.
//!
//! A [`Wrapper`] pairs one engine value with at most one native peer. It
//! carries two independent counters:
//!
//! - `root_count`: engine-side strength. While above zero the wrapper holds a
//!   strong engine reference and the script value cannot be collected. At
//!   zero the reference is weak.
//! - `ref_count`: native-side ownership of the wrapper itself. Every
//!   [`ObjectRef`] and the native pointer registry own one count each. When
//!   it reaches zero the wrapper leaves the live table and its engine
//!   reference is queued for release.
//!
//! The script value may be collected while the wrapper is still owned
//! natively (operations then fail with [`EngineError::Collected`]), and the
//! wrapper may be destroyed while the script value lives on.

mod class;

pub use class::{Class, CreateInstanceFn, FinalizeFn, NativeClass};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use crate::bridge::BridgeState;
use crate::engine::{Engine, EnvId, NativePtr, ObjectHandle, RefHandle};
use crate::error::EngineError;

/// Process-unique wrapper identity (creation order within a bridge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(u64);

impl WrapperId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

pub struct Wrapper {
    id: WrapperId,
    env: EnvId,
    value_ref: RefHandle,
    class: Option<Rc<Class>>,
    private_data: Cell<Option<NativePtr>>,
    finalize_cb: RefCell<Option<FinalizeFn>>,
    root_count: Cell<u32>,
    ref_count: Cell<u32>,
    state: Weak<BridgeState>,
}

impl Wrapper {
    /// Create a wrapper with one intrinsic reference, owned by the caller.
    pub(crate) fn new(
        id: WrapperId,
        env: EnvId,
        value_ref: RefHandle,
        class: Option<Rc<Class>>,
        state: Weak<BridgeState>,
    ) -> Rc<Self> {
        Rc::new(Self {
            id,
            env,
            value_ref,
            class,
            private_data: Cell::new(None),
            finalize_cb: RefCell::new(None),
            root_count: Cell::new(0),
            ref_count: Cell::new(1),
            state,
        })
    }

    pub fn id(&self) -> WrapperId {
        self.id
    }

    pub fn env(&self) -> EnvId {
        self.env
    }

    pub fn class(&self) -> Option<&Rc<Class>> {
        self.class.as_ref()
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class.as_deref().map(Class::name)
    }

    /// Native pointer recorded by `set_private_data`, if any.
    pub fn private_data(&self) -> Option<NativePtr> {
        self.private_data.get()
    }

    pub fn root_count(&self) -> u32 {
        self.root_count.get()
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.get()
    }

    pub fn is_rooted(&self) -> bool {
        self.root_count.get() > 0
    }

    /// Resolve the underlying script value.
    pub fn value(&self, engine: &dyn Engine) -> Result<ObjectHandle, EngineError> {
        engine
            .reference_value(self.value_ref)?
            .ok_or(EngineError::Collected)
    }

    /// Keep the script value alive regardless of script reachability.
    ///
    /// Only the 0 -> 1 transition touches the engine reference.
    pub fn root(&self, engine: &mut dyn Engine) {
        let count = self.root_count.get();

        if count == 0
            && let Err(err) = engine.reference_ref(self.value_ref)
        {
            tracing::warn!("Failed to root wrapper {:?}: {}", self.id, err);
        }

        self.root_count.set(count + 1);
    }

    /// Undo one `root()`. A no-op when not rooted.
    pub fn unroot(&self, engine: &mut dyn Engine) {
        let count = self.root_count.get();

        if count == 0 {
            return;
        }

        self.root_count.set(count - 1);

        if count == 1
            && let Err(err) = engine.reference_unref(self.value_ref)
        {
            tracing::warn!("Failed to unroot wrapper {:?}: {}", self.id, err);
        }
    }

    /// Drop all roots at once (teardown).
    pub(crate) fn reset_root(&self, engine: &mut dyn Engine) {
        if self.root_count.replace(0) > 0
            && let Err(err) = engine.reference_unref(self.value_ref)
        {
            tracing::warn!("Failed to release root of wrapper {:?}: {}", self.id, err);
        }
    }

    /// Per-wrapper finalizer, preferred over the class finalizer.
    pub fn set_finalize_callback(&self, callback: FinalizeFn) {
        *self.finalize_cb.borrow_mut() = Some(callback);
    }

    pub(crate) fn bind_private_data(&self, native: NativePtr) {
        assert!(
            self.private_data.get().is_none(),
            "wrapper {:?} already has private data bound",
            self.id
        );

        self.private_data.set(Some(native));
    }

    pub(crate) fn unbind_private_data(&self) {
        self.private_data.set(None);
    }

    /// Run the finalize resolution for `native`: own callback, else the
    /// class finalizer. Panics are contained and logged.
    pub(crate) fn run_finalizer(&self, env: EnvId, native: NativePtr, hint: Option<WrapperId>) {
        let callback = self
            .finalize_cb
            .borrow()
            .clone()
            .or_else(|| self.class.as_ref().and_then(|c| c.finalize_fn().cloned()));

        let Some(callback) = callback else {
            tracing::warn!(
                "No finalizer for {:?} bound to wrapper {:?}, native resource leaked",
                native,
                self.id
            );
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| callback(env, native, hint))).is_err() {
            tracing::error!(
                "Finalizer for {:?} (wrapper {:?}) panicked, native resource leaked",
                native,
                self.id
            );
        }
    }

    /// Take one intrinsic reference. Every count is owned by an
    /// [`ObjectRef`], so the `Rc` outlives the count.
    pub(crate) fn retain(&self) {
        let count = self.ref_count.get();
        assert!(count > 0, "retain on destroyed wrapper {:?}", self.id);
        self.ref_count.set(count + 1);
    }

    /// Give back one intrinsic reference; the last one destroys the wrapper.
    pub(crate) fn release(&self) {
        let count = self.ref_count.get();
        assert!(count > 0, "release on destroyed wrapper {:?}", self.id);
        self.ref_count.set(count - 1);

        if count == 1 {
            self.destroy();
        }
    }

    fn destroy(&self) {
        tracing::trace!("Destroying wrapper {:?}", self.id);

        // Bridge already gone: the engine (and every reference) went with it.
        let Some(state) = self.state.upgrade() else {
            return;
        };

        state.forget_live(self.id);
        state.deferred.defer(self.value_ref);
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("id", &self.id)
            .field("env", &self.env)
            .field("class", &self.class_name())
            .field("private_data", &self.private_data.get())
            .field("root_count", &self.root_count.get())
            .field("ref_count", &self.ref_count.get())
            .finish()
    }
}

/// Owning handle to a wrapper: holds exactly one intrinsic reference.
///
/// Cloning retains, dropping releases.
pub struct ObjectRef(Rc<Wrapper>);

impl ObjectRef {
    /// Take over the reference a fresh wrapper was created with.
    pub(crate) fn adopt(wrapper: Rc<Wrapper>) -> Self {
        Self(wrapper)
    }

    /// Take a new reference on a live wrapper.
    pub(crate) fn retained(wrapper: Rc<Wrapper>) -> Self {
        wrapper.retain();
        Self(wrapper)
    }

    pub fn ptr_eq(a: &ObjectRef, b: &ObjectRef) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        Self::retained(self.0.clone())
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl Deref for ObjectRef {
    type Target = Wrapper;

    fn deref(&self) -> &Wrapper {
        &self.0
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        ObjectRef::ptr_eq(self, other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
