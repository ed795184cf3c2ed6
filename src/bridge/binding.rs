//! Native pointer binding, finalization and rooting.

use std::rc::{Rc, Weak};

use super::{Bridge, BridgeState};
use crate::engine::{Engine, EnvId, NativePtr, Value};
use crate::error::Result;
use crate::object::{ObjectRef, Wrapper, WrapperId};

impl<E: Engine> Bridge<E> {
    /// Bind `native` to `obj`.
    ///
    /// Records the pair in the registry (which takes its own reference on the
    /// wrapper), attaches the pointer to the script value and registers a
    /// collector finalizer for it. The address is mirrored onto the
    /// configured debug property.
    ///
    /// # Panics
    ///
    /// If `obj` already has private data, if `native` is already bound to any
    /// wrapper, or if `native` is null.
    pub fn set_private_data(&mut self, obj: &ObjectRef, native: NativePtr) -> Result<()> {
        assert!(!native.is_null(), "cannot bind a null native pointer");
        assert!(
            obj.private_data().is_none(),
            "wrapper {:?} already has private data bound",
            obj.id()
        );
        assert!(
            !self.state.registry.borrow().contains(native),
            "native pointer {:?} is already bound to a wrapper",
            native
        );

        self.process_deferred();

        let handle = obj.value(&self.engine)?;

        let state = Rc::downgrade(&self.state);
        let hint = obj.id();
        self.engine.wrap(
            handle,
            native,
            Box::new(move |env, native| finalize_native(&state, env, native, hint)),
        )?;

        self.state.registry.borrow_mut().register(native, obj.clone());
        obj.bind_private_data(native);

        let mirror = Value::BigInt(native.addr() as i64);
        if let Err(err) =
            self.engine
                .set_named_property(handle, &self.config.native_ptr_property, mirror)
        {
            tracing::warn!(
                "Failed to mirror {:?} onto wrapper {:?}: {}",
                native,
                obj.id(),
                err
            );
        }

        Ok(())
    }

    /// Native pointer attached to the script value, as the engine reports it.
    pub fn get_private_data(&self, obj: &Wrapper) -> Option<NativePtr> {
        let handle = obj.value(&self.engine).ok()?;
        self.engine.unwrap(handle).ok().flatten()
    }

    /// End the engine-side binding of `native` without finalizing it.
    pub(super) fn detach_private_data(&mut self, obj: &Wrapper, native: NativePtr) {
        obj.unbind_private_data();

        // A collected value took its wrap with it.
        let Ok(handle) = obj.value(&self.engine) else {
            return;
        };

        if let Err(err) = self.engine.remove_wrap(handle) {
            tracing::warn!(
                "Failed to detach {:?} from wrapper {:?}: {}",
                native,
                obj.id(),
                err
            );
        }
    }

    pub fn root(&mut self, obj: &Wrapper) {
        self.process_deferred();
        obj.root(&mut self.engine);
    }

    pub fn unroot(&mut self, obj: &Wrapper) {
        self.process_deferred();
        obj.unroot(&mut self.engine);
    }

    pub fn is_rooted(&self, obj: &Wrapper) -> bool {
        obj.is_rooted()
    }
}

/// Collector-side finalizer for a bound native pointer.
///
/// Runs the finalize resolution for the registry entry and erases it. The
/// entry must still belong to wrapper `hint`: entries already erased by the
/// teardown sweep, or since rebound to another wrapper, are left alone, so
/// each binding is finalized at most once.
pub(super) fn finalize_native(
    state: &Weak<BridgeState>,
    env: EnvId,
    native: NativePtr,
    hint: WrapperId,
) {
    if native.is_null() {
        return;
    }

    let Some(state) = state.upgrade() else {
        tracing::warn!("Finalizer for {:?} ran after its bridge was dropped", native);
        return;
    };

    let Some(object) = state.registry.borrow_mut().unregister_bound(native, hint) else {
        tracing::trace!("No registry entry for {:?} from wrapper {:?}", native, hint);
        return;
    };

    object.run_finalizer(env, native, Some(hint));
    // Gives back the registry's reference.
    drop(object);

    state.release_holder(hint);
}
