//! Cross-component lifecycle tests: bridge + registry + live table + heap.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::*;
use crate::engine::{LocalHeap, Value};
use crate::error::EngineError;
use crate::object::FinalizeFn;

fn new_bridge() -> Bridge<LocalHeap> {
    let mut bridge = Bridge::new(LocalHeap::new());
    bridge.setup();
    bridge
}

/// Class whose finalizer records `(native, hint)` for each call.
fn recording_class(calls: &Rc<RefCell<Vec<(NativePtr, Option<WrapperId>)>>>) -> Rc<Class> {
    let calls = calls.clone();
    Rc::new(Class::new("Recorded").with_finalizer(move |_env, native, hint| {
        calls.borrow_mut().push((native, hint));
    }))
}

#[test]
fn test_collection_finalizes_once() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let class = recording_class(&calls);
    let mut bridge = new_bridge();
    let native = NativePtr::from_addr(0x1000);

    let scope = bridge.engine_mut().open_scope();
    let obj = bridge.create_object_with_class(&class).unwrap();
    let id = obj.id();
    bridge.set_private_data(&obj, native).unwrap();
    drop(obj);
    bridge.engine_mut().close_scope(scope);

    assert_eq!(bridge.registry_len(), 1);
    assert_eq!(bridge.collect_garbage(), 1);

    assert_eq!(*calls.borrow(), vec![(native, Some(id))]);
    assert_eq!(bridge.registry_len(), 0);
    assert!(bridge.object_with_ptr(native).is_none());

    // Wrapper destroyed with the entry; its reference is gone too.
    assert_eq!(bridge.live_wrapper_count(), 0);
    assert_eq!(bridge.pending_releases(), 0);

    bridge.collect_garbage();
    bridge.cleanup();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn test_cleanup_finalizes_every_entry() {
    const K: usize = 5;

    let calls = Rc::new(RefCell::new(Vec::new()));
    let class = recording_class(&calls);
    let mut bridge = new_bridge();

    let scope = bridge.engine_mut().open_scope();
    let mut objects = Vec::new();
    for i in 0..K {
        let obj = bridge.create_object_with_class(&class).unwrap();
        bridge
            .set_private_data(&obj, NativePtr::from_addr(0x1000 + i * 0x10))
            .unwrap();
        objects.push(obj);
    }

    bridge.cleanup();

    assert_eq!(calls.borrow().len(), K);
    assert!(calls.borrow().iter().all(|(_, hint)| hint.is_none()));
    assert_eq!(bridge.registry_len(), 0);
    assert!(!bridge.is_set_up());

    // Idempotent.
    bridge.cleanup();
    assert_eq!(calls.borrow().len(), K);

    // Teardown detached the engine-side wraps: collecting the values later
    // finalizes nothing.
    assert_eq!(bridge.get_private_data(&objects[0]), None);
    assert_eq!(objects[0].private_data(), None);
    drop(objects);
    bridge.engine_mut().close_scope(scope);
    assert_eq!(bridge.collect_garbage(), 0);
    assert_eq!(calls.borrow().len(), K);
}

#[test]
fn test_rebind_after_cleanup_survives_old_value() {
    let first_calls = Rc::new(Cell::new(0));
    let second_calls = Rc::new(Cell::new(0));
    let mut bridge = new_bridge();
    let native = NativePtr::from_addr(0x100);

    let scope = bridge.engine_mut().open_scope();
    let first = bridge.create_plain_object().unwrap();
    let counter = first_calls.clone();
    first.set_finalize_callback(Rc::new(move |_, _, _| counter.set(counter.get() + 1)));
    bridge.set_private_data(&first, native).unwrap();

    bridge.cleanup();
    assert_eq!(first_calls.get(), 1);
    bridge.setup();

    let second = bridge.create_plain_object().unwrap();
    let counter = second_calls.clone();
    second.set_finalize_callback(Rc::new(move |_, _, _| counter.set(counter.get() + 1)));
    bridge.set_private_data(&second, native).unwrap();
    bridge.root(&second);

    // The old value becomes unreachable and is collected.
    drop(first);
    bridge.engine_mut().close_scope(scope);
    bridge.collect_garbage();

    assert_eq!(first_calls.get(), 1);
    assert_eq!(second_calls.get(), 0);
    assert_eq!(bridge.registry_len(), 1);
    assert_eq!(bridge.object_with_ptr(native).as_ref(), Some(&second));
    assert_eq!(bridge.get_private_data(&second), Some(native));
    assert!(second.value(bridge.engine()).is_ok());
}

#[test]
fn test_finalizer_for_other_wrapper_leaves_entry() {
    let calls = Rc::new(Cell::new(0));
    let mut bridge = new_bridge();
    let native = NativePtr::from_addr(0x200);

    let obj = bridge.create_plain_object().unwrap();
    let counter = calls.clone();
    obj.set_finalize_callback(Rc::new(move |_, _, _| counter.set(counter.get() + 1)));
    bridge.set_private_data(&obj, native).unwrap();

    let state = Rc::downgrade(&bridge.state);
    let stale = WrapperId::new(obj.id().get() + 100);

    super::binding::finalize_native(&state, bridge.env(), native, stale);
    assert_eq!(calls.get(), 0);
    assert_eq!(bridge.registry_len(), 1);
    assert_eq!(obj.ref_count(), 2);

    super::binding::finalize_native(&state, bridge.env(), native, obj.id());
    assert_eq!(calls.get(), 1);
    assert_eq!(bridge.registry_len(), 0);
    assert_eq!(obj.ref_count(), 1);
}

#[test]
fn test_own_callback_preferred_over_class() {
    let class_calls = Rc::new(RefCell::new(Vec::new()));
    let class = recording_class(&class_calls);
    let own_calls = Rc::new(Cell::new(0));
    let mut bridge = new_bridge();

    let obj = bridge.create_object_with_class(&class).unwrap();
    let counter = own_calls.clone();
    obj.set_finalize_callback(Rc::new(move |_, _, _| counter.set(counter.get() + 1)));
    bridge.set_private_data(&obj, NativePtr::from_addr(0x10)).unwrap();

    bridge.cleanup();

    assert_eq!(own_calls.get(), 1);
    assert!(class_calls.borrow().is_empty());
}

#[test]
fn test_lookup_returns_bound_wrapper() {
    let mut bridge = new_bridge();
    let native = NativePtr::from_addr(0x40);

    let obj = bridge.create_plain_object().unwrap();
    bridge.set_private_data(&obj, native).unwrap();
    // Caller + registry.
    assert_eq!(obj.ref_count(), 2);

    let found = bridge.object_with_ptr(native).unwrap();
    assert_eq!(found, obj);
    assert_eq!(obj.ref_count(), 3);

    assert_eq!(obj.private_data(), Some(native));
    assert_eq!(bridge.get_private_data(&obj), Some(native));
    assert_eq!(
        bridge.get_property(&obj, "__native_ptr__"),
        Some(Value::BigInt(0x40))
    );
}

#[test]
fn test_get_private_data_unbound() {
    let mut bridge = new_bridge();
    let obj = bridge.create_plain_object().unwrap();

    assert_eq!(bridge.get_private_data(&obj), None);
}

#[test]
#[should_panic(expected = "already has private data bound")]
fn test_set_private_data_twice_panics() {
    let mut bridge = new_bridge();
    let obj = bridge.create_plain_object().unwrap();

    bridge.set_private_data(&obj, NativePtr::from_addr(0x10)).unwrap();
    let _ = bridge.set_private_data(&obj, NativePtr::from_addr(0x20));
}

#[test]
#[should_panic(expected = "already bound to a wrapper")]
fn test_pointer_bound_to_two_wrappers_panics() {
    let mut bridge = new_bridge();
    let first = bridge.create_plain_object().unwrap();
    let second = bridge.create_plain_object().unwrap();
    let native = NativePtr::from_addr(0x10);

    bridge.set_private_data(&first, native).unwrap();
    let _ = bridge.set_private_data(&second, native);
}

#[test]
fn test_rooted_value_survives_collection() {
    let mut bridge = new_bridge();

    let scope = bridge.engine_mut().open_scope();
    let obj = bridge.create_plain_object().unwrap();
    bridge.engine_mut().close_scope(scope);

    bridge.root(&obj);
    bridge.root(&obj);
    bridge.collect_garbage();
    assert!(obj.value(bridge.engine()).is_ok());

    bridge.unroot(&obj);
    bridge.collect_garbage();
    assert!(obj.value(bridge.engine()).is_ok());

    bridge.unroot(&obj);
    assert!(!bridge.is_rooted(&obj));
    bridge.collect_garbage();
    assert_eq!(obj.value(bridge.engine()), Err(EngineError::Collected));
}

#[test]
fn test_cleanup_resets_roots() {
    let mut bridge = new_bridge();
    let obj = bridge.create_plain_object().unwrap();
    bridge.root(&obj);

    bridge.cleanup();

    assert_eq!(obj.root_count(), 0);
}

#[test]
fn test_private_data_holder_released_on_cleanup() {
    let calls = Rc::new(Cell::new(0));
    let mut bridge = new_bridge();

    let counter = calls.clone();
    let holder = bridge
        .create_private_data_holder(
            NativePtr::from_addr(0x80),
            Rc::new(move |_, _, _| counter.set(counter.get() + 1)),
        )
        .unwrap();

    assert_eq!(holder.class_name(), Some("__PrivateData"));
    // Caller + registry + the holder's own extra reference.
    assert_eq!(holder.ref_count(), 3);
    drop(holder);

    assert_eq!(bridge.live_wrapper_count(), 1);
    bridge.cleanup();

    assert_eq!(calls.get(), 1);
    assert_eq!(bridge.live_wrapper_count(), 0);
    assert_eq!(bridge.pending_releases(), 0);
}

#[test]
fn test_collected_holder_is_destroyed() {
    let calls = Rc::new(Cell::new(0));
    let mut bridge = new_bridge();
    let native = NativePtr::from_addr(0x90);

    let scope = bridge.engine_mut().open_scope();
    let counter = calls.clone();
    let finalize: FinalizeFn = Rc::new(move |_, _, _| counter.set(counter.get() + 1));
    let holder = bridge.create_private_data_holder(native, finalize).unwrap();
    drop(holder);
    bridge.engine_mut().close_scope(scope);

    // Registry + the bridge's extra reference keep the wrapper alive natively.
    assert_eq!(bridge.live_wrapper_count(), 1);

    assert_eq!(bridge.collect_garbage(), 1);
    assert_eq!(calls.get(), 1);
    assert_eq!(bridge.registry_len(), 0);

    // Both references given back: destroyed, deregistered, reference deleted.
    assert_eq!(bridge.live_wrapper_count(), 0);
    assert_eq!(bridge.pending_releases(), 0);

    bridge.cleanup();
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_live_table_tracks_wrappers() {
    let mut bridge = new_bridge();

    let first = bridge.create_plain_object().unwrap();
    let second = bridge.create_array_object(2).unwrap();
    assert_eq!(bridge.live_wrapper_count(), 2);

    drop(first);
    assert_eq!(bridge.live_wrapper_count(), 1);
    assert_eq!(bridge.pending_releases(), 1);

    // Next engine access deletes the queued reference.
    bridge.engine_mut();
    assert_eq!(bridge.pending_releases(), 0);

    drop(second);
}

#[test]
fn test_wrappers_before_setup_are_untracked() {
    let mut bridge = Bridge::new(LocalHeap::new());
    let obj = bridge.create_plain_object().unwrap();

    assert!(!bridge.is_set_up());
    assert_eq!(bridge.live_wrapper_count(), 0);

    bridge.setup();
    assert_eq!(bridge.live_wrapper_count(), 0);
    drop(obj);
}

#[test]
fn test_drop_runs_cleanup() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let class = recording_class(&calls);

    let obj = {
        let mut bridge = new_bridge();
        let obj = bridge.create_object_with_class(&class).unwrap();
        bridge.set_private_data(&obj, NativePtr::from_addr(0x10)).unwrap();
        obj
    };

    assert_eq!(calls.borrow().len(), 1);

    // The wrapper outlives its bridge; releasing it is harmless.
    assert_eq!(obj.ref_count(), 1);
    drop(obj);
}

#[test]
fn test_object_from_handle() {
    let mut bridge = new_bridge();

    let handle = bridge.engine_mut().create_array(3).unwrap();
    let obj = bridge.object_from_handle(handle, None).unwrap();

    assert!(bridge.is_array(&obj));
    assert_eq!(bridge.get_array_length(&obj).unwrap(), 3);
    assert_eq!(bridge.value_of(&obj).unwrap(), Value::Object(handle));
}
