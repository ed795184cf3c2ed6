#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use openworkers_object_bridge::{
    Bridge, CallInfo, Engine, EngineError, FinalizeFn, LocalHeap, ObjectHandle, Value,
};

pub fn new_bridge() -> Bridge<LocalHeap> {
    let mut bridge = Bridge::new(LocalHeap::new());
    bridge.setup();
    bridge
}

/// Finalizer counting its invocations.
pub fn counting_finalizer() -> (FinalizeFn, Rc<Cell<u32>>) {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    (Rc::new(move |_, _, _| counter.set(counter.get() + 1)), calls)
}

fn edge_key(dependency: ObjectHandle) -> String {
    format!("__nativeRef_{}_{}", dependency.index(), dependency.generation())
}

fn edge_args(info: &CallInfo) -> Result<(ObjectHandle, ObjectHandle), EngineError> {
    let owner = info.arg(0).as_object().ok_or(EngineError::TypeMismatch {
        expected: "object",
        found: info.arg(0).type_name(),
    })?;
    let dependency = info.arg(1).as_object().ok_or(EngineError::TypeMismatch {
        expected: "object",
        found: info.arg(1).type_name(),
    })?;

    Ok((owner, dependency))
}

/// Install a `jsb` keep-alive registry on the global object, the way the
/// script runtime does: an edge is a hidden property of the owner.
pub fn install_keep_alive_registry(bridge: &mut Bridge<LocalHeap>) {
    let engine = bridge.engine_mut();

    let register = engine
        .create_function(
            "registerNativeRef",
            Rc::new(|engine: &mut dyn Engine, info: &CallInfo| -> Result<Value, EngineError> {
                let (owner, dependency) = edge_args(info)?;
                engine.set_named_property(owner, &edge_key(dependency), Value::Object(dependency))?;
                Ok(Value::Undefined)
            }),
        )
        .unwrap();

    let unregister = engine
        .create_function(
            "unregisterNativeRef",
            Rc::new(|engine: &mut dyn Engine, info: &CallInfo| -> Result<Value, EngineError> {
                let (owner, dependency) = edge_args(info)?;
                engine.set_named_property(owner, &edge_key(dependency), Value::Undefined)?;
                Ok(Value::Undefined)
            }),
        )
        .unwrap();

    let jsb = engine.create_object().unwrap();
    engine
        .set_named_property(jsb, "registerNativeRef", Value::Object(register))
        .unwrap();
    engine
        .set_named_property(jsb, "unregisterNativeRef", Value::Object(unregister))
        .unwrap();

    let global = engine.global().unwrap();
    engine
        .set_named_property(global, "jsb", Value::Object(jsb))
        .unwrap();
}
