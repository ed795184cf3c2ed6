pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod gc;
pub mod object;

// Core API
pub use bridge::Bridge;
pub use config::{BridgeConfig, MAX_STRING_LEN};
pub use error::{EngineError, Error, Result};
pub use object::{Class, FinalizeFn, NativeClass, ObjectRef, Wrapper, WrapperId};

// Engine collaborator types
pub use engine::{
    CallInfo, Engine, EnvId, HandleScope, LocalHeap, NativeFunction, NativePtr, ObjectHandle,
    ObjectType, TypedArrayKind, Value, ValueArray,
};

// Derive macro, shares the name of the trait it implements
pub use openworkers_object_bridge_derive::NativeClass;
