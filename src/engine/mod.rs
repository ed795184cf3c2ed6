//! Scripting engine collaborator contract.
//!
//! The bridge never touches a script heap directly. Everything it needs from
//! the engine (allocation, property access, references, private-data wrapping,
//! collection) goes through the object-safe [`Engine`] trait, shaped after
//! Node-API so a native VM backend maps onto it one call per method.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bridge (wrappers, registry, live table)                    │
//! │  └── talks to the engine only through &mut dyn Engine       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Engine trait                                               │
//! │  ├── ObjectHandle: engine value (object, array, function)   │
//! │  ├── RefHandle: counted reference (0 = weak, >0 = strong)   │
//! │  └── wrap(): private data + collector-driven Finalizer      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  LocalHeap (in-process reference engine, mark/sweep)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod local_heap;

pub use local_heap::{HandleScope, LocalHeap};

use std::fmt;
use std::rc::Rc;

use crate::error::EngineError;

/// Identifies one script environment (napi_env / isolate + context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(u32);

impl EnvId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Handle to an engine-owned object value.
///
/// Handles are only meaningful to the engine that issued them. A handle to a
/// collected value is rejected with [`EngineError::InvalidHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl ObjectHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Handle to a counted engine reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefHandle {
    index: u32,
    generation: u32,
}

impl RefHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Opaque address of a native peer bound to a wrapper as private data.
///
/// The bridge never dereferences it; only finalizers that know the concrete
/// type (see [`crate::NativeClass`]) do.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativePtr(usize);

impl NativePtr {
    pub const NULL: NativePtr = NativePtr(0);

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    /// Leak a box and return its address. Ownership moves to whoever
    /// finalizes this pointer.
    pub fn from_box<T>(value: Box<T>) -> Self {
        Self(Box::into_raw(value) as usize)
    }

    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    pub fn addr(self) -> usize {
        self.0
    }

    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativePtr({:#x})", self.0)
    }
}

/// Tagged script value crossing the engine boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    BigInt(i64),
    String(String),
    Object(ObjectHandle),
}

/// Argument list for script calls.
pub type ValueArray = Vec<Value>;

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Object(_) => "object",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<ObjectHandle> for Value {
    fn from(value: ObjectHandle) -> Self {
        Value::Object(value)
    }
}

/// Result of `typeof` on an object handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Object,
    Function,
}

/// Typed-array element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedArrayKind {
    None,
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl TypedArrayKind {
    /// Element width in bytes, `None` for [`TypedArrayKind::None`].
    pub fn element_size(self) -> Option<usize> {
        match self {
            TypedArrayKind::None => None,
            TypedArrayKind::Int8 | TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => Some(1),
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 => Some(2),
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => Some(4),
            TypedArrayKind::Float64 => Some(8),
        }
    }

    /// Element width for kinds the bridge can construct.
    ///
    /// `None` and `Uint8Clamped` have no construction path.
    pub fn constructible_element_size(self) -> Option<usize> {
        match self {
            TypedArrayKind::None | TypedArrayKind::Uint8Clamped => None,
            kind => kind.element_size(),
        }
    }
}

/// Layout of a typed array over its backing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedArrayInfo {
    pub kind: TypedArrayKind,
    /// Element count.
    pub length: usize,
    pub buffer: ObjectHandle,
    pub byte_offset: usize,
}

impl TypedArrayInfo {
    pub fn byte_length(&self) -> usize {
        self.length * self.kind.element_size().unwrap_or(0)
    }
}

/// Receiver and arguments of a native function call.
#[derive(Debug, Clone, Default)]
pub struct CallInfo {
    pub this: Option<ObjectHandle>,
    pub args: ValueArray,
}

impl CallInfo {
    /// Argument `index`, `undefined` when missing.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

/// Native callback exposed to scripts as a function.
pub type NativeFunction = Rc<dyn Fn(&mut dyn Engine, &CallInfo) -> Result<Value, EngineError>>;

/// Collector-driven cleanup for one wrapped value.
///
/// Invoked at most once, with the environment and the bound native pointer,
/// after the wrapped value became unreachable.
pub type Finalizer = Box<dyn FnOnce(EnvId, NativePtr)>;

/// Operations the bridge consumes from a scripting engine.
///
/// All methods run on the thread owning the environment. Finalizers passed to
/// [`Engine::wrap`] are only invoked from [`Engine::collect_garbage`], never
/// while another engine call is in progress.
pub trait Engine {
    fn env(&self) -> EnvId;

    fn global(&mut self) -> Result<ObjectHandle, EngineError>;

    // Allocation

    fn create_object(&mut self) -> Result<ObjectHandle, EngineError>;

    fn create_array(&mut self, length: u32) -> Result<ObjectHandle, EngineError>;

    /// Allocate a zero-filled buffer of `byte_length` bytes.
    fn create_array_buffer(&mut self, byte_length: usize) -> Result<ObjectHandle, EngineError>;

    fn create_typed_array(
        &mut self,
        kind: TypedArrayKind,
        length: usize,
        buffer: ObjectHandle,
        byte_offset: usize,
    ) -> Result<ObjectHandle, EngineError>;

    fn create_function(
        &mut self,
        name: &str,
        callback: NativeFunction,
    ) -> Result<ObjectHandle, EngineError>;

    // Introspection

    fn type_of(&self, value: ObjectHandle) -> Result<ObjectType, EngineError>;

    fn is_array(&self, value: ObjectHandle) -> Result<bool, EngineError>;

    fn is_typed_array(&self, value: ObjectHandle) -> Result<bool, EngineError>;

    fn is_array_buffer(&self, value: ObjectHandle) -> Result<bool, EngineError>;

    fn array_length(&self, value: ObjectHandle) -> Result<u32, EngineError>;

    fn typed_array_info(&self, value: ObjectHandle) -> Result<TypedArrayInfo, EngineError>;

    fn array_buffer_data(&mut self, value: ObjectHandle) -> Result<&mut [u8], EngineError>;

    /// Own enumerable string keys, in insertion order (array indices first).
    fn property_names(&self, value: ObjectHandle) -> Result<Vec<String>, EngineError>;

    fn coerce_to_string(&mut self, value: ObjectHandle) -> Result<String, EngineError>;

    // Properties and calls

    fn get_named_property(
        &mut self,
        object: ObjectHandle,
        name: &str,
    ) -> Result<Value, EngineError>;

    fn set_named_property(
        &mut self,
        object: ObjectHandle,
        name: &str,
        value: Value,
    ) -> Result<(), EngineError>;

    fn define_accessor(
        &mut self,
        object: ObjectHandle,
        name: &str,
        getter: Option<NativeFunction>,
        setter: Option<NativeFunction>,
    ) -> Result<(), EngineError>;

    fn get_element(&mut self, array: ObjectHandle, index: u32) -> Result<Value, EngineError>;

    fn set_element(
        &mut self,
        array: ObjectHandle,
        index: u32,
        value: Value,
    ) -> Result<(), EngineError>;

    fn call_function(
        &mut self,
        function: ObjectHandle,
        this: Option<ObjectHandle>,
        args: &[Value],
    ) -> Result<Value, EngineError>;

    // References

    /// Create a reference with `initial_count`; a count of zero is weak.
    fn create_reference(
        &mut self,
        value: ObjectHandle,
        initial_count: u32,
    ) -> Result<RefHandle, EngineError>;

    fn reference_ref(&mut self, reference: RefHandle) -> Result<u32, EngineError>;

    fn reference_unref(&mut self, reference: RefHandle) -> Result<u32, EngineError>;

    /// Target of the reference, `None` once a weak target was collected.
    fn reference_value(&self, reference: RefHandle) -> Result<Option<ObjectHandle>, EngineError>;

    fn delete_reference(&mut self, reference: RefHandle) -> Result<(), EngineError>;

    // Private data

    /// Attach `native` to `object` and register `finalizer` with the collector.
    fn wrap(
        &mut self,
        object: ObjectHandle,
        native: NativePtr,
        finalizer: Finalizer,
    ) -> Result<(), EngineError>;

    fn unwrap(&self, object: ObjectHandle) -> Result<Option<NativePtr>, EngineError>;

    /// Detach the private data of `object` without running its finalizer.
    fn remove_wrap(&mut self, object: ObjectHandle) -> Result<Option<NativePtr>, EngineError>;

    // Collection

    /// Run a full collection. Returns the number of finalizers invoked.
    fn collect_garbage(&mut self) -> usize;
}
