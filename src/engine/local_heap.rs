//! In-process reference engine.
//!
//! `LocalHeap` implements [`Engine`] over a generational slot heap with a
//! stop-the-world mark/sweep collector. It exists so the bridge can be
//! exercised deterministically: collection only happens when
//! [`Engine::collect_garbage`] is called, and freshly created values stay
//! alive while the [`HandleScope`] that saw them is open.
//!
//! Roots are the global object, handles in open scopes and references with a
//! count above zero. Finalizers of swept wrapped objects run after the sweep,
//! once each.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;

use super::{
    CallInfo, Engine, EnvId, Finalizer, NativeFunction, NativePtr, ObjectHandle, ObjectType,
    RefHandle, TypedArrayInfo, TypedArrayKind, Value,
};
use crate::error::EngineError;

static NEXT_ENV_ID: AtomicU32 = AtomicU32::new(1);

/// Largest dense array this heap backs with storage.
const MAX_ARRAY_LENGTH: usize = 1 << 24;

enum ObjectKind {
    Plain,
    /// `None` entries are holes.
    Array(Vec<Option<Value>>),
    ArrayBuffer(BytesMut),
    TypedArray(TypedArrayInfo),
    Function {
        name: String,
        callback: NativeFunction,
    },
}

impl ObjectKind {
    fn name(&self) -> &'static str {
        match self {
            ObjectKind::Plain => "object",
            ObjectKind::Array(_) => "array",
            ObjectKind::ArrayBuffer(_) => "arraybuffer",
            ObjectKind::TypedArray(_) => "typedarray",
            ObjectKind::Function { .. } => "function",
        }
    }
}

enum Property {
    Data(Value),
    Accessor {
        getter: Option<NativeFunction>,
        setter: Option<NativeFunction>,
    },
}

struct Wrap {
    native: NativePtr,
    finalizer: Finalizer,
}

struct HeapObject {
    kind: ObjectKind,
    properties: Vec<(String, Property)>,
    wrap: Option<Wrap>,
}

impl HeapObject {
    fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            properties: Vec::new(),
            wrap: None,
        }
    }

    fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, prop)| prop)
    }

    fn put_property(&mut self, name: &str, prop: Property) {
        match self.properties.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = prop,
            None => self.properties.push((name.to_string(), prop)),
        }
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

struct Reference {
    target: ObjectHandle,
    count: u32,
}

/// Marker returned by [`LocalHeap::open_scope`].
///
/// Every handle created after the scope was opened stays rooted until the
/// scope is closed.
#[derive(Debug)]
#[must_use = "a scope that is never closed keeps its values alive"]
pub struct HandleScope {
    mark: usize,
}

pub struct LocalHeap {
    env: EnvId,
    objects: Vec<Slot<HeapObject>>,
    free_objects: Vec<u32>,
    live_objects: usize,
    max_objects: Option<usize>,
    references: Vec<Slot<Reference>>,
    free_references: Vec<u32>,
    locals: Vec<ObjectHandle>,
    global: ObjectHandle,
    gc_runs: u64,
}

impl Default for LocalHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalHeap {
    pub fn new() -> Self {
        let env = EnvId::new(NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed));

        let mut heap = Self {
            env,
            objects: Vec::new(),
            free_objects: Vec::new(),
            live_objects: 0,
            max_objects: None,
            references: Vec::new(),
            free_references: Vec::new(),
            locals: Vec::new(),
            global: ObjectHandle::new(0, 0),
            gc_runs: 0,
        };

        heap.objects.push(Slot {
            generation: 0,
            value: Some(HeapObject::new(ObjectKind::Plain)),
        });
        heap.live_objects = 1;

        heap
    }

    /// Cap the number of live objects (global included). Allocations beyond
    /// the cap fail with [`EngineError::AllocationFailed`].
    pub fn with_object_limit(mut self, max_objects: usize) -> Self {
        self.max_objects = Some(max_objects);
        self
    }

    pub fn open_scope(&mut self) -> HandleScope {
        HandleScope {
            mark: self.locals.len(),
        }
    }

    pub fn close_scope(&mut self, scope: HandleScope) {
        self.locals.truncate(scope.mark);
    }

    pub fn live_object_count(&self) -> usize {
        self.live_objects
    }

    pub fn gc_runs(&self) -> u64 {
        self.gc_runs
    }

    /// Whether `handle` still refers to a live object.
    pub fn is_alive(&self, handle: ObjectHandle) -> bool {
        self.object(handle).is_ok()
    }

    fn object(&self, handle: ObjectHandle) -> Result<&HeapObject, EngineError> {
        self.objects
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.as_ref())
            .ok_or(EngineError::InvalidHandle)
    }

    fn object_mut(&mut self, handle: ObjectHandle) -> Result<&mut HeapObject, EngineError> {
        self.objects
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.as_mut())
            .ok_or(EngineError::InvalidHandle)
    }

    fn alloc(&mut self, kind: ObjectKind) -> Result<ObjectHandle, EngineError> {
        if let Some(max) = self.max_objects
            && self.live_objects >= max
        {
            tracing::warn!("LocalHeap object limit reached ({} objects)", max);
            return Err(EngineError::AllocationFailed);
        }

        let object = HeapObject::new(kind);

        let handle = match self.free_objects.pop() {
            Some(index) => {
                let slot = &mut self.objects[index as usize];
                slot.value = Some(object);
                ObjectHandle::new(index, slot.generation)
            }
            None => {
                let index = self.objects.len() as u32;
                self.objects.push(Slot {
                    generation: 0,
                    value: Some(object),
                });
                ObjectHandle::new(index, 0)
            }
        };

        self.live_objects += 1;
        self.locals.push(handle);

        Ok(handle)
    }

    fn reference(&self, reference: RefHandle) -> Result<&Reference, EngineError> {
        self.references
            .get(reference.index() as usize)
            .filter(|slot| slot.generation == reference.generation())
            .and_then(|slot| slot.value.as_ref())
            .ok_or(EngineError::InvalidHandle)
    }

    fn reference_mut(&mut self, reference: RefHandle) -> Result<&mut Reference, EngineError> {
        self.references
            .get_mut(reference.index() as usize)
            .filter(|slot| slot.generation == reference.generation())
            .and_then(|slot| slot.value.as_mut())
            .ok_or(EngineError::InvalidHandle)
    }

    fn typed_array_numbers(&self, info: &TypedArrayInfo) -> Result<Vec<f64>, EngineError> {
        let ObjectKind::ArrayBuffer(bytes) = &self.object(info.buffer)?.kind else {
            return Err(EngineError::InvalidHandle);
        };

        let size = info.kind.element_size().unwrap_or(1);
        let data = &bytes[info.byte_offset..info.byte_offset + info.byte_length()];

        Ok(data
            .chunks_exact(size)
            .map(|chunk| read_element(info.kind, chunk))
            .collect())
    }

    fn write_typed_element(
        &mut self,
        info: &TypedArrayInfo,
        index: usize,
        value: f64,
    ) -> Result<(), EngineError> {
        // Out-of-bounds writes are ignored, as in script.
        if index >= info.length {
            return Ok(());
        }

        let size = info.kind.element_size().unwrap_or(1);
        let start = info.byte_offset + index * size;

        let ObjectKind::ArrayBuffer(bytes) = &mut self.object_mut(info.buffer)?.kind else {
            return Err(EngineError::InvalidHandle);
        };

        write_element(info.kind, &mut bytes[start..start + size], value);
        Ok(())
    }

    fn stringify(
        &self,
        handle: ObjectHandle,
        visiting: &mut HashSet<ObjectHandle>,
    ) -> Result<String, EngineError> {
        let object = self.object(handle)?;

        match &object.kind {
            ObjectKind::Plain => Ok("[object Object]".to_string()),
            ObjectKind::ArrayBuffer(_) => Ok("[object ArrayBuffer]".to_string()),
            ObjectKind::Function { name, .. } => {
                Ok(format!("function {}() {{ [native code] }}", name))
            }
            ObjectKind::TypedArray(info) => {
                let numbers = self.typed_array_numbers(info)?;
                Ok(numbers
                    .into_iter()
                    .map(number_to_string)
                    .collect::<Vec<_>>()
                    .join(","))
            }
            ObjectKind::Array(elements) => {
                // Cyclic arrays join to the empty string.
                if !visiting.insert(handle) {
                    return Ok(String::new());
                }

                let mut parts = Vec::with_capacity(elements.len());

                for element in elements {
                    let part = match element.clone().unwrap_or_default() {
                        Value::Undefined | Value::Null => String::new(),
                        Value::Boolean(b) => b.to_string(),
                        Value::Number(n) => number_to_string(n),
                        Value::BigInt(n) => n.to_string(),
                        Value::String(s) => s,
                        Value::Object(inner) => self.stringify(inner, visiting)?,
                    };
                    parts.push(part);
                }

                visiting.remove(&handle);
                Ok(parts.join(","))
            }
        }
    }

    fn call_native(
        &mut self,
        callback: NativeFunction,
        this: Option<ObjectHandle>,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        let info = CallInfo {
            this,
            args: args.to_vec(),
        };

        let result = callback(self, &info)?;

        if let Value::Object(handle) = &result {
            self.locals.push(*handle);
        }

        Ok(result)
    }

    fn mark(&self) -> Vec<bool> {
        let mut marked = vec![false; self.objects.len()];

        let mut stack: Vec<ObjectHandle> = Vec::with_capacity(self.locals.len() + 1);
        stack.push(self.global);
        stack.extend(self.locals.iter().copied());
        stack.extend(
            self.references
                .iter()
                .filter_map(|slot| slot.value.as_ref())
                .filter(|reference| reference.count > 0)
                .map(|reference| reference.target),
        );

        while let Some(handle) = stack.pop() {
            let Ok(object) = self.object(handle) else {
                continue;
            };

            let index = handle.index() as usize;
            if marked[index] {
                continue;
            }
            marked[index] = true;

            for (_, prop) in &object.properties {
                if let Property::Data(Value::Object(child)) = prop {
                    stack.push(*child);
                }
            }

            match &object.kind {
                ObjectKind::Array(elements) => {
                    stack.extend(elements.iter().filter_map(|element| match element {
                        Some(Value::Object(child)) => Some(*child),
                        _ => None,
                    }));
                }
                ObjectKind::TypedArray(info) => stack.push(info.buffer),
                _ => {}
            }
        }

        marked
    }
}

impl Engine for LocalHeap {
    fn env(&self) -> EnvId {
        self.env
    }

    fn global(&mut self) -> Result<ObjectHandle, EngineError> {
        Ok(self.global)
    }

    fn create_object(&mut self) -> Result<ObjectHandle, EngineError> {
        self.alloc(ObjectKind::Plain)
    }

    fn create_array(&mut self, length: u32) -> Result<ObjectHandle, EngineError> {
        check_array_length(length as usize)?;
        self.alloc(ObjectKind::Array(vec![None; length as usize]))
    }

    fn create_array_buffer(&mut self, byte_length: usize) -> Result<ObjectHandle, EngineError> {
        self.alloc(ObjectKind::ArrayBuffer(BytesMut::zeroed(byte_length)))
    }

    fn create_typed_array(
        &mut self,
        kind: TypedArrayKind,
        length: usize,
        buffer: ObjectHandle,
        byte_offset: usize,
    ) -> Result<ObjectHandle, EngineError> {
        let size = kind
            .element_size()
            .ok_or_else(|| EngineError::RangeError("invalid typed array kind".to_string()))?;

        let buffer_len = match &self.object(buffer)?.kind {
            ObjectKind::ArrayBuffer(bytes) => bytes.len(),
            other => {
                return Err(EngineError::TypeMismatch {
                    expected: "arraybuffer",
                    found: other.name(),
                });
            }
        };

        if byte_offset % size != 0 {
            return Err(EngineError::RangeError(format!(
                "start offset of {:?} should be a multiple of {}",
                kind, size
            )));
        }

        if byte_offset + length * size > buffer_len {
            return Err(EngineError::RangeError(
                "invalid typed array length".to_string(),
            ));
        }

        self.alloc(ObjectKind::TypedArray(TypedArrayInfo {
            kind,
            length,
            buffer,
            byte_offset,
        }))
    }

    fn create_function(
        &mut self,
        name: &str,
        callback: NativeFunction,
    ) -> Result<ObjectHandle, EngineError> {
        self.alloc(ObjectKind::Function {
            name: name.to_string(),
            callback,
        })
    }

    fn type_of(&self, value: ObjectHandle) -> Result<ObjectType, EngineError> {
        Ok(match self.object(value)?.kind {
            ObjectKind::Function { .. } => ObjectType::Function,
            _ => ObjectType::Object,
        })
    }

    fn is_array(&self, value: ObjectHandle) -> Result<bool, EngineError> {
        Ok(matches!(self.object(value)?.kind, ObjectKind::Array(_)))
    }

    fn is_typed_array(&self, value: ObjectHandle) -> Result<bool, EngineError> {
        Ok(matches!(self.object(value)?.kind, ObjectKind::TypedArray(_)))
    }

    fn is_array_buffer(&self, value: ObjectHandle) -> Result<bool, EngineError> {
        Ok(matches!(self.object(value)?.kind, ObjectKind::ArrayBuffer(_)))
    }

    fn array_length(&self, value: ObjectHandle) -> Result<u32, EngineError> {
        match &self.object(value)?.kind {
            ObjectKind::Array(elements) => Ok(elements.len() as u32),
            other => Err(EngineError::TypeMismatch {
                expected: "array",
                found: other.name(),
            }),
        }
    }

    fn typed_array_info(&self, value: ObjectHandle) -> Result<TypedArrayInfo, EngineError> {
        match &self.object(value)?.kind {
            ObjectKind::TypedArray(info) => Ok(*info),
            other => Err(EngineError::TypeMismatch {
                expected: "typedarray",
                found: other.name(),
            }),
        }
    }

    fn array_buffer_data(&mut self, value: ObjectHandle) -> Result<&mut [u8], EngineError> {
        match &mut self.object_mut(value)?.kind {
            ObjectKind::ArrayBuffer(bytes) => Ok(&mut bytes[..]),
            other => Err(EngineError::TypeMismatch {
                expected: "arraybuffer",
                found: other.name(),
            }),
        }
    }

    fn property_names(&self, value: ObjectHandle) -> Result<Vec<String>, EngineError> {
        let object = self.object(value)?;

        let mut names: Vec<String> = match &object.kind {
            ObjectKind::Array(elements) => elements
                .iter()
                .enumerate()
                .filter(|(_, element)| element.is_some())
                .map(|(index, _)| index.to_string())
                .collect(),
            ObjectKind::TypedArray(info) => (0..info.length).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        };

        names.extend(object.properties.iter().map(|(key, _)| key.clone()));

        Ok(names)
    }

    fn coerce_to_string(&mut self, value: ObjectHandle) -> Result<String, EngineError> {
        self.stringify(value, &mut HashSet::new())
    }

    fn get_named_property(
        &mut self,
        object: ObjectHandle,
        name: &str,
    ) -> Result<Value, EngineError> {
        let target = self.object(object)?;

        let getter = match target.property(name) {
            Some(Property::Data(value)) => return Ok(value.clone()),
            Some(Property::Accessor { getter, .. }) => getter.clone(),
            None => {
                return Ok(match (&target.kind, name) {
                    (ObjectKind::Array(elements), "length") => {
                        Value::Number(elements.len() as f64)
                    }
                    (ObjectKind::TypedArray(info), "length") => Value::Number(info.length as f64),
                    (ObjectKind::ArrayBuffer(bytes), "byteLength") => {
                        Value::Number(bytes.len() as f64)
                    }
                    _ => Value::Undefined,
                });
            }
        };

        match getter {
            Some(getter) => self.call_native(getter, Some(object), &[]),
            None => Ok(Value::Undefined),
        }
    }

    fn set_named_property(
        &mut self,
        object: ObjectHandle,
        name: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        let accessor = match self.object(object)?.property(name) {
            Some(Property::Accessor { setter, .. }) => Some(setter.clone()),
            _ => None,
        };

        match accessor {
            Some(Some(setter)) => {
                self.call_native(setter, Some(object), &[value])?;
            }
            // Accessors without a setter swallow the write.
            Some(None) => {}
            None => self
                .object_mut(object)?
                .put_property(name, Property::Data(value)),
        }

        Ok(())
    }

    fn define_accessor(
        &mut self,
        object: ObjectHandle,
        name: &str,
        getter: Option<NativeFunction>,
        setter: Option<NativeFunction>,
    ) -> Result<(), EngineError> {
        self.object_mut(object)?
            .put_property(name, Property::Accessor { getter, setter });
        Ok(())
    }

    fn get_element(&mut self, array: ObjectHandle, index: u32) -> Result<Value, EngineError> {
        let target = self.object(array)?;

        match &target.kind {
            ObjectKind::Array(elements) => {
                return Ok(elements
                    .get(index as usize)
                    .cloned()
                    .flatten()
                    .unwrap_or_default());
            }
            ObjectKind::TypedArray(info) => {
                if index as usize >= info.length {
                    return Ok(Value::Undefined);
                }
                let numbers = self.typed_array_numbers(info)?;
                return Ok(Value::Number(numbers[index as usize]));
            }
            _ => {}
        }

        self.get_named_property(array, &index.to_string())
    }

    fn set_element(
        &mut self,
        array: ObjectHandle,
        index: u32,
        value: Value,
    ) -> Result<(), EngineError> {
        let typed = match &mut self.object_mut(array)?.kind {
            ObjectKind::Array(elements) => {
                let index = index as usize;
                if index >= elements.len() {
                    check_array_length(index + 1)?;
                    elements.resize(index + 1, None);
                }
                elements[index] = Some(value);
                return Ok(());
            }
            ObjectKind::TypedArray(info) => Some(*info),
            _ => None,
        };

        match typed {
            Some(info) => {
                let number = match value {
                    Value::Number(n) => n,
                    Value::Boolean(b) => b as u8 as f64,
                    Value::BigInt(n) => n as f64,
                    Value::Null => 0.0,
                    _ => f64::NAN,
                };
                self.write_typed_element(&info, index as usize, number)
            }
            None => self.set_named_property(array, &index.to_string(), value),
        }
    }

    fn call_function(
        &mut self,
        function: ObjectHandle,
        this: Option<ObjectHandle>,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        let callback = match &self.object(function)?.kind {
            ObjectKind::Function { callback, .. } => callback.clone(),
            _ => return Err(EngineError::NotAFunction),
        };

        self.call_native(callback, this, args)
    }

    fn create_reference(
        &mut self,
        value: ObjectHandle,
        initial_count: u32,
    ) -> Result<RefHandle, EngineError> {
        self.object(value)?;

        let reference = Reference {
            target: value,
            count: initial_count,
        };

        let handle = match self.free_references.pop() {
            Some(index) => {
                let slot = &mut self.references[index as usize];
                slot.value = Some(reference);
                RefHandle::new(index, slot.generation)
            }
            None => {
                let index = self.references.len() as u32;
                self.references.push(Slot {
                    generation: 0,
                    value: Some(reference),
                });
                RefHandle::new(index, 0)
            }
        };

        Ok(handle)
    }

    fn reference_ref(&mut self, reference: RefHandle) -> Result<u32, EngineError> {
        let reference = self.reference_mut(reference)?;
        reference.count += 1;
        Ok(reference.count)
    }

    fn reference_unref(&mut self, reference: RefHandle) -> Result<u32, EngineError> {
        let reference = self.reference_mut(reference)?;

        if reference.count == 0 {
            return Err(EngineError::RangeError(
                "reference count is already zero".to_string(),
            ));
        }

        reference.count -= 1;
        Ok(reference.count)
    }

    fn reference_value(&self, reference: RefHandle) -> Result<Option<ObjectHandle>, EngineError> {
        let target = self.reference(reference)?.target;
        Ok(self.is_alive(target).then_some(target))
    }

    fn delete_reference(&mut self, reference: RefHandle) -> Result<(), EngineError> {
        self.reference(reference)?;

        let slot = &mut self.references[reference.index() as usize];
        slot.value = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_references.push(reference.index());

        Ok(())
    }

    fn wrap(
        &mut self,
        object: ObjectHandle,
        native: NativePtr,
        finalizer: Finalizer,
    ) -> Result<(), EngineError> {
        let target = self.object_mut(object)?;

        if target.wrap.is_some() {
            return Err(EngineError::Exception(
                "object is already wrapped".to_string(),
            ));
        }

        target.wrap = Some(Wrap { native, finalizer });
        Ok(())
    }

    fn unwrap(&self, object: ObjectHandle) -> Result<Option<NativePtr>, EngineError> {
        Ok(self.object(object)?.wrap.as_ref().map(|wrap| wrap.native))
    }

    fn remove_wrap(&mut self, object: ObjectHandle) -> Result<Option<NativePtr>, EngineError> {
        Ok(self.object_mut(object)?.wrap.take().map(|wrap| wrap.native))
    }

    fn collect_garbage(&mut self) -> usize {
        let marked = self.mark();
        let mut pending: Vec<Wrap> = Vec::new();
        let mut swept = 0;

        for (index, slot) in self.objects.iter_mut().enumerate() {
            if marked[index] || slot.value.is_none() {
                continue;
            }

            if let Some(wrap) = slot.value.take().and_then(|object| object.wrap) {
                pending.push(wrap);
            }

            slot.generation = slot.generation.wrapping_add(1);
            self.free_objects.push(index as u32);
            swept += 1;
        }

        self.live_objects -= swept;
        self.gc_runs += 1;

        let finalized = pending.len();
        for wrap in pending {
            (wrap.finalizer)(self.env, wrap.native);
        }

        tracing::debug!(
            "LocalHeap collection #{}: swept {} objects, ran {} finalizers",
            self.gc_runs,
            swept,
            finalized
        );

        finalized
    }
}

impl std::fmt::Debug for LocalHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalHeap")
            .field("env", &self.env)
            .field("live_objects", &self.live_objects)
            .field("locals", &self.locals.len())
            .field("gc_runs", &self.gc_runs)
            .finish()
    }
}

fn check_array_length(length: usize) -> Result<(), EngineError> {
    if length > MAX_ARRAY_LENGTH {
        return Err(EngineError::RangeError(format!(
            "array length {} exceeds {}",
            length, MAX_ARRAY_LENGTH
        )));
    }

    Ok(())
}

fn read_element(kind: TypedArrayKind, bytes: &[u8]) -> f64 {
    match kind {
        TypedArrayKind::Int8 => bytes[0] as i8 as f64,
        TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => bytes[0] as f64,
        TypedArrayKind::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        TypedArrayKind::Uint16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        TypedArrayKind::Int32 => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
        }
        TypedArrayKind::Uint32 => {
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
        }
        TypedArrayKind::Float32 => {
            f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
        }
        TypedArrayKind::Float64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            f64::from_le_bytes(raw)
        }
        TypedArrayKind::None => f64::NAN,
    }
}

fn write_element(kind: TypedArrayKind, bytes: &mut [u8], value: f64) {
    // Integer kinds wrap modulo 2^n like script ToInt8/ToUint16/...; NaN becomes 0.
    let wrapped = if value.is_finite() { value.trunc() as i64 } else { 0 };

    match kind {
        TypedArrayKind::Int8 | TypedArrayKind::Uint8 => bytes[0] = wrapped as u8,
        TypedArrayKind::Uint8Clamped => bytes[0] = value.clamp(0.0, 255.0).round_ties_even() as u8,
        TypedArrayKind::Int16 | TypedArrayKind::Uint16 => {
            bytes.copy_from_slice(&(wrapped as u16).to_le_bytes())
        }
        TypedArrayKind::Int32 | TypedArrayKind::Uint32 => {
            bytes.copy_from_slice(&(wrapped as u32).to_le_bytes())
        }
        TypedArrayKind::Float32 => bytes.copy_from_slice(&(value as f32).to_le_bytes()),
        TypedArrayKind::Float64 => bytes.copy_from_slice(&value.to_le_bytes()),
        TypedArrayKind::None => {}
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        // Covers -0 as well.
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_scope_keeps_values_alive() {
        let mut heap = LocalHeap::new();
        let scope = heap.open_scope();
        let obj = heap.create_object().unwrap();

        heap.collect_garbage();
        assert!(heap.is_alive(obj));

        heap.close_scope(scope);
        heap.collect_garbage();
        assert!(!heap.is_alive(obj));
    }

    #[test]
    fn test_stale_handle_rejected_after_slot_reuse() {
        let mut heap = LocalHeap::new();
        let scope = heap.open_scope();
        let first = heap.create_object().unwrap();
        heap.close_scope(scope);
        heap.collect_garbage();

        let second = heap.create_object().unwrap();
        assert_eq!(first.index(), second.index());
        assert_eq!(heap.type_of(first), Err(EngineError::InvalidHandle));
        assert!(heap.type_of(second).is_ok());
    }

    #[test]
    fn test_strong_reference_roots_value() {
        let mut heap = LocalHeap::new();
        let scope = heap.open_scope();
        let obj = heap.create_object().unwrap();
        let reference = heap.create_reference(obj, 1).unwrap();
        heap.close_scope(scope);

        heap.collect_garbage();
        assert_eq!(heap.reference_value(reference).unwrap(), Some(obj));

        assert_eq!(heap.reference_unref(reference).unwrap(), 0);
        heap.collect_garbage();
        assert_eq!(heap.reference_value(reference).unwrap(), None);
    }

    #[test]
    fn test_unref_below_zero_fails() {
        let mut heap = LocalHeap::new();
        let obj = heap.create_object().unwrap();
        let reference = heap.create_reference(obj, 0).unwrap();

        assert!(heap.reference_unref(reference).is_err());
    }

    #[test]
    fn test_finalizer_runs_once_for_unreachable_wrap() {
        let mut heap = LocalHeap::new();
        let calls = Rc::new(Cell::new(0));

        let scope = heap.open_scope();
        let obj = heap.create_object().unwrap();
        let counter = calls.clone();
        heap.wrap(
            obj,
            NativePtr::from_addr(0x1000),
            Box::new(move |_, native| {
                assert_eq!(native.addr(), 0x1000);
                counter.set(counter.get() + 1);
            }),
        )
        .unwrap();
        heap.close_scope(scope);

        assert_eq!(heap.collect_garbage(), 1);
        assert_eq!(heap.collect_garbage(), 0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_double_wrap_rejected() {
        let mut heap = LocalHeap::new();
        let obj = heap.create_object().unwrap();
        heap.wrap(obj, NativePtr::from_addr(8), Box::new(|_, _| {}))
            .unwrap();

        assert!(
            heap.wrap(obj, NativePtr::from_addr(16), Box::new(|_, _| {}))
                .is_err()
        );
        assert_eq!(heap.unwrap(obj).unwrap(), Some(NativePtr::from_addr(8)));
    }

    #[test]
    fn test_removed_wrap_never_finalizes() {
        let mut heap = LocalHeap::new();
        let calls = Rc::new(Cell::new(0));

        let scope = heap.open_scope();
        let obj = heap.create_object().unwrap();
        let counter = calls.clone();
        heap.wrap(
            obj,
            NativePtr::from_addr(0x20),
            Box::new(move |_, _| counter.set(counter.get() + 1)),
        )
        .unwrap();

        assert_eq!(heap.remove_wrap(obj).unwrap(), Some(NativePtr::from_addr(0x20)));
        assert_eq!(heap.unwrap(obj).unwrap(), None);
        assert_eq!(heap.remove_wrap(obj).unwrap(), None);
        heap.close_scope(scope);

        assert_eq!(heap.collect_garbage(), 0);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_properties_trace_children() {
        let mut heap = LocalHeap::new();
        let global = heap.global().unwrap();

        let scope = heap.open_scope();
        let child = heap.create_object().unwrap();
        heap.set_named_property(global, "child", Value::Object(child))
            .unwrap();
        heap.close_scope(scope);

        heap.collect_garbage();
        assert!(heap.is_alive(child));
    }

    #[test]
    fn test_typed_array_layout_checks() {
        let mut heap = LocalHeap::new();
        let buffer = heap.create_array_buffer(8).unwrap();

        assert!(
            heap.create_typed_array(TypedArrayKind::Int32, 1, buffer, 2)
                .is_err()
        );
        assert!(
            heap.create_typed_array(TypedArrayKind::Float64, 2, buffer, 0)
                .is_err()
        );

        let array = heap
            .create_typed_array(TypedArrayKind::Int16, 4, buffer, 0)
            .unwrap();
        heap.set_element(array, 1, Value::Number(-2.0)).unwrap();
        assert_eq!(heap.get_element(array, 1).unwrap(), Value::Number(-2.0));
        assert_eq!(&heap.array_buffer_data(buffer).unwrap()[2..4], &[0xfe, 0xff]);
    }

    #[test]
    fn test_far_out_of_range_index_rejected() {
        let mut heap = LocalHeap::new();
        let array = heap.create_array(0).unwrap();

        let result = heap.set_element(array, u32::MAX - 1, Value::Number(1.0));
        assert!(matches!(result, Err(EngineError::RangeError(_))));
        assert_eq!(heap.array_length(array).unwrap(), 0);

        assert!(matches!(
            heap.create_array(u32::MAX),
            Err(EngineError::RangeError(_))
        ));
    }

    #[test]
    fn test_coerce_array_to_string() {
        let mut heap = LocalHeap::new();
        let array = heap.create_array(0).unwrap();
        heap.set_element(array, 0, Value::Number(1.0)).unwrap();
        heap.set_element(array, 1, Value::from("two")).unwrap();
        heap.set_element(array, 3, Value::Number(0.5)).unwrap();

        assert_eq!(heap.coerce_to_string(array).unwrap(), "1,two,,0.5");
    }

    #[test]
    fn test_accessor_property() {
        let mut heap = LocalHeap::new();
        let obj = heap.create_object().unwrap();
        let stored = Rc::new(Cell::new(0.0));

        let read = stored.clone();
        let write = stored.clone();
        heap.define_accessor(
            obj,
            "value",
            Some(Rc::new(move |_: &mut dyn Engine, _: &CallInfo| {
                Ok(Value::Number(read.get()))
            })),
            Some(Rc::new(move |_: &mut dyn Engine, info: &CallInfo| {
                write.set(info.arg(0).as_number().unwrap_or(0.0));
                Ok(Value::Undefined)
            })),
        )
        .unwrap();

        heap.set_named_property(obj, "value", Value::Number(7.0))
            .unwrap();
        assert_eq!(stored.get(), 7.0);
        assert_eq!(
            heap.get_named_property(obj, "value").unwrap(),
            Value::Number(7.0)
        );
    }

    #[test]
    fn test_object_limit() {
        let mut heap = LocalHeap::new().with_object_limit(2);
        assert!(heap.create_object().is_ok());
        assert_eq!(heap.create_object(), Err(EngineError::AllocationFailed));
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(1.25), "1.25");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }
}
