//! Wrapper factories.

use std::rc::Rc;

use serde_json::Value as Json;

use super::Bridge;
use crate::engine::{Engine, NativePtr, ObjectHandle, TypedArrayKind, Value};
use crate::error::{Error, Result};
use crate::object::{Class, FinalizeFn, ObjectRef};

impl<E: Engine> Bridge<E> {
    pub fn create_plain_object(&mut self) -> Result<ObjectRef> {
        self.process_deferred();
        let handle = self.engine.create_object()?;
        self.wrap_handle(handle, None)
    }

    pub fn create_array_object(&mut self, length: u32) -> Result<ObjectRef> {
        self.process_deferred();
        let handle = self.engine.create_array(length)?;
        self.wrap_handle(handle, None)
    }

    /// Allocate a buffer of `byte_length` bytes, copied from `data` when given
    /// and zero-filled otherwise.
    ///
    /// # Panics
    ///
    /// If `data` is shorter than `byte_length`.
    pub fn create_array_buffer_object(
        &mut self,
        data: Option<&[u8]>,
        byte_length: usize,
    ) -> Result<ObjectRef> {
        self.process_deferred();
        let handle = self.new_filled_buffer(data, byte_length)?;
        self.wrap_handle(handle, None)
    }

    /// Allocate a typed array over a fresh buffer of `byte_length` bytes.
    ///
    /// The element count is `byte_length / element_size`. `None` and
    /// `Uint8Clamped` have no construction path and fail before anything is
    /// allocated.
    pub fn create_typed_array(
        &mut self,
        kind: TypedArrayKind,
        data: Option<&[u8]>,
        byte_length: usize,
    ) -> Result<ObjectRef> {
        let Some(element_size) = kind.constructible_element_size() else {
            tracing::error!("Unsupported typed array kind {:?}", kind);
            return Err(Error::UnsupportedTypedArrayKind(kind));
        };

        self.process_deferred();

        let buffer = self.new_filled_buffer(data, byte_length)?;
        let length = byte_length / element_size;
        let handle = self.engine.create_typed_array(kind, length, buffer, 0)?;

        self.wrap_handle(handle, None)
    }

    /// Allocate an instance through `class` and wrap it with that class.
    pub fn create_object_with_class(&mut self, class: &Rc<Class>) -> Result<ObjectRef> {
        self.process_deferred();
        let handle = class.create_instance(&mut self.engine)?;
        self.wrap_handle(handle, Some(class.clone()))
    }

    /// Build an object or array graph from a JSON document.
    pub fn create_json_object(&mut self, json: &str) -> Result<ObjectRef> {
        let document: Json = serde_json::from_str(json)?;

        if !document.is_object() && !document.is_array() {
            return Err(Error::NotAContainer);
        }

        self.process_deferred();

        let handle = match json_to_value(&mut self.engine, &document)? {
            Value::Object(handle) => handle,
            _ => unreachable!("containers convert to objects"),
        };

        self.wrap_handle(handle, None)
    }

    /// Bind `native` to a fresh wrapper of the private-data bookkeeping class.
    ///
    /// The bridge keeps one extra owning reference on the holder. It is given
    /// back when the script value is collected, or by `cleanup()`.
    pub fn create_private_data_holder(
        &mut self,
        native: NativePtr,
        finalize: FinalizeFn,
    ) -> Result<ObjectRef> {
        let class = self.private_data_class.clone();
        let holder = self.create_object_with_class(&class)?;

        holder.set_finalize_callback(finalize);
        self.set_private_data(&holder, native)?;
        self.state.keep_holder(holder.clone());

        Ok(holder)
    }

    fn new_filled_buffer(
        &mut self,
        data: Option<&[u8]>,
        byte_length: usize,
    ) -> Result<ObjectHandle> {
        let buffer = self.engine.create_array_buffer(byte_length)?;

        if let Some(data) = data {
            assert!(
                data.len() >= byte_length,
                "source data holds {} bytes, {} requested",
                data.len(),
                byte_length
            );

            self.engine
                .array_buffer_data(buffer)?
                .copy_from_slice(&data[..byte_length]);
        }

        Ok(buffer)
    }
}

fn json_to_value(engine: &mut dyn Engine, json: &Json) -> Result<Value> {
    let value = match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => {
            let array = engine.create_array(items.len() as u32)?;

            for (index, item) in items.iter().enumerate() {
                let item = json_to_value(engine, item)?;
                engine.set_element(array, index as u32, item)?;
            }

            Value::Object(array)
        }
        Json::Object(fields) => {
            let object = engine.create_object()?;

            for (name, field) in fields {
                let field = json_to_value(engine, field)?;
                engine.set_named_property(object, name, field)?;
            }

            Value::Object(object)
        }
    };

    Ok(value)
}
