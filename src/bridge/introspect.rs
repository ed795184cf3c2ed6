//! Type checks and data views.

use super::Bridge;
use crate::config::MAX_STRING_LEN;
use crate::engine::{Engine, ObjectType, TypedArrayKind};
use crate::error::Result;
use crate::object::Wrapper;

/// Copy `text` the way a `MAX_STRING_LEN` byte buffer would receive it: at
/// most `MAX_STRING_LEN - 1` bytes, cut at a character boundary.
pub(crate) fn copy_to_string_buffer(text: &str) -> String {
    let capacity = MAX_STRING_LEN - 1;

    if text.len() <= capacity {
        return text.to_string();
    }

    let mut end = capacity;
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    tracing::trace!("Truncated string of {} bytes to {}", text.len(), end);
    text[..end].to_string()
}

impl<E: Engine> Bridge<E> {
    pub fn is_array(&self, obj: &Wrapper) -> bool {
        obj.value(&self.engine)
            .and_then(|handle| self.engine.is_array(handle))
            .unwrap_or(false)
    }

    pub fn is_function(&self, obj: &Wrapper) -> bool {
        obj.value(&self.engine)
            .and_then(|handle| self.engine.type_of(handle))
            .is_ok_and(|ty| ty == ObjectType::Function)
    }

    pub fn is_typed_array(&self, obj: &Wrapper) -> bool {
        obj.value(&self.engine)
            .and_then(|handle| self.engine.is_typed_array(handle))
            .unwrap_or(false)
    }

    pub fn is_array_buffer(&self, obj: &Wrapper) -> bool {
        obj.value(&self.engine)
            .and_then(|handle| self.engine.is_array_buffer(handle))
            .unwrap_or(false)
    }

    pub fn get_array_length(&self, obj: &Wrapper) -> Result<u32> {
        let handle = obj.value(&self.engine)?;
        Ok(self.engine.array_length(handle)?)
    }

    /// Element kind of a typed array, `None` for anything else.
    pub fn get_typed_array_kind(&self, obj: &Wrapper) -> Option<TypedArrayKind> {
        let handle = obj.value(&self.engine).ok()?;
        let info = self.engine.typed_array_info(handle).ok()?;
        Some(info.kind)
    }

    /// Bytes viewed by a typed array: its window into the backing buffer,
    /// starting at the array's byte offset.
    pub fn get_typed_array_data(&mut self, obj: &Wrapper) -> Result<&mut [u8]> {
        let handle = obj.value(&self.engine)?;
        let info = self.engine.typed_array_info(handle)?;
        let start = info.byte_offset;
        let end = start + info.byte_length();

        let data = self.engine.array_buffer_data(info.buffer)?;
        Ok(&mut data[start..end])
    }

    pub fn get_array_buffer_data(&mut self, obj: &Wrapper) -> Result<&mut [u8]> {
        let handle = obj.value(&self.engine)?;
        Ok(self.engine.array_buffer_data(handle)?)
    }

    /// Own enumerable property names.
    ///
    /// Each name passes through a `MAX_STRING_LEN` buffer: longer names come
    /// back truncated, and empty names are skipped.
    pub fn get_all_keys(&self, obj: &Wrapper) -> Result<Vec<String>> {
        let handle = obj.value(&self.engine)?;

        let keys = self
            .engine
            .property_names(handle)?
            .iter()
            .map(|name| copy_to_string_buffer(name))
            .filter(|name| !name.is_empty())
            .collect();

        Ok(keys)
    }

    /// Textual form of the wrapped value.
    ///
    /// Functions, arrays and typed arrays are coerced by the engine (bounded
    /// like `get_all_keys`). Array buffers and everything else report fixed
    /// sentinels.
    pub fn to_string(&mut self, obj: &Wrapper) -> String {
        if self.is_function(obj) || self.is_array(obj) || self.is_typed_array(obj) {
            let coerced = obj
                .value(&self.engine)
                .and_then(|handle| self.engine.coerce_to_string(handle));

            return match coerced {
                Ok(text) => copy_to_string_buffer(&text),
                Err(err) => {
                    tracing::warn!("Failed to coerce wrapper {:?} to string: {}", obj.id(), err);
                    String::new()
                }
            };
        }

        if self.is_array_buffer(obj) {
            "[object ArrayBuffer]".to_string()
        } else {
            "[object Object]".to_string()
        }
    }
}
