//! Property access and calls.

use super::Bridge;
use crate::engine::{Engine, NativeFunction, ObjectType, Value};
use crate::error::Result;
use crate::object::Wrapper;

impl<E: Engine> Bridge<E> {
    /// The wrapped script value as a [`Value`].
    pub fn value_of(&self, obj: &Wrapper) -> Result<Value> {
        Ok(Value::Object(obj.value(&self.engine)?))
    }

    pub fn set_property(
        &mut self,
        obj: &Wrapper,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.process_deferred();
        let handle = obj.value(&self.engine)?;
        self.engine.set_named_property(handle, name, value.into())?;
        Ok(())
    }

    /// Named property of `obj`. Failures and `undefined` both read as `None`.
    pub fn get_property(&mut self, obj: &Wrapper, name: &str) -> Option<Value> {
        self.process_deferred();
        let handle = obj.value(&self.engine).ok()?;

        match self.engine.get_named_property(handle, name) {
            Ok(Value::Undefined) => None,
            Ok(value) => Some(value),
            Err(err) => {
                tracing::trace!(
                    "get_property({:?}) on wrapper {:?} failed: {}",
                    name,
                    obj.id(),
                    err
                );
                None
            }
        }
    }

    pub fn get_array_element(&mut self, obj: &Wrapper, index: u32) -> Result<Value> {
        self.process_deferred();
        let handle = obj.value(&self.engine)?;
        Ok(self.engine.get_element(handle, index)?)
    }

    pub fn set_array_element(
        &mut self,
        obj: &Wrapper,
        index: u32,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.process_deferred();
        let handle = obj.value(&self.engine)?;
        self.engine.set_element(handle, index, value.into())?;
        Ok(())
    }

    /// Install a native function as a named property of `obj`.
    pub fn define_function(
        &mut self,
        obj: &Wrapper,
        name: &str,
        function: NativeFunction,
    ) -> Result<()> {
        self.process_deferred();
        let handle = obj.value(&self.engine)?;
        let function = self.engine.create_function(name, function)?;
        self.engine
            .set_named_property(handle, name, Value::Object(function))?;
        Ok(())
    }

    /// Install an accessor property backed by native functions.
    pub fn define_property(
        &mut self,
        obj: &Wrapper,
        name: &str,
        getter: Option<NativeFunction>,
        setter: Option<NativeFunction>,
    ) -> Result<()> {
        self.process_deferred();
        let handle = obj.value(&self.engine)?;
        self.engine.define_accessor(handle, name, getter, setter)?;
        Ok(())
    }

    /// Call the wrapped function.
    ///
    /// # Panics
    ///
    /// If `func` does not wrap a function.
    pub fn call(
        &mut self,
        func: &Wrapper,
        args: &[Value],
        this: Option<&Wrapper>,
    ) -> Result<Value> {
        self.process_deferred();

        let function = func.value(&self.engine)?;
        assert_eq!(
            self.engine.type_of(function)?,
            ObjectType::Function,
            "wrapper {:?} is not a function",
            func.id()
        );

        let this = this.map(|this| this.value(&self.engine)).transpose()?;
        Ok(self.engine.call_function(function, this, args)?)
    }
}
