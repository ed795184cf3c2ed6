//! Delegation to the script-side keep-alive registry.
//!
//! Native parent/child edges are invisible to the script collector. The
//! runtime exposes a registry object (`jsb` by default) whose
//! `registerNativeRef(owner, dep)` makes `dep` reachable for as long as
//! `owner` is.

use super::Bridge;
use crate::engine::{Engine, ObjectHandle, ObjectType, Value};
use crate::error::{Error, Result};
use crate::object::Wrapper;

impl<E: Engine> Bridge<E> {
    /// Keep `dependency` reachable while `owner` is.
    pub fn attach_object(&mut self, owner: &Wrapper, dependency: &Wrapper) -> Result<()> {
        let function = self.config.register_native_ref.clone();
        self.call_keep_alive(&function, owner, dependency)
    }

    /// Undo [`Bridge::attach_object`].
    pub fn detach_object(&mut self, owner: &Wrapper, dependency: &Wrapper) -> Result<()> {
        let function = self.config.unregister_native_ref.clone();
        self.call_keep_alive(&function, owner, dependency)
    }

    fn call_keep_alive(&mut self, name: &str, owner: &Wrapper, dependency: &Wrapper) -> Result<()> {
        self.process_deferred();

        let owner = owner.value(&self.engine)?;
        let dependency = dependency.value(&self.engine)?;

        let registry_name = self.config.keep_alive_object.clone();
        let global = self.engine.global()?;
        let registry = self.keep_alive_member(global, &registry_name)?;
        let function = self.keep_alive_member(registry, name)?;

        if self.engine.type_of(function)? != ObjectType::Function {
            return Err(Error::KeepAliveUnavailable(format!(
                "{}.{} is not a function",
                registry_name, name
            )));
        }

        tracing::trace!("{}.{} called", registry_name, name);

        self.engine.call_function(
            function,
            Some(global),
            &[Value::Object(owner), Value::Object(dependency)],
        )?;

        Ok(())
    }

    fn keep_alive_member(&mut self, object: ObjectHandle, name: &str) -> Result<ObjectHandle> {
        match self.engine.get_named_property(object, name) {
            Ok(Value::Object(member)) => Ok(member),
            Ok(other) => {
                tracing::debug!("Keep-alive member {:?} is {}", name, other.type_name());
                Err(Error::KeepAliveUnavailable(format!("{} is {}", name, other.type_name())))
            }
            Err(err) => Err(Error::KeepAliveUnavailable(format!("{}: {}", name, err))),
        }
    }
}
