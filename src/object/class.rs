//! Type descriptors.

use std::fmt;
use std::rc::Rc;

use super::WrapperId;
use crate::engine::{Engine, EnvId, NativePtr, ObjectHandle};
use crate::error::EngineError;

/// Cleanup for a native pointer: `(env, native, hint)`.
///
/// The hint is the id of the wrapper being collected, or `None` when the call
/// comes from the teardown sweep.
pub type FinalizeFn = Rc<dyn Fn(EnvId, NativePtr, Option<WrapperId>)>;

/// Allocates the script value for a new instance of a class.
pub type CreateInstanceFn = Rc<dyn Fn(&mut dyn Engine) -> Result<ObjectHandle, EngineError>>;

/// Capability record describing one category of native objects.
///
/// A wrapper composes with zero or one class. The class supplies how to
/// allocate the script value and how to finalize bound native pointers when
/// the wrapper has no finalize callback of its own.
pub struct Class {
    name: String,
    create_instance: Option<CreateInstanceFn>,
    finalize: Option<FinalizeFn>,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create_instance: None,
            finalize: None,
        }
    }

    pub fn with_finalizer(
        mut self,
        finalize: impl Fn(EnvId, NativePtr, Option<WrapperId>) + 'static,
    ) -> Self {
        self.finalize = Some(Rc::new(finalize));
        self
    }

    /// Override instance allocation (defaults to a plain object).
    pub fn with_constructor(
        mut self,
        create_instance: impl Fn(&mut dyn Engine) -> Result<ObjectHandle, EngineError> + 'static,
    ) -> Self {
        self.create_instance = Some(Rc::new(create_instance));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn finalize_fn(&self) -> Option<&FinalizeFn> {
        self.finalize.as_ref()
    }

    pub fn create_instance(&self, engine: &mut dyn Engine) -> Result<ObjectHandle, EngineError> {
        match &self.create_instance {
            Some(create) => create(engine),
            None => engine.create_object(),
        }
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("has_constructor", &self.create_instance.is_some())
            .field("has_finalizer", &self.finalize.is_some())
            .finish()
    }
}

/// Rust types that can be bound to wrappers as boxed private data.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(NativeClass)]
/// #[class(name = "Sprite")]
/// struct Sprite {
///     texture: Vec<u8>,
/// }
///
/// let class = Rc::new(Sprite::class());
/// let obj = bridge.create_object_with_class(&class)?;
/// bridge.set_private_data(&obj, Sprite { texture: vec![] }.into_native())?;
/// ```
///
/// The generated class finalizer reclaims the box, so the value is dropped
/// exactly once: when the wrapper is collected or at teardown.
pub trait NativeClass: Sized + 'static {
    const CLASS_NAME: &'static str;

    fn class() -> Class {
        Class::new(Self::CLASS_NAME).with_finalizer(|_env, native, _hint| {
            // SAFETY: pointers finalized by this class were produced by
            // `into_native` (Box::into_raw of Self), and the bridge finalizes
            // each bound pointer at most once.
            drop(unsafe { Box::from_raw(native.as_ptr::<Self>()) });
        })
    }

    /// Move `self` to the heap and hand out its address.
    fn into_native(self) -> NativePtr {
        NativePtr::from_box(Box::new(self))
    }

    /// Borrow the value behind a pointer produced by [`NativeClass::into_native`].
    ///
    /// # Safety
    ///
    /// `native` must come from `into_native` on this type and must not have
    /// been finalized yet.
    unsafe fn from_native<'a>(native: NativePtr) -> &'a Self {
        unsafe { &*native.as_ptr::<Self>() }
    }
}
