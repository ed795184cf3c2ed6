//! Error types.
//!
//! Engine-boundary failures are recoverable and surface as `Err`. Contract
//! violations (double binding, duplicate pointer registration, calling a
//! non-function) are programming errors and panic instead.

use crate::engine::TypedArrayKind;

/// Failure reported by the scripting engine collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("engine allocation failed")]
    AllocationFailed,

    #[error("handle does not refer to a live engine value")]
    InvalidHandle,

    #[error("script value was collected")]
    Collected,

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("range error: {0}")]
    RangeError(String),

    #[error("value is not a function")]
    NotAFunction,

    #[error("script exception: {0}")]
    Exception(String),
}

/// Error returned by bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("typed array kind {0:?} cannot be constructed")]
    UnsupportedTypedArrayKind(TypedArrayKind),

    #[error("keep-alive registry unavailable: {0}")]
    KeepAliveUnavailable(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON document is not an object or array")]
    NotAContainer,
}

pub type Result<T> = std::result::Result<T, Error>;
