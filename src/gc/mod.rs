//! Lifetime bookkeeping shared by wrappers and the bridge.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  NativePtrRegistry                                          │
//! │  ├── native pointer -> ObjectRef (one intrinsic ref each)   │
//! │  ├── consulted by the finalizer trampoline                  │
//! │  └── drained by the teardown sweep                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  LiveWrapperTable                                           │
//! │  ├── every live wrapper (weak, not owning)                  │
//! │  └── teardown only: reset roots, release private-data refs  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  DeferredReleaseQueue                                       │
//! │  ├── engine references of destroyed wrappers                │
//! │  └── deleted on next engine access                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these types lock: they are owned by one bridge and touched from
//! the thread that owns its engine.

mod deferred_release;
mod live_table;
mod registry;

pub use deferred_release::DeferredReleaseQueue;
pub use live_table::LiveWrapperTable;
pub use registry::NativePtrRegistry;
