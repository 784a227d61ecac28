//! Minimal dynamically-typed foreign runtime
//!
//! The bridge binds native types against this runtime: values and objects,
//! classes with accessors, native data attached to objects, promises, a
//! diagnostic channel and a per-context event loop. Objects are finalized
//! when their last reference drops.

mod context;
mod event_loop;
mod promise;
mod value;

pub use context::{
    CallInfo, Context, ContextId, HandleScope, JsResult, PropertyAttributes, PropertySpec, Throw,
};
pub use event_loop::LoopHandle;
pub use promise::{PromiseResolver, PromiseStatus};
pub use value::{Callback, NativeCallback, ObjectRef, Value};

pub(crate) use event_loop::{Registration, Wake};
