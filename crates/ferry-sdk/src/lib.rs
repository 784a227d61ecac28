//! Ferry SDK - Lightweight SDK for writing reflected native types
//!
//! This crate provides the types and traits a native library needs to expose
//! its objects to the Ferry bridge without depending on ferry-engine:
//! reflection descriptors, tagged native values, event sources, deferred
//! results and the task queue used for background work.
//!
//! # Example
//!
//! ```ignore
//! use ferry_sdk::{AbiResult, NativeError, NativeValue, Reflect, TypeDescriptor, TypeId};
//! use once_cell::sync::Lazy;
//!
//! #[derive(Default)]
//! struct Adder;
//!
//! static DESCRIPTOR: Lazy<TypeDescriptor> = Lazy::new(|| {
//!     TypeDescriptor::builder("Adder")
//!         .method("add", &[TypeId::INT, TypeId::INT], TypeId::INT)
//!         .build()
//! });
//!
//! impl Reflect for Adder {
//!     fn descriptor() -> &'static TypeDescriptor { &DESCRIPTOR }
//!
//!     fn invoke(&mut self, index: usize, args: &[NativeValue]) -> AbiResult<NativeValue> {
//!         match index {
//!             0 => Ok(NativeValue::int(args[0].extract::<i32>()? + args[1].extract::<i32>()?)),
//!             _ => Err(NativeError::UnknownMember(index)),
//!         }
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod buffer;
pub mod convert;
pub mod deferred;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod reflect;
pub mod task;
pub mod types;
pub mod value;

pub use buffer::SharedBuffer;
pub use convert::{FromNative, ToNative};
pub use deferred::{Continuation, Deferred, DeferredStatus};
pub use descriptor::{
    Constant, MemberKind, MethodDescriptor, PropertyDescriptor, TypeDescriptor,
    TypeDescriptorBuilder,
};
pub use error::{AbiResult, NativeError};
pub use event::{ConnectionId, EventSink, EventSource};
pub use reflect::{instance, Instance, Reflect};
pub use task::{Job, TaskQueue};
pub use types::TypeId;
pub use value::{NativeValue, Payload};
