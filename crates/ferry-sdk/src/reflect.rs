//! The capability a native type implements to be bridged

use std::sync::Arc;

use parking_lot::Mutex;

use crate::descriptor::TypeDescriptor;
use crate::error::{AbiResult, NativeError};
use crate::event::EventSource;
use crate::types::TypeId;
use crate::value::NativeValue;

/// Shared, lockable native instance.
pub type Instance<T> = Arc<Mutex<T>>;

/// Wrap a value as a shared instance
pub fn instance<T: Reflect>(value: T) -> Instance<T> {
    Arc::new(Mutex::new(value))
}

/// Reflected native type.
///
/// Every call is addressed by the index of the member in
/// [`Reflect::descriptor`]. Arguments arrive already converted to the
/// declared parameter types, and the argument count has been checked.
pub trait Reflect: Default + Send + 'static {
    /// The reflection table for this type
    fn descriptor() -> &'static TypeDescriptor;

    /// Type id under which instances cross the bridge
    fn type_tag() -> TypeId {
        TypeId::register::<Self>(Self::descriptor().name())
    }

    /// Invoke the instance method at `index`
    fn invoke(&mut self, index: usize, args: &[NativeValue]) -> AbiResult<NativeValue>;

    /// Invoke the static method at `index`
    fn invoke_static(index: usize, _args: &[NativeValue]) -> AbiResult<NativeValue> {
        Err(NativeError::UnknownMember(index))
    }

    /// Read the property at `index`
    fn read_property(&self, _index: usize) -> Option<NativeValue> {
        None
    }

    /// Write the property at `index`; returns `false` if the write failed
    fn write_property(&mut self, _index: usize, _value: NativeValue) -> bool {
        false
    }

    /// Event source backing the declared event channels
    fn event_source(&self) -> Option<Arc<EventSource>> {
        None
    }
}
