//! Conversions between Rust values and [`NativeValue`]
//!
//! Reflected types use these inside `invoke` to pull typed arguments out of
//! the already-converted argument slice and to build return values.

use crate::buffer::SharedBuffer;
use crate::deferred::Deferred;
use crate::error::NativeError;
use crate::reflect::{Instance, Reflect};
use crate::types::TypeId;
use crate::value::NativeValue;

/// Convert from NativeValue to a Rust type.
pub trait FromNative: Sized {
    /// Convert, returning an error if the type doesn't match.
    ///
    /// Coercions allowed by [`NativeValue::convert`] are applied first.
    fn from_native(value: &NativeValue) -> Result<Self, NativeError>;
}

/// Convert from a Rust type to NativeValue.
pub trait ToNative {
    /// Convert to NativeValue.
    fn to_native(self) -> NativeValue;
}

fn mismatch(expected: TypeId, value: &NativeValue) -> NativeError {
    NativeError::TypeMismatch {
        expected: expected.name(),
        got: value.type_id().name(),
    }
}

fn coerce(value: &NativeValue, target: TypeId) -> Result<NativeValue, NativeError> {
    value.convert(target).ok_or_else(|| mismatch(target, value))
}

// ============================================================================
// Primitive Type Implementations
// ============================================================================

impl FromNative for i32 {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        coerce(value, TypeId::INT)?
            .as_int()
            .ok_or_else(|| mismatch(TypeId::INT, value))
    }
}

impl ToNative for i32 {
    fn to_native(self) -> NativeValue {
        NativeValue::int(self)
    }
}

impl FromNative for f64 {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        coerce(value, TypeId::DOUBLE)?
            .as_double()
            .ok_or_else(|| mismatch(TypeId::DOUBLE, value))
    }
}

impl ToNative for f64 {
    fn to_native(self) -> NativeValue {
        NativeValue::double(self)
    }
}

impl FromNative for bool {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        coerce(value, TypeId::BOOL)?
            .as_bool()
            .ok_or_else(|| mismatch(TypeId::BOOL, value))
    }
}

impl ToNative for bool {
    fn to_native(self) -> NativeValue {
        NativeValue::bool(self)
    }
}

impl FromNative for String {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        value
            .unwrap_variant()
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch(TypeId::STRING, value))
    }
}

impl ToNative for String {
    fn to_native(self) -> NativeValue {
        NativeValue::string(self)
    }
}

impl ToNative for &str {
    fn to_native(self) -> NativeValue {
        NativeValue::string(self)
    }
}

impl FromNative for SharedBuffer {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        value
            .unwrap_variant()
            .as_buffer()
            .cloned()
            .ok_or_else(|| mismatch(TypeId::BUFFER, value))
    }
}

impl ToNative for SharedBuffer {
    fn to_native(self) -> NativeValue {
        NativeValue::buffer(self)
    }
}

impl FromNative for Vec<NativeValue> {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        value
            .unwrap_variant()
            .as_list()
            .map(<[NativeValue]>::to_vec)
            .ok_or_else(|| mismatch(TypeId::LIST, value))
    }
}

impl ToNative for Vec<NativeValue> {
    fn to_native(self) -> NativeValue {
        NativeValue::list(self)
    }
}

impl ToNative for Deferred {
    fn to_native(self) -> NativeValue {
        NativeValue::deferred(self)
    }
}

// Unit type (for methods that return nothing)
impl ToNative for () {
    fn to_native(self) -> NativeValue {
        NativeValue::void()
    }
}

impl ToNative for NativeValue {
    fn to_native(self) -> NativeValue {
        self
    }
}

// ============================================================================
// Reflected Instances
// ============================================================================

impl<T: Reflect> FromNative for Instance<T> {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        value
            .instance::<T>()
            .ok_or_else(|| mismatch(T::type_tag(), value))
    }
}

impl<T: Reflect> ToNative for Instance<T> {
    fn to_native(self) -> NativeValue {
        NativeValue::object(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_primitives() {
        assert_eq!(NativeValue::int(3).extract::<i32>().unwrap(), 3);
        assert_eq!(NativeValue::int(3).extract::<f64>().unwrap(), 3.0);
        assert!(NativeValue::bool(true).extract::<bool>().unwrap());
        assert_eq!(
            NativeValue::string("hi").extract::<String>().unwrap(),
            "hi".to_string()
        );
    }

    #[test]
    fn test_extract_through_variant() {
        let v = NativeValue::variant(NativeValue::string("inner"));
        assert_eq!(v.extract::<String>().unwrap(), "inner");
        let n = NativeValue::variant(NativeValue::int(5));
        assert_eq!(n.extract::<i32>().unwrap(), 5);
    }

    #[test]
    fn test_extract_mismatch_names_types() {
        let err = NativeValue::string("x").extract::<i32>().unwrap_err();
        match err {
            NativeError::TypeMismatch { expected, got } => {
                assert_eq!(expected, "int");
                assert_eq!(got, "string");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_to_native() {
        assert_eq!(7.to_native(), NativeValue::int(7));
        assert!(().to_native().is_void());
        assert_eq!("a".to_native().as_str(), Some("a"));
        let list = vec![1.to_native(), 2.to_native()].to_native();
        assert_eq!(list.as_list().map(|l| l.len()), Some(2));
    }
}
