//! Tagged native values
//!
//! A [`NativeValue`] is a type id plus a payload. Constructors are the only
//! way to build one, so the type id always matches the payload shape.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::SharedBuffer;
use crate::convert::FromNative;
use crate::deferred::Deferred;
use crate::error::AbiResult;
use crate::reflect::{Instance, Reflect};
use crate::types::TypeId;

/// Payload of a native value
#[derive(Clone)]
pub enum Payload {
    /// No value
    Void,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Shared byte buffer
    Buffer(SharedBuffer),
    /// List of values
    List(Vec<NativeValue>),
    /// Dynamically typed value
    Variant(Box<NativeValue>),
    /// Reflected object instance (`Arc<Mutex<T>>` behind `Any`)
    Object(Arc<dyn Any + Send + Sync>),
    /// Deferred result
    Deferred(Deferred),
}

/// Type-tagged native value.
#[derive(Clone)]
pub struct NativeValue {
    type_id: TypeId,
    payload: Payload,
}

impl NativeValue {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Create the "no value" value
    pub fn void() -> Self {
        Self::tagged(TypeId::VOID, Payload::Void)
    }

    /// Create a boolean value
    pub fn bool(value: bool) -> Self {
        Self::tagged(TypeId::BOOL, Payload::Bool(value))
    }

    /// Create an integer value
    pub fn int(value: i32) -> Self {
        Self::tagged(TypeId::INT, Payload::Int(value))
    }

    /// Create a float value
    pub fn double(value: f64) -> Self {
        Self::tagged(TypeId::DOUBLE, Payload::Double(value))
    }

    /// Create a string value
    pub fn string(value: impl Into<String>) -> Self {
        Self::tagged(TypeId::STRING, Payload::String(value.into()))
    }

    /// Create a buffer value
    pub fn buffer(value: SharedBuffer) -> Self {
        Self::tagged(TypeId::BUFFER, Payload::Buffer(value))
    }

    /// Create a list value
    pub fn list(values: Vec<NativeValue>) -> Self {
        Self::tagged(TypeId::LIST, Payload::List(values))
    }

    /// Wrap a value as a variant. Variants are never nested.
    pub fn variant(value: NativeValue) -> Self {
        if value.type_id == TypeId::VARIANT {
            return value;
        }
        Self::tagged(TypeId::VARIANT, Payload::Variant(Box::new(value)))
    }

    /// Create a deferred value
    pub fn deferred(value: Deferred) -> Self {
        Self::tagged(TypeId::DEFERRED, Payload::Deferred(value))
    }

    /// Create an object value from a shared instance
    pub fn object<T: Reflect>(instance: Instance<T>) -> Self {
        Self::tagged(T::type_tag(), Payload::Object(instance))
    }

    /// Create an object value from a type-erased `Arc<Mutex<T>>`.
    ///
    /// `type_id` must be the registered id of `T`.
    pub fn object_erased(type_id: TypeId, instance: Arc<dyn Any + Send + Sync>) -> Self {
        debug_assert!(!type_id.is_builtin(), "object values need a registered type id");
        Self::tagged(type_id, Payload::Object(instance))
    }

    fn tagged(type_id: TypeId, payload: Payload) -> Self {
        NativeValue { type_id, payload }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Get the type id
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Get the payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Check if this is the "no value" value
    pub fn is_void(&self) -> bool {
        matches!(self.payload, Payload::Void)
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self.payload {
            Payload::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i32> {
        match self.payload {
            Payload::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Get as float
    pub fn as_double(&self) -> Option<f64> {
        match self.payload {
            Payload::Double(d) => Some(d),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as buffer
    pub fn as_buffer(&self) -> Option<&SharedBuffer> {
        match &self.payload {
            Payload::Buffer(b) => Some(b),
            _ => None,
        }
    }

    /// Get as list
    pub fn as_list(&self) -> Option<&[NativeValue]> {
        match &self.payload {
            Payload::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get as deferred
    pub fn as_deferred(&self) -> Option<&Deferred> {
        match &self.payload {
            Payload::Deferred(d) => Some(d),
            _ => None,
        }
    }

    /// Get the type-erased object instance
    pub fn as_object(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        match &self.payload {
            Payload::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get the shared instance if this holds a `T`
    pub fn instance<T: Reflect>(&self) -> Option<Instance<T>> {
        let object = self.unwrap_variant().as_object()?.clone();
        object.downcast::<Mutex<T>>().ok()
    }

    /// Strip any variant wrapper
    pub fn unwrap_variant(&self) -> &NativeValue {
        match &self.payload {
            Payload::Variant(inner) => inner,
            _ => self,
        }
    }

    /// Extract a Rust value
    pub fn extract<T: FromNative>(&self) -> AbiResult<T> {
        T::from_native(self)
    }

    // ========================================================================
    // Native-to-native coercion
    // ========================================================================

    /// Check whether [`NativeValue::convert`] would succeed for `target`.
    ///
    /// Side-effect free.
    pub fn can_convert(&self, target: TypeId) -> bool {
        if self.type_id == target || target == TypeId::VARIANT {
            return true;
        }
        match (&self.payload, target) {
            (Payload::Variant(inner), _) => inner.can_convert(target),
            (Payload::Int(_), TypeId::DOUBLE) | (Payload::Int(_), TypeId::BOOL) => true,
            (Payload::Bool(_), TypeId::INT) => true,
            (Payload::Double(d), TypeId::INT) => {
                d.is_finite() && *d >= i32::MIN as f64 && *d <= i32::MAX as f64
            }
            _ => false,
        }
    }

    /// Coerce into a value of type `target`, leaving `self` untouched.
    pub fn convert(&self, target: TypeId) -> Option<NativeValue> {
        if self.type_id == target {
            return Some(self.clone());
        }
        if target == TypeId::VARIANT {
            return Some(NativeValue::variant(self.clone()));
        }
        match (&self.payload, target) {
            (Payload::Variant(inner), _) => inner.convert(target),
            (Payload::Int(i), TypeId::DOUBLE) => Some(NativeValue::double(*i as f64)),
            (Payload::Int(i), TypeId::BOOL) => Some(NativeValue::bool(*i != 0)),
            (Payload::Bool(b), TypeId::INT) => Some(NativeValue::int(*b as i32)),
            (Payload::Double(_), TypeId::INT) if self.can_convert(TypeId::INT) => {
                self.as_double().map(|d| NativeValue::int(d as i32))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Void => write!(f, "void"),
            Payload::Bool(b) => write!(f, "{}", b),
            Payload::Int(i) => write!(f, "{}", i),
            Payload::Double(d) => write!(f, "{}", d),
            Payload::String(s) => write!(f, "{:?}", s),
            Payload::Buffer(b) => write!(f, "{:?}", b),
            Payload::List(items) => f.debug_list().entries(items).finish(),
            Payload::Variant(inner) => write!(f, "variant({:?})", inner),
            Payload::Object(_) => write!(f, "<{}>", self.type_id),
            Payload::Deferred(d) => write!(f, "deferred({:?})", d.status()),
        }
    }
}

impl PartialEq for NativeValue {
    fn eq(&self, other: &Self) -> bool {
        if self.type_id != other.type_id {
            return false;
        }
        match (&self.payload, &other.payload) {
            (Payload::Void, Payload::Void) => true,
            (Payload::Bool(a), Payload::Bool(b)) => a == b,
            (Payload::Int(a), Payload::Int(b)) => a == b,
            (Payload::Double(a), Payload::Double(b)) => a == b,
            (Payload::String(a), Payload::String(b)) => a == b,
            (Payload::Buffer(a), Payload::Buffer(b)) => a.as_slice() == b.as_slice(),
            (Payload::List(a), Payload::List(b)) => a == b,
            (Payload::Variant(a), Payload::Variant(b)) => a == b,
            (Payload::Object(a), Payload::Object(b)) => Arc::ptr_eq(a, b),
            (Payload::Deferred(a), Payload::Deferred(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_tag_payload() {
        assert_eq!(NativeValue::int(5).type_id(), TypeId::INT);
        assert_eq!(NativeValue::string("x").type_id(), TypeId::STRING);
        assert_eq!(NativeValue::void().type_id(), TypeId::VOID);
        assert_eq!(NativeValue::list(vec![]).type_id(), TypeId::LIST);
        assert!(NativeValue::void().is_void());
    }

    #[test]
    fn test_variant_never_nests() {
        let v = NativeValue::variant(NativeValue::variant(NativeValue::int(3)));
        assert_eq!(v.type_id(), TypeId::VARIANT);
        assert_eq!(v.unwrap_variant().as_int(), Some(3));
    }

    #[test]
    fn test_convert_identity_and_widening() {
        let i = NativeValue::int(7);
        assert_eq!(i.convert(TypeId::INT), Some(NativeValue::int(7)));
        assert_eq!(i.convert(TypeId::DOUBLE), Some(NativeValue::double(7.0)));
        assert_eq!(i.convert(TypeId::BOOL), Some(NativeValue::bool(true)));
        assert!(i.can_convert(TypeId::VARIANT));
        assert!(!i.can_convert(TypeId::STRING));
        assert_eq!(i.convert(TypeId::STRING), None);
    }

    #[test]
    fn test_convert_double_to_int_bounds() {
        assert_eq!(NativeValue::double(2.9).convert(TypeId::INT), Some(NativeValue::int(2)));
        assert!(!NativeValue::double(f64::NAN).can_convert(TypeId::INT));
        assert!(!NativeValue::double(1e12).can_convert(TypeId::INT));
        assert_eq!(NativeValue::double(1e12).convert(TypeId::INT), None);
    }

    #[test]
    fn test_convert_does_not_mutate_source() {
        let v = NativeValue::variant(NativeValue::int(4));
        let d = v.convert(TypeId::DOUBLE).unwrap();
        assert_eq!(d.as_double(), Some(4.0));
        assert_eq!(v.type_id(), TypeId::VARIANT);
        assert_eq!(v.unwrap_variant().as_int(), Some(4));
    }
}
