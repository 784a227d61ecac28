//! Converter registry
//!
//! Maps `(type id, direction)` to a conversion. Foreign-to-native
//! conversions are two-phase: a side-effect free probe, then the conversion.
//! The registry is assembled with [`RegistryBuilder`] at startup and is
//! immutable afterwards, so lookups take no locks.
//!
//! Variants and lists are structural: the registry handles them itself by
//! recursing into their elements.

use std::sync::Arc;

use ferry_sdk::{NativeValue, Payload, Reflect, SharedBuffer, TypeId};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use super::binding::Binding;
use super::future;
use super::handle::ObjectHandle;
use crate::config::{BridgeConfig, ConfigError};
use crate::runtime::{Context, JsResult, ObjectRef, Throw, Value};

/// Native-to-foreign conversion
pub type ToForeignFn = Arc<dyn Fn(&Context, &NativeValue) -> JsResult<Value> + Send + Sync>;

/// Foreign-to-native convertibility probe
pub type ProbeFn = Arc<dyn Fn(&Context, &Value) -> bool + Send + Sync>;

/// Foreign-to-native conversion
pub type FromForeignFn = Arc<dyn Fn(&Context, &Value) -> Option<NativeValue> + Send + Sync>;

/// Function that defines a class in a context
pub type DefineClassFn = fn(&Context) -> ObjectRef;

/// Conversion failures
#[derive(Debug, Error)]
pub enum ConvertError {
    /// No converter registered for the type and direction
    #[error("no {direction} converter for type {type_name}")]
    NoConverter {
        /// Type name
        type_name: String,
        /// "native-to-foreign" or "foreign-to-native"
        direction: &'static str,
    },

    /// The probe rejected the value
    #[error("value cannot be converted to {type_name}")]
    NotConvertible {
        /// Target type name
        type_name: String,
    },

    /// The conversion threw in the foreign runtime
    #[error("conversion threw")]
    Thrown(Throw),
}

struct FromForeign {
    probe: ProbeFn,
    convert: FromForeignFn,
}

/// A class known to the registry
pub struct ClassEntry {
    /// Foreign class name
    pub name: String,
    /// Type id of its instances
    pub type_id: TypeId,
    /// Defines (or fetches) the class in a context
    pub define: DefineClassFn,
}

/// Immutable `(type id, direction) → conversion` table.
pub struct ConverterRegistry {
    to_foreign: FxHashMap<TypeId, ToForeignFn>,
    from_foreign: FxHashMap<TypeId, FromForeign>,
    classes: Vec<ClassEntry>,
    dynamic_types: FxHashSet<TypeId>,
    max_buffer_len: usize,
}

impl ConverterRegistry {
    /// Start a builder with the built-in converters
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry with only the built-in converters and default settings
    pub fn with_defaults() -> Self {
        Self::builder().build()
    }

    /// Classes registered with [`RegistryBuilder::register_class`]
    pub fn classes(&self) -> &[ClassEntry] {
        &self.classes
    }

    /// Check if assigning properties of this type is refused
    pub fn is_dynamic(&self, type_id: TypeId) -> bool {
        self.dynamic_types.contains(&type_id)
    }

    /// Largest buffer length plus one that converts to an external buffer
    pub fn max_buffer_len(&self) -> usize {
        self.max_buffer_len
    }

    // ========================================================================
    // Native to Foreign
    // ========================================================================

    /// Probe whether `value` can be converted to a foreign value
    pub fn can_to_foreign(&self, value: &NativeValue) -> bool {
        match value.payload() {
            Payload::Variant(inner) => self.can_to_foreign(inner),
            Payload::List(items) => items.iter().all(|item| self.can_to_foreign(item)),
            _ => self.to_foreign.contains_key(&value.type_id()),
        }
    }

    /// Convert a native value into a foreign value
    pub fn to_foreign(&self, cx: &Context, value: &NativeValue) -> Result<Value, ConvertError> {
        match value.payload() {
            Payload::Variant(inner) => self.to_foreign(cx, inner),
            Payload::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.to_foreign(cx, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Object(cx.create_array(values)))
            }
            _ => {
                let convert = self.to_foreign.get(&value.type_id()).ok_or_else(|| {
                    ConvertError::NoConverter {
                        type_name: value.type_id().name(),
                        direction: "native-to-foreign",
                    }
                })?;
                convert(cx, value).map_err(ConvertError::Thrown)
            }
        }
    }

    // ========================================================================
    // Foreign to Native
    // ========================================================================

    /// Probe whether `value` can be converted to `target`. Side-effect free.
    pub fn can_from_foreign(&self, cx: &Context, value: &Value, target: TypeId) -> bool {
        match target {
            TypeId::VARIANT => self.infer(cx, value).is_some(),
            TypeId::LIST => value
                .as_object()
                .and_then(ObjectRef::array_elements)
                .map_or(false, |items| items.iter().all(|v| self.infer(cx, v).is_some())),
            _ => self
                .from_foreign
                .get(&target)
                .map_or(false, |entry| (entry.probe)(cx, value)),
        }
    }

    /// Convert a foreign value to a native value of type `target`
    pub fn from_foreign(
        &self,
        cx: &Context,
        value: &Value,
        target: TypeId,
    ) -> Result<NativeValue, ConvertError> {
        let not_convertible = || ConvertError::NotConvertible {
            type_name: target.name(),
        };
        match target {
            TypeId::VARIANT => self
                .infer(cx, value)
                .map(NativeValue::variant)
                .ok_or_else(not_convertible),
            TypeId::LIST => {
                let items = value
                    .as_object()
                    .and_then(ObjectRef::array_elements)
                    .ok_or_else(not_convertible)?;
                items
                    .iter()
                    .map(|item| self.infer(cx, item).map(NativeValue::variant))
                    .collect::<Option<Vec<_>>>()
                    .map(NativeValue::list)
                    .ok_or_else(not_convertible)
            }
            _ => {
                let entry = self.from_foreign.get(&target).ok_or_else(|| {
                    ConvertError::NoConverter {
                        type_name: target.name(),
                        direction: "foreign-to-native",
                    }
                })?;
                if !(entry.probe)(cx, value) {
                    return Err(not_convertible());
                }
                (entry.convert)(cx, value).ok_or_else(not_convertible)
            }
        }
    }

    /// Native value for a foreign value of unknown target type
    fn infer(&self, cx: &Context, value: &Value) -> Option<NativeValue> {
        match value {
            Value::Undefined | Value::Null => Some(NativeValue::void()),
            Value::Bool(b) => Some(NativeValue::bool(*b)),
            Value::Number(n) => Some(number_to_native(*n)),
            Value::String(s) => Some(NativeValue::string(s.to_string())),
            Value::Object(object) => {
                if let Some(buffer) = object.array_buffer() {
                    return Some(NativeValue::buffer(buffer.clone()));
                }
                if let Some(items) = object.array_elements() {
                    return items
                        .iter()
                        .map(|item| self.infer(cx, item).map(NativeValue::variant))
                        .collect::<Option<Vec<_>>>()
                        .map(NativeValue::list);
                }
                ObjectHandle::from_object(cx, object).map(|handle| handle.native_value())
            }
        }
    }
}

/// `n` as an `i32` when it is integral and in range
fn exact_int(n: f64) -> Option<i32> {
    if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 {
        Some(n as i32)
    } else {
        None
    }
}

fn number_to_native(n: f64) -> NativeValue {
    exact_int(n).map_or_else(|| NativeValue::double(n), NativeValue::int)
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ConverterRegistry`]
pub struct RegistryBuilder {
    to_foreign: FxHashMap<TypeId, ToForeignFn>,
    from_foreign: FxHashMap<TypeId, FromForeign>,
    classes: Vec<ClassEntry>,
    dynamic_types: FxHashSet<TypeId>,
    max_buffer_len: usize,
}

impl RegistryBuilder {
    fn new() -> Self {
        let mut dynamic_types = FxHashSet::default();
        dynamic_types.insert(TypeId::VARIANT);
        let builder = RegistryBuilder {
            to_foreign: FxHashMap::default(),
            from_foreign: FxHashMap::default(),
            classes: Vec::new(),
            dynamic_types,
            max_buffer_len: i32::MAX as usize,
        };
        builder.with_primitives()
    }

    fn with_primitives(self) -> Self {
        self.to_foreign(TypeId::VOID, |_, _| Ok(Value::Undefined))
            .to_foreign(TypeId::BOOL, |_, v| Ok(v.as_bool().map_or(Value::Undefined, Value::Bool)))
            .from_foreign(
                TypeId::BOOL,
                |_, v| matches!(v, Value::Bool(_)),
                |_, v| v.as_bool().map(NativeValue::bool),
            )
            .to_foreign(TypeId::INT, |_, v| {
                Ok(v.as_int().map_or(Value::Undefined, |i| Value::Number(i as f64)))
            })
            .from_foreign(
                TypeId::INT,
                |_, v| v.as_number().and_then(exact_int).is_some(),
                |_, v| v.as_number().and_then(exact_int).map(NativeValue::int),
            )
            .to_foreign(TypeId::DOUBLE, |_, v| {
                Ok(v.as_double().map_or(Value::Undefined, Value::Number))
            })
            .from_foreign(
                TypeId::DOUBLE,
                |_, v| matches!(v, Value::Number(_)),
                |_, v| v.as_number().map(NativeValue::double),
            )
            .to_foreign(TypeId::STRING, |_, v| {
                Ok(v.as_str().map_or(Value::Undefined, Value::string))
            })
            .from_foreign(
                TypeId::STRING,
                |_, v| matches!(v, Value::String(_)),
                |_, v| v.as_str().map(NativeValue::string),
            )
            .from_foreign(
                TypeId::BUFFER,
                |_, v| v.as_object().map_or(false, |o| o.array_buffer().is_some()),
                |_, v| {
                    v.as_object()
                        .and_then(|o| o.array_buffer().cloned())
                        .map(NativeValue::buffer)
                },
            )
            .to_foreign(TypeId::DEFERRED, future::deferred_to_foreign)
    }

    /// Buffers of `len` bytes or more convert to `undefined`
    pub fn max_buffer_len(mut self, len: usize) -> Self {
        self.max_buffer_len = len;
        self
    }

    /// Property types whose assignment is refused
    pub fn dynamic_types(mut self, types: impl IntoIterator<Item = TypeId>) -> Self {
        self.dynamic_types = types.into_iter().collect();
        self
    }

    /// Apply the conversion settings of `config`
    pub fn with_config(self, config: &BridgeConfig) -> Result<Self, ConfigError> {
        let dynamic = config.dynamic_type_ids()?;
        Ok(self
            .max_buffer_len(config.bridge.max_external_buffer_len)
            .dynamic_types(dynamic))
    }

    /// Register a native-to-foreign conversion, replacing any existing one
    pub fn to_foreign<F>(mut self, type_id: TypeId, convert: F) -> Self
    where
        F: Fn(&Context, &NativeValue) -> JsResult<Value> + Send + Sync + 'static,
    {
        self.to_foreign.insert(type_id, Arc::new(convert));
        self
    }

    /// Register a foreign-to-native probe and conversion, replacing any existing one
    pub fn from_foreign<P, F>(mut self, type_id: TypeId, probe: P, convert: F) -> Self
    where
        P: Fn(&Context, &Value) -> bool + Send + Sync + 'static,
        F: Fn(&Context, &Value) -> Option<NativeValue> + Send + Sync + 'static,
    {
        self.from_foreign.insert(
            type_id,
            FromForeign {
                probe: Arc::new(probe),
                convert: Arc::new(convert),
            },
        );
        self
    }

    /// Register a reflected type: converters for its instances and its class
    pub fn register_class<T: Reflect>(self) -> Self {
        let type_id = T::type_tag();
        let mut builder = self
            .to_foreign(type_id, Binding::<T>::wrap_native)
            .from_foreign(
                type_id,
                move |cx, v| bound_handle(cx, v).map_or(false, |h| h.type_id() == type_id),
                move |cx, v| {
                    bound_handle(cx, v)
                        .filter(|h| h.type_id() == type_id)
                        .map(|h| h.native_value())
                },
            );
        builder.classes.retain(|entry| entry.type_id != type_id);
        builder.classes.push(ClassEntry {
            name: T::descriptor().name().to_string(),
            type_id,
            define: Binding::<T>::class,
        });
        builder
    }

    /// Freeze into a registry
    pub fn build(mut self) -> ConverterRegistry {
        let max = self.max_buffer_len;
        let buffer: ToForeignFn = Arc::new(move |cx: &Context, v: &NativeValue| {
            Ok(buffer_to_foreign(cx, v.as_buffer(), max))
        });
        self.to_foreign.entry(TypeId::BUFFER).or_insert(buffer);
        ConverterRegistry {
            to_foreign: self.to_foreign,
            from_foreign: self.from_foreign,
            classes: self.classes,
            dynamic_types: self.dynamic_types,
            max_buffer_len: self.max_buffer_len,
        }
    }
}

fn bound_handle(cx: &Context, value: &Value) -> Option<std::rc::Rc<ObjectHandle>> {
    value
        .as_object()
        .and_then(|object| ObjectHandle::from_object(cx, object))
}

fn buffer_to_foreign(cx: &Context, buffer: Option<&SharedBuffer>, max: usize) -> Value {
    match buffer {
        Some(buffer) if !buffer.is_empty() && buffer.len() < max => {
            Value::Object(cx.create_external_buffer(buffer.clone()))
        }
        _ => Value::Undefined,
    }
}
