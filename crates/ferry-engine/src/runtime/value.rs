//! Foreign values and objects

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ferry_sdk::SharedBuffer;

use super::context::{CallInfo, Context, ContextId, JsResult};
use super::promise::PromiseState;

/// Native function callable from foreign code.
pub type Callback = Rc<dyn Fn(&Context, &CallInfo<'_>) -> JsResult<Value>>;

/// Plain function pointer form of [`Callback`], used by class definitions.
pub type NativeCallback = fn(&Context, &CallInfo<'_>) -> JsResult<Value>;

// ============================================================================
// Value
// ============================================================================

/// Dynamically typed foreign value.
#[derive(Clone)]
pub enum Value {
    /// `undefined`, the "no value" value
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number (always a double)
    Number(f64),
    /// Immutable string
    String(Rc<str>),
    /// Reference to a heap object
    Object(ObjectRef),
}

impl Value {
    /// Create a string value
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    /// Check for `undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check for `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Check if this is a callable object
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Object(o) if o.is_function())
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as object reference
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Result of the `typeof` operator
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(o) if o.is_function() => "function",
            Value::Object(_) => "object",
        }
    }

    /// Strict equality; objects compare by identity
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(o) => write!(f, "{:?}", o),
        }
    }
}

// ============================================================================
// Objects
// ============================================================================

/// Shape-specific part of an object
pub(crate) enum ObjectKind {
    Ordinary,
    Array(RefCell<Vec<Value>>),
    Function(FunctionData),
    ArrayBuffer(SharedBuffer),
    Promise(RefCell<PromiseState>),
    Error,
}

pub(crate) struct FunctionData {
    pub(crate) name: Rc<str>,
    pub(crate) callback: Callback,
    pub(crate) data: usize,
}

#[derive(Clone)]
pub(crate) enum Property {
    Data {
        value: Value,
        writable: bool,
        enumerable: bool,
    },
    Accessor {
        getter: Option<Callback>,
        setter: Option<Callback>,
        data: usize,
        enumerable: bool,
    },
}

impl Property {
    fn enumerable(&self) -> bool {
        match self {
            Property::Data { enumerable, .. } | Property::Accessor { enumerable, .. } => *enumerable,
        }
    }
}

pub(crate) struct ObjectCell {
    pub(crate) context: ContextId,
    pub(crate) kind: ObjectKind,
    pub(crate) prototype: RefCell<Option<ObjectRef>>,
    pub(crate) properties: RefCell<Vec<(Rc<str>, Property)>>,
    pub(crate) wrapped: RefCell<Option<Rc<dyn Any>>>,
    pub(crate) finalizers: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl Drop for ObjectCell {
    fn drop(&mut self) {
        // Wrapped native data goes first, then any registered finalizers.
        drop(self.wrapped.get_mut().take());
        for finalizer in self.finalizers.get_mut().drain(..) {
            finalizer();
        }
    }
}

/// Reference-counted handle to a foreign object.
///
/// The object is finalized when the last handle is dropped.
#[derive(Clone)]
pub struct ObjectRef(pub(crate) Rc<ObjectCell>);

impl ObjectRef {
    pub(crate) fn new(context: ContextId, kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        ObjectRef(Rc::new(ObjectCell {
            context,
            kind,
            prototype: RefCell::new(prototype),
            properties: RefCell::new(Vec::new()),
            wrapped: RefCell::new(None),
            finalizers: RefCell::new(Vec::new()),
        }))
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Context that created this object
    pub fn context(&self) -> ContextId {
        self.0.context
    }

    /// Check if the object is callable
    pub fn is_function(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Function(_))
    }

    /// Check if the object is an array
    pub fn is_array(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Array(_))
    }

    /// Check if the object is a promise
    pub fn is_promise(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Promise(_))
    }

    /// Check if the object is an error
    pub fn is_error(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Error)
    }

    /// Number of live handles to this object
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Array elements, if this is an array
    pub fn array_elements(&self) -> Option<Vec<Value>> {
        match &self.0.kind {
            ObjectKind::Array(items) => Some(items.borrow().clone()),
            _ => None,
        }
    }

    /// Backing buffer, if this is an array buffer
    pub fn array_buffer(&self) -> Option<&SharedBuffer> {
        match &self.0.kind {
            ObjectKind::ArrayBuffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// Function name, if callable
    pub fn function_name(&self) -> Option<&str> {
        match &self.0.kind {
            ObjectKind::Function(f) => Some(&f.name),
            _ => None,
        }
    }

    /// Names of own enumerable properties, in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.0
            .properties
            .borrow()
            .iter()
            .filter(|(_, p)| p.enumerable())
            .map(|(k, _)| k.to_string())
            .collect()
    }

    /// Check for an own property
    pub fn has_own(&self, name: &str) -> bool {
        self.0.properties.borrow().iter().any(|(k, _)| &**k == name)
    }

    /// Prototype object
    pub fn prototype(&self) -> Option<ObjectRef> {
        self.0.prototype.borrow().clone()
    }

    pub(crate) fn own_property(&self, name: &str) -> Option<Property> {
        self.0
            .properties
            .borrow()
            .iter()
            .find(|(k, _)| &**k == name)
            .map(|(_, p)| p.clone())
    }

    pub(crate) fn put_own(&self, name: &str, property: Property) {
        let mut properties = self.0.properties.borrow_mut();
        match properties.iter_mut().find(|(k, _)| &**k == name) {
            Some(slot) => slot.1 = property,
            None => properties.push((Rc::from(name), property)),
        }
    }

    /// Find a property on this object or its prototype chain
    pub(crate) fn lookup(&self, name: &str) -> Option<(Property, bool)> {
        if let Some(p) = self.own_property(name) {
            return Some((p, true));
        }
        let mut current = self.prototype();
        while let Some(object) = current {
            if let Some(p) = object.own_property(name) {
                return Some((p, false));
            }
            current = object.prototype();
        }
        None
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            ObjectKind::Ordinary => write!(f, "[object Object]"),
            ObjectKind::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            ObjectKind::Function(data) => write!(f, "[Function: {}]", data.name),
            ObjectKind::ArrayBuffer(buffer) => write!(f, "ArrayBuffer({})", buffer.len()),
            ObjectKind::Promise(state) => write!(f, "Promise {{ {} }}", state.borrow().label()),
            ObjectKind::Error => write!(f, "[Error]"),
        }
    }
}
