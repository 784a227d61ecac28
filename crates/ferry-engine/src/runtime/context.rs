//! Runtime context: the single-threaded owner of all foreign objects
//!
//! A [`Context`] is deliberately `!Send`. Everything that touches foreign
//! values happens on the thread that created it; other threads reach it only
//! through a [`LoopHandle`](super::LoopHandle).

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ferry_sdk::SharedBuffer;

use super::event_loop::{EventLoop, LoopHandle};
use super::value::{Callback, FunctionData, NativeCallback, ObjectKind, ObjectRef, Property, Value};

/// Unique identifier for a runtime context
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Create a new unique context ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// A thrown foreign exception
pub struct Throw(pub Value);

impl Throw {
    /// The thrown value
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Debug for Throw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Throw({:?})", self.0)
    }
}

/// Result of an operation that may throw
pub type JsResult<T> = Result<T, Throw>;

// ============================================================================
// Call Info
// ============================================================================

/// Arguments of a native callback invocation
pub struct CallInfo<'a> {
    this: Value,
    args: &'a [Value],
    data: usize,
    new_target: Option<ObjectRef>,
}

impl<'a> CallInfo<'a> {
    pub(crate) fn new(this: Value, args: &'a [Value], data: usize) -> Self {
        CallInfo {
            this,
            args,
            data,
            new_target: None,
        }
    }

    /// Receiver (`this`)
    pub fn this(&self) -> &Value {
        &self.this
    }

    /// All arguments
    pub fn args(&self) -> &[Value] {
        self.args
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Check if called without arguments
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument at `index`, or `undefined`
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Undefined)
    }

    /// Opaque data registered with the function or accessor
    pub fn data(&self) -> usize {
        self.data
    }

    /// Constructor invoked with `new`, if any
    pub fn new_target(&self) -> Option<&ObjectRef> {
        self.new_target.as_ref()
    }

    /// Check if invoked as a constructor
    pub fn is_construct_call(&self) -> bool {
        self.new_target.is_some()
    }
}

// ============================================================================
// Property Specs
// ============================================================================

/// Attributes of a defined property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Data property can be reassigned
    pub writable: bool,
    /// Shows up in `keys()`
    pub enumerable: bool,
    /// Placed on the constructor instead of the prototype
    pub is_static: bool,
}

enum SpecKind {
    Method(NativeCallback),
    Accessor {
        getter: Option<NativeCallback>,
        setter: Option<NativeCallback>,
    },
    Value(Value),
}

/// Description of one property to define on an object or class
pub struct PropertySpec {
    name: String,
    kind: SpecKind,
    attributes: PropertyAttributes,
    data: usize,
}

impl PropertySpec {
    /// A method backed by `callback`
    pub fn method(name: &str, callback: NativeCallback, data: usize) -> Self {
        PropertySpec {
            name: name.to_string(),
            kind: SpecKind::Method(callback),
            attributes: PropertyAttributes {
                writable: true,
                enumerable: false,
                is_static: false,
            },
            data,
        }
    }

    /// An accessor with optional getter and setter
    pub fn accessor(
        name: &str,
        getter: Option<NativeCallback>,
        setter: Option<NativeCallback>,
        data: usize,
    ) -> Self {
        PropertySpec {
            name: name.to_string(),
            kind: SpecKind::Accessor { getter, setter },
            attributes: PropertyAttributes {
                writable: setter.is_some(),
                enumerable: true,
                is_static: false,
            },
            data,
        }
    }

    /// A plain data property
    pub fn value(name: &str, value: Value) -> Self {
        PropertySpec {
            name: name.to_string(),
            kind: SpecKind::Value(value),
            attributes: PropertyAttributes {
                writable: true,
                enumerable: true,
                is_static: false,
            },
            data: 0,
        }
    }

    /// Place on the constructor
    pub fn into_static(mut self) -> Self {
        self.attributes.is_static = true;
        self
    }

    /// Make a data property non-writable
    pub fn read_only(mut self) -> Self {
        self.attributes.writable = false;
        self
    }

    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes
    pub fn attributes(&self) -> PropertyAttributes {
        self.attributes
    }
}

// ============================================================================
// Handle Scope
// ============================================================================

/// Scope for values created during one callback or delivery.
///
/// Nested scopes are tracked so hosts can tell whether code is running
/// inside a runtime callback.
pub struct HandleScope<'a> {
    cx: &'a Context,
}

impl Drop for HandleScope<'_> {
    fn drop(&mut self) {
        self.cx.scope_depth.set(self.cx.scope_depth.get() - 1);
    }
}

// ============================================================================
// Context
// ============================================================================

/// Single-threaded foreign runtime context.
pub struct Context {
    id: ContextId,
    global: ObjectRef,
    event_loop: EventLoop,
    instance_data: RefCell<Option<Rc<dyn Any>>>,
    scope_depth: Cell<usize>,
    diagnostics: RefCell<Vec<String>>,
}

impl Context {
    /// Create a context with a fresh global object and event loop
    pub fn new() -> Self {
        let id = ContextId::new();
        let cx = Context {
            id,
            global: ObjectRef::new(id, ObjectKind::Ordinary, None),
            event_loop: EventLoop::new(id),
            instance_data: RefCell::new(None),
            scope_depth: Cell::new(0),
            diagnostics: RefCell::new(Vec::new()),
        };
        cx.install_console();
        log::debug!("created runtime context {}", id.as_u64());
        cx
    }

    fn install_console(&self) {
        let console = self.create_object();
        let error = self.create_closure("error", |cx, info| {
            let parts: Vec<String> = info.args().iter().map(|v| cx.describe(v)).collect();
            cx.report_error(&parts.join(" "));
            Ok(Value::Undefined)
        });
        console.put_own("error", data_property(Value::Object(error), true, false));
        self.global
            .put_own("console", data_property(Value::Object(console), true, false));
    }

    /// Context ID
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Global object
    pub fn global(&self) -> ObjectRef {
        self.global.clone()
    }

    /// Cloneable, sendable handle to this context's event loop
    pub fn loop_handle(&self) -> LoopHandle {
        self.event_loop.handle()
    }

    pub(crate) fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Abort if `object` belongs to another context
    pub fn check_owned(&self, object: &ObjectRef) {
        assert!(
            object.context() == self.id,
            "object from context {} used in context {}",
            object.context().as_u64(),
            self.id.as_u64()
        );
    }

    // ========================================================================
    // Object Creation
    // ========================================================================

    /// Create an empty ordinary object
    pub fn create_object(&self) -> ObjectRef {
        ObjectRef::new(self.id, ObjectKind::Ordinary, None)
    }

    /// Create an ordinary object with the given prototype
    pub fn create_object_with_prototype(&self, prototype: Option<ObjectRef>) -> ObjectRef {
        if let Some(proto) = &prototype {
            self.check_owned(proto);
        }
        ObjectRef::new(self.id, ObjectKind::Ordinary, prototype)
    }

    /// Create an array
    pub fn create_array(&self, items: Vec<Value>) -> ObjectRef {
        ObjectRef::new(self.id, ObjectKind::Array(RefCell::new(items)), None)
    }

    /// Create a function backed by `callback`
    pub fn create_function(&self, name: &str, callback: Callback, data: usize) -> ObjectRef {
        ObjectRef::new(
            self.id,
            ObjectKind::Function(FunctionData {
                name: Rc::from(name),
                callback,
                data,
            }),
            None,
        )
    }

    /// Create a function from a closure
    pub fn create_closure<F>(&self, name: &str, f: F) -> ObjectRef
    where
        F: Fn(&Context, &CallInfo<'_>) -> JsResult<Value> + 'static,
    {
        self.create_function(name, Rc::new(f), 0)
    }

    /// Create an array buffer over `buffer` without copying.
    ///
    /// The buffer handle is released when the array buffer is finalized.
    pub fn create_external_buffer(&self, buffer: SharedBuffer) -> ObjectRef {
        ObjectRef::new(self.id, ObjectKind::ArrayBuffer(buffer), None)
    }

    /// Create an error object
    pub fn create_error(&self, name: &str, message: &str) -> ObjectRef {
        let error = ObjectRef::new(self.id, ObjectKind::Error, None);
        error.put_own("name", data_property(Value::string(name), true, false));
        error.put_own("message", data_property(Value::string(message), true, false));
        error
    }

    /// Build an `Error` throw
    pub fn error(&self, message: impl AsRef<str>) -> Throw {
        Throw(Value::Object(self.create_error("Error", message.as_ref())))
    }

    /// Build a `TypeError` throw
    pub fn type_error(&self, message: impl AsRef<str>) -> Throw {
        Throw(Value::Object(self.create_error("TypeError", message.as_ref())))
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Read a property, walking the prototype chain and running getters
    pub fn get(&self, object: &ObjectRef, name: &str) -> JsResult<Value> {
        self.check_owned(object);
        if let Some(items) = object.array_elements() {
            if name == "length" {
                return Ok(Value::Number(items.len() as f64));
            }
            if let Ok(index) = name.parse::<usize>() {
                return Ok(items.get(index).cloned().unwrap_or(Value::Undefined));
            }
        }
        match object.lookup(name) {
            None => Ok(Value::Undefined),
            Some((Property::Data { value, .. }, _)) => Ok(value),
            Some((Property::Accessor { getter: None, .. }, _)) => Ok(Value::Undefined),
            Some((Property::Accessor { getter: Some(getter), data, .. }, _)) => {
                let info = CallInfo {
                    this: Value::Object(object.clone()),
                    args: &[],
                    data,
                    new_target: None,
                };
                getter(self, &info)
            }
        }
    }

    /// Read a property of any value
    pub fn get_value(&self, value: &Value, name: &str) -> JsResult<Value> {
        match value {
            Value::Object(object) => self.get(object, name),
            Value::String(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                self.describe(value),
                name
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    /// Assign a property, running setters
    pub fn set(&self, object: &ObjectRef, name: &str, value: Value) -> JsResult<()> {
        self.check_owned(object);
        match object.lookup(name) {
            Some((Property::Accessor { setter: Some(setter), data, .. }, _)) => {
                let args = [value];
                let info = CallInfo {
                    this: Value::Object(object.clone()),
                    args: &args,
                    data,
                    new_target: None,
                };
                setter(self, &info).map(drop)
            }
            Some((Property::Accessor { setter: None, .. }, _)) => Err(self.type_error(format!(
                "Cannot set property {} which has only a getter",
                name
            ))),
            Some((Property::Data { writable: false, .. }, _)) => Err(self.type_error(format!(
                "Cannot assign to read only property '{}'",
                name
            ))),
            Some((Property::Data { enumerable, .. }, true)) => {
                object.put_own(name, data_property(value, true, enumerable));
                Ok(())
            }
            _ => {
                object.put_own(name, data_property(value, true, true));
                Ok(())
            }
        }
    }

    /// Define several properties at once
    pub fn define_properties(&self, object: &ObjectRef, specs: &[PropertySpec]) {
        self.check_owned(object);
        for spec in specs {
            let property = match &spec.kind {
                SpecKind::Method(callback) => {
                    let function = self.create_function(&spec.name, Rc::new(*callback), spec.data);
                    data_property(
                        Value::Object(function),
                        spec.attributes.writable,
                        spec.attributes.enumerable,
                    )
                }
                SpecKind::Accessor { getter, setter } => Property::Accessor {
                    getter: getter.map(|g| Rc::new(g) as Callback),
                    setter: setter.map(|s| Rc::new(s) as Callback),
                    data: spec.data,
                    enumerable: spec.attributes.enumerable,
                },
                SpecKind::Value(value) => data_property(
                    value.clone(),
                    spec.attributes.writable,
                    spec.attributes.enumerable,
                ),
            };
            object.put_own(&spec.name, property);
        }
    }

    /// Define a constructible class.
    ///
    /// Static specs land on the constructor, all others on its prototype.
    pub fn define_class(
        &self,
        name: &str,
        constructor: NativeCallback,
        data: usize,
        specs: &[PropertySpec],
    ) -> ObjectRef {
        let class = self.create_function(name, Rc::new(constructor), data);
        let prototype = self.create_object();
        prototype.put_own("constructor", data_property(Value::Object(class.clone()), true, false));
        class.put_own("prototype", data_property(Value::Object(prototype.clone()), false, false));

        for spec in specs {
            let target = if spec.attributes.is_static { &class } else { &prototype };
            self.define_properties(target, std::slice::from_ref(spec));
        }
        class
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call `function` with the given receiver and arguments
    pub fn call(&self, function: &Value, this: Value, args: &[Value]) -> JsResult<Value> {
        let (object, callback, data) = self.callable(function)?;
        self.check_owned(&object);
        let info = CallInfo {
            this,
            args,
            data,
            new_target: None,
        };
        callback(self, &info)
    }

    /// Call the method `name` of `object`
    pub fn call_method(&self, object: &ObjectRef, name: &str, args: &[Value]) -> JsResult<Value> {
        let function = self.get(object, name)?;
        if !function.is_function() {
            return Err(self.type_error(format!("{} is not a function", name)));
        }
        self.call(&function, Value::Object(object.clone()), args)
    }

    /// Invoke `class` as a constructor
    pub fn construct(&self, class: &Value, args: &[Value]) -> JsResult<Value> {
        let (class, callback, data) = self.callable(class)?;
        self.check_owned(&class);
        let this = self.create_instance(&class)?;
        let info = CallInfo {
            this: Value::Object(this.clone()),
            args,
            data,
            new_target: Some(class),
        };
        match callback(self, &info)? {
            result @ Value::Object(_) => Ok(result),
            _ => Ok(Value::Object(this)),
        }
    }

    /// Create an object with `class.prototype` without running the constructor
    pub fn create_instance(&self, class: &ObjectRef) -> JsResult<ObjectRef> {
        let prototype = self.get(class, "prototype")?.as_object().cloned();
        Ok(self.create_object_with_prototype(prototype))
    }

    fn callable(&self, function: &Value) -> JsResult<(ObjectRef, Callback, usize)> {
        if let Value::Object(object) = function {
            if let ObjectKind::Function(f) = &object.0.kind {
                return Ok((object.clone(), f.callback.clone(), f.data));
            }
        }
        Err(self.type_error(format!("{} is not a function", self.describe(function))))
    }

    // ========================================================================
    // Native Data
    // ========================================================================

    /// Attach native data to `object`. Aborts if something is already attached.
    pub fn wrap(&self, object: &ObjectRef, native: Rc<dyn Any>) {
        self.check_owned(object);
        let mut slot = object.0.wrapped.borrow_mut();
        assert!(slot.is_none(), "object is already wrapped");
        *slot = Some(native);
    }

    /// Get the native data attached to `object` if it is a `T`
    pub fn unwrap<T: Any>(&self, object: &ObjectRef) -> Option<Rc<T>> {
        self.check_owned(object);
        let native = object.0.wrapped.borrow().clone()?;
        native.downcast::<T>().ok()
    }

    /// Check if `object` carries native data
    pub fn is_wrapped(&self, object: &ObjectRef) -> bool {
        object.0.wrapped.borrow().is_some()
    }

    /// Run `finalizer` when `object` is collected
    pub fn add_finalizer<F: FnOnce() + 'static>(&self, object: &ObjectRef, finalizer: F) {
        self.check_owned(object);
        object.0.finalizers.borrow_mut().push(Box::new(finalizer));
    }

    /// Attach per-context data, replacing any previous value
    pub fn set_instance_data(&self, data: Rc<dyn Any>) {
        *self.instance_data.borrow_mut() = Some(data);
    }

    /// Per-context data if it is a `T`
    pub fn instance_data<T: Any>(&self) -> Option<Rc<T>> {
        let data = self.instance_data.borrow().clone()?;
        data.downcast::<T>().ok()
    }

    // ========================================================================
    // Scopes and Diagnostics
    // ========================================================================

    /// Open a handle scope, closed when the guard drops
    pub fn open_scope(&self) -> HandleScope<'_> {
        self.scope_depth.set(self.scope_depth.get() + 1);
        HandleScope { cx: self }
    }

    /// Current handle scope nesting
    pub fn scope_depth(&self) -> usize {
        self.scope_depth.get()
    }

    /// Route an uncaught exception to the diagnostic channel
    pub fn report_exception(&self, throw: Throw) {
        let message = self.describe(&throw.0);
        log::error!("uncaught exception: {}", message);
        self.diagnostics.borrow_mut().push(message);
    }

    /// Write a line to the diagnostic channel
    pub fn report_error(&self, message: &str) {
        log::error!("{}", message);
        self.diagnostics.borrow_mut().push(message.to_string());
    }

    /// Drain everything written to the diagnostic channel
    pub fn take_diagnostics(&self) -> Vec<String> {
        std::mem::take(&mut *self.diagnostics.borrow_mut())
    }

    /// Display string for a value, without running any foreign code
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Object(object) if object.is_error() => {
                let field = |key: &str| match object.own_property(key) {
                    Some(Property::Data { value, .. }) => self.describe(&value),
                    _ => String::new(),
                };
                format!("{}: {}", field("name"), field("message"))
            }
            Value::Object(object) => match object.array_elements() {
                Some(items) => {
                    let parts: Vec<String> = items.iter().map(|v| self.describe(v)).collect();
                    parts.join(",")
                }
                None => format!("{:?}", object),
            },
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Breaks cycles through per-context tables before the loop goes away.
        self.instance_data.get_mut().take();
        log::debug!("dropped runtime context {}", self.id.as_u64());
    }
}

fn data_property(value: Value, writable: bool, enumerable: bool) -> Property {
    Property::Data {
        value,
        writable,
        enumerable,
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else {
        n.to_string()
    }
}
