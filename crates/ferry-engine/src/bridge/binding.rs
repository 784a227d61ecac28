//! Class generation from reflection descriptors
//!
//! [`Binding<T>`] turns `T::descriptor()` into a foreign class:
//! - instance methods on the prototype, static methods and constants on the
//!   constructor
//! - one accessor per property on every instance
//! - an `on` method when the type declares event channels
//!
//! Every generated function is a monomorphized trampoline that receives the
//! member index as its callback data, so calls dispatch by index without any
//! name lookup.

use std::marker::PhantomData;
use std::rc::Rc;

use ferry_sdk::{
    AbiResult, Instance, MemberKind, MethodDescriptor, NativeValue, Reflect, TypeId,
};

use super::convert::{ConvertError, ConverterRegistry};
use super::events::EventChannelBridge;
use super::handle::ObjectHandle;
use crate::error::BridgeError;
use crate::runtime::{CallInfo, Context, JsResult, NativeCallback, ObjectRef, PropertySpec, Value};

/// Foreign class binding for the reflected type `T`.
pub struct Binding<T>(PhantomData<fn() -> T>);

impl<T: Reflect> Binding<T> {
    /// The class for `T` in `cx`, generated on first use
    pub fn class(cx: &Context) -> ObjectRef {
        let state = super::state(cx);
        let type_id = T::type_tag();
        if let Some(class) = state.class(type_id) {
            return class;
        }
        let class = Self::generate(cx, state.registry());
        state.insert_class(type_id, class.clone());
        class
    }

    /// Native-to-foreign converter for `T` instances.
    ///
    /// The foreign object shares the instance with native code.
    pub fn wrap_native(cx: &Context, value: &NativeValue) -> JsResult<Value> {
        match value.instance::<T>() {
            Some(instance) => Self::wrap_instance(cx, instance).map(Value::Object),
            None => Err(cx.type_error(format!(
                "expected a {} instance, got {}",
                T::descriptor().name(),
                value.type_id()
            ))),
        }
    }

    /// Create a foreign object sharing `instance`, without running the constructor
    pub fn wrap_instance(cx: &Context, instance: Instance<T>) -> JsResult<ObjectRef> {
        let class = Self::class(cx);
        let object = cx.create_instance(&class)?;
        Self::attach(cx, &object, ObjectHandle::shared(instance));
        Ok(object)
    }

    fn generate(cx: &Context, registry: &ConverterRegistry) -> ObjectRef {
        let descriptor = T::descriptor();
        let mut specs = Vec::new();

        for (index, method) in descriptor.methods().iter().enumerate() {
            match method.kind {
                MemberKind::Event => continue,
                MemberKind::Method if method.is_static => specs.push(
                    PropertySpec::method(&method.name, Self::invoke_static, index).into_static(),
                ),
                MemberKind::Method => {
                    specs.push(PropertySpec::method(&method.name, Self::invoke, index))
                }
            }
        }
        if descriptor.has_events() {
            specs.push(PropertySpec::method("on", Self::on, 0));
        }
        for (name, constant) in descriptor.constants() {
            let value = match registry.to_foreign(cx, &constant.to_native()) {
                Ok(value) => value,
                Err(err) => fatal!("constant {}.{}: {}", descriptor.name(), name, err),
            };
            specs.push(PropertySpec::value(name, value).read_only().into_static());
        }

        log::debug!(
            "generated class {} ({} member(s))",
            descriptor.name(),
            specs.len()
        );
        cx.define_class(descriptor.name(), Self::construct, 0, &specs)
    }

    fn attach(cx: &Context, object: &ObjectRef, handle: ObjectHandle) -> Rc<ObjectHandle> {
        let descriptor = T::descriptor();
        let mut handle = handle;
        if descriptor.has_events() {
            let source = handle.instance::<T>().and_then(|instance| {
                let source = instance.lock().event_source();
                source
            });
            match source {
                Some(source) => {
                    handle = handle.with_events(EventChannelBridge::connect(cx, descriptor, source))
                }
                None => log::warn!("{} declares events but has no event source", descriptor.name()),
            }
        }
        let handle = handle.bind(cx, object);
        cx.define_properties(object, &Self::property_specs());
        handle
    }

    fn property_specs() -> Vec<PropertySpec> {
        T::descriptor()
            .properties()
            .iter()
            .enumerate()
            .map(|(index, property)| {
                PropertySpec::accessor(
                    &property.name,
                    property.readable.then_some(Self::get as NativeCallback),
                    property.writable.then_some(Self::set as NativeCallback),
                    index,
                )
            })
            .collect()
    }

    // ========================================================================
    // Trampolines
    // ========================================================================

    fn construct(cx: &Context, info: &CallInfo<'_>) -> JsResult<Value> {
        let name = T::descriptor().name();
        if !info.is_construct_call() {
            return Err(BridgeError::NotConstructed(name.to_string()).throw(cx));
        }
        let Some(this) = info.this().as_object() else {
            fatal!("{} constructed without a receiver", name);
        };
        Self::attach(cx, this, ObjectHandle::exclusive(T::default()));
        Ok(Value::Undefined)
    }

    fn invoke(cx: &Context, info: &CallInfo<'_>) -> JsResult<Value> {
        let index = info.data();
        let method = Self::method(index);
        let instance = Self::receiver(cx, info);
        let args = Self::arguments(cx, method, info).map_err(|err| err.throw(cx))?;
        let result = instance.lock().invoke(index, &args);
        Self::finish(cx, method, result)
    }

    fn invoke_static(cx: &Context, info: &CallInfo<'_>) -> JsResult<Value> {
        let index = info.data();
        let method = Self::method(index);
        let args = Self::arguments(cx, method, info).map_err(|err| err.throw(cx))?;
        Self::finish(cx, method, T::invoke_static(index, &args))
    }

    fn get(cx: &Context, info: &CallInfo<'_>) -> JsResult<Value> {
        let index = info.data();
        let Some(property) = T::descriptor().property(index) else {
            fatal!("{} has no property {}", T::descriptor().name(), index);
        };
        let instance = Self::receiver(cx, info);
        let value = instance.lock().read_property(index);
        let Some(value) = value else {
            return Err(BridgeError::PropertyRead {
                property: property.name.clone(),
            }
            .throw(cx));
        };
        result_to_foreign(cx, &property.name, property.type_id, value)
    }

    fn set(cx: &Context, info: &CallInfo<'_>) -> JsResult<Value> {
        let index = info.data();
        let Some(property) = T::descriptor().property(index) else {
            fatal!("{} has no property {}", T::descriptor().name(), index);
        };
        let instance = Self::receiver(cx, info);
        let registry = super::registry(cx);
        let name = || property.name.clone();

        if info.len() != 1 {
            return Err(BridgeError::PropertySetArity {
                property: name(),
                got: info.len(),
            }
            .throw(cx));
        }
        if registry.is_dynamic(property.type_id) {
            return Err(BridgeError::DynamicProperty {
                property: name(),
                type_name: property.type_id.name(),
            }
            .throw(cx));
        }
        let conversion_failed = || BridgeError::PropertyConversion {
            property: name(),
            expected: property.type_id.name(),
        };
        let value = info.arg(0);
        if !registry.can_from_foreign(cx, &value, property.type_id) {
            return Err(conversion_failed().throw(cx));
        }
        let native = registry
            .from_foreign(cx, &value, property.type_id)
            .map_err(|_| conversion_failed().throw(cx))?;

        let written = instance.lock().write_property(index, native);
        if !written {
            return Err(BridgeError::WriteFailed { property: name() }.throw(cx));
        }
        Ok(Value::Undefined)
    }

    fn on(cx: &Context, info: &CallInfo<'_>) -> JsResult<Value> {
        let handle = Self::handle(cx, info);
        match info.args() {
            [] => {
                let channels = T::descriptor()
                    .events()
                    .map(|(_, event)| Value::string(&event.signature()))
                    .collect();
                Ok(Value::Object(cx.create_array(channels)))
            }
            [Value::String(signature), callback]
                if callback.is_function() || callback.is_nullish() =>
            {
                let callback = callback.is_function().then(|| callback.clone());
                let subscribed = match handle.events() {
                    Some(events) => events.subscribe(cx, signature, callback),
                    None => Err(BridgeError::UnknownChannel(signature.to_string())),
                };
                subscribed.map_err(|err| err.throw(cx))?;
                Ok(Value::Undefined)
            }
            _ => Err(BridgeError::SubscribeUsage.throw(cx)),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn method(index: usize) -> &'static MethodDescriptor {
        match T::descriptor().method(index) {
            Some(method) => method,
            None => fatal!("{} has no method {}", T::descriptor().name(), index),
        }
    }

    fn handle(cx: &Context, info: &CallInfo<'_>) -> Rc<ObjectHandle> {
        let handle = info
            .this()
            .as_object()
            .and_then(|object| ObjectHandle::from_object(cx, object));
        match handle {
            Some(handle) if handle.type_id() == T::type_tag() => handle,
            _ => fatal!(
                "{} member called on an incompatible receiver",
                T::descriptor().name()
            ),
        }
    }

    fn receiver(cx: &Context, info: &CallInfo<'_>) -> Instance<T> {
        match Self::handle(cx, info).instance::<T>() {
            Some(instance) => instance,
            None => fatal!("{} handle holds a foreign instance", T::descriptor().name()),
        }
    }

    /// Check arity, probe every argument, then convert them all
    fn arguments(
        cx: &Context,
        method: &MethodDescriptor,
        info: &CallInfo<'_>,
    ) -> Result<Vec<NativeValue>, BridgeError> {
        if info.len() != method.arity() {
            return Err(BridgeError::ArityMismatch {
                method: method.name.clone(),
                expected: method.arity(),
                got: info.len(),
            });
        }
        let registry = super::registry(cx);
        let conversion_failed = |index: usize| BridgeError::ArgumentConversion {
            method: method.name.clone(),
            index,
            expected: method.parameter_types[index].name(),
        };
        let params = info.args().iter().zip(&method.parameter_types);
        for (index, (value, target)) in params.clone().enumerate() {
            if !registry.can_from_foreign(cx, value, *target) {
                return Err(conversion_failed(index));
            }
        }
        params
            .enumerate()
            .map(|(index, (value, target))| {
                registry
                    .from_foreign(cx, value, *target)
                    .map_err(|_| conversion_failed(index))
            })
            .collect()
    }

    fn finish(
        cx: &Context,
        method: &MethodDescriptor,
        result: AbiResult<NativeValue>,
    ) -> JsResult<Value> {
        match result {
            Ok(value) => result_to_foreign(cx, &method.name, method.return_type, value),
            Err(source) => Err(BridgeError::Invocation {
                method: method.name.clone(),
                source,
            }
            .throw(cx)),
        }
    }
}

fn result_to_foreign(
    cx: &Context,
    member: &str,
    declared: TypeId,
    value: NativeValue,
) -> JsResult<Value> {
    if declared == TypeId::VOID {
        return Ok(Value::Undefined);
    }
    let failed = || BridgeError::ResultConversion {
        member: member.to_string(),
        type_name: value.type_id().name(),
    };
    let Some(converted) = value.convert(declared) else {
        return Err(failed().throw(cx));
    };
    match super::registry(cx).to_foreign(cx, &converted) {
        Ok(foreign) => Ok(foreign),
        Err(ConvertError::Thrown(throw)) => Err(throw),
        Err(err) => {
            log::debug!("{}: {}", member, err);
            Err(failed().throw(cx))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{self, ConverterRegistry, HandleState};
    use ferry_sdk::{instance, Constant, EventSource, NativeError, TypeDescriptor};
    use once_cell::sync::Lazy;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Counter {
        value: i32,
        label: String,
        anything: Option<NativeValue>,
        events: Arc<EventSource>,
    }

    static COUNTER: Lazy<TypeDescriptor> = Lazy::new(|| {
        TypeDescriptor::builder("Counter")
            .method("add", &[TypeId::INT, TypeId::INT], TypeId::INT)
            .method("increment", &[], TypeId::VOID)
            .method("fail", &[], TypeId::INT)
            .method("describe", &[], TypeId::INT)
            .static_method("twice", &[TypeId::INT], TypeId::INT)
            .event("changed", &[TypeId::INT])
            .property("value", TypeId::INT)
            .readonly_property("label", TypeId::STRING)
            .property("anything", TypeId::VARIANT)
            .constant("MAX", Constant::Int(10))
            .build()
    });

    impl Reflect for Counter {
        fn descriptor() -> &'static TypeDescriptor {
            &COUNTER
        }

        fn invoke(&mut self, index: usize, args: &[NativeValue]) -> AbiResult<NativeValue> {
            match index {
                0 => Ok(NativeValue::int(args[0].extract::<i32>()? + args[1].extract::<i32>()?)),
                1 => {
                    self.value += 1;
                    self.events.emit(5, &[NativeValue::int(self.value)]);
                    Ok(NativeValue::void())
                }
                2 => Err(NativeError::InvocationFailed("counter jammed".into())),
                3 => Ok(NativeValue::string("not an int")),
                _ => Err(NativeError::UnknownMember(index)),
            }
        }

        fn invoke_static(index: usize, args: &[NativeValue]) -> AbiResult<NativeValue> {
            match index {
                4 => Ok(NativeValue::int(args[0].extract::<i32>()? * 2)),
                _ => Err(NativeError::UnknownMember(index)),
            }
        }

        fn read_property(&self, index: usize) -> Option<NativeValue> {
            match index {
                0 => Some(NativeValue::int(self.value)),
                1 => Some(NativeValue::string(self.label.clone())),
                2 => self.anything.clone(),
                _ => None,
            }
        }

        fn write_property(&mut self, index: usize, value: NativeValue) -> bool {
            match (index, value.as_int()) {
                (0, Some(v)) if v >= 0 => {
                    self.value = v;
                    true
                }
                _ => false,
            }
        }

        fn event_source(&self) -> Option<Arc<EventSource>> {
            Some(self.events.clone())
        }
    }

    fn context() -> Context {
        let cx = Context::new();
        let registry = ConverterRegistry::builder().register_class::<Counter>().build();
        bridge::install(&cx, Arc::new(registry));
        cx
    }

    fn new_counter(cx: &Context) -> ObjectRef {
        let class = Value::Object(Binding::<Counter>::class(cx));
        cx.construct(&class, &[]).unwrap().as_object().unwrap().clone()
    }

    fn message(cx: &Context, result: JsResult<Value>) -> String {
        cx.describe(result.unwrap_err().value())
    }

    fn number(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_class_is_generated_once() {
        let cx = context();
        let a = Binding::<Counter>::class(&cx);
        let b = Binding::<Counter>::class(&cx);
        assert!(a.ptr_eq(&b));
        assert_eq!(a.function_name(), Some("Counter"));
    }

    #[test]
    fn test_invoke_method() {
        let cx = context();
        let counter = new_counter(&cx);
        let sum = cx.call_method(&counter, "add", &[number(2.0), number(3.0)]).unwrap();
        assert_eq!(sum.as_number(), Some(5.0));
    }

    #[test]
    fn test_arity_mismatch_throws() {
        let cx = context();
        let counter = new_counter(&cx);
        let result = cx.call_method(&counter, "add", &[number(2.0)]);
        assert_eq!(message(&cx, result), "Error: add: expected 2 argument(s), got 1");
    }

    #[test]
    fn test_argument_conversion_throws() {
        let cx = context();
        let counter = new_counter(&cx);
        let result = cx.call_method(&counter, "add", &[number(1.0), Value::string("2")]);
        assert_eq!(
            message(&cx, result),
            "Error: add: argument 1 cannot be converted to int"
        );
    }

    #[test]
    fn test_native_error_throws() {
        let cx = context();
        let counter = new_counter(&cx);
        let result = cx.call_method(&counter, "fail", &[]);
        assert_eq!(
            message(&cx, result),
            "Error: fail: Invocation failed: counter jammed"
        );
    }

    #[test]
    fn test_unconvertible_result_throws() {
        let cx = context();
        let counter = new_counter(&cx);
        let result = cx.call_method(&counter, "describe", &[]);
        assert!(message(&cx, result).contains("cannot be converted to a foreign value"));
    }

    #[test]
    fn test_constructor_requires_new() {
        let cx = context();
        let class = Value::Object(Binding::<Counter>::class(&cx));
        let result = cx.call(&class, Value::Undefined, &[]);
        assert!(message(&cx, result).starts_with("TypeError: class constructor Counter"));
    }

    #[test]
    fn test_static_method_and_constant() {
        let cx = context();
        let class = Binding::<Counter>::class(&cx);
        let doubled = cx.call_method(&class, "twice", &[number(21.0)]).unwrap();
        assert_eq!(doubled.as_number(), Some(42.0));
        assert_eq!(cx.get(&class, "MAX").unwrap().as_number(), Some(10.0));
        assert!(cx.set(&class, "MAX", number(11.0)).is_err());

        let counter = new_counter(&cx);
        assert!(cx.get(&counter, "twice").unwrap().is_undefined());
    }

    #[test]
    fn test_property_read_write() {
        let cx = context();
        let counter = new_counter(&cx);
        assert!(counter.has_own("value"));
        cx.set(&counter, "value", number(4.0)).unwrap();
        assert_eq!(cx.get(&counter, "value").unwrap().as_number(), Some(4.0));
        assert_eq!(cx.get(&counter, "label").unwrap().as_str(), Some(""));
    }

    #[test]
    fn test_property_write_errors() {
        let cx = context();
        let counter = new_counter(&cx);
        let readonly = cx.set(&counter, "label", Value::string("x")).map(|_| Value::Undefined);
        assert!(message(&cx, readonly).starts_with("TypeError"));

        let wrong_type = cx.set(&counter, "value", Value::string("x")).map(|_| Value::Undefined);
        assert_eq!(
            message(&cx, wrong_type),
            "Error: value for value cannot be converted to int"
        );

        let dynamic = cx.set(&counter, "anything", number(1.0)).map(|_| Value::Undefined);
        assert!(message(&cx, dynamic).contains("dynamic type variant"));

        let refused = cx.set(&counter, "value", number(-1.0)).map(|_| Value::Undefined);
        assert_eq!(message(&cx, refused), "Error: failed to write property value");
    }

    #[test]
    fn test_unreadable_property_throws() {
        let cx = context();
        let counter = new_counter(&cx);
        let result = cx.get(&counter, "anything");
        assert_eq!(message(&cx, result), "Error: failed to read property anything");
    }

    #[test]
    fn test_setter_requires_exactly_one_value() {
        let cx = context();
        let counter = new_counter(&cx);
        let info = CallInfo::new(Value::Object(counter), &[], 0);
        let result = Binding::<Counter>::set(&cx, &info);
        assert_eq!(
            message(&cx, result),
            "Error: setting value takes exactly one value, got 0"
        );
    }

    #[test]
    fn test_on_lists_and_subscribes() {
        let cx = context();
        let counter = new_counter(&cx);
        let channels = cx.call_method(&counter, "on", &[]).unwrap();
        assert_eq!(cx.describe(&channels), "changed(int)");

        let global = cx.global();
        let callback = cx.create_closure("listener", |cx, info| {
            cx.set(&cx.global(), "last", info.arg(0))?;
            Ok(Value::Undefined)
        });
        cx.call_method(
            &counter,
            "on",
            &[Value::string("changed(int)"), Value::Object(callback)],
        )
        .unwrap();

        cx.call_method(&counter, "increment", &[]).unwrap();
        assert!(cx.get(&global, "last").unwrap().is_undefined());
        assert!(cx.run_until_idle(Duration::from_secs(5)));
        assert_eq!(cx.get(&global, "last").unwrap().as_number(), Some(1.0));

        cx.call_method(&counter, "on", &[Value::string("changed(int)"), Value::Null])
            .unwrap();
        assert_eq!(bridge::live_subscriptions(&cx), 0);
    }

    #[test]
    fn test_on_usage_errors() {
        let cx = context();
        let counter = new_counter(&cx);
        let unknown = cx.call_method(&counter, "on", &[Value::string("gone()"), Value::Null]);
        assert_eq!(message(&cx, unknown), "Error: unknown event channel: gone()");

        let bad_shape = cx.call_method(&counter, "on", &[Value::string("changed(int)")]);
        assert!(message(&cx, bad_shape).starts_with("TypeError: usage"));

        let not_callable = cx.call_method(
            &counter,
            "on",
            &[Value::string("changed(int)"), number(1.0)],
        );
        assert!(message(&cx, not_callable).starts_with("TypeError"));
    }

    #[test]
    fn test_wrap_instance_shares_native_state() {
        let cx = context();
        let native = instance(Counter::default());
        let object = Binding::<Counter>::wrap_instance(&cx, native.clone()).unwrap();
        native.lock().value = 9;
        assert_eq!(cx.get(&object, "value").unwrap().as_number(), Some(9.0));

        let watch = ObjectHandle::from_object(&cx, &object).unwrap().watch();
        drop(object);
        assert_eq!(watch.state(), HandleState::Released);
        assert_eq!(native.lock().value, 9);
    }

    #[test]
    fn test_instances_pass_back_as_arguments() {
        let cx = context();
        let registry = bridge::registry(&cx);
        let counter = Value::Object(new_counter(&cx));
        assert!(registry.can_from_foreign(&cx, &counter, Counter::type_tag()));
        let native = registry.from_foreign(&cx, &counter, Counter::type_tag()).unwrap();
        assert!(native.instance::<Counter>().is_some());
        assert!(!registry.can_from_foreign(&cx, &number(1.0), Counter::type_tag()));
    }

    #[test]
    fn test_wrap_native_rejects_other_types() {
        let cx = context();
        let result = Binding::<Counter>::wrap_native(&cx, &NativeValue::int(1));
        assert!(message(&cx, result).starts_with("TypeError: expected a Counter instance"));
    }
}
