//! Event channels: native event sources feeding foreign callbacks
//!
//! Each event declared in a descriptor is a channel named by its signature,
//! e.g. `changed(int)`. A channel holds at most one subscriber. Firing a
//! channel snapshots the current subscriber and sends the arguments through
//! an [`AsyncBridge`]; the callback runs later on the runtime thread, even
//! when the event fired on that thread.

use std::rc::Weak;
use std::sync::Arc;

use ferry_sdk::{ConnectionId, EventSink, EventSource, NativeValue, TypeDescriptor};
use parking_lot::Mutex;

use super::async_bridge::AsyncBridge;
use super::BridgeState;
use crate::error::BridgeError;
use crate::runtime::{Context, JsResult, LoopHandle, Value};

/// Keeps one foreign subscription alive while referenced
pub(crate) struct SubscriptionToken {
    id: u64,
}

impl SubscriptionToken {
    pub(crate) fn new(id: u64) -> Self {
        SubscriptionToken { id }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

struct ChannelSink {
    loop_handle: LoopHandle,
    method_indices: Vec<usize>,
    subscribers: Mutex<Vec<Option<Arc<SubscriptionToken>>>>,
}

impl EventSink for ChannelSink {
    fn fire(&self, method_index: usize, args: &[NativeValue]) {
        let Some(slot) = self.method_indices.iter().position(|m| *m == method_index) else {
            return;
        };
        let Some(token) = self.subscribers.lock()[slot].clone() else {
            return;
        };
        let args = args.to_vec();
        AsyncBridge::new(&self.loop_handle).send(move |cx: &Context| deliver(cx, &token, &args));
    }
}

fn deliver(cx: &Context, token: &SubscriptionToken, args: &[NativeValue]) -> JsResult<()> {
    let state = super::state(cx);
    let Some(callback) = state.subscription(token.id()) else {
        return Ok(());
    };
    let registry = state.registry().clone();
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match registry.to_foreign(cx, arg) {
            Ok(value) => values.push(value),
            Err(err) => {
                return Err(cx.error(format!("event argument of type {}: {}", arg.type_id(), err)))
            }
        }
    }
    log::trace!("delivering event to subscription {}", token.id());
    cx.call(&callback, Value::Undefined, &values).map(drop)
}

/// Connects a native event source to foreign callbacks.
///
/// Disconnects from the source when dropped, and forgets its callbacks.
pub struct EventChannelBridge {
    signatures: Vec<String>,
    sink: Arc<ChannelSink>,
    source: Arc<EventSource>,
    connection: ConnectionId,
    state: Weak<BridgeState>,
}

impl EventChannelBridge {
    /// Connect to every event channel `descriptor` declares
    pub fn connect(cx: &Context, descriptor: &TypeDescriptor, source: Arc<EventSource>) -> Self {
        let (method_indices, signatures): (Vec<usize>, Vec<String>) =
            descriptor.events().map(|(index, m)| (index, m.signature())).unzip();
        let sink = Arc::new(ChannelSink {
            loop_handle: cx.loop_handle(),
            subscribers: Mutex::new(vec![None; method_indices.len()]),
            method_indices,
        });
        let connection = source.connect(sink.clone());
        log::debug!(
            "connected {} channel(s) of {}",
            signatures.len(),
            descriptor.name()
        );
        EventChannelBridge {
            signatures,
            sink,
            source,
            connection,
            state: std::rc::Rc::downgrade(&super::state(cx)),
        }
    }

    /// Signatures of every channel, in declaration order
    pub fn list_channels(&self) -> Vec<String> {
        self.signatures.clone()
    }

    /// Subscribe `callback` to `signature`, or unsubscribe with `None`.
    ///
    /// A new subscriber replaces the previous one.
    pub fn subscribe(
        &self,
        cx: &Context,
        signature: &str,
        callback: Option<Value>,
    ) -> Result<(), BridgeError> {
        let slot = self
            .signatures
            .iter()
            .position(|s| s == signature)
            .ok_or_else(|| BridgeError::UnknownChannel(signature.to_string()))?;
        if callback.as_ref().map_or(false, |cb| !cb.is_function()) {
            return Err(BridgeError::SubscribeUsage);
        }
        let state = super::state(cx);
        let token = callback.map(|cb| state.register_subscription(cb));
        let previous = std::mem::replace(&mut self.sink.subscribers.lock()[slot], token);
        drop(previous);
        state.prune_subscriptions();
        Ok(())
    }

    /// Check if `signature` currently has a subscriber
    pub fn is_subscribed(&self, signature: &str) -> bool {
        self.signatures
            .iter()
            .position(|s| s == signature)
            .map_or(false, |slot| self.sink.subscribers.lock()[slot].is_some())
    }
}

impl Drop for EventChannelBridge {
    fn drop(&mut self) {
        self.source.disconnect(self.connection);
        let tokens: Vec<_> = self.sink.subscribers.lock().iter_mut().map(Option::take).collect();
        drop(tokens);
        // Gone while the context itself is being torn down.
        if let Some(state) = self.state.upgrade() {
            state.prune_subscriptions();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{self, ConverterRegistry};
    use ferry_sdk::TypeId;
    use once_cell::sync::Lazy;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::thread;
    use std::time::Duration;

    static DESCRIPTOR: Lazy<TypeDescriptor> = Lazy::new(|| {
        TypeDescriptor::builder("Emitter")
            .method("poke", &[], TypeId::VOID)
            .event("changed", &[TypeId::INT])
            .event("named", &[TypeId::STRING, TypeId::INT])
            .build()
    });

    fn context() -> Context {
        let cx = Context::new();
        bridge::install(&cx, Arc::new(ConverterRegistry::with_defaults()));
        cx
    }

    fn recorder(cx: &Context) -> (Value, Rc<RefCell<Vec<String>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let function = cx.create_closure("record", move |cx, info| {
            let parts: Vec<String> = info.args().iter().map(|v| cx.describe(v)).collect();
            sink.borrow_mut().push(parts.join(" "));
            Ok(Value::Undefined)
        });
        (Value::Object(function), seen)
    }

    #[test]
    fn test_list_channels() {
        let cx = context();
        let bridge = EventChannelBridge::connect(&cx, &DESCRIPTOR, Arc::new(EventSource::new()));
        assert_eq!(
            bridge.list_channels(),
            vec!["changed(int)".to_string(), "named(string,int)".to_string()]
        );
    }

    #[test]
    fn test_fire_without_subscriber_is_silent() {
        let cx = context();
        let source = Arc::new(EventSource::new());
        let _bridge = EventChannelBridge::connect(&cx, &DESCRIPTOR, source.clone());
        source.emit(1, &[NativeValue::int(7)]);
        assert_eq!(cx.pending_wakes(), 0);
        assert!(cx.is_idle());
    }

    #[test]
    fn test_fire_from_worker_reaches_callback_once() {
        let cx = context();
        let source = Arc::new(EventSource::new());
        let bridge = EventChannelBridge::connect(&cx, &DESCRIPTOR, source.clone());
        let (callback, seen) = recorder(&cx);
        bridge.subscribe(&cx, "changed(int)", Some(callback)).unwrap();

        let emitter = source.clone();
        thread::spawn(move || emitter.emit(1, &[NativeValue::int(7)]))
            .join()
            .unwrap();
        assert!(seen.borrow().is_empty());

        assert!(cx.run_until_idle(Duration::from_secs(5)));
        assert_eq!(*seen.borrow(), vec!["7".to_string()]);
    }

    #[test]
    fn test_second_subscribe_replaces_first() {
        let cx = context();
        let source = Arc::new(EventSource::new());
        let bridge = EventChannelBridge::connect(&cx, &DESCRIPTOR, source.clone());
        let (first, first_seen) = recorder(&cx);
        let (second, second_seen) = recorder(&cx);
        bridge.subscribe(&cx, "named(string,int)", Some(first)).unwrap();
        bridge.subscribe(&cx, "named(string,int)", Some(second)).unwrap();

        source.emit(2, &[NativeValue::string("x"), NativeValue::int(1)]);
        cx.run_until_idle(Duration::from_secs(5));

        assert!(first_seen.borrow().is_empty());
        assert_eq!(*second_seen.borrow(), vec!["x 1".to_string()]);
        assert_eq!(bridge::live_subscriptions(&cx), 1);
    }

    #[test]
    fn test_unsubscribe_with_none() {
        let cx = context();
        let source = Arc::new(EventSource::new());
        let bridge = EventChannelBridge::connect(&cx, &DESCRIPTOR, source.clone());
        let (callback, seen) = recorder(&cx);
        bridge.subscribe(&cx, "changed(int)", Some(callback)).unwrap();
        assert!(bridge.is_subscribed("changed(int)"));
        bridge.subscribe(&cx, "changed(int)", None).unwrap();
        assert!(!bridge.is_subscribed("changed(int)"));

        source.emit(1, &[NativeValue::int(3)]);
        cx.run_until_idle(Duration::from_secs(5));
        assert!(seen.borrow().is_empty());
        assert_eq!(bridge::live_subscriptions(&cx), 0);
    }

    #[test]
    fn test_unknown_channel_and_bad_callback() {
        let cx = context();
        let bridge = EventChannelBridge::connect(&cx, &DESCRIPTOR, Arc::new(EventSource::new()));
        assert!(matches!(
            bridge.subscribe(&cx, "changed(double)", None),
            Err(BridgeError::UnknownChannel(_))
        ));
        assert!(matches!(
            bridge.subscribe(&cx, "changed(int)", Some(Value::Number(1.0))),
            Err(BridgeError::SubscribeUsage)
        ));
    }

    #[test]
    fn test_callback_throw_goes_to_diagnostics() {
        let cx = context();
        let source = Arc::new(EventSource::new());
        let bridge = EventChannelBridge::connect(&cx, &DESCRIPTOR, source.clone());
        let thrower = cx.create_closure("thrower", |cx, _| Err(cx.error("listener failed")));
        bridge
            .subscribe(&cx, "changed(int)", Some(Value::Object(thrower)))
            .unwrap();
        source.emit(1, &[NativeValue::int(1)]);
        cx.run_until_idle(Duration::from_secs(5));
        assert_eq!(cx.take_diagnostics(), vec!["Error: listener failed".to_string()]);
    }

    #[test]
    fn test_drop_disconnects_from_source() {
        let cx = context();
        let source = Arc::new(EventSource::new());
        let bridge = EventChannelBridge::connect(&cx, &DESCRIPTOR, source.clone());
        assert_eq!(source.sink_count(), 1);
        drop(bridge);
        assert_eq!(source.sink_count(), 0);
    }

    #[test]
    fn test_drop_forgets_callbacks() {
        let cx = context();
        let source = Arc::new(EventSource::new());
        let bridge = EventChannelBridge::connect(&cx, &DESCRIPTOR, source.clone());
        let (first, _) = recorder(&cx);
        let (second, _) = recorder(&cx);
        bridge.subscribe(&cx, "changed(int)", Some(first)).unwrap();
        bridge.subscribe(&cx, "named(string,int)", Some(second)).unwrap();
        assert_eq!(bridge::state(&cx).retained_subscriptions(), 2);

        drop(bridge);
        assert_eq!(bridge::state(&cx).retained_subscriptions(), 0);
        assert_eq!(bridge::live_subscriptions(&cx), 0);
    }

    #[test]
    fn test_drop_after_context_is_gone() {
        let cx = context();
        let bridge = EventChannelBridge::connect(&cx, &DESCRIPTOR, Arc::new(EventSource::new()));
        let (callback, _) = recorder(&cx);
        bridge.subscribe(&cx, "changed(int)", Some(callback)).unwrap();
        drop(cx);
        drop(bridge);
    }
}
