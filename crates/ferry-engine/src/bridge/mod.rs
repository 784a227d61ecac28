//! Reflection-driven marshaling bridge
//!
//! [`install`] attaches the bridge to a context together with an immutable
//! [`ConverterRegistry`]. Per-context bridge state (generated classes, parked
//! promise resolvers, event subscriptions) lives in the context's instance
//! data slot and is always reached through the context passed to the call,
//! never through a process-global "current context".

mod async_bridge;
mod binding;
mod convert;
mod events;
mod future;
mod handle;

pub use async_bridge::AsyncBridge;
pub use binding::Binding;
pub use convert::{ConvertError, ConverterRegistry, RegistryBuilder};
pub use events::EventChannelBridge;
pub use handle::{HandleState, HandleWatch, ObjectHandle, Ownership};

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Weak};

use ferry_sdk::TypeId;
use rustc_hash::FxHashMap;

use crate::runtime::{Context, ObjectRef, PromiseResolver, Value};

use events::SubscriptionToken;

struct Subscription {
    callback: Value,
    token: Weak<SubscriptionToken>,
}

/// Per-context bridge state
pub(crate) struct BridgeState {
    registry: Arc<ConverterRegistry>,
    classes: RefCell<FxHashMap<TypeId, ObjectRef>>,
    resolvers: RefCell<FxHashMap<u64, PromiseResolver>>,
    subscriptions: RefCell<FxHashMap<u64, Subscription>>,
    next_slot: Cell<u64>,
}

impl BridgeState {
    pub(crate) fn registry(&self) -> &Arc<ConverterRegistry> {
        &self.registry
    }

    fn next_slot(&self) -> u64 {
        let slot = self.next_slot.get();
        self.next_slot.set(slot + 1);
        slot
    }

    pub(crate) fn class(&self, type_id: TypeId) -> Option<ObjectRef> {
        self.classes.borrow().get(&type_id).cloned()
    }

    pub(crate) fn insert_class(&self, type_id: TypeId, class: ObjectRef) {
        self.classes.borrow_mut().insert(type_id, class);
    }

    pub(crate) fn park_resolver(&self, resolver: PromiseResolver) -> u64 {
        let slot = self.next_slot();
        self.resolvers.borrow_mut().insert(slot, resolver);
        slot
    }

    pub(crate) fn take_resolver(&self, slot: u64) -> Option<PromiseResolver> {
        self.resolvers.borrow_mut().remove(&slot)
    }

    pub(crate) fn register_subscription(&self, callback: Value) -> Arc<SubscriptionToken> {
        let token = Arc::new(SubscriptionToken::new(self.next_slot()));
        self.subscriptions.borrow_mut().insert(
            token.id(),
            Subscription {
                callback,
                token: Arc::downgrade(&token),
            },
        );
        token
    }

    pub(crate) fn subscription(&self, id: u64) -> Option<Value> {
        self.subscriptions
            .borrow()
            .get(&id)
            .filter(|s| s.token.strong_count() > 0)
            .map(|s| s.callback.clone())
    }

    /// Forget callbacks whose subscription tokens are gone
    pub(crate) fn prune_subscriptions(&self) {
        let dead: Vec<Subscription> = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            let ids: Vec<u64> = subscriptions
                .iter()
                .filter(|(_, s)| s.token.strong_count() == 0)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| subscriptions.remove(id)).collect()
        };
        // Callbacks drop outside the borrow; finalizers may run.
        drop(dead);
    }

    pub(crate) fn live_subscriptions(&self) -> usize {
        self.subscriptions
            .borrow()
            .values()
            .filter(|s| s.token.strong_count() > 0)
            .count()
    }

    /// Callbacks still held, including ones awaiting pruning
    pub(crate) fn retained_subscriptions(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    pub(crate) fn pending_futures(&self) -> usize {
        self.resolvers.borrow().len()
    }
}

/// Attach the bridge to `cx`. Replaces any earlier installation.
pub fn install(cx: &Context, registry: Arc<ConverterRegistry>) {
    log::debug!(
        "installing bridge on context {} ({} class(es))",
        cx.id().as_u64(),
        registry.classes().len()
    );
    cx.set_instance_data(Rc::new(BridgeState {
        registry,
        classes: RefCell::new(FxHashMap::default()),
        resolvers: RefCell::new(FxHashMap::default()),
        subscriptions: RefCell::new(FxHashMap::default()),
        next_slot: Cell::new(1),
    }));
}

/// Check if the bridge is installed on `cx`
pub fn is_installed(cx: &Context) -> bool {
    cx.instance_data::<BridgeState>().is_some()
}

pub(crate) fn state(cx: &Context) -> Rc<BridgeState> {
    match cx.instance_data::<BridgeState>() {
        Some(state) => state,
        None => fatal!("bridge is not installed on context {}", cx.id().as_u64()),
    }
}

/// Registry installed on `cx`
pub fn registry(cx: &Context) -> Arc<ConverterRegistry> {
    state(cx).registry().clone()
}

/// Define every registered class as a property of `target`
pub fn export_classes(cx: &Context, target: &ObjectRef) {
    let registry = registry(cx);
    for entry in registry.classes() {
        let class = (entry.define)(cx);
        log::debug!("exporting class {}", entry.name);
        cx.define_properties(
            target,
            &[crate::runtime::PropertySpec::value(&entry.name, Value::Object(class))],
        );
    }
}

/// Number of foreign callbacks currently subscribed on `cx`
pub fn live_subscriptions(cx: &Context) -> usize {
    state(cx).live_subscriptions()
}

/// Number of foreign futures on `cx` still waiting for settlement
pub fn pending_futures(cx: &Context) -> usize {
    state(cx).pending_futures()
}
