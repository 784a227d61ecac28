//! Object handles: native instances attached to foreign objects
//!
//! A handle starts `Unbound`, becomes `Bound` when attached to exactly one
//! foreign object, and is `Released` when that object is finalized. In
//! exclusive mode the handle is the only owner of the instance, so release
//! destroys it. In shared mode release drops one reference and the instance
//! lives on with its other holders.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::{Arc, Weak};

use ferry_sdk::{Instance, NativeValue, Reflect, TypeId};
use parking_lot::Mutex;

use super::events::EventChannelBridge;
use crate::runtime::{Context, ObjectRef};

/// Who owns the native instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The handle is the sole owner
    Exclusive,
    /// Ownership is shared with native code
    Shared,
}

/// Lifecycle of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Not attached to a foreign object yet
    Unbound,
    /// Attached to a foreign object
    Bound,
    /// The foreign object was finalized
    Released,
}

/// Native instance attached to a foreign object.
pub struct ObjectHandle {
    type_id: TypeId,
    type_name: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
    ownership: Ownership,
    state: Rc<Cell<HandleState>>,
    events: Option<EventChannelBridge>,
}

impl ObjectHandle {
    /// Take sole ownership of a fresh instance
    pub fn exclusive<T: Reflect>(value: T) -> Self {
        Self::new::<T>(Arc::new(Mutex::new(value)), Ownership::Exclusive)
    }

    /// Take sole ownership of an existing instance.
    ///
    /// Binding aborts if anything else still holds `instance`.
    pub fn adopt<T: Reflect>(instance: Instance<T>) -> Self {
        Self::new::<T>(instance, Ownership::Exclusive)
    }

    /// Share ownership with native code
    pub fn shared<T: Reflect>(instance: Instance<T>) -> Self {
        Self::new::<T>(instance, Ownership::Shared)
    }

    fn new<T: Reflect>(instance: Instance<T>, ownership: Ownership) -> Self {
        ObjectHandle {
            type_id: T::type_tag(),
            type_name: std::any::type_name::<T>(),
            instance,
            ownership,
            state: Rc::new(Cell::new(HandleState::Unbound)),
            events: None,
        }
    }

    /// Attach the event bridge for the instance's channels
    pub fn with_events(mut self, events: EventChannelBridge) -> Self {
        self.events = Some(events);
        self
    }

    /// Type id of the instance
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Ownership mode
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Current lifecycle state
    pub fn state(&self) -> HandleState {
        self.state.get()
    }

    /// Event bridge, if the type has channels
    pub fn events(&self) -> Option<&EventChannelBridge> {
        self.events.as_ref()
    }

    /// The instance, if it is a `T`
    pub fn instance<T: Reflect>(&self) -> Option<Instance<T>> {
        self.instance.clone().downcast::<Mutex<T>>().ok()
    }

    /// The instance as a tagged native value (shares the instance)
    pub fn native_value(&self) -> NativeValue {
        NativeValue::object_erased(self.type_id, self.instance.clone())
    }

    /// Observer that outlives the handle
    pub fn watch(&self) -> HandleWatch {
        HandleWatch {
            state: self.state.clone(),
            instance: Arc::downgrade(&self.instance),
        }
    }

    /// Attach to `object`.
    ///
    /// Aborts if the handle is already bound, if `object` already carries
    /// native data, or if an exclusive handle's instance has other owners.
    pub fn bind(self, cx: &Context, object: &ObjectRef) -> Rc<ObjectHandle> {
        if self.state.get() != HandleState::Unbound {
            fatal!("{} handle bound twice", self.type_name);
        }
        if self.ownership == Ownership::Exclusive && Arc::strong_count(&self.instance) != 1 {
            fatal!(
                "exclusive {} handle adopted an instance with {} other owner(s)",
                self.type_name,
                Arc::strong_count(&self.instance) - 1
            );
        }
        if cx.is_wrapped(object) {
            fatal!("{} handle bound to an object that is already wrapped", self.type_name);
        }
        self.state.set(HandleState::Bound);
        log::trace!("bound {:?} {} handle", self.ownership, self.type_name);
        let handle = Rc::new(self);
        cx.wrap(object, handle.clone());
        handle
    }

    /// Handle attached to `object`, if any
    pub fn from_object(cx: &Context, object: &ObjectRef) -> Option<Rc<ObjectHandle>> {
        cx.unwrap::<ObjectHandle>(object)
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        if self.state.get() == HandleState::Bound {
            log::trace!("released {:?} {} handle", self.ownership, self.type_name);
        }
        self.state.set(HandleState::Released);
    }
}

/// Observes a handle's lifecycle after the handle itself is gone.
pub struct HandleWatch {
    state: Rc<Cell<HandleState>>,
    instance: Weak<dyn Any + Send + Sync>,
}

impl HandleWatch {
    /// Lifecycle state of the watched handle
    pub fn state(&self) -> HandleState {
        self.state.get()
    }

    /// Check if the native instance still exists
    pub fn instance_alive(&self) -> bool {
        self.instance.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_sdk::{instance, AbiResult, NativeError, TypeDescriptor};
    use once_cell::sync::Lazy;

    #[derive(Default)]
    struct Cell32(i32);

    static DESCRIPTOR: Lazy<TypeDescriptor> =
        Lazy::new(|| TypeDescriptor::builder("HandleCell").build());

    impl Reflect for Cell32 {
        fn descriptor() -> &'static TypeDescriptor {
            &DESCRIPTOR
        }

        fn invoke(&mut self, index: usize, _args: &[NativeValue]) -> AbiResult<NativeValue> {
            Err(NativeError::UnknownMember(index))
        }
    }

    #[test]
    fn test_exclusive_release_destroys_instance() {
        let cx = Context::new();
        let watch = {
            let object = cx.create_object();
            let handle = ObjectHandle::exclusive(Cell32(5)).bind(&cx, &object);
            assert_eq!(handle.state(), HandleState::Bound);
            assert_eq!(handle.instance::<Cell32>().unwrap().lock().0, 5);
            handle.watch()
        };
        assert_eq!(watch.state(), HandleState::Released);
        assert!(!watch.instance_alive());
    }

    #[test]
    fn test_shared_release_keeps_instance() {
        let cx = Context::new();
        let native = instance(Cell32(1));
        let watch = {
            let object = cx.create_object();
            ObjectHandle::shared(native.clone()).bind(&cx, &object).watch()
        };
        assert_eq!(watch.state(), HandleState::Released);
        assert!(watch.instance_alive());
        native.lock().0 = 2;
        drop(native);
        assert!(!watch.instance_alive());
    }

    #[test]
    fn test_unbound_handle_state() {
        let handle = ObjectHandle::exclusive(Cell32(0));
        assert_eq!(handle.state(), HandleState::Unbound);
        assert_eq!(handle.ownership(), Ownership::Exclusive);
        assert_eq!(handle.native_value().type_id(), Cell32::type_tag());
    }

    #[test]
    #[should_panic(expected = "other owner")]
    fn test_exclusive_adopt_with_other_owners_aborts() {
        let cx = Context::new();
        let native = instance(Cell32(3));
        let object = cx.create_object();
        let _keep = native.clone();
        ObjectHandle::adopt(native).bind(&cx, &object);
    }

    #[test]
    #[should_panic(expected = "already wrapped")]
    fn test_rebinding_object_aborts() {
        let cx = Context::new();
        let object = cx.create_object();
        let _first = ObjectHandle::exclusive(Cell32(0)).bind(&cx, &object);
        ObjectHandle::exclusive(Cell32(1)).bind(&cx, &object);
    }

    #[test]
    fn test_from_object() {
        let cx = Context::new();
        let object = cx.create_object();
        assert!(ObjectHandle::from_object(&cx, &object).is_none());
        ObjectHandle::exclusive(Cell32(9)).bind(&cx, &object);
        let handle = ObjectHandle::from_object(&cx, &object).unwrap();
        assert!(handle.instance::<Cell32>().is_some());
    }
}
