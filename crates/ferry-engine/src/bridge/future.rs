//! Deferred results exposed as foreign promises

use ferry_sdk::{Deferred, DeferredStatus, NativeValue};

use super::async_bridge::AsyncBridge;
use super::convert::ConvertError;
use crate::runtime::{Context, JsResult, Value};

/// Convert a deferred native value into a pending foreign promise.
///
/// The promise settles on the runtime thread after the deferred completes,
/// whichever thread completes it. If the settled value cannot be converted,
/// the promise is rejected with a description of the failure.
pub(crate) fn deferred_to_foreign(cx: &Context, value: &NativeValue) -> JsResult<Value> {
    let Some(deferred) = value.as_deferred().cloned() else {
        return Err(cx.type_error(format!("expected a deferred value, got {}", value.type_id())));
    };
    Ok(Value::Object(promise_for(cx, deferred)))
}

fn promise_for(cx: &Context, deferred: Deferred) -> crate::runtime::ObjectRef {
    let (promise, resolver) = cx.create_promise();
    let slot = super::state(cx).park_resolver(resolver);
    let bridge = AsyncBridge::new(&cx.loop_handle());
    deferred.then(move |status, value| {
        bridge.send(move |cx: &Context| settle(cx, slot, status, value));
    });
    promise
}

fn settle(cx: &Context, slot: u64, status: DeferredStatus, value: NativeValue) -> JsResult<()> {
    let state = super::state(cx);
    let Some(resolver) = state.take_resolver(slot) else {
        fatal!("no pending foreign future in slot {}", slot);
    };
    let converted = match state.registry().to_foreign(cx, &value) {
        Ok(foreign) => Ok(foreign),
        Err(ConvertError::Thrown(throw)) => Err(throw.0),
        Err(err) => Err(Value::string(&format!(
            "cannot convert settled value of type {}: {}",
            value.type_id(),
            err
        ))),
    };
    match (status, converted) {
        (DeferredStatus::Resolved, Ok(foreign)) => resolver.resolve(cx, foreign),
        (_, Ok(foreign)) => resolver.reject(cx, foreign),
        (_, Err(reason)) => {
            log::warn!("rejecting foreign future: {}", cx.describe(&reason));
            resolver.reject(cx, reason);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{self, ConverterRegistry};
    use crate::runtime::PromiseStatus;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn context() -> Context {
        let cx = Context::new();
        bridge::install(&cx, Arc::new(ConverterRegistry::with_defaults()));
        cx
    }

    fn status_of(cx: &Context, promise: &Value) -> PromiseStatus {
        cx.promise_state(promise).unwrap()
    }

    #[test]
    fn test_resolve_from_worker() {
        let cx = context();
        let deferred = Deferred::new();
        let promise = deferred_to_foreign(&cx, &NativeValue::deferred(deferred.clone())).unwrap();
        assert!(status_of(&cx, &promise).is_pending());

        thread::spawn(move || deferred.resolve(NativeValue::int(8)))
            .join()
            .unwrap();
        assert!(status_of(&cx, &promise).is_pending());

        assert!(cx.run_until_idle(Duration::from_secs(5)));
        match status_of(&cx, &promise) {
            PromiseStatus::Fulfilled(v) => assert_eq!(v.as_number(), Some(8.0)),
            other => panic!("unexpected state: {:?}", other),
        }
        assert_eq!(bridge::pending_futures(&cx), 0);
    }

    #[test]
    fn test_reject_settles_rejected() {
        let cx = context();
        let deferred = Deferred::new();
        let promise = deferred_to_foreign(&cx, &NativeValue::deferred(deferred.clone())).unwrap();
        deferred.reject(NativeValue::string("no such file"));
        cx.run_until_idle(Duration::from_secs(5));
        match status_of(&cx, &promise) {
            PromiseStatus::Rejected(v) => assert_eq!(v.as_str(), Some("no such file")),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_panicking_producer_rejects_promise() {
        let cx = context();
        let deferred = Deferred::new();
        let promise = deferred_to_foreign(&cx, &NativeValue::deferred(deferred.clone())).unwrap();

        let outcome = thread::spawn(move || {
            let _completer = deferred;
            panic!("worker job failed");
        })
        .join();
        assert!(outcome.is_err());

        assert!(cx.run_until_idle(Duration::from_secs(5)));
        match status_of(&cx, &promise) {
            PromiseStatus::Rejected(v) => {
                assert_eq!(v.as_str(), Some("deferred dropped without a result"))
            }
            other => panic!("unexpected state: {:?}", other),
        }
        assert_eq!(bridge::pending_futures(&cx), 0);
    }

    #[test]
    fn test_already_resolved_deferred_still_settles_through_loop() {
        let cx = context();
        let deferred = Deferred::new();
        deferred.resolve(NativeValue::string("done"));
        let promise = deferred_to_foreign(&cx, &NativeValue::deferred(deferred)).unwrap();
        assert!(status_of(&cx, &promise).is_pending());
        assert_eq!(cx.run_pending(), 1);
        assert!(matches!(status_of(&cx, &promise), PromiseStatus::Fulfilled(_)));
    }

    #[test]
    fn test_unconvertible_value_rejects_with_description() {
        let cx = context();
        let deferred = Deferred::new();
        let promise = deferred_to_foreign(&cx, &NativeValue::deferred(deferred.clone())).unwrap();
        let unregistered = NativeValue::object_erased(
            ferry_sdk::TypeId::from_raw(9_999),
            Arc::new(parking_lot::Mutex::new(0u8)),
        );
        deferred.resolve(unregistered);
        cx.run_until_idle(Duration::from_secs(5));
        match status_of(&cx, &promise) {
            PromiseStatus::Rejected(v) => {
                assert!(v.as_str().unwrap().starts_with("cannot convert settled value"))
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_non_deferred_value_is_type_error() {
        let cx = context();
        let err = deferred_to_foreign(&cx, &NativeValue::int(1)).unwrap_err();
        assert!(cx.describe(err.value()).starts_with("TypeError"));
    }
}
