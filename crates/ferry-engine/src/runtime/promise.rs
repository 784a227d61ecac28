//! Foreign promises
//!
//! Settlement reactions run synchronously, in registration order, on the
//! thread that settles the promise (always the runtime thread).

use super::context::Context;
use super::value::{ObjectKind, ObjectRef, Value};

pub(crate) type Reaction = Box<dyn FnOnce(&Context, Result<Value, Value>)>;

pub(crate) enum PromiseState {
    Pending(Vec<Reaction>),
    Fulfilled(Value),
    Rejected(Value),
}

impl PromiseState {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            PromiseState::Pending(_) => "<pending>",
            PromiseState::Fulfilled(_) => "<fulfilled>",
            PromiseState::Rejected(_) => "<rejected>",
        }
    }
}

/// Observable state of a promise
#[derive(Debug, Clone)]
pub enum PromiseStatus {
    /// Not yet settled
    Pending,
    /// Resolved with a value
    Fulfilled(Value),
    /// Rejected with a reason
    Rejected(Value),
}

impl PromiseStatus {
    /// Check if still pending
    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseStatus::Pending)
    }
}

/// Capability to settle one promise.
///
/// Consumed by settling, so each resolver settles at most once.
pub struct PromiseResolver {
    promise: ObjectRef,
}

impl PromiseResolver {
    /// The promise this resolver settles
    pub fn promise(&self) -> &ObjectRef {
        &self.promise
    }

    /// Fulfill the promise
    pub fn resolve(self, cx: &Context, value: Value) {
        settle(cx, &self.promise, Ok(value));
    }

    /// Reject the promise
    pub fn reject(self, cx: &Context, reason: Value) {
        settle(cx, &self.promise, Err(reason));
    }
}

fn settle(cx: &Context, promise: &ObjectRef, outcome: Result<Value, Value>) -> bool {
    let ObjectKind::Promise(state) = &promise.0.kind else {
        return false;
    };
    let reactions = {
        let mut state = state.borrow_mut();
        let PromiseState::Pending(reactions) = &mut *state else {
            return false;
        };
        let reactions = std::mem::take(reactions);
        *state = match &outcome {
            Ok(value) => PromiseState::Fulfilled(value.clone()),
            Err(reason) => PromiseState::Rejected(reason.clone()),
        };
        reactions
    };
    for reaction in reactions {
        reaction(cx, outcome.clone());
    }
    true
}

impl Context {
    /// Create a pending promise and the resolver that settles it
    pub fn create_promise(&self) -> (ObjectRef, PromiseResolver) {
        let promise = ObjectRef::new(
            self.id(),
            ObjectKind::Promise(std::cell::RefCell::new(PromiseState::Pending(Vec::new()))),
            None,
        );
        let resolver = PromiseResolver {
            promise: promise.clone(),
        };
        (promise, resolver)
    }

    /// Inspect a promise; `None` if `value` is not a promise
    pub fn promise_state(&self, value: &Value) -> Option<PromiseStatus> {
        let object = value.as_object()?;
        let ObjectKind::Promise(state) = &object.0.kind else {
            return None;
        };
        let status = match &*state.borrow() {
            PromiseState::Pending(_) => PromiseStatus::Pending,
            PromiseState::Fulfilled(v) => PromiseStatus::Fulfilled(v.clone()),
            PromiseState::Rejected(v) => PromiseStatus::Rejected(v.clone()),
        };
        Some(status)
    }

    /// Run `reaction` when `promise` settles, or now if it already has
    pub fn on_settled<F>(&self, promise: &ObjectRef, reaction: F)
    where
        F: FnOnce(&Context, Result<Value, Value>) + 'static,
    {
        self.check_owned(promise);
        let ObjectKind::Promise(state) = &promise.0.kind else {
            return;
        };
        let outcome = {
            let mut state = state.borrow_mut();
            match &mut *state {
                PromiseState::Pending(reactions) => {
                    reactions.push(Box::new(reaction));
                    return;
                }
                PromiseState::Fulfilled(v) => Ok(v.clone()),
                PromiseState::Rejected(v) => Err(v.clone()),
            }
        };
        reaction(self, outcome);
    }
}
