//! Single-assignment deferred results
//!
//! A [`Deferred`] is completed at most once, by whichever of `resolve` or
//! `reject` runs first; later completions are dropped silently. One
//! continuation may be attached with `then`. It runs exactly once: at
//! completion time if attached earlier, or immediately on the calling thread
//! if the result is already in.
//!
//! If the last handle drops while the result is still pending, an attached
//! continuation runs with a rejection.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::value::NativeValue;

/// Completion state of a deferred result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredStatus {
    /// Not yet completed
    Pending,
    /// Completed successfully
    Resolved,
    /// Completed with an error value
    Rejected,
}

/// Continuation invoked with the final status and value
pub type Continuation = Box<dyn FnOnce(DeferredStatus, NativeValue) + Send>;

const DROPPED_REASON: &str = "deferred dropped without a result";

struct DeferredState {
    status: DeferredStatus,
    value: NativeValue,
    continuation: Option<Continuation>,
}

impl Drop for DeferredState {
    fn drop(&mut self) {
        if self.status != DeferredStatus::Pending {
            return;
        }
        if let Some(continuation) = self.continuation.take() {
            continuation(DeferredStatus::Rejected, NativeValue::string(DROPPED_REASON));
        }
    }
}

/// Thread-safe single-assignment result slot.
///
/// Clones share the same slot.
#[derive(Clone)]
pub struct Deferred {
    state: Arc<Mutex<DeferredState>>,
}

impl Deferred {
    /// Create a pending deferred
    pub fn new() -> Self {
        Deferred {
            state: Arc::new(Mutex::new(DeferredState {
                status: DeferredStatus::Pending,
                value: NativeValue::void(),
                continuation: None,
            })),
        }
    }

    /// Complete successfully. Returns `false` if already completed.
    pub fn resolve(&self, value: NativeValue) -> bool {
        self.complete(DeferredStatus::Resolved, value)
    }

    /// Complete with an error value. Returns `false` if already completed.
    pub fn reject(&self, value: NativeValue) -> bool {
        self.complete(DeferredStatus::Rejected, value)
    }

    /// Attach the continuation, replacing any earlier one that has not run.
    pub fn then<F>(&self, continuation: F)
    where
        F: FnOnce(DeferredStatus, NativeValue) + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.status == DeferredStatus::Pending {
            state.continuation = Some(Box::new(continuation));
            return;
        }
        let (status, value) = (state.status, state.value.clone());
        drop(state);
        continuation(status, value);
    }

    /// Current status
    pub fn status(&self) -> DeferredStatus {
        self.state.lock().status
    }

    /// Completed value, if any
    pub fn value(&self) -> Option<NativeValue> {
        let state = self.state.lock();
        match state.status {
            DeferredStatus::Pending => None,
            _ => Some(state.value.clone()),
        }
    }

    /// Check if two handles share the same slot
    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn complete(&self, status: DeferredStatus, value: NativeValue) -> bool {
        let mut state = self.state.lock();
        if state.status != DeferredStatus::Pending {
            return false;
        }
        state.status = status;
        state.value = value.clone();
        let continuation = state.continuation.take();
        drop(state);

        if let Some(continuation) = continuation {
            continuation(status, value);
        }
        true
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").field("status", &self.status()).finish()
    }
}
