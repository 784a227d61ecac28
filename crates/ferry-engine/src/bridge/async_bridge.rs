//! Cross-thread delivery into a runtime context
//!
//! An [`AsyncBridge`] carries one piece of work from any thread to the
//! runtime thread of its target context. It registers with the context's
//! event loop when created, which keeps the loop from going idle until the
//! work has been delivered. `send` consumes the bridge, so each bridge
//! delivers at most once; long-lived producers create one per delivery.

use crate::runtime::{Context, ContextId, JsResult, LoopHandle, Registration, Wake};

/// Single-use cross-thread delivery handle.
pub struct AsyncBridge {
    handle: LoopHandle,
    registration: Registration,
}

impl AsyncBridge {
    /// Register a new delivery against the loop behind `handle`
    pub fn new(handle: &LoopHandle) -> Self {
        AsyncBridge {
            handle: handle.clone(),
            registration: handle.register(),
        }
    }

    /// Target context
    pub fn context(&self) -> ContextId {
        self.handle.context()
    }

    /// Queue `work` for the runtime thread and return immediately.
    ///
    /// The work runs inside a handle scope; a throw escaping it goes to the
    /// context's diagnostic channel. If the context no longer exists the work
    /// is dropped.
    pub fn send<F>(self, work: F)
    where
        F: FnOnce(&Context) -> JsResult<()> + Send + 'static,
    {
        let AsyncBridge {
            handle,
            registration,
        } = self;
        let wake = Wake {
            work: Box::new(work),
            registration,
        };
        if handle.post(wake).is_err() {
            log::warn!(
                "context {} is gone; dropping delivery",
                handle.context().as_u64()
            );
        }
    }
}
