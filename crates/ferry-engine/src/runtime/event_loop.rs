//! Per-context event loop
//!
//! One ordered multi-producer queue feeds the runtime thread. Producers on any
//! thread post work through a [`LoopHandle`]; the runtime thread pumps the
//! queue with [`Context::run_pending`] or [`Context::run_until_idle`]. Each
//! delivery runs inside its own handle scope, and a throw escaping a delivery
//! goes to the context's diagnostic channel.
//!
//! The loop counts live wake registrations. A registration is taken when an
//! async bridge is created and released once its work has been delivered (or
//! dropped), so `run_until_idle` returns only when nothing is outstanding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

use super::context::{Context, ContextId, JsResult};

/// Work delivered on the runtime thread
pub(crate) type Work = Box<dyn FnOnce(&Context) -> JsResult<()> + Send>;

pub(crate) struct Wake {
    pub(crate) work: Work,
    pub(crate) registration: Registration,
}

/// Keeps the loop alive until dropped
pub(crate) struct Registration {
    live: Arc<AtomicUsize>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct EventLoop {
    context: ContextId,
    sender: Sender<Wake>,
    receiver: Receiver<Wake>,
    live: Arc<AtomicUsize>,
}

impl EventLoop {
    pub(crate) fn new(context: ContextId) -> Self {
        let (sender, receiver) = channel::unbounded();
        EventLoop {
            context,
            sender,
            receiver,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn handle(&self) -> LoopHandle {
        LoopHandle {
            context: self.context,
            sender: self.sender.clone(),
            live: self.live.clone(),
        }
    }
}

/// Sendable handle for posting work to a context's loop.
#[derive(Clone)]
pub struct LoopHandle {
    context: ContextId,
    sender: Sender<Wake>,
    live: Arc<AtomicUsize>,
}

impl LoopHandle {
    /// Context this loop belongs to
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Registrations not yet delivered or dropped
    pub fn live_registrations(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn register(&self) -> Registration {
        self.live.fetch_add(1, Ordering::AcqRel);
        Registration {
            live: self.live.clone(),
        }
    }

    /// Queue a wake. Hands it back if the context is gone.
    pub(crate) fn post(&self, wake: Wake) -> Result<(), Wake> {
        self.sender.send(wake).map_err(|e| e.into_inner())
    }
}

impl Context {
    /// Deliver every wake queued at the time of the call.
    ///
    /// Wakes posted by those deliveries wait for the next call. Returns the
    /// number delivered.
    pub fn run_pending(&self) -> usize {
        let receiver = &self.event_loop().receiver;
        let queued = receiver.len();
        let mut delivered = 0;
        for _ in 0..queued {
            match receiver.try_recv() {
                Ok(wake) => {
                    self.dispatch(wake);
                    delivered += 1;
                }
                Err(_) => break,
            }
        }
        delivered
    }

    /// Pump the loop until no registration is outstanding or `timeout` passes.
    ///
    /// Returns `true` if the loop went idle.
    pub fn run_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if self.is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.event_loop().receiver.recv_timeout(deadline - now) {
                Ok(wake) => self.dispatch(wake),
                Err(channel::RecvTimeoutError::Timeout) => return self.is_idle(),
                Err(channel::RecvTimeoutError::Disconnected) => return true,
            }
        }
    }

    /// Check if nothing is queued or outstanding
    pub fn is_idle(&self) -> bool {
        self.event_loop().live.load(Ordering::Acquire) == 0
    }

    /// Number of wakes waiting to be delivered
    pub fn pending_wakes(&self) -> usize {
        self.event_loop().receiver.len()
    }

    fn dispatch(&self, wake: Wake) {
        let Wake { work, registration } = wake;
        {
            let _scope = self.open_scope();
            if let Err(throw) = work(self) {
                self.report_exception(throw);
            }
        }
        drop(registration);
    }
}
