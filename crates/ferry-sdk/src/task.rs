//! Background work submission
//!
//! Native code that produces results off the runtime thread hands its jobs to
//! a [`TaskQueue`]. A host installs one process-wide queue at startup; until
//! then, or when the installed queue refuses a job, the job runs on a
//! dedicated thread.

use std::sync::Arc;
use std::thread;

use once_cell::sync::OnceCell;

/// Unit of background work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Destination for background jobs
pub trait TaskQueue: Send + Sync {
    /// Queue a job; hands it back if the queue no longer accepts work
    fn submit(&self, job: Job) -> Result<(), Job>;
}

static GLOBAL_QUEUE: OnceCell<Arc<dyn TaskQueue>> = OnceCell::new();

/// Install the process-wide queue. Returns `false` if one is already installed.
pub fn install(queue: Arc<dyn TaskQueue>) -> bool {
    GLOBAL_QUEUE.set(queue).is_ok()
}

/// Check if a process-wide queue is installed
pub fn is_installed() -> bool {
    GLOBAL_QUEUE.get().is_some()
}

/// Run `job` in the background
pub fn spawn<F>(job: F)
where
    F: FnOnce() + Send + 'static,
{
    let job: Job = Box::new(job);
    let job = match GLOBAL_QUEUE.get() {
        Some(queue) => match queue.submit(job) {
            Ok(()) => return,
            Err(job) => job,
        },
        None => job,
    };
    thread::spawn(job);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_spawn_runs_job() {
        let (tx, rx) = mpsc::channel();
        spawn(move || {
            tx.send(41 + 1).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }
}
