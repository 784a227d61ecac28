//! Background worker pool
//!
//! A fixed set of threads pulling [`Job`]s from a shared channel. The pool is
//! the [`TaskQueue`] hosts install for native code. Shutdown stops accepting
//! work, lets workers drain what is already queued, and waits up to the
//! configured timeout per worker before detaching it.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use ferry_sdk::{Job, TaskQueue};
use parking_lot::Mutex;

use crate::config::WorkerConfig;

/// Outcome of [`WorkerPool::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited within the timeout
    pub joined: usize,
    /// Workers still busy at the timeout, left running
    pub detached: usize,
}

/// Fixed-size pool of background threads.
pub struct WorkerPool {
    job_tx: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    timeout: Duration,
    thread_count: usize,
}

impl WorkerPool {
    /// Spawn `threads` workers (at least one)
    pub fn new(threads: usize, timeout: Duration) -> io::Result<Self> {
        let thread_count = threads.max(1);
        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(thread_count);
        for i in 0..thread_count {
            let rx = job_rx.clone();
            let shutdown = shutdown.clone();
            let handle = thread::Builder::new()
                .name(format!("ferry-worker-{}", i))
                .spawn(move || Self::worker_loop(rx, shutdown))?;
            handles.push(handle);
        }
        log::debug!("started {} worker thread(s)", thread_count);

        Ok(WorkerPool {
            job_tx: Mutex::new(Some(job_tx)),
            handles: Mutex::new(handles),
            shutdown,
            timeout,
            thread_count,
        })
    }

    /// Spawn workers as configured
    pub fn from_config(config: &WorkerConfig) -> io::Result<Self> {
        Self::new(config.thread_count(), config.shutdown_timeout())
    }

    /// Number of worker threads
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Check if the pool still accepts work
    pub fn is_running(&self) -> bool {
        self.job_tx.lock().is_some()
    }

    /// Stop accepting work and wait for the workers.
    ///
    /// Queued jobs still run. A worker that has not exited within the
    /// timeout is detached. Calling this again is a no-op.
    pub fn shutdown(&self) -> ShutdownReport {
        // Dropping the sender disconnects workers once the queue is drained
        if self.job_tx.lock().take().is_none() {
            return ShutdownReport::default();
        }

        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        let mut report = ShutdownReport::default();
        for handle in handles {
            if Self::join_with_timeout(handle, self.timeout) {
                report.joined += 1;
            } else {
                report.detached += 1;
            }
        }

        // Detached workers stop after their current job
        self.shutdown.store(true, AtomicOrdering::Release);

        if report.detached > 0 {
            log::warn!(
                "worker shutdown timed out; detached {} of {} thread(s)",
                report.detached,
                self.thread_count
            );
        } else {
            log::debug!("joined {} worker thread(s)", report.joined);
        }
        report
    }

    /// Join a thread with timeout, detach if stuck.
    fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if handle.is_finished() {
                let _ = handle.join();
                return true;
            }
            if start.elapsed() > timeout {
                drop(handle);
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    // ========================================================================
    // Worker Loop
    // ========================================================================

    fn worker_loop(job_rx: Receiver<Job>, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(AtomicOrdering::Acquire) {
            let job = match job_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(job) => job,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                log::error!(
                    "background job panicked on {}",
                    thread::current().name().unwrap_or("worker")
                );
            }
        }
    }
}

impl TaskQueue for WorkerPool {
    fn submit(&self, job: Job) -> Result<(), Job> {
        match self.job_tx.lock().as_ref() {
            Some(tx) => tx.send(job).map_err(|err| err.into_inner()),
            None => Err(job),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[test]
    fn test_jobs_run_on_named_workers() {
        let pool = WorkerPool::new(2, Duration::from_secs(2)).unwrap();
        assert_eq!(pool.thread_count(), 2);
        let (tx, rx) = mpsc::channel();
        pool.submit(Box::new(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        }))
        .unwrap_or_else(|_| panic!("pool refused job"));
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with("ferry-worker-"));
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let pool = WorkerPool::new(1, Duration::from_secs(5)).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = done.clone();
            assert!(pool
                .submit(Box::new(move || {
                    done.fetch_add(1, AtomicOrdering::SeqCst);
                }))
                .is_ok());
        }
        let report = pool.shutdown();
        assert_eq!(report, ShutdownReport { joined: 1, detached: 0 });
        assert_eq!(done.load(AtomicOrdering::SeqCst), 10);
        assert!(!pool.is_running());
    }

    #[test]
    fn test_submit_after_shutdown_is_refused() {
        let pool = WorkerPool::new(1, Duration::from_secs(1)).unwrap();
        pool.shutdown();
        assert!(pool.submit(Box::new(|| {})).is_err());
        assert_eq!(pool.shutdown(), ShutdownReport::default());
    }

    #[test]
    fn test_stuck_worker_is_detached() {
        let pool = WorkerPool::new(1, Duration::from_millis(50)).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();
        assert!(pool
            .submit(Box::new(move || {
                started_tx.send(()).unwrap();
                let _ = release_rx.recv();
            }))
            .is_ok());
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let report = pool.shutdown();
        assert_eq!(report, ShutdownReport { joined: 0, detached: 1 });
        drop(release_tx);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(1, Duration::from_secs(2)).unwrap();
        assert!(pool.submit(Box::new(|| panic!("job failed"))).is_ok());
        let (tx, rx) = mpsc::channel();
        assert!(pool
            .submit(Box::new(move || {
                tx.send(7).unwrap();
            }))
            .is_ok());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn test_from_config() {
        let config = WorkerConfig {
            threads: 3,
            shutdown_timeout_ms: 100,
        };
        let pool = WorkerPool::from_config(&config).unwrap();
        assert_eq!(pool.thread_count(), 3);
        assert_eq!(pool.shutdown().joined, 3);
    }
}
