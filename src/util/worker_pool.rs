//! Bounded worker pool abstraction (SPEC_FULL.md §9 design note).
//!
//! A single shape backs both network-bound pools (the Fetcher's `W_net`
//! downloads) and CPU-bound pools (the Join/Aggregate Engine's `W_cpu` chunk
//! workers): a fixed set of blocking OS threads pulling jobs off a bounded
//! `crossbeam-channel`, observing a shared cancellation flag between units of
//! work. There is no async runtime involved anywhere in this crate (§5).

use crossbeam::channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// A cooperative cancellation flag, checked by workers *between* jobs (never
/// mid-job — an in-flight unit of work is always allowed to finish).
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A bounded pool of blocking worker threads.
///
/// `Job` is boxed so the pool can be shared across call sites with different
/// job shapes; callers typically wrap a small closure capturing whatever
/// per-job context (a chunk range, a download URL) they need.
pub struct WorkerPool {
    sender: Sender<Job>,
    handles: Vec<thread::JoinHandle<()>>,
    cancel: CancelToken,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

impl WorkerPool {
    /// Spawn `size` worker threads, each pulling jobs from a queue bounded at
    /// `queue_depth`. `size` is typically `W_net` or `W_cpu` from the
    /// Resource Governor (see [`crate::governor`]).
    pub fn new(size: usize, queue_depth: usize) -> Self {
        let (sender, receiver) = bounded::<Job>(queue_depth);
        let cancel = CancelToken::new();
        let mut handles = Vec::with_capacity(size);
        for _ in 0..size {
            let receiver = receiver.clone();
            handles.push(thread::spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            }));
        }
        Self {
            sender,
            handles,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Enqueue a job. Blocks if the queue is at `queue_depth` capacity,
    /// which is the pool's natural backpressure mechanism.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.sender.send(Box::new(job));
    }

    /// Close the queue and block until every in-flight job drains.
    pub fn join(self) {
        drop(self.sender);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Default pool size for CPU-bound work: `min(num_cpus, cap)`.
pub fn default_cpu_workers(cap: usize) -> usize {
    num_cpus::get().min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_all_submitted_jobs() {
        let pool = WorkerPool::new(4, 16);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn cancel_token_is_observable_after_clone() {
        let token = CancelToken::new();
        let cloned = token.clone();
        assert!(!cloned.is_cancelled());
        token.cancel();
        assert!(cloned.is_cancelled());
    }

    #[test]
    fn default_cpu_workers_respects_cap() {
        assert!(default_cpu_workers(1) <= 1);
        assert!(default_cpu_workers(1000) >= 1);
    }
}
