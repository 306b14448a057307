//! Worker pool boundary.
//!
//! The scheduler never creates threads itself. It hands each worker to a
//! `WorkerPool`, which must run it somewhere other than the calling thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::{DispatchError, DispatchResult};

/// A unit of work handed to the pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks eventually, on some thread other than the caller's.
///
/// Implementations may refuse a task; the refusal is returned to whoever
/// called `submit`. A refused task must be dropped, not run.
///
/// `execute` is called while the submitting key's lock is held, so it must
/// return promptly: a slow `execute` stalls every producer on that key. A
/// pool that runs the task on the calling thread deadlocks, because the
/// worker's first step takes that same lock.
pub trait WorkerPool: Send + Sync {
    fn execute(&self, task: Task) -> DispatchResult<()>;
}

impl<P: WorkerPool + ?Sized> WorkerPool for Arc<P> {
    fn execute(&self, task: Task) -> DispatchResult<()> {
        (**self).execute(task)
    }
}

// ---------------------------------------------------------------------------
// TokioBlockingPool
// ---------------------------------------------------------------------------

/// Runs tasks on a tokio runtime's blocking thread pool.
///
/// Workers call the delivery executor synchronously, so they belong on the
/// blocking pool rather than on async worker threads.
#[derive(Debug, Clone)]
pub struct TokioBlockingPool {
    handle: Handle,
}

impl TokioBlockingPool {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Pool bound to the runtime the caller is running in.
    pub fn current() -> DispatchResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| DispatchError::NoRuntime)
    }
}

impl WorkerPool for TokioBlockingPool {
    fn execute(&self, task: Task) -> DispatchResult<()> {
        // Dropping the JoinHandle detaches the task; it still runs.
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BoundedPool
// ---------------------------------------------------------------------------

/// Caps how many tasks may run at once on an inner pool.
///
/// Over the cap, `execute` rejects instead of queueing. A slot frees when
/// its task returns or unwinds.
pub struct BoundedPool<P> {
    inner: P,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

impl<P: WorkerPool> BoundedPool<P> {
    pub fn new(inner: P, max_in_flight: usize) -> Self {
        Self {
            inner,
            max_in_flight,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl<P: WorkerPool> WorkerPool for BoundedPool<P> {
    fn execute(&self, task: Task) -> DispatchResult<()> {
        let max = self.max_in_flight;
        let claimed = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            });
        if claimed.is_err() {
            return Err(DispatchError::PoolRejected(format!(
                "{max} tasks already in flight"
            )));
        }

        let slot = Slot(self.in_flight.clone());
        // If the inner pool rejects, it drops the closure and the slot with it.
        self.inner.execute(Box::new(move || {
            let _slot = slot;
            task();
        }))
    }
}

struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
