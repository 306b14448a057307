//! The submit entry point.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::delivery::DeliveryExecutor;
use crate::dispatch::PendingDispatch;
use crate::error::DispatchResult;
use crate::key::{OrderingKey, ThreadKey};
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::pool::WorkerPool;
use crate::registry::KeyRegistry;
use crate::worker;

/// State shared between the scheduler handle and its workers.
pub(crate) struct Shared<K, H, E> {
    pub(crate) registry: KeyRegistry<K, H, E>,
    pub(crate) metrics: DispatchMetrics,
    pub(crate) delivery: Arc<dyn DeliveryExecutor<H, E>>,
    pub(crate) pool: Arc<dyn WorkerPool>,
}

/// Ordered asynchronous event scheduler.
///
/// `submit` queues an event under an ordering key and returns without
/// waiting for delivery. Each key with pending work has exactly one worker,
/// which delivers that key's events in submission order. Different keys are
/// delivered in parallel.
///
/// Cloning is cheap; clones share the registry, counters, and collaborators.
pub struct Scheduler<K, H, E> {
    shared: Arc<Shared<K, H, E>>,
}

impl<K, H, E> Clone for Scheduler<K, H, E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<K, H, E> Scheduler<K, H, E>
where
    K: OrderingKey,
    H: Send + 'static,
    E: Send + 'static,
{
    pub fn new<D, P>(delivery: D, pool: P) -> Self
    where
        D: DeliveryExecutor<H, E> + 'static,
        P: WorkerPool + 'static,
    {
        Self::from_parts(Arc::new(delivery), Arc::new(pool))
    }

    /// Build from collaborators that are already shared elsewhere.
    pub fn from_parts(
        delivery: Arc<dyn DeliveryExecutor<H, E>>,
        pool: Arc<dyn WorkerPool>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: KeyRegistry::new(),
                metrics: DispatchMetrics::new(),
                delivery,
                pool,
            }),
        }
    }

    /// Queue `event` for delivery to `handlers`, ordered after every earlier
    /// submission under `key`.
    ///
    /// Blocks only long enough to append to the key's queue. If the key has
    /// no worker yet, one is handed to the pool; a pool rejection is returned
    /// here and the event is dropped. An empty handler set is accepted and
    /// ignored.
    pub fn submit(&self, key: K, handlers: Vec<H>, event: E) -> DispatchResult<()> {
        if handlers.is_empty() {
            trace!(key = ?key, "No handlers, skipping dispatch");
            return Ok(());
        }

        self.shared.metrics.record_posted();
        let dispatch = PendingDispatch::new(handlers, event);

        loop {
            let entry = self.shared.registry.acquire(&key);
            let mut state = entry.lock();
            if state.retired {
                // Lost a race with the worker retiring this entry.
                continue;
            }

            state.queue.push_back(dispatch);
            if state.has_worker {
                return Ok(());
            }

            state.has_worker = true;
            // The pool runs the worker elsewhere; it blocks on this lock
            // until we return.
            return match worker::start(&self.shared, entry.clone()) {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!(key = ?key, error = %e, "Worker pool rejected dispatch");
                    state.queue.clear();
                    self.shared.registry.retire(&entry, &mut state);
                    Err(e)
                }
            };
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn registry(&self) -> &KeyRegistry<K, H, E> {
        &self.shared.registry
    }

    /// Keys that currently have a worker draining them.
    pub fn active_keys(&self) -> Vec<K> {
        self.shared.registry.active_keys()
    }
}

impl<H, E> Scheduler<ThreadKey, H, E>
where
    H: Send + 'static,
    E: Send + 'static,
{
    /// Submit ordered by the calling thread's identity.
    pub fn submit_from_current_thread(&self, handlers: Vec<H>, event: E) -> DispatchResult<()> {
        self.submit(ThreadKey::current(), handlers, event)
    }
}
