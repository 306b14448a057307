//! The per-key delivery loop.
//!
//! A worker owns one key from hand-off until retirement. It keeps popping
//! and delivering without returning to the pool between items, and retires
//! only after observing the queue empty under the key's lock.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::DispatchResult;
use crate::key::OrderingKey;
use crate::registry::ActiveQueue;
use crate::scheduler::Shared;

/// Hand a worker for `entry` to the pool.
///
/// Callers hold `entry`'s lock and have already set `has_worker`.
pub(crate) fn start<K, H, E>(
    shared: &Arc<Shared<K, H, E>>,
    entry: Arc<ActiveQueue<K, H, E>>,
) -> DispatchResult<()>
where
    K: OrderingKey,
    H: Send + 'static,
    E: Send + 'static,
{
    let worker = Worker {
        shared: shared.clone(),
        entry,
    };
    shared.pool.execute(Box::new(move || worker.run()))
}

struct Worker<K, H, E> {
    shared: Arc<Shared<K, H, E>>,
    entry: Arc<ActiveQueue<K, H, E>>,
}

impl<K, H, E> Worker<K, H, E>
where
    K: OrderingKey,
    H: Send + 'static,
    E: Send + 'static,
{
    /// Drains the key to empty. A panicking delivery does not stop the
    /// drain; the first panic is re-raised once the key has been retired.
    fn run(self) {
        let key = self.entry.key();
        debug!(key = ?key, "Worker started");

        let mut delivered: u64 = 0;
        let mut first_panic: Option<Box<dyn Any + Send>> = None;

        loop {
            let dispatch = {
                let mut state = self.entry.lock();
                match state.queue.pop_front() {
                    Some(dispatch) => dispatch,
                    None => {
                        self.shared.registry.retire(&self.entry, &mut state);
                        break;
                    }
                }
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.shared
                    .delivery
                    .deliver(dispatch.handlers(), dispatch.event(), true)
            }));
            match outcome {
                Ok(()) => {
                    self.shared.metrics.record_delivered();
                    delivered += 1;
                }
                Err(payload) => {
                    error!(key = ?key, "Delivery panicked, continuing with the rest of the queue");
                    first_panic.get_or_insert(payload);
                }
            }
        }

        debug!(key = ?key, delivered, "Worker retired");

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }
}
