//! Synchronous delivery boundary.
//!
//! A worker hands each popped dispatch to a `DeliveryExecutor` and waits for
//! it to return. The executor owns handler isolation: one failing handler
//! must not stop the rest of the set from being attempted.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, warn};

/// Delivers one event to every handler in a set, blocking until all have
/// been attempted.
pub trait DeliveryExecutor<H, E>: Send + Sync {
    fn deliver(&self, handlers: &[H], event: &E, asynchronous: bool);
}

impl<H, E, F> DeliveryExecutor<H, E> for F
where
    F: Fn(&[H], &E, bool) + Send + Sync,
{
    fn deliver(&self, handlers: &[H], event: &E, asynchronous: bool) {
        self(handlers, event, asynchronous)
    }
}

// ---------------------------------------------------------------------------
// IsolatingExecutor
// ---------------------------------------------------------------------------

/// A consumer of events.
pub trait Handler<E>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn handle(&self, event: &E, asynchronous: bool) -> Result<()>;
}

/// Shared handler descriptor accepted by `IsolatingExecutor`.
pub type SharedHandler<E> = Arc<dyn Handler<E>>;

/// Runs handlers one after another, containing errors and panics per handler.
///
/// Handlers slower than the threshold are logged. Synchronous handlers
/// cannot be preempted, so enforcing a hard deadline stays the handler's job.
#[derive(Debug, Clone)]
pub struct IsolatingExecutor {
    slow_threshold: Duration,
}

impl IsolatingExecutor {
    pub fn new(slow_threshold: Duration) -> Self {
        Self { slow_threshold }
    }
}

impl<E> DeliveryExecutor<SharedHandler<E>, E> for IsolatingExecutor {
    fn deliver(&self, handlers: &[SharedHandler<E>], event: &E, asynchronous: bool) {
        for handler in handlers {
            let started = Instant::now();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event, asynchronous)));
            let elapsed = started.elapsed();

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(handler = handler.name(), error = %e, "Handler failed");
                }
                Err(payload) => {
                    error!(
                        handler = handler.name(),
                        panic = panic_message(&*payload),
                        "Handler panicked"
                    );
                }
            }

            if elapsed > self.slow_threshold {
                warn!(
                    handler = handler.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    threshold_ms = self.slow_threshold.as_millis() as u64,
                    "Slow handler"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
