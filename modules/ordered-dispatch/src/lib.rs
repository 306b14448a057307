//! Ordered asynchronous event dispatch.
//!
//! Producers `submit` events under an ordering key and return immediately.
//! Events sharing a key reach their handlers in submission order; events
//! under different keys are delivered in parallel.
//!
//! Consumers plug in a `DeliveryExecutor` (runs the handlers for one event)
//! and a `WorkerPool` (runs workers off the producer's thread). Which
//! handlers an event goes to is decided before `submit`.

pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod key;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod singleflight;
mod worker;

pub use config::{load_config, DispatchConfig};
pub use delivery::{DeliveryExecutor, Handler, IsolatingExecutor, SharedHandler};
pub use dispatch::PendingDispatch;
pub use error::{DispatchError, DispatchResult};
pub use key::{OrderingKey, ThreadKey};
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use pool::{BoundedPool, Task, TokioBlockingPool, WorkerPool};
pub use registry::{ActiveQueue, KeyRegistry};
pub use scheduler::Scheduler;
pub use singleflight::SingleFlight;
