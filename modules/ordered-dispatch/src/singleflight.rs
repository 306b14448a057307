//! Deduplicated loads by key.
//!
//! The first caller for a key runs the loader; callers that arrive while it
//! is running wait for its result instead of loading again. A waiter gives
//! up and loads on its own if the leader fails or takes longer than the
//! configured wait. This favours eventually getting a value over strictly
//! one loader per key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::key::OrderingKey;

/// Wait applied when none is configured.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

struct Flight<V> {
    id: u64,
    result: watch::Receiver<Option<V>>,
}

enum Role<V> {
    Leader { id: u64, publish: watch::Sender<Option<V>> },
    Follower(watch::Receiver<Option<V>>),
}

/// Coalesces concurrent loads of the same key.
pub struct SingleFlight<K, V> {
    flights: Mutex<HashMap<K, Flight<V>>>,
    next_id: AtomicU64,
    wait_timeout: Duration,
}

impl<K, V> SingleFlight<K, V>
where
    K: OrderingKey,
    V: Clone + Send + Sync,
{
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            wait_timeout,
        }
    }

    /// Keys with a leader currently loading.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Load `key`, sharing the result with concurrent callers for the same key.
    ///
    /// Only successful results are shared. Errors go back to the caller that
    /// produced them.
    pub async fn load<F, Fut, LoadErr>(&self, key: K, loader: F) -> Result<V, LoadErr>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, LoadErr>>,
    {
        match self.join(&key) {
            Role::Leader { id, publish } => {
                let _landing = Landing {
                    flights: self,
                    key: &key,
                    id,
                };
                let result = loader().await;
                if let Ok(value) = &result {
                    publish.send_replace(Some(value.clone()));
                }
                result
            }
            Role::Follower(mut result) => {
                let waited = tokio::time::timeout(self.wait_timeout, result.wait_for(Option::is_some));
                let shared = match waited.await {
                    Ok(Ok(value)) => value.clone(),
                    Ok(Err(_)) => {
                        debug!(key = ?key, "Leader load failed, loading directly");
                        None
                    }
                    Err(_) => {
                        warn!(
                            key = ?key,
                            wait_ms = self.wait_timeout.as_millis() as u64,
                            "Leader load still running, loading anyway"
                        );
                        None
                    }
                };
                match shared {
                    Some(value) => Ok(value),
                    None => loader().await,
                }
            }
        }
    }

    fn join(&self, key: &K) -> Role<V> {
        let mut flights = self.lock();
        if let Some(flight) = flights.get(key) {
            return Role::Follower(flight.result.clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (publish, result) = watch::channel(None);
        flights.insert(key.clone(), Flight { id, result });
        Role::Leader { id, publish }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Flight<V>>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: OrderingKey,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new(DEFAULT_WAIT)
    }
}

/// Clears the leader's flight when it finishes, fails, or is cancelled.
struct Landing<'a, K, V>
where
    K: OrderingKey,
    V: Clone + Send + Sync,
{
    flights: &'a SingleFlight<K, V>,
    key: &'a K,
    id: u64,
}

impl<K, V> Drop for Landing<'_, K, V>
where
    K: OrderingKey,
    V: Clone + Send + Sync,
{
    fn drop(&mut self) {
        let mut flights = self.flights.lock();
        if flights.get(self.key).is_some_and(|f| f.id == self.id) {
            flights.remove(self.key);
        }
    }
}
