//! Key registry: one active queue per ordering key.
//!
//! An entry exists exactly while a worker owns its key. Each entry carries
//! its own lock; appending, popping, and the empty-check-then-deregister step
//! all happen under it, so a submission can never land in a queue whose
//! worker has already decided to leave.
//!
//! Lock order is entry lock, then map shard. Callers never hold a map shard
//! while taking an entry lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;

use crate::dispatch::PendingDispatch;
use crate::key::OrderingKey;

/// Queue contents guarded by the entry lock.
pub(crate) struct QueueState<H, E> {
    pub(crate) queue: VecDeque<PendingDispatch<H, E>>,
    pub(crate) has_worker: bool,
    /// Set once the entry has been removed from the registry. Submitters
    /// that find a retired entry must fetch a fresh one.
    pub(crate) retired: bool,
}

/// The pending work for one ordering key.
pub struct ActiveQueue<K, H, E> {
    key: K,
    state: Mutex<QueueState<H, E>>,
}

impl<K, H, E> ActiveQueue<K, H, E> {
    fn new(key: K) -> Self {
        Self {
            key,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                has_worker: false,
                retired: false,
            }),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Dispatches queued but not yet popped.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    // Nothing panics while the lock is held, so a poisoned lock still guards
    // consistent state.
    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState<H, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Concurrent map from ordering key to its active queue.
pub struct KeyRegistry<K, H, E> {
    entries: DashMap<K, Arc<ActiveQueue<K, H, E>>>,
}

impl<K: OrderingKey, H, E> KeyRegistry<K, H, E> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Entry for `key`, created if absent. The map shard is released before
    /// this returns.
    pub(crate) fn acquire(&self, key: &K) -> Arc<ActiveQueue<K, H, E>> {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ActiveQueue::new(key.clone())))
            .value()
            .clone()
    }

    /// Deregister `entry`. Requires `entry`'s lock, proven by `state`.
    ///
    /// Removes the map slot only if it still points at this entry.
    pub(crate) fn retire(&self, entry: &Arc<ActiveQueue<K, H, E>>, state: &mut QueueState<H, E>) {
        state.retired = true;
        state.has_worker = false;
        self.entries
            .remove_if(entry.key(), |_, current| Arc::ptr_eq(current, entry));
    }

    /// Keys that currently have a worker.
    pub fn active_keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: OrderingKey, H, E> Default for KeyRegistry<K, H, E> {
    fn default() -> Self {
        Self::new()
    }
}
