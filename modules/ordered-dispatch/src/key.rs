//! Ordering keys.
//!
//! Any hashable, cloneable value can key a delivery domain. Events submitted
//! under equal keys are delivered in submission order; distinct keys share
//! nothing.

use std::fmt::Debug;
use std::hash::Hash;
use std::thread::{self, ThreadId};

/// Bound satisfied by every type usable as an ordering key.
pub trait OrderingKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> OrderingKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Orders events by the identity of the producing thread.
///
/// Use this when every thread is its own producer context and you want
/// per-thread FIFO without threading a correlation id through callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadKey(ThreadId);

impl ThreadKey {
    /// Key for the calling thread.
    pub fn current() -> Self {
        Self(thread::current().id())
    }
}
