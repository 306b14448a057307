//! Test collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use ordered_dispatch::{DispatchResult, Task, TokioBlockingPool, WorkerPool};

// ---------------------------------------------------------------------------
// Gate: blocks delivery until the test opens it
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(&self) {
        let (open, cvar) = &*self.inner;
        let mut open = open.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }

    pub fn open(&self) {
        let (open, cvar) = &*self.inner;
        *open.lock().unwrap() = true;
        cvar.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Recorder: remembers every delivered event, in delivery order
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Recorder<E> {
    seen: Arc<Mutex<Vec<E>>>,
}

impl<E: Clone> Recorder<E> {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record(&self, event: &E) {
        self.seen.lock().unwrap().push(event.clone());
    }

    pub fn events(&self) -> Vec<E> {
        self.seen.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

// ---------------------------------------------------------------------------
// CountingPool: tokio blocking pool that counts worker hand-offs
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CountingPool {
    inner: TokioBlockingPool,
    started: Arc<AtomicUsize>,
}

impl CountingPool {
    pub fn current() -> Self {
        Self {
            inner: TokioBlockingPool::current().expect("tests run inside a tokio runtime"),
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl WorkerPool for CountingPool {
    fn execute(&self, task: Task) -> DispatchResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(task)
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Poll `cond` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub const SETTLE: Duration = Duration::from_secs(10);
