//! The unit of queued work.

/// One event and the handlers that should receive it.
///
/// Built by `submit`, popped exactly once by the worker that owns its key.
#[derive(Debug, Clone)]
pub struct PendingDispatch<H, E> {
    handlers: Vec<H>,
    event: E,
}

impl<H, E> PendingDispatch<H, E> {
    pub fn new(handlers: Vec<H>, event: E) -> Self {
        Self { handlers, event }
    }

    pub fn handlers(&self) -> &[H] {
        &self.handlers
    }

    pub fn event(&self) -> &E {
        &self.event
    }
}
