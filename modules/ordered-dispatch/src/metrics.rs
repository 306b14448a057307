//! Posted/delivered counters.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Process-lifetime dispatch counters.
///
/// Each counter starts over at zero instead of overflowing. The two counters
/// are read independently, so a snapshot taken mid-delivery may briefly show
/// them out of step.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    posted: AtomicU64,
    delivered: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an accepted event. Returns the new value.
    pub fn record_posted(&self) -> u64 {
        increment_or_reset(&self.posted)
    }

    /// Count an event whose handler set has been fully attempted.
    pub fn record_delivered(&self) -> u64 {
        increment_or_reset(&self.delivered)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            posted_count: self.posted.load(Ordering::Acquire),
            delivered_count: self.delivered.load(Ordering::Acquire),
            captured_at: Utc::now(),
        }
    }

    #[cfg(test)]
    fn with_counts(posted: u64, delivered: u64) -> Self {
        Self {
            posted: AtomicU64::new(posted),
            delivered: AtomicU64::new(delivered),
        }
    }
}

/// Point-in-time read of the dispatch counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub posted_count: u64,
    pub delivered_count: u64,
    pub captured_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    pub fn captured_at_millis(&self) -> u64 {
        u64::try_from(self.captured_at.timestamp_millis()).unwrap_or(0)
    }

    /// Events accepted but not yet delivered, as far as this snapshot can tell.
    pub fn in_flight(&self) -> u64 {
        self.posted_count.saturating_sub(self.delivered_count)
    }
}

/// Adds one, starting over at zero when the counter would overflow.
fn increment_or_reset(counter: &AtomicU64) -> u64 {
    let step = |n: u64| n.checked_add(1).unwrap_or(0);
    match counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(step(n))) {
        Ok(prev) | Err(prev) => step(prev),
    }
}
