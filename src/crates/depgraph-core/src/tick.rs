//! Tick scheduling handle
//!
//! Value changes never run the graph directly. They ask the host to schedule
//! an exec pass through a [`TickScheduler`], and the host decides when (next
//! frame, idle callback, end of a batch of edits) to call
//! [`Graph::exec`](crate::Graph::exec).

use std::cell::Cell;
use std::fmt;

/// Host hook asked to schedule a future exec pass
///
/// Requests may arrive many times per pass; implementations should coalesce
/// them.
pub trait TickScheduler: fmt::Debug {
    /// Ask for an exec pass
    fn request_tick(&self);
}

/// Scheduler that records requests for the host to poll
///
/// ```rust
/// use depgraph_core::tick::{PendingTick, TickScheduler};
///
/// let tick = PendingTick::default();
/// tick.request_tick();
/// tick.request_tick();
/// assert!(tick.take());
/// assert!(!tick.take());
/// assert_eq!(tick.requests(), 2);
/// ```
#[derive(Debug, Default)]
pub struct PendingTick {
    pending: Cell<bool>,
    total: Cell<u64>,
}

impl PendingTick {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a request arrived since the last [`take`](Self::take)
    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    /// Clear the pending request, returning whether there was one
    pub fn take(&self) -> bool {
        self.pending.replace(false)
    }

    /// Number of requests received so far
    pub fn requests(&self) -> u64 {
        self.total.get()
    }
}

impl TickScheduler for PendingTick {
    fn request_tick(&self) {
        self.pending.set(true);
        self.total.set(self.total.get() + 1);
    }
}
