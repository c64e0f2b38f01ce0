//! Graph-scoped identifiers and the monotonic allocator that issues them.
//!
//! Nodes and sockets draw from one shared counter so an id names exactly one
//! entity per graph. Ids are never recycled: removing a node retires its ids
//! for the lifetime of the graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node attached to a [`Graph`](crate::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

/// Identifier of a socket attached to a [`Graph`](crate::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id allocator shared by a graph's nodes and sockets.
///
/// The allocator is plain data so it can be copied alongside a graph copy and
/// persisted with the graph's save shape.
///
/// # Examples
///
/// ```rust
/// use depgraph_core::ids::IdGen;
///
/// let mut ids = IdGen::new();
/// assert_eq!(ids.next_id(), 0);
/// assert_eq!(ids.next_id(), 1);
///
/// ids.ensure_above(10);
/// assert_eq!(ids.next_id(), 11);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGen {
    next: u64,
}

impl IdGen {
    /// Largest id value; saves that use it are treated as corrupt
    pub const MAX: u64 = u64::MAX;

    /// Create an allocator starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator whose next id is `next`
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// Issue the next id
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }

    /// The value the next call to [`next_id`](Self::next_id) will return
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Make sure ids already in use up to `used` are never issued again
    ///
    /// Returns false, leaving the allocator untouched, when `used` is
    /// [`IdGen::MAX`]: no id above it exists.
    pub fn ensure_above(&mut self, used: u64) -> bool {
        match used.checked_add(1) {
            Some(next) => {
                if self.next < next {
                    self.next = next;
                }
                true
            }
            None => false,
        }
    }
}
