//! Dependency ordering and cycle detection
//!
//! [`Graph::sort`] computes the sortlist: every node appears after the
//! producers feeding its inputs. The ordering pass is a depth-first walk over
//! input connections using two node flags:
//!
//! ```text
//!   SORT_TAG   node fully or partially processed by this sort
//!   CYCLE_TAG  node is on the current walk path
//! ```
//!
//! Reaching a node whose CYCLE_TAG is still set means the walk came back to
//! its own path, so the graph is cyclic. A second, independent walk over
//! output connections then looks for any cycle the first pass could not see.
//! When the graph is not flagged cyclic afterwards, the sortlist is a valid
//! dependency-first order.
//!
//! Both walks use explicit stacks, so deep chains cannot overflow the call
//! stack.

use crate::flags::{GraphFlags, NodeFlags};
use crate::graph::Graph;
use crate::ids::NodeId;
use crate::socket::Direction;
use std::collections::HashSet;

/// A walk frame: node, its neighbors, and the next neighbor to visit
type Frame = (NodeId, Vec<NodeId>, usize);

impl<C> Graph<C> {
    /// Owners of the sockets connected to `id`'s sockets of one direction
    fn neighbors(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        let Some(node) = self.node_map.get(&id) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for socket in node.sockets(direction).iter() {
            for peer in socket.peers() {
                match self.socket_owner(*peer) {
                    Some(owner) => found.push(owner),
                    None => tracing::warn!(node = %id, peer = %peer, "Dependency graph corruption: dangling connection"),
                }
            }
        }
        found
    }

    /// Nodes feeding `id`'s inputs, one entry per connection
    pub(crate) fn producers(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Input)
    }

    /// Nodes consuming `id`'s outputs, one entry per connection
    pub(crate) fn consumers(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Output)
    }

    fn node_flags(&self, id: NodeId) -> Option<NodeFlags> {
        self.node_map.get(&id).map(|n| n.flags)
    }

    fn tag(&mut self, id: NodeId, tags: NodeFlags, on: bool) {
        if let Some(node) = self.node_map.get_mut(&id) {
            node.flags.set(tags, on);
        }
    }

    /// Recompute the dependency order and the CYCLIC flag
    ///
    /// Clears RESORT. Called automatically by the exec entry points when the
    /// graph was flagged for resort.
    pub fn sort(&mut self) {
        self.flags.remove(GraphFlags::CYCLIC);
        for node in self.node_map.values_mut() {
            node.flags.remove(NodeFlags::SCHEDULER_TAGS);
        }

        let mut sortlist = Vec::with_capacity(self.nodes.len());
        let mut cyclic = false;
        for root in self.nodes.clone() {
            self.sort_from(root, &mut sortlist, &mut cyclic);
        }
        self.sortlist = sortlist;

        if !cyclic {
            if let Some(node) = self.find_cycle_forward() {
                tracing::warn!(node = %node, "Graph cycle detected by forward search");
                cyclic = true;
            }
        }
        self.flags.set(GraphFlags::CYCLIC, cyclic);
        self.flags.remove(GraphFlags::RESORT);
        tracing::debug!(nodes = self.sortlist.len(), cyclic, "Sorted graph");
    }

    fn sort_from(&mut self, root: NodeId, sortlist: &mut Vec<NodeId>, cyclic: &mut bool) {
        match self.node_flags(root) {
            Some(flags) if !flags.contains(NodeFlags::SORT_TAG) => {}
            _ => return,
        }
        self.tag(root, NodeFlags::SCHEDULER_TAGS, true);
        let mut stack: Vec<Frame> = vec![(root, self.producers(root), 0)];

        loop {
            let next = match stack.last_mut() {
                None => break,
                Some((_, deps, i)) if *i < deps.len() => {
                    *i += 1;
                    Some(deps[*i - 1])
                }
                Some(_) => None,
            };

            match next {
                Some(dep) => {
                    let Some(flags) = self.node_flags(dep) else {
                        continue;
                    };
                    if flags.contains(NodeFlags::CYCLE_TAG) {
                        tracing::warn!(node = %dep, "Graph cycle detected");
                        *cyclic = true;
                        self.tag(dep, NodeFlags::CYCLE_TAG, false);
                        continue;
                    }
                    if flags.contains(NodeFlags::SORT_TAG) {
                        continue;
                    }
                    self.tag(dep, NodeFlags::SCHEDULER_TAGS, true);
                    let deps = self.producers(dep);
                    stack.push((dep, deps, 0));
                }
                None => {
                    if let Some((id, _, _)) = stack.pop() {
                        sortlist.push(id);
                        self.tag(id, NodeFlags::CYCLE_TAG, false);
                    }
                }
            }
        }
    }

    /// Walk output connections looking for a back edge
    ///
    /// Returns the first node found on its own path.
    fn find_cycle_forward(&mut self) -> Option<NodeId> {
        let mut finished = HashSet::with_capacity(self.nodes.len());
        for root in self.nodes.clone() {
            if finished.contains(&root) {
                continue;
            }
            self.tag(root, NodeFlags::CYCLE_TAG, true);
            let mut stack: Vec<Frame> = vec![(root, self.consumers(root), 0)];

            loop {
                let next = match stack.last_mut() {
                    None => break,
                    Some((_, next, i)) if *i < next.len() => {
                        *i += 1;
                        Some(next[*i - 1])
                    }
                    Some(_) => None,
                };

                match next {
                    Some(node) => {
                        let Some(flags) = self.node_flags(node) else {
                            continue;
                        };
                        if flags.contains(NodeFlags::CYCLE_TAG) {
                            for (id, _, _) in stack.drain(..) {
                                self.tag(id, NodeFlags::CYCLE_TAG, false);
                            }
                            return Some(node);
                        }
                        if finished.contains(&node) {
                            continue;
                        }
                        self.tag(node, NodeFlags::CYCLE_TAG, true);
                        let next = self.consumers(node);
                        stack.push((node, next, 0));
                    }
                    None => {
                        if let Some((id, _, _)) = stack.pop() {
                            self.tag(id, NodeFlags::CYCLE_TAG, false);
                            finished.insert(id);
                        }
                    }
                }
            }
        }
        None
    }
}
