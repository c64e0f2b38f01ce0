//! The node graph: arena, identity and connections
//!
//! A [`Graph`] owns its nodes in an arena keyed by [`NodeId`]. Sockets are
//! reached through an index from [`SocketId`] to the owning node, direction
//! and key, so every cross-reference in the graph is an id resolved here.
//!
//! # Graph Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Graph                            │
//! │                                                          │
//! │  nodes:  [n0, n1, n2]           (list order)             │
//! │                                                          │
//! │   ┌──────────┐ out ──────► in ┌──────────┐               │
//! │   │ n0: src  │                │ n1: add  │ out ──┐       │
//! │   └──────────┘        ┌────► in└──────────┘      │       │
//! │   ┌──────────┐ out ───┘                          ▼       │
//! │   │ n2: src  │                         (more consumers)  │
//! │   └──────────┘                                           │
//! │                                                          │
//! │  socket_index: SocketId ─► { node, direction, key }      │
//! │  id_gen: shared, monotonic; ids are never reused         │
//! │  flags: RESORT | CYCLIC | CYCLIC_ALLOWED                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Change Propagation
//!
//! Writing a socket with [`Graph::set_and_update`] flags the socket, pushes
//! the value to every connected peer and marks the peers' owners dirty. It
//! then asks the [`TickScheduler`] for an exec pass; it never runs nodes
//! itself. Structural edits (add, remove, connect, disconnect) mark the graph
//! for resort, and the next exec recomputes the dependency order.
//!
//! # Examples
//!
//! ```rust
//! use depgraph_core::{Graph, NodeDef, NodeRegistry, Socket};
//! use depgraph_core::sockets::FloatSocket;
//! use serde_json::json;
//!
//! let mut registry = NodeRegistry::<()>::new();
//! registry.register_default(
//!     NodeDef::new("value")
//!         .input("in", Socket::new(FloatSocket::new(0.0)))
//!         .output("out", Socket::new(FloatSocket::new(0.0))),
//! ).unwrap();
//!
//! let mut graph = Graph::new();
//! let a = graph.add(registry.create("value").unwrap()).unwrap();
//! let b = graph.add(registry.create("value").unwrap()).unwrap();
//! assert!(graph.link(a, "out", b, "in"));
//!
//! let out = graph.socket_id(a, depgraph_core::Direction::Output, "out").unwrap();
//! graph.set_and_update(out, &json!(2.5), false).unwrap();
//!
//! let input = graph.socket_id(b, depgraph_core::Direction::Input, "in").unwrap();
//! assert_eq!(graph.socket(input).unwrap().value(), json!(2.5));
//! assert!(graph.node(b).unwrap().is_dirty());
//! ```

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::flags::{GraphFlags, NodeFlags, SocketFlags};
use crate::ids::{IdGen, NodeId, SocketId};
use crate::node::Node;
use crate::socket::{Direction, Socket};
use crate::tick::{PendingTick, TickScheduler};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Where an attached socket lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketLoc {
    pub node: NodeId,
    pub direction: Direction,
    pub key: String,
}

/// A dependency graph of nodes connected through sockets
///
/// `C` is the host's exec context, handed to every node behavior by
/// [`Graph::exec`].
pub struct Graph<C> {
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) node_map: HashMap<NodeId, Node<C>>,
    pub(crate) socket_index: HashMap<SocketId, SocketLoc>,
    pub(crate) id_gen: IdGen,
    pub(crate) sortlist: Vec<NodeId>,
    pub(crate) flags: GraphFlags,
    pub(crate) config: GraphConfig,
    revision: u64,
    scheduler: Rc<dyn TickScheduler>,
    selected: Vec<NodeId>,
    active: Option<NodeId>,
    highlight: Option<NodeId>,
}

impl<C> fmt::Debug for Graph<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes)
            .field("sockets", &self.socket_index.len())
            .field("flags", &self.flags)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl<C> Default for Graph<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Graph<C> {
    /// Create an empty graph with default configuration
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create an empty graph
    pub fn with_config(config: GraphConfig) -> Self {
        let mut flags = GraphFlags::RESORT;
        flags.set(GraphFlags::CYCLIC_ALLOWED, config.cyclic_allowed);
        Self {
            nodes: Vec::new(),
            node_map: HashMap::new(),
            socket_index: HashMap::new(),
            id_gen: IdGen::new(),
            sortlist: Vec::new(),
            flags,
            config,
            revision: 0,
            scheduler: Rc::new(PendingTick::default()),
            selected: Vec::new(),
            active: None,
            highlight: None,
        }
    }

    /// Use a host scheduler for tick requests
    pub fn with_scheduler(mut self, scheduler: Rc<dyn TickScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn set_scheduler(&mut self, scheduler: Rc<dyn TickScheduler>) {
        self.scheduler = scheduler;
    }

    pub fn scheduler(&self) -> &Rc<dyn TickScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Allow or forbid cyclic execution
    pub fn set_cyclic_allowed(&mut self, allowed: bool) {
        self.config.cyclic_allowed = allowed;
        self.flags.set(GraphFlags::CYCLIC_ALLOWED, allowed);
    }

    pub fn flags(&self) -> GraphFlags {
        self.flags
    }

    /// True when the last sort found a cycle
    pub fn is_cyclic(&self) -> bool {
        self.flags.contains(GraphFlags::CYCLIC)
    }

    pub fn needs_resort(&self) -> bool {
        self.flags.contains(GraphFlags::RESORT)
    }

    /// The id allocator
    pub fn id_gen(&self) -> &IdGen {
        &self.id_gen
    }

    /// Counter bumped by structural changes and [`signal_ui`](Self::signal_ui)
    ///
    /// Editors compare it against the value they last drew.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Tell observers that something visible changed
    pub fn signal_ui(&mut self) {
        self.revision += 1;
    }

    /// Invalidate the cached sortlist
    pub fn flag_resort(&mut self) {
        self.flags.insert(GraphFlags::RESORT);
        self.revision += 1;
    }

    pub(crate) fn request_tick(&self) {
        tracing::trace!("Tick requested");
        self.scheduler.request_tick();
    }

    // ---- nodes ----

    pub fn has(&self, id: NodeId) -> bool {
        self.node_map.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node<C>> {
        self.node_map.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node<C>> {
        self.node_map.get_mut(&id)
    }

    /// Node ids in list order
    pub fn node_ids(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Nodes in list order
    pub fn nodes(&self) -> impl Iterator<Item = &Node<C>> {
        self.nodes.iter().filter_map(move |id| self.node_map.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dependency-first order computed by the last sort
    pub fn sortlist(&self) -> &[NodeId] {
        &self.sortlist
    }

    /// Attach a detached node, returning its new id
    ///
    /// The node and each of its sockets draw fresh ids. A node that already
    /// carries an id belongs to some graph; it is rejected with a warning.
    pub fn add(&mut self, mut node: Node<C>) -> Option<NodeId> {
        if let Some(id) = node.id {
            tracing::warn!(node = %id, "Node is already attached to a graph");
            return None;
        }

        let id = NodeId(self.id_gen.next_id());
        node.id = Some(id);
        for direction in [Direction::Input, Direction::Output] {
            for socket in node.sockets_mut(direction).iter_mut() {
                let socket_id = SocketId(self.id_gen.next_id());
                socket.id = Some(socket_id);
                socket.owner = Some(id);
                socket.direction = direction;
                socket.peers.clear();
                self.socket_index.insert(
                    socket_id,
                    SocketLoc {
                        node: id,
                        direction,
                        key: socket.key.clone(),
                    },
                );
            }
        }

        node.graph_update();
        tracing::debug!(node = %id, node_type = %node.type_name(), "Added node");
        self.node_map.insert(id, node);
        self.nodes.push(id);
        self.flag_resort();
        Some(id)
    }

    /// Detach a node, returning it to the caller
    ///
    /// Every connection of the node is removed first, and the node and its
    /// sockets lose their ids.
    pub fn remove(&mut self, id: NodeId) -> Option<Node<C>> {
        let socket_ids: Vec<SocketId> = match self.node_map.get(&id) {
            Some(node) => node.all_sockets().filter_map(Socket::id).collect(),
            None => {
                tracing::warn!(node = %id, "Cannot remove node: not attached to this graph");
                return None;
            }
        };

        for socket_id in &socket_ids {
            self.disconnect_all(*socket_id);
        }
        for socket_id in &socket_ids {
            self.socket_index.remove(socket_id);
        }

        let mut node = self.node_map.remove(&id)?;
        self.nodes.retain(|n| *n != id);
        self.sortlist.retain(|n| *n != id);
        self.selected.retain(|n| *n != id);
        if self.active == Some(id) {
            self.active = None;
        }
        if self.highlight == Some(id) {
            self.highlight = None;
        }

        node.detach();
        tracing::debug!(node = %id, "Removed node");
        self.flag_resort();
        Some(node)
    }

    /// Remove every node
    pub fn clear(&mut self) {
        for id in self.nodes.clone() {
            self.remove(id);
        }
    }

    /// Mark a node as needing execution and request a tick
    pub fn node_update(&mut self, id: NodeId) {
        match self.node_map.get_mut(&id) {
            Some(node) => {
                node.graph_update();
                self.request_tick();
            }
            None => tracing::warn!(node = %id, "Update requested for unknown node"),
        }
    }

    /// Enable or disable a node
    ///
    /// Disabled nodes are skipped by every exec mode.
    pub fn set_disabled(&mut self, id: NodeId, disabled: bool) {
        if let Some(node) = self.node_map.get_mut(&id) {
            node.flags.set(NodeFlags::DISABLED, disabled);
            if !disabled {
                node.graph_update();
            }
            self.request_tick();
        }
    }

    pub(crate) fn dirty_node(&mut self, id: NodeId) {
        if let Some(node) = self.node_map.get_mut(&id) {
            node.graph_update();
        }
    }

    // ---- sockets ----

    /// Location of an attached socket
    pub fn socket_loc(&self, id: SocketId) -> Option<&SocketLoc> {
        self.socket_index.get(&id)
    }

    pub fn socket(&self, id: SocketId) -> Option<&Socket> {
        let loc = self.socket_index.get(&id)?;
        self.node_map.get(&loc.node)?.sockets(loc.direction).get(&loc.key)
    }

    pub fn socket_mut(&mut self, id: SocketId) -> Option<&mut Socket> {
        let loc = self.socket_index.get(&id)?;
        self.node_map
            .get_mut(&loc.node)?
            .sockets_mut(loc.direction)
            .get_mut(&loc.key)
    }

    /// Id of a node's socket by direction and key
    pub fn socket_id(&self, node: NodeId, direction: Direction, key: &str) -> Option<SocketId> {
        self.node_map.get(&node)?.sockets(direction).get(key)?.id
    }

    /// Owner of an attached socket
    pub fn socket_owner(&self, id: SocketId) -> Option<NodeId> {
        self.socket_index.get(&id).map(|loc| loc.node)
    }

    /// True when `a` lists `b` as a peer
    pub fn socket_has(&self, a: SocketId, b: SocketId) -> bool {
        self.socket(a).is_some_and(|s| s.peers.contains(&b))
    }

    /// Connect an output and an input
    ///
    /// Returns `false` (with a log entry) when either socket is unattached,
    /// both share a direction, or they are already connected. A socket that
    /// is not MULTI keeps only its newest connection.
    pub fn connect(&mut self, a: SocketId, b: SocketId) -> bool {
        let (loc_a, loc_b) = match (self.socket_index.get(&a), self.socket_index.get(&b)) {
            (Some(la), Some(lb)) => (la.clone(), lb.clone()),
            _ => {
                tracing::warn!(a = %a, b = %b, "Cannot connect: socket not attached to this graph");
                return false;
            }
        };
        if loc_a.direction == loc_b.direction {
            tracing::warn!(a = %a, b = %b, direction = %loc_a.direction, "Cannot connect two sockets of the same direction");
            return false;
        }
        if self.socket_has(a, b) {
            tracing::debug!(a = %a, b = %b, "Sockets already connected");
            return false;
        }

        for (socket, other) in [(a, b), (b, a)] {
            let replaced: Vec<SocketId> = match self.socket(socket) {
                Some(s) if !s.is_multi() => s.peers.iter().copied().filter(|p| *p != other).collect(),
                _ => Vec::new(),
            };
            for peer in replaced {
                tracing::debug!(socket = %socket, peer = %peer, "Replacing single connection");
                self.disconnect(socket, peer);
            }
        }

        if let Some(s) = self.socket_mut(a) {
            s.peers.push(b);
        }
        if let Some(s) = self.socket_mut(b) {
            s.peers.push(a);
        }
        self.dirty_node(loc_a.node);
        self.dirty_node(loc_b.node);
        self.flag_resort();
        true
    }

    /// Connect `from.out_key` to `to.in_key`
    pub fn link(&mut self, from: NodeId, out_key: &str, to: NodeId, in_key: &str) -> bool {
        let output = self.socket_id(from, Direction::Output, out_key);
        let input = self.socket_id(to, Direction::Input, in_key);
        match (output, input) {
            (Some(output), Some(input)) => self.connect(output, input),
            _ => {
                tracing::warn!(from = %from, out_key, to = %to, in_key, "Cannot link: socket not found");
                false
            }
        }
    }

    /// Remove the connection between `a` and `b`
    ///
    /// Either side may be dangling; whatever membership exists is removed.
    pub fn disconnect(&mut self, a: SocketId, b: SocketId) -> bool {
        let mut removed = false;
        for (socket, peer) in [(a, b), (b, a)] {
            if let Some(s) = self.socket_mut(socket) {
                let before = s.peers.len();
                s.peers.retain(|p| *p != peer);
                removed |= s.peers.len() != before;
            }
        }
        if !removed {
            return false;
        }

        for socket in [a, b] {
            if let Some(owner) = self.socket_owner(socket) {
                self.dirty_node(owner);
            }
        }
        self.flag_resort();
        true
    }

    /// Remove every connection of a socket, returning how many were removed
    pub fn disconnect_all(&mut self, id: SocketId) -> usize {
        let guard = self.config.loop_guard;
        let mut removed = 0;
        while let Some(peer) = self.socket(id).and_then(|s| s.peers.last().copied()) {
            if removed >= guard {
                tracing::warn!(socket = %id, guard, "disconnect_all hit the loop guard");
                break;
            }
            if !self.disconnect(id, peer) {
                break;
            }
            removed += 1;
        }
        removed
    }

    /// Flag a socket changed and push its value downstream
    ///
    /// Sets UPDATE on the socket, optionally dirties its owner, requests a
    /// tick, then copies the value into every peer and dirties each peer's
    /// owner. Peers that cannot hold the value keep their old one.
    pub fn socket_update(&mut self, id: SocketId, update_owner: bool) {
        let Some(owner) = self.socket_owner(id) else {
            tracing::warn!(socket = %id, "Update on a socket that is not attached to this graph");
            return;
        };
        let (value, peers) = match self.socket_mut(id) {
            Some(socket) => {
                socket.flags.insert(SocketFlags::UPDATE);
                (socket.value(), socket.peers.clone())
            }
            None => return,
        };

        if update_owner {
            self.dirty_node(owner);
        }
        self.request_tick();

        for peer in peers {
            let Some(peer_owner) = self.socket_owner(peer) else {
                tracing::warn!(socket = %id, peer = %peer, "Skipping dangling connection");
                continue;
            };
            if let Some(target) = self.socket_mut(peer) {
                if let Err(e) = target.set_value(&value) {
                    tracing::warn!(socket = %id, peer = %peer, error = %e, "Failed to push value to peer");
                }
            }
            self.dirty_node(peer_owner);
        }
    }

    /// Store a value without propagating it
    pub fn set_socket_value(&mut self, id: SocketId, value: &Value) -> Result<()> {
        let socket = self
            .socket_mut(id)
            .ok_or_else(|| GraphError::SocketNotFound(id.to_string()))?;
        socket.set_value(value)?;
        Ok(())
    }

    /// Store a value and propagate it with [`socket_update`](Self::socket_update)
    pub fn set_and_update(&mut self, id: SocketId, value: &Value, update_owner: bool) -> Result<()> {
        self.set_socket_value(id, value)?;
        self.socket_update(id, update_owner);
        Ok(())
    }

    // ---- editor surface ----

    /// Select or deselect a node
    pub fn set_selected(&mut self, id: NodeId, selected: bool) {
        let Some(node) = self.node_map.get_mut(&id) else {
            return;
        };
        node.flags.set(NodeFlags::SELECT, selected);
        self.selected.retain(|n| *n != id);
        if selected {
            self.selected.push(id);
        }
        self.signal_ui();
    }

    /// Selected nodes in selection order
    pub fn selected(&self) -> &[NodeId] {
        &self.selected
    }

    pub fn active(&self) -> Option<NodeId> {
        self.active
    }

    pub fn set_active(&mut self, id: Option<NodeId>) {
        self.active = id.filter(|id| self.has(*id));
        self.signal_ui();
    }

    pub fn highlight(&self) -> Option<NodeId> {
        self.highlight
    }

    pub fn set_highlight(&mut self, id: Option<NodeId>) {
        self.highlight = id.filter(|id| self.has(*id));
        self.signal_ui();
    }

    /// Move a node to the front of the list, keeping the others in order
    pub fn push_to_front(&mut self, id: NodeId) -> bool {
        let Some(index) = self.nodes.iter().position(|n| *n == id) else {
            tracing::warn!(node = %id, "Cannot push unknown node to front");
            return false;
        };
        self.nodes[..=index].rotate_right(1);
        self.signal_ui();
        true
    }

    /// Display name of an attached node
    pub fn display_name(&self, id: NodeId) -> Option<String> {
        self.node_map.get(&id).map(Node::display_name)
    }

    /// Duplicate the graph with the same ids
    ///
    /// Nodes are fresh instances of their types carrying the same socket
    /// values, flags and ids. Connections are rebuilt by resolving each
    /// peer's owner and key in the copy; edges that cannot be resolved are
    /// skipped.
    pub fn copy(&self) -> Self {
        let mut ret = Self {
            nodes: self.nodes.clone(),
            node_map: HashMap::with_capacity(self.node_map.len()),
            socket_index: HashMap::with_capacity(self.socket_index.len()),
            id_gen: self.id_gen.clone(),
            sortlist: Vec::new(),
            flags: self.flags | GraphFlags::RESORT,
            config: self.config.clone(),
            revision: 0,
            scheduler: Rc::clone(&self.scheduler),
            selected: self.selected.clone(),
            active: self.active,
            highlight: self.highlight,
        };

        for id in &self.nodes {
            let Some(node) = self.node_map.get(id) else {
                continue;
            };
            let mut copy = node.copy();
            copy.id = Some(*id);
            copy.flags = node.flags;
            for direction in [Direction::Input, Direction::Output] {
                for socket in copy.sockets_mut(direction).iter_mut() {
                    let socket_id = node
                        .sockets(direction)
                        .get(&socket.key)
                        .and_then(Socket::id)
                        .unwrap_or_else(|| SocketId(ret.id_gen.next_id()));
                    socket.id = Some(socket_id);
                    socket.owner = Some(*id);
                    ret.socket_index.insert(
                        socket_id,
                        SocketLoc {
                            node: *id,
                            direction,
                            key: socket.key.clone(),
                        },
                    );
                }
            }
            ret.node_map.insert(*id, copy);
        }

        for node in self.nodes() {
            for socket in node.all_sockets() {
                let Some(socket_id) = socket.id else {
                    continue;
                };
                for peer in &socket.peers {
                    let resolved = self.socket_index.get(peer).and_then(|loc| {
                        ret.socket_id(loc.node, socket.direction.opposite(), &loc.key)
                    });
                    match (resolved, ret.socket_mut(socket_id)) {
                        (Some(peer), Some(target)) if !target.peers.contains(&peer) => {
                            target.peers.push(peer)
                        }
                        (Some(_), Some(_)) => {}
                        _ => tracing::warn!(socket = %socket_id, peer = %peer, "Skipping unresolvable edge in copy"),
                    }
                }
            }
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DefaultBehavior, NodeDef, NodeType};
    use crate::sockets::FloatSocket;
    use serde_json::json;

    fn value_type() -> Rc<NodeType<()>> {
        NodeType::standalone(
            NodeDef::new("value")
                .input("in", Socket::new(FloatSocket::new(0.0)))
                .input("extra", Socket::new(FloatSocket::new(0.0)).with_flags(SocketFlags::MULTI))
                .output("out", Socket::new(FloatSocket::new(0.0))),
            || Box::new(DefaultBehavior),
        )
        .unwrap()
    }

    fn two_nodes() -> (Graph<()>, NodeId, NodeId) {
        let ty = value_type();
        let mut graph = Graph::new();
        let a = graph.add(ty.instantiate()).unwrap();
        let b = graph.add(ty.instantiate()).unwrap();
        (graph, a, b)
    }

    fn sid(graph: &Graph<()>, node: NodeId, direction: Direction, key: &str) -> SocketId {
        graph.socket_id(node, direction, key).unwrap()
    }

    #[test]
    fn test_add_assigns_unique_ids() {
        let (graph, a, b) = two_nodes();
        assert_ne!(a, b);
        // 1 node id + 3 socket ids per node
        assert_eq!(graph.socket_index.len(), 6);
        assert_eq!(graph.id_gen().peek(), 8);
        let node = graph.node(a).unwrap();
        assert!(node.all_sockets().all(|s| s.owner() == Some(a) && s.id().is_some()));
        assert!(graph.needs_resort());
    }

    #[test]
    fn test_add_rejects_attached_node() {
        let (mut graph, a, _) = two_nodes();
        let mut stolen = graph.node(a).unwrap().copy();
        stolen.id = Some(a);
        assert_eq!(graph.add(stolen), None);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_connect_is_symmetric() {
        let (mut graph, a, b) = two_nodes();
        let out = sid(&graph, a, Direction::Output, "out");
        let input = sid(&graph, b, Direction::Input, "in");
        assert!(graph.connect(input, out));
        assert!(graph.socket_has(out, input));
        assert!(graph.socket_has(input, out));

        assert!(!graph.connect(out, input));
        assert!(graph.disconnect(out, input));
        assert!(!graph.socket_has(input, out));
        assert!(!graph.disconnect(out, input));
    }

    #[test]
    fn test_connect_rejects_same_direction() {
        let (mut graph, a, b) = two_nodes();
        let in_a = sid(&graph, a, Direction::Input, "in");
        let in_b = sid(&graph, b, Direction::Input, "in");
        assert!(!graph.connect(in_a, in_b));
        assert!(!graph.connect(in_a, SocketId(999)));
    }

    #[test]
    fn test_single_input_replaces_connection() {
        let ty = value_type();
        let mut graph = Graph::new();
        let a = graph.add(ty.instantiate()).unwrap();
        let b = graph.add(ty.instantiate()).unwrap();
        let c = graph.add(ty.instantiate()).unwrap();

        assert!(graph.link(a, "out", c, "in"));
        assert!(graph.link(b, "out", c, "in"));
        let input = sid(&graph, c, Direction::Input, "in");
        assert_eq!(graph.socket(input).unwrap().peers(), &[sid(&graph, b, Direction::Output, "out")]);
        assert!(!graph.socket(sid(&graph, a, Direction::Output, "out")).unwrap().is_connected());

        assert!(graph.link(a, "out", c, "extra"));
        assert!(graph.link(b, "out", c, "extra"));
        assert_eq!(graph.socket(sid(&graph, c, Direction::Input, "extra")).unwrap().peers().len(), 2);
    }

    #[test]
    fn test_socket_update_pushes_to_peers() {
        let (mut graph, a, b) = two_nodes();
        graph.link(a, "out", b, "in");
        graph.node_mut(b).unwrap().flags_mut().remove(NodeFlags::UPDATE);
        graph.node_mut(a).unwrap().flags_mut().remove(NodeFlags::UPDATE);

        let out = sid(&graph, a, Direction::Output, "out");
        graph.set_and_update(out, &json!(4.0), false).unwrap();

        assert_eq!(graph.socket(sid(&graph, b, Direction::Input, "in")).unwrap().value(), json!(4.0));
        assert!(graph.socket(out).unwrap().flags().contains(SocketFlags::UPDATE));
        assert!(graph.node(b).unwrap().is_dirty());
        assert!(!graph.node(a).unwrap().is_dirty());
    }

    #[test]
    fn test_set_and_update_requests_tick() {
        let tick = Rc::new(PendingTick::new());
        let (graph, a, _) = two_nodes();
        let mut graph = graph.with_scheduler(tick.clone());
        let out = sid(&graph, a, Direction::Output, "out");
        graph.set_and_update(out, &json!(1.0), true).unwrap();
        assert!(tick.take());

        assert!(matches!(
            graph.set_and_update(out, &json!("nope"), true),
            Err(GraphError::Socket(_))
        ));
        assert!(matches!(
            graph.set_socket_value(SocketId(4242), &json!(1.0)),
            Err(GraphError::SocketNotFound(_))
        ));
    }

    #[test]
    fn test_remove_cleans_up() {
        let (mut graph, a, b) = two_nodes();
        graph.link(a, "out", b, "in");
        graph.set_selected(a, true);
        graph.set_active(Some(a));

        let removed = graph.remove(a).unwrap();
        assert_eq!(removed.id(), None);
        assert!(removed.all_sockets().all(|s| s.id().is_none() && !s.is_connected()));
        assert!(!graph.has(a));
        assert!(graph.socket_index.values().all(|loc| loc.node != a));
        assert!(!graph.socket(sid(&graph, b, Direction::Input, "in")).unwrap().is_connected());
        assert!(graph.selected().is_empty());
        assert_eq!(graph.active(), None);

        assert!(graph.remove(a).is_none());
    }

    #[test]
    fn test_removed_node_can_be_added_again() {
        let (mut graph, a, _) = two_nodes();
        let node = graph.remove(a).unwrap();
        let again = graph.add(node).unwrap();
        assert!(again.0 > a.0);
    }

    #[test]
    fn test_push_to_front() {
        let ty = value_type();
        let mut graph = Graph::new();
        let ids: Vec<NodeId> = (0..4).map(|_| graph.add(ty.instantiate()).unwrap()).collect();
        let revision = graph.revision();
        assert!(graph.push_to_front(ids[2]));
        assert_eq!(graph.node_ids(), &[ids[2], ids[0], ids[1], ids[3]]);
        assert!(graph.revision() > revision);
        assert!(!graph.push_to_front(NodeId(1000)));
    }

    #[test]
    fn test_copy_keeps_ids_and_edges() {
        let (mut graph, a, b) = two_nodes();
        graph.link(a, "out", b, "in");
        let out = sid(&graph, a, Direction::Output, "out");
        graph.set_socket_value(out, &json!(3.0)).unwrap();

        let copy = graph.copy();
        let input = sid(&graph, b, Direction::Input, "in");
        assert_eq!(sid(&copy, a, Direction::Output, "out"), out);
        assert!(copy.socket_has(out, input));
        assert!(copy.socket_has(input, out));
        assert_eq!(copy.socket(out).unwrap().value(), json!(3.0));
        assert_eq!(copy.id_gen(), graph.id_gen());
        assert_eq!(copy.display_name(a), graph.display_name(a));
    }

    #[test]
    fn test_copy_drops_dangling_edges() {
        let (mut graph, a, b) = two_nodes();
        graph.link(a, "out", b, "in");
        let out = sid(&graph, a, Direction::Output, "out");
        let input = sid(&graph, b, Direction::Input, "in");
        let dangling = SocketId(graph.id_gen().peek() + 100);
        graph.socket_mut(out).unwrap().peers.push(dangling);

        let copy = graph.copy();
        assert_eq!(copy.socket(out).unwrap().peers(), &[input]);
        assert!(copy.socket_has(input, out));
    }

    #[test]
    fn test_clear() {
        let (mut graph, a, b) = two_nodes();
        graph.link(a, "out", b, "in");
        graph.clear();
        assert!(graph.is_empty());
        assert!(graph.socket_index.is_empty());
    }
}
