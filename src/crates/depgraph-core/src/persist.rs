//! Save shapes, schema migration and proxy relinking
//!
//! The graph persists to plain serde structures ([`GraphSave`], [`NodeSave`],
//! [`SocketSave`]); choosing JSON, YAML or a binary codec is up to the host.
//!
//! # Schema drift
//!
//! Node types evolve between saves. Loading reconciles every node against
//! its current definition:
//!
//! ```text
//!   saved socket         current definition        result
//!   ─────────────        ──────────────────        ──────────────────────────
//!   (missing)            float "gain"              fresh socket, fresh id
//!   vec4 "color"         rgba  "color"             rgba, value/id/edges kept
//!   float "mode"         enum  "mode" (unrelated)  saved socket kept, warning
//!   float "old"          (missing)                 saved socket kept
//! ```
//!
//! Edges whose peer is missing, or whose peer does not list them back, are
//! dropped. ZOMBIE nodes are never written and are pruned if found.
//!
//! # Proxies
//!
//! A node flagged SAVE_PROXY is saved as a lightweight shell: type name,
//! socket ids, values and connections, but no behavior payload. Its owner
//! (a library, another document) persists the real node with
//! [`Node::to_save`]. After loading both, the owner hands the real node to
//! [`Graph::relink_proxy_owner`], which swaps it in and takes over the
//! proxy's connections.

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::flags::{GraphFlags, NodeFlags, SocketFlags};
use crate::graph::{Graph, SocketLoc};
use crate::ids::{IdGen, NodeId, SocketId};
use crate::node::{Node, NodeType};
use crate::registry::NodeRegistry;
use crate::socket::{is_lineage_related, Direction, Socket, SocketMap};
use crate::sockets::SocketRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Persisted socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketSave {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SocketId>,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_name: Option<String>,
    #[serde(default)]
    pub flags: SocketFlags,
    #[serde(default)]
    pub connections: Vec<SocketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Persisted node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSave {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_name: Option<String>,
    #[serde(default)]
    pub flags: NodeFlags,
    /// Written by [`Graph::save`] for SAVE_PROXY nodes
    #[serde(default)]
    pub proxy: bool,
    #[serde(default)]
    pub inputs: Vec<SocketSave>,
    #[serde(default)]
    pub outputs: Vec<SocketSave>,
    /// Behavior state; never present on proxies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl NodeSave {
    fn sockets(&self, direction: Direction) -> &[SocketSave] {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }
}

/// Persisted graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSave {
    pub id_gen: IdGen,
    pub nodes: Vec<NodeSave>,
}

impl GraphSave {
    /// Largest node or socket id mentioned anywhere in the save
    ///
    /// The reserved [`IdGen::MAX`] is ignored; load treats it as corrupt.
    pub fn max_id(&self) -> Option<u64> {
        self.nodes
            .iter()
            .flat_map(|n| {
                let sockets = n.inputs.iter().chain(&n.outputs);
                n.id.map(|id| id.0).into_iter().chain(
                    sockets.flat_map(|s| s.id.map(|id| id.0).into_iter().chain(s.connections.iter().map(|c| c.0))),
                )
            })
            .filter(|id| *id != IdGen::MAX)
            .max()
    }

    /// Encode as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Socket {
    pub fn to_save(&self) -> SocketSave {
        SocketSave {
            key: self.key.clone(),
            id: self.id,
            type_name: self.type_name().to_string(),
            ui_name: self.ui_name.clone(),
            flags: self.flags,
            connections: self.peers.clone(),
            value: Some(self.value()),
        }
    }

    /// Rebuild a socket from its save
    ///
    /// A value the kind rejects is logged and the default kept.
    pub fn from_save(save: &SocketSave, direction: Direction, sockets: &SocketRegistry) -> Result<Self> {
        let mut kind = sockets.create(&save.type_name)?;
        if let Some(value) = &save.value {
            if let Err(e) = kind.set_value(value) {
                tracing::warn!(key = %save.key, error = %e, "Saved socket value rejected");
            }
        }
        Ok(Self {
            id: save.id,
            owner: None,
            direction,
            key: save.key.clone(),
            ui_name: save.ui_name.clone(),
            flags: save.flags,
            peers: save.connections.clone(),
            kind,
        })
    }
}

fn socket_saves(map: &SocketMap) -> Vec<SocketSave> {
    map.iter().map(Socket::to_save).collect()
}

impl<C> Node<C> {
    /// Full save of this node, including the behavior payload
    pub fn to_save(&self) -> NodeSave {
        NodeSave {
            id: self.id,
            type_name: self.type_name().to_string(),
            ui_name: self.ui_name.clone(),
            flags: self.flags.persistent(),
            proxy: false,
            inputs: socket_saves(&self.inputs),
            outputs: socket_saves(&self.outputs),
            payload: self.behavior.as_ref().and_then(|b| b.save_payload()),
        }
    }

    /// Proxy shell of this node
    pub fn to_proxy_save(&self) -> NodeSave {
        NodeSave {
            proxy: true,
            payload: None,
            ..self.to_save()
        }
    }
}

/// Merge sockets read from a save with the current definition's sockets
fn reconcile(loaded: SocketMap, template: &SocketMap, direction: Direction, node: &str) -> SocketMap {
    let mut loaded = loaded;
    let mut result = SocketMap::new();

    for t in template.iter() {
        let key = t.key().to_string();
        let Some(mut socket) = loaded.remove(&key) else {
            tracing::debug!(node, key = %key, "Adding socket missing from save");
            result.insert(key, t.detached_copy());
            continue;
        };

        if socket.type_name() != t.type_name() {
            if is_lineage_related(socket.kind(), t.kind()) {
                let mut converted = t.detached_copy();
                if let Err(e) = converted.kind.copy_value(socket.kind()) {
                    tracing::warn!(node, key = %key, error = %e, "Could not carry value across socket type change");
                }
                converted.id = socket.id;
                converted.peers = std::mem::take(&mut socket.peers);
                converted.flags = socket.flags;
                converted.ui_name = socket.ui_name.take();
                socket = converted;
            } else {
                tracing::warn!(
                    node,
                    key = %key,
                    saved = socket.type_name(),
                    current = t.type_name(),
                    "Socket type changed to an unrelated type; keeping saved socket"
                );
            }
        }

        socket.on_file_load(t);
        socket.fix_up(direction, &key);
        result.insert(key, socket);
    }

    for extra in loaded {
        tracing::debug!(node, key = %extra.key(), "Keeping socket no longer in definition");
        let key = extra.key().to_string();
        result.insert(key, extra);
    }
    result
}

fn load_sockets(saves: &[SocketSave], direction: Direction, sockets: &SocketRegistry) -> SocketMap {
    let mut map = SocketMap::new();
    for save in saves {
        match Socket::from_save(save, direction, sockets) {
            Ok(socket) => {
                map.insert(save.key.clone(), socket);
            }
            Err(e) => tracing::warn!(key = %save.key, error = %e, "Skipping unloadable socket"),
        }
    }
    map
}

impl<C: 'static> Node<C> {
    /// Rebuild a node from its save, reconciling socket schema drift
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownNodeType`] when the type is not registered.
    pub fn from_save(save: &NodeSave, registry: &NodeRegistry<C>, sockets: &SocketRegistry) -> Result<Self> {
        let ty = registry
            .get(&save.type_name)
            .ok_or_else(|| GraphError::UnknownNodeType(save.type_name.clone()))?;

        let mut node = ty.instantiate();
        node.id = save.id;
        node.ui_name = save.ui_name.clone();
        node.flags = save.flags.persistent();

        for direction in [Direction::Input, Direction::Output] {
            let loaded = load_sockets(save.sockets(direction), direction, sockets);
            let merged = reconcile(loaded, ty.def().sockets(direction), direction, &save.type_name);
            *node.sockets_mut(direction) = merged;
        }

        if let (Some(payload), Some(behavior)) = (&save.payload, node.behavior.as_mut()) {
            if let Err(e) = behavior.load_payload(payload) {
                tracing::warn!(node_type = %save.type_name, error = %e, "Failed to load node payload");
            }
        }
        Ok(node)
    }

    /// Rebuild a proxy placeholder from its save
    pub fn proxy_from_save(save: &NodeSave, sockets: &SocketRegistry) -> Self {
        let mut node = NodeType::proxy(&save.type_name).instantiate();
        node.id = save.id;
        node.ui_name = save.ui_name.clone();
        node.flags = save.flags.persistent();
        node.proxy = true;
        for direction in [Direction::Input, Direction::Output] {
            *node.sockets_mut(direction) = load_sockets(save.sockets(direction), direction, sockets);
        }
        node
    }
}

impl<C> Graph<C> {
    /// Save shape of the graph
    ///
    /// ZOMBIE nodes are skipped; SAVE_PROXY nodes are written as proxies.
    pub fn save(&self) -> GraphSave {
        let nodes = self
            .nodes()
            .filter(|n| !n.flags().contains(NodeFlags::ZOMBIE))
            .map(|n| {
                if n.flags().contains(NodeFlags::SAVE_PROXY) {
                    n.to_proxy_save()
                } else {
                    n.to_save()
                }
            })
            .collect();
        GraphSave {
            id_gen: self.id_gen.clone(),
            nodes,
        }
    }

    fn index_node_sockets(&mut self, node: &mut Node<C>, id: NodeId, seen: &mut HashSet<SocketId>) {
        for direction in [Direction::Input, Direction::Output] {
            for socket in node.sockets_mut(direction).iter_mut() {
                let socket_id = match socket.id {
                    Some(sid) if sid.0 == IdGen::MAX => {
                        tracing::warn!(node = %id, socket = %sid, "Socket id out of range in save; assigning a fresh one");
                        socket.peers.clear();
                        let fresh = SocketId(self.id_gen.next_id());
                        seen.insert(fresh);
                        fresh
                    }
                    Some(sid) if seen.insert(sid) => sid,
                    Some(sid) => {
                        tracing::warn!(node = %id, socket = %sid, "Duplicate socket id in save; assigning a fresh one");
                        socket.peers.clear();
                        let fresh = SocketId(self.id_gen.next_id());
                        seen.insert(fresh);
                        fresh
                    }
                    None => {
                        let fresh = SocketId(self.id_gen.next_id());
                        seen.insert(fresh);
                        fresh
                    }
                };
                socket.id = Some(socket_id);
                socket.owner = Some(id);
                socket.direction = direction;
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
    }

    /// Drop connections that are dangling, one-sided, same-direction or repeated
    fn prune_connections(&mut self) -> usize {
        let ids: Vec<SocketId> = self.socket_index.keys().copied().collect();
        let mut dropped = 0;
        for id in ids {
            let Some(direction) = self.socket_index.get(&id).map(|loc| loc.direction) else {
                continue;
            };
            let Some(peers) = self.socket(id).map(|s| s.peers.clone()) else {
                continue;
            };
            let mut valid: Vec<SocketId> = Vec::with_capacity(peers.len());
            for peer in &peers {
                let ok = !valid.contains(peer)
                    && self
                        .socket_index
                        .get(peer)
                        .is_some_and(|loc| loc.direction != direction)
                    && self.socket(*peer).is_some_and(|p| p.peers.contains(&id));
                if ok {
                    valid.push(*peer);
                }
            }
            if valid.len() != peers.len() {
                tracing::warn!(socket = %id, dropped = peers.len() - valid.len(), "Dropping invalid connections");
                dropped += peers.len() - valid.len();
                if let Some(socket) = self.socket_mut(id) {
                    socket.peers = valid;
                }
            }
        }
        dropped
    }
}

impl<C: 'static> Graph<C> {
    /// Rebuild a graph from its save shape
    ///
    /// Unknown node types and duplicate node ids are skipped with a warning.
    /// Sockets added to a type since the save get fresh ids; the allocator
    /// never issues an id already present in the save.
    ///
    /// # Errors
    ///
    /// [`GraphError::Configuration`] when `config` is invalid.
    #[tracing::instrument(skip_all, fields(nodes = save.nodes.len()))]
    pub fn load(
        save: &GraphSave,
        registry: &NodeRegistry<C>,
        sockets: &SocketRegistry,
        config: GraphConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut graph = Self::with_config(config);
        graph.id_gen = save.id_gen.clone();
        if graph.id_gen.peek() == IdGen::MAX {
            tracing::warn!("Saved id allocator is exhausted; rebuilding it from the ids in use");
            graph.id_gen = IdGen::default();
        }

        let mut nodes = Vec::with_capacity(save.nodes.len());
        let mut node_ids = HashSet::new();
        let mut skipped = 0;

        for node_save in &save.nodes {
            let mut node = if node_save.proxy {
                Node::proxy_from_save(node_save, sockets)
            } else {
                match Node::from_save(node_save, registry, sockets) {
                    Ok(node) => node,
                    Err(e) => {
                        tracing::warn!(node_type = %node_save.type_name, error = %e, "Skipping node that cannot be loaded");
                        skipped += 1;
                        continue;
                    }
                }
            };

            if node.flags.contains(NodeFlags::ZOMBIE) {
                tracing::debug!(node_type = %node_save.type_name, "Pruning zombie node");
                skipped += 1;
                continue;
            }
            if node.id == Some(NodeId(IdGen::MAX)) {
                tracing::warn!(node_type = %node_save.type_name, "Node id out of range in save; assigning a fresh one");
                node.id = None;
            }
            if let Some(id) = node.id {
                if !node_ids.insert(id) {
                    tracing::warn!(node = %id, "Duplicate node id in save; skipping");
                    skipped += 1;
                    continue;
                }
            }

            nodes.push(node);
        }

        if let Some(max) = save.max_id() {
            graph.id_gen.ensure_above(max);
        }

        let mut socket_ids = HashSet::new();
        for mut node in nodes {
            let id = node.id.unwrap_or_else(|| NodeId(graph.id_gen.next_id()));
            node.id = Some(id);
            graph.index_node_sockets(&mut node, id, &mut socket_ids);
            graph.node_map.insert(id, node);
            graph.nodes.push(id);
        }

        let dropped = graph.prune_connections();
        graph.flags.insert(GraphFlags::RESORT);
        tracing::info!(
            nodes = graph.nodes.len(),
            sockets = graph.socket_index.len(),
            skipped,
            dropped_connections = dropped,
            "Loaded graph"
        );
        Ok(graph)
    }

    /// Replace a proxy with the real node that has the same id
    ///
    /// For each socket of the proxy:
    ///
    /// - same key, different type: the real socket takes the saved value where
    ///   it can, plus the proxy socket's id and connections
    /// - same key, same type: the proxy socket (with its value and
    ///   connections) absorbs the template state and replaces the real one
    /// - key unknown to the real node: the proxy socket is kept
    ///
    /// Hands the node back when there is no proxy at its id.
    pub fn relink_proxy_owner(&mut self, mut node: Node<C>) -> std::result::Result<NodeId, Node<C>> {
        let Some(id) = node.id else {
            tracing::warn!(node_type = %node.type_name(), "Cannot relink a node without an id");
            return Err(node);
        };
        match self.node_map.get(&id) {
            Some(existing) if existing.is_proxy() => {}
            Some(_) => {
                tracing::warn!(node = %id, "Relink target is not a proxy");
                return Err(node);
            }
            None => {
                tracing::warn!(node = %id, "No proxy with this id to relink");
                return Err(node);
            }
        }
        let Some(proxy) = self.node_map.remove(&id) else {
            return Err(node);
        };

        for socket in proxy.all_sockets() {
            if let Some(sid) = socket.id {
                self.socket_index.remove(&sid);
            }
        }
        node.proxy = false;

        let Node {
            inputs: proxy_inputs,
            outputs: proxy_outputs,
            ..
        } = proxy;
        for (direction, saved) in [(Direction::Input, proxy_inputs), (Direction::Output, proxy_outputs)] {
            for mut old in saved {
                let key = old.key.clone();
                match node.sockets_mut(direction).get_mut(&key) {
                    Some(new) if new.type_name() != old.type_name() => {
                        if let Err(e) = new.kind.copy_value(old.kind()) {
                            tracing::debug!(node = %id, key = %key, error = %e, "Proxy value not transferable");
                        }
                        new.id = old.id.or(new.id);
                        new.peers = std::mem::take(&mut old.peers);
                    }
                    Some(new) => {
                        old.on_file_load(new);
                        old.fix_up(direction, &key);
                        *new = old;
                    }
                    None => {
                        tracing::debug!(node = %id, key = %key, "Keeping proxy socket missing from real node");
                        node.sockets_mut(direction).insert(key, old);
                    }
                }
            }
        }

        for direction in [Direction::Input, Direction::Output] {
            for socket in node.sockets_mut(direction).iter_mut() {
                let sid = match socket.id {
                    Some(sid) if !self.socket_index.contains_key(&sid) => sid,
                    _ => {
                        socket.peers.clear();
                        SocketId(self.id_gen.next_id())
                    }
                };
                socket.id = Some(sid);
                socket.owner = Some(id);
                socket.direction = direction;
                self.socket_index.insert(
                    sid,
                    SocketLoc {
                        node: id,
                        direction,
                        key: socket.key.clone(),
                    },
                );
            }
        }

        let socket_ids: Vec<SocketId> = node.all_sockets().filter_map(|s| s.id).collect();
        self.node_map.insert(id, node);
        for sid in socket_ids {
            self.repair_peer_lists(sid);
        }

        tracing::debug!(node = %id, "Relinked proxy owner");
        self.flag_resort();
        self.dirty_node(id);
        self.request_tick();
        Ok(id)
    }

    /// Make every peer of `sid` list it exactly once
    fn repair_peer_lists(&mut self, sid: SocketId) {
        let Some(peers) = self.socket(sid).map(|s| s.peers.clone()) else {
            return;
        };
        let mut kept = Vec::with_capacity(peers.len());
        for peer in peers {
            if kept.contains(&peer) {
                continue;
            }
            match self.socket_mut(peer) {
                Some(target) => {
                    let mut seen = false;
                    target.peers.retain(|p| {
                        if *p != sid {
                            return true;
                        }
                        let keep = !seen;
                        seen = true;
                        keep
                    });
                    if !seen {
                        target.peers.push(sid);
                    }
                    kept.push(peer);
                }
                None => tracing::warn!(socket = %sid, peer = %peer, "Dropping dangling proxy connection"),
            }
        }
        if let Some(socket) = self.socket_mut(sid) {
            socket.peers = kept;
        }
    }
}
