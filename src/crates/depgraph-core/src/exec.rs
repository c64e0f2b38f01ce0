//! Execution: ordered sweeps, cyclic relaxation and subtree runs
//!
//! # Execution Modes
//!
//! ```text
//!   exec / exec_with
//!      │
//!      ├── RESORT set? ──► sort()
//!      │
//!      ├── CYCLIC and cycles forbidden ──► Err(GraphError::Cycle)
//!      │
//!      ├── CYCLIC, allowed, not forced ──► relaxation solver
//!      │        repeat up to max_cycle_steps:
//!      │          sweep the sortlist
//!      │          sum |diff| of sockets on nodes dirtied again
//!      │          stop once the sum < cycle_stop_threshold
//!      │
//!      └── otherwise ──► one sweep over the sortlist
//!
//!   exec_subtree(start)
//!      visit(start): run dirty producers first, then the node,
//!      then its dirty consumers; re-entering a node mid-visit is a cycle
//! ```
//!
//! A sweep skips disabled nodes and runs each dirty node once, clearing its
//! UPDATE flag first. Behaviors receive an [`ExecCx`] with mutable access to
//! the graph and the host context, so they may edit the graph while it runs.
//! Nodes removed mid-pass are skipped.
//!
//! # Example
//!
//! ```rust
//! use depgraph_core::{ExecCx, Graph, NodeBehavior, NodeDef, NodeRegistry, Result, Socket};
//! use depgraph_core::sockets::FloatSocket;
//!
//! struct AddOne;
//!
//! impl NodeBehavior<Vec<String>> for AddOne {
//!     fn exec(&mut self, cx: &mut ExecCx<'_, Vec<String>>) -> Result<()> {
//!         let x: f64 = cx.input("x")?;
//!         cx.emit("y", x + 1.0)?;
//!         let name = cx.node().map(|n| n.display_name()).unwrap_or_default();
//!         cx.context_mut().push(name);
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = NodeRegistry::<Vec<String>>::new();
//! registry.register(
//!     NodeDef::new("add_one")
//!         .input("x", Socket::new(FloatSocket::new(0.0)))
//!         .output("y", Socket::new(FloatSocket::new(0.0))),
//!     || Box::new(AddOne),
//! ).unwrap();
//!
//! let mut graph = Graph::new();
//! let a = graph.add(registry.create("add_one").unwrap()).unwrap();
//! let b = graph.add(registry.create("add_one").unwrap()).unwrap();
//! graph.link(a, "y", b, "x");
//!
//! let mut log = Vec::new();
//! let report = graph.exec(&mut log).unwrap();
//! assert_eq!(report.executed, 2);
//!
//! let y = graph.socket_id(b, depgraph_core::Direction::Output, "y").unwrap();
//! assert_eq!(graph.socket(y).unwrap().value(), serde_json::json!(2.0));
//! ```

use crate::error::{GraphError, Result};
use crate::flags::{GraphFlags, NodeFlags};
use crate::graph::Graph;
use crate::ids::{NodeId, SocketId};
use crate::node::Node;
use crate::socket::Direction;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Summary of an exec call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecReport {
    /// Node executions performed
    pub executed: usize,
    /// Sweeps performed; above one only for the relaxation solver
    pub iterations: usize,
    /// False when the relaxation solver hit its step cap
    pub converged: bool,
}

/// What a node behavior sees while it runs
pub struct ExecCx<'a, C> {
    graph: &'a mut Graph<C>,
    context: &'a mut C,
    node: NodeId,
}

impl<'a, C> ExecCx<'a, C> {
    pub(crate) fn new(graph: &'a mut Graph<C>, context: &'a mut C, node: NodeId) -> Self {
        Self {
            graph,
            context,
            node,
        }
    }

    /// Id of the running node
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// The running node, unless it removed itself
    pub fn node(&self) -> Option<&Node<C>> {
        self.graph.node(self.node)
    }

    pub fn graph(&self) -> &Graph<C> {
        &*self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph<C> {
        &mut *self.graph
    }

    pub fn context(&self) -> &C {
        &*self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut *self.context
    }

    /// Graph and context at once
    pub fn split(&mut self) -> (&mut Graph<C>, &mut C) {
        (&mut *self.graph, &mut *self.context)
    }

    fn socket_id(&self, direction: Direction, key: &str) -> Result<SocketId> {
        self.graph.socket_id(self.node, direction, key).ok_or_else(|| {
            GraphError::SocketNotFound(format!("node {} {} '{}'", self.node, direction, key))
        })
    }

    fn value_of(&self, direction: Direction, key: &str) -> Result<Value> {
        let id = self.socket_id(direction, key)?;
        self.graph
            .socket(id)
            .map(|s| s.value())
            .ok_or_else(|| GraphError::SocketNotFound(id.to_string()))
    }

    pub fn input_value(&self, key: &str) -> Result<Value> {
        self.value_of(Direction::Input, key)
    }

    pub fn output_value(&self, key: &str) -> Result<Value> {
        self.value_of(Direction::Output, key)
    }

    /// Typed input value
    pub fn input<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        Ok(serde_json::from_value(self.input_value(key)?)?)
    }

    /// Store an output value without propagating it
    pub fn set_output<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let id = self.socket_id(Direction::Output, key)?;
        let value = serde_json::to_value(value)?;
        self.graph.set_socket_value(id, &value)
    }

    /// Flag an output changed and push it downstream
    pub fn update_output(&mut self, key: &str) {
        match self.socket_id(Direction::Output, key) {
            Ok(id) => self.graph.socket_update(id, false),
            Err(e) => tracing::warn!(node = %self.node, error = %e, "Cannot update output"),
        }
    }

    /// Store an output value and push it downstream
    pub fn emit<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        self.set_output(key, value)?;
        self.update_output(key);
        Ok(())
    }

    /// Flag every output changed
    pub fn update_all_outputs(&mut self) {
        let outputs: Vec<SocketId> = match self.graph.node(self.node) {
            Some(node) => node.outputs().iter().filter_map(|s| s.id()).collect(),
            None => return,
        };
        for id in outputs {
            self.graph.socket_update(id, false);
        }
    }
}

impl<C> Graph<C> {
    /// Run every dirty node in dependency order
    pub fn exec(&mut self, context: &mut C) -> Result<ExecReport> {
        self.exec_with(context, false)
    }

    /// Run every dirty node, optionally forcing a single sweep on cyclic graphs
    ///
    /// # Errors
    ///
    /// - [`GraphError::Cycle`] when the graph is cyclic and cycles are not allowed
    /// - [`GraphError::NodeExecution`] when a behavior fails; the pass stops there
    #[tracing::instrument(skip(self, context), fields(nodes = self.nodes.len()))]
    pub fn exec_with(&mut self, context: &mut C, force_single_solve: bool) -> Result<ExecReport> {
        if self.needs_resort() {
            tracing::debug!("Resorting graph");
            self.sort();
        }

        if self.is_cyclic() {
            if !self.flags.contains(GraphFlags::CYCLIC_ALLOWED) {
                return Err(GraphError::Cycle { node: None });
            }
            if !force_single_solve {
                return self.exec_cyclic(context);
            }
        }

        let executed = self.sweep(context)?;
        Ok(ExecReport {
            executed,
            iterations: 1,
            converged: true,
        })
    }

    /// One pass over the sortlist
    fn sweep(&mut self, context: &mut C) -> Result<usize> {
        let mut executed = 0;
        for id in self.sortlist.clone() {
            let Some(node) = self.node_map.get_mut(&id) else {
                continue;
            };
            if node.is_disabled() {
                continue;
            }
            node.flags.remove(NodeFlags::CYCLE_TAG);
            if !node.is_dirty() {
                continue;
            }
            node.flags.remove(NodeFlags::UPDATE);
            if self.exec_node(id, context)? {
                executed += 1;
            }
        }
        tracing::trace!(executed, "Sweep finished");
        Ok(executed)
    }

    /// Run one node's behavior; false when it could not run
    fn exec_node(&mut self, id: NodeId, context: &mut C) -> Result<bool> {
        let behavior = match self.node_map.get_mut(&id) {
            Some(node) => node.behavior.take(),
            None => return Ok(false),
        };
        let Some(mut behavior) = behavior else {
            tracing::warn!(node = %id, "Node is already executing; skipping re-entrant exec");
            // Keep the request so the next pass runs it
            if let Some(node) = self.node_map.get_mut(&id) {
                node.flags.insert(NodeFlags::UPDATE);
            }
            return Ok(false);
        };

        let result = {
            let mut cx = ExecCx::new(self, context, id);
            behavior.exec(&mut cx)
        };

        match self.node_map.get_mut(&id) {
            Some(node) => node.behavior = Some(behavior),
            None => tracing::debug!(node = %id, "Node removed itself during exec"),
        }

        result.map_err(|e| match e {
            GraphError::NodeExecution { .. } | GraphError::Cycle { .. } => e,
            other => GraphError::node_execution(id, other.to_string()),
        })?;
        Ok(true)
    }

    fn snapshot_values(&self) -> HashMap<SocketId, Value> {
        let mut snapshot = HashMap::new();
        for id in &self.sortlist {
            let Some(node) = self.node_map.get(id) else {
                continue;
            };
            if node.is_disabled() {
                continue;
            }
            for socket in node.all_sockets() {
                if let Some(socket_id) = socket.id() {
                    snapshot.insert(socket_id, socket.value());
                }
            }
        }
        snapshot
    }

    /// Summed change of sockets on nodes that are dirty again
    fn measure_change(&self, snapshot: &mut HashMap<SocketId, Value>) -> f64 {
        let mut change = 0.0;
        for id in &self.sortlist {
            let Some(node) = self.node_map.get(id) else {
                continue;
            };
            if node.is_disabled() || !node.is_dirty() {
                continue;
            }
            for socket in node.all_sockets() {
                let Some(socket_id) = socket.id() else {
                    continue;
                };
                let current = socket.value();
                if let Some(old) = snapshot.get(&socket_id) {
                    let diff = socket.kind().diff_value(old).abs();
                    if diff.is_nan() {
                        tracing::warn!(socket = %socket_id, socket_type = socket.type_name(), "Socket diff_value returned NaN");
                    } else {
                        change += diff;
                    }
                }
                snapshot.insert(socket_id, current);
            }
        }
        change
    }

    fn exec_cyclic(&mut self, context: &mut C) -> Result<ExecReport> {
        let max_steps = self.config.max_cycle_steps;
        let threshold = self.config.cycle_stop_threshold;
        let mut snapshot = self.snapshot_values();
        let mut report = ExecReport::default();

        for step in 0..max_steps {
            report.iterations += 1;
            report.executed += self.sweep(context)?;
            let change = self.measure_change(&mut snapshot);
            tracing::trace!(step, change, "Relaxation step");
            if change.abs() < threshold {
                report.converged = true;
                break;
            }
        }

        if !report.converged {
            tracing::warn!(steps = max_steps, "Cyclic solver stopped without converging");
        }
        Ok(report)
    }

    /// Run `start` and whatever depends on it, producers first
    ///
    /// Dirty producers of a node are brought up to date before the node
    /// runs; after running, dirty consumers are visited. With
    /// `check_start_parents` false, the start node's producers are ignored.
    ///
    /// # Errors
    ///
    /// - [`GraphError::NodeNotFound`] when `start` is not in the graph
    /// - [`GraphError::Cycle`] on re-entry into a node mid-visit, when a
    ///   node turns up again among its own dirty producers, or when the walk
    ///   exceeds `max_subtree_depth`
    /// - [`GraphError::NodeExecution`] when a behavior fails
    #[tracing::instrument(skip(self, context))]
    pub fn exec_subtree(
        &mut self,
        start: NodeId,
        context: &mut C,
        check_start_parents: bool,
    ) -> Result<ExecReport> {
        if !self.has(start) {
            return Err(GraphError::NodeNotFound(start));
        }
        if self.needs_resort() {
            tracing::debug!("Resorting graph");
            self.sort();
        }

        let mut walk = SubtreeWalk {
            start,
            check_start_parents,
            executed: 0,
            pulling: Vec::new(),
        };
        self.visit_subtree(&mut walk, start, context, 0, None)?;
        Ok(ExecReport {
            executed: walk.executed,
            iterations: 1,
            converged: true,
        })
    }

    fn runnable(&self, id: NodeId) -> bool {
        self.node_map
            .get(&id)
            .is_some_and(|n| n.is_dirty() && !n.is_disabled())
    }

    fn set_visiting(&mut self, id: NodeId, on: bool) {
        if let Some(node) = self.node_map.get_mut(&id) {
            node.flags.set(NodeFlags::CYCLE_TAG, on);
        }
    }

    fn visit_subtree(
        &mut self,
        walk: &mut SubtreeWalk,
        id: NodeId,
        context: &mut C,
        depth: usize,
        chain: Option<usize>,
    ) -> Result<()> {
        let Some(node) = self.node_map.get(&id) else {
            return Ok(());
        };
        if node.flags.contains(NodeFlags::CYCLE_TAG) {
            return Err(GraphError::Cycle { node: Some(id) });
        }
        // Reached through producers only, back where this upstream pull began
        if chain.is_some_and(|from| walk.pulling[from..].contains(&id)) {
            tracing::debug!(node = %id, "Dirty producers loop back to this node");
            return Err(GraphError::Cycle { node: Some(id) });
        }
        if depth >= self.config.max_subtree_depth {
            tracing::warn!(node = %id, depth, "Subtree exec exceeded the depth limit");
            return Err(GraphError::Cycle { node: Some(id) });
        }
        self.set_visiting(id, true);

        let mut found_parent = false;
        if id != walk.start || walk.check_start_parents {
            let from = chain.unwrap_or(walk.pulling.len());
            walk.pulling.push(id);
            for producer in self.producers(id) {
                if self.runnable(producer) {
                    self.set_visiting(id, false);
                    if let Err(e) = self.visit_subtree(walk, producer, context, depth + 1, Some(from)) {
                        walk.pulling.pop();
                        return Err(e);
                    }
                    found_parent = true;
                }
            }
            walk.pulling.pop();
        }
        if found_parent {
            return Ok(());
        }

        if self.runnable(id) {
            if let Some(node) = self.node_map.get_mut(&id) {
                node.flags.remove(NodeFlags::UPDATE);
            }
            match self.exec_node(id, context) {
                Ok(true) => walk.executed += 1,
                Ok(false) => {}
                Err(e) => {
                    self.set_visiting(id, false);
                    return Err(e);
                }
            }

            for consumer in self.consumers(id) {
                if self.runnable(consumer) {
                    if let Err(e) = self.visit_subtree(walk, consumer, context, depth + 1, None) {
                        self.set_visiting(id, false);
                        return Err(e);
                    }
                }
            }
        }

        self.set_visiting(id, false);
        Ok(())
    }
}

struct SubtreeWalk {
    start: NodeId,
    check_start_parents: bool,
    executed: usize,
    /// Nodes currently pulling their producers, innermost last
    pulling: Vec<NodeId>,
}
