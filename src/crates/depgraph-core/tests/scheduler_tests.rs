//! Scheduler integration tests
//!
//! Builds small graphs through the public API and checks ordering, dirty
//! propagation, the cyclic solver and subtree execution end to end.

use depgraph_core::sockets::{FloatSocket, SocketRegistry};
use depgraph_core::{
    CallbackNode, Direction, ExecCx, Graph, GraphConfig, GraphError, NodeBehavior, NodeDef, NodeId,
    NodeRegistry, PendingTick, Result, Socket, SocketError, SocketKind, SocketMap,
};
use serde_json::{json, Value};
use std::any::Any;
use std::rc::Rc;

/// Host context recording which nodes ran
type Log = Vec<NodeId>;

/// Sums every input into "out"
struct Sum;

impl NodeBehavior<Log> for Sum {
    fn exec(&mut self, cx: &mut ExecCx<'_, Log>) -> Result<()> {
        let id = cx.node_id();
        cx.context_mut().push(id);
        let keys: Vec<String> = match cx.node() {
            Some(node) => node.inputs().keys().map(str::to_string).collect(),
            None => return Ok(()),
        };
        let mut total = 0.0;
        for key in keys {
            total += cx.input::<f64>(&key)?;
        }
        cx.emit("out", total)
    }
}

fn registry() -> NodeRegistry<Log> {
    let mut registry = NodeRegistry::new();
    registry
        .register(
            NodeDef::new("sum")
                .input("a", Socket::new(FloatSocket::new(0.0)))
                .input("b", Socket::new(FloatSocket::new(0.0)))
                .output("out", Socket::new(FloatSocket::new(0.0))),
            || Box::new(Sum),
        )
        .unwrap();
    registry
}

fn input(graph: &Graph<Log>, node: NodeId, key: &str) -> depgraph_core::SocketId {
    graph.socket_id(node, Direction::Input, key).unwrap()
}

fn output_value(graph: &Graph<Log>, node: NodeId) -> Value {
    graph.node(node).unwrap().output("out").unwrap().value()
}

#[test]
fn test_chain_propagates_values() {
    let registry = registry();
    let mut graph = Graph::new();
    let c = graph.add(registry.create("sum").unwrap()).unwrap();
    let b = graph.add(registry.create("sum").unwrap()).unwrap();
    let a = graph.add(registry.create("sum").unwrap()).unwrap();
    graph.link(a, "out", b, "a");
    graph.link(b, "out", c, "a");

    graph.set_socket_value(input(&graph, a, "a"), &json!(2.0)).unwrap();
    graph.set_socket_value(input(&graph, b, "b"), &json!(1.0)).unwrap();
    graph.set_socket_value(input(&graph, c, "b"), &json!(10.0)).unwrap();

    let mut log = Log::new();
    let report = graph.exec(&mut log).unwrap();
    assert_eq!(log, vec![a, b, c]);
    assert_eq!(report.executed, 3);
    assert_eq!(output_value(&graph, c), json!(13.0));

    // Only the changed branch reruns
    log.clear();
    graph.set_and_update(input(&graph, b, "b"), &json!(5.0), true).unwrap();
    graph.exec(&mut log).unwrap();
    assert_eq!(log, vec![b, c]);
    assert_eq!(output_value(&graph, c), json!(17.0));
}

#[test]
fn test_diamond_runs_join_once() {
    let registry = registry();
    let mut graph = Graph::new();
    let a = graph.add(registry.create("sum").unwrap()).unwrap();
    let b = graph.add(registry.create("sum").unwrap()).unwrap();
    let c = graph.add(registry.create("sum").unwrap()).unwrap();
    let d = graph.add(registry.create("sum").unwrap()).unwrap();
    graph.link(a, "out", b, "a");
    graph.link(a, "out", c, "a");
    graph.link(b, "out", d, "a");
    graph.link(c, "out", d, "b");
    graph.set_socket_value(input(&graph, a, "a"), &json!(1.5)).unwrap();

    let mut log = Log::new();
    graph.exec(&mut log).unwrap();
    assert_eq!(log.iter().filter(|id| **id == d).count(), 1);
    assert_eq!(log.first(), Some(&a));
    assert_eq!(log.last(), Some(&d));
    assert_eq!(output_value(&graph, d), json!(3.0));
}

/// Socket kind whose changes never register with the solver
#[derive(Debug, Clone, Default)]
struct Marker(f64);

impl SocketKind for Marker {
    fn type_name(&self) -> &'static str {
        "marker"
    }

    fn lineage(&self) -> &'static [&'static str] {
        &["marker"]
    }

    fn value(&self) -> Value {
        json!(self.0)
    }

    fn set_value(&mut self, value: &Value) -> std::result::Result<(), SocketError> {
        self.0 = value
            .as_f64()
            .ok_or_else(|| SocketError::mismatch("marker", value))?;
        Ok(())
    }

    fn diff_value(&self, _other: &Value) -> f64 {
        0.0
    }

    fn box_clone(&self) -> Box<dyn SocketKind> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn test_cycle_with_zero_change_converges_in_one_step() {
    let mut registry = NodeRegistry::<Log>::new();
    registry
        .register(
            NodeDef::new("bump")
                .input("a", Socket::new(Marker(0.0)))
                .output("out", Socket::new(Marker(0.0))),
            || Box::new(Sum),
        )
        .unwrap();

    let mut graph = Graph::with_config(GraphConfig::new().with_cyclic_allowed(true));
    let a = graph.add(registry.create("bump").unwrap()).unwrap();
    let b = graph.add(registry.create("bump").unwrap()).unwrap();
    graph.link(a, "out", b, "a");
    graph.link(b, "out", a, "a");

    let report = graph.exec(&mut Log::new()).unwrap();
    assert!(graph.is_cyclic());
    assert!(report.converged);
    assert_eq!(report.iterations, 1);
}

#[test]
fn test_cycle_without_convergence_stops_at_step_limit() {
    let registry = registry();
    let config = GraphConfig::new().with_cyclic_allowed(true).with_max_cycle_steps(5);
    let mut graph = Graph::with_config(config);
    let a = graph.add(registry.create("sum").unwrap()).unwrap();
    let b = graph.add(registry.create("sum").unwrap()).unwrap();
    graph.link(a, "out", b, "a");
    graph.link(b, "out", a, "a");
    graph.set_socket_value(input(&graph, a, "b"), &json!(1.0)).unwrap();

    let report = graph.exec(&mut Log::new()).unwrap();
    assert!(!report.converged);
    assert_eq!(report.iterations, 5);
}

#[test]
fn test_cycle_error_when_forbidden() {
    let registry = registry();
    let mut graph = Graph::new();
    let a = graph.add(registry.create("sum").unwrap()).unwrap();
    assert!(graph.link(a, "out", a, "b"));

    let mut log = Log::new();
    assert!(matches!(graph.exec(&mut log), Err(GraphError::Cycle { node: None })));
    assert!(log.is_empty());
}

#[test]
fn test_subtree_pulls_dirty_producers() {
    let registry = registry();
    let mut graph = Graph::new();
    let a = graph.add(registry.create("sum").unwrap()).unwrap();
    let b = graph.add(registry.create("sum").unwrap()).unwrap();
    let unrelated = graph.add(registry.create("sum").unwrap()).unwrap();
    graph.link(a, "out", b, "a");
    graph.set_socket_value(input(&graph, a, "a"), &json!(4.0)).unwrap();

    let mut log = Log::new();
    graph.exec_subtree(b, &mut log, true).unwrap();
    assert_eq!(log, vec![a, b]);
    assert_eq!(output_value(&graph, b), json!(4.0));
    assert!(graph.node(unrelated).unwrap().is_dirty());
}

#[test]
fn test_node_can_edit_graph_during_exec() {
    let registry = registry();
    let mut graph = Graph::new();
    let victim = graph.add(registry.create("sum").unwrap()).unwrap();
    let remover = CallbackNode::create(
        "remover",
        move |cx: &mut ExecCx<'_, Log>| {
            cx.graph_mut().remove(victim);
            Ok(())
        },
        SocketMap::new(),
        SocketMap::new(),
    );
    let remover = graph.add(remover).unwrap();
    assert!(graph.push_to_front(remover));

    let mut log = Log::new();
    graph.exec(&mut log).unwrap();
    assert!(!graph.has(victim));
    assert!(log.is_empty());
}

#[test]
fn test_reentrant_exec_skips_running_node() {
    let mut graph: Graph<Log> = Graph::new();
    let node = CallbackNode::create(
        "reentrant",
        |cx: &mut ExecCx<'_, Log>| {
            let id = cx.node_id();
            let (graph, log) = cx.split();
            log.push(id);
            graph.node_update(id);
            graph.exec(log).map(|_| ())
        },
        SocketMap::new(),
        SocketMap::new(),
    );
    let id = graph.add(node).unwrap();

    let mut log = Log::new();
    graph.exec(&mut log).unwrap();
    assert_eq!(log, vec![id]);
    // The update requested mid-exec survives the skipped nested run
    assert!(graph.node(id).unwrap().is_dirty());

    graph.exec(&mut log).unwrap();
    assert_eq!(log, vec![id, id]);
}

#[test]
fn test_updates_request_ticks() {
    let registry = registry();
    let tick = Rc::new(PendingTick::new());
    let mut graph = Graph::new().with_scheduler(tick.clone());
    let a = graph.add(registry.create("sum").unwrap()).unwrap();
    assert!(!tick.is_pending());

    graph.set_and_update(input(&graph, a, "a"), &json!(1.0), true).unwrap();
    assert!(tick.take());
    assert!(!tick.is_pending());
}

#[test]
fn test_unknown_socket_type_rejected() {
    let sockets = SocketRegistry::with_builtin();
    assert!(matches!(sockets.create("quaternion"), Err(GraphError::UnknownSocketType(_))));
}
