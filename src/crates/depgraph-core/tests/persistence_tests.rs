//! Persistence integration tests
//!
//! Saves graphs, evolves the node types between save and load, and checks
//! that values, ids and connections survive.

use depgraph_core::sockets::{EnumSocket, FloatSocket, IntSocket, RgbaSocket, SocketRegistry, Vec4Socket};
use depgraph_core::{
    Direction, Graph, GraphConfig, GraphSave, Node, NodeDef, NodeFlags, NodeRegistry, Socket,
};
use serde_json::json;

fn sockets() -> SocketRegistry {
    SocketRegistry::with_builtin()
}

/// Version 1 of a small paint library
fn library_v1() -> NodeRegistry<()> {
    let mut registry = NodeRegistry::new();
    registry
        .register_default(NodeDef::new("source").output("c", Socket::new(Vec4Socket::default())))
        .unwrap();
    registry
        .register_default(
            NodeDef::new("paint")
                .input("color", Socket::new(Vec4Socket::default()))
                .input("mode", Socket::new(IntSocket::new(0)))
                .input("legacy", Socket::new(FloatSocket::new(0.0)))
                .output("out", Socket::new(FloatSocket::new(0.0))),
        )
        .unwrap();
    registry
}

/// Version 2: color became rgba, mode became an enum, legacy was dropped
/// and amount was added
fn library_v2() -> NodeRegistry<()> {
    let mut registry = NodeRegistry::new();
    registry
        .register_default(NodeDef::new("source").output("c", Socket::new(Vec4Socket::default())))
        .unwrap();
    registry
        .register_default(
            NodeDef::new("paint")
                .input("color", Socket::new(RgbaSocket::default()))
                .input(
                    "mode",
                    Socket::new(EnumSocket::new(0).with_item("normal", 0).with_item("multiply", 1)),
                )
                .input("amount", Socket::new(FloatSocket::new(1.0)))
                .output("out", Socket::new(FloatSocket::new(0.0))),
        )
        .unwrap();
    registry
}

#[test]
fn test_schema_drift_on_load() {
    let v1 = library_v1();
    let mut graph = Graph::new();
    let src = graph.add(v1.create("source").unwrap()).unwrap();
    let paint = graph.add(v1.create("paint").unwrap()).unwrap();
    graph.link(src, "c", paint, "color");
    let color = graph.socket_id(paint, Direction::Input, "color").unwrap();
    let mode = graph.socket_id(paint, Direction::Input, "mode").unwrap();
    graph.set_socket_value(color, &json!([0.5, 0.25, 0.125, 1.0])).unwrap();
    graph.set_socket_value(mode, &json!(1)).unwrap();

    let yaml = serde_yaml::to_string(&graph.save()).unwrap();
    let save: GraphSave = serde_yaml::from_str(&yaml).unwrap();
    let loaded = Graph::load(&save, &library_v2(), &sockets(), GraphConfig::default()).unwrap();

    let node = loaded.node(paint).unwrap();
    let keys: Vec<&str> = node.inputs().keys().collect();
    assert_eq!(keys, vec!["color", "mode", "amount", "legacy"]);

    let color_socket = node.input("color").unwrap();
    assert_eq!(color_socket.type_name(), "rgba");
    assert_eq!(color_socket.id(), Some(color));
    assert_eq!(color_socket.value(), json!([0.5, 0.25, 0.125, 1.0]));
    let src_out = loaded.socket_id(src, Direction::Output, "c").unwrap();
    assert!(loaded.socket_has(src_out, color));

    let mode_socket = node.input("mode").unwrap();
    assert_eq!(mode_socket.type_name(), "enum");
    assert_eq!(
        mode_socket.downcast_ref::<EnumSocket>().unwrap().item_name(),
        Some("multiply")
    );

    let amount = node.input("amount").unwrap();
    let amount_id = amount.id().unwrap();
    assert!(save.max_id().is_some_and(|max| amount_id.0 > max));
    assert_eq!(loaded.socket_owner(amount_id), Some(paint));
    assert_eq!(amount.value(), json!(1.0));
}

#[test]
fn test_proxy_relinks_with_type_change() {
    let v1 = library_v1();
    let mut graph = Graph::new();
    let src = graph.add(v1.create("source").unwrap()).unwrap();
    let paint = graph.add(v1.create("paint").unwrap()).unwrap();
    graph.link(src, "c", paint, "color");
    let color = graph.socket_id(paint, Direction::Input, "color").unwrap();
    graph.set_socket_value(color, &json!([0.1, 0.2, 0.3, 0.4])).unwrap();
    graph.node_mut(paint).unwrap().flags_mut().insert(NodeFlags::SAVE_PROXY);

    // The owning library persists the real node on its own
    let owner_save = graph.node(paint).unwrap().to_save();
    let save = graph.save();
    let proxy_save = save.nodes.iter().find(|n| n.id == Some(paint)).unwrap();
    assert!(proxy_save.proxy);
    assert!(proxy_save.payload.is_none());

    let v2 = library_v2();
    let mut loaded = Graph::load(&save, &v2, &sockets(), GraphConfig::default()).unwrap();
    let proxy = loaded.node(paint).unwrap();
    assert!(proxy.is_proxy());
    assert_eq!(proxy.input("color").unwrap().type_name(), "vec4");

    let real: Node<()> = Node::from_save(&owner_save, &v2, &sockets()).unwrap();
    assert_eq!(loaded.relink_proxy_owner(real).ok(), Some(paint));

    let node = loaded.node(paint).unwrap();
    assert!(!node.is_proxy());
    let color_socket = node.input("color").unwrap();
    assert_eq!(color_socket.type_name(), "rgba");
    assert_eq!(color_socket.value(), json!([0.1, 0.2, 0.3, 0.4]));

    let src_out = loaded.socket_id(src, Direction::Output, "c").unwrap();
    let color = loaded.socket_id(paint, Direction::Input, "color").unwrap();
    assert!(loaded.socket_has(src_out, color));
    assert_eq!(loaded.socket(src_out).unwrap().peers(), &[color]);
    assert!(loaded.needs_resort());

    loaded.exec(&mut ()).unwrap();
    assert!(!loaded.node(paint).unwrap().is_dirty());
}

#[test]
fn test_zombies_are_not_persisted() {
    let v1 = library_v1();
    let mut graph = Graph::new();
    let src = graph.add(v1.create("source").unwrap()).unwrap();
    let temp = graph.add(v1.create("paint").unwrap()).unwrap();
    graph.link(src, "c", temp, "color");
    graph.node_mut(temp).unwrap().flags_mut().insert(NodeFlags::ZOMBIE);

    let save = graph.save();
    assert_eq!(save.nodes.len(), 1);

    let loaded = Graph::load(&save, &v1, &sockets(), GraphConfig::default()).unwrap();
    assert!(!loaded.has(temp));
    let src_out = loaded.socket_id(src, Direction::Output, "c").unwrap();
    assert!(!loaded.socket(src_out).unwrap().is_connected());
}

#[test]
fn test_zombie_in_save_is_pruned() {
    let v1 = library_v1();
    let mut graph = Graph::new();
    let src = graph.add(v1.create("source").unwrap()).unwrap();
    let temp = graph.add(v1.create("paint").unwrap()).unwrap();
    graph.link(src, "c", temp, "color");

    let mut save = graph.save();
    for node in &mut save.nodes {
        if node.id == Some(temp) {
            node.flags.insert(NodeFlags::ZOMBIE);
        }
    }

    let loaded = Graph::load(&save, &v1, &sockets(), GraphConfig::default()).unwrap();
    assert_eq!(loaded.len(), 1);
    let src_out = loaded.socket_id(src, Direction::Output, "c").unwrap();
    assert!(loaded.socket(src_out).unwrap().peers().is_empty());
}

#[test]
fn test_removed_node_leaves_no_trace() {
    let v1 = library_v1();
    let mut graph = Graph::new();
    let src = graph.add(v1.create("source").unwrap()).unwrap();
    let paint = graph.add(v1.create("paint").unwrap()).unwrap();
    graph.link(src, "c", paint, "color");
    graph.set_selected(paint, true);
    graph.set_active(Some(paint));
    graph.sort();
    let color = graph.socket_id(paint, Direction::Input, "color").unwrap();

    let removed = graph.remove(paint).unwrap();
    assert_eq!(removed.id(), None);
    assert!(removed.all_sockets().all(|s| s.id().is_none() && s.peers().is_empty()));
    assert!(graph.socket(color).is_none());
    assert!(!graph.sortlist().contains(&paint));
    assert!(graph.selected().is_empty());
    assert_eq!(graph.active(), None);

    let src_out = graph.socket_id(src, Direction::Output, "c").unwrap();
    assert!(!graph.socket(src_out).unwrap().is_connected());

    let save = graph.save();
    assert_eq!(save.nodes.len(), 1);
    assert!(save.nodes[0].outputs[0].connections.is_empty());

    // The removed node can be attached again with fresh ids
    let again = graph.add(removed).unwrap();
    assert_ne!(again, paint);
}
