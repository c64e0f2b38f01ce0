use criterion::{black_box, criterion_group, criterion_main, Criterion};
use depgraph_core::sockets::{FloatSocket, SocketRegistry};
use depgraph_core::{
    Direction, ExecCx, Graph, GraphConfig, NodeBehavior, NodeDef, NodeId, NodeRegistry, Result, Socket,
};
use serde_json::json;

struct AddOne;

impl NodeBehavior<()> for AddOne {
    fn exec(&mut self, cx: &mut ExecCx<'_, ()>) -> Result<()> {
        let x: f64 = cx.input("in")?;
        cx.emit("out", x + 1.0)
    }
}

fn registry() -> NodeRegistry<()> {
    let mut registry = NodeRegistry::new();
    registry
        .register(
            NodeDef::new("add_one")
                .input("in", Socket::new(FloatSocket::new(0.0)))
                .output("out", Socket::new(FloatSocket::new(0.0))),
            || Box::new(AddOne),
        )
        .unwrap();
    registry
}

fn chain(registry: &NodeRegistry<()>, len: usize) -> (Graph<()>, Vec<NodeId>) {
    let mut graph = Graph::new();
    let ids: Vec<NodeId> = (0..len)
        .map(|_| graph.add(registry.create("add_one").unwrap()).unwrap())
        .collect();
    for pair in ids.windows(2) {
        graph.link(pair[0], "out", pair[1], "in");
    }
    (graph, ids)
}

fn sort_benchmark(c: &mut Criterion) {
    let registry = registry();
    let (mut graph, _) = chain(&registry, 1000);

    c.bench_function("sort 1000 node chain", |b| {
        b.iter(|| {
            graph.flag_resort();
            graph.sort();
            black_box(graph.sortlist().len());
        });
    });
}

fn exec_benchmark(c: &mut Criterion) {
    let registry = registry();
    let (mut graph, ids) = chain(&registry, 1000);
    let head = graph.socket_id(ids[0], Direction::Input, "in").unwrap();
    graph.exec(&mut ()).unwrap();

    c.bench_function("exec 1000 node chain", |b| {
        b.iter(|| {
            graph.set_and_update(head, &json!(1.0), true).unwrap();
            black_box(graph.exec(&mut ()).unwrap());
        });
    });
}

fn cyclic_benchmark(c: &mut Criterion) {
    let registry = registry();
    let (mut graph, ids) = chain(&registry, 50);
    graph.set_cyclic_allowed(true);
    graph.link(ids[49], "out", ids[0], "in");

    c.bench_function("relax 50 node ring", |b| {
        b.iter(|| {
            graph.node_update(ids[0]);
            black_box(graph.exec(&mut ()).unwrap());
        });
    });
}

fn persistence_benchmark(c: &mut Criterion) {
    let registry = registry();
    let sockets = SocketRegistry::with_builtin();
    let (graph, _) = chain(&registry, 500);
    let save = graph.save();

    c.bench_function("load 500 node chain", |b| {
        b.iter(|| {
            let loaded = Graph::load(black_box(&save), &registry, &sockets, GraphConfig::default()).unwrap();
            black_box(loaded.len());
        });
    });
}

criterion_group!(
    benches,
    sort_benchmark,
    exec_benchmark,
    cyclic_benchmark,
    persistence_benchmark
);
criterion_main!(benches);
