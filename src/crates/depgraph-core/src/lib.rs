//! # depgraph-core - Node/Socket Dependency Graphs
//!
//! A dataflow engine for editors and procedural tools: typed **sockets** on
//! **nodes**, connected into a **graph** that is scheduled in dependency order.
//! Values propagate along connections; only nodes marked dirty re-execute.
//!
//! ## Overview
//!
//! - **Typed sockets** - Float, int, bool, enum, vectors, colors, matrices and
//!   a value-less dependency socket, all behind the [`SocketKind`] trait
//! - **Inheritable node types** - [`NodeDef`]s declare sockets and flags, and
//!   may inherit or override a parent's
//! - **Three exec modes** - dependency order, iterative relaxation for
//!   cyclic graphs, and on-demand subtree pulls
//! - **Schema-tolerant persistence** - saves survive node types gaining,
//!   losing or retyping sockets
//! - **Proxies** - nodes owned by another document persist as lightweight
//!   shells and are relinked to the real node after load
//!
//! ## Core Concepts
//!
//! ### 1. Graph arena
//!
//! [`Graph`] owns every attached [`Node`] and indexes every socket. Nodes and
//! sockets are addressed by [`NodeId`] / [`SocketId`], issued from one
//! monotonic allocator and never reused. Connections are stored on both
//! endpoints, so `graph.socket_has(a, b) == graph.socket_has(b, a)`.
//!
//! ### 2. Dirty propagation
//!
//! ```text
//!   set_and_update(out)          exec()
//!   ───────────────────          ──────
//!   out.value = v                sort if RESORT
//!   push v to every peer  ──►    run nodes with UPDATE in order
//!   mark peer owners UPDATE      clear UPDATE
//!   request a tick
//! ```
//!
//! ### 3. Execution context
//!
//! Behaviors receive an [`ExecCx`] with mutable access to the graph and to a
//! host context `C` chosen by the application (a render target, an undo
//! stack, `()` in tests).
//!
//! ## Quick Start
//!
//! ```rust
//! use depgraph_core::sockets::FloatSocket;
//! use depgraph_core::{ExecCx, Graph, NodeBehavior, NodeDef, NodeRegistry, Result, Socket};
//!
//! struct Double;
//!
//! impl NodeBehavior<()> for Double {
//!     fn exec(&mut self, cx: &mut ExecCx<'_, ()>) -> Result<()> {
//!         let x: f64 = cx.input("x")?;
//!         cx.emit("y", x * 2.0)
//!     }
//! }
//!
//! let mut registry = NodeRegistry::<()>::new();
//! registry.register(
//!     NodeDef::new("double")
//!         .input("x", Socket::new(FloatSocket::new(0.0)))
//!         .output("y", Socket::new(FloatSocket::new(0.0))),
//!     || Box::new(Double),
//! )?;
//!
//! let mut graph = Graph::new();
//! let a = graph.add(registry.create("double")?).unwrap();
//! let b = graph.add(registry.create("double")?).unwrap();
//! graph.link(a, "y", b, "x");
//!
//! let x = graph.socket_id(a, depgraph_core::Direction::Input, "x").unwrap();
//! graph.set_and_update(x, &serde_json::json!(1.5), true)?;
//! graph.exec(&mut ())?;
//!
//! assert_eq!(graph.node(b).unwrap().output("y").unwrap().value(), serde_json::json!(6.0));
//! # Ok::<(), depgraph_core::GraphError>(())
//! ```
//!
//! ## Configuration
//!
//! Solver limits live in [`GraphConfig`], loadable from YAML:
//!
//! ```yaml
//! cyclic_allowed: true
//! max_cycle_steps: 64
//! cycle_stop_threshold: 0.0005
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber.
//! Structural corruption (dangling edges, failed value pushes, skipped nodes
//! on load) is reported at `warn`; sorting and registration at `debug`.

pub mod config;
pub mod error;
pub mod exec;
pub mod flags;
pub mod graph;
pub mod ids;
pub mod node;
pub mod persist;
pub mod registry;
pub mod socket;
pub mod sockets;
pub mod tick;

mod sort;

pub use config::GraphConfig;
pub use error::{GraphError, Result, SocketError};
pub use exec::{ExecCx, ExecReport};
pub use flags::{GraphFlags, NodeFlags, SocketFlags};
pub use graph::{Graph, SocketLoc};
pub use ids::{IdGen, NodeId, SocketId};
pub use node::{
    CallbackNode, DefaultBehavior, FlagDef, Node, NodeBehavior, NodeDef, NodeType, ResolvedDef, Sockets,
};
pub use persist::{GraphSave, NodeSave, SocketSave};
pub use registry::NodeRegistry;
pub use socket::{Direction, Socket, SocketKind, SocketMap};
pub use sockets::SocketRegistry;
pub use tick::{PendingTick, TickScheduler};
