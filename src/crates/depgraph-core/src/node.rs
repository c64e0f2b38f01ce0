//! Node type definitions, behaviors and node instances
//!
//! A node type is declared once as a [`NodeDef`]: a name, an optional parent
//! type, flag bits and two socket tables. Registering the definition in a
//! [`NodeRegistry`](crate::NodeRegistry) resolves inheritance into a
//! [`ResolvedDef`], which every instance of the type is stamped from.
//!
//! ```text
//!   NodeDef ──register──► NodeType { ResolvedDef, factory }
//!                               │
//!                               │ instantiate
//!                               ▼
//!                          Node { sockets, flags, behavior }
//! ```
//!
//! Computation lives in a [`NodeBehavior`]. The scheduler takes the behavior
//! out of the node while it runs, so `exec` can freely borrow the graph
//! through its [`ExecCx`].
//!
//! # Example
//!
//! ```rust
//! use depgraph_core::{ExecCx, NodeBehavior, NodeDef, NodeRegistry, Result, Socket};
//! use depgraph_core::sockets::FloatSocket;
//!
//! struct Double;
//!
//! impl NodeBehavior<()> for Double {
//!     fn exec(&mut self, cx: &mut ExecCx<'_, ()>) -> Result<()> {
//!         let x: f64 = cx.input("x")?;
//!         cx.set_output("y", x * 2.0)?;
//!         cx.update_output("y");
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = NodeRegistry::<()>::new();
//! registry.register(
//!     NodeDef::new("double")
//!         .input("x", Socket::new(FloatSocket::new(0.0)))
//!         .output("y", Socket::new(FloatSocket::new(0.0))),
//!     || Box::new(Double),
//! ).unwrap();
//!
//! let node = registry.create("double").unwrap();
//! assert!(node.is_dirty());
//! assert_eq!(node.inputs().len(), 1);
//! ```

use crate::error::{GraphError, Result};
use crate::exec::ExecCx;
use crate::flags::NodeFlags;
use crate::ids::NodeId;
use crate::socket::{Direction, Socket, SocketMap};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Flag bits of a definition, either standalone or merged with ancestors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagDef {
    /// Use these bits only
    Own(NodeFlags),
    /// OR these bits with every ancestor's bits
    Inherit(NodeFlags),
}

impl FlagDef {
    pub fn bits(&self) -> NodeFlags {
        match self {
            FlagDef::Own(bits) | FlagDef::Inherit(bits) => *bits,
        }
    }

    pub fn inherits(&self) -> bool {
        matches!(self, FlagDef::Inherit(_))
    }
}

impl Default for FlagDef {
    fn default() -> Self {
        FlagDef::Own(NodeFlags::empty())
    }
}

/// Socket table of a definition, either standalone or merged with ancestors
#[derive(Debug, Clone)]
pub enum Sockets {
    /// Use these sockets only
    Own(SocketMap),
    /// Merge with the parent's table; keys declared here win
    Inherit(SocketMap),
}

impl Sockets {
    pub fn map(&self) -> &SocketMap {
        match self {
            Sockets::Own(map) | Sockets::Inherit(map) => map,
        }
    }

    fn map_mut(&mut self) -> &mut SocketMap {
        match self {
            Sockets::Own(map) | Sockets::Inherit(map) => map,
        }
    }

    pub fn inherits(&self) -> bool {
        matches!(self, Sockets::Inherit(_))
    }

    fn into_inherit(self) -> Self {
        match self {
            Sockets::Own(map) | Sockets::Inherit(map) => Sockets::Inherit(map),
        }
    }
}

impl Default for Sockets {
    fn default() -> Self {
        Sockets::Own(SocketMap::new())
    }
}

/// Static description of a node type
#[derive(Debug, Clone, Default)]
pub struct NodeDef {
    /// Unique type name, used for registry lookup and persistence
    pub name: String,
    /// Human-readable name
    pub ui_name: Option<String>,
    /// Parent type name, which must be registered first
    pub parent: Option<String>,
    pub flags: FlagDef,
    pub inputs: Sockets,
    pub outputs: Sockets,
}

impl NodeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_ui_name(mut self, ui_name: impl Into<String>) -> Self {
        self.ui_name = Some(ui_name.into());
        self
    }

    /// Derive from a registered type
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_flags(mut self, flags: FlagDef) -> Self {
        self.flags = flags;
        self
    }

    /// Use these flag bits only
    pub fn own_flags(self, flags: NodeFlags) -> Self {
        self.with_flags(FlagDef::Own(flags))
    }

    /// OR these flag bits with every ancestor's
    pub fn inherit_flags(self, flags: NodeFlags) -> Self {
        self.with_flags(FlagDef::Inherit(flags))
    }

    pub fn with_inputs(mut self, inputs: Sockets) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Sockets) -> Self {
        self.outputs = outputs;
        self
    }

    /// Add an input socket, keeping the table's inheritance mode
    pub fn input(mut self, key: impl Into<String>, socket: Socket) -> Self {
        self.inputs.map_mut().insert(key, socket);
        self
    }

    /// Add an output socket, keeping the table's inheritance mode
    pub fn output(mut self, key: impl Into<String>, socket: Socket) -> Self {
        self.outputs.map_mut().insert(key, socket);
        self
    }

    /// Merge the input table with the parent's
    pub fn inherit_inputs(mut self) -> Self {
        self.inputs = self.inputs.into_inherit();
        self
    }

    /// Merge the output table with the parent's
    pub fn inherit_outputs(mut self) -> Self {
        self.outputs = self.outputs.into_inherit();
        self
    }
}

/// A node type definition after inheritance has been applied
#[derive(Debug, Clone)]
pub struct ResolvedDef {
    pub name: String,
    pub ui_name: String,
    pub flags: NodeFlags,
    pub inputs: SocketMap,
    pub outputs: SocketMap,
    /// This type's name followed by its ancestors' names
    pub lineage: Vec<String>,
}

impl ResolvedDef {
    /// Finish a definition: fix socket direction, key and display name
    pub(crate) fn finish(
        name: String,
        ui_name: Option<String>,
        flags: NodeFlags,
        mut inputs: SocketMap,
        mut outputs: SocketMap,
        lineage: Vec<String>,
    ) -> Self {
        fix_up_map(&mut inputs, Direction::Input);
        fix_up_map(&mut outputs, Direction::Output);
        Self {
            ui_name: ui_name.unwrap_or_else(|| name.clone()),
            name,
            flags,
            inputs,
            outputs,
            lineage,
        }
    }

    pub fn sockets(&self, direction: Direction) -> &SocketMap {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    /// True when this type is `name` or derives from it
    pub fn is_a(&self, name: &str) -> bool {
        self.lineage.iter().any(|n| n == name)
    }
}

fn fix_up_map(map: &mut SocketMap, direction: Direction) {
    for socket in map.iter_mut() {
        let key = socket.key().to_string();
        socket.fix_up(direction, &key);
    }
}

/// The computation attached to a node
///
/// Every method has a default, so a behavior only overrides what it needs.
/// The default `exec` marks every output dirty, which forwards the node's
/// current output values downstream.
pub trait NodeBehavior<C> {
    /// Run the node
    fn exec(&mut self, cx: &mut ExecCx<'_, C>) -> Result<()> {
        cx.update_all_outputs();
        Ok(())
    }

    /// Opaque per-node data written alongside the node's sockets
    fn save_payload(&self) -> Option<Value> {
        None
    }

    /// Restore data written by [`save_payload`](Self::save_payload)
    fn load_payload(&mut self, _payload: &Value) -> Result<()> {
        Ok(())
    }
}

/// Behavior that only forwards outputs
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBehavior;

impl<C> NodeBehavior<C> for DefaultBehavior {}

/// Behavior of proxy nodes: does nothing until the real node replaces it
#[derive(Debug, Clone, Copy, Default)]
struct ProxyBehavior;

impl<C> NodeBehavior<C> for ProxyBehavior {
    fn exec(&mut self, _cx: &mut ExecCx<'_, C>) -> Result<()> {
        Ok(())
    }
}

/// Builds a fresh behavior for each new instance of a type
pub type BehaviorFactory<C> = Rc<dyn Fn() -> Box<dyn NodeBehavior<C>>>;

/// A registered node type
pub struct NodeType<C> {
    def: ResolvedDef,
    factory: BehaviorFactory<C>,
}

impl<C> fmt::Debug for NodeType<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType").field("def", &self.def).finish_non_exhaustive()
    }
}

impl<C> NodeType<C> {
    pub(crate) fn from_resolved(def: ResolvedDef, factory: BehaviorFactory<C>) -> Rc<Self> {
        Rc::new(Self { def, factory })
    }

    /// Build a type that has no parent, without a registry
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidDefinition`] when the definition names a parent.
    pub fn standalone<F>(def: NodeDef, factory: F) -> Result<Rc<Self>>
    where
        F: Fn() -> Box<dyn NodeBehavior<C>> + 'static,
    {
        if let Some(parent) = &def.parent {
            return Err(GraphError::InvalidDefinition(format!(
                "'{}' derives from '{}' and must be registered",
                def.name, parent
            )));
        }
        let lineage = vec![def.name.clone()];
        let resolved = ResolvedDef::finish(
            def.name,
            def.ui_name,
            def.flags.bits(),
            def.inputs.map().clone(),
            def.outputs.map().clone(),
            lineage,
        );
        Ok(Self::from_resolved(resolved, Rc::new(factory)))
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// The resolved definition
    pub fn def(&self) -> &ResolvedDef {
        &self.def
    }

    /// Stamp out a new detached node of this type
    pub fn instantiate(self: &Rc<Self>) -> Node<C> {
        Node {
            id: None,
            ty: Rc::clone(self),
            ui_name: None,
            flags: self.def.flags | NodeFlags::UPDATE,
            inputs: self.def.inputs.clone(),
            outputs: self.def.outputs.clone(),
            behavior: Some((self.factory)()),
            proxy: false,
        }
    }
}

impl<C: 'static> NodeType<C> {
    /// Type used for proxy nodes restored from a save
    pub(crate) fn proxy(type_name: &str) -> Rc<Self> {
        let def = ResolvedDef::finish(
            type_name.to_string(),
            None,
            NodeFlags::empty(),
            SocketMap::new(),
            SocketMap::new(),
            vec![type_name.to_string()],
        );
        Self::from_resolved(def, Rc::new(|| Box::new(ProxyBehavior) as Box<dyn NodeBehavior<C>>))
    }
}

/// A node instance
///
/// Created detached (no id) from a [`NodeType`], attached with
/// [`Graph::add`](crate::Graph::add) and handed back by
/// [`Graph::remove`](crate::Graph::remove).
pub struct Node<C> {
    pub(crate) id: Option<NodeId>,
    pub(crate) ty: Rc<NodeType<C>>,
    pub(crate) ui_name: Option<String>,
    pub(crate) flags: NodeFlags,
    pub(crate) inputs: SocketMap,
    pub(crate) outputs: SocketMap,
    pub(crate) behavior: Option<Box<dyn NodeBehavior<C>>>,
    pub(crate) proxy: bool,
}

impl<C> fmt::Debug for Node<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type", &self.ty.def.name)
            .field("flags", &self.flags)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl<C> Node<C> {
    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    pub fn node_type(&self) -> &Rc<NodeType<C>> {
        &self.ty
    }

    pub fn type_name(&self) -> &str {
        &self.ty.def.name
    }

    /// Display name, falling back to the type's display name
    pub fn ui_name(&self) -> &str {
        self.ui_name.as_deref().unwrap_or(&self.ty.def.ui_name)
    }

    pub fn set_ui_name(&mut self, name: impl Into<String>) {
        self.ui_name = Some(name.into());
    }

    /// Type display name followed by the id
    pub fn display_name(&self) -> String {
        match self.id {
            Some(id) => format!("{} {}", self.ty.def.ui_name, id),
            None => format!("{} (detached)", self.ty.def.ui_name),
        }
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut NodeFlags {
        &mut self.flags
    }

    /// True when the node needs execution
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(NodeFlags::UPDATE)
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.contains(NodeFlags::DISABLED)
    }

    /// True for placeholders restored from a proxy save
    pub fn is_proxy(&self) -> bool {
        self.proxy
    }

    /// Mark the node as needing execution
    ///
    /// Does not request a tick; use [`Graph::node_update`](crate::Graph::node_update)
    /// for that.
    pub fn graph_update(&mut self) {
        self.flags.insert(NodeFlags::UPDATE);
    }

    pub fn inputs(&self) -> &SocketMap {
        &self.inputs
    }

    pub fn outputs(&self) -> &SocketMap {
        &self.outputs
    }

    pub fn inputs_mut(&mut self) -> &mut SocketMap {
        &mut self.inputs
    }

    pub fn outputs_mut(&mut self) -> &mut SocketMap {
        &mut self.outputs
    }

    pub fn sockets(&self, direction: Direction) -> &SocketMap {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    pub fn sockets_mut(&mut self, direction: Direction) -> &mut SocketMap {
        match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        }
    }

    pub fn input(&self, key: &str) -> Option<&Socket> {
        self.inputs.get(key)
    }

    pub fn output(&self, key: &str) -> Option<&Socket> {
        self.outputs.get(key)
    }

    /// Every socket, inputs first
    pub fn all_sockets(&self) -> impl Iterator<Item = &Socket> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub(crate) fn all_sockets_mut(&mut self) -> impl Iterator<Item = &mut Socket> {
        self.inputs.iter_mut().chain(self.outputs.iter_mut())
    }

    /// Fresh detached instance with this node's socket values, names and flags
    ///
    /// Connections and ids are not copied. Behavior state travels through the
    /// behavior's payload.
    pub fn copy(&self) -> Node<C> {
        let mut node = self.ty.instantiate();
        node.flags = self.flags.persistent();
        node.ui_name = self.ui_name.clone();
        node.proxy = self.proxy;

        for direction in [Direction::Input, Direction::Output] {
            for socket in self.sockets(direction).iter() {
                node.sockets_mut(direction)
                    .insert(socket.key().to_string(), socket.detached_copy());
            }
        }

        let payload = self.behavior.as_ref().and_then(|b| b.save_payload());
        if let (Some(payload), Some(behavior)) = (payload, node.behavior.as_mut()) {
            if let Err(e) = behavior.load_payload(&payload) {
                tracing::warn!(node = %self.display_name(), error = %e, "Failed to copy node payload");
            }
        }
        node
    }

    /// Reset the ids of the node and its sockets
    pub(crate) fn detach(&mut self) {
        self.id = None;
        for socket in self.all_sockets_mut() {
            socket.id = None;
            socket.owner = None;
            socket.peers.clear();
        }
    }
}

/// Ad-hoc node whose exec runs a closure
///
/// Callback nodes are flagged ZOMBIE, so they run like any other node but
/// are never persisted. Hosts use them to hook UI handlers into the
/// dependency order.
///
/// ```rust
/// use depgraph_core::{CallbackNode, Graph, NodeFlags};
/// use depgraph_core::socket::SocketMap;
///
/// let node = CallbackNode::create::<u32, _>(
///     "on_change",
///     |cx| {
///         *cx.context_mut() += 1;
///         Ok(())
///     },
///     SocketMap::new(),
///     SocketMap::new(),
/// );
/// assert!(node.flags().contains(NodeFlags::ZOMBIE));
///
/// let mut graph = Graph::new();
/// graph.add(node);
/// let mut calls = 0;
/// graph.exec(&mut calls).unwrap();
/// assert_eq!(calls, 1);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CallbackNode;

type Callback<C> = Rc<dyn Fn(&mut ExecCx<'_, C>) -> Result<()>>;

struct CallbackBehavior<C> {
    callback: Callback<C>,
}

impl<C: 'static> NodeBehavior<C> for CallbackBehavior<C> {
    fn exec(&mut self, cx: &mut ExecCx<'_, C>) -> Result<()> {
        (self.callback)(cx)
    }
}

impl CallbackNode {
    /// Type name shared by every callback node
    pub const TYPE_NAME: &'static str = "callback";

    /// Build a detached callback node
    pub fn create<C: 'static, F>(
        name: impl Into<String>,
        callback: F,
        inputs: SocketMap,
        outputs: SocketMap,
    ) -> Node<C>
    where
        F: Fn(&mut ExecCx<'_, C>) -> Result<()> + 'static,
    {
        let callback: Callback<C> = Rc::new(callback);
        let def = ResolvedDef::finish(
            Self::TYPE_NAME.to_string(),
            Some(name.into()),
            NodeFlags::ZOMBIE,
            inputs,
            outputs,
            vec![Self::TYPE_NAME.to_string()],
        );
        let factory: BehaviorFactory<C> = Rc::new(move || {
            Box::new(CallbackBehavior {
                callback: Rc::clone(&callback),
            }) as Box<dyn NodeBehavior<C>>
        });
        NodeType::from_resolved(def, factory).instantiate()
    }
}
