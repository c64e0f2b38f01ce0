//! Registry of node types
//!
//! Inheritance between node types is resolved exactly once, when a type is
//! registered. Parents must be registered before their children, so the
//! chain of a new type is always complete.
//!
//! # Resolution rules
//!
//! **Flags**: a definition using [`FlagDef::Inherit`](crate::node::FlagDef::Inherit), or any type in the
//! chain carrying `FORCE_FLAG_INHERIT`, resolves to the OR of every flag set
//! in the chain. Otherwise the definition's own bits are used.
//!
//! **Sockets**: a table using [`Sockets::Inherit`], or any type in the chain
//! carrying `FORCE_SOCKET_INHERIT`, is merged with the parent's table. The
//! walk continues up the chain only while the level just merged itself asked
//! to inherit. Keys declared lower in the chain win.
//!
//! ```text
//!   base    : Own   { a, b }
//!   mid     : Inherit { b', c }     resolves to { a, b', c }
//!   leaf    : Inherit { d }         resolves to { a, b', c, d }
//!   other   : Own   { d }           resolves to { d }
//! ```

use crate::error::{GraphError, Result};
use crate::flags::NodeFlags;
use crate::node::{
    BehaviorFactory, DefaultBehavior, Node, NodeBehavior, NodeDef, NodeType, ResolvedDef, Sockets,
};
use crate::socket::{Direction, SocketMap};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Node types by name
pub struct NodeRegistry<C> {
    types: HashMap<String, Rc<NodeType<C>>>,
    defs: HashMap<String, NodeDef>,
}

impl<C> Default for NodeRegistry<C> {
    fn default() -> Self {
        Self {
            types: HashMap::new(),
            defs: HashMap::new(),
        }
    }
}

impl<C> fmt::Debug for NodeRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.types.keys().collect();
        names.sort();
        f.debug_struct("NodeRegistry").field("types", &names).finish()
    }
}

impl<C: 'static> NodeRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type with a behavior factory
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidDefinition`] for an empty or duplicate name or an
    /// unregistered parent.
    pub fn register<F>(&mut self, def: NodeDef, factory: F) -> Result<Rc<NodeType<C>>>
    where
        F: Fn() -> Box<dyn NodeBehavior<C>> + 'static,
    {
        let factory: BehaviorFactory<C> = Rc::new(factory);
        if def.name.is_empty() {
            return Err(GraphError::InvalidDefinition(
                "node type name must not be empty".to_string(),
            ));
        }
        if self.defs.contains_key(&def.name) {
            return Err(GraphError::InvalidDefinition(format!(
                "node type '{}' is already registered",
                def.name
            )));
        }

        let resolved = self.resolve(&def)?;
        tracing::debug!(
            node_type = %resolved.name,
            inputs = resolved.inputs.len(),
            outputs = resolved.outputs.len(),
            "Registered node type"
        );

        let ty = NodeType::from_resolved(resolved, factory);
        self.types.insert(def.name.clone(), Rc::clone(&ty));
        self.defs.insert(def.name.clone(), def);
        Ok(ty)
    }

    /// Register a node type whose behavior only forwards outputs
    pub fn register_default(&mut self, def: NodeDef) -> Result<Rc<NodeType<C>>> {
        self.register(def, || Box::new(DefaultBehavior))
    }

    pub fn get(&self, name: &str) -> Option<&Rc<NodeType<C>>> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate a detached node of a registered type
    pub fn create(&self, name: &str) -> Result<Node<C>> {
        self.get(name)
            .map(|ty| ty.instantiate())
            .ok_or_else(|| GraphError::UnknownNodeType(name.to_string()))
    }

    /// The resolved definition of a registered type
    pub fn final_def(&self, name: &str) -> Option<&ResolvedDef> {
        self.get(name).map(|ty| ty.def())
    }

    /// Definitions from `def` up to the root of its chain
    fn chain<'a>(&'a self, def: &'a NodeDef) -> Result<Vec<&'a NodeDef>> {
        let mut chain = vec![def];
        let mut parent = def.parent.as_deref();
        while let Some(name) = parent {
            let parent_def = self.defs.get(name).ok_or_else(|| {
                GraphError::InvalidDefinition(format!(
                    "parent '{}' of '{}' is not registered",
                    name, def.name
                ))
            })?;
            chain.push(parent_def);
            parent = parent_def.parent.as_deref();
        }
        Ok(chain)
    }

    fn resolve(&self, def: &NodeDef) -> Result<ResolvedDef> {
        let chain = self.chain(def)?;

        let all_flags = chain
            .iter()
            .fold(NodeFlags::empty(), |acc, level| acc | level.flags.bits());
        let flags = if def.flags.inherits() || all_flags.contains(NodeFlags::FORCE_FLAG_INHERIT) {
            all_flags
        } else {
            def.flags.bits()
        };

        let force_sockets = all_flags.contains(NodeFlags::FORCE_SOCKET_INHERIT);
        let inputs = merge_sockets(&chain, Direction::Input, force_sockets);
        let outputs = merge_sockets(&chain, Direction::Output, force_sockets);

        Ok(ResolvedDef::finish(
            def.name.clone(),
            def.ui_name.clone(),
            flags,
            inputs,
            outputs,
            chain.iter().map(|level| level.name.clone()).collect(),
        ))
    }
}

fn table(def: &NodeDef, direction: Direction) -> &Sockets {
    match direction {
        Direction::Input => &def.inputs,
        Direction::Output => &def.outputs,
    }
}

fn merge_sockets(chain: &[&NodeDef], direction: Direction, force: bool) -> SocketMap {
    // Levels merged into the result, most derived first
    let mut depth = 0;
    for level in chain {
        depth += 1;
        if !(table(level, direction).inherits() || force) {
            break;
        }
    }

    // Ancestors first so their keys keep the leading slots
    let mut merged = SocketMap::new();
    for level in chain[..depth].iter().rev() {
        for socket in table(level, direction).map().iter() {
            merged.insert(socket.key().to_string(), socket.detached_copy());
        }
    }
    merged
}
