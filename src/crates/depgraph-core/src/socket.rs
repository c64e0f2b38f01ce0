//! Sockets: typed, directional endpoints owned by a node
//!
//! A [`Socket`] couples graph bookkeeping (id, owner, direction, key, flags and
//! peer ids) with a value held behind the object-safe [`SocketKind`] trait.
//! Values cross the trait boundary as `serde_json::Value`, which keeps the
//! trait usable for custom kinds and gives persistence a uniform shape.
//!
//! # Socket states
//!
//! ```text
//!   Socket::new(kind) ──► template (no id, no owner)
//!          │
//!          │ NodeType::instantiate / Node::copy
//!          ▼
//!   detached socket in a node (no id)
//!          │
//!          │ Graph::add
//!          ▼
//!   attached socket (id + owner set, peers resolvable through the graph)
//! ```
//!
//! Connections are stored on both endpoints as [`SocketId`]s. Only the graph
//! mutates them, which keeps membership mutual.

use crate::error::SocketError;
use crate::flags::SocketFlags;
use crate::ids::{NodeId, SocketId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;

/// Direction of a socket relative to its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Consumes values from upstream outputs
    Input,
    /// Produces values for downstream inputs
    Output,
}

impl Direction {
    /// The direction a peer socket must have
    pub fn opposite(self) -> Self {
        match self {
            Direction::Input => Direction::Output,
            Direction::Output => Direction::Input,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Value storage and comparison for one socket type
///
/// Implementations hold the typed value and convert it to and from JSON.
/// `lineage` lists the type's own name followed by the names of the types it
/// refines (`["rgba", "vec4"]`); schema migration treats two kinds as
/// compatible when either lineage contains the other's type name.
///
/// # Example
///
/// ```rust
/// use depgraph_core::socket::SocketKind;
/// use depgraph_core::SocketError;
/// use serde_json::{json, Value};
/// use std::any::Any;
///
/// #[derive(Debug, Clone, Default)]
/// struct Label(String);
///
/// impl SocketKind for Label {
///     fn type_name(&self) -> &'static str { "label" }
///     fn lineage(&self) -> &'static [&'static str] { &["label"] }
///     fn value(&self) -> Value { json!(self.0) }
///     fn set_value(&mut self, value: &Value) -> Result<(), SocketError> {
///         match value.as_str() {
///             Some(s) => { self.0 = s.to_string(); Ok(()) }
///             None => Err(SocketError::mismatch("label", value)),
///         }
///     }
///     fn diff_value(&self, other: &Value) -> f64 {
///         if other.as_str() == Some(self.0.as_str()) { 0.0 } else { 1.0 }
///     }
///     fn box_clone(&self) -> Box<dyn SocketKind> { Box::new(self.clone()) }
///     fn as_any(&self) -> &dyn Any { self }
///     fn as_any_mut(&mut self) -> &mut dyn Any { self }
/// }
/// ```
pub trait SocketKind: Any + fmt::Debug {
    /// Registered type name
    fn type_name(&self) -> &'static str;

    /// Own type name followed by ancestor type names
    fn lineage(&self) -> &'static [&'static str];

    /// Current value
    fn value(&self) -> Value;

    /// Replace the value, rejecting shapes the type cannot hold
    fn set_value(&mut self, value: &Value) -> Result<(), SocketError>;

    /// Copy the value of another socket kind
    fn copy_value(&mut self, other: &dyn SocketKind) -> Result<(), SocketError> {
        self.set_value(&other.value())
    }

    /// Signed comparison against a value; zero means equal
    fn cmp_value(&self, other: &Value) -> f64 {
        self.diff_value(other)
    }

    /// Non-negative change magnitude against a value
    ///
    /// Used by the cyclic solver to measure convergence. Values of the wrong
    /// shape return NaN, which the solver logs and ignores.
    fn diff_value(&self, other: &Value) -> f64;

    /// Pick up template state after a load (enum item tables and the like)
    fn absorb_template(&mut self, _template: &dyn SocketKind) {}

    /// Clone into a new box
    fn box_clone(&self) -> Box<dyn SocketKind>;

    /// Upcast for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn SocketKind> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// True when one kind refines the other
pub fn is_lineage_related(a: &dyn SocketKind, b: &dyn SocketKind) -> bool {
    a.type_name() == b.type_name()
        || a.lineage().contains(&b.type_name())
        || b.lineage().contains(&a.type_name())
}

/// A typed endpoint owned by a node
#[derive(Debug, Clone)]
pub struct Socket {
    pub(crate) id: Option<SocketId>,
    pub(crate) owner: Option<NodeId>,
    pub(crate) direction: Direction,
    pub(crate) key: String,
    pub(crate) ui_name: Option<String>,
    pub(crate) flags: SocketFlags,
    pub(crate) peers: Vec<SocketId>,
    pub(crate) kind: Box<dyn SocketKind>,
}

impl Socket {
    /// Create a detached input socket around a kind
    ///
    /// Direction and key are fixed when the socket is placed in a node
    /// definition.
    pub fn new(kind: impl SocketKind) -> Self {
        Self::from_kind(Box::new(kind))
    }

    /// Create a detached socket around a boxed kind
    pub fn from_kind(kind: Box<dyn SocketKind>) -> Self {
        Self {
            id: None,
            owner: None,
            direction: Direction::Input,
            key: String::new(),
            ui_name: None,
            flags: SocketFlags::empty(),
            peers: Vec::new(),
            kind,
        }
    }

    /// Add flag bits
    pub fn with_flags(mut self, flags: SocketFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    /// Set the display name
    pub fn with_ui_name(mut self, name: impl Into<String>) -> Self {
        self.ui_name = Some(name.into());
        self
    }

    pub fn id(&self) -> Option<SocketId> {
        self.id
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Display name, falling back to the key
    pub fn ui_name(&self) -> &str {
        self.ui_name.as_deref().unwrap_or(&self.key)
    }

    pub fn set_ui_name(&mut self, name: impl Into<String>) {
        self.ui_name = Some(name.into());
    }

    pub fn flags(&self) -> SocketFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut SocketFlags {
        &mut self.flags
    }

    /// True when more than one connection is accepted
    pub fn is_multi(&self) -> bool {
        self.flags.contains(SocketFlags::MULTI)
    }

    /// Connected peer ids in connection order
    pub fn peers(&self) -> &[SocketId] {
        &self.peers
    }

    pub fn is_connected(&self) -> bool {
        !self.peers.is_empty()
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn kind(&self) -> &dyn SocketKind {
        self.kind.as_ref()
    }

    pub fn kind_mut(&mut self) -> &mut dyn SocketKind {
        self.kind.as_mut()
    }

    pub fn value(&self) -> Value {
        self.kind.value()
    }

    /// Store a value without flagging anything
    ///
    /// Use [`Graph::set_and_update`](crate::Graph::set_and_update) to also
    /// propagate the change.
    pub fn set_value(&mut self, value: &Value) -> Result<(), SocketError> {
        self.kind.set_value(value)
    }

    /// Typed view of the kind
    pub fn downcast_ref<T: SocketKind>(&self) -> Option<&T> {
        self.kind.as_any().downcast_ref::<T>()
    }

    /// Mutable typed view of the kind
    pub fn downcast_mut<T: SocketKind>(&mut self) -> Option<&mut T> {
        self.kind.as_any_mut().downcast_mut::<T>()
    }

    /// Copy of the socket without id, owner or connections
    pub fn detached_copy(&self) -> Self {
        Self {
            id: None,
            owner: None,
            direction: self.direction,
            key: self.key.clone(),
            ui_name: self.ui_name.clone(),
            flags: self.flags,
            peers: Vec::new(),
            kind: self.kind.box_clone(),
        }
    }

    /// Fix direction and key for a slot of a resolved definition
    ///
    /// The display name defaults to the key and output sockets become MULTI
    /// unless they opted out with NO_MULTI_OUTPUTS.
    pub(crate) fn fix_up(&mut self, direction: Direction, key: &str) {
        self.direction = direction;
        self.key = key.to_string();
        if self.ui_name.is_none() {
            self.ui_name = Some(key.to_string());
        }
        if direction == Direction::Output && !self.flags.contains(SocketFlags::NO_MULTI_OUTPUTS) {
            self.flags.insert(SocketFlags::MULTI);
        }
    }

    /// Merge template state into a socket read from a save
    ///
    /// Template flags are OR'ed in (UPDATE excluded) so new flag bits added to
    /// a type reach old saves, then the kind absorbs template data.
    pub(crate) fn on_file_load(&mut self, template: &Socket) {
        self.flags.insert(template.flags.difference(SocketFlags::UPDATE));
        self.kind.absorb_template(template.kind.as_ref());
    }
}

/// Insertion-ordered map of sockets by key
///
/// ```rust
/// use depgraph_core::socket::{Socket, SocketMap};
/// use depgraph_core::sockets::FloatSocket;
///
/// let map = SocketMap::new()
///     .with("a", Socket::new(FloatSocket::new(1.0)))
///     .with("b", Socket::new(FloatSocket::new(2.0)));
/// assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SocketMap {
    entries: Vec<Socket>,
}

impl SocketMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, socket: Socket) -> Self {
        self.insert(key, socket);
        self
    }

    /// Insert or replace the socket at `key`, keeping the slot's position
    pub fn insert(&mut self, key: impl Into<String>, mut socket: Socket) -> Option<Socket> {
        socket.key = key.into();
        match self.entries.iter().position(|s| s.key == socket.key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i], socket)),
            None => {
                self.entries.push(socket);
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Socket> {
        let index = self.entries.iter().position(|s| s.key == key)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, key: &str) -> Option<&Socket> {
        self.entries.iter().find(|s| s.key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Socket> {
        self.entries.iter_mut().find(|s| s.key == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|s| s.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Socket> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Socket> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for SocketMap {
    type Item = Socket;
    type IntoIter = std::vec::IntoIter<Socket>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
