//! Error types for graph construction, execution and persistence
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! GraphError
//! ├── Cycle              - Cycle found where cycles are not allowed
//! ├── NodeExecution      - A node behavior failed
//! ├── NodeNotFound       - Id does not resolve to an attached node
//! ├── SocketNotFound     - Socket lookup failed
//! ├── UnknownNodeType    - Type name not registered
//! ├── UnknownSocketType  - Socket type name not registered
//! ├── InvalidDefinition  - Node definition rejected at registration
//! ├── Socket             - Socket value conversion failed
//! ├── Configuration      - Invalid configuration values
//! ├── Serialization      - JSON errors
//! ├── Yaml               - YAML errors
//! ├── Io                 - File access errors
//! └── Custom             - Host-defined failures
//! ```
//!
//! # Which conditions are errors
//!
//! Only conditions the caller must act on are returned as errors: cycles in
//! graphs that forbid them, failing node behaviors, and unresolvable types or
//! configuration. Structural corruption (dangling edges, double removal, proxy
//! relinks aimed at non-proxies) typically comes from version skew elsewhere in
//! the host application. Those paths log a `tracing` warning and degrade by
//! skipping, pruning or doing nothing.
//!
//! ```rust
//! use depgraph_core::{Graph, GraphConfig, GraphError};
//!
//! fn run(graph: &mut Graph<()>) -> Result<(), GraphError> {
//!     match graph.exec(&mut ()) {
//!         Ok(_) => Ok(()),
//!         Err(GraphError::Cycle { .. }) => {
//!             // Break the feedback loop, or opt in to the relaxation solver
//!             graph.set_cyclic_allowed(true);
//!             graph.exec(&mut ()).map(|_| ())
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```

use crate::ids::NodeId;
use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Failure to store a value into a socket
///
/// Returned by [`SocketKind::set_value`](crate::socket::SocketKind::set_value).
/// Propagation paths (peer pushes, proxy relinks, schema migration) log these
/// and keep the socket's previous value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SocketError {
    /// The value's shape does not fit the socket type
    #[error("socket type '{socket_type}' cannot hold {found}")]
    TypeMismatch {
        /// Receiving socket type name
        socket_type: String,
        /// Short description of the rejected value
        found: String,
    },

    /// A numeric socket rejected NaN
    #[error("socket type '{socket_type}' rejected NaN")]
    NotANumber {
        /// Receiving socket type name
        socket_type: String,
    },

    /// Enum socket received an item name it does not define
    #[error("unknown enum item '{item}'")]
    UnknownEnumItem {
        /// The rejected item name
        item: String,
    },
}

impl SocketError {
    /// Create a type mismatch error describing the rejected JSON value
    pub fn mismatch(socket_type: impl Into<String>, found: &serde_json::Value) -> Self {
        let found = match found {
            serde_json::Value::Null => "null".to_string(),
            serde_json::Value::Bool(_) => "a boolean".to_string(),
            serde_json::Value::Number(_) => "a number".to_string(),
            serde_json::Value::String(_) => "a string".to_string(),
            serde_json::Value::Array(items) => format!("an array of {} items", items.len()),
            serde_json::Value::Object(_) => "an object".to_string(),
        };
        Self::TypeMismatch {
            socket_type: socket_type.into(),
            found,
        }
    }
}

/// Error type for all graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// A cycle was found where it is not permitted
    ///
    /// Raised by ordered exec when the last sort flagged the graph cyclic and
    /// the configuration forbids cycles, and by subtree exec on re-entry into a
    /// node that is still mid-visit. Fatal to that exec call; never retried.
    #[error("Cycle detected in graph{}", at_node(.node))]
    Cycle {
        /// Node where re-entry was detected, when known
        node: Option<NodeId>,
    },

    /// A node behavior returned an error
    #[error("Node {node} execution failed: {error}")]
    NodeExecution {
        /// Failing node
        node: NodeId,
        /// Error message from the behavior
        error: String,
    },

    /// Id does not resolve to a node of this graph
    #[error("Node {0} is not attached to this graph")]
    NodeNotFound(NodeId),

    /// Socket lookup failed
    #[error("Socket not found: {0}")]
    SocketNotFound(String),

    /// Node type name is not registered
    #[error("Unknown node type '{0}'")]
    UnknownNodeType(String),

    /// Socket type name is not registered
    #[error("Unknown socket type '{0}'")]
    UnknownSocketType(String),

    /// Node definition rejected at registration
    #[error("Invalid node definition: {0}")]
    InvalidDefinition(String),

    /// Socket value conversion failed
    #[error("Socket value error: {0}")]
    Socket(#[from] SocketError),

    /// Configuration values are invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised by host code, such as a node behavior
    #[error("{0}")]
    Custom(String),
}

fn at_node(node: &Option<NodeId>) -> String {
    node.map(|n| format!(" at node {}", n)).unwrap_or_default()
}

impl GraphError {
    /// Create a node execution error with context
    ///
    /// ```rust
    /// use depgraph_core::{GraphError, NodeId};
    ///
    /// let err = GraphError::node_execution(NodeId(4), "input out of range");
    /// assert_eq!(err.to_string(), "Node 4 execution failed: input out of range");
    /// ```
    pub fn node_execution(node: NodeId, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node,
            error: error.into(),
        }
    }

    /// True for [`GraphError::Cycle`]
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cycle_messages() {
        assert_eq!(GraphError::Cycle { node: None }.to_string(), "Cycle detected in graph");
        assert_eq!(
            GraphError::Cycle { node: Some(NodeId(3)) }.to_string(),
            "Cycle detected in graph at node 3"
        );
        assert!(GraphError::Cycle { node: None }.is_cycle());
    }

    #[test]
    fn test_socket_error_converts() {
        let err: GraphError = SocketError::mismatch("float", &json!([1, 2])).into();
        assert_eq!(
            err.to_string(),
            "Socket value error: socket type 'float' cannot hold an array of 2 items"
        );
        assert!(!err.is_cycle());
    }
}
