//! Graph Nodes
//!
//! This module defines the node records that live in the realm's graph.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;

/// An untyped payload flowing through the graph.
///
/// Typed handles ([`crate::NodeRef`]) guarantee the concrete type on both
/// ends, so downcasts inside the crate only fail on wiring bugs.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Equality test used by distinct cells to suppress unchanged publishes.
pub type Comparator = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Unique identifier for a node.
///
/// Keys are unique across the whole process, so a key minted by one realm is
/// never mistaken for a node of another realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(u64);

impl NodeKey {
    /// Generate a new unique node key.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw key value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a node keeps its last value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A pure event channel. Nothing is stored between transactions.
    Signal,

    /// A stateful node. The latest settled value is retained and can be
    /// read back with `Realm::get_value`.
    Cell,
}

/// A node in the realm's graph.
pub struct Node {
    /// Unique key for this node.
    key: NodeKey,

    /// Signal or cell.
    kind: NodeKind,

    /// Payload type the node was created with.
    type_id: TypeId,

    /// Human readable payload type, for error messages.
    type_name: &'static str,

    /// Latest value. Always `None` for signals.
    value: Option<Value>,

    /// Present on distinct cells only.
    distinct: Option<Comparator>,

    /// Nodes this node is fed from, through connection sources or pulls.
    dependencies: IndexSet<NodeKey>,

    /// Nodes fed by this node. Insertion ordered so settlement order is
    /// deterministic.
    dependents: IndexSet<NodeKey>,
}

impl Node {
    /// Create a new node record for payload type `T`.
    pub fn new<T: Any + Send + Sync>(kind: NodeKind, initial: Option<T>) -> Self {
        let value = match kind {
            NodeKind::Cell => initial.map(|v| Arc::new(v) as Value),
            NodeKind::Signal => None,
        };
        Self {
            key: NodeKey::new(),
            kind,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value,
            distinct: None,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
        }
    }

    /// Make this node suppress publishes equal to its current value.
    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.distinct = Some(comparator);
        self
    }

    /// Get the node's key.
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Payload type of the node.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Payload type name of the node.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Latest retained value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Returns true when `candidate` should not settle this node because it
    /// equals the retained value of a distinct cell.
    pub fn is_unchanged(&self, candidate: &Value) -> bool {
        match (&self.distinct, &self.value) {
            (Some(same), Some(current)) => same(current, candidate),
            _ => false,
        }
    }

    /// Record a settled value. Signals keep nothing.
    pub fn store(&mut self, value: Value) {
        if self.kind == NodeKind::Cell {
            self.value = Some(value);
        }
    }

    /// Add a dependency (a node that this node reads from).
    pub fn add_dependency(&mut self, key: NodeKey) {
        self.dependencies.insert(key);
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, key: NodeKey) {
        self.dependencies.shift_remove(&key);
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &IndexSet<NodeKey> {
        &self.dependencies
    }

    /// Add a dependent (a node that reads from this node).
    pub fn add_dependent(&mut self, key: NodeKey) {
        self.dependents.insert(key);
    }

    /// Remove a dependent.
    pub fn remove_dependent(&mut self, key: NodeKey) {
        self.dependents.shift_remove(&key);
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &IndexSet<NodeKey> {
        &self.dependents
    }

    /// Drop all edges.
    pub fn clear_edges(&mut self) {
        self.dependencies.clear();
        self.dependents.clear();
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("type", &self.type_name)
            .field("has_value", &self.value.is_some())
            .field("distinct", &self.distinct.is_some())
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .finish()
    }
}
