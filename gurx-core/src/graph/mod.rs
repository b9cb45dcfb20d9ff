//! Dependency Graph
//!
//! This module holds the node table of a realm and the edges between nodes.
//!
//! # Overview
//!
//! The graph is a directed graph where:
//!
//! - Nodes are signals (pure events) or cells (retain their last value)
//! - Edges come from connections: if a connection reads A and writes B,
//!   there is an edge from A to B
//!
//! A publish transaction collects every node reachable from the published
//! nodes and settles them in topological order, so each node is computed
//! after all of its inputs.
//!
//! # Design Decisions
//!
//! 1. Nodes are indexed by key for O(1) lookups.
//!
//! 2. Both forward (dependents) and reverse (dependencies) edges are kept so
//!    the topological sort can count in-degrees directly.
//!
//! 3. Edge sets are insertion ordered; settlement order never depends on
//!    hash iteration order.

mod node;
mod registry;

pub use node::{Comparator, Node, NodeKey, NodeKind, Value};
pub use registry::NodeRegistry;
