//! Node Registry
//!
//! The registry owns every node of a realm and the edges between them. It
//! also decides the order in which a transaction settles nodes.
//!
//! # Algorithm
//!
//! 1. Starting from the published nodes, walk dependents breadth-first to
//!    collect every node the transaction can reach.
//! 2. Sort the collected nodes topologically (dependencies before dependents)
//!    with Kahn's algorithm, counting only edges inside the collected set.
//! 3. If the sort cannot place every node, the reachable subgraph contains a
//!    cycle and the transaction is refused.
//!
//! Published nodes are visited first and in publish order, so two
//! independent seeds settle in the order the caller listed them.

use std::collections::{HashMap, HashSet, VecDeque};

use super::node::{Node, NodeKey};
use crate::error::{RealmError, Result};

/// Registry of all nodes in a realm, indexed by key.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<NodeKey, Node>,
    /// Bumped whenever edges change, so a settlement order computed
    /// earlier can be reused while it is still current.
    revision: u64,
}

impl NodeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            revision: 0,
        }
    }

    /// Add a node to the registry.
    pub fn add_node(&mut self, node: Node) -> NodeKey {
        let key = node.key();
        self.nodes.insert(key, node);
        key
    }

    /// Remove a node from the registry.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, key: NodeKey) -> Option<Node> {
        let node = self.nodes.remove(&key)?;
        self.revision += 1;

        for dependency in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dependency) {
                dep.remove_dependent(key);
            }
        }
        for dependent in node.dependents() {
            if let Some(dep) = self.nodes.get_mut(dependent) {
                dep.remove_dependency(key);
            }
        }
        Some(node)
    }

    /// Get a node, failing loudly on unknown keys.
    pub fn get(&self, key: NodeKey) -> Result<&Node> {
        self.nodes
            .get(&key)
            .ok_or(RealmError::InvalidReference { key })
    }

    /// Get a mutable node, failing loudly on unknown keys.
    pub fn get_mut(&mut self, key: NodeKey) -> Result<&mut Node> {
        self.nodes
            .get_mut(&key)
            .ok_or(RealmError::InvalidReference { key })
    }

    /// Check whether the key belongs to this registry.
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Add a dependency edge: `dependent` is fed from `dependency`.
    pub fn add_edge(&mut self, dependency: NodeKey, dependent: NodeKey) -> Result<()> {
        self.get(dependent)?;
        self.get_mut(dependency)?.add_dependent(dependent);
        self.get_mut(dependent)?.add_dependency(dependency);
        self.revision += 1;
        Ok(())
    }

    /// Returns true if `to` is reachable from `from` by following dependents.
    pub fn reaches(&self, from: NodeKey, to: NodeKey) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([from]);

        while let Some(key) = queue.pop_front() {
            if key == to {
                return true;
            }
            if !visited.insert(key) {
                continue;
            }
            if let Some(node) = self.nodes.get(&key) {
                queue.extend(node.dependents().iter().copied());
            }
        }
        false
    }

    /// Compute the settlement order for a transaction seeded at `seeds`.
    ///
    /// Returns every reachable node (seeds included) with dependencies
    /// ahead of their dependents.
    pub fn settlement_order(&self, seeds: &[NodeKey]) -> Result<Vec<NodeKey>> {
        let mut reachable = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeKey> = seeds.iter().copied().collect();

        while let Some(key) = queue.pop_front() {
            if !visited.insert(key) {
                continue;
            }
            let node = self.get(key)?;
            reachable.push(key);
            queue.extend(node.dependents().iter().copied());
        }

        self.topological_sort(reachable)
    }

    /// Perform a topological sort of the given nodes.
    fn topological_sort(&self, nodes: Vec<NodeKey>) -> Result<Vec<NodeKey>> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeKey, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the node set)
        for &key in &nodes {
            let degree = self
                .get(key)?
                .dependencies()
                .iter()
                .filter(|d| node_set.contains(d))
                .count();
            in_degree.insert(key, degree);
            if degree == 0 {
                queue.push_back(key);
            }
        }

        // Kahn's algorithm
        while let Some(key) = queue.pop_front() {
            result.push(key);

            for dependent in self.get(key)?.dependents() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        if result.len() < nodes.len() {
            let stuck = nodes
                .into_iter()
                .find(|key| in_degree.get(key).is_some_and(|d| *d > 0))
                .unwrap_or_default();
            return Err(RealmError::Cycle { node: stuck });
        }

        Ok(result)
    }

    /// Remove every edge, keeping the nodes.
    pub fn clear_edges(&mut self) {
        self.revision += 1;
        for node in self.nodes.values_mut() {
            node.clear_edges();
        }
    }

    /// Edge revision. Changes whenever an edge is added or removed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Get the total number of nodes in the registry.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
