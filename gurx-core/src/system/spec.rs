//! System specifications and their exports.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{RealmError, Result};
use crate::realm::{ErasedNode, NodeRef, Payload, Realm};

/// Unique identifier for a system.
///
/// Clones of a [`System`] share the ID, which is how composition notices
/// that two dependants refer to the same system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(u64);

impl SystemId {
    /// Generate a new unique system ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SystemId {
    fn default() -> Self {
        Self::new()
    }
}

type Init = Box<dyn Fn(&Realm, &[Exports]) -> Result<Exports> + Send + Sync>;

struct SystemInner {
    id: SystemId,
    name: Option<String>,
    dependencies: Vec<System>,
    init: Init,
}

/// A composable description of nodes and their wiring.
#[derive(Clone)]
pub struct System {
    inner: Arc<SystemInner>,
}

/// Define a system. `init` receives the exports of `dependencies`, in the
/// order they were declared.
pub fn system<F>(init: F, dependencies: Vec<System>) -> System
where
    F: Fn(&Realm, &[Exports]) -> Result<Exports> + Send + Sync + 'static,
{
    System::build(None, init, dependencies)
}

impl System {
    /// Define a system with a name that shows up in logs.
    pub fn named<F>(name: impl Into<String>, init: F, dependencies: Vec<System>) -> System
    where
        F: Fn(&Realm, &[Exports]) -> Result<Exports> + Send + Sync + 'static,
    {
        Self::build(Some(name.into()), init, dependencies)
    }

    fn build<F>(name: Option<String>, init: F, dependencies: Vec<System>) -> System
    where
        F: Fn(&Realm, &[Exports]) -> Result<Exports> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(SystemInner {
                id: SystemId::new(),
                name,
                dependencies,
                init: Box::new(init),
            }),
        }
    }

    pub fn id(&self) -> SystemId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn dependencies(&self) -> &[System] {
        &self.inner.dependencies
    }

    pub(crate) fn init(&self, realm: &Realm, dependencies: &[Exports]) -> Result<Exports> {
        (self.inner.init)(realm, dependencies)
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("dependencies", &self.inner.dependencies.len())
            .finish()
    }
}

/// Named nodes published by a system, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exports {
    nodes: IndexMap<String, ErasedNode>,
}

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Exports::insert`].
    pub fn with(mut self, name: impl Into<String>, node: impl Into<ErasedNode>) -> Self {
        self.insert(name, node);
        self
    }

    /// Add or replace an export.
    pub fn insert(&mut self, name: impl Into<String>, node: impl Into<ErasedNode>) {
        self.nodes.insert(name.into(), node.into());
    }

    /// Resolve an export to a typed handle.
    pub fn get<T: Payload>(&self, name: &str) -> Result<NodeRef<T>> {
        self.erased(name)?.downcast(name)
    }

    /// Resolve an export without checking its type.
    pub fn erased(&self, name: &str) -> Result<ErasedNode> {
        self.nodes
            .get(name)
            .copied()
            .ok_or_else(|| RealmError::UnknownLabel {
                label: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ErasedNode)> {
        self.nodes.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fold `other` into `self`.
    ///
    /// Re-exporting the same node under the same name is allowed; a name
    /// bound to two different nodes is a [`RealmError::DuplicateExport`].
    /// Nothing is merged when an error is returned.
    pub fn merge(&mut self, other: &Exports) -> Result<()> {
        for (name, node) in &other.nodes {
            match self.nodes.get(name) {
                Some(existing) if existing != node => {
                    return Err(RealmError::DuplicateExport { name: name.clone() });
                }
                _ => {}
            }
        }
        for (name, node) in &other.nodes {
            self.nodes.entry(name.clone()).or_insert(*node);
        }
        Ok(())
    }
}
