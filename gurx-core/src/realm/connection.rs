//! Connections
//!
//! A connection moves values from one or more input nodes into a sink node
//! through a projection. Inputs are split in two groups:
//!
//! - **sources** trigger the projection when they emit
//! - **pulls** are read but never trigger
//!
//! Every connection caches the latest value it has seen from each input, so
//! plain signals can take part in combine-style wiring. The cache of a cell
//! input is seeded with the cell's value when the connection is made.
//!
//! # Readiness
//!
//! [`Readiness::Any`] runs the projection for every transaction in which a
//! source emitted. [`Readiness::All`] additionally waits until every input
//! has a value, which is how combinators stay silent instead of emitting
//! partially populated tuples.

use std::marker::PhantomData;

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::handle::{ErasedNode, NodeRef, Payload};
use crate::graph::{NodeKey, Value};

/// When a connection's projection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Readiness {
    /// Fire whenever any source emitted in the transaction.
    #[default]
    Any,

    /// Fire when a source emitted and every input has a value.
    All,
}

/// Input values handed to a projection.
pub struct Inputs<'a> {
    keys: &'a [NodeKey],
    values: &'a [Option<Value>],
    emitted: &'a [bool],
}

impl<'a> Inputs<'a> {
    fn position(&self, key: NodeKey) -> Option<usize> {
        self.keys.iter().position(|k| *k == key)
    }

    /// Latest value of an input, typed.
    pub fn get<T: Payload>(&self, node: NodeRef<T>) -> Option<&'a T> {
        self.value_of(node.key())?.downcast_ref::<T>()
    }

    /// Latest value of an input, untyped.
    pub fn value_of(&self, key: NodeKey) -> Option<&'a Value> {
        self.values.get(self.position(key)?)?.as_ref()
    }

    /// Whether the input emitted in the current transaction.
    pub fn emitted<T>(&self, node: NodeRef<T>) -> bool {
        self.position(node.key())
            .is_some_and(|i| self.emitted[i])
    }

    /// Latest values of all inputs, sources first, then pulls.
    pub fn values(&self) -> &'a [Option<Value>] {
        self.values
    }
}

/// Emission slot for a projection.
///
/// Only the first emission of a transaction reaches the sink; later calls
/// are ignored.
pub struct Done<'a, T> {
    slot: &'a mut Option<Value>,
    _marker: PhantomData<fn(T)>,
}

impl<'a, T: Payload> Done<'a, T> {
    fn new(slot: &'a mut Option<Value>) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Push a value into the sink.
    pub fn emit(&mut self, value: T) {
        if self.slot.is_none() {
            *self.slot = Some(std::sync::Arc::new(value));
        }
    }

    /// Push an already wrapped value. The caller guarantees it holds a `T`.
    pub(crate) fn forward(&mut self, value: &Value) {
        if self.slot.is_none() {
            *self.slot = Some(value.clone());
        }
    }

    /// Whether something has been emitted already.
    pub fn is_done(&self) -> bool {
        self.slot.is_some()
    }
}

/// Description of a connection, built fluently and passed to
/// `Realm::connect`.
///
/// ```rust,ignore
/// realm.connect(
///     Connect::to(total).source(price).pull(quantity),
///     move |inputs, done| {
///         if let (Some(p), Some(q)) = (inputs.get(price), inputs.get(quantity)) {
///             done.emit(p * q);
///         }
///     },
/// )?;
/// ```
pub struct Connect<T> {
    pub(crate) sink: NodeRef<T>,
    pub(crate) sources: SmallVec<[NodeKey; 4]>,
    pub(crate) pulls: SmallVec<[NodeKey; 4]>,
    pub(crate) readiness: Readiness,
}

impl<T> Connect<T> {
    /// Start a connection into `sink`.
    pub fn to(sink: NodeRef<T>) -> Self {
        Self {
            sink,
            sources: SmallVec::new(),
            pulls: SmallVec::new(),
            readiness: Readiness::Any,
        }
    }

    /// Add a triggering input.
    pub fn source<S>(mut self, node: NodeRef<S>) -> Self {
        self.sources.push(node.key());
        self
    }

    /// Add a triggering input by its erased handle.
    pub fn erased_source(mut self, node: ErasedNode) -> Self {
        self.sources.push(node.key());
        self
    }

    /// Add a read-only input.
    pub fn pull<S>(mut self, node: NodeRef<S>) -> Self {
        self.pulls.push(node.key());
        self
    }

    /// Set the readiness policy.
    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub(crate) fn inputs(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.sources.iter().chain(self.pulls.iter()).copied()
    }
}

/// Erased projection stored in a connection.
pub(crate) type Projection = Box<dyn FnMut(&Inputs<'_>, &mut Option<Value>) + Send>;

/// Wrap a typed projection.
pub(crate) fn erase_projection<T, F>(mut projection: F) -> Projection
where
    T: Payload,
    F: FnMut(&Inputs<'_>, &mut Done<'_, T>) + Send + 'static,
{
    Box::new(move |inputs, slot| {
        let mut done = Done::new(slot);
        projection(inputs, &mut done);
    })
}

struct ConnectionState {
    cache: Vec<Option<Value>>,
    projection: Projection,
}

/// A live connection inside a realm.
pub(crate) struct Connection {
    /// Sources first, then pulls.
    inputs: SmallVec<[NodeKey; 4]>,
    source_count: usize,
    readiness: Readiness,
    state: Mutex<ConnectionState>,
}

impl Connection {
    pub(crate) fn new(
        inputs: SmallVec<[NodeKey; 4]>,
        source_count: usize,
        readiness: Readiness,
        seed: Vec<Option<Value>>,
        projection: Projection,
    ) -> Self {
        Self {
            inputs,
            source_count,
            readiness,
            state: Mutex::new(ConnectionState {
                cache: seed,
                projection,
            }),
        }
    }

    pub(crate) fn reads(&self, key: NodeKey) -> bool {
        self.inputs.contains(&key)
    }

    /// Copy the values settled so far in this transaction into the cache.
    /// Returns which inputs emitted and whether a source was among them.
    fn absorb(
        &self,
        cache: &mut [Option<Value>],
        settled: &IndexMap<NodeKey, Value>,
    ) -> (SmallVec<[bool; 4]>, bool) {
        let mut emitted: SmallVec<[bool; 4]> = SmallVec::from_elem(false, self.inputs.len());
        let mut triggered = false;

        for (i, key) in self.inputs.iter().enumerate() {
            if let Some(value) = settled.get(key) {
                cache[i] = Some(value.clone());
                emitted[i] = true;
                triggered |= i < self.source_count;
            }
        }
        (emitted, triggered)
    }

    /// Update the cache without running the projection. Used when the sink
    /// already settled, so stateful projections do not consume an input
    /// whose result would be discarded.
    pub(crate) fn refresh(&self, settled: &IndexMap<NodeKey, Value>) {
        let mut state = self.state.lock();
        self.absorb(&mut state.cache, settled);
    }

    /// Feed the values settled so far in this transaction into the
    /// connection. Returns the projection's emission, if it ran and emitted.
    pub(crate) fn evaluate(&self, settled: &IndexMap<NodeKey, Value>) -> Option<Value> {
        let mut state = self.state.lock();
        let ConnectionState { cache, projection } = &mut *state;

        let (emitted, triggered) = self.absorb(cache, settled);
        if !triggered {
            return None;
        }
        if self.readiness == Readiness::All && cache.iter().any(Option::is_none) {
            return None;
        }

        let inputs = Inputs {
            keys: &self.inputs,
            values: cache,
            emitted: &emitted,
        };
        let mut slot = None;
        projection(&inputs, &mut slot);
        slot
    }
}
