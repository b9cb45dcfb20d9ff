//! Realm Runtime
//!
//! The realm is the live dataflow graph. It owns the node registry, the
//! connection table, the subscription table, the timer registry and the
//! transaction queue. A `Realm` is a cheap clonable handle to that shared
//! state; every clone addresses the same graph.
//!
//! # How It Works
//!
//! 1. Nodes are created through the realm and addressed with typed
//!    [`NodeRef`] handles.
//!
//! 2. Connections (directly via [`Realm::connect`] or through operators)
//!    add edges between nodes and register a projection on the sink.
//!
//! 3. A publish runs one transaction: every reachable node settles once,
//!    in dependency order, then subscribers are notified. See
//!    `transaction.rs`.
//!
//! # Thread Safety
//!
//! Transactions run synchronously on the publishing thread. Timer tasks may
//! publish from tokio worker threads, so all tables sit behind locks; no
//! table lock is held while user code (projections, subscribers) runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use super::connection::{erase_projection, Connect, Connection, Done, Inputs};
use super::context::RealmId;
use super::handle::{NodeRef, Payload};
use super::subscriber::{Callback, Subscriber, SubscriberId, Subscription};
use super::timers::{TimerId, TimerRegistry};
use crate::config::RealmConfig;
use crate::error::{RealmError, Result};
use crate::graph::{Comparator, Node, NodeKey, NodeKind, NodeRegistry, Value};
use crate::operators::Operator;

/// One publish transaction's seed.
pub(crate) type Batch = Vec<(NodeKey, Value)>;

/// A validated batch waiting in the queue, with the settlement order
/// computed for it and the edge revision that order belongs to.
pub(crate) struct Pending {
    pub(crate) batch: Batch,
    pub(crate) order: Vec<NodeKey>,
    pub(crate) revision: u64,
}

pub(crate) struct RealmShared {
    pub(crate) id: RealmId,
    pub(crate) config: RealmConfig,
    pub(crate) nodes: RwLock<NodeRegistry>,
    /// Connections indexed by sink, in registration order.
    pub(crate) connections: RwLock<HashMap<NodeKey, Vec<Arc<Connection>>>>,
    pub(crate) subscribers: DashMap<NodeKey, Vec<Subscriber>>,
    pub(crate) queue: Mutex<VecDeque<Pending>>,
    /// Held by the thread currently draining the queue.
    pub(crate) drain_lock: Mutex<()>,
    pub(crate) timers: Mutex<TimerRegistry>,
    pub(crate) disposed: AtomicBool,
}

/// A live dataflow graph.
///
/// # Example
///
/// ```rust,ignore
/// let realm = Realm::new();
/// let count = realm.cell(0);
/// let doubled = realm.pipe(count, map(|v: &i32| v * 2))?;
///
/// realm.subscribe(doubled, |v| println!("doubled: {v}"))?;
/// realm.publish(count, 21)?; // prints "doubled: 42"
/// ```
#[derive(Clone)]
pub struct Realm {
    pub(crate) shared: Arc<RealmShared>,
}

/// A weak handle to a realm, used by timers and operators so they never
/// keep a torn down realm alive.
#[derive(Clone)]
pub struct WeakRealm(Weak<RealmShared>);

impl WeakRealm {
    /// Get the realm back, if it is still alive.
    pub fn upgrade(&self) -> Option<Realm> {
        self.0.upgrade().map(|shared| Realm { shared })
    }
}

impl Realm {
    /// Create a realm with the default configuration.
    ///
    /// If called inside a tokio runtime, that runtime is captured for
    /// timer operators.
    pub fn new() -> Self {
        Self::with_config(RealmConfig::default())
    }

    /// Create a realm with the given configuration.
    pub fn with_config(config: RealmConfig) -> Self {
        Self::with_runtime(config, Handle::try_current().ok())
    }

    /// Create a realm that schedules timers on `handle` when no runtime is
    /// current at the time a timer is set.
    pub fn with_runtime(config: RealmConfig, handle: Option<Handle>) -> Self {
        debug!(realm = %config.name, "creating realm");
        Self {
            shared: Arc::new(RealmShared {
                id: RealmId::new(),
                config,
                nodes: RwLock::new(NodeRegistry::new()),
                connections: RwLock::new(HashMap::new()),
                subscribers: DashMap::new(),
                queue: Mutex::new(VecDeque::new()),
                drain_lock: Mutex::new(()),
                timers: Mutex::new(TimerRegistry::new(handle)),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Get the realm's unique ID.
    pub fn id(&self) -> RealmId {
        self.shared.id
    }

    /// The configured realm name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// The realm's configuration.
    pub fn config(&self) -> &RealmConfig {
        &self.shared.config
    }

    /// Create a weak handle.
    pub fn downgrade(&self) -> WeakRealm {
        WeakRealm(Arc::downgrade(&self.shared))
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(RealmError::Disposed)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Create a node.
    ///
    /// With `retains_value = false` the node is a pure event channel and
    /// `initial` is ignored. With `retains_value = true` the node keeps its
    /// latest settled value, starting from `initial`.
    pub fn node<T: Payload>(&self, initial: Option<T>, retains_value: bool) -> NodeRef<T> {
        let kind = if retains_value {
            NodeKind::Cell
        } else {
            NodeKind::Signal
        };
        self.insert_node(Node::new(kind, initial))
    }

    /// Create an event node.
    pub fn signal<T: Payload>(&self) -> NodeRef<T> {
        self.node(None, false)
    }

    /// Create a value-retaining node.
    pub fn cell<T: Payload>(&self, initial: T) -> NodeRef<T> {
        self.node(Some(initial), true)
    }

    /// Create a value-retaining node that ignores publishes equal to its
    /// current value.
    pub fn distinct_cell<T: Payload + PartialEq>(&self, initial: T) -> NodeRef<T> {
        let same: Comparator = Arc::new(|a: &Value, b: &Value| {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        });
        self.insert_node(Node::new(NodeKind::Cell, Some(initial)).with_comparator(same))
    }

    /// Output node of an operator: retains its value, starts empty.
    pub(crate) fn derived<T: Payload>(&self) -> NodeRef<T> {
        self.node(None, true)
    }

    fn insert_node<T>(&self, node: Node) -> NodeRef<T> {
        let key = self.shared.nodes.write().add_node(node);
        trace!(realm = %self.name(), node = %key, "node created");
        NodeRef::from_key(key)
    }

    /// Read the retained value of a node. Signals always read `None`.
    pub fn get_value<T: Payload + Clone>(&self, node: NodeRef<T>) -> Result<Option<T>> {
        let nodes = self.shared.nodes.read();
        Ok(nodes
            .get(node.key())?
            .value()
            .and_then(|v| v.downcast_ref::<T>())
            .cloned())
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.shared.nodes.read().node_count()
    }

    /// Remove a node with its edges, connections and subscribers.
    pub(crate) fn remove_node(&self, key: NodeKey) {
        let mut nodes = self.shared.nodes.write();
        nodes.remove_node(key);
        let mut connections = self.shared.connections.write();
        connections.remove(&key);
        for list in connections.values_mut() {
            list.retain(|c| !c.reads(key));
        }
        drop(connections);
        drop(nodes);
        self.shared.subscribers.remove(&key);
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Register a callback for every future settlement of `node`.
    ///
    /// Subscribing never replays the current value; use
    /// [`Realm::get_value`] for that.
    pub fn subscribe<T, F>(&self, node: NodeRef<T>, callback: F) -> Result<Subscription>
    where
        T: Payload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_erased(
            node.key(),
            Arc::new(move |value: &Value| {
                if let Some(value) = value.downcast_ref::<T>() {
                    callback(value);
                }
            }),
        )
    }

    pub(crate) fn subscribe_erased(&self, key: NodeKey, notify: Callback) -> Result<Subscription> {
        self.ensure_live()?;
        self.shared.nodes.read().get(key)?;

        let subscriber = Subscriber::new(notify);
        let id = subscriber.id;
        self.shared.subscribers.entry(key).or_default().push(subscriber);

        Ok(Subscription::new(self.downgrade(), key, id))
    }

    pub(crate) fn remove_subscriber(&self, node: NodeKey, id: SubscriberId) {
        if let Some(mut subscribers) = self.shared.subscribers.get_mut(&node) {
            subscribers.retain(|s| s.id != id);
        }
    }

    /// Number of live subscribers on a node.
    pub fn subscriber_count<T>(&self, node: NodeRef<T>) -> usize {
        self.shared
            .subscribers
            .get(&node.key())
            .map(|s| s.value().len())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------

    /// Register a connection.
    ///
    /// Fails with `InvalidReference` if any node is unknown and with `Cycle`
    /// if the sink already feeds one of the inputs.
    pub fn connect<T, F>(&self, connect: Connect<T>, projection: F) -> Result<()>
    where
        T: Payload,
        F: FnMut(&Inputs<'_>, &mut Done<'_, T>) + Send + 'static,
    {
        self.ensure_live()?;
        let sink = connect.sink.key();

        let mut nodes = self.shared.nodes.write();
        nodes.get(sink)?;

        let mut seed = Vec::new();
        for key in connect.inputs() {
            let input = nodes.get(key)?;
            seed.push(input.value().cloned());
            if key == sink || nodes.reaches(sink, key) {
                return Err(RealmError::Cycle { node: key });
            }
        }
        for key in connect.inputs() {
            nodes.add_edge(key, sink)?;
        }

        let inputs: SmallVec<[NodeKey; 4]> = connect.inputs().collect();
        let connection = Connection::new(
            inputs,
            connect.sources.len(),
            connect.readiness,
            seed,
            erase_projection(projection),
        );
        self.shared
            .connections
            .write()
            .entry(sink)
            .or_default()
            .push(Arc::new(connection));

        trace!(realm = %self.name(), sink = %sink, "connection registered");
        Ok(())
    }

    /// Forward every emission of `source` into an existing `sink`.
    pub fn link<T: Payload>(&self, source: NodeRef<T>, sink: NodeRef<T>) -> Result<()> {
        self.connect(
            Connect::to(sink).source(source),
            move |inputs, done| {
                if let Some(value) = inputs.value_of(source.key()) {
                    done.forward(value);
                }
            },
        )
    }

    /// Apply an operator (or a tuple of operators, left to right) to
    /// `source`, returning the final derived node.
    pub fn pipe<I, O>(&self, source: NodeRef<I>, operator: O) -> Result<NodeRef<O::Output>>
    where
        O: Operator<I>,
    {
        operator.apply(self, source)
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Run `fire` after `delay` unless the timer is cancelled or the realm
    /// is disposed first.
    pub(crate) fn schedule_timer<F>(&self, delay: Duration, fire: F) -> Result<TimerId>
    where
        F: FnOnce(&Realm, TimerId) + Send + 'static,
    {
        let mut timers = self.shared.timers.lock();
        if timers.is_disposed() {
            return Err(RealmError::Disposed);
        }
        let runtime = timers.runtime().ok_or(RealmError::NoTimerRuntime)?;
        let id = timers.next_id();
        let weak = self.downgrade();
        let _guard = runtime.enter();
        let deadline = tokio::time::Instant::now() + delay;

        // The registry lock is held until the abort handle is stored, so the
        // task cannot complete before it is registered.
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(realm) = weak.upgrade() else {
                return;
            };
            let completed = realm.shared.timers.lock().complete(id);
            if completed {
                fire(&realm, id);
            }
        });
        timers.insert(id, task.abort_handle());
        Ok(id)
    }

    pub(crate) fn cancel_timer(&self, id: TimerId) {
        self.shared.timers.lock().cancel(id);
    }

    /// Number of timers waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.shared.timers.lock().pending_count()
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Tear the realm down: cancel pending timers, drop subscriptions and
    /// connections. Later publishes fail with [`RealmError::Disposed`].
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let cancelled = self.shared.timers.lock().dispose();
        self.shared.subscribers.clear();
        self.shared.connections.write().clear();
        self.shared.nodes.write().clear_edges();
        self.shared.queue.lock().clear();
        debug!(realm = %self.name(), cancelled_timers = cancelled, "realm disposed");
    }

    /// Whether [`Realm::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("id", &self.shared.id)
            .field("name", &self.name())
            .field("nodes", &self.node_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
