//! Publish Transactions
//!
//! A transaction is one synchronous propagation pass.
//!
//! # Algorithm
//!
//! 1. Validate the batch: every key must belong to this realm and every
//!    payload must match its node's type. Nothing mutates on failure.
//! 2. Ask the registry for the settlement order of everything reachable
//!    from the published nodes (topological, seeds first). The order is
//!    kept with the queued batch and recomputed only if edges changed
//!    before the batch runs.
//! 3. Settle the published nodes in batch order. A distinct cell receiving
//!    its current value does not settle.
//! 4. Walk the order. For each node, evaluate the connections writing into
//!    it, in registration order. The first connection that emits settles
//!    the node; later writes in the same transaction are ignored. Once a
//!    node has settled, its remaining connections only refresh their
//!    cached inputs and do not run.
//! 5. Notify subscribers of every settled node, in settlement order, each
//!    exactly once with the node's final value.
//!
//! # Re-entrancy
//!
//! Publishing from inside a subscriber or projection enqueues a new batch
//! that runs after the current transaction completes. A publish from
//! another thread waits for the running drain to finish.

use std::any::Any;

use indexmap::IndexMap;
use tracing::{error, trace, trace_span};

use super::context::TransactionContext;
use super::handle::{NodeRef, Payload};
use super::runtime::{Batch, Pending, Realm};
use crate::error::{RealmError, Result};
use crate::graph::{NodeKey, Value};

/// Several values published as one simultaneous transaction.
///
/// ```rust,ignore
/// realm.publish_many(PublishBatch::new().set(a, 3).set(b, 4))?;
/// ```
#[derive(Default)]
pub struct PublishBatch {
    entries: Batch,
}

impl PublishBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, builder style.
    pub fn set<T: Payload>(mut self, node: NodeRef<T>, value: T) -> Self {
        self.push(node, value);
        self
    }

    /// Add a value.
    pub fn push<T: Payload>(&mut self, node: NodeRef<T>, value: T) {
        self.entries.push((node.key(), std::sync::Arc::new(value)));
    }

    pub(crate) fn push_erased(&mut self, key: NodeKey, value: Value) {
        self.entries.push((key, value));
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Clears the queue if a callback panics mid-drain, so the next publish
/// does not replay half a feedback loop.
struct QueueGuard<'a>(&'a Realm);

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.shared.queue.lock().clear();
        }
    }
}

impl Realm {
    /// Publish one value.
    pub fn publish<T: Payload>(&self, node: NodeRef<T>, value: T) -> Result<()> {
        self.publish_batch(vec![(node.key(), std::sync::Arc::new(value))])
    }

    /// Publish several values as one simultaneous transaction.
    pub fn publish_many(&self, batch: PublishBatch) -> Result<()> {
        self.publish_batch(batch.entries)
    }

    pub(crate) fn publish_batch(&self, batch: Batch) -> Result<()> {
        let (order, revision) = self.validate(&batch)?;
        if batch.is_empty() {
            return Ok(());
        }

        self.shared.queue.lock().push_back(Pending {
            batch,
            order,
            revision,
        });
        if TransactionContext::is_active(self.shared.id) {
            trace!(realm = %self.name(), "re-entrant publish queued");
            return Ok(());
        }

        let _drain = self.shared.drain_lock.lock();
        let _ctx = TransactionContext::enter(self.shared.id);
        let _guard = QueueGuard(self);
        self.drain();
        Ok(())
    }

    /// Check the batch and compute its settlement order. Returns the order
    /// with the edge revision it was computed against.
    fn validate(&self, batch: &Batch) -> Result<(Vec<NodeKey>, u64)> {
        self.ensure_live()?;
        let nodes = self.shared.nodes.read();

        for (key, value) in batch {
            let node = nodes.get(*key)?;
            if Any::type_id(&**value) != node.type_id() {
                return Err(RealmError::TypeMismatch {
                    expected: node.type_name(),
                    label: key.to_string(),
                });
            }
        }

        let seeds: Vec<NodeKey> = batch.iter().map(|(key, _)| *key).collect();
        let order = nodes.settlement_order(&seeds)?;
        Ok((order, nodes.revision()))
    }

    /// Run queued transactions until the queue is empty.
    fn drain(&self) {
        let limit = self.shared.config.max_chained_transactions;
        let mut ran = 0usize;

        loop {
            if self.is_disposed() {
                self.shared.queue.lock().clear();
                break;
            }
            let Some(pending) = self.shared.queue.lock().pop_front() else {
                break;
            };
            if ran > limit {
                let dropped = 1 + self.shared.queue.lock().drain(..).count();
                error!(
                    realm = %self.name(),
                    limit,
                    dropped,
                    "too many chained transactions, dropping the rest of the queue"
                );
                break;
            }
            ran += 1;

            if let Err(err) = self.run_transaction(pending) {
                error!(realm = %self.name(), %err, "transaction aborted");
            }
        }
    }

    fn run_transaction(&self, pending: Pending) -> Result<()> {
        let Pending {
            batch,
            order,
            revision,
        } = pending;
        let span = trace_span!("transaction", realm = %self.name(), seeds = batch.len());
        let _enter = span.enter();

        let order = {
            let nodes = self.shared.nodes.read();
            if nodes.revision() == revision {
                order
            } else {
                trace!("edges changed since the batch was queued, reordering");
                let seeds: Vec<NodeKey> = batch.iter().map(|(key, _)| *key).collect();
                nodes.settlement_order(&seeds)?
            }
        };
        let mut settled: IndexMap<NodeKey, Value> = IndexMap::new();

        for (key, value) in batch {
            self.settle(&mut settled, key, value);
        }

        for key in order {
            let connections = match self.shared.connections.read().get(&key) {
                Some(list) => list.clone(),
                None => continue,
            };
            for connection in connections {
                if settled.contains_key(&key) {
                    connection.refresh(&settled);
                    continue;
                }
                if let Some(value) = connection.evaluate(&settled) {
                    self.settle(&mut settled, key, value);
                }
            }
        }

        trace!(settled = settled.len(), "transaction settled");
        self.notify(&settled);
        Ok(())
    }

    /// Record a node's value for this transaction. Returns false when the
    /// write is ignored.
    fn settle(&self, settled: &mut IndexMap<NodeKey, Value>, key: NodeKey, value: Value) -> bool {
        if settled.contains_key(&key) {
            trace!(node = %key, "node already settled, write ignored");
            return false;
        }

        let mut nodes = self.shared.nodes.write();
        let Ok(node) = nodes.get_mut(key) else {
            trace!(node = %key, "node removed during transaction");
            return false;
        };
        if node.is_unchanged(&value) {
            return false;
        }
        node.store(value.clone());
        drop(nodes);

        settled.insert(key, value);
        true
    }

    fn notify(&self, settled: &IndexMap<NodeKey, Value>) {
        for (key, value) in settled {
            if self.is_disposed() {
                return;
            }
            let subscribers = match self.shared.subscribers.get(key) {
                Some(list) => list.value().clone(),
                None => continue,
            };
            for subscriber in subscribers {
                (subscriber.notify)(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::Connect;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (log, move |v: &T| sink.lock().push(v.clone()))
    }

    #[test]
    fn publish_notifies_subscribers() {
        let realm = Realm::new();
        let node = realm.signal::<i32>();
        let (log, record) = recorder();
        realm.subscribe(node, record).unwrap();

        realm.publish(node, 1).unwrap();
        realm.publish(node, 2).unwrap();

        assert_eq!(*log.lock(), vec![1, 2]);
    }

    #[test]
    fn unknown_keys_fail_loudly() {
        let realm = Realm::new();
        let stray = Realm::new().signal::<i32>();

        assert_eq!(
            realm.publish(stray, 1).unwrap_err(),
            RealmError::InvalidReference { key: stray.key() }
        );
    }

    #[test]
    fn erased_payloads_are_type_checked() {
        let realm = Realm::new();
        let node = realm.signal::<i32>();

        let mut batch = PublishBatch::new();
        batch.push_erased(node.key(), Arc::new("text"));

        assert!(matches!(
            realm.publish_many(batch),
            Err(RealmError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn distinct_cells_skip_equal_values() {
        let realm = Realm::new();
        let cell = realm.distinct_cell(1);
        let (log, record) = recorder();
        realm.subscribe(cell, record).unwrap();

        realm.publish(cell, 1).unwrap();
        realm.publish(cell, 2).unwrap();
        realm.publish(cell, 2).unwrap();

        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn diamond_settles_once() {
        let realm = Realm::new();
        let source = realm.signal::<i32>();
        let left = realm.signal::<i32>();
        let right = realm.signal::<i32>();
        let join = realm.signal::<i32>();

        realm.link(source, left).unwrap();
        realm.link(source, right).unwrap();
        realm
            .connect(
                Connect::to(join).source(left).source(right),
                move |inputs, done| {
                    let l = inputs.get(left).copied().unwrap_or(0);
                    let r = inputs.get(right).copied().unwrap_or(0);
                    done.emit(l + r);
                },
            )
            .unwrap();

        let (log, record) = recorder();
        realm.subscribe(join, record).unwrap();
        realm.publish(source, 5).unwrap();

        assert_eq!(*log.lock(), vec![10]);
    }

    #[test]
    fn fan_in_first_writer_wins() {
        let realm = Realm::new();
        let source = realm.signal::<i32>();
        let sink = realm.signal::<&'static str>();

        realm
            .connect(Connect::to(sink).source(source), |_, done| done.emit("first"))
            .unwrap();
        realm
            .connect(Connect::to(sink).source(source), |_, done| done.emit("second"))
            .unwrap();

        let (log, record) = recorder();
        realm.subscribe(sink, record).unwrap();
        realm.publish(source, 0).unwrap();

        assert_eq!(*log.lock(), vec!["first"]);
    }

    #[test]
    fn subscribers_run_in_registration_then_settlement_order() {
        let realm = Realm::new();
        let source = realm.signal::<i32>();
        let mid = realm.signal::<i32>();
        realm
            .connect(Connect::to(mid).source(source), move |inputs, done| {
                if let Some(v) = inputs.get(source) {
                    done.emit(v + 1);
                }
            })
            .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let log = events.clone();
        realm
            .subscribe(mid, move |v: &i32| log.lock().push(format!("mid-a {v}")))
            .unwrap();
        let log = events.clone();
        realm
            .subscribe(source, move |v: &i32| log.lock().push(format!("src {v}")))
            .unwrap();
        let log = events.clone();
        realm
            .subscribe(mid, move |v: &i32| log.lock().push(format!("mid-b {v}")))
            .unwrap();

        realm.publish(source, 1).unwrap();

        assert_eq!(*events.lock(), vec!["src 1", "mid-a 2", "mid-b 2"]);
    }

    #[test]
    fn queued_batches_follow_edges_added_after_queueing() {
        let realm = Realm::new();
        let trigger = realm.signal::<i32>();
        let echo = realm.signal::<i32>();
        let late = realm.signal::<i32>();
        let (log, record) = recorder();
        realm.subscribe(late, record).unwrap();

        // The echo is queued before `late` is linked to it.
        let inner = realm.clone();
        realm
            .subscribe(trigger, move |v: &i32| {
                inner.publish(echo, *v).unwrap();
                inner.link(echo, late).unwrap();
            })
            .unwrap();

        realm.publish(trigger, 4).unwrap();

        assert_eq!(*log.lock(), vec![4]);
    }

    #[test]
    fn reentrant_publish_runs_after_the_current_transaction() {
        let realm = Realm::new();
        let trigger = realm.signal::<i32>();
        let echo = realm.signal::<i32>();
        let events = Arc::new(Mutex::new(Vec::new()));

        let inner = realm.clone();
        let log = events.clone();
        realm
            .subscribe(trigger, move |v: &i32| {
                log.lock().push(format!("trigger {v} start"));
                inner.publish(echo, v * 10).unwrap();
                log.lock().push(format!("trigger {v} end"));
            })
            .unwrap();
        let log = events.clone();
        realm
            .subscribe(echo, move |v: &i32| log.lock().push(format!("echo {v}")))
            .unwrap();

        realm.publish(trigger, 1).unwrap();

        assert_eq!(
            *events.lock(),
            vec!["trigger 1 start", "trigger 1 end", "echo 10"]
        );
    }

    #[test]
    fn runaway_feedback_loops_are_cut() {
        let config = crate::RealmConfig {
            max_chained_transactions: 5,
            ..Default::default()
        };
        let realm = Realm::with_config(config);
        let node = realm.signal::<u32>();
        let count = Arc::new(Mutex::new(0));

        let inner = realm.clone();
        let seen = count.clone();
        realm
            .subscribe(node, move |v: &u32| {
                *seen.lock() += 1;
                inner.publish(node, v + 1).unwrap();
            })
            .unwrap();

        realm.publish(node, 0).unwrap();
        assert_eq!(*count.lock(), 6);

        // The next publish starts a fresh drain.
        realm.publish(node, 100).unwrap();
        assert_eq!(*count.lock(), 12);
    }
}
