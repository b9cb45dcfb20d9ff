//! Realm Factory
//!
//! Builds live realm instances out of system specifications. Every build
//! gets its own realm, so instances never share nodes, subscriptions or
//! timers.

use tokio::runtime::Handle;
use tracing::debug;

use super::compose::compose;
use super::spec::{Exports, System};
use crate::binding::SubscriptionScope;
use crate::config::RealmConfig;
use crate::error::{RealmError, Result};
use crate::graph::Value;
use crate::realm::{Connect, NodeRef, Payload, PublishBatch, Realm, Subscription};

/// Builds [`RealmInstance`]s from a fixed set of systems.
#[derive(Debug, Clone)]
pub struct RealmFactory {
    systems: Vec<System>,
    config: RealmConfig,
    timer_handle: Option<Handle>,
}

impl RealmFactory {
    pub fn new(systems: Vec<System>) -> Self {
        Self {
            systems,
            config: RealmConfig::default(),
            timer_handle: None,
        }
    }

    pub fn with_config(mut self, config: RealmConfig) -> Self {
        self.config = config;
        self
    }

    /// Runtime used by timer operators. Defaults to the runtime current
    /// at build time, if any.
    pub fn with_timer_handle(mut self, handle: Handle) -> Self {
        self.timer_handle = Some(handle);
        self
    }

    /// Create a fresh realm and initialize every system in it.
    pub fn build(&self) -> Result<RealmInstance> {
        let handle = self
            .timer_handle
            .clone()
            .or_else(|| Handle::try_current().ok());
        let realm = Realm::with_runtime(self.config.clone(), handle);

        let labels = match compose(&realm, &self.systems) {
            Ok(labels) => labels,
            Err(err) => {
                realm.dispose();
                return Err(err);
            }
        };
        debug!(
            realm = %realm.name(),
            nodes = realm.node_count(),
            labels = labels.len(),
            "realm built"
        );
        Ok(RealmInstance { realm, labels })
    }
}

/// Build a realm from `systems` with the default configuration.
pub fn compose_and_build_realm(systems: &[System]) -> Result<RealmInstance> {
    RealmFactory::new(systems.to_vec()).build()
}

/// A built realm plus the labels its systems exported.
///
/// Dropping the instance disposes the realm.
#[derive(Debug)]
pub struct RealmInstance {
    realm: Realm,
    labels: Exports,
}

impl RealmInstance {
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn labels(&self) -> &Exports {
        &self.labels
    }

    /// Resolve an exported label to a typed handle.
    pub fn node<T: Payload>(&self, label: &str) -> Result<NodeRef<T>> {
        self.labels.get(label)
    }

    /// Publish a single value by label.
    pub fn publish_key<T: Payload>(&self, label: &str, value: T) -> Result<()> {
        let node = self.node::<T>(label)?;
        self.realm.publish(node, value)
    }

    /// Publish several labelled values as one simultaneous transaction.
    ///
    /// Every label is resolved and type-checked before anything is
    /// published.
    pub fn pub_keys<I, S>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let mut batch = PublishBatch::new();
        for (label, value) in pairs {
            let label = label.as_ref();
            let node = self.labels.erased(label)?;
            if !node.accepts(&value) {
                return Err(RealmError::TypeMismatch {
                    expected: node.type_name(),
                    label: label.to_string(),
                });
            }
            batch.push_erased(node.key(), value);
        }
        self.realm.publish_many(batch)
    }

    /// Call `callback` with the latest values of all `labels` once per
    /// transaction in which any of them settled.
    ///
    /// Values appear in label order; a label that has not produced a value
    /// yet reads as `None`.
    pub fn sub_keys<S, F>(&self, labels: &[S], callback: F) -> Result<Subscription>
    where
        S: AsRef<str>,
        F: Fn(&Values) + Send + Sync + 'static,
    {
        subscribe_labels(&self.realm, &self.labels, labels, callback)
    }

    /// A scope whose subscriptions end when it is dropped.
    pub fn scope(&self) -> SubscriptionScope {
        SubscriptionScope::new(self.realm.clone(), self.labels.clone())
    }

    /// Tear the realm down. Also happens on drop.
    pub fn dispose(&self) {
        self.realm.dispose();
    }
}

impl Drop for RealmInstance {
    fn drop(&mut self) {
        self.realm.dispose();
    }
}

/// Subscribe to a snapshot of several labelled nodes through a helper node
/// that the returned subscription owns.
pub(crate) fn subscribe_labels<S, F>(
    realm: &Realm,
    exports: &Exports,
    labels: &[S],
    callback: F,
) -> Result<Subscription>
where
    S: AsRef<str>,
    F: Fn(&Values) + Send + Sync + 'static,
{
    let nodes = labels
        .iter()
        .map(|label| exports.erased(label.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let helper = realm.derived::<Values>();
    let connect = nodes
        .iter()
        .fold(Connect::to(helper), |c, node| c.erased_source(*node));
    let subscription = realm
        .connect(connect, |inputs, done| {
            done.emit(Values(inputs.values().to_vec()));
        })
        .and_then(|()| realm.subscribe(helper, callback));

    match subscription {
        Ok(subscription) => Ok(subscription.owning(helper.key())),
        Err(err) => {
            realm.remove_node(helper.key());
            Err(err)
        }
    }
}

/// Snapshot handed to a [`RealmInstance::sub_keys`] callback.
#[derive(Debug, Clone)]
pub struct Values(Vec<Option<Value>>);

impl Values {
    /// The value at `index`, if present and of type `T`.
    pub fn get<T: Payload>(&self, index: usize) -> Option<&T> {
        self.0.get(index)?.as_ref()?.downcast_ref::<T>()
    }

    /// The untyped value at `index`.
    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.0.get(index)?.as_ref()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
