//! Subscriber types for the realm.
//!
//! A subscriber is a callback attached to one node. It runs once per
//! transaction in which that node settled, after the whole transaction has
//! finished propagating.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::graph::{NodeKey, Value};

use super::runtime::WeakRealm;

/// Unique identifier for a subscriber.
///
/// Each registration gets its own ID, so subscribing the same closure twice
/// yields two independent registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased subscriber callback.
pub(crate) type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// A registered callback.
#[derive(Clone)]
pub(crate) struct Subscriber {
    pub(crate) id: SubscriberId,
    pub(crate) notify: Callback,
}

impl Subscriber {
    pub(crate) fn new(notify: Callback) -> Self {
        Self {
            id: SubscriberId::new(),
            notify,
        }
    }
}

/// Handle returned by `Realm::subscribe`.
///
/// Calling [`Subscription::unsubscribe`] removes exactly this registration.
/// It is idempotent. Dropping the handle does not unsubscribe; use a
/// [`crate::SubscriptionScope`] for that.
pub struct Subscription {
    realm: WeakRealm,
    node: NodeKey,
    id: SubscriberId,
    /// Helper node created for this subscription, removed with it.
    owned_node: Option<NodeKey>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(realm: WeakRealm, node: NodeKey, id: SubscriberId) -> Self {
        Self {
            realm,
            node,
            id,
            owned_node: None,
            active: AtomicBool::new(true),
        }
    }

    pub(crate) fn owning(mut self, node: NodeKey) -> Self {
        self.owned_node = Some(node);
        self
    }

    /// The subscriber's ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The node this subscription listens to.
    pub fn node(&self) -> NodeKey {
        self.node
    }

    /// Whether the registration is still live.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Remove the registration.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(realm) = self.realm.upgrade() {
            realm.remove_subscriber(self.node, self.id);
            if let Some(owned) = self.owned_node {
                realm.remove_node(owned);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("node", &self.node)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
