//! Component Binding
//!
//! A UI component that mounts against a realm instance usually holds a
//! handful of subscriptions for as long as it is mounted. A
//! [`SubscriptionScope`] collects them and unsubscribes all of them when the
//! component unmounts, i.e. when the scope is dropped.
//!
//! ```rust,ignore
//! let scope = instance.scope();
//! scope.subscribe_label("title", |title: &String| render_title(title))?;
//! scope.sub_keys(&["width", "height"], |values| relayout(values))?;
//! // ...
//! drop(scope); // unmount: both subscriptions end here
//! ```

use parking_lot::Mutex;
use tracing::trace;

use crate::error::Result;
use crate::realm::{NodeRef, Payload, Realm, SubscriberId, Subscription};
use crate::system::{Exports, Values};

/// Subscriptions tied to the lifetime of a mounted component.
pub struct SubscriptionScope {
    realm: Realm,
    labels: Exports,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SubscriptionScope {
    pub(crate) fn new(realm: Realm, labels: Exports) -> Self {
        Self {
            realm,
            labels,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to a node for the lifetime of the scope.
    pub fn subscribe<T, F>(&self, node: NodeRef<T>, callback: F) -> Result<SubscriberId>
    where
        T: Payload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let subscription = self.realm.subscribe(node, callback)?;
        Ok(self.keep(subscription))
    }

    /// Subscribe to an exported label.
    pub fn subscribe_label<T, F>(&self, label: &str, callback: F) -> Result<SubscriberId>
    where
        T: Payload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let node = self.labels.get::<T>(label)?;
        self.subscribe(node, callback)
    }

    /// Scoped form of `RealmInstance::sub_keys`.
    pub fn sub_keys<S, F>(&self, labels: &[S], callback: F) -> Result<SubscriberId>
    where
        S: AsRef<str>,
        F: Fn(&Values) + Send + Sync + 'static,
    {
        let subscription =
            crate::system::subscribe_labels(&self.realm, &self.labels, labels, callback)?;
        Ok(self.keep(subscription))
    }

    /// Current retained value of an exported label.
    pub fn value<T: Payload + Clone>(&self, label: &str) -> Result<Option<T>> {
        let node = self.labels.get::<T>(label)?;
        self.realm.get_value(node)
    }

    /// Number of subscriptions held.
    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.lock().is_empty()
    }

    /// End every subscription now. Dropping the scope does the same.
    pub fn unmount(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        if subscriptions.is_empty() {
            return;
        }
        trace!(realm = %self.realm.name(), count = subscriptions.len(), "scope unmounted");
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
    }

    fn keep(&self, subscription: Subscription) -> SubscriberId {
        let id = subscription.id();
        self.subscriptions.lock().push(subscription);
        id
    }
}

impl Drop for SubscriptionScope {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for SubscriptionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionScope")
            .field("realm", &self.realm.name())
            .field("subscriptions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::operators::map;
    use crate::system::{compose_and_build_realm, system, Exports, RealmInstance};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn temperature() -> RealmInstance {
        let sys = system(
            |realm, _| {
                let celsius = realm.cell(20.0_f64);
                let fahrenheit = realm.pipe(celsius, map(|c: &f64| c * 9.0 / 5.0 + 32.0))?;
                Ok(Exports::new()
                    .with("celsius", celsius)
                    .with("fahrenheit", fahrenheit))
            },
            vec![],
        );
        compose_and_build_realm(&[sys]).unwrap()
    }

    #[test]
    fn dropping_the_scope_unsubscribes() {
        let instance = temperature();
        let fahrenheit_log = Arc::new(Mutex::new(Vec::new()));
        let celsius_log = Arc::new(Mutex::new(Vec::new()));

        {
            let scope = instance.scope();
            let log = fahrenheit_log.clone();
            scope
                .subscribe_label("fahrenheit", move |f: &f64| log.lock().push(*f))
                .unwrap();
            let log = celsius_log.clone();
            scope
                .sub_keys(&["celsius"], move |values| {
                    if let Some(c) = values.get::<f64>(0) {
                        log.lock().push(*c);
                    }
                })
                .unwrap();
            assert_eq!(scope.len(), 2);

            instance.publish_key("celsius", 100.0_f64).unwrap();
            assert_eq!(scope.value::<f64>("fahrenheit").unwrap(), Some(212.0));
        }

        instance.publish_key("celsius", 0.0_f64).unwrap();
        assert_eq!(*fahrenheit_log.lock(), vec![212.0]);
        assert_eq!(*celsius_log.lock(), vec![100.0]);

        let fahrenheit = instance.node::<f64>("fahrenheit").unwrap();
        assert_eq!(instance.realm().subscriber_count(fahrenheit), 0);
    }

    #[test]
    fn unknown_labels_are_not_kept() {
        let instance = temperature();
        let scope = instance.scope();

        assert!(scope.subscribe_label("kelvin", |_: &f64| {}).is_err());
        assert!(scope.subscribe_label("celsius", |_: &String| {}).is_err());
        assert!(scope.is_empty());
    }
}
