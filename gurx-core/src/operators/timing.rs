//! Time-based operators.
//!
//! Throttle and debounce hold values back and re-publish them from a tokio
//! timer as a new transaction. Every timer is registered with the realm, so
//! disposing the realm cancels whatever is still pending.
//!
//! The windowed gate does not schedule anything; it compares timestamps when
//! the source emits.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::Result;
use crate::graph::{NodeKey, Value};
use crate::realm::{Connect, NodeRef, Payload, Realm, TimerId, WeakRealm};

use super::Operator;

/// Publish a held-back value into `sink` from a timer.
fn release(realm: &Realm, sink: NodeKey, value: Value) {
    if let Err(err) = realm.publish_batch(vec![(sink, value)]) {
        warn!(realm = %realm.name(), node = %sink, %err, "delayed emission dropped");
    }
}

/// Emits the latest value once per window. See [`throttle_time`].
pub struct ThrottleTime(Duration);

/// On the first emission of a quiet period, open a window of `ms`
/// milliseconds; when it closes, emit the latest value seen. Emissions
/// inside the window only replace the pending value.
pub fn throttle_time(ms: u64) -> ThrottleTime {
    ThrottleTime(Duration::from_millis(ms))
}

impl<I: Payload> Operator<I> for ThrottleTime {
    type Output = I;

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<I>> {
        let window = self.0;
        let sink = realm.derived::<I>();
        let weak = realm.downgrade();
        let pending: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));

        realm.connect(Connect::to(sink).source(source), move |inputs, _done| {
            let Some(value) = inputs.value_of(source.key()) else {
                return;
            };
            let window_open = pending.lock().replace(value.clone()).is_some();
            if window_open {
                return;
            }

            let Some(realm) = weak.upgrade() else {
                return;
            };
            let held = pending.clone();
            let scheduled = realm.schedule_timer(window, move |realm, _| {
                let value = held.lock().take();
                if let Some(value) = value {
                    release(realm, sink.key(), value);
                }
            });
            if let Err(err) = scheduled {
                pending.lock().take();
                error!(realm = %realm.name(), %err, "throttle window could not be scheduled");
            }
        })?;
        Ok(sink)
    }
}

/// Emits after a quiet period. See [`debounce_time`].
pub struct DebounceTime(Duration);

/// Emit the last value once `ms` milliseconds pass without a new emission.
pub fn debounce_time(ms: u64) -> DebounceTime {
    DebounceTime(Duration::from_millis(ms))
}

#[derive(Default)]
struct Debounced {
    value: Option<Value>,
    timer: Option<TimerId>,
}

impl<I: Payload> Operator<I> for DebounceTime {
    type Output = I;

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<I>> {
        let quiet = self.0;
        let sink = realm.derived::<I>();
        let weak: WeakRealm = realm.downgrade();
        let state: Arc<Mutex<Debounced>> = Arc::default();

        realm.connect(Connect::to(sink).source(source), move |inputs, _done| {
            let Some(value) = inputs.value_of(source.key()) else {
                return;
            };
            let Some(realm) = weak.upgrade() else {
                return;
            };

            let mut debounced = state.lock();
            debounced.value = Some(value.clone());
            if let Some(previous) = debounced.timer.take() {
                realm.cancel_timer(previous);
            }

            let shared = state.clone();
            let scheduled = realm.schedule_timer(quiet, move |realm, id| {
                let value = {
                    let mut debounced = shared.lock();
                    if debounced.timer != Some(id) {
                        return;
                    }
                    debounced.timer = None;
                    debounced.value.take()
                };
                if let Some(value) = value {
                    release(realm, sink.key(), value);
                }
            });
            match scheduled {
                Ok(id) => debounced.timer = Some(id),
                Err(err) => {
                    debounced.value = None;
                    error!(realm = %realm.name(), %err, "debounce timer could not be scheduled");
                }
            }
        })?;
        Ok(sink)
    }
}

/// Time-windowed gate. See [`pass_only_after_node_has_emitted_before`].
pub struct PassOnlyAfter<G> {
    gate: NodeRef<G>,
    window: NodeRef<u64>,
}

/// Forward source emissions only within `window` milliseconds (read from
/// the `window` node) after the most recent emission of `gate`.
pub fn pass_only_after_node_has_emitted_before<G>(
    gate: NodeRef<G>,
    window: NodeRef<u64>,
) -> PassOnlyAfter<G> {
    PassOnlyAfter { gate, window }
}

impl<I: Payload, G: Payload> Operator<I> for PassOnlyAfter<G> {
    type Output = I;

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<I>> {
        let PassOnlyAfter { gate, window } = self;
        let sink = realm.derived::<I>();
        let mut opened: Option<Instant> = None;

        realm.connect(
            Connect::to(sink).source(source).source(gate).pull(window),
            move |inputs, done| {
                if inputs.emitted(gate) {
                    opened = Some(Instant::now());
                }
                if !inputs.emitted(source) {
                    return;
                }
                let (Some(start), Some(ms)) = (opened, inputs.get(window)) else {
                    return;
                };
                if start.elapsed() < Duration::from_millis(*ms) {
                    if let Some(value) = inputs.value_of(source.key()) {
                        done.forward(value);
                    }
                }
            },
        )?;
        Ok(sink)
    }
}
