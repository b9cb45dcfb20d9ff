//! Integration Tests for Realms
//!
//! These tests build realms out of systems and check that operators,
//! composition and teardown work together through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gurx_core::{
    compose_and_build_realm, debounce_time, filter, map, on_next, payload, scan, system,
    throttle_time, with_latest_from, Exports, NodeRef, Payload, Realm, RealmError, RealmInstance,
    System, Value,
};
use parking_lot::Mutex;

/// Record every value a node emits.
fn record<T: Payload + Clone>(realm: &Realm, node: NodeRef<T>) -> Arc<Mutex<Vec<T>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    realm
        .subscribe(node, move |value: &T| sink.lock().push(value.clone()))
        .unwrap();
    log
}

/// A system exporting a source signal `a` and the output `b` of `operator`.
fn pipeline<O, F>(build: F) -> RealmInstance
where
    O: Payload,
    F: Fn(&Realm, NodeRef<i32>) -> gurx_core::Result<NodeRef<O>> + Send + Sync + 'static,
{
    let sys = system(
        move |realm, _| {
            let a = realm.signal::<i32>();
            let b = build(realm, a)?;
            Ok(Exports::new().with("a", a).with("b", b))
        },
        vec![],
    );
    compose_and_build_realm(&[sys]).unwrap()
}

/// Publishing on a mapped source notifies the derived node once with the
/// projected value.
#[test]
fn map_notifies_with_projected_value() {
    let instance = pipeline(|realm, a| realm.pipe(a, map(|v: &i32| v * 3)));
    let b = instance.node::<i32>("b").unwrap();
    let log = record(instance.realm(), b);

    instance.pub_keys([("a", payload(7_i32))]).unwrap();

    assert_eq!(*log.lock(), vec![21]);
}

/// Values failing the predicate never reach subscribers.
#[test]
fn filter_blocks_failing_values() {
    let instance = pipeline(|realm, a| realm.pipe(a, filter(|v: &i32| *v > 10)));
    let b = instance.node::<i32>("b").unwrap();
    let log = record(instance.realm(), b);

    for v in [3, 12, 9, 40] {
        instance.publish_key("a", v).unwrap();
    }

    assert_eq!(*log.lock(), vec![12, 40]);
}

/// Scan folds every emission into the accumulator.
#[test]
fn scan_accumulates() {
    let instance = pipeline(|realm, a| realm.pipe(a, scan(|acc: &i32, v: &i32| acc + v, 1)));
    let b = instance.node::<i32>("b").unwrap();
    let log = record(instance.realm(), b);

    instance.publish_key("a", 2).unwrap();
    instance.publish_key("a", 3).unwrap();

    assert_eq!(*log.lock(), vec![3, 6]);
}

/// `with_latest_from` stays silent until the other node has a value, and
/// the other node never triggers by itself.
#[test]
fn with_latest_from_pairs_with_latest_value() {
    let realm = Realm::new();
    let a = realm.signal::<i32>();
    let b = realm.signal::<&'static str>();
    let paired = realm.pipe(a, with_latest_from(b)).unwrap();
    let log = record(&realm, paired);

    realm.publish(a, 1).unwrap();
    realm.publish(b, "x").unwrap();
    realm.publish(b, "y").unwrap();
    realm.publish(a, 2).unwrap();

    assert_eq!(*log.lock(), vec![(2, "y")]);
}

/// `on_next` pairs a buffered value with the next trigger exactly once.
#[test]
fn on_next_pairs_once() {
    let realm = Realm::new();
    let source = realm.signal::<i32>();
    let trigger = realm.signal::<i32>();
    let paired = realm.pipe(source, on_next(trigger)).unwrap();
    let log = record(&realm, paired);

    realm.publish(source, 2).unwrap();
    assert!(log.lock().is_empty());

    realm.publish(trigger, 3).unwrap();
    realm.publish(trigger, 4).unwrap();

    assert_eq!(*log.lock(), vec![(2, 3)]);
}

/// A simultaneous publish of two combined inputs yields one notification.
#[test]
fn combine_emits_once_for_simultaneous_publish() {
    let sys = system(
        |realm, _| {
            let a = realm.signal::<i32>();
            let b = realm.signal::<i32>();
            let d = realm.cell(6_i32);
            let combined = realm.combine3(a, b, d)?;
            Ok(Exports::new()
                .with("a", a)
                .with("b", b)
                .with("d", d)
                .with("combined", combined))
        },
        vec![],
    );
    let instance = compose_and_build_realm(&[sys]).unwrap();
    let combined = instance.node::<(i32, i32, i32)>("combined").unwrap();
    let log = record(instance.realm(), combined);

    instance
        .pub_keys([("a", payload(3_i32)), ("b", payload(4_i32))])
        .unwrap();
    assert_eq!(*log.lock(), vec![(3, 4, 6)]);

    instance.publish_key("d", 7_i32).unwrap();
    assert_eq!(*log.lock(), vec![(3, 4, 6), (3, 4, 7)]);
}

/// Heterogeneous combine through labels.
#[test]
fn combine_erased_labels() {
    let sys = system(
        |realm, _| {
            let name = realm.cell("doc".to_string());
            let size = realm.cell(1_usize);
            let both = realm.combine(&[name.erase(), size.erase()])?;
            Ok(Exports::new().with("name", name).with("size", size).with("both", both))
        },
        vec![],
    );
    let instance = compose_and_build_realm(&[sys]).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    instance
        .sub_keys(&["both"], move |values| {
            if let Some(both) = values.get::<Vec<Value>>(0) {
                let size = both[1].downcast_ref::<usize>().copied();
                log.lock().push(size);
            }
        })
        .unwrap();

    instance.publish_key("size", 9_usize).unwrap();

    assert_eq!(*seen.lock(), vec![Some(9)]);
}

/// Three emissions inside one throttle window produce a single, latest
/// value once the window closes.
#[tokio::test(start_paused = true)]
async fn throttle_releases_latest_value_after_window() {
    let instance = pipeline(|realm, a| realm.pipe(a, throttle_time(50)));
    let b = instance.node::<i32>("b").unwrap();
    let log = record(instance.realm(), b);

    for v in 1..=3 {
        instance.publish_key("a", v).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(log.lock().is_empty());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(*log.lock(), vec![3]);
}

/// Disposing the realm cancels a pending debounce, so nothing is emitted.
#[tokio::test(start_paused = true)]
async fn teardown_cancels_pending_debounce() {
    let instance = pipeline(|realm, a| realm.pipe(a, debounce_time(20)));
    let b = instance.node::<i32>("b").unwrap();
    let log = record(instance.realm(), b);

    instance.publish_key("a", 1).unwrap();
    assert_eq!(instance.realm().pending_timers(), 1);

    instance.dispose();
    assert_eq!(instance.realm().pending_timers(), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(log.lock().is_empty());
    assert_eq!(
        instance.publish_key("a", 2).unwrap_err(),
        RealmError::Disposed
    );
}

/// Disposing the realm inside a throttle window drops the held value.
#[tokio::test(start_paused = true)]
async fn teardown_cancels_pending_throttle() {
    let instance = pipeline(|realm, a| realm.pipe(a, throttle_time(50)));
    let b = instance.node::<i32>("b").unwrap();
    let log = record(instance.realm(), b);

    instance.publish_key("a", 1).unwrap();
    assert_eq!(instance.realm().pending_timers(), 1);

    instance.dispose();
    assert_eq!(instance.realm().pending_timers(), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(log.lock().is_empty());
}

/// A dependency shared by two systems initializes exactly once, and both
/// dependants see the same node.
#[test]
fn shared_dependency_initializes_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let sys_a = System::named(
        "a",
        move |realm, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Exports::new().with("value", realm.cell(1_i32)))
        },
        vec![],
    );
    let sys_b = system(
        |realm, deps| {
            let value = deps[0].get::<i32>("value")?;
            let doubled = realm.pipe(value, map(|v: &i32| v * 2))?;
            Ok(Exports::new().with("doubled", doubled))
        },
        vec![sys_a.clone()],
    );
    let sys_c = system(
        |realm, deps| {
            let value = deps[0].get::<i32>("value")?;
            let label = realm.pipe(value, map(|v: &i32| format!("v{v}")))?;
            Ok(Exports::new().with("label", label))
        },
        vec![sys_a],
    );

    let instance = compose_and_build_realm(&[sys_b, sys_c]).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    instance.publish_key("value", 4_i32).unwrap();
    let doubled = instance.node::<i32>("doubled").unwrap();
    let label = instance.node::<String>("label").unwrap();
    assert_eq!(instance.realm().get_value(doubled).unwrap(), Some(8));
    assert_eq!(
        instance.realm().get_value(label).unwrap(),
        Some("v4".to_string())
    );
}

/// Two systems exporting the same label cannot be composed.
#[test]
fn duplicate_exports_fail_the_build() {
    let one = system(|realm, _| Ok(Exports::new().with("out", realm.signal::<i32>())), vec![]);
    let two = system(|realm, _| Ok(Exports::new().with("out", realm.signal::<i32>())), vec![]);

    let err = compose_and_build_realm(&[one, two]).unwrap_err();
    assert_eq!(
        err,
        RealmError::DuplicateExport {
            name: "out".to_string()
        }
    );
}

/// Unknown labels fail loudly instead of being dropped.
#[test]
fn unknown_labels_fail() {
    let instance = pipeline(|realm, a| realm.pipe(a, map(|v: &i32| *v)));

    assert!(matches!(
        instance.pub_keys([("missing", payload(1_i32))]),
        Err(RealmError::UnknownLabel { .. })
    ));
    assert!(matches!(
        instance.sub_keys(&["a", "missing"], |_| {}),
        Err(RealmError::UnknownLabel { .. })
    ));
}

/// A subscriber publishing back into the realm starts a new transaction
/// after the current one instead of recursing.
#[test]
fn reentrant_publish_is_queued() {
    let instance = pipeline(|realm, a| realm.pipe(a, map(|v: &i32| v + 1)));
    let realm = instance.realm().clone();
    let a = instance.node::<i32>("a").unwrap();
    let b = instance.node::<i32>("b").unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));

    let log = events.clone();
    let inner = realm.clone();
    realm
        .subscribe(b, move |v: &i32| {
            log.lock().push(format!("b={v}"));
            if *v < 3 {
                inner.publish(a, *v).unwrap();
            }
            log.lock().push(format!("b={v} done"));
        })
        .unwrap();

    realm.publish(a, 1).unwrap();

    assert_eq!(
        *events.lock(),
        vec!["b=2", "b=2 done", "b=3", "b=3 done"]
    );
}

/// Publishes from another thread go through the same drain.
#[test]
fn publishes_from_other_threads() {
    let instance = pipeline(|realm, a| realm.pipe(a, scan(|acc: &i32, v: &i32| acc + v, 0)));
    let a = instance.node::<i32>("a").unwrap();
    let b = instance.node::<i32>("b").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let realm = instance.realm().clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    realm.publish(a, 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(instance.realm().get_value(b).unwrap(), Some(100));
}

/// Dropping a subscription scope ends everything registered through it.
#[test]
fn scope_unmount_stops_notifications() {
    let instance = pipeline(|realm, a| realm.pipe(a, map(|v: &i32| v * 10)));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let scope = instance.scope();
    let log = seen.clone();
    scope
        .subscribe_label("b", move |v: &i32| log.lock().push(*v))
        .unwrap();

    instance.publish_key("a", 1).unwrap();
    drop(scope);
    instance.publish_key("a", 2).unwrap();

    assert_eq!(*seen.lock(), vec![10]);
}
