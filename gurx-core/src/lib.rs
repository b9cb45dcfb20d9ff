//! Gurx Core
//!
//! This crate provides a reactive dataflow engine. It implements:
//!
//! - Typed pub/sub nodes (signals and value-retaining cells)
//! - Glitch-free publish transactions over a dependency graph
//! - An operator library (map, filter, scan, combinators, timers)
//! - Composable systems and a factory that builds realms out of them
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node table, edges and settlement ordering
//! - `realm`: the live runtime (connections, subscriptions, transactions)
//! - `operators`: reusable transformations applied with `Realm::pipe`
//! - `system`: system specifications, composition and the realm factory
//! - `binding`: subscription scopes for mounted UI components
//!
//! # Example
//!
//! ```rust,ignore
//! use gurx_core::{compose_and_build_realm, map, payload, system, Exports};
//!
//! let editor = system(|realm, _| {
//!     let text = realm.cell(String::new());
//!     let length = realm.pipe(text, map(|t: &String| t.len()))?;
//!     Ok(Exports::new().with("text", text).with("length", length))
//! }, vec![]);
//!
//! let instance = compose_and_build_realm(&[editor])?;
//! instance.sub_keys(&["length"], |values| {
//!     println!("length: {:?}", values.get::<usize>(0));
//! })?;
//!
//! instance.pub_keys([("text", payload("hello".to_string()))])?;
//! // prints "length: Some(5)"
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod graph;
pub mod operators;
pub mod realm;
pub mod system;

pub use binding::SubscriptionScope;
pub use config::RealmConfig;
pub use error::{RealmError, Result};
pub use graph::{NodeKey, Value};
pub use operators::{
    debounce_time, filter, map, map_to, on_next, once, pass_only_after_node_has_emitted_before,
    scan, throttle_time, with_latest_from, with_latest_from2, Operator,
};
pub use realm::{
    payload, Connect, Done, ErasedNode, Inputs, NodeRef, Payload, PublishBatch, Readiness, Realm,
    SubscriberId, Subscription, WeakRealm,
};
pub use system::{
    compose, compose_and_build_realm, system, Exports, RealmFactory, RealmInstance, System,
    Values,
};
