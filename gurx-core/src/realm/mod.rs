//! Realm
//!
//! This module implements the live runtime: nodes, connections,
//! subscriptions, timers and publish transactions.
//!
//! # Concepts
//!
//! ## Nodes
//!
//! A node is either a *signal* (a pure event channel) or a *cell* (keeps its
//! latest value). Nodes are addressed through typed [`NodeRef`] handles; the
//! payload itself travels through the graph untyped.
//!
//! ## Connections
//!
//! A connection reads one or more nodes and writes a sink node through a
//! projection. Operators are built from connections.
//!
//! ## Transactions
//!
//! Publishing starts a transaction. All nodes reachable from the published
//! ones settle exactly once, in dependency order, and subscribers run after
//! the graph has settled. Publishing from inside a transaction queues a new
//! one.
//!
//! # Implementation Notes
//!
//! Unlike pull-based memo systems, the realm is push based and glitch free:
//! a node never runs before all of its inputs settled in the same pass, so
//! it never observes a half-updated graph.

mod connection;
mod context;
mod handle;
mod runtime;
mod subscriber;
mod timers;
mod transaction;

pub use connection::{Connect, Done, Inputs, Readiness};
pub use context::RealmId;
pub use handle::{payload, ErasedNode, NodeRef, Payload};
pub use runtime::{Realm, WeakRealm};
pub use subscriber::{SubscriberId, Subscription};
pub use timers::TimerId;
pub use transaction::PublishBatch;
