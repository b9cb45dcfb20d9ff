//! Systems
//!
//! A [`System`] is a reusable description of a piece of a dataflow graph:
//! an initializer that creates nodes and wiring in a realm and returns the
//! nodes it wants to make public as [`Exports`]. Systems declare the
//! systems they depend on; the initializer receives their exports.
//!
//! [`compose`] walks the dependency closure and initializes every distinct
//! system once, dependencies first. [`RealmFactory`] wraps this into a
//! fresh [`RealmInstance`] whose nodes are addressed by export label.
//!
//! ```rust,ignore
//! let counter = system(|realm, _| {
//!     Ok(Exports::new().with("count", realm.cell(0)))
//! }, vec![]);
//!
//! let doubled = system(|realm, deps| {
//!     let count = deps[0].get::<i32>("count")?;
//!     let doubled = realm.pipe(count, map(|v: &i32| v * 2))?;
//!     Ok(Exports::new().with("doubled", doubled))
//! }, vec![counter]);
//!
//! let instance = compose_and_build_realm(&[doubled])?;
//! instance.pub_keys([("count", payload(21))])?;
//! ```

mod compose;
mod factory;
mod spec;

pub use compose::compose;
pub use factory::{compose_and_build_realm, RealmFactory, RealmInstance, Values};
pub use spec::{system, Exports, System, SystemId};

pub(crate) use factory::subscribe_labels;
