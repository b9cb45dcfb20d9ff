//! Operator Library
//!
//! Operators turn a source node into a derived node by registering a new
//! node plus the connection that feeds it. They are plain values until
//! applied, so pipelines can be built up front and handed to
//! [`Realm::pipe`].
//!
//! A tuple of operators is itself an operator that applies its elements
//! left to right:
//!
//! ```rust,ignore
//! let evens_doubled = realm.pipe(
//!     numbers,
//!     (filter(|n: &i32| n % 2 == 0), map(|n: &i32| n * 2)),
//! )?;
//! ```
//!
//! Derived nodes retain their latest value, so they can be read with
//! `Realm::get_value` and joined with `combine`.

mod basic;
mod combinators;
mod timing;

pub use basic::{filter, map, map_to, once, scan, Filter, Map, MapTo, Once, Scan};
pub use combinators::{on_next, with_latest_from, with_latest_from2, OnNext, WithLatestFrom, WithLatestFrom2};
pub use timing::{
    debounce_time, pass_only_after_node_has_emitted_before, throttle_time, DebounceTime,
    PassOnlyAfter, ThrottleTime,
};

use crate::error::Result;
use crate::realm::{NodeRef, Realm};

/// A transformation from a source node to a derived node.
pub trait Operator<I> {
    /// Payload type of the derived node.
    type Output;

    /// Register the derived node and its wiring in `realm`.
    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<Self::Output>>;
}

impl<I, A> Operator<I> for (A,)
where
    A: Operator<I>,
{
    type Output = A::Output;

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<Self::Output>> {
        self.0.apply(realm, source)
    }
}

// (A, B, ..) applies A, then hands its output to the shorter tuple (B, ..).
macro_rules! impl_operator_chain {
    ($first:ident, $($rest:ident),+) => {
        impl<I, $first, $($rest),+> Operator<I> for ($first, $($rest),+)
        where
            $first: Operator<I>,
            ($($rest,)+): Operator<<$first as Operator<I>>::Output>,
        {
            type Output = <($($rest,)+) as Operator<<$first as Operator<I>>::Output>>::Output;

            #[allow(non_snake_case)]
            fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<Self::Output>> {
                let ($first, $($rest),+) = self;
                let node = $first.apply(realm, source)?;
                ($($rest,)+).apply(realm, node)
            }
        }
    };
}

impl_operator_chain!(A, B);
impl_operator_chain!(A, B, C);
impl_operator_chain!(A, B, C, D);
impl_operator_chain!(A, B, C, D, E);
impl_operator_chain!(A, B, C, D, E, F);
impl_operator_chain!(A, B, C, D, E, F, G);
impl_operator_chain!(A, B, C, D, E, F, G, H);
