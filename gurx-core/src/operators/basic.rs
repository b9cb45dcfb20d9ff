//! Single-source operators: map, filter, scan, map_to and once.
//!
//! Each one creates a derived node and a connection with a single
//! triggering source.

use crate::error::Result;
use crate::realm::{Connect, NodeRef, Payload, Realm};

use super::Operator;

/// Emits `f(value)` for every source emission. See [`map`].
pub struct Map<F>(F);

/// Transform every emission.
pub fn map<F>(f: F) -> Map<F> {
    Map(f)
}

impl<I, O, F> Operator<I> for Map<F>
where
    I: Payload,
    O: Payload,
    F: FnMut(&I) -> O + Send + 'static,
{
    type Output = O;

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<O>> {
        let mut f = self.0;
        let sink = realm.derived::<O>();
        realm.connect(Connect::to(sink).source(source), move |inputs, done| {
            if let Some(value) = inputs.get(source) {
                done.emit(f(value));
            }
        })?;
        Ok(sink)
    }
}

/// Passes emissions matching a predicate. See [`filter`].
pub struct Filter<P>(P);

/// Forward only the emissions for which `predicate` holds.
pub fn filter<P>(predicate: P) -> Filter<P> {
    Filter(predicate)
}

impl<I, P> Operator<I> for Filter<P>
where
    I: Payload,
    P: FnMut(&I) -> bool + Send + 'static,
{
    type Output = I;

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<I>> {
        let mut predicate = self.0;
        let sink = realm.derived::<I>();
        realm.connect(Connect::to(sink).source(source), move |inputs, done| {
            let Some(value) = inputs.get(source) else {
                return;
            };
            if predicate(value) {
                if let Some(raw) = inputs.value_of(source.key()) {
                    done.forward(raw);
                }
            }
        })?;
        Ok(sink)
    }
}

/// Running accumulator. See [`scan`].
pub struct Scan<F, A> {
    reducer: F,
    seed: A,
}

/// Fold every emission into an accumulator starting at `seed`, emitting the
/// new accumulator each time.
pub fn scan<F, A>(reducer: F, seed: A) -> Scan<F, A> {
    Scan { reducer, seed }
}

impl<I, A, F> Operator<I> for Scan<F, A>
where
    I: Payload,
    A: Payload + Clone,
    F: FnMut(&A, &I) -> A + Send + 'static,
{
    type Output = A;

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<A>> {
        let Scan { mut reducer, seed } = self;
        let mut acc = seed;
        let sink = realm.derived::<A>();
        realm.connect(Connect::to(sink).source(source), move |inputs, done| {
            if let Some(value) = inputs.get(source) {
                acc = reducer(&acc, value);
                done.emit(acc.clone());
            }
        })?;
        Ok(sink)
    }
}

/// Replaces every emission with a constant. See [`map_to`].
pub struct MapTo<T>(T);

/// Emit `value` whenever the source emits.
pub fn map_to<T>(value: T) -> MapTo<T> {
    MapTo(value)
}

impl<I, T> Operator<I> for MapTo<T>
where
    I: Payload,
    T: Payload + Clone,
{
    type Output = T;

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<T>> {
        let constant = self.0;
        let sink = realm.derived::<T>();
        realm.connect(Connect::to(sink).source(source), move |_, done| {
            done.emit(constant.clone());
        })?;
        Ok(sink)
    }
}

/// Forwards the first emission only. See [`once`].
pub struct Once;

/// Pass the first emission through, then stay silent forever.
pub fn once() -> Once {
    Once
}

impl<I: Payload> Operator<I> for Once {
    type Output = I;

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<I>> {
        let mut passed = false;
        let sink = realm.derived::<I>();
        realm.connect(Connect::to(sink).source(source), move |inputs, done| {
            if passed {
                return;
            }
            if let Some(raw) = inputs.value_of(source.key()) {
                passed = true;
                done.forward(raw);
            }
        })?;
        Ok(sink)
    }
}
