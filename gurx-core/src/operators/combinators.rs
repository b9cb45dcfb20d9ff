//! Multi-input operators.
//!
//! These read more than one node. None of them emits a partially populated
//! tuple: until every input has produced a value the derived node stays
//! silent.

use crate::error::Result;
use crate::graph::Value;
use crate::realm::{Connect, ErasedNode, NodeRef, Payload, Readiness, Realm};

use super::Operator;

/// Pairs source emissions with the latest value of another node. See
/// [`with_latest_from`].
pub struct WithLatestFrom<B>(NodeRef<B>);

/// On every source emission, emit `(source, latest(other))`.
///
/// `other` never triggers an emission by itself.
pub fn with_latest_from<B>(other: NodeRef<B>) -> WithLatestFrom<B> {
    WithLatestFrom(other)
}

impl<I, B> Operator<I> for WithLatestFrom<B>
where
    I: Payload + Clone,
    B: Payload + Clone,
{
    type Output = (I, B);

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<(I, B)>> {
        let other = self.0;
        let sink = realm.derived::<(I, B)>();
        realm.connect(
            Connect::to(sink)
                .source(source)
                .pull(other)
                .readiness(Readiness::All),
            move |inputs, done| {
                if let (Some(a), Some(b)) = (inputs.get(source), inputs.get(other)) {
                    done.emit((a.clone(), b.clone()));
                }
            },
        )?;
        Ok(sink)
    }
}

/// Two-node variant of [`WithLatestFrom`]. See [`with_latest_from2`].
pub struct WithLatestFrom2<B, C>(NodeRef<B>, NodeRef<C>);

/// On every source emission, emit `(source, latest(b), latest(c))`.
pub fn with_latest_from2<B, C>(b: NodeRef<B>, c: NodeRef<C>) -> WithLatestFrom2<B, C> {
    WithLatestFrom2(b, c)
}

impl<I, B, C> Operator<I> for WithLatestFrom2<B, C>
where
    I: Payload + Clone,
    B: Payload + Clone,
    C: Payload + Clone,
{
    type Output = (I, B, C);

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<(I, B, C)>> {
        let WithLatestFrom2(b, c) = self;
        let sink = realm.derived::<(I, B, C)>();
        realm.connect(
            Connect::to(sink)
                .source(source)
                .pull(b)
                .pull(c)
                .readiness(Readiness::All),
            move |inputs, done| {
                if let (Some(x), Some(y), Some(z)) =
                    (inputs.get(source), inputs.get(b), inputs.get(c))
                {
                    done.emit((x.clone(), y.clone(), z.clone()));
                }
            },
        )?;
        Ok(sink)
    }
}

/// Pairs a buffered source value with the next trigger. See [`on_next`].
pub struct OnNext<T>(NodeRef<T>);

/// Buffer the latest source value and emit `(buffered, trigger)` when
/// `trigger` next emits, then clear the buffer.
///
/// The source value must have arrived in an earlier transaction than the
/// trigger; publishing both at once does not form a pair.
pub fn on_next<T>(trigger: NodeRef<T>) -> OnNext<T> {
    OnNext(trigger)
}

impl<I, T> Operator<I> for OnNext<T>
where
    I: Payload + Clone,
    T: Payload + Clone,
{
    type Output = (I, T);

    fn apply(self, realm: &Realm, source: NodeRef<I>) -> Result<NodeRef<(I, T)>> {
        let trigger = self.0;
        let mut buffered: Option<I> = None;
        let sink = realm.derived::<(I, T)>();
        realm.connect(
            Connect::to(sink).source(source).source(trigger),
            move |inputs, done| {
                // Pair against the value buffered before this transaction.
                if inputs.emitted(trigger) {
                    if let (Some(value), Some(t)) = (buffered.take(), inputs.get(trigger)) {
                        done.emit((value, t.clone()));
                    }
                }
                if inputs.emitted(source) {
                    buffered = inputs.get(source).cloned();
                }
            },
        )?;
        Ok(sink)
    }
}

impl Realm {
    /// Emit `(a, b)` whenever either input emits, once both have a value.
    pub fn combine2<A, B>(&self, a: NodeRef<A>, b: NodeRef<B>) -> Result<NodeRef<(A, B)>>
    where
        A: Payload + Clone,
        B: Payload + Clone,
    {
        let sink = self.derived::<(A, B)>();
        self.connect(
            Connect::to(sink)
                .source(a)
                .source(b)
                .readiness(Readiness::All),
            move |inputs, done| {
                if let (Some(x), Some(y)) = (inputs.get(a), inputs.get(b)) {
                    done.emit((x.clone(), y.clone()));
                }
            },
        )?;
        Ok(sink)
    }

    /// Three-input [`Realm::combine2`].
    pub fn combine3<A, B, C>(
        &self,
        a: NodeRef<A>,
        b: NodeRef<B>,
        c: NodeRef<C>,
    ) -> Result<NodeRef<(A, B, C)>>
    where
        A: Payload + Clone,
        B: Payload + Clone,
        C: Payload + Clone,
    {
        let sink = self.derived::<(A, B, C)>();
        self.connect(
            Connect::to(sink)
                .source(a)
                .source(b)
                .source(c)
                .readiness(Readiness::All),
            move |inputs, done| {
                if let (Some(x), Some(y), Some(z)) = (inputs.get(a), inputs.get(b), inputs.get(c)) {
                    done.emit((x.clone(), y.clone(), z.clone()));
                }
            },
        )?;
        Ok(sink)
    }

    /// Four-input [`Realm::combine2`].
    pub fn combine4<A, B, C, D>(
        &self,
        a: NodeRef<A>,
        b: NodeRef<B>,
        c: NodeRef<C>,
        d: NodeRef<D>,
    ) -> Result<NodeRef<(A, B, C, D)>>
    where
        A: Payload + Clone,
        B: Payload + Clone,
        C: Payload + Clone,
        D: Payload + Clone,
    {
        let sink = self.derived::<(A, B, C, D)>();
        self.connect(
            Connect::to(sink)
                .source(a)
                .source(b)
                .source(c)
                .source(d)
                .readiness(Readiness::All),
            move |inputs, done| {
                if let (Some(w), Some(x), Some(y), Some(z)) =
                    (inputs.get(a), inputs.get(b), inputs.get(c), inputs.get(d))
                {
                    done.emit((w.clone(), x.clone(), y.clone(), z.clone()));
                }
            },
        )?;
        Ok(sink)
    }

    /// Combine any number of heterogeneous nodes. Emits the untyped values
    /// in input order.
    pub fn combine(&self, nodes: &[ErasedNode]) -> Result<NodeRef<Vec<Value>>> {
        let sink = self.derived::<Vec<Value>>();
        let connect = nodes
            .iter()
            .fold(Connect::to(sink), |c, node| c.erased_source(*node))
            .readiness(Readiness::All);
        self.connect(connect, |inputs, done| {
            done.emit(inputs.values().iter().flatten().cloned().collect());
        })?;
        Ok(sink)
    }
}
