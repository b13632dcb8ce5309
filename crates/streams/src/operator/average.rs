use crate::{
    aggregate::AggregationStore,
    error::StreamsError,
    operator::{Data, Key, Operator, Output},
    record::Change,
};
use std::borrow::Cow;
use tracing::trace;

type ExtractFn<V> = Box<dyn Fn(&V) -> Result<f64, StreamsError>>;
type WrapFn<V> = Box<dyn Fn(f64) -> V>;

/// Incremental average.
///
/// Every input record contributes `extract(value)` to the running
/// `(count, sum)` of its key in an [`AggregationStore`].  After each update
/// the operator emits the new average, wrapped into the value type by
/// `wrap`, together with the previous average of the key.
pub struct AverageOperator<K, V> {
    store: String,
    aggregates: AggregationStore<K>,
    extract: ExtractFn<V>,
    wrap: WrapFn<V>,
}

impl<K, V> AverageOperator<K, V>
where
    K: Key,
    V: Data,
{
    pub fn new<E, W>(store: impl Into<String>, extract: E, wrap: W) -> Self
    where
        E: Fn(&V) -> Result<f64, StreamsError> + 'static,
        W: Fn(f64) -> V + 'static,
    {
        Self {
            store: store.into(),
            aggregates: AggregationStore::new(),
            extract: Box::new(extract),
            wrap: Box::new(wrap),
        }
    }

    pub fn aggregates(&self) -> &AggregationStore<K> {
        &self.aggregates
    }
}

impl<K, V> Operator<K, V> for AverageOperator<K, V>
where
    K: Key,
    V: Data,
{
    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("average({})", self.store))
    }

    fn eval(
        &mut self,
        _port: usize,
        change: Change<K, V>,
        output: &mut Output<K, V>,
    ) -> Result<(), StreamsError> {
        let value = (self.extract)(&change.new)?;
        let old = self.aggregates.average(&change.key).map(&self.wrap);
        let aggregate = self.aggregates.add(change.key.clone(), value)?;

        trace!(store = %self.store, key = ?change.key, count = aggregate.count, sum = aggregate.sum, "aggregate");

        // `add` always leaves `count > 0`.
        if let Some(average) = aggregate.average() {
            output.push(Change::update(change.key, old, (self.wrap)(average)));
        }
        Ok(())
    }

    fn store_name(&self) -> Option<&str> {
        Some(&self.store)
    }

    fn lookup(&self, key: &K) -> Option<V> {
        self.aggregates.average(key).map(&self.wrap)
    }

    fn commit(&mut self) {
        self.aggregates.commit();
    }

    fn rollback(&mut self) {
        self.aggregates.rollback();
    }
}
