use crate::{
    error::StreamsError,
    operator::{Data, Key, Operator, Output},
    record::Change,
    table::KeyedTable,
};
use std::borrow::Cow;
use tracing::trace;

/// Materializes its input into a [`KeyedTable`] and emits the table's
/// changelog.
///
/// Input changes are treated as upserts: only the new value is used, and the
/// emitted change carries the value previously stored for the key.
pub struct TableOperator<K, V> {
    store: String,
    table: KeyedTable<K, V>,
}

impl<K, V> TableOperator<K, V>
where
    K: Key,
    V: Data,
{
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            table: KeyedTable::new(),
        }
    }

    pub fn table(&self) -> &KeyedTable<K, V> {
        &self.table
    }
}

impl<K, V> Operator<K, V> for TableOperator<K, V>
where
    K: Key,
    V: Data,
{
    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("table({})", self.store))
    }

    fn eval(
        &mut self,
        _port: usize,
        change: Change<K, V>,
        output: &mut Output<K, V>,
    ) -> Result<(), StreamsError> {
        trace!(store = %self.store, key = ?change.key, "upsert");
        output.push(self.table.upsert(change.key, change.new));
        Ok(())
    }

    fn store_name(&self) -> Option<&str> {
        Some(&self.store)
    }

    fn lookup(&self, key: &K) -> Option<V> {
        self.table.get(key).cloned()
    }

    fn commit(&mut self) {
        self.table.commit();
    }

    fn rollback(&mut self) {
        self.table.rollback();
    }
}
