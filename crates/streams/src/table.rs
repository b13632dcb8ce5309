//! Latest-value-per-key tables.

use crate::record::Change;
use hashbrown::HashMap;
use std::hash::Hash;

/// A keyed table materializes a changelog into the latest value per key.
///
/// Every [`upsert`](Self::upsert) replaces the previous value of the key
/// entirely and returns the change, including the replaced value, so that
/// downstream operators can react to it.  Reading a key that was never
/// written is not an error; it simply yields `None`.
///
/// Upserts are journaled until [`commit`](Self::commit), so that the
/// updates of a failed record can be undone with
/// [`rollback`](Self::rollback).
#[derive(Clone, Debug)]
pub struct KeyedTable<K, V> {
    entries: HashMap<K, V>,
    /// Previous value of every key upserted since the last commit, oldest
    /// first.
    undo: Vec<(K, Option<V>)>,
}

impl<K, V> Default for KeyedTable<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            undo: Vec::new(),
        }
    }
}

impl<K, V> KeyedTable<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value of `key` and return the resulting change.
    pub fn upsert(&mut self, key: K, value: V) -> Change<K, V> {
        let old = self.entries.insert(key.clone(), value.clone());
        self.undo.push((key.clone(), old.clone()));
        Change::update(key, old, value)
    }

    /// Keep all upserts since the last commit.
    pub fn commit(&mut self) {
        self.undo.clear();
    }

    /// Undo all upserts since the last commit.
    pub fn rollback(&mut self) {
        while let Some((key, old)) = self.undo.pop() {
            match old {
                Some(value) => {
                    self.entries.insert(key, value);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod test {
    use super::KeyedTable;
    use crate::record::Change;
    use proptest::{collection::vec, prelude::*};
    use std::collections::BTreeMap;

    #[test]
    fn upsert_returns_previous_value() {
        let mut table = KeyedTable::new();
        assert_eq!(table.get(&1), None);

        assert_eq!(table.upsert(1, "a"), Change::update(1, None, "a"));
        assert_eq!(table.upsert(1, "b"), Change::update(1, Some("a"), "b"));
        assert_eq!(table.upsert(2, "c"), Change::update(2, None, "c"));

        assert_eq!(table.get(&1), Some(&"b"));
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
        assert!(!table.contains_key(&3));
    }

    #[test]
    fn rollback_restores_last_commit() {
        let mut table = KeyedTable::new();
        table.upsert(1, "a");
        table.commit();

        table.upsert(1, "b");
        table.upsert(2, "c");
        table.upsert(1, "d");
        table.rollback();

        assert_eq!(table.get(&1), Some(&"a"));
        assert_eq!(table.get(&2), None);
        assert_eq!(table.len(), 1);

        // Nothing left to undo.
        table.rollback();
        assert_eq!(table.get(&1), Some(&"a"));
    }

    proptest! {
        // After any sequence of upserts, every key holds the last value
        // written to it.
        #[test]
        fn latest_value_wins(updates in vec((0i64..8, any::<u32>()), 0..200)) {
            let mut table = KeyedTable::new();
            let mut expected = BTreeMap::new();

            for (key, value) in updates {
                let change = table.upsert(key, value);
                prop_assert_eq!(change.old, expected.insert(key, value));
            }

            prop_assert_eq!(table.len(), expected.len());
            for (key, value) in expected.iter() {
                prop_assert_eq!(table.get(key), Some(value));
            }
        }
    }
}
