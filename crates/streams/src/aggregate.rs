//! Per-key running aggregates.

use crate::error::StreamsError;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// Running `(count, sum)` pair for one key.
///
/// Average is quasi-linear: it is maintained as the linear pair
/// `(count, sum)` and the `sum / count` transformation is applied on read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub count: u64,
    pub sum: f64,
}

impl Aggregate {
    /// `sum / count`, or `None` while the aggregate is empty.
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Store of running aggregates, one per key.
///
/// The store has a single writer: whoever owns it.  `count` and `sum` of a key
/// are always updated together by [`add`](Self::add).  Like
/// [`KeyedTable`](crate::KeyedTable), updates are journaled until
/// [`commit`](Self::commit).
#[derive(Clone, Debug)]
pub struct AggregationStore<K> {
    entries: HashMap<K, Aggregate>,
    undo: Vec<(K, Option<Aggregate>)>,
}

impl<K> Default for AggregationStore<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            undo: Vec::new(),
        }
    }
}

impl<K> AggregationStore<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `value` into the aggregate of `key` and return the updated
    /// aggregate.
    ///
    /// Non-finite values, and values that would overflow the sum, are
    /// rejected and leave the aggregate unchanged.
    pub fn add(&mut self, key: K, value: f64) -> Result<Aggregate, StreamsError> {
        if !value.is_finite() {
            return Err(StreamsError::input(format!(
                "cannot aggregate non-finite value {value}"
            )));
        }

        let old = self.get(&key);
        let current = old.unwrap_or_default();
        let updated = Aggregate {
            count: current.count + 1,
            sum: current.sum + value,
        };
        if !updated.sum.is_finite() {
            return Err(StreamsError::input(format!(
                "adding {value} overflows the sum {}",
                current.sum
            )));
        }

        self.undo.push((key.clone(), old));
        self.entries.insert(key, updated);
        Ok(updated)
    }

    /// Keep all updates since the last commit.
    pub fn commit(&mut self) {
        self.undo.clear();
    }

    /// Undo all updates since the last commit.
    pub fn rollback(&mut self) {
        while let Some((key, old)) = self.undo.pop() {
            match old {
                Some(aggregate) => {
                    self.entries.insert(key, aggregate);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<Aggregate> {
        self.entries.get(key).copied()
    }

    pub fn average(&self, key: &K) -> Option<f64> {
        self.get(key).and_then(|aggregate| aggregate.average())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::{Aggregate, AggregationStore};
    use proptest::{collection::vec, prelude::*};

    #[test]
    fn running_average() {
        let mut store = AggregationStore::new();
        assert_eq!(store.average(&1), None);

        assert_eq!(
            store.add(1, 9.0).unwrap(),
            Aggregate {
                count: 1,
                sum: 9.0
            }
        );
        store.add(1, 6.0).unwrap();
        store.add(2, 1.0).unwrap();

        assert_eq!(store.average(&1), Some(7.5));
        assert_eq!(store.average(&2), Some(1.0));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn empty_aggregate_has_no_average() {
        assert_eq!(Aggregate::default().average(), None);
    }

    #[test]
    fn rejects_non_finite() {
        let mut store = AggregationStore::new();
        store.add("k", 4.0).unwrap();

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = store.add("k", value).unwrap_err();
            assert_eq!(err.error_code(), "InvalidInput");
        }
        assert_eq!(
            store.get(&"k"),
            Some(Aggregate {
                count: 1,
                sum: 4.0
            })
        );
    }

    #[test]
    fn rejects_overflowing_sum() {
        let mut store = AggregationStore::new();
        store.add(1, 1e308).unwrap();

        let err = store.add(1, 1e308).unwrap_err();
        assert_eq!(err.error_code(), "InvalidInput");
        assert_eq!(store.average(&1), Some(1e308));
        assert_eq!(store.get(&1).unwrap().count, 1);

        store.add(1, -1e308).unwrap();
        assert_eq!(store.average(&1), Some(0.0));
    }

    #[test]
    fn rollback_restores_last_commit() {
        let mut store = AggregationStore::new();
        store.add(1, 4.0).unwrap();
        store.commit();

        store.add(1, 8.0).unwrap();
        store.add(2, 1.0).unwrap();
        store.rollback();

        assert_eq!(store.average(&1), Some(4.0));
        assert_eq!(store.get(&2), None);
        assert_eq!(store.len(), 1);
    }

    proptest! {
        // After ratings v1..vN for a key, the average is (v1 + ... + vN) / N.
        #[test]
        fn average_of_all_values(values in vec(0u8..=10, 1..100)) {
            let mut store = AggregationStore::new();
            for v in values.iter() {
                store.add(0, *v as f64).unwrap();
            }

            let expected = values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64;
            let actual = store.average(&0).unwrap();
            prop_assert!((actual - expected).abs() < 1e-9);
            prop_assert_eq!(store.get(&0).unwrap().count, values.len() as u64);
        }
    }
}
