use crate::{
    error::StreamsError,
    operator::{Data, Key, Operator, Output},
    record::Change,
    table::KeyedTable,
};
use std::borrow::Cow;
use tracing::trace;

type CombineFn<K, V> = Box<dyn Fn(&K, &V, &V) -> Result<V, StreamsError>>;

/// Input port of the left join input.
pub const LEFT: usize = 0;

/// Input port of the right join input.
pub const RIGHT: usize = 1;

/// Join state of a single key.
///
/// ```text
///            left            right
///   Empty ────────► LeftOnly ───────┐
///     │                             ▼
///     │     right              ┌────────┐  left | right
///     └──────────► RightOnly ─►│ Joined │◄─────────────┐
///                     left     └────┬───┘              │
///                                   └──────────────────┘
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JoinState {
    Empty,
    LeftOnly,
    RightOnly,
    Joined,
}

/// Inner join of two keyed tables.
///
/// The operator keeps the latest value of each side per key.  An update on
/// either side looks up the other side; when both are present it computes
/// `combine(key, left, right)`, upserts the result into the joined table and
/// emits the change.  One-sided updates are stored but produce no output.
///
/// Updates are handled strictly in arrival order, so re-emissions for a key
/// follow the order in which its left and right updates were received.
pub struct JoinOperator<K, V> {
    store: String,
    left: KeyedTable<K, V>,
    right: KeyedTable<K, V>,
    joined: KeyedTable<K, V>,
    combine: CombineFn<K, V>,
}

impl<K, V> JoinOperator<K, V>
where
    K: Key,
    V: Data,
{
    pub fn new<F>(store: impl Into<String>, combine: F) -> Self
    where
        F: Fn(&K, &V, &V) -> Result<V, StreamsError> + 'static,
    {
        Self {
            store: store.into(),
            left: KeyedTable::new(),
            right: KeyedTable::new(),
            joined: KeyedTable::new(),
            combine: Box::new(combine),
        }
    }

    pub fn state(&self, key: &K) -> JoinState {
        match (self.left.contains_key(key), self.right.contains_key(key)) {
            (false, false) => JoinState::Empty,
            (true, false) => JoinState::LeftOnly,
            (false, true) => JoinState::RightOnly,
            (true, true) => JoinState::Joined,
        }
    }

    /// Handle a new value of the left input.  Returns the joined change, if
    /// the right side of `key` is present.
    pub fn on_left_update(
        &mut self,
        key: K,
        left: V,
    ) -> Result<Option<Change<K, V>>, StreamsError> {
        let joined = match self.right.get(&key) {
            Some(right) => Some((self.combine)(&key, &left, right)?),
            None => None,
        };
        self.left.upsert(key.clone(), left);
        Ok(joined.map(|value| self.joined.upsert(key, value)))
    }

    /// Handle a new value of the right input.  Returns the joined change, if
    /// the left side of `key` is present.
    pub fn on_right_update(
        &mut self,
        key: K,
        right: V,
    ) -> Result<Option<Change<K, V>>, StreamsError> {
        let joined = match self.left.get(&key) {
            Some(left) => Some((self.combine)(&key, left, &right)?),
            None => None,
        };
        self.right.upsert(key.clone(), right);
        Ok(joined.map(|value| self.joined.upsert(key, value)))
    }

    pub fn joined(&self) -> &KeyedTable<K, V> {
        &self.joined
    }
}

impl<K, V> Operator<K, V> for JoinOperator<K, V>
where
    K: Key,
    V: Data,
{
    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("join({})", self.store))
    }

    fn arity(&self) -> usize {
        2
    }

    fn eval(
        &mut self,
        port: usize,
        change: Change<K, V>,
        output: &mut Output<K, V>,
    ) -> Result<(), StreamsError> {
        let joined = match port {
            LEFT => self.on_left_update(change.key, change.new)?,
            RIGHT => self.on_right_update(change.key, change.new)?,
            _ => {
                return Err(StreamsError::unexpected_value(
                    self.name(),
                    format!("join has no input port {port}"),
                ))
            }
        };

        match joined {
            Some(change) => {
                trace!(store = %self.store, key = ?change.key, "joined");
                output.push(change);
            }
            None => trace!(store = %self.store, port, "one-sided update"),
        }
        Ok(())
    }

    fn store_name(&self) -> Option<&str> {
        Some(&self.store)
    }

    fn lookup(&self, key: &K) -> Option<V> {
        self.joined.get(key).cloned()
    }

    fn commit(&mut self) {
        self.left.commit();
        self.right.commit();
        self.joined.commit();
    }

    fn rollback(&mut self) {
        self.left.rollback();
        self.right.rollback();
        self.joined.rollback();
    }
}
