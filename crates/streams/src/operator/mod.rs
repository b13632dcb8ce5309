//! Topology operators.
//!
//! Operators are the nodes of a topology graph.  An operator consumes
//! changes on one or more numbered input ports and writes the changes it
//! produces to an output buffer; the scheduler forwards them to every
//! successor of the operator.
//!
//! Operators run on a single thread and are never shared, so stateful
//! operators own their state outright.  State changes made while evaluating
//! a record are provisional until the topology commits them; if the record
//! fails anywhere in the graph, every operator rolls back instead.

use crate::{error::StreamsError, record::Change};
use std::{borrow::Cow, fmt::Debug, hash::Hash};

mod average;
mod join;
mod map;
mod materialize;

pub use average::AverageOperator;
pub use join::{JoinOperator, JoinState};
pub use map::MapOperator;
pub use materialize::TableOperator;

/// Minimal requirements for values exchanged by operators.
pub trait Data: Clone + Debug + 'static {}

impl<T: Clone + Debug + 'static> Data for T {}

/// Minimal requirements for keys.
pub trait Key: Data + Eq + Hash {}

impl<T: Data + Eq + Hash> Key for T {}

/// Output buffer an operator writes its changes to.
pub type Output<K, V> = Vec<Change<K, V>>;

/// Trait implemented by all operators regardless of their arity.
pub trait Operator<K, V>: 'static {
    /// Human-readable operator name, used in topology descriptions and
    /// error messages.
    fn name(&self) -> Cow<'static, str>;

    /// Number of input ports.
    fn arity(&self) -> usize {
        1
    }

    /// Process one change arriving on input port `port`.
    ///
    /// On error the operator must not have written anything to `output`.
    fn eval(
        &mut self,
        port: usize,
        change: Change<K, V>,
        output: &mut Output<K, V>,
    ) -> Result<(), StreamsError>;

    /// Name of the store this operator materializes, if any.
    fn store_name(&self) -> Option<&str> {
        None
    }

    /// Current value of `key` in the operator's store.
    fn lookup(&self, _key: &K) -> Option<V> {
        None
    }

    /// Make all state changes since the last commit permanent.
    fn commit(&mut self) {}

    /// Undo all state changes since the last commit.
    fn rollback(&mut self) {}
}
