//! API to construct topologies.
//!
//! A topology is a directed acyclic graph of sources, operators and sinks.
//! It is assembled once with a [`TopologyBuilder`], which hands out
//! [`Stream`] and [`Table`] handles to the outputs of the nodes it adds;
//! handles are then passed as inputs to further nodes.  [`TopologyBuilder::build`]
//! validates the graph and freezes it into a [`Topology`] with a fixed
//! evaluation [schedule](schedule::Schedule).
//!
//! # Examples
//!
//! ```
//! use movie_streams::{
//!     circuit::TopologyBuilder,
//!     codec::{Deserializer, LongSerde, Serializer, StringSerde},
//!     RawRecord, StreamsError,
//! };
//!
//! let mut builder = TopologyBuilder::<i64, String>::new();
//! let words = builder
//!     .source("words", |record: &RawRecord| {
//!         let word = StringSerde.deserialize(&record.topic, &record.value)?;
//!         Ok((word.len() as i64, word))
//!     })
//!     .unwrap();
//! let latest = builder.to_table(words, "latest-by-length").unwrap();
//! builder
//!     .sink(latest, "latest", |topic: &str, key: &i64, value: &String| {
//!         Ok((
//!             Some(LongSerde.serialize(topic, key)?),
//!             StringSerde.serialize(topic, value)?,
//!         ))
//!     })
//!     .unwrap();
//!
//! let mut topology = builder.build().unwrap();
//! let mut output = Vec::new();
//! topology
//!     .process(&RawRecord::new("words", None, b"hello".to_vec()), &mut output)
//!     .unwrap();
//! assert_eq!(output[0].value, b"hello".to_vec());
//! # Ok::<(), StreamsError>(())
//! ```

use crate::{
    error::{StreamsError, TopologyError},
    operator::{
        AverageOperator, Data, JoinOperator, Key, MapOperator, Operator, Output, TableOperator,
    },
    record::{Change, RawRecord},
};
use hashbrown::{HashMap, HashSet};
use std::{
    borrow::Cow,
    collections::VecDeque,
    fmt::{self, Display, Formatter},
};
use tracing::debug;

pub mod schedule;

pub use schedule::NodeId;
use schedule::Schedule;

/// Serialized key and value produced by a sink.
pub type EncodedRecord = (Option<Vec<u8>>, Vec<u8>);

type DecodeFn<K, V> = Box<dyn Fn(&RawRecord) -> Result<(K, V), StreamsError>>;
type EncodeFn<K, V> = Box<dyn Fn(&str, &K, &V) -> Result<EncodedRecord, StreamsError>>;

enum NodeKind<K, V> {
    Source { topic: String, decode: DecodeFn<K, V> },
    Operator(Box<dyn Operator<K, V>>),
    Sink { topic: String, encode: EncodeFn<K, V> },
}

struct Node<K, V> {
    kind: NodeKind<K, V>,
    /// Upstream node of each input port.
    inputs: Vec<NodeId>,
}

impl<K, V> Node<K, V>
where
    K: Key,
    V: Data,
{
    fn label(&self) -> Cow<'static, str> {
        match &self.kind {
            NodeKind::Source { topic, .. } | NodeKind::Sink { topic, .. } => {
                Cow::Owned(topic.clone())
            }
            NodeKind::Operator(op) => op.name(),
        }
    }

    fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Source { .. } => "Source",
            NodeKind::Operator(_) => "Processor",
            NodeKind::Sink { .. } => "Sink",
        }
    }
}

/// Handle to a record stream produced by a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Stream {
    node: NodeId,
}

/// Handle to a table changelog produced by a node.
///
/// Tables are streams whose every change is an upsert of a key; only table
/// handles can be joined.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Table {
    node: NodeId,
}

impl Stream {
    pub fn node_id(&self) -> NodeId {
        self.node
    }
}

impl Table {
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// The changelog of the table as a stream.
    pub fn to_stream(self) -> Stream {
        Stream { node: self.node }
    }
}

impl From<Table> for Stream {
    fn from(table: Table) -> Self {
        table.to_stream()
    }
}

/// Assembles a [`Topology`].
pub struct TopologyBuilder<K, V> {
    nodes: Vec<Node<K, V>>,
    sources: HashMap<String, NodeId>,
    sinks: HashMap<String, NodeId>,
    stores: HashSet<String>,
}

impl<K, V> Default for TopologyBuilder<K, V> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            sources: HashMap::new(),
            sinks: HashMap::new(),
            stores: HashSet::new(),
        }
    }
}

impl<K, V> TopologyBuilder<K, V>
where
    K: Key,
    V: Data,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source reading from `topic`.
    ///
    /// `decode` turns each raw record into a key and a value.  It is free to
    /// ignore the raw key and derive the key from the value instead.
    pub fn source<F>(&mut self, topic: &str, decode: F) -> Result<Stream, TopologyError>
    where
        F: Fn(&RawRecord) -> Result<(K, V), StreamsError> + 'static,
    {
        if self.sources.contains_key(topic) {
            return Err(TopologyError::DuplicateSource {
                topic: topic.to_string(),
            });
        }
        if self.sinks.contains_key(topic) {
            return Err(TopologyError::SourceSinkConflict {
                topic: topic.to_string(),
            });
        }

        let node = self.push_node(
            NodeKind::Source {
                topic: topic.to_string(),
                decode: Box::new(decode),
            },
            Vec::new(),
        );
        self.sources.insert(topic.to_string(), node);
        Ok(Stream { node })
    }

    /// Add a sink writing every change of `input` to `topic`.
    pub fn sink<F>(
        &mut self,
        input: impl Into<Stream>,
        topic: &str,
        encode: F,
    ) -> Result<(), TopologyError>
    where
        F: Fn(&str, &K, &V) -> Result<EncodedRecord, StreamsError> + 'static,
    {
        let input = input.into();
        self.check_node(input.node)?;
        if self.sinks.contains_key(topic) {
            return Err(TopologyError::DuplicateSink {
                topic: topic.to_string(),
            });
        }
        if self.sources.contains_key(topic) {
            return Err(TopologyError::SourceSinkConflict {
                topic: topic.to_string(),
            });
        }

        let node = self.push_node(
            NodeKind::Sink {
                topic: topic.to_string(),
                encode: Box::new(encode),
            },
            vec![input.node],
        );
        self.sinks.insert(topic.to_string(), node);
        Ok(())
    }

    /// Add an arbitrary operator with one input per port.
    pub fn add_operator<O>(
        &mut self,
        operator: O,
        inputs: &[Stream],
    ) -> Result<NodeId, TopologyError>
    where
        O: Operator<K, V>,
    {
        for input in inputs {
            self.check_node(input.node)?;
        }
        if operator.arity() != inputs.len() {
            return Err(TopologyError::PortMismatch {
                node: self.nodes.len(),
                name: operator.name().into_owned(),
                expected: operator.arity(),
                actual: inputs.len(),
            });
        }
        if let Some(store) = operator.store_name() {
            if !self.stores.insert(store.to_string()) {
                return Err(TopologyError::DuplicateStore {
                    store: store.to_string(),
                });
            }
        }

        let inputs = inputs.iter().map(|input| input.node).collect();
        Ok(self.push_node(NodeKind::Operator(Box::new(operator)), inputs))
    }

    /// Transform every record of `input` with `map_func`, which may change
    /// the key.
    pub fn map<F>(
        &mut self,
        input: impl Into<Stream>,
        name: &str,
        map_func: F,
    ) -> Result<Stream, TopologyError>
    where
        F: Fn(&K, &V) -> Result<(K, V), StreamsError> + 'static,
    {
        let node = self.add_operator(MapOperator::new(name, map_func), &[input.into()])?;
        Ok(Stream { node })
    }

    /// Materialize `input` into a keyed table named `store`.
    pub fn to_table(
        &mut self,
        input: impl Into<Stream>,
        store: &str,
    ) -> Result<Table, TopologyError> {
        let node = self.add_operator(TableOperator::new(store), &[input.into()])?;
        Ok(Table { node })
    }

    /// Rolling average of `extract(value)` per key.  Emits the new average,
    /// wrapped by `wrap`, after every input record.
    pub fn average<E, W>(
        &mut self,
        input: impl Into<Stream>,
        store: &str,
        extract: E,
        wrap: W,
    ) -> Result<Stream, TopologyError>
    where
        E: Fn(&V) -> Result<f64, StreamsError> + 'static,
        W: Fn(f64) -> V + 'static,
    {
        let node = self.add_operator(AverageOperator::new(store, extract, wrap), &[input.into()])?;
        Ok(Stream { node })
    }

    /// Inner join of two tables.  The result is materialized in `store`.
    pub fn join<F>(
        &mut self,
        left: Table,
        right: Table,
        store: &str,
        combine: F,
    ) -> Result<Table, TopologyError>
    where
        F: Fn(&K, &V, &V) -> Result<V, StreamsError> + 'static,
    {
        let node = self.add_operator(
            JoinOperator::new(store, combine),
            &[left.to_stream(), right.to_stream()],
        )?;
        Ok(Table { node })
    }

    /// Validate the graph and compute its schedule.
    pub fn build(self) -> Result<Topology<K, V>, TopologyError> {
        if self.sources.is_empty() {
            return Err(TopologyError::NoSources);
        }

        let mut successors = vec![Vec::new(); self.nodes.len()];
        for (node_id, node) in self.nodes.iter().enumerate() {
            for (port, input) in node.inputs.iter().enumerate() {
                successors[*input].push((node_id, port));
            }
        }

        let schedule = Schedule::prepare(
            self.nodes.len(),
            successors
                .iter()
                .enumerate()
                .flat_map(|(from, succ)| succ.iter().map(move |(to, _)| (from, *to))),
        )?;

        let pending = (0..self.nodes.len()).map(|_| VecDeque::new()).collect();
        let topology = Topology {
            nodes: self.nodes,
            successors,
            schedule,
            sources: self.sources,
            sinks: self.sinks,
            pending,
            scratch: Vec::new(),
        };
        debug!("built topology with {} nodes", topology.nodes.len());
        Ok(topology)
    }

    fn push_node(&mut self, kind: NodeKind<K, V>, inputs: Vec<NodeId>) -> NodeId {
        self.nodes.push(Node { kind, inputs });
        self.nodes.len() - 1
    }

    fn check_node(&self, node: NodeId) -> Result<(), TopologyError> {
        if node < self.nodes.len() {
            Ok(())
        } else {
            Err(TopologyError::UnknownNode { node })
        }
    }
}

/// An immutable graph of operators with a fixed evaluation order.
///
/// The structure of a topology never changes after it is built; only the
/// state held by its operators does, and only through [`Topology::process`]
/// and [`Topology::inject`].
pub struct Topology<K, V> {
    nodes: Vec<Node<K, V>>,
    /// `(successor, input port)` pairs of each node, in construction order.
    successors: Vec<Vec<(NodeId, usize)>>,
    schedule: Schedule,
    sources: HashMap<String, NodeId>,
    sinks: HashMap<String, NodeId>,
    /// Changes waiting to be evaluated by each node.
    pending: Vec<VecDeque<(usize, Change<K, V>)>>,
    scratch: Output<K, V>,
}

impl<K, V> Topology<K, V>
where
    K: Key,
    V: Data,
{
    pub fn source_topics(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn sink_topics(&self) -> impl Iterator<Item = &str> {
        self.sinks.keys().map(String::as_str)
    }

    pub fn has_source(&self, topic: &str) -> bool {
        self.sources.contains_key(topic)
    }

    /// Names of all stores, in node order.
    pub fn stores(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Operator(op) => op.store_name(),
                _ => None,
            })
            .collect()
    }

    /// Current value of `key` in `store`.
    pub fn lookup(&self, store: &str, key: &K) -> Result<Option<V>, StreamsError> {
        self.nodes
            .iter()
            .find_map(|node| match &node.kind {
                NodeKind::Operator(op) if op.store_name() == Some(store) => Some(op.lookup(key)),
                _ => None,
            })
            .ok_or_else(|| StreamsError::UnknownStore(store.to_string()))
    }

    /// Decode `record` with the source of its topic.
    pub fn decode(&self, record: &RawRecord) -> Result<(K, V), StreamsError> {
        let source = self.source_node(&record.topic)?;
        match &self.nodes[source].kind {
            NodeKind::Source { decode, .. } => decode(record),
            _ => Err(StreamsError::UnknownTopic(record.topic.clone())),
        }
    }

    /// Decode `record` and propagate it through the graph.  Records written to
    /// sinks are appended to `output`.
    pub fn process(
        &mut self,
        record: &RawRecord,
        output: &mut Vec<RawRecord>,
    ) -> Result<(), StreamsError> {
        let (key, value) = self.decode(record)?;
        self.inject(&record.topic, key, value, output)
    }

    /// Propagate an already decoded record from the source of `topic` through
    /// the graph.
    ///
    /// The record is evaluated to completion before this returns.  If any
    /// operator or sink fails, the record leaves no trace: its outputs are
    /// discarded and every store is rolled back to its state before the
    /// record.
    pub fn inject(
        &mut self,
        topic: &str,
        key: K,
        value: V,
        output: &mut Vec<RawRecord>,
    ) -> Result<(), StreamsError> {
        let source = self.source_node(topic)?;
        let output_len = output.len();

        self.pending[source].push_back((0, Change::insert(key, value)));
        let result = self.propagate(output);

        match result {
            Ok(()) => self.for_each_operator(|op| op.commit()),
            Err(_) => {
                for queue in self.pending.iter_mut() {
                    queue.clear();
                }
                self.for_each_operator(|op| op.rollback());
                output.truncate(output_len);
            }
        }
        result
    }

    fn for_each_operator(&mut self, mut f: impl FnMut(&mut dyn Operator<K, V>)) {
        for node in self.nodes.iter_mut() {
            if let NodeKind::Operator(op) = &mut node.kind {
                f(op.as_mut());
            }
        }
    }

    fn source_node(&self, topic: &str) -> Result<NodeId, StreamsError> {
        self.sources
            .get(topic)
            .copied()
            .ok_or_else(|| StreamsError::UnknownTopic(topic.to_string()))
    }

    /// Run the schedule once, evaluating every pending change in FIFO order.
    fn propagate(&mut self, output: &mut Vec<RawRecord>) -> Result<(), StreamsError> {
        let Self {
            nodes,
            successors,
            schedule,
            pending,
            scratch,
            ..
        } = self;

        for &node in schedule.order() {
            while let Some((port, change)) = pending[node].pop_front() {
                match &mut nodes[node].kind {
                    NodeKind::Source { .. } => forward(&successors[node], pending, change),
                    NodeKind::Operator(op) => {
                        scratch.clear();
                        op.eval(port, change, scratch)?;
                        for change in scratch.drain(..) {
                            forward(&successors[node], pending, change);
                        }
                    }
                    NodeKind::Sink { topic, encode } => {
                        let (key, value) = encode(topic, &change.key, &change.new)?;
                        output.push(RawRecord::new(topic.clone(), key, value));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Deliver `change` to every successor.  The last successor receives the
/// original, all others a clone.
fn forward<K, V>(
    successors: &[(NodeId, usize)],
    pending: &mut [VecDeque<(usize, Change<K, V>)>],
    change: Change<K, V>,
) where
    K: Clone,
    V: Clone,
{
    if let Some(((last, last_port), rest)) = successors.split_last() {
        for (node, port) in rest {
            pending[*node].push_back((*port, change.clone()));
        }
        pending[*last].push_back((*last_port, change));
    }
}

impl<K, V> Display for Topology<K, V>
where
    K: Key,
    V: Data,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Topology:")?;
        for &node_id in self.schedule.order() {
            let node = &self.nodes[node_id];
            writeln!(f, "  {}: {} (node {node_id})", node.kind_name(), node.label())?;
            for (successor, _) in self.successors[node_id].iter() {
                writeln!(f, "    --> {}", self.nodes[*successor].label())?;
            }
            for input in node.inputs.iter() {
                writeln!(f, "    <-- {}", self.nodes[*input].label())?;
            }
        }
        Ok(())
    }
}
