//! Keyed join-and-aggregate stream topologies.
//!
//! A [`Topology`] is a graph of sources, stateful operators and sinks built
//! with a [`TopologyBuilder`](circuit::TopologyBuilder).  Records are fed
//! through it by a driver: [`TopologyTestDriver`] evaluates records one at a
//! time on the calling thread, [`ShardedDriver`] partitions them by key
//! across worker threads.
//!
//! The [`movies`] module builds the rated-movies topology: a table of movies
//! joined with the running average of their ratings.

pub mod aggregate;
pub mod circuit;
pub mod codec;
pub mod driver;
pub mod error;
pub mod movies;
pub mod operator;
pub mod record;
pub mod runtime;
pub mod table;


pub use aggregate::{Aggregate, AggregationStore};
pub use circuit::{Stream, Table, Topology, TopologyBuilder};
pub use driver::TopologyTestDriver;
pub use error::{RejectedRecord, StreamsError, TopologyError};
pub use record::{Change, ProducedRecord, RawRecord, Record};
pub use runtime::{ShardedDriver, TopologyFactory};
pub use table::KeyedTable;

pub use movie_streams_types::{ConfigError, StreamsConfig, TopicsConfig};
