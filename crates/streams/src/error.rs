use crate::codec::CodecError;
use movie_streams_types::ConfigError;
use std::borrow::Cow;
use thiserror::Error as ThisError;

/// Top-level error type of the streams engine.
///
/// Errors produced while processing a record abort that record only: the
/// drivers keep going with the next record and report the failure to the
/// caller (see [`StreamsError::Rejected`]).
#[derive(Debug, ThisError)]
pub enum StreamsError {
    /// The record could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The record decoded, but its content is not valid input, e.g., a rating
    /// that is not a number.
    #[error("invalid input: {reason}")]
    Input { reason: String },

    /// An operator received a value of a shape it cannot handle.
    #[error("operator '{operator}' cannot process value: {reason}")]
    UnexpectedValue { operator: String, reason: String },

    /// No source reads from this topic.
    #[error("no source reads from topic '{0}'")]
    UnknownTopic(String),

    /// No table store with this name exists in the topology.
    #[error("unknown store '{0}'")]
    UnknownStore(String),

    /// Some records of a batch failed.  All other records of the batch were
    /// processed.
    #[error("{} of {total} input record(s) rejected", rejected.len())]
    Rejected {
        total: usize,
        rejected: Vec<RejectedRecord>,
    },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A worker thread of the sharded driver terminated unexpectedly.
    #[error("worker thread {worker} terminated unexpectedly")]
    WorkerPanic { worker: usize },
}

impl StreamsError {
    pub fn input(reason: impl Into<String>) -> Self {
        Self::Input {
            reason: reason.into(),
        }
    }

    pub fn unexpected_value(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedValue {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    /// Identifying name of the error.
    pub fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::Codec(_) => Cow::from("CodecError"),
            Self::Input { .. } => Cow::from("InvalidInput"),
            Self::UnexpectedValue { .. } => Cow::from("UnexpectedValue"),
            Self::UnknownTopic(_) => Cow::from("UnknownTopic"),
            Self::UnknownStore(_) => Cow::from("UnknownStore"),
            Self::Rejected { .. } => Cow::from("RecordsRejected"),
            Self::Topology(e) => e.error_code(),
            Self::Config(e) => e.error_code(),
            Self::WorkerPanic { .. } => Cow::from("WorkerPanic"),
        }
    }

    /// Records rejected by a batch, or an empty slice for any other error.
    pub fn rejected(&self) -> &[RejectedRecord] {
        match self {
            Self::Rejected { rejected, .. } => rejected,
            _ => &[],
        }
    }
}

/// An input record that failed processing.
#[derive(Debug)]
pub struct RejectedRecord {
    pub topic: String,
    pub offset: u64,
    pub error: StreamsError,
}

/// Errors detected while building a topology.
#[derive(Debug, Clone, Eq, PartialEq, ThisError)]
pub enum TopologyError {
    #[error("topic '{topic}' already has a source")]
    DuplicateSource { topic: String },

    #[error("topic '{topic}' already has a sink")]
    DuplicateSink { topic: String },

    #[error("topic '{topic}' is both read and written by the topology")]
    SourceSinkConflict { topic: String },

    #[error("store name '{store}' is already in use")]
    DuplicateStore { store: String },

    #[error("node {node} does not belong to this topology")]
    UnknownNode { node: usize },

    #[error("node {node} ('{name}') expects {expected} input(s) but has {actual}")]
    PortMismatch {
        node: usize,
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("the topology graph contains a cycle through node {node}")]
    Cycle { node: usize },

    #[error("the topology has no sources")]
    NoSources,
}

impl TopologyError {
    pub fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::DuplicateSource { .. } => Cow::from("DuplicateSource"),
            Self::DuplicateSink { .. } => Cow::from("DuplicateSink"),
            Self::SourceSinkConflict { .. } => Cow::from("SourceSinkConflict"),
            Self::DuplicateStore { .. } => Cow::from("DuplicateStore"),
            Self::UnknownNode { .. } => Cow::from("UnknownNode"),
            Self::PortMismatch { .. } => Cow::from("PortMismatch"),
            Self::Cycle { .. } => Cow::from("CyclicTopology"),
            Self::NoSources => Cow::from("NoSources"),
        }
    }
}
