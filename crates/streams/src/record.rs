//! Records exchanged at the topology boundary and between operators.

/// A serialized record addressed to a topic.
///
/// This is what record factories produce and what sinks emit.  The key is
/// optional: some producers write keyless records and leave it to the
/// topology to derive a key from the value.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RawRecord {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

impl RawRecord {
    pub fn new(topic: impl Into<String>, key: Option<Vec<u8>>, value: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key,
            value,
        }
    }
}

/// A record together with its position in its topic.
///
/// Offsets are assigned per topic in arrival order, starting from 0.
#[derive(Clone, Debug, PartialEq)]
pub struct Record<K, V> {
    pub topic: String,
    pub offset: u64,
    pub key: K,
    pub value: V,
}

/// A serialized output record as queued by the drivers.
pub type ProducedRecord = Record<Option<Vec<u8>>, Vec<u8>>;

/// Change notification passed from an operator to its successors.
///
/// For table changelogs `old` holds the value the key had before the update.
/// Stream records carry `old: None`.
#[derive(Clone, Debug, PartialEq)]
pub struct Change<K, V> {
    pub key: K,
    pub old: Option<V>,
    pub new: V,
}

impl<K, V> Change<K, V> {
    /// A stream record, i.e., a change without a previous value.
    pub fn insert(key: K, new: V) -> Self {
        Self {
            key,
            old: None,
            new,
        }
    }

    pub fn update(key: K, old: Option<V>, new: V) -> Self {
        Self { key, old, new }
    }
}
