//! Synchronous test driver.
//!
//! [`TopologyTestDriver`] replays input records through a [`Topology`] one at
//! a time, in the order they are piped, and queues every record the topology
//! writes per output topic.  There are no threads, timers or I/O: piping a
//! record returns only after the record has been propagated through the whole
//! graph.  Replaying the same input through a fresh driver always produces
//! the same output in the same order.

use crate::{
    circuit::Topology,
    codec::{CodecError, Deserializer},
    error::{RejectedRecord, StreamsError},
    operator::{Data, Key},
    record::{ProducedRecord, RawRecord, Record},
};
use hashbrown::HashMap;
use movie_streams_types::StreamsConfig;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Per-topic offsets and output queues shared by the drivers.
#[derive(Default)]
pub(crate) struct TopicQueues {
    input_offsets: HashMap<String, u64>,
    output_offsets: HashMap<String, u64>,
    outputs: HashMap<String, VecDeque<ProducedRecord>>,
}

impl TopicQueues {
    /// Assign the next offset of input topic `topic`.
    pub(crate) fn next_input_offset(&mut self, topic: &str) -> u64 {
        next_offset(&mut self.input_offsets, topic)
    }

    pub(crate) fn produce(&mut self, record: RawRecord) {
        let offset = next_offset(&mut self.output_offsets, &record.topic);
        self.outputs
            .entry_ref(record.topic.as_str())
            .or_default()
            .push_back(Record {
                topic: record.topic,
                offset,
                key: record.key,
                value: record.value,
            });
    }

    pub(crate) fn read(&mut self, topic: &str) -> Option<ProducedRecord> {
        self.outputs.get_mut(topic)?.pop_front()
    }

    pub(crate) fn read_all(&mut self, topic: &str) -> Vec<ProducedRecord> {
        self.outputs
            .get_mut(topic)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    pub(crate) fn is_empty(&self, topic: &str) -> bool {
        self.outputs.get(topic).map_or(true, VecDeque::is_empty)
    }
}

fn next_offset(offsets: &mut HashMap<String, u64>, topic: &str) -> u64 {
    let offset = offsets.entry_ref(topic).or_insert(0);
    let current = *offset;
    *offset += 1;
    current
}

/// Decode a queued output record with the given key and value deserializers.
pub(crate) fn decode_output<K2, V2, KD, VD>(
    record: ProducedRecord,
    key_deserializer: &KD,
    value_deserializer: &VD,
) -> Result<Record<K2, V2>, StreamsError>
where
    KD: Deserializer<K2>,
    VD: Deserializer<V2>,
{
    let key_bytes = record.key.ok_or_else(|| CodecError::MissingKey {
        topic: record.topic.clone(),
    })?;
    let key = key_deserializer.deserialize(&record.topic, &key_bytes)?;
    let value = value_deserializer.deserialize(&record.topic, &record.value)?;
    Ok(Record {
        topic: record.topic,
        offset: record.offset,
        key,
        value,
    })
}

/// Turn the per-record failures of a batch into the batch result.
pub(crate) fn batch_result(
    total: usize,
    rejected: Vec<RejectedRecord>,
) -> Result<(), StreamsError> {
    if rejected.is_empty() {
        Ok(())
    } else {
        Err(StreamsError::Rejected { total, rejected })
    }
}

/// Deterministic single-threaded driver for a [`Topology`].
pub struct TopologyTestDriver<K, V> {
    topology: Topology<K, V>,
    config: StreamsConfig,
    queues: TopicQueues,
}

impl<K, V> TopologyTestDriver<K, V>
where
    K: Key,
    V: Data,
{
    pub fn new(topology: Topology<K, V>, config: StreamsConfig) -> Result<Self, StreamsError> {
        config.validate()?;
        info!("Topology = {topology}");
        Ok(Self {
            topology,
            config,
            queues: TopicQueues::default(),
        })
    }

    pub fn config(&self) -> &StreamsConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology<K, V> {
        &self.topology
    }

    /// Feed a single record through the topology.
    ///
    /// The record is assigned the next offset of its topic even if it fails.
    pub fn pipe_record(&mut self, record: RawRecord) -> Result<(), StreamsError> {
        let offset = self.queues.next_input_offset(&record.topic);
        self.process(record, offset)
    }

    /// Feed `records` through the topology one by one, in order.
    ///
    /// A record that fails is skipped and processing continues with the next
    /// one.  If any record failed, the returned error lists all failed records
    /// with their topics and offsets.
    pub fn pipe_input<I>(&mut self, records: I) -> Result<(), StreamsError>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let mut total = 0;
        let mut rejected = Vec::new();

        for record in records {
            total += 1;
            let topic = record.topic.clone();
            let offset = self.queues.next_input_offset(&topic);
            if let Err(error) = self.process(record, offset) {
                rejected.push(RejectedRecord {
                    topic,
                    offset,
                    error,
                });
            }
        }

        batch_result(total, rejected)
    }

    fn process(&mut self, record: RawRecord, offset: u64) -> Result<(), StreamsError> {
        let mut output = Vec::new();
        match self.topology.process(&record, &mut output) {
            Ok(()) => {
                debug!(
                    topic = %record.topic,
                    offset,
                    outputs = output.len(),
                    "processed record"
                );
                for produced in output {
                    self.queues.produce(produced);
                }
                Ok(())
            }
            Err(error) => {
                warn!(topic = %record.topic, offset, "record rejected: {error}");
                Err(error)
            }
        }
    }

    /// Next unread record written to `topic`, or `None` if there is none.
    pub fn read_output(&mut self, topic: &str) -> Option<ProducedRecord> {
        self.queues.read(topic)
    }

    /// Next unread record written to `topic`, decoded with the given
    /// deserializers.
    pub fn read_output_as<K2, V2, KD, VD>(
        &mut self,
        topic: &str,
        key_deserializer: &KD,
        value_deserializer: &VD,
    ) -> Result<Option<Record<K2, V2>>, StreamsError>
    where
        KD: Deserializer<K2>,
        VD: Deserializer<V2>,
    {
        self.read_output(topic)
            .map(|record| decode_output(record, key_deserializer, value_deserializer))
            .transpose()
    }

    /// All unread records written to `topic`.
    pub fn read_all_output(&mut self, topic: &str) -> Vec<ProducedRecord> {
        self.queues.read_all(topic)
    }

    pub fn is_output_empty(&self, topic: &str) -> bool {
        self.queues.is_empty(topic)
    }

    /// Current value of `key` in the store named `store`.
    pub fn table_value(&self, store: &str, key: &K) -> Result<Option<V>, StreamsError> {
        self.topology.lookup(store, key)
    }
}

#[cfg(test)]
mod test {
    use super::TopologyTestDriver;
    use crate::{
        circuit::{Topology, TopologyBuilder},
        codec::{Deserializer, LongSerde, RecordFactory, Serializer, StringSerde},
        error::StreamsError,
        record::RawRecord,
        test::init_test_logger,
    };
    use movie_streams_types::StreamsConfig;
    use pretty_assertions::assert_eq;

    /// Keyed string records, latest value per key, echoed to `out`.
    fn latest_values() -> Topology<i64, String> {
        let mut builder = TopologyBuilder::new();
        let input = builder
            .source("in", |record: &RawRecord| {
                let key = record
                    .key
                    .as_deref()
                    .ok_or_else(|| StreamsError::input("missing key"))?;
                Ok((
                    LongSerde.deserialize(&record.topic, key)?,
                    StringSerde.deserialize(&record.topic, &record.value)?,
                ))
            })
            .unwrap();
        let table = builder.to_table(input, "latest").unwrap();
        builder
            .sink(table, "out", |topic: &str, key: &i64, value: &String| {
                Ok((
                    Some(LongSerde.serialize(topic, key)?),
                    StringSerde.serialize(topic, value)?,
                ))
            })
            .unwrap();
        builder.build().unwrap()
    }

    fn driver() -> TopologyTestDriver<i64, String> {
        init_test_logger();
        TopologyTestDriver::new(latest_values(), StreamsConfig::default()).unwrap()
    }

    #[test]
    fn fifo_output() {
        let mut driver = driver();
        let factory = RecordFactory::new("in", LongSerde, StringSerde);

        driver
            .pipe_input(vec![
                factory.create_keyed(&1i64, "a").unwrap(),
                factory.create_keyed(&2i64, "b").unwrap(),
                factory.create_keyed(&1i64, "c").unwrap(),
            ])
            .unwrap();

        let mut read = Vec::new();
        while let Some(record) = driver
            .read_output_as("out", &LongSerde, &StringSerde)
            .unwrap()
        {
            read.push((record.offset, record.key, record.value));
        }
        assert_eq!(
            read,
            vec![
                (0, 1, "a".to_string()),
                (1, 2, "b".to_string()),
                (2, 1, "c".to_string())
            ]
        );
        assert!(driver.is_output_empty("out"));
        assert!(driver.read_output("out").is_none());
        assert!(driver.read_output("unknown").is_none());
        assert_eq!(
            driver.table_value("latest", &1).unwrap(),
            Some("c".to_string())
        );
    }

    #[test]
    fn failed_records_do_not_stop_the_batch() {
        let mut driver = driver();
        let factory = RecordFactory::new("in", LongSerde, StringSerde);

        let result = driver.pipe_input(vec![
            factory.create("keyless").unwrap(),
            factory.create_keyed(&1i64, "a").unwrap(),
            RawRecord::new("elsewhere", Some(vec![0; 8]), b"x".to_vec()),
            RawRecord::new("in", Some(vec![1, 2]), b"short key".to_vec()),
            factory.create_keyed(&2i64, "b").unwrap(),
        ]);

        let err = result.unwrap_err();
        assert_eq!(err.error_code(), "RecordsRejected");
        let rejected: Vec<(&str, u64, String)> = err
            .rejected()
            .iter()
            .map(|r| (r.topic.as_str(), r.offset, r.error.error_code().into_owned()))
            .collect();
        assert_eq!(
            rejected,
            vec![
                ("in", 0, "InvalidInput".to_string()),
                ("elsewhere", 0, "UnknownTopic".to_string()),
                ("in", 2, "CodecError".to_string()),
            ]
        );

        assert_eq!(driver.read_all_output("out").len(), 2);
    }

    #[test]
    fn pipe_record_reports_error_directly() {
        let mut driver = driver();
        let err = driver
            .pipe_record(RawRecord::new("in", None, b"x".to_vec()))
            .unwrap_err();
        assert_eq!(err.error_code(), "InvalidInput");
        assert!(driver.is_output_empty("out"));
    }

    #[test]
    fn read_output_consumes() {
        let mut driver = driver();
        let factory = RecordFactory::new("in", LongSerde, StringSerde);
        driver
            .pipe_record(factory.create_keyed(&1i64, "a").unwrap())
            .unwrap();

        let record = driver.read_output("out").unwrap();
        assert_eq!(record.key, Some(1i64.to_be_bytes().to_vec()));
        assert!(driver
            .read_output_as::<i64, String, _, _>("out", &LongSerde, &StringSerde)
            .unwrap()
            .is_none());
    }

    #[test]
    fn invalid_config() {
        let config = StreamsConfig {
            num_stream_threads: 0,
            ..StreamsConfig::default()
        };
        let err = TopologyTestDriver::new(latest_values(), config).err().unwrap();
        assert_eq!(err.error_code(), "InvalidConfigField");
    }
}
