//! Multi-threaded driver.
//!
//! [`ShardedDriver`] runs one copy of the topology per worker thread and
//! partitions records across workers by the hash of their key, so all
//! records with the same key are processed by the same worker, in input
//! order.  Each worker owns its topology and its stores; nothing is shared
//! between workers.
//!
//! Records are decoded on the caller's thread by a private copy of the
//! topology, which is only used for decoding.  Every batch is sent to the
//! workers as one command per worker, and the caller waits for all workers
//! to finish before returning.  Output records are appended to the output
//! queues in input order, so for any topology whose state is partitioned by
//! key the driver produces the same output as [`TopologyTestDriver`].
//!
//! [`TopologyTestDriver`]: crate::TopologyTestDriver

use crate::{
    circuit::Topology,
    codec::Deserializer,
    driver::{batch_result, decode_output, TopicQueues},
    error::{RejectedRecord, StreamsError},
    operator::{Data, Key},
    record::{ProducedRecord, RawRecord, Record},
};
use crossbeam::channel::{bounded, Receiver, Sender};
use movie_streams_types::StreamsConfig;
use std::{
    hash::{Hash, Hasher},
    sync::Arc,
    thread::{Builder, JoinHandle},
};
use tracing::{debug, error, info, warn};
use xxhash_rust::xxh3::Xxh3Default;

/// Builds one topology instance.  Called once per worker and once for the
/// decoder.
pub type TopologyFactory<K, V> =
    Arc<dyn Fn() -> Result<Topology<K, V>, StreamsError> + Send + Sync>;

/// Shard in `0..shards` that owns `key`.
///
/// Keys are hashed with xxh3, which is stable across runs and platforms, so
/// a key always lands on the same worker for a given worker count.
pub fn shard_for<T: Hash + ?Sized>(key: &T, shards: usize) -> usize {
    let mut hasher = Xxh3Default::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

/// A decoded record addressed to a worker.
struct Job<K, V> {
    /// Position of the record in its batch.
    seq: usize,
    topic: String,
    key: K,
    value: V,
}

enum Command<K, V> {
    Process(Vec<Job<K, V>>),
}

/// Result of one job: the records written to sinks, or the error.
type JobResult = (usize, Result<Vec<RawRecord>, StreamsError>);

struct Worker<K, V> {
    commands: Sender<Command<K, V>>,
    status: Receiver<Vec<JobResult>>,
}

/// Runs a topology on `config.num_stream_threads` worker threads.
pub struct ShardedDriver<K, V> {
    decoder: Topology<K, V>,
    workers: Vec<Worker<K, V>>,
    handles: Vec<JoinHandle<()>>,
    config: StreamsConfig,
    queues: TopicQueues,
    /// First worker found dead, if any.
    failed: Option<usize>,
}

impl<K, V> ShardedDriver<K, V>
where
    K: Key + Send,
    V: Data + Send,
{
    /// Start the workers.
    ///
    /// Returns after every worker has built its topology.  If any worker
    /// fails to build it, all workers are stopped and the first error is
    /// returned.
    pub fn new(
        factory: TopologyFactory<K, V>,
        config: StreamsConfig,
    ) -> Result<Self, StreamsError> {
        config.validate()?;
        let nworkers = config.num_stream_threads;

        let decoder = factory()?;
        info!("Topology = {decoder}");

        let mut workers = Vec::with_capacity(nworkers);
        let mut handles = Vec::with_capacity(nworkers);
        let mut init_receivers = Vec::with_capacity(nworkers);

        for worker_index in 0..nworkers {
            let (init_sender, init_receiver) = bounded(1);
            let (command_sender, command_receiver) = bounded(1);
            let (status_sender, status_receiver) = bounded(1);
            let factory = factory.clone();

            let spawned = Builder::new()
                .name(format!("movie-streams-worker-{worker_index}"))
                .spawn(move || {
                    worker_main(
                        worker_index,
                        factory,
                        init_sender,
                        command_receiver,
                        status_sender,
                    )
                });
            let handle = match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    error!("failed to spawn worker {worker_index}: {e}");
                    Self::stop(workers, handles);
                    return Err(StreamsError::WorkerPanic {
                        worker: worker_index,
                    });
                }
            };

            workers.push(Worker {
                commands: command_sender,
                status: status_receiver,
            });
            handles.push(handle);
            init_receivers.push(init_receiver);
        }

        let mut init_error = None;
        for (worker, receiver) in init_receivers.iter().enumerate() {
            let status = receiver
                .recv()
                .unwrap_or(Err(StreamsError::WorkerPanic { worker }));
            if let Err(error) = status {
                init_error.get_or_insert(error);
            }
        }
        if let Some(error) = init_error {
            Self::stop(workers, handles);
            return Err(error);
        }

        debug!("started {nworkers} worker(s)");
        Ok(Self {
            decoder,
            workers,
            handles,
            config,
            queues: TopicQueues::default(),
            failed: None,
        })
    }

    pub fn config(&self) -> &StreamsConfig {
        &self.config
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Worker that owns `key`.
    pub fn worker_for(&self, key: &K) -> usize {
        shard_for(key, self.workers.len())
    }

    /// Process `records` and wait for all of them to complete.
    ///
    /// Failing records are skipped and reported in the returned error, like
    /// [`TopologyTestDriver::pipe_input`](crate::TopologyTestDriver::pipe_input).
    /// A worker that died fails the whole batch with
    /// [`StreamsError::WorkerPanic`], and so does every later batch: the
    /// state owned by that worker is lost.  No output of a failed batch is
    /// queued.
    pub fn pipe_input<I>(&mut self, records: I) -> Result<(), StreamsError>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        if let Some(worker) = self.failed {
            return Err(StreamsError::WorkerPanic { worker });
        }

        let mut jobs: Vec<Vec<Job<K, V>>> =
            (0..self.workers.len()).map(|_| Vec::new()).collect();
        let mut offsets = Vec::new();
        let mut rejected = Vec::new();

        for (seq, record) in records.into_iter().enumerate() {
            let offset = self.queues.next_input_offset(&record.topic);
            offsets.push((record.topic.clone(), offset));

            match self.decoder.decode(&record) {
                Ok((key, value)) => {
                    let worker = self.worker_for(&key);
                    jobs[worker].push(Job {
                        seq,
                        topic: record.topic,
                        key,
                        value,
                    });
                }
                Err(error) => {
                    warn!(topic = %record.topic, offset, "record rejected: {error}");
                    rejected.push((seq, error));
                }
            }
        }
        let total = offsets.len();

        // Every worker that accepted a command is drained below, even after a
        // failure, so no reply is left behind in its status channel.
        let mut dead = None;
        let mut expected = vec![false; self.workers.len()];
        for (worker, (jobs, handle)) in jobs.into_iter().zip(self.workers.iter()).enumerate() {
            if jobs.is_empty() || dead.is_some() {
                continue;
            }
            if handle.commands.send(Command::Process(jobs)).is_err() {
                dead = Some(worker);
            } else {
                expected[worker] = true;
            }
        }

        let mut outputs = Vec::new();
        for (worker, handle) in self.workers.iter().enumerate() {
            if !expected[worker] {
                continue;
            }
            let Ok(results) = handle.status.recv() else {
                dead.get_or_insert(worker);
                continue;
            };
            for (seq, result) in results {
                match result {
                    Ok(records) => outputs.push((seq, records)),
                    Err(error) => {
                        let (topic, offset) = &offsets[seq];
                        warn!(topic = %topic, offset, worker, "record rejected: {error}");
                        rejected.push((seq, error));
                    }
                }
            }
        }

        if let Some(worker) = dead {
            error!("worker {worker} terminated, the driver is no longer usable");
            self.failed = Some(worker);
            return Err(StreamsError::WorkerPanic { worker });
        }

        outputs.sort_by_key(|(seq, _)| *seq);
        for (_, records) in outputs {
            for record in records {
                self.queues.produce(record);
            }
        }

        rejected.sort_by_key(|(seq, _)| *seq);
        let rejected = rejected
            .into_iter()
            .map(|(seq, error)| {
                let (topic, offset) = offsets[seq].clone();
                RejectedRecord {
                    topic,
                    offset,
                    error,
                }
            })
            .collect();
        batch_result(total, rejected)
    }

    pub fn read_output(&mut self, topic: &str) -> Option<ProducedRecord> {
        self.queues.read(topic)
    }

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

    pub fn read_all_output(&mut self, topic: &str) -> Vec<ProducedRecord> {
        self.queues.read_all(topic)
    }

    pub fn is_output_empty(&self, topic: &str) -> bool {
        self.queues.is_empty(topic)
    }

    /// Disconnect the workers and wait for them to exit.
    fn stop(workers: Vec<Worker<K, V>>, handles: Vec<JoinHandle<()>>) {
        drop(workers);
        for (worker, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                error!("worker {worker} panicked");
            }
        }
    }
}

impl<K, V> Drop for ShardedDriver<K, V> {
    fn drop(&mut self) {
        self.workers.clear();
        for (worker, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                error!("worker {worker} panicked");
            }
        }
    }
}

fn worker_main<K, V>(
    worker_index: usize,
    factory: TopologyFactory<K, V>,
    init_sender: Sender<Result<(), StreamsError>>,
    command_receiver: Receiver<Command<K, V>>,
    status_sender: Sender<Vec<JobResult>>,
) where
    K: Key,
    V: Data,
{
    let mut topology = match factory() {
        Ok(topology) => {
            if init_sender.send(Ok(())).is_err() {
                return;
            }
            topology
        }
        Err(e) => {
            let _ = init_sender.send(Err(e));
            return;
        }
    };

    while let Ok(Command::Process(jobs)) = command_receiver.recv() {
        debug!(worker = worker_index, records = jobs.len(), "processing batch");
        let results = jobs
            .into_iter()
            .map(|job| {
                let mut output = Vec::new();
                let result = topology
                    .inject(&job.topic, job.key, job.value, &mut output)
                    .map(|()| output);
                (job.seq, result)
            })
            .collect();
        if status_sender.send(results).is_err() {
            return;
        }
    }
}
