//! In-memory [`RemoteStore`] for tests.

use std::{collections::HashMap, sync::Arc};

use kinescope_types::KinesisError;
use parking_lot::Mutex;

use crate::kinesis::{RemoteStore, StoredRecord};

/// A call the fake received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ListStreams { limit: u32 },
    ListShards { stream_name: String, limit: u32 },
    GetShardIterator { stream_name: String, shard_id: String },
    GetRecords { shard_iterator: String, limit: u32 },
}

#[derive(Default)]
struct Shard {
    id: String,
    records: Vec<Vec<u8>>,
}

#[derive(Default)]
struct Stream {
    name: String,
    shards: Vec<Shard>,
}

#[derive(Default)]
struct State {
    streams: Vec<Stream>,
    iterators: HashMap<String, (String, String)>,
    next_iterator: u64,
    calls: Vec<Call>,
    failure: Option<String>,
    ignore_limits: bool,
    withhold_iterators: bool,
}

impl State {
    fn stream(&self, name: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.name == name)
    }
}

/// Streams and shards kept in memory, in insertion order.
///
/// Clones share state, so a test can keep a handle after moving one into a
/// worker.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, name: &str, shard_ids: &[&str]) -> Self {
        self.state.lock().streams.push(Stream {
            name: name.to_string(),
            shards: shard_ids
                .iter()
                .map(|id| Shard {
                    id: id.to_string(),
                    records: Vec::new(),
                })
                .collect(),
        });
        self
    }

    pub fn with_record(self, stream_name: &str, shard_id: &str, data: impl Into<Vec<u8>>) -> Self {
        {
            let mut state = self.state.lock();
            let shard = state
                .streams
                .iter_mut()
                .find(|s| s.name == stream_name)
                .and_then(|s| s.shards.iter_mut().find(|sh| sh.id == shard_id))
                .expect("stream and shard must be added first");
            shard.records.push(data.into());
        }
        self
    }

    /// Return more items than asked for, like a misbehaving endpoint
    pub fn ignoring_limits(self) -> Self {
        self.state.lock().ignore_limits = true;
        self
    }

    /// Answer `GetShardIterator` without an iterator
    pub fn withholding_iterators(self) -> Self {
        self.state.lock().withhold_iterators = true;
        self
    }

    /// Fail every following call with an upstream error
    pub fn fail_with(&self, cause: &str) {
        self.state.lock().failure = Some(cause.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    fn take<T>(items: impl Iterator<Item = T>, limit: u32, ignore_limits: bool) -> Vec<T> {
        if ignore_limits {
            items.collect()
        } else {
            items.take(limit as usize).collect()
        }
    }
}

impl RemoteStore for MemoryStore {
    async fn list_streams(&self, limit: u32) -> Result<Vec<String>, KinesisError> {
        let mut state = self.state.lock();
        state.calls.push(Call::ListStreams { limit });
        if let Some(cause) = &state.failure {
            return Err(KinesisError::upstream(cause.clone()));
        }

        let names = state.streams.iter().map(|s| s.name.clone());
        Ok(Self::take(names, limit, state.ignore_limits))
    }

    async fn list_shards(&self, stream_name: &str, limit: u32) -> Result<Vec<String>, KinesisError> {
        let mut state = self.state.lock();
        state.calls.push(Call::ListShards {
            stream_name: stream_name.to_string(),
            limit,
        });
        if let Some(cause) = &state.failure {
            return Err(KinesisError::upstream(cause.clone()));
        }

        let stream = state
            .stream(stream_name)
            .ok_or_else(|| KinesisError::stream_not_found(stream_name))?;
        let ids = stream.shards.iter().map(|sh| sh.id.clone());
        Ok(Self::take(ids, limit, state.ignore_limits))
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
    ) -> Result<Option<String>, KinesisError> {
        let mut state = self.state.lock();
        state.calls.push(Call::GetShardIterator {
            stream_name: stream_name.to_string(),
            shard_id: shard_id.to_string(),
        });
        if let Some(cause) = &state.failure {
            return Err(KinesisError::upstream(cause.clone()));
        }

        let stream = state
            .stream(stream_name)
            .ok_or_else(|| KinesisError::stream_not_found(stream_name))?;
        if !stream.shards.iter().any(|sh| sh.id == shard_id) {
            return Err(KinesisError::shard_not_found(stream_name, shard_id));
        }
        if state.withhold_iterators {
            return Ok(None);
        }

        state.next_iterator += 1;
        let iterator = format!("iterator-{}", state.next_iterator);
        state.iterators.insert(
            iterator.clone(),
            (stream_name.to_string(), shard_id.to_string()),
        );
        Ok(Some(iterator))
    }

    async fn get_records(
        &self,
        shard_iterator: &str,
        limit: u32,
    ) -> Result<Vec<StoredRecord>, KinesisError> {
        let mut state = self.state.lock();
        state.calls.push(Call::GetRecords {
            shard_iterator: shard_iterator.to_string(),
            limit,
        });
        if let Some(cause) = &state.failure {
            return Err(KinesisError::upstream(cause.clone()));
        }

        // iterators are single use
        let (stream_name, shard_id) = state
            .iterators
            .remove(shard_iterator)
            .ok_or_else(|| KinesisError::upstream("ExpiredIteratorException"))?;
        let shard = state
            .stream(&stream_name)
            .and_then(|s| s.shards.iter().find(|sh| sh.id == shard_id))
            .ok_or_else(|| KinesisError::shard_not_found(&stream_name, &shard_id))?;

        let records = shard
            .records
            .iter()
            .enumerate()
            .map(|(seq, data)| StoredRecord {
                sequence_number: format!("{seq:056}"),
                data: data.clone(),
            });
        Ok(Self::take(records, limit, state.ignore_limits))
    }
}
