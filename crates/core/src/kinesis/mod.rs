//! Stream access worker.
//!
//! Owns the Kinesis client and answers the three read operations on the bus:
//!
//! - `kinesis.list-streams` - one page of stream names
//! - `kinesis.list-shards` - one page of shard ids of a stream
//! - `kinesis.read-shard` - one page of records from the oldest retained
//!   record of a shard
//!
//! Every call is exactly one page. Nothing is retried, nothing is cached, and
//! shard iterators are dropped after a single `GetRecords`.

use std::sync::Arc;

use kinescope_bus::{Bus, MailboxOptions, RegisterError};
use kinescope_types::{
    DEFAULT_LIMIT, KinesisError, ListShards, ListShardsRes, ListStreams, ListStreamsRes, MAX_LIMIT,
    PB_LIST_SHARDS, PB_LIST_STREAMS, PB_READ_SHARD, ReadShard, ReadShardRes,
};
use tracing::{debug, info};

mod store;

pub use store::{KinesisStore, RemoteStore, StoredRecord};

/// Prefix of the text substituted for a record that is not valid UTF-8
pub const UTF8_FAILURE_PREFIX: &str = "failed to parse as UTF8 String: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Page size for requests that carry no limit
    pub default_limit: u32,
    /// Kinesis calls kept outstanding per operation
    pub max_in_flight: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_in_flight: 1,
        }
    }
}

/// Worker serving Kinesis reads over the bus.
///
/// The store is shared only between this worker's own mailbox handlers and
/// is dropped once [`stop`](Self::stop) has drained them.
pub struct StreamAccessWorker<S> {
    bus: Bus,
    store: Arc<S>,
    options: WorkerOptions,
}

impl<S: RemoteStore> StreamAccessWorker<S> {
    pub fn new(bus: Bus, store: S, options: WorkerOptions) -> Self {
        Self {
            bus,
            store: Arc::new(store),
            options,
        }
    }

    /// Bind the worker's addresses.
    ///
    /// If any address is already taken, the ones bound so far are released
    /// again and the error is returned.
    pub async fn start(&self) -> Result<(), RegisterError> {
        if let Err(e) = self.bind() {
            for address in Self::addresses() {
                // only unbind what this call bound
                if !matches!(&e, RegisterError::AddressInUse(taken) if taken == address) {
                    self.bus.deregister(address).await;
                } else {
                    break;
                }
            }
            return Err(e);
        }

        info!(
            default_limit = self.options.default_limit,
            max_in_flight = self.options.max_in_flight,
            "Started Kinesis worker"
        );
        Ok(())
    }

    /// Unbind the worker's addresses, wait for pending requests and release
    /// the store.
    pub async fn stop(self) {
        for address in Self::addresses() {
            self.bus.deregister(address).await;
        }
        drop(self.store);
        info!("Stopped Kinesis worker");
    }

    fn addresses() -> [&'static str; 3] {
        [
            PB_LIST_STREAMS.address(),
            PB_LIST_SHARDS.address(),
            PB_READ_SHARD.address(),
        ]
    }

    fn bind(&self) -> Result<(), RegisterError> {
        let mailbox = MailboxOptions::default().with_max_in_flight(self.options.max_in_flight);
        let default_limit = self.options.default_limit;

        let store = self.store.clone();
        self.bus
            .register_with(&PB_LIST_STREAMS, mailbox, move |req: ListStreams| {
                let store = store.clone();
                async move { list_streams(&*store, default_limit, req).await }
            })?;

        let store = self.store.clone();
        self.bus
            .register_with(&PB_LIST_SHARDS, mailbox, move |req: ListShards| {
                let store = store.clone();
                async move { list_shards(&*store, default_limit, req).await }
            })?;

        let store = self.store.clone();
        self.bus
            .register_with(&PB_READ_SHARD, mailbox, move |req: ReadShard| {
                let store = store.clone();
                async move { read_shard(&*store, default_limit, req).await }
            })?;

        Ok(())
    }
}

async fn list_streams<S: RemoteStore>(
    store: &S,
    default_limit: u32,
    req: ListStreams,
) -> Result<ListStreamsRes, KinesisError> {
    let limit = page_limit(req.limit, default_limit)?;

    let mut stream_names = store.list_streams(limit).await?;
    stream_names.truncate(limit as usize);

    debug!(limit, streams = stream_names.len(), "Listed streams");
    Ok(ListStreamsRes { stream_names })
}

async fn list_shards<S: RemoteStore>(
    store: &S,
    default_limit: u32,
    req: ListShards,
) -> Result<ListShardsRes, KinesisError> {
    let limit = page_limit(req.limit, default_limit)?;

    let mut shard_ids = store.list_shards(&req.stream_name, limit).await?;
    shard_ids.truncate(limit as usize);

    debug!(stream = %req.stream_name, limit, shards = shard_ids.len(), "Listed shards");
    Ok(ListShardsRes { shard_ids })
}

async fn read_shard<S: RemoteStore>(
    store: &S,
    default_limit: u32,
    req: ReadShard,
) -> Result<ReadShardRes, KinesisError> {
    let limit = page_limit(req.limit, default_limit)?;

    let Some(shard_iterator) = store
        .get_shard_iterator(&req.stream_name, &req.shard_id)
        .await?
    else {
        debug!(stream = %req.stream_name, shard = %req.shard_id, "No shard iterator returned");
        return Ok(ReadShardRes::default());
    };

    let records: Vec<String> = store
        .get_records(&shard_iterator, limit)
        .await?
        .iter()
        .take(limit as usize)
        .map(|record| decode_record(&record.data))
        .collect();

    debug!(
        stream = %req.stream_name,
        shard = %req.shard_id,
        limit,
        records = records.len(),
        "Read shard"
    );
    Ok(ReadShardRes { records })
}

/// Resolve the page size of a request, rejecting what Kinesis would reject.
fn page_limit(requested: Option<u32>, default_limit: u32) -> Result<u32, KinesisError> {
    let limit = requested.unwrap_or(default_limit);
    if (1..=MAX_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(KinesisError::InvalidLimit { limit })
    }
}

/// Record payload as text, or a placeholder naming the raw bytes.
pub fn decode_record(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(e) => {
            debug!(bytes = data.len(), error = %e, "Record is not valid UTF-8");
            format!("{UTF8_FAILURE_PREFIX}0x{}", hex::encode(data))
        }
    }
}
