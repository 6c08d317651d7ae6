//! Kinesis read operations.
//!
//! | Address | Request | Response |
//! |---|---|---|
//! | `kinesis.list-streams` | [`ListStreams`] | [`ListStreamsRes`] |
//! | `kinesis.list-shards` | [`ListShards`] | [`ListShardsRes`] |
//! | `kinesis.read-shard` | [`ReadShard`] | [`ReadShardRes`] |
//!
//! All three fail with [`KinesisError`].

use kinescope_bus::{Postbox, Request};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Page size used when a request carries no limit
pub const DEFAULT_LIMIT: u32 = 100;

/// Largest page Kinesis accepts for any of the list/read calls
pub const MAX_LIMIT: u32 = 10_000;

pub const PB_LIST_STREAMS: Postbox<ListStreams> = Postbox::new("kinesis.list-streams");
pub const PB_LIST_SHARDS: Postbox<ListShards> = Postbox::new("kinesis.list-shards");
pub const PB_READ_SHARD: Postbox<ReadShard> = Postbox::new("kinesis.read-shard");

/// List stream names, at most `limit` of them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListStreams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ListStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: impl Into<Option<u32>>) -> Self {
        self.limit = limit.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListStreamsRes {
    /// Names in the order Kinesis returned them
    pub stream_names: Vec<String>,
}

/// List the shard ids of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListShards {
    pub stream_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ListShards {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: impl Into<Option<u32>>) -> Self {
        self.limit = limit.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListShardsRes {
    pub shard_ids: Vec<String>,
}

/// Read one page of records from the oldest retained record of a shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadShard {
    pub stream_name: String,
    pub shard_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ReadShard {
    pub fn new(stream_name: impl Into<String>, shard_id: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            shard_id: shard_id.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: impl Into<Option<u32>>) -> Self {
        self.limit = limit.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadShardRes {
    /// Record payloads as text; undecodable payloads are replaced by a
    /// placeholder naming their raw bytes
    pub records: Vec<String>,
}

impl Request for ListStreams {
    type Response = ListStreamsRes;
    type Error = KinesisError;
}

impl Request for ListShards {
    type Response = ListShardsRes;
    type Error = KinesisError;
}

impl Request for ReadShard {
    type Response = ReadShardRes;
    type Error = KinesisError;
}

/// Failures of the Kinesis read operations
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KinesisError {
    #[error("Stream {stream_name} not found")]
    StreamNotFound { stream_name: String },

    #[error("Shard {shard_id} not found in stream {stream_name}")]
    ShardNotFound {
        stream_name: String,
        shard_id: String,
    },

    #[error("Limit {limit} is outside 1..={}", MAX_LIMIT)]
    InvalidLimit { limit: u32 },

    /// Any other Kinesis failure: connectivity, throttling, credentials
    #[error("Kinesis call failed: {cause}")]
    UpstreamFailure { cause: String },
}

impl KinesisError {
    pub fn stream_not_found(stream_name: impl Into<String>) -> Self {
        KinesisError::StreamNotFound {
            stream_name: stream_name.into(),
        }
    }

    pub fn shard_not_found(stream_name: impl Into<String>, shard_id: impl Into<String>) -> Self {
        KinesisError::ShardNotFound {
            stream_name: stream_name.into(),
            shard_id: shard_id.into(),
        }
    }

    pub fn upstream(cause: impl Into<String>) -> Self {
        KinesisError::UpstreamFailure {
            cause: cause.into(),
        }
    }

    /// Returns true if Kinesis reported the stream or shard as missing
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            KinesisError::StreamNotFound { .. } | KinesisError::ShardNotFound { .. }
        )
    }
}
