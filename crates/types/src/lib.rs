//! Payloads exchanged over the Kinescope bus.
//!
//! Every bus operation has one request type and one response type. The
//! request type implements [`kinescope_bus::Request`], which pins its response
//! and error types, and each operation has a [`kinescope_bus::Postbox`]
//! constant naming its address.

pub mod kinesis;

pub use kinesis::{
    DEFAULT_LIMIT, KinesisError, ListShards, ListShardsRes, ListStreams, ListStreamsRes,
    MAX_LIMIT, PB_LIST_SHARDS, PB_LIST_STREAMS, PB_READ_SHARD, ReadShard, ReadShardRes,
};
