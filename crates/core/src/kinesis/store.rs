//! The remote Kinesis operations the stream access worker relies on.

use std::future::Future;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_kinesis::{
    Client,
    config::Credentials,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::ShardIteratorType,
};
use kinescope_types::KinesisError;
use tracing::{debug, info, warn};

use crate::config::KinesisConfig;

/// A record as returned by `GetRecords`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub sequence_number: String,
    pub data: Vec<u8>,
}

/// The four Kinesis calls needed to browse streams.
///
/// Implementations map "does not exist" answers to
/// [`KinesisError::StreamNotFound`] / [`KinesisError::ShardNotFound`] and
/// everything else to [`KinesisError::UpstreamFailure`]. They never retry.
pub trait RemoteStore: Send + Sync + 'static {
    fn list_streams(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<String>, KinesisError>> + Send;

    fn list_shards(
        &self,
        stream_name: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<String>, KinesisError>> + Send;

    /// Fresh iterator positioned at TRIM_HORIZON. Kinesis may answer
    /// without one, in which case there is nothing to read.
    fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
    ) -> impl Future<Output = Result<Option<String>, KinesisError>> + Send;

    fn get_records(
        &self,
        shard_iterator: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<StoredRecord>, KinesisError>> + Send;
}

/// [`RemoteStore`] backed by the AWS SDK client
#[derive(Debug, Clone)]
pub struct KinesisStore {
    client: Client,
}

impl KinesisStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build the SDK client from configuration.
    pub async fn connect(config: &KinesisConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        match &config.credentials {
            Some(credentials) => {
                warn!("Using {} credentials", credentials.kind());
                loader = loader.credentials_provider(Credentials::new(
                    credentials.access_key_id.clone(),
                    credentials.secret_access_key.clone(),
                    credentials.session_token.clone(),
                    None,
                    "kinescope",
                ));
            }
            None => info!("Using default AWS credential chain"),
        }

        match &config.endpoint_override {
            Some(endpoint) => {
                warn!(endpoint = %endpoint, "Using endpoint override");
                loader = loader.endpoint_url(endpoint.clone());
            }
            None => info!("Using AWS endpoint configuration"),
        }

        let sdk_config = loader.load().await;
        info!(region = %config.region, "Kinesis client ready");

        Self::new(Client::new(&sdk_config))
    }
}

impl RemoteStore for KinesisStore {
    async fn list_streams(&self, limit: u32) -> Result<Vec<String>, KinesisError> {
        let output = self
            .client
            .list_streams()
            .limit(limit as i32)
            .send()
            .await
            .map_err(upstream)?;

        Ok(output.stream_names().to_vec())
    }

    async fn list_shards(&self, stream_name: &str, limit: u32) -> Result<Vec<String>, KinesisError> {
        let output = self
            .client
            .list_shards()
            .stream_name(stream_name)
            .max_results(limit as i32)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());
                if not_found {
                    KinesisError::stream_not_found(stream_name)
                } else {
                    upstream(err)
                }
            })?;

        Ok(output
            .shards()
            .iter()
            .map(|shard| shard.shard_id().to_string())
            .collect())
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
    ) -> Result<Option<String>, KinesisError> {
        let output = self
            .client
            .get_shard_iterator()
            .stream_name(stream_name)
            .shard_id(shard_id)
            .shard_iterator_type(ShardIteratorType::TrimHorizon)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .filter(|e| e.is_resource_not_found_exception())
                    .map(|e| classify_not_found(e.message(), stream_name, shard_id));
                not_found.unwrap_or_else(|| upstream(err))
            })?;

        Ok(output.shard_iterator().map(str::to_string))
    }

    async fn get_records(
        &self,
        shard_iterator: &str,
        limit: u32,
    ) -> Result<Vec<StoredRecord>, KinesisError> {
        let output = self
            .client
            .get_records()
            .shard_iterator(shard_iterator)
            .limit(limit as i32)
            .send()
            .await
            .map_err(upstream)?;

        debug!(
            records = output.records().len(),
            millis_behind_latest = ?output.millis_behind_latest(),
            "Fetched records"
        );

        Ok(output
            .records()
            .iter()
            .map(|record| StoredRecord {
                sequence_number: record.sequence_number().to_string(),
                data: record.data().as_ref().to_vec(),
            })
            .collect())
    }
}

fn upstream<E, R>(err: SdkError<E, R>) -> KinesisError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    KinesisError::upstream(DisplayErrorContext(&err).to_string())
}

/// `GetShardIterator` uses one error code for a missing stream and a missing
/// shard; only the message tells them apart.
fn classify_not_found(message: Option<&str>, stream_name: &str, shard_id: &str) -> KinesisError {
    let mentions_shard = message.is_some_and(|m| m.to_ascii_lowercase().contains("shard"));
    if mentions_shard {
        KinesisError::shard_not_found(stream_name, shard_id)
    } else {
        KinesisError::stream_not_found(stream_name)
    }
}
