//! HTTP gateway.
//!
//! Translates browser requests into bus requests against the stream access
//! worker and renders the replies as small HTML pages. The gateway never
//! talks to Kinesis itself.

use std::time::Duration;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use kinescope_bus::{Bus, BusError};
use kinescope_types::{
    KinesisError, ListShards, ListStreams, PB_LIST_SHARDS, PB_LIST_STREAMS, PB_READ_SHARD,
    ReadShard,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

mod render;

const NO_STREAMS: &str = "no stream exists yet";
const NO_SHARDS: &str = "no shard exists yet";
const NO_RECORDS: &str = "no records exists yet";

/// State shared across handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub bus: Bus,
    /// How long a handler waits for the worker's reply
    pub request_timeout: Duration,
}

/// Query parameters accepted by every listing route.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
}

/// A bus failure on its way to the browser
#[derive(Debug)]
pub struct GatewayError(pub BusError<KinesisError>);

impl From<BusError<KinesisError>> for GatewayError {
    fn from(err: BusError<KinesisError>) -> Self {
        Self(err)
    }
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            BusError::HandlerFailed { cause, .. } => match cause {
                KinesisError::StreamNotFound { .. } | KinesisError::ShardNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                KinesisError::InvalidLimit { .. } => StatusCode::BAD_REQUEST,
                KinesisError::UpstreamFailure { .. } => StatusCode::BAD_GATEWAY,
            },
            BusError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            BusError::NoHandlerBound(_) => StatusCode::SERVICE_UNAVAILABLE,
            BusError::Dropped(_) | BusError::PayloadMismatch { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.0, "Request failed");
        }
        (status, self.0.to_string()).into_response()
    }
}

/// Create the router with all gateway routes.
pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/kinesis", get(list_streams))
        .route("/kinesis/{stream_name}", get(list_shards))
        .route("/kinesis/{stream_name}/{shard_id}", get(read_shard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(render::INDEX)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn list_streams(
    State(state): State<GatewayState>,
    Query(query): Query<PageQuery>,
) -> Result<Response, GatewayError> {
    let res = state
        .bus
        .request(
            &PB_LIST_STREAMS,
            ListStreams::new().with_limit(query.limit),
            state.request_timeout,
        )
        .await?;

    if res.stream_names.is_empty() {
        return Ok(NO_STREAMS.into_response());
    }
    Ok(Html(render::stream_links(&res.stream_names)).into_response())
}

async fn list_shards(
    State(state): State<GatewayState>,
    Path(stream_name): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, GatewayError> {
    let res = state
        .bus
        .request(
            &PB_LIST_SHARDS,
            ListShards::new(stream_name.clone()).with_limit(query.limit),
            state.request_timeout,
        )
        .await?;

    if res.shard_ids.is_empty() {
        return Ok(NO_SHARDS.into_response());
    }
    Ok(Html(render::shard_links(&stream_name, &res.shard_ids)).into_response())
}

async fn read_shard(
    State(state): State<GatewayState>,
    Path((stream_name, shard_id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Response, GatewayError> {
    let res = state
        .bus
        .request(
            &PB_READ_SHARD,
            ReadShard::new(stream_name, shard_id).with_limit(query.limit),
            state.request_timeout,
        )
        .await?;

    if res.records.is_empty() {
        return Ok(NO_RECORDS.into_response());
    }
    Ok(Html(render::records(&res.records)).into_response())
}
