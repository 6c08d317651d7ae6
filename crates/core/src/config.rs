//! Runtime configuration, read once at startup.

use std::{fmt, time::Duration};

pub use kinescope_types::DEFAULT_LIMIT;
use kinescope_types::MAX_LIMIT;
use thiserror::Error;

pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8888;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("AWS region is required, but was not set")]
    MissingRegion,

    #[error("{missing} is required when {present} is set")]
    IncompleteCredentials {
        missing: &'static str,
        present: &'static str,
    },

    #[error("AWS session token requires an access key id and secret access key")]
    SessionTokenWithoutKeys,

    #[error("Default limit {0} is outside 1..={max}", max = MAX_LIMIT)]
    InvalidDefaultLimit(u32),

    #[error("Request timeout must be greater than zero")]
    ZeroRequestTimeout,

    #[error("Max in-flight requests must be greater than zero")]
    ZeroMaxInFlight,
}

/// Where the HTTP gateway listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Static AWS credentials. When absent the SDK's default provider chain is used.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl StaticCredentials {
    /// Assemble credentials from optional parts.
    ///
    /// Returns `Ok(None)` when nothing is set, and an error when only some of
    /// the parts are.
    pub fn from_parts(
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        session_token: Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        match (access_key_id, secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(Some(Self {
                access_key_id,
                secret_access_key,
                session_token,
            })),
            (Some(_), None) => Err(ConfigError::IncompleteCredentials {
                missing: "AWS_SECRET_ACCESS_KEY",
                present: "AWS_ACCESS_KEY_ID",
            }),
            (None, Some(_)) => Err(ConfigError::IncompleteCredentials {
                missing: "AWS_ACCESS_KEY_ID",
                present: "AWS_SECRET_ACCESS_KEY",
            }),
            (None, None) if session_token.is_some() => Err(ConfigError::SessionTokenWithoutKeys),
            (None, None) => Ok(None),
        }
    }

    pub fn kind(&self) -> &'static str {
        if self.session_token.is_some() {
            "session"
        } else {
            "basic"
        }
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// How to reach Kinesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KinesisConfig {
    pub region: String,
    /// e.g. a localstack URL
    pub endpoint_override: Option<String>,
    pub credentials: Option<StaticCredentials>,
}

impl KinesisConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint_override: None,
            credentials: None,
        }
    }

    pub fn with_endpoint_override(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    pub fn with_credentials(mut self, credentials: StaticCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub http: HttpConfig,
    pub kinesis: KinesisConfig,
    /// Page size for requests that do not carry a limit
    pub default_limit: u32,
    /// How long the gateway waits for a bus reply
    pub request_timeout: Duration,
    /// Kinesis calls the stream access worker keeps outstanding per operation
    pub max_in_flight: usize,
}

impl Config {
    pub fn new(kinesis: KinesisConfig) -> Self {
        Self {
            http: HttpConfig::default(),
            kinesis,
            default_limit: DEFAULT_LIMIT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kinesis.region.trim().is_empty() {
            return Err(ConfigError::MissingRegion);
        }
        if !(1..=MAX_LIMIT).contains(&self.default_limit) {
            return Err(ConfigError::InvalidDefaultLimit(self.default_limit));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::ZeroMaxInFlight);
        }
        Ok(())
    }
}
