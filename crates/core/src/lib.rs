//! Kinescope core: the stream access worker, the HTTP gateway in front of it
//! and the application wiring both to the bus.

pub mod app;
pub mod config;
pub mod gateway;
pub mod kinesis;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{AppError, Application, shutdown_signal};
pub use config::{Config, ConfigError, HttpConfig, KinesisConfig, StaticCredentials};
pub use kinesis::{KinesisStore, RemoteStore, StreamAccessWorker, WorkerOptions, decode_record};
