//! Wiring of bus, worker and gateway into one running process.

use std::{future::Future, io, net::SocketAddr, time::Instant};

use kinescope_bus::{Bus, RegisterError};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{
    config::{Config, ConfigError},
    gateway::{self, GatewayState},
    kinesis::{KinesisStore, RemoteStore, StreamAccessWorker, WorkerOptions},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start Kinesis worker: {0}")]
    Register(#[from] RegisterError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] io::Error),
}

/// A started application: the worker is bound and the listener is open.
pub struct Application<S> {
    bus: Bus,
    worker: StreamAccessWorker<S>,
    listener: TcpListener,
    state: GatewayState,
}

impl Application<KinesisStore> {
    /// Connect to Kinesis and start everything but the accept loop.
    pub async fn start(config: Config) -> Result<Self, AppError> {
        config.validate()?;
        let store = KinesisStore::connect(&config.kinesis).await;
        Self::with_store(config, store).await
    }
}

impl<S: RemoteStore> Application<S> {
    /// Start with an already built store.
    ///
    /// The worker binds its addresses before the listener is opened.
    pub async fn with_store(config: Config, store: S) -> Result<Self, AppError> {
        let started_at = Instant::now();
        config.validate()?;

        let bus = Bus::new();
        let worker = StreamAccessWorker::new(
            bus.clone(),
            store,
            WorkerOptions {
                default_limit: config.default_limit,
                max_in_flight: config.max_in_flight,
            },
        );
        worker.start().await?;

        let addr = format!("{}:{}", config.http.host, config.http.port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                worker.stop().await;
                bus.shutdown().await;
                return Err(AppError::Bind { addr, source });
            }
        };

        info!(
            version = env!("CARGO_PKG_VERSION"),
            addr = %addr,
            "Started Kinescope in {:.3}s",
            started_at.elapsed().as_secs_f64()
        );

        Ok(Self {
            state: GatewayState {
                bus: bus.clone(),
                request_timeout: config.request_timeout,
            },
            bus,
            worker,
            listener,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Serve until `shutdown` resolves, then stop gateway, worker and bus in
    /// that order.
    pub async fn run<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            bus,
            worker,
            listener,
            state,
        } = self;

        let router = gateway::create_router(state);
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;
        info!("Stopped HTTP gateway");

        worker.stop().await;
        bus.shutdown().await;
        info!("Stopped bus");

        served.map_err(AppError::Serve)
    }
}

/// Resolves on ctrl-c.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!("Failed to listen for ctrl-c: {e}"),
    }
}
