//! TCP Server
//!
//! Accepts connections and runs one [`ConnectionHandler`] task per client.
//!
//! Concurrency is bounded by a fixed-size worker pool: a slot is taken before
//! each `accept()` and released when that connection's task ends. Once every
//! slot is busy the server stops accepting, and new clients wait in the
//! listen backlog until a slot frees up. There is no rejection, queue limit
//! or timeout.

use crate::commands::CommandHandler;
use crate::connection::{ConnectionHandler, ConnectionStats, MAX_REQUEST_BYTES};
use crate::protocol::ParseLimits;
use crate::storage::Store;
use crate::{DEFAULT_HOST, DEFAULT_MAX_CLIENTS, DEFAULT_PORT};
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Server configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Worker pool size: connections served concurrently
    pub max_clients: usize,
    /// Decode ceilings applied to every request
    pub limits: ParseLimits,
    /// Largest request a connection may buffer
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            limits: ParseLimits::default(),
            max_request_bytes: MAX_REQUEST_BYTES,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The listener plus everything shared between connections.
pub struct Server {
    config: ServerConfig,
    storage: Arc<Store>,
    stats: Arc<ConnectionStats>,
    pool: Arc<Semaphore>,
}

impl Server {
    /// Creates a server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(Store::new()))
    }

    /// Creates a server over an existing store.
    ///
    /// A `max_clients` of zero is raised to one; an empty pool would never
    /// accept a connection.
    pub fn with_store(mut config: ServerConfig, storage: Arc<Store>) -> Self {
        if config.max_clients == 0 {
            warn!("max_clients is 0, using a pool of 1");
            config.max_clients = 1;
        }
        let pool = Arc::new(Semaphore::new(config.max_clients));
        Self {
            config,
            storage,
            stats: Arc::new(ConnectionStats::new()),
            pool,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<Store> {
        &self.storage
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> io::Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        info!(
            addr = %listener.local_addr()?,
            max_clients = self.config.max_clients,
            "Listening"
        );
        Ok(listener)
    }

    /// Binds the configured address and serves forever.
    pub async fn serve(&self) -> io::Result<()> {
        let listener = self.bind().await?;
        self.run(listener).await
    }

    /// Accepts connections on `listener` until the task is dropped.
    pub async fn run(&self, listener: TcpListener) -> io::Result<()> {
        loop {
            let permit = Arc::clone(&self.pool)
                .acquire_owned()
                .await
                .map_err(|_| io::Error::other("worker pool closed"))?;

            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            debug!(
                client = %addr,
                free_slots = self.pool.available_permits(),
                "Accepted connection"
            );

            let handler = ConnectionHandler::new(
                stream,
                addr,
                CommandHandler::new(Arc::clone(&self.storage)),
                Arc::clone(&self.stats),
            )
            .with_limits(self.config.limits, self.config.max_request_bytes);

            tokio::spawn(async move {
                // Errors are logged inside `run`
                let _ = handler.run().await;
                drop(permit);
            });
        }
    }
}
