//! # WireKV - A Small In-Memory Key-Value Server
//!
//! WireKV keeps a single in-memory table and serves it over a RESP-style,
//! length-prefixed, type-tagged wire protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              WireKV                                 │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │   Server    │───>│ Connection  │───>│  Command    │              │
//! │  │ (Listener + │    │  Handler    │    │  Handler    │              │
//! │  │ worker pool)│    └──────┬──────┘    └──────┬──────┘              │
//! │  └─────────────┘           │                  │                     │
//! │                            ▼                  ▼                     │
//! │                     ┌─────────────┐    ┌─────────────┐              │
//! │                     │   Codec     │    │    Store    │              │
//! │                     │ (protocol)  │    │  (RwLock)   │              │
//! │                     └─────────────┘    └─────────────┘              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use wirekv::server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::new(ServerConfig::default());
//!     server.serve().await
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `GET key`
//! - `SET key value`
//! - `DELETE key`
//! - `FLUSH`
//! - `MGET key [key ...]`
//! - `MSET key value [key value ...]`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Wire value type, encoder and bounded decoder
//! - [`storage`]: The shared table
//! - [`commands`]: Request normalization and the command registry
//! - [`connection`]: Per-client request/response loop
//! - [`server`]: Listener and worker pool
//! - [`client`]: Async client over the same codec
//!
//! ## Error Handling
//!
//! A malformed frame closes the connection without a reply. A bad command
//! (unknown name, wrong argument count) is answered with an error value and
//! the connection stays open.

pub mod client;
pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use client::{Client, ClientError};
pub use commands::{CommandError, CommandHandler};
pub use connection::ConnectionStats;
pub use protocol::{ParseError, ParseLimits, RespParser, Value};
pub use server::{Server, ServerConfig};
pub use storage::Store;

/// The default port WireKV listens on
pub const DEFAULT_PORT: u16 = 31337;

/// The default host WireKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default worker pool size
pub const DEFAULT_MAX_CLIENTS: usize = 64;

/// Version of WireKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
