//! Connection Module
//!
//! This module manages individual client connections. Each connection is
//! handled by its own async task running a strict request/response loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Server (listener)                       │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ acquire worker slot, accept()
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Parse frame │───>│ Dispatch    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send resp   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod handler;

pub use handler::{ConnectionError, ConnectionHandler, ConnectionStats, MAX_REQUEST_BYTES};
