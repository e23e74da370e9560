//! Command Dispatch Module
//!
//! This module maps decoded requests onto store operations.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Frame Parser   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Normalize    │
//! │  - Lookup       │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! `GET`, `SET`, `DELETE`, `FLUSH`, `MGET`, `MSET`

pub mod handler;

pub use handler::{CommandError, CommandHandler, CommandResult};
