//! Storage Module
//!
//! This module provides the table shared by every connection: a mapping from
//! string keys to [`Value`](crate::protocol::Value)s that lives for the
//! process lifetime and is never persisted.
//!
//! ## Operations
//!
//! - `get` / `set` / `delete` on a single key
//! - `flush` to clear the table
//! - `mget` / `mset` on several keys under one lock acquisition
//!
//! ## Example
//!
//! ```
//! use wirekv::storage::Store;
//! use wirekv::protocol::Value;
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::new());
//! store.set("name".to_string(), Value::str("alice"));
//! assert_eq!(store.delete("name"), true);
//! assert_eq!(store.get("name"), Value::Null);
//! ```

pub mod store;

pub use store::Store;
