//! Wire Protocol Implementation
//!
//! This module implements the length-prefixed, type-tagged wire format spoken
//! between clients and the server. It has no knowledge of commands or storage.
//!
//! ## Modules
//!
//! - `types`: Defines the `Value` enum and its encoder
//! - `parser`: Bounded incremental decoder for incoming frames
//!
//! ## Example
//!
//! ```
//! use wirekv::protocol::{parse_message, Value};
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let response = Value::str("alice");
//! assert_eq!(response.serialize(), b"$5\r\nalice\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseLimits, ParseResult, RespParser};
pub use types::Value;
