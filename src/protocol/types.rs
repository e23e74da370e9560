//! Wire Value Types
//!
//! This module defines [`Value`], the tagged union every request and response
//! is made of, along with its wire encoding.
//!
//! ## Protocol Format
//!
//! Each frame starts with a one-byte tag:
//! - `+` Simple string
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk string (`$-1` is null)
//! - `*` Array
//! - `%` Map (count is the number of key/value pairs)
//!
//! Line-terminated fields end with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Error: `-unrecognized command: FOO\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Map: `%1\r\n$1\r\na\r\n:1\r\n`
//! Null: `$-1\r\n`

use std::fmt;

/// The CRLF terminator used by every frame
pub const CRLF: &[u8] = b"\r\n";

/// Frame tag bytes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
    pub const MAP: u8 = b'%';
}

/// A value on the wire.
///
/// The same type is used for decoded requests, stored values and encoded
/// responses. Matching on it is exhaustive, so the encoder has no
/// "unrecognized type" failure path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Absence of a value. Encoded as a null bulk string: `$-1\r\n`
    Null,

    /// UTF-8 text. Encoded as a bulk string: `$<len>\r\n<bytes>\r\n`
    Str(String),

    /// Signed 64-bit integer. Format: `:<integer>\r\n`
    Int(i64),

    /// Ordered sequence. Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<Value>),

    /// Ordered key/value pairs. Keys are not required to be unique.
    /// Format: `%<pairs>\r\n<key1><value1>...`
    Map(Vec<(Value, Value)>),

    /// A failure reported to the client. Format: `-<message>\r\n`
    Error(String),
}

impl Value {
    /// Creates a text value.
    ///
    /// # Example
    /// ```
    /// use wirekv::protocol::types::Value;
    /// let v = Value::str("hello");
    /// assert_eq!(v.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Creates an error value.
    pub fn error(s: impl Into<String>) -> Self {
        Value::Error(s.into())
    }

    /// Serializes the value to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Value::Str(s) => {
                // Length is in bytes, not characters
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(s.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Value::Int(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Value::Error(msg) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(msg.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Value::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
            Value::Map(pairs) => {
                buf.push(prefix::MAP);
                buf.extend_from_slice(pairs.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for (key, value) in pairs {
                    key.serialize_into(buf);
                    value.serialize_into(buf);
                }
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "(nil)"),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Int(n) => write!(f, "(integer) {}", n),
            Value::Error(s) => write!(f, "(error) {}", s),
            Value::Array(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_serialize() {
        assert_eq!(Value::Null.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_str_serialize() {
        assert_eq!(Value::str("hello").serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_str_length_counts_bytes() {
        // "é" is two bytes in UTF-8
        assert_eq!(Value::str("café").serialize(), "$5\r\ncafé\r\n".as_bytes());
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(Value::Int(1000).serialize(), b":1000\r\n");
        assert_eq!(Value::Int(-42).serialize(), b":-42\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = Value::error("unrecognized command: FOO");
        assert_eq!(value.serialize(), b"-unrecognized command: FOO\r\n");
    }

    #[test]
    fn test_array_serialize() {
        let value = Value::Array(vec![Value::str("GET"), Value::str("name")]);
        assert_eq!(value.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    }

    #[test]
    fn test_nested_array_serialize() {
        let value = Value::Array(vec![
            Value::Int(1),
            Value::Array(vec![Value::Int(2), Value::Null]),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n:1\r\n*2\r\n:2\r\n$-1\r\n");
    }

    #[test]
    fn test_map_serialize() {
        let value = Value::Map(vec![
            (Value::str("a"), Value::Int(1)),
            (Value::str("b"), Value::Null),
        ]);
        assert_eq!(value.serialize(), b"%2\r\n$1\r\na\r\n:1\r\n$1\r\nb\r\n$-1\r\n");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::str("x"));
    }

    #[test]
    fn test_display() {
        let value = Value::Array(vec![Value::Int(1), Value::Null, Value::str("b")]);
        assert_eq!(value.to_string(), "[(integer) 1, (nil), \"b\"]");
    }
}
