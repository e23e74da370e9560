//! Async Client
//!
//! A thin request/response wrapper over the same codec the server uses. Each
//! call encodes the arguments as an array, writes it, and reads back exactly
//! one response frame.
//!
//! ## Example
//!
//! ```ignore
//! use wirekv::client::Client;
//! use wirekv::protocol::Value;
//!
//! let mut client = Client::connect("127.0.0.1:31337").await?;
//! client.set("name", "alice").await?;
//! assert_eq!(client.get("name").await?, Value::str("alice"));
//! ```

use crate::protocol::{ParseError, RespParser, Value};
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::trace;

/// Errors returned by [`Client`] calls.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Server closed the connection before a full response arrived
    #[error("Connection closed by server")]
    Disconnected,

    /// Server replied with an error value
    #[error("Server error: {0}")]
    Server(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// A single client connection.
pub struct Client {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    parser: RespParser,
}

impl Client {
    /// Connects to a server.
    pub async fn connect(addr: impl ToSocketAddrs) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(4096),
            parser: RespParser::new(),
        })
    }

    /// Sends one command and waits for its response.
    ///
    /// An error value from the server is returned as [`ClientError::Server`].
    pub async fn execute(&mut self, args: Vec<Value>) -> ClientResult<Value> {
        let request = Value::Array(args).serialize();
        self.stream.write_all(&request).await?;
        self.stream.flush().await?;
        trace!(bytes = request.len(), "Sent request");

        match self.read_response().await? {
            Value::Error(message) => Err(ClientError::Server(message)),
            value => Ok(value),
        }
    }

    async fn read_response(&mut self) -> ClientResult<Value> {
        loop {
            if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                let _ = self.buffer.split_to(consumed);
                return Ok(value);
            }

            if self.stream.get_mut().read_buf(&mut self.buffer).await? == 0 {
                return Err(ClientError::Disconnected);
            }
        }
    }

    pub async fn get(&mut self, key: &str) -> ClientResult<Value> {
        self.execute(vec![Value::str("GET"), Value::str(key)]).await
    }

    pub async fn set(&mut self, key: &str, value: impl Into<Value>) -> ClientResult<Value> {
        self.execute(vec![Value::str("SET"), Value::str(key), value.into()])
            .await
    }

    pub async fn delete(&mut self, key: &str) -> ClientResult<Value> {
        self.execute(vec![Value::str("DELETE"), Value::str(key)]).await
    }

    pub async fn flush(&mut self) -> ClientResult<Value> {
        self.execute(vec![Value::str("FLUSH")]).await
    }

    pub async fn mget(&mut self, keys: &[&str]) -> ClientResult<Value> {
        let mut args = vec![Value::str("MGET")];
        args.extend(keys.iter().map(|k| Value::str(*k)));
        self.execute(args).await
    }

    /// Sends `MSET` with the items as given, pairing is left to the server.
    pub async fn mset(&mut self, items: Vec<Value>) -> ClientResult<Value> {
        let mut args = Vec::with_capacity(items.len() + 1);
        args.push(Value::str("MSET"));
        args.extend(items);
        self.execute(args).await
    }
}
