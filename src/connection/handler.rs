//! Connection Handler
//!
//! This module runs the request/response loop for one client connection.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, handler task spawned
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │      AwaitingRequest         │
//!    │                              │
//!    │  read bytes ─> parse frame   │
//!    │          │                   │
//!    │          ▼                   │
//!    │  dispatch ─> encode ─> flush │
//!    │          │                   │
//!    │     [Loop back]              │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. Closed: clean EOF, malformed frame, or I/O failure
//! ```
//!
//! ## Error Boundary
//!
//! A malformed frame closes the connection without writing anything: after a
//! parse failure the stream position cannot be trusted. A command failure is
//! encoded as an error value and sent back, and the loop keeps going.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, ParseLimits, RespParser, Value};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Default ceiling on bytes buffered for a single request (64 MiB)
pub const MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests answered, including error replies
    pub commands_processed: AtomicU64,
    /// Requests answered with an error value
    pub command_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_failed(&self) {
        self.command_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Generic over the stream so the loop can run on a `TcpStream` in the
/// server and on an in-memory mock in tests.
pub struct ConnectionHandler<S> {
    /// The client stream, writes buffered until each response is complete
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes received but not yet parsed
    buffer: BytesMut,

    /// Largest request allowed to sit in `buffer`
    max_request_bytes: usize,

    /// Dispatcher over the shared store
    command_handler: CommandHandler,

    parser: RespParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler with default limits.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            max_request_bytes: MAX_REQUEST_BYTES,
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Replaces the decode limits and the per-request buffer ceiling.
    pub fn with_limits(mut self, limits: ParseLimits, max_request_bytes: usize) -> Self {
        self.parser = RespParser::with_limits(limits);
        self.max_request_bytes = max_request_bytes;
        self
    }

    /// Runs the connection loop until the client leaves or an error occurs.
    ///
    /// A clean disconnect between requests returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        self.stats.connection_opened();
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e @ ConnectionError::UnexpectedEof(_)) => {
                debug!(client = %self.addr, error = %e, "Client left mid-request")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Closing connection"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // One request at a time: the next frame is not parsed until
            // this response has been flushed.
            while let Some(request) = self.try_parse_request()? {
                let response = self.dispatch(request);
                self.send_response(&response).await?;
            }

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Executes one request, converting command failures into error values.
    fn dispatch(&self, request: Value) -> Value {
        self.stats.command_processed();

        match self.command_handler.execute(request) {
            Ok(value) => value,
            Err(e) => {
                debug!(client = %self.addr, error = %e, "Command failed");
                self.stats.command_failed();
                Value::from(e)
            }
        }
    }

    /// Attempts to parse a request from the buffer.
    fn try_parse_request(&mut self) -> Result<Option<Value>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer)? {
            Some((value, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed request"
                );
                Ok(Some(value))
            }
            None => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete request, need more data"
                );
                Ok(None)
            }
        }
    }

    /// Reads more data from the stream into the buffer.
    ///
    /// Returns `false` when the peer closed the stream between requests.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= self.max_request_bytes {
            return Err(ConnectionError::BufferFull(self.buffer.len()));
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Ok(false)
            } else {
                Err(ConnectionError::UnexpectedEof(self.buffer.len()))
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Encodes the whole response, then writes and flushes it.
    async fn send_response(&mut self, response: &Value) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed frame
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Stream closed in the middle of a frame
    #[error("Unexpected end of stream with {0} bytes buffered")]
    UnexpectedEof(usize),

    /// Request grew past the buffer ceiling
    #[error("Request exceeds buffer limit ({0} bytes buffered)")]
    BufferFull(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn create_handler<S>(stream: S) -> (ConnectionHandler<S>, Arc<ConnectionStats>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let stats = Arc::new(ConnectionStats::new());
        let commands = CommandHandler::new(Arc::new(Store::new()));
        let handler = ConnectionHandler::new(stream, test_addr(), commands, Arc::clone(&stats));
        (handler, stats)
    }

    #[tokio::test]
    async fn test_set_get() {
        let stream = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$5\r\nalice\r\n")
            .write(b":1\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .write(b"$5\r\nalice\r\n")
            .build();

        let (handler, stats) = create_handler(stream);
        handler.run().await.unwrap();

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_text_form_request() {
        let stream = Builder::new()
            .read(b"+SET k v\r\n")
            .write(b":1\r\n")
            .read(b"+get k\r\n")
            .write(b"$1\r\nv\r\n")
            .build();

        let (handler, _) = create_handler(stream);
        handler.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection_open() {
        let stream = Builder::new()
            .read(b"*1\r\n$3\r\nFOO\r\n")
            .write(b"-unrecognized command: FOO\r\n")
            .read(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n")
            .write(b":1\r\n")
            .build();

        let (handler, stats) = create_handler(stream);
        handler.run().await.unwrap();

        assert_eq!(stats.command_errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_malformed_integer_closes_without_response() {
        // The mock panics on any write it was not told to expect
        let stream = Builder::new().read(b":abc\r\n").build();

        let (handler, stats) = create_handler(stream);
        let result = handler.run().await;

        assert!(matches!(
            result,
            Err(ConnectionError::ParseError(ParseError::InvalidInteger(_)))
        ));
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_bad_tag_after_valid_request() {
        let stream = Builder::new()
            .read(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .write(b"$-1\r\n")
            .read(b"!oops\r\n")
            .build();

        let (handler, _) = create_handler(stream);
        let result = handler.run().await;

        assert!(matches!(
            result,
            Err(ConnectionError::ParseError(ParseError::UnknownPrefix(b'!')))
        ));
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let stream = Builder::new()
            .read(b"*3\r\n$3\r\nSE")
            .read(b"T\r\n$1\r\nk\r\n$1")
            .read(b"\r\nv\r\n")
            .write(b":1\r\n")
            .build();

        let (handler, _) = create_handler(stream);
        handler.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_pipelined_requests_answered_in_order() {
        let stream = Builder::new()
            .read(b"+SET a 1\r\n+SET b 2\r\n+MGET a missing b\r\n+DELETE a\r\n")
            .write(b":1\r\n")
            .write(b":1\r\n")
            .write(b"*3\r\n$1\r\n1\r\n$-1\r\n$1\r\n2\r\n")
            .write(b":1\r\n")
            .build();

        let (handler, stats) = create_handler(stream);
        handler.run().await.unwrap();

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_large_request_in_small_reads() {
        let mut request = Vec::new();
        request.extend_from_slice(b"*4001\r\n$4\r\nMSET\r\n");
        for i in 0..2000 {
            Value::str(format!("k{}", i)).serialize_into(&mut request);
            Value::Int(i).serialize_into(&mut request);
        }

        let mut builder = Builder::new();
        for chunk in request.chunks(61) {
            builder.read(chunk);
        }
        builder.write(b":2000\r\n");
        builder.read(b"+GET k1999\r\n");
        builder.write(b":1999\r\n");

        let (handler, stats) = create_handler(builder.build());
        handler.run().await.unwrap();

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_unused_handler_leaves_counters_alone() {
        let stream = Builder::new().build();
        let (handler, stats) = create_handler(stream);
        drop(handler);

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 0);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_an_error() {
        let stream = Builder::new().read(b"*2\r\n$3\r\nGET\r\n").build();

        let (handler, _) = create_handler(stream);
        let result = handler.run().await;

        assert!(matches!(result, Err(ConnectionError::UnexpectedEof(_))));
    }

    #[tokio::test]
    async fn test_depth_limit_closes_connection() {
        let stream = Builder::new().read(b"*1\r\n*1\r\n*1\r\n:1\r\n").build();

        let (handler, _) = create_handler(stream);
        let limits = ParseLimits {
            max_depth: 2,
            ..ParseLimits::default()
        };
        let result = handler.with_limits(limits, MAX_REQUEST_BYTES).run().await;

        assert!(matches!(
            result,
            Err(ConnectionError::ParseError(ParseError::TooDeep(2)))
        ));
    }

    #[tokio::test]
    async fn test_buffer_limit_closes_connection() {
        let stream = Builder::new().read(b"$100\r\n0123456789").build();

        let (handler, _) = create_handler(stream);
        let result = handler
            .with_limits(ParseLimits::default(), 8)
            .run()
            .await;

        assert!(matches!(result, Err(ConnectionError::BufferFull(_))));
    }
}
