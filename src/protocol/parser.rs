//! Incremental Frame Decoder
//!
//! This module decodes [`Value`]s out of a byte buffer that is filled by
//! successive socket reads.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((value, consumed)))` - Successfully parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the frame is incomplete
//! - `Err(ParseError)` - Invalid protocol data
//!
//! The caller appends network data to a buffer, calls [`RespParser::parse`],
//! and on success advances the buffer by `consumed` bytes. On error the stream
//! position can no longer be trusted and the caller must drop the connection.
//!
//! ## Resuming
//!
//! Between `Ok(None)` results the parser remembers how far it got: a cheap scan
//! walks the frame header by header, keeping its byte offset and a stack of
//! open aggregate counters. The next call resumes from there, so a request
//! arriving in many small reads is scanned once overall. `Value`s are only
//! built once the scan reports a complete frame. After `Ok(None)` the next call
//! must pass the same bytes, possibly extended.
//!
//! ## Limits
//!
//! Frame counts and lengths come straight from the peer. Every parse is
//! bounded by [`ParseLimits`]: nesting depth, the total number of aggregate
//! elements in one request, and the length of a single bulk string. Header
//! lines of `:`, `$`, `*` and `%` frames longer than [`MAX_HEADER_LEN`] are
//! rejected without waiting for their CRLF.

use crate::protocol::types::{prefix, Value, CRLF};
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Tag byte does not name a known frame type
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Integer line, length or count is not a base-10 integer
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a line or bulk payload
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array or map count is negative (but not -1 for a null array)
    #[error("invalid aggregate length: {0}")]
    InvalidAggregateLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Nesting deeper than the configured limit
    #[error("maximum nesting depth exceeded: {0}")]
    TooDeep(usize),

    /// A bulk string or aggregate exceeds the configured limit
    #[error("frame too large: {size} (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Default maximum length of a single bulk string (16 MiB)
pub const MAX_BULK_SIZE: usize = 16 * 1024 * 1024;

/// Default maximum nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// Default maximum number of aggregate elements in one request
pub const MAX_ELEMENTS: usize = 1024 * 1024;

/// Longest header line accepted for `:`, `$`, `*` and `%` frames
pub const MAX_HEADER_LEN: usize = 64;

/// Upper bound on capacity reserved up front for an aggregate.
const PREALLOC_LIMIT: usize = 1024;

/// Ceilings applied while decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Deepest allowed aggregate nesting. A top-level scalar has depth 0.
    pub max_depth: usize,
    /// Total aggregate elements (array items plus map keys and values) per request.
    pub max_elements: usize,
    /// Longest allowed bulk string payload, in bytes.
    pub max_bulk_len: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
            max_elements: MAX_ELEMENTS,
            max_bulk_len: MAX_BULK_SIZE,
        }
    }
}

/// A bounded, incremental frame parser.
///
/// # Example
///
/// ```
/// use wirekv::protocol::{RespParser, Value};
///
/// let mut parser = RespParser::new();
/// let buffer = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
///
/// let (value, consumed) = parser.parse(buffer).unwrap().unwrap();
/// assert_eq!(consumed, buffer.len());
/// assert_eq!(value, Value::Array(vec![Value::str("GET"), Value::str("name")]));
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    limits: ParseLimits,
    /// Current nesting depth
    depth: usize,
    /// Aggregate elements announced so far in the current request
    elements: usize,
    /// Progress of the completeness scan across calls
    scan: ScanState,
}

/// Where the completeness scan stopped.
#[derive(Debug, Default)]
struct ScanState {
    /// Offset of the first frame not yet fully scanned
    pos: usize,
    /// Offset where the CRLF search for the frame at `pos` resumes
    line_from: usize,
    /// Elements still expected by each open aggregate, innermost last
    open: Vec<usize>,
    /// Aggregate elements announced so far
    elements: usize,
}

impl RespParser {
    /// Creates a parser with the default limits.
    pub fn new() -> Self {
        Self::with_limits(ParseLimits::default())
    }

    /// Creates a parser with explicit limits.
    pub fn with_limits(limits: ParseLimits) -> Self {
        Self {
            limits,
            depth: 0,
            elements: 0,
            scan: ScanState::default(),
        }
    }

    /// Attempts to parse one complete value from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        // A shorter buffer cannot be a continuation of the previous one
        if buf.len() < self.scan.pos {
            self.scan = ScanState::default();
        }

        let end = match self.scan_frame(buf) {
            Ok(Some(end)) => end,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.scan = ScanState::default();
                return Err(e);
            }
        };
        self.scan = ScanState::default();

        self.depth = 0;
        self.elements = 0;
        self.parse_value(&buf[..end])
    }

    /// Advances the completeness scan as far as `buf` allows.
    ///
    /// Returns the length of the first frame once all of it is present.
    /// Limits, integer lines and bulk trailers are checked here; UTF-8 is
    /// left to materialization.
    fn scan_frame(&mut self, buf: &[u8]) -> ParseResult<Option<usize>> {
        loop {
            let pos = self.scan.pos;
            if pos >= buf.len() {
                return Ok(None);
            }

            let tag = buf[pos];
            let max_line = match tag {
                prefix::SIMPLE_STRING | prefix::ERROR => None,
                prefix::INTEGER | prefix::BULK_STRING | prefix::ARRAY | prefix::MAP => {
                    Some(MAX_HEADER_LEN)
                }
                other => return Err(ParseError::UnknownPrefix(other)),
            };

            let cr = match self.scan_line(buf, max_line)? {
                Some(cr) => cr,
                None => return Ok(None),
            };
            let next = cr + 2;

            let end = match tag {
                prefix::SIMPLE_STRING | prefix::ERROR => next,
                prefix::INTEGER => {
                    parse_int(&buf[pos + 1..cr])?;
                    next
                }
                prefix::BULK_STRING => {
                    let length = parse_int(&buf[pos + 1..cr])?;
                    if length == -1 {
                        next
                    } else {
                        let length = self.check_bulk_len(length)?;
                        let total = next + length + 2;
                        if buf.len() < total {
                            return Ok(None);
                        }
                        if &buf[total - 2..total] != CRLF {
                            return Err(ParseError::ProtocolError(
                                "bulk string missing trailing CRLF".to_string(),
                            ));
                        }
                        total
                    }
                }
                _ => {
                    let announced = parse_int(&buf[pos + 1..cr])?;
                    let count = if tag == prefix::ARRAY {
                        if announced == -1 {
                            None
                        } else {
                            Some(reserve(&mut self.scan.elements, announced, &self.limits)?)
                        }
                    } else {
                        Some(reserve(
                            &mut self.scan.elements,
                            pair_count(announced)?,
                            &self.limits,
                        )?)
                    };

                    match count {
                        Some(count) if count > 0 => {
                            if self.scan.open.len() >= self.limits.max_depth {
                                return Err(ParseError::TooDeep(self.limits.max_depth));
                            }
                            self.scan.open.push(count);
                            self.scan.pos = next;
                            self.scan.line_from = 0;
                            continue;
                        }
                        _ => next,
                    }
                }
            };

            self.scan.pos = end;
            self.scan.line_from = 0;

            // Close every aggregate this element completes
            loop {
                match self.scan.open.last_mut() {
                    None => return Ok(Some(end)),
                    Some(remaining) => {
                        *remaining -= 1;
                        if *remaining > 0 {
                            break;
                        }
                        self.scan.open.pop();
                    }
                }
            }
        }
    }

    /// Finds the CRLF ending the line of the frame at `scan.pos`, resuming
    /// where the previous search gave up.
    fn scan_line(&mut self, buf: &[u8], max_line: Option<usize>) -> ParseResult<Option<usize>> {
        let start = self.scan.pos + 1;
        let from = self.scan.line_from.max(start);

        match find_crlf(&buf[from.min(buf.len())..]) {
            Some(offset) => {
                let cr = from + offset;
                if max_line.is_some_and(|max| cr - start > max) {
                    return Err(header_too_long());
                }
                Ok(Some(cr))
            }
            None => {
                // A trailing CR may still be completed by the next read
                if max_line.is_some_and(|max| buf.len().saturating_sub(start) > max + 1) {
                    return Err(header_too_long());
                }
                self.scan.line_from = buf.len().saturating_sub(1).max(start);
                Ok(None)
            }
        }
    }

    fn check_bulk_len(&self, length: i64) -> ParseResult<usize> {
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }
        let length = usize::try_from(length).unwrap_or(usize::MAX);
        if length > self.limits.max_bulk_len {
            return Err(ParseError::TooLarge {
                size: length,
                max: self.limits.max_bulk_len,
            });
        }
        Ok(length)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        match buf[0] {
            prefix::SIMPLE_STRING => {
                Ok(read_line(buf)?.map(|(s, consumed)| (Value::Str(s.to_string()), consumed)))
            }
            prefix::ERROR => {
                Ok(read_line(buf)?.map(|(s, consumed)| (Value::Error(s.to_string()), consumed)))
            }
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            prefix::MAP => self.parse_map(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        match read_number(buf)? {
            Some((n, consumed)) => Ok(Some((Value::Int(n), consumed))),
            None => Ok(None),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        let (length, data_start) = match read_number(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((Value::Null, data_start)));
        }
        let length = self.check_bulk_len(length)?;

        let total_needed = data_start + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_start + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let s = std::str::from_utf8(&buf[data_start..data_start + length])
            .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

        Ok(Some((Value::Str(s.to_string()), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        let (count, header_len) = match read_number(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((Value::Null, header_len)));
        }

        let count = self.reserve_elements(count)?;
        match self.parse_sequence(buf, header_len, count)? {
            Some((elements, consumed)) => Ok(Some((Value::Array(elements), consumed))),
            None => Ok(None),
        }
    }

    /// Parses a map: `%<pairs>\r\n<key1><value1>...`
    fn parse_map(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        let (pairs, header_len) = match read_number(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let count = self.reserve_elements(pair_count(pairs)?)?;
        let (elements, consumed) = match self.parse_sequence(buf, header_len, count)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        // Element 2i is key i, element 2i+1 is value i
        let mut entries = Vec::with_capacity(elements.len() / 2);
        let mut iter = elements.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            entries.push((key, value));
        }

        Ok(Some((Value::Map(entries), consumed)))
    }

    /// Validates an announced aggregate length against the element budget.
    fn reserve_elements(&mut self, count: i64) -> ParseResult<usize> {
        reserve(&mut self.elements, count, &self.limits)
    }

    /// Decodes `count` consecutive values one nesting level down.
    fn parse_sequence(
        &mut self,
        buf: &[u8],
        mut consumed: usize,
        count: usize,
    ) -> ParseResult<Option<(Vec<Value>, usize)>> {
        if count > 0 && self.depth >= self.limits.max_depth {
            return Err(ParseError::TooDeep(self.limits.max_depth));
        }

        let mut elements = Vec::with_capacity(count.min(PREALLOC_LIMIT));

        self.depth += 1;
        let result = loop {
            if elements.len() == count {
                break Ok(Some(()));
            }
            match self.parse_value(&buf[consumed..]) {
                Ok(Some((value, element_consumed))) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                Ok(None) => break Ok(None),
                Err(e) => break Err(e),
            }
        };
        self.depth -= 1;

        Ok(result?.map(|()| (elements, consumed)))
    }
}

/// Charges `count` aggregate elements against the per-request budget.
fn reserve(elements: &mut usize, count: i64, limits: &ParseLimits) -> ParseResult<usize> {
    if count < 0 {
        return Err(ParseError::InvalidAggregateLength(count));
    }

    let count = usize::try_from(count).unwrap_or(usize::MAX);
    let total = elements.saturating_add(count);
    if total > limits.max_elements {
        return Err(ParseError::TooLarge {
            size: total,
            max: limits.max_elements,
        });
    }

    *elements = total;
    Ok(count)
}

/// Element count of a map announcing `pairs` pairs.
fn pair_count(pairs: i64) -> ParseResult<i64> {
    if pairs < 0 {
        return Err(ParseError::InvalidAggregateLength(pairs));
    }
    Ok(pairs.saturating_mul(2))
}

fn header_too_long() -> ParseError {
    ParseError::ProtocolError(format!("header line longer than {MAX_HEADER_LEN} bytes"))
}

/// Parses a header line as a base-10 signed integer.
fn parse_int(line: &[u8]) -> ParseResult<i64> {
    let s = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    s.parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(format!("{s:?}: {e}")))
}

/// Reads the line following the tag byte.
///
/// Returns the line content and the number of bytes consumed including the
/// tag and the CRLF.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let s = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((s, 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

/// Reads the line following the tag byte as a base-10 signed integer.
fn read_number(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    match read_line(buf)? {
        Some((s, consumed)) => Ok(Some((parse_int(s.as_bytes())?, consumed))),
        None => Ok(None),
    }
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single value from bytes with the default limits.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
    RespParser::new().parse(buf)
}
