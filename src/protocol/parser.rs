//! Incremental RESP frame parser.
//!
//! The parser reads from a caller-owned buffer and returns either:
//! - `Ok(Some((frame, consumed)))` - one complete frame, `consumed` bytes used
//! - `Ok(None)` - the buffer holds an incomplete frame, read more first
//! - `Err(ProtocolError)` - the bytes violate the framing rules
//!
//! This shape lets the connection loop:
//! 1. Append incoming socket data to a buffer
//! 2. Call `parse()` until it reports incomplete (pipelining falls out
//!    of repeating this step)
//! 3. Advance the buffer by `consumed` bytes per parsed frame
//! 4. On error, reply with a protocol error and drop the connection
//!
//! Exactly the bytes of one top-level frame are consumed per success.
//! Framing lines are located by their `\n`; a line whose preceding byte
//! is not `\r` is a protocol error, while a buffer with no `\n` yet is
//! merely incomplete.
//!
//! The module also hosts [`parse_human_line`], the line-oriented input
//! mode where each whitespace-separated token of a newline-terminated
//! line becomes one bulk string of a command array.

use crate::protocol::types::{marker, Frame};
use bytes::Bytes;
use thiserror::Error;

/// Errors produced by malformed wire bytes.
///
/// Any of these ends the connection; the handler sends one error reply
/// with the diagnostic first when the socket still allows it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A framing line was not terminated by the exact CRLF pair.
    #[error("CRLF not found")]
    CrlfMissing,

    /// The leading marker byte is not one of the five known markers.
    #[error("expected one of '+', '-', ':', '$', '*', got {0:#04x}")]
    UnknownMarker(u8),

    /// An integer line did not parse as a signed decimal.
    #[error("invalid integer")]
    InvalidInteger,

    /// A bulk string length did not parse or was negative (other than -1).
    #[error("invalid bulk length")]
    InvalidBulkLength,

    /// An array count did not parse or was negative (other than -1).
    #[error("invalid multibulk length")]
    InvalidMultibulkLength,

    /// A declared bulk length above the hard payload cap.
    #[error("bulk string too large: {size} bytes (max: {max})")]
    BulkTooLarge { size: usize, max: usize },

    /// Arrays nested beyond [`MAX_NESTING_DEPTH`].
    #[error("maximum nesting depth exceeded: {0}")]
    DepthExceeded(usize),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ProtocolError>;

/// Maximum size for a single bulk string payload (512 MB, as Redis).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth; deeper inputs are protocol errors.
pub const MAX_NESTING_DEPTH: usize = 128;

/// An incremental RESP parser.
///
/// # Example
///
/// ```
/// use fluxkv::protocol::FrameParser;
///
/// let mut parser = FrameParser::new();
/// let buf = b"*1\r\n$4\r\nPING\r\n";
/// let (frame, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(consumed, buf.len());
/// assert!(frame.as_array().is_some());
/// ```
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Current array nesting depth.
    depth: usize,
}

impl FrameParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one frame from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        self.depth = 0;
        self.parse_frame(buf)
    }

    fn parse_frame(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ProtocolError::DepthExceeded(MAX_NESTING_DEPTH));
        }

        match buf[0] {
            marker::SIMPLE_STRING => self.parse_simple(buf),
            marker::ERROR => self.parse_error(buf),
            marker::INTEGER => self.parse_integer(buf),
            marker::BULK_STRING => self.parse_bulk(buf),
            marker::ARRAY => self.parse_array(buf),
            other => Err(ProtocolError::UnknownMarker(other)),
        }
    }

    /// Parses a simple string: `+<text>\r\n`
    fn parse_simple(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        match find_line(&buf[1..])? {
            Some((line, used)) => {
                let s = String::from_utf8_lossy(line).into_owned();
                Ok(Some((Frame::Simple(s), 1 + used)))
            }
            None => Ok(None),
        }
    }

    /// Parses an error: `-<text>\r\n`
    fn parse_error(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        match find_line(&buf[1..])? {
            Some((line, used)) => {
                let s = String::from_utf8_lossy(line).into_owned();
                Ok(Some((Frame::Error(s), 1 + used)))
            }
            None => Ok(None),
        }
    }

    /// Parses an integer: `:<signed-decimal>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        match find_line(&buf[1..])? {
            Some((line, used)) => {
                let n = parse_decimal(line).ok_or(ProtocolError::InvalidInteger)?;
                Ok(Some((Frame::Integer(n), 1 + used)))
            }
            None => Ok(None),
        }
    }

    /// Parses a bulk string: `$<len>\r\n<data>\r\n`, or `$-1\r\n`.
    fn parse_bulk(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let (line, used) = match find_line(&buf[1..])? {
            Some(found) => found,
            None => return Ok(None),
        };

        let length = parse_decimal(line).ok_or(ProtocolError::InvalidBulkLength)?;

        if length == -1 {
            return Ok(Some((Frame::NullBulk, 1 + used)));
        }
        if length < 0 {
            return Err(ProtocolError::InvalidBulkLength);
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ProtocolError::BulkTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let data_start = 1 + used;
        let total = data_start + length + 2;
        if buf.len() < total {
            return Ok(None);
        }

        // The payload is followed by exactly CR LF.
        if &buf[data_start + length..total] != b"\r\n" {
            return Err(ProtocolError::CrlfMissing);
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
        Ok(Some((Frame::Bulk(data), total)))
    }

    /// Parses an array: `*<count>\r\n<frames...>`, or `*-1\r\n`.
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let (line, used) = match find_line(&buf[1..])? {
            Some(found) => found,
            None => return Ok(None),
        };

        let count = parse_decimal(line).ok_or(ProtocolError::InvalidMultibulkLength)?;

        if count == -1 {
            return Ok(Some((Frame::NullArray, 1 + used)));
        }
        if count < 0 {
            return Err(ProtocolError::InvalidMultibulkLength);
        }

        let count = count as usize;
        let mut frames = Vec::with_capacity(count.min(64));
        let mut consumed = 1 + used;

        self.depth += 1;

        for _ in 0..count {
            match self.parse_frame(&buf[consumed..])? {
                Some((frame, frame_consumed)) => {
                    frames.push(frame);
                    consumed += frame_consumed;
                }
                None => return Ok(None),
            }
        }

        self.depth -= 1;

        Ok(Some((Frame::Array(frames), consumed)))
    }
}

/// Locates the next framing line.
///
/// Returns the line content (without the terminator) and the byte count
/// including the terminator. A `\n` without a `\r` immediately before it
/// is a protocol error; no `\n` at all means the line is incomplete.
fn find_line(buf: &[u8]) -> ParseResult<Option<(&[u8], usize)>> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => {
            if pos == 0 || buf[pos - 1] != b'\r' {
                return Err(ProtocolError::CrlfMissing);
            }
            Ok(Some((&buf[..pos - 1], pos + 1)))
        }
        None => Ok(None),
    }
}

/// Parses a signed decimal from raw line bytes.
fn parse_decimal(line: &[u8]) -> Option<i64> {
    std::str::from_utf8(line).ok()?.parse().ok()
}

/// Parses one complete frame from `buf` with a fresh parser.
pub fn parse_frame(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    FrameParser::new().parse(buf)
}

/// Parses one line of human input into a command array.
///
/// Reads up to the first `\n`, trims a trailing `\r`, and splits the line
/// on runs of whitespace; each token becomes a bulk string. An empty line
/// yields an empty array. Returns `None` until a full line is buffered.
pub fn parse_human_line(buf: &[u8]) -> Option<(Frame, usize)> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let consumed = pos + 1;

    let mut line = &buf[..pos];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }

    let tokens: Vec<Frame> = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| Frame::Bulk(Bytes::copy_from_slice(token)))
        .collect();

    Some((Frame::Array(tokens), consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_string() {
        let (frame, consumed) = parse_frame(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Simple("OK".to_string()));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn parse_empty_simple_string() {
        let (frame, _) = parse_frame(b"+\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Simple(String::new()));
    }

    #[test]
    fn parse_simple_string_incomplete() {
        assert!(parse_frame(b"+OK").unwrap().is_none());
        assert!(parse_frame(b"+OK\r").unwrap().is_none());
    }

    #[test]
    fn parse_error_frame() {
        let (frame, consumed) = parse_frame(b"-ERR unknown command\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Error("ERR unknown command".to_string()));
        assert_eq!(consumed, 22);
    }

    #[test]
    fn parse_integer() {
        let (frame, consumed) = parse_frame(b":1000\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Integer(1000));
        assert_eq!(consumed, 7);

        let (frame, _) = parse_frame(b":-42\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Integer(-42));
    }

    #[test]
    fn parse_invalid_integer() {
        assert_eq!(
            parse_frame(b":not_a_number\r\n"),
            Err(ProtocolError::InvalidInteger)
        );
    }

    #[test]
    fn parse_bulk_string() {
        let (frame, consumed) = parse_frame(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Bulk(Bytes::from("hello")));
        assert_eq!(consumed, 11);
    }

    #[test]
    fn parse_empty_bulk_string() {
        let (frame, consumed) = parse_frame(b"$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Bulk(Bytes::new()));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn parse_null_bulk_string() {
        let (frame, consumed) = parse_frame(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::NullBulk);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn parse_null_array() {
        let (frame, consumed) = parse_frame(b"*-1\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::NullArray);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn nulls_round_trip_distinctly() {
        for original in [Frame::NullBulk, Frame::NullArray] {
            let bytes = original.serialize();
            let (parsed, _) = parse_frame(&bytes).unwrap().unwrap();
            assert_eq!(parsed, original);
        }
    }

    #[test]
    fn parse_bulk_string_incomplete() {
        assert!(parse_frame(b"$5\r\nhel").unwrap().is_none());
        assert!(parse_frame(b"$5\r\nhello\r").unwrap().is_none());
    }

    #[test]
    fn parse_bulk_string_bad_trailer() {
        assert_eq!(
            parse_frame(b"$5\r\nhelloxx"),
            Err(ProtocolError::CrlfMissing)
        );
    }

    #[test]
    fn parse_bulk_string_invalid_length() {
        assert_eq!(
            parse_frame(b"$abc\r\n"),
            Err(ProtocolError::InvalidBulkLength)
        );
        assert_eq!(
            parse_frame(b"$-2\r\n"),
            Err(ProtocolError::InvalidBulkLength)
        );
    }

    #[test]
    fn parse_bulk_string_over_cap() {
        let input = format!("${}\r\n", MAX_BULK_SIZE + 1);
        assert!(matches!(
            parse_frame(input.as_bytes()),
            Err(ProtocolError::BulkTooLarge { .. })
        ));
    }

    #[test]
    fn parse_array() {
        let (frame, consumed) = parse_frame(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("GET")),
                Frame::Bulk(Bytes::from("name")),
            ])
        );
        assert_eq!(consumed, 23);
    }

    #[test]
    fn parse_empty_array() {
        let (frame, _) = parse_frame(b"*0\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Array(vec![]));
    }

    #[test]
    fn parse_array_invalid_count() {
        assert_eq!(
            parse_frame(b"*x\r\n"),
            Err(ProtocolError::InvalidMultibulkLength)
        );
        assert_eq!(
            parse_frame(b"*-3\r\n"),
            Err(ProtocolError::InvalidMultibulkLength)
        );
    }

    #[test]
    fn parse_array_incomplete() {
        assert!(parse_frame(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
    }

    #[test]
    fn parse_nested_array() {
        let input = b"*2\r\n*2\r\n:1\r\n:2\r\n*2\r\n:3\r\n:4\r\n";
        let (frame, consumed) = parse_frame(input).unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Array(vec![Frame::Integer(1), Frame::Integer(2)]),
                Frame::Array(vec![Frame::Integer(3), Frame::Integer(4)]),
            ])
        );
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn parse_mixed_array() {
        let (frame, _) = parse_frame(b"*3\r\n+OK\r\n:100\r\n$5\r\nhello\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Simple("OK".to_string()),
                Frame::Integer(100),
                Frame::Bulk(Bytes::from("hello")),
            ])
        );
    }

    #[test]
    fn unknown_marker_is_rejected() {
        assert_eq!(
            parse_frame(b"@invalid\r\n"),
            Err(ProtocolError::UnknownMarker(b'@'))
        );
    }

    #[test]
    fn crlf_strictness_bare_lf() {
        assert_eq!(parse_frame(b"+OK\n"), Err(ProtocolError::CrlfMissing));
        assert_eq!(parse_frame(b":12\n"), Err(ProtocolError::CrlfMissing));
        assert_eq!(parse_frame(b"*1\n"), Err(ProtocolError::CrlfMissing));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut input = Vec::new();
        for _ in 0..(MAX_NESTING_DEPTH + 2) {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");
        assert!(matches!(
            parse_frame(&input),
            Err(ProtocolError::DepthExceeded(_))
        ));
    }

    #[test]
    fn round_trip_nested() {
        let original = Frame::Array(vec![
            Frame::Simple("status".to_string()),
            Frame::Error("oops".to_string()),
            Frame::Integer(-7),
            Frame::Bulk(Bytes::from("payload")),
            Frame::Bulk(Bytes::new()),
            Frame::NullBulk,
            Frame::NullArray,
            Frame::Array(vec![Frame::Integer(1), Frame::Array(vec![])]),
        ]);

        let bytes = original.serialize();
        let (parsed, consumed) = parse_frame(&bytes).unwrap().unwrap();
        assert_eq!(parsed, original);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn binary_safe_bulk_string() {
        let (frame, _) = parse_frame(b"$5\r\nhel\x00o\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Bulk(Bytes::from(&b"hel\x00o"[..])));
    }

    #[test]
    fn pipelined_frames_consume_one_at_a_time() {
        let input = b"+OK\r\n:1\r\n";
        let (frame, consumed) = parse_frame(input).unwrap().unwrap();
        assert_eq!(frame, Frame::Simple("OK".to_string()));
        assert_eq!(consumed, 5);

        let (frame, consumed) = parse_frame(&input[consumed..]).unwrap().unwrap();
        assert_eq!(frame, Frame::Integer(1));
        assert_eq!(consumed, 4);
    }

    #[test]
    fn human_line_basic() {
        let (frame, consumed) = parse_human_line(b"SET foo bar\n").unwrap();
        assert_eq!(consumed, 12);
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("SET")),
                Frame::Bulk(Bytes::from("foo")),
                Frame::Bulk(Bytes::from("bar")),
            ])
        );
    }

    #[test]
    fn human_line_trims_cr_and_collapses_whitespace() {
        let (frame, _) = parse_human_line(b"  GET\t\tfoo  \r\n").unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("GET")),
                Frame::Bulk(Bytes::from("foo")),
            ])
        );
    }

    #[test]
    fn human_empty_line_is_empty_array() {
        let (frame, consumed) = parse_human_line(b"\r\n").unwrap();
        assert_eq!(frame, Frame::Array(vec![]));
        assert_eq!(consumed, 2);

        let (frame, consumed) = parse_human_line(b"\n").unwrap();
        assert_eq!(frame, Frame::Array(vec![]));
        assert_eq!(consumed, 1);
    }

    #[test]
    fn human_incomplete_line_waits() {
        assert!(parse_human_line(b"SET foo ba").is_none());
    }
}
