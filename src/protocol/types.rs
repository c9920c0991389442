//! RESP (Redis Serialization Protocol) frame types.
//!
//! Every frame starts with a marker byte that identifies its shape:
//!
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array
//!
//! Framing lines are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Null Bulk String: `$-1\r\n`
//! Null Array: `*-1\r\n`
//!
//! The two null forms are distinct frames. A null bulk string and a null
//! array serialize differently and must parse back to different variants,
//! so they are separate enum variants rather than a shared `Null`.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used by all RESP framing lines.
pub const CRLF: &[u8] = b"\r\n";

/// RESP marker bytes.
pub mod marker {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// One RESP frame, used for both parsed requests and serialized replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Non-binary-safe text; must not contain CR or LF.
    /// Format: `+<text>\r\n`
    Simple(String),

    /// Same constraint as [`Frame::Simple`], but semantically an error.
    /// Format: `-<text>\r\n`
    Error(String),

    /// 64-bit signed integer.
    /// Format: `:<n>\r\n`
    Integer(i64),

    /// Binary-safe, length-prefixed payload; may be empty.
    /// Format: `$<len>\r\n<data>\r\n`
    Bulk(Bytes),

    /// The distinguished absent bulk string: `$-1\r\n`.
    NullBulk,

    /// The distinguished absent array: `*-1\r\n`.
    NullArray,

    /// Ordered sequence of frames; may be empty, may nest.
    /// Format: `*<count>\r\n<frame1><frame2>...`
    Array(Vec<Frame>),
}

impl Frame {
    /// Creates a simple string frame.
    pub fn simple(s: impl Into<String>) -> Self {
        Frame::Simple(s.into())
    }

    /// Creates an error frame.
    pub fn error(s: impl Into<String>) -> Self {
        Frame::Error(s.into())
    }

    /// Creates an integer frame.
    pub fn integer(n: i64) -> Self {
        Frame::Integer(n)
    }

    /// Creates a bulk string frame.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    /// Creates an array frame.
    pub fn array(frames: Vec<Frame>) -> Self {
        Frame::Array(frames)
    }

    /// The `+OK\r\n` reply.
    pub fn ok() -> Self {
        Frame::Simple("OK".to_string())
    }

    /// The `+PONG\r\n` reply.
    pub fn pong() -> Self {
        Frame::Simple("PONG".to_string())
    }

    /// Serializes the frame into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.serialize_into(&mut buf);
        buf.to_vec()
    }

    /// Serializes the frame into an existing buffer.
    ///
    /// Replies for pipelined commands are batched into one buffer before
    /// a single socket write, so this is the hot path.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                buf.put_u8(marker::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Error(s) => {
                buf.put_u8(marker::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Integer(n) => {
                buf.put_u8(marker::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Bulk(data) => {
                buf.put_u8(marker::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Frame::NullBulk => {
                buf.extend_from_slice(b"$-1");
                buf.extend_from_slice(CRLF);
            }
            Frame::NullArray => {
                buf.extend_from_slice(b"*-1");
                buf.extend_from_slice(CRLF);
            }
            Frame::Array(frames) => {
                buf.put_u8(marker::ARRAY);
                buf.extend_from_slice(frames.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for frame in frames {
                    frame.serialize_into(buf);
                }
            }
        }
    }

    /// Returns true if this frame is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// The inner bytes of a bulk string.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Frame::Bulk(b) => Some(b),
            _ => None,
        }
    }

    /// The inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Frame::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The inner array elements.
    pub fn as_array(&self) -> Option<&[Frame]> {
        match self {
            Frame::Array(frames) => Some(frames),
            _ => None,
        }
    }

    /// Consumes self and returns the elements if this is an array.
    pub fn into_array(self) -> Option<Vec<Frame>> {
        match self {
            Frame::Array(frames) => Some(frames),
            _ => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "\"{}\"", s),
            Frame::Error(s) => write!(f, "(error) {}", s),
            Frame::Integer(n) => write!(f, "(integer) {}", n),
            Frame::Bulk(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            Frame::NullBulk | Frame::NullArray => write!(f, "(nil)"),
            Frame::Array(frames) => {
                if frames.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    writeln!(f)?;
                    for (i, frame) in frames.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, frame)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
