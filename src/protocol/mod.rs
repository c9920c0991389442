//! RESP protocol implementation.
//!
//! RESP is a self-describing, length-prefixed, CRLF-framed binary format.
//! It supports five leaf kinds plus arrays that nest to arbitrary depth.
//!
//! ## Modules
//!
//! - `types`: the [`Frame`] sum type and its serializer
//! - `parser`: the incremental parser plus the human-mode line parser
//!
//! ## Example
//!
//! ```
//! use fluxkv::protocol::{parse_frame, Frame};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (frame, consumed) = parse_frame(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//! assert_eq!(frame.as_array().unwrap().len(), 2);
//!
//! let reply = Frame::bulk(Bytes::from("value"));
//! assert_eq!(reply.serialize(), b"$5\r\nvalue\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_frame, parse_human_line, FrameParser, ParseResult, ProtocolError};
pub use types::Frame;
