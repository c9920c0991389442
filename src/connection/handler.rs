//! Per-connection pipeline.
//!
//! Each accepted socket gets its own task running the same loop:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  read bytes ──> parse frame ──> dispatch    │
//! │       ▲                             │       │
//! │       └────────── write reply <─────┘       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! TCP is a stream, so a single read may carry a partial request or
//! several pipelined ones. Incoming bytes accumulate in a `BytesMut`
//! buffer; every complete frame in the buffer is dispatched before the
//! next read.
//!
//! Two ways out of the loop: a clean EOF before the next frame closes
//! the socket silently, and a framing violation sends one error reply
//! (best effort) before closing. Keyspace access happens synchronously
//! inside [`CommandHandler::execute`]; the socket is never touched while
//! the store lock is held.

use crate::commands::CommandHandler;
use crate::protocol::{parse_human_line, Frame, FrameParser, ProtocolError};
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Hard cap on the read buffer (64 KB).
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial read buffer capacity.
const INITIAL_BUFFER_SIZE: usize = 4096;

/// How a connection's input bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// RESP frames, the default wire protocol.
    #[default]
    Resp,
    /// Whitespace-tokenized lines; replies remain RESP.
    Human,
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Socket read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed wire bytes.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The client closed the connection between frames.
    #[error("client disconnected")]
    ClientDisconnected,

    /// The client closed the connection mid-frame.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// The client exceeded the read buffer cap without completing a frame.
    #[error("read buffer limit exceeded")]
    BufferFull,
}

/// Drives one client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    command_handler: CommandHandler,
    parser: FrameParser,
    mode: InputMode,
}

impl ConnectionHandler {
    /// Creates a handler for an accepted stream.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        mode: InputMode,
    ) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: FrameParser::new(),
            mode,
        }
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) | Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "client disconnected")
            }
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "connection closed"),
        }

        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // drain every complete request already buffered (pipelining)
            loop {
                match self.try_parse() {
                    Ok(Some(request)) => {
                        let reply = self.command_handler.execute(request);
                        self.send_reply(&reply).await?;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // one diagnostic reply, then drop the connection
                        warn!(client = %self.addr, error = %e, "protocol violation");
                        let reply = Frame::error(format!("ERR Protocol error: {}", e));
                        let _ = self.send_reply(&reply).await;
                        return Err(e.into());
                    }
                }
            }

            self.read_more().await?;
        }
    }

    /// Attempts to take one complete request from the buffer.
    fn try_parse(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let parsed = match self.mode {
            InputMode::Resp => self.parser.parse(&self.buffer)?,
            InputMode::Human => parse_human_line(&self.buffer),
        };

        match parsed {
            Some((frame, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed,
                    remaining = self.buffer.len(),
                    "parsed request"
                );
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(client = %self.addr, size = self.buffer.len(), "read buffer limit exceeded");
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                // clean EOF before the next frame
                Err(ConnectionError::ClientDisconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        trace!(client = %self.addr, bytes = n, "read data");
        Ok(())
    }

    /// Serializes and writes one reply.
    async fn send_reply(&mut self, reply: &Frame) -> Result<(), ConnectionError> {
        let mut out = BytesMut::new();
        reply.serialize_into(&mut out);
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        trace!(client = %self.addr, bytes = out.len(), "sent reply");
        Ok(())
    }
}

/// Creates a [`ConnectionHandler`] and runs it to completion, swallowing
/// the routine disconnect outcomes.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    mode: InputMode,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, mode);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => debug!(client = %addr, error = %e, "connection ended with error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn spawn_server(mode: InputMode) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(Store::new());

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&store));
                tokio::spawn(handle_connection(stream, client_addr, handler, mode));
            }
        });

        addr
    }

    async fn read_some(client: &mut TcpStream) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        buf[..n].to_vec()
    }

    #[tokio::test]
    async fn ping_pong() {
        let addr = spawn_server(InputMode::Resp).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_some(&mut client).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn set_then_get() {
        let addr = spawn_server(InputMode::Resp).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
            .await
            .unwrap();
        assert_eq!(read_some(&mut client).await, b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .await
            .unwrap();
        assert_eq!(read_some(&mut client).await, b"$3\r\nbar\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nnope\r\n")
            .await
            .unwrap();
        assert_eq!(read_some(&mut client).await, b"$-1\r\n");
    }

    #[tokio::test]
    async fn pipelined_requests() {
        let addr = spawn_server(InputMode::Resp).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(
                b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n\
                  *3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n\
                  *2\r\n$3\r\nGET\r\n$2\r\nk1\r\n\
                  *2\r\n$3\r\nGET\r\n$2\r\nk2\r\n",
            )
            .await
            .unwrap();

        // +OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n is 26 bytes
        let mut collected = Vec::new();
        while collected.len() < 26 {
            let chunk = read_some(&mut client).await;
            assert!(!chunk.is_empty());
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"+OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n");
    }

    #[tokio::test]
    async fn split_frame_across_reads() {
        let addr = spawn_server(InputMode::Resp).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPI").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        client.write_all(b"NG\r\n").await.unwrap();

        assert_eq!(read_some(&mut client).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn protocol_error_replies_then_closes() {
        let addr = spawn_server(InputMode::Resp).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"@bogus\r\n").await.unwrap();

        let reply = read_some(&mut client).await;
        assert!(reply.starts_with(b"-ERR Protocol error:"), "got {:?}", reply);

        // the server closes after the diagnostic
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn command_error_keeps_connection_open() {
        let addr = spawn_server(InputMode::Resp).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$3\r\nFOO\r\n").await.unwrap();
        assert_eq!(
            read_some(&mut client).await,
            b"-ERR unknown command 'FOO'\r\n"
        );

        // still serving
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_some(&mut client).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn human_mode_session() {
        let addr = spawn_server(InputMode::Human).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"PING\n").await.unwrap();
        assert_eq!(read_some(&mut client).await, b"+PONG\r\n");

        client.write_all(b"SET foo bar\r\n").await.unwrap();
        assert_eq!(read_some(&mut client).await, b"+OK\r\n");

        client.write_all(b"GET foo\n").await.unwrap();
        assert_eq!(read_some(&mut client).await, b"$3\r\nbar\r\n");

        // an empty line maps to an empty command array
        client.write_all(b"\n").await.unwrap();
        assert_eq!(read_some(&mut client).await, b"*0\r\n");
    }
}
