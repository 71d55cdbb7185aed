//! # Peer Transport Client
//!
//! Purpose: issue a request to exactly one peer node and wait for its
//! reply, over the binary wire frame defined in `hkv_common::wire`.
//!
//! ## Design Principles
//! 1. **One Client Per Peer**: a `PeerClient` owns a single long-lived
//!    connection; it is not pooled across multiple peer addresses.
//! 2. **Fail Fast**: a transport error invalidates the connection so the
//!    next call reconnects rather than reusing a half-broken stream.
//! 3. **Serialized Requests**: one in-flight request per connection at a
//!    time; the async mutex around the stream enforces this without extra
//!    bookkeeping.

use std::fmt;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use hkv_common::wire::{self, Reply, Request, MAX_FRAME_LEN};
use hkv_common::HkvError;

/// Result type for the peer transport client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Transport-level errors. Distinct from `HkvError`, which is the Store's
/// own error taxonomy and travels as the payload of a successful transport
/// round trip.
#[derive(Debug)]
pub enum ClientError {
    /// Network or IO failure while connecting, reading, or writing.
    Io(std::io::Error),
    /// The peer sent bytes that do not decode as a wire frame.
    Protocol(String),
    /// Address could not be parsed or resolved.
    InvalidAddress(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "io error: {err}"),
            ClientError::Protocol(message) => write!(f, "protocol error: {message}"),
            ClientError::InvalidAddress(addr) => write!(f, "invalid address: {addr}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

impl From<HkvError> for ClientError {
    fn from(err: HkvError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

/// A long-lived async client to one peer address.
///
/// Connection is established lazily on the first `send` and kept open
/// across calls. Any IO or protocol failure drops the connection so the
/// next `send` reconnects from scratch.
pub struct PeerClient {
    addr: String,
    conn: Mutex<Option<TcpStream>>,
}

impl PeerClient {
    pub fn new(addr: impl Into<String>) -> Self {
        PeerClient {
            addr: addr.into(),
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends `request` and returns the Router's result: `Ok(Reply)` or the
    /// `HkvError` the peer's Store/Router raised. A `ClientError` means the
    /// round trip itself failed (connect, IO, or framing), not that the op
    /// failed on the peer.
    pub async fn send(&self, request: &Request) -> ClientResult<Result<Reply, HkvError>> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }

        match self.try_send(guard.as_mut().unwrap(), request).await {
            Ok(result) => Ok(result),
            Err(err) => {
                // Connection state is unknown after a failed round trip;
                // drop it so the next call starts clean.
                *guard = None;
                Err(err)
            }
        }
    }

    async fn connect(&self) -> ClientResult<TcpStream> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(ClientError::Io)?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn try_send(
        &self,
        stream: &mut TcpStream,
        request: &Request,
    ) -> ClientResult<Result<Reply, HkvError>> {
        let mut payload = Vec::new();
        request.encode(&mut payload);
        let mut framed = Vec::new();
        wire::frame(&payload, &mut framed);
        stream.write_all(&framed).await?;
        stream.flush().await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            return Err(ClientError::Protocol("frame too large".to_string()));
        }

        let mut reply_payload = vec![0u8; len as usize];
        stream.read_exact(&mut reply_payload).await?;

        wire::decode_result(&reply_payload)
            .map_err(|err| ClientError::Protocol(err.to_string()))
    }
}
