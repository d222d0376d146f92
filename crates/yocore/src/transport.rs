//! # Multiplexed transport traits
//!
//! A minimal, async interface for dialing a remote peer and opening or
//! accepting substreams over one multiplexed connection.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: the transport knows nothing about frames; it hands
//!   out bidirectional byte streams.
//! - **Object-Safe**: everything is held as `Arc<dyn …>` / `Box<dyn …>` so
//!   the supervisor never names a concrete transport. The QUIC binding and
//!   the in-process [`crate::mem`] network are interchangeable behind these
//!   traits.

use std::fmt;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The remote address could not be reached.
    DialFailed(String),
    /// The connection dropped or was closed by the peer.
    ConnectionLost(String),
    /// Opening or accepting a substream failed.
    StreamRefused(String),
    /// Generic I/O failure inside the transport.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DialFailed(msg) => write!(f, "dial failed: {}", msg),
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::StreamRefused(msg) => write!(f, "stream refused: {}", msg),
            Self::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A bidirectional byte stream. Blanket-implemented; any tokio duplex pipe,
/// socket stream, or QUIC substream qualifies.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

/// One multiplexed connection. Opening a substream is cheap and does not
/// round-trip; substream closure is independent of connection closure.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Opens a fresh outgoing substream.
    async fn open_stream(&self) -> Result<Box<dyn ByteStream>>;

    /// Accepts the next incoming substream from the peer.
    async fn accept_stream(&self) -> Result<Box<dyn ByteStream>>;

    fn local_addr(&self) -> String;

    fn remote_addr(&self) -> String;

    /// Closes the connection abruptly; open substreams surface transport
    /// errors rather than clean ends.
    async fn close(&self);
}

/// Dials multiplexed connections. TLS and transport tuning live on the
/// concrete dialer, not on the supervisor.
#[async_trait::async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, addr: &str) -> Result<Box<dyn Connection>>;
}
