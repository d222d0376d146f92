//! The failure taxonomy of the participant side.
//!
//! `StreamError` is what one framed stream reports; `ClientError` is what the
//! supervisor surfaces to callers. The supervisor recovers transport-class
//! failures internally and only terminal classes escape `connect`.

use yoframe::FrameError;

use crate::transport::TransportError;

/// Failure of a single framed-stream operation.
#[derive(Debug)]
pub enum StreamError {
    /// The peer finished the stream cleanly at a frame boundary.
    EndOfStream,
    /// Bytes arrived but did not decode to a frame.
    Malformed(FrameError),
    /// The underlying transport failed (including truncation mid-frame).
    Transport(std::io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::EndOfStream => write!(f, "end of stream"),
            StreamError::Malformed(e) => write!(f, "{}", e),
            StreamError::Transport(e) => write!(f, "transport failure: {}", e),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<FrameError> for StreamError {
    fn from(e: FrameError) -> Self {
        Self::Malformed(e)
    }
}

/// Failure surfaced by the client supervisor.
#[derive(Debug)]
pub enum ClientError {
    /// Invalid options; fatal, surfaced from `connect` before dialing.
    Configuration(String),
    /// The server refused the handshake. Terminal; never retried.
    AuthenticationFailed(String),
    /// A dial or stream operation failed.
    Transport(TransportError),
    /// A frame-stream operation failed.
    Stream(StreamError),
    /// Non-blocking write found no active drainer, or the queue was full.
    Disconnected,
    /// The participant was cancelled; carries the cancellation cause.
    Cancelled(String),
    /// A frame observer panicked. Report-only: the reader task survives.
    HandlerPanic(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            ClientError::AuthenticationFailed(reason) => write!(f, "{}", reason),
            ClientError::Transport(e) => write!(f, "{}", e),
            ClientError::Stream(e) => write!(f, "{}", e),
            ClientError::Disconnected => write!(f, "client has lost connection"),
            ClientError::Cancelled(cause) => write!(f, "{}", cause),
            ClientError::HandlerPanic(msg) => write!(f, "frame handler panic: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<StreamError> for ClientError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

impl ClientError {
    /// Terminal errors stop the reconnect loop; everything else is retriable.
    pub fn is_authentication(&self) -> bool {
        matches!(self, ClientError::AuthenticationFailed(_))
    }
}

/// Specialized `Result` for supervisor operations.
pub type Result<T> = std::result::Result<T, ClientError>;
