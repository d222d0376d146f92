//! # Yocore
//!
//! The participant side of the streaming fabric: a framed stream bound to a
//! multiplexed transport, and the supervisor that keeps one named participant
//! connected to its zipper across transport failures.
//!
//! ## Architecture
//!
//! - [`transport`] — object-safe traits for dialing a multiplexed connection
//!   and opening/accepting substreams, plus the in-process `mem` network.
//! - [`FrameStream`] — exactly one frame per read, one atomic frame per
//!   write, over any bidirectional byte stream.
//! - [`Client`] — the supervisor: handshake, background reader, write queue,
//!   reconnection, cancellation.

pub mod transport;
pub mod mem;

mod error;
mod frame_stream;
mod lifecycle;
mod client;
mod options;


pub use client::Client;
pub use error::ClientError;
pub use error::Result;
pub use error::StreamError;
pub use frame_stream::FrameStream;
pub use options::ClientOptions;
pub use options::ClientType;
pub use options::Credential;
pub use options::WriteMode;
