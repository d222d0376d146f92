//! # Yoframe
//!
//! Typed frames and their wire codec.
//!
//! One frame is one unit of communication between a participant and the
//! zipper: `[0x80 | kind][uvarint body_len][fields]`, where the body is the
//! nested TLV of the frame's fields (see `yopack`).
//!
//! ## Invariants
//!
//! - **Determinism**: `encode` depends only on a frame's logical content.
//! - **Round-trip**: `decode(encode(f)) == f`, and `encode(decode(b)) == b`
//!   for any `b` that `encode` produced.
//! - **Panic safety**: every decoding path returns `Result`; unknown frame
//!   kinds fail, unknown fields inside a known frame are skipped.

mod error;
mod frame;
mod codec;


pub use error::FrameError;
pub use error::Result;
pub use frame::BackflowFrame;
pub use frame::DataFrame;
pub use frame::Frame;
pub use frame::FrameKind;
pub use frame::GoawayFrame;
pub use frame::HandshakeFrame;
pub use frame::RejectedFrame;
pub use frame::StreamFrame;
pub use frame::Tag;
pub use codec::MAX_FRAME_SIZE;
pub use codec::decode;
pub use codec::decode_body;
pub use codec::encode;
