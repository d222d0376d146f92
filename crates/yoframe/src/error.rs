//! Codec failure taxonomy.

use yopack::Error as PackError;

/// A frame that could not be decoded.
///
/// Every variant is a `MalformedFrame` from the supervisor's point of view;
/// the split exists for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The TLV substrate rejected the bytes (truncation, overrun, bad varint).
    Wire(PackError),
    /// The leading byte named a frame kind this codec does not know.
    UnknownKind(u8),
    /// A known frame was missing a required field.
    MissingField { frame: &'static str, field: &'static str },
    /// The declared frame size exceeds the read bound.
    FrameTooLarge { declared: usize, limit: usize },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Wire(e) => write!(f, "malformed frame: {}", e),
            FrameError::UnknownKind(k) => write!(f, "unknown frame kind {:#04x}", k),
            FrameError::MissingField { frame, field } => {
                write!(f, "{} frame missing required field `{}`", frame, field)
            }
            FrameError::FrameTooLarge { declared, limit } => {
                write!(f, "frame of {} bytes exceeds the {} byte bound", declared, limit)
            }
        }
    }
}

impl std::error::Error for FrameError {}

impl From<PackError> for FrameError {
    fn from(e: PackError) -> Self {
        Self::Wire(e)
    }
}

/// Specialized `Result` for codec operations.
pub type Result<T> = std::result::Result<T, FrameError>;
