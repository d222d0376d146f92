//! Frame definitions.
//!
//! Frames are a closed sum type; the kind accessor is a plain tag read.

/// The 32-bit routing label attached to every data frame.
pub type Tag = u32;

/// Single-byte wire kind of each frame. The on-wire leading byte is
/// `0x80 | kind`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    HandshakeAck = 0x29,
    Backflow = 0x2D,
    Goaway = 0x2E,
    Handshake = 0x31,
    Stream = 0x33,
    Rejected = 0x39,
    Data = 0x3F,
}

impl FrameKind {
    /// Returns the kind for a wire byte, or `None` if unassigned.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x29 => Some(FrameKind::HandshakeAck),
            0x2D => Some(FrameKind::Backflow),
            0x2E => Some(FrameKind::Goaway),
            0x31 => Some(FrameKind::Handshake),
            0x33 => Some(FrameKind::Stream),
            0x39 => Some(FrameKind::Rejected),
            0x3F => Some(FrameKind::Data),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::HandshakeAck => "HandshakeAckFrame",
            FrameKind::Backflow => "BackflowFrame",
            FrameKind::Goaway => "GoawayFrame",
            FrameKind::Handshake => "HandshakeFrame",
            FrameKind::Stream => "StreamFrame",
            FrameKind::Rejected => "RejectedFrame",
            FrameKind::Data => "DataFrame",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// First frame on a fresh control stream; carries the participant's identity
/// and its credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeFrame {
    pub name: String,
    pub id: String,
    /// Role byte: `Source = 0x5F`, `UpstreamPeer = 0x5E`,
    /// `StreamFunction = 0x5D`.
    pub client_type: u8,
    pub observe_data_tags: Vec<Tag>,
    pub auth_name: String,
    pub auth_payload: String,
}

/// Server refusal; the message is surfaced to the participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFrame {
    pub message: String,
}

/// One unit of application data, routed by tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub tag: Tag,
    pub metadata: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// A processing result routed back to the originating source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackflowFrame {
    pub tag: Tag,
    pub payload: Vec<u8>,
}

/// Announces an auxiliary substream carrying arbitrary bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub id: String,
    pub client_id: String,
    pub tag: Tag,
}

/// Server asks the participant to stop reconnecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoawayFrame {
    pub message: String,
}

/// The closed set of frames this protocol speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Handshake(HandshakeFrame),
    HandshakeAck,
    Rejected(RejectedFrame),
    Data(DataFrame),
    Backflow(BackflowFrame),
    Stream(StreamFrame),
    Goaway(GoawayFrame),
}

impl Frame {
    /// The wire kind of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Handshake(_) => FrameKind::Handshake,
            Frame::HandshakeAck => FrameKind::HandshakeAck,
            Frame::Rejected(_) => FrameKind::Rejected,
            Frame::Data(_) => FrameKind::Data,
            Frame::Backflow(_) => FrameKind::Backflow,
            Frame::Stream(_) => FrameKind::Stream,
            Frame::Goaway(_) => FrameKind::Goaway,
        }
    }
}
