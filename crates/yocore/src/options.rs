//! Participant configuration.

use std::sync::Arc;

use yoframe::Tag;

use crate::transport::Dialer;

/// What kind of endpoint a participant is. The discriminant is the role byte
/// carried in the handshake.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    /// Emits data frames into the fabric.
    Source = 0x5F,
    /// Another router peering upstream.
    UpstreamPeer = 0x5E,
    /// Observes tags and emits transformed data.
    StreamFunction = 0x5D,
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClientType::Source => "Source",
            ClientType::UpstreamPeer => "UpstreamPeer",
            ClientType::StreamFunction => "StreamFunction",
        };
        f.write_str(name)
    }
}

/// The credential a participant presents on every handshake. The payload is
/// opaque to this layer; the server is stateless across reconnects, so it is
/// re-sent on each attempt.
#[derive(Debug, Clone)]
pub struct Credential {
    name: String,
    payload: String,
}

impl Credential {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { name: name.into(), payload: payload.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl Default for Credential {
    fn default() -> Self {
        Self { name: "none".into(), payload: String::new() }
    }
}

/// How `write_frame` behaves when the queue cannot take the frame now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Wait for the queue or for cancellation. Frames are not lost.
    #[default]
    Block,
    /// Fail fast with `Disconnected` when nothing is draining the queue.
    Drop,
}

/// Options for one participant.
pub struct ClientOptions {
    pub(crate) dialer: Arc<dyn Dialer>,
    pub(crate) credential: Credential,
    pub(crate) observe_data_tags: Vec<Tag>,
    pub(crate) write_mode: WriteMode,
    pub(crate) connect_until_succeed: bool,
}

impl ClientOptions {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            credential: Credential::default(),
            observe_data_tags: Vec::new(),
            write_mode: WriteMode::default(),
            connect_until_succeed: false,
        }
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// The unordered set of tags this participant observes. Required
    /// (non-empty) for stream functions.
    pub fn observe_data_tags(mut self, tags: Vec<Tag>) -> Self {
        self.observe_data_tags = tags;
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Keep retrying the initial connect on transport failures. Never
    /// applies to authentication failures.
    pub fn connect_until_succeed(mut self, retry: bool) -> Self {
        self.connect_until_succeed = retry;
        self
    }
}
