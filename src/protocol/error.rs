#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

use crate::error::{Error, Kind};

/// The outer envelope of an inbound frame could not be parsed.
#[non_exhaustive]
#[derive(Debug)]
pub struct MessageParseError {
    /// The frame exactly as it was received
    pub raw: String,
    /// Underlying JSON failure
    pub source: serde_json::Error,
}

impl fmt::Display for MessageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse message {:?}: {}", self.raw, self.source)
    }
}

impl StdError for MessageParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

impl From<MessageParseError> for Error {
    fn from(err: MessageParseError) -> Self {
        Error::with_source(Kind::Protocol, err)
    }
}

/// The first message on a transport was not an acceptable handshake.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// `connection_established` arrived without a usable `activity_timeout`
    MissingActivityTimeout,
    /// `connection_established` arrived without a `socket_id`
    MissingSocketId,
    /// The handshake carried an event other than `connection_established` or `error`
    InvalidHandshake {
        /// The event name that was received
        event: String,
    },
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingActivityTimeout => write!(f, "missing activity timeout"),
            Self::MissingSocketId => write!(f, "missing socket id"),
            Self::InvalidHandshake { event } => write!(f, "invalid handshake: {event}"),
        }
    }
}

impl StdError for HandshakeError {}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::with_source(Kind::Protocol, err)
    }
}

/// An error reported by the server, either as a `pusher:error` event or as an
/// abnormal close code.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PusherError {
    /// Close or error code, when the server supplied one
    pub code: Option<u16>,
    /// Human readable explanation
    pub message: Option<String>,
}

impl PusherError {
    #[must_use]
    pub fn new(code: Option<u16>, message: Option<String>) -> Self {
        Self { code, message }
    }
}

impl fmt::Display for PusherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "pusher error {code}: {message}"),
            (Some(code), None) => write!(f, "pusher error {code}"),
            (None, Some(message)) => write!(f, "pusher error: {message}"),
            (None, None) => write!(f, "pusher error"),
        }
    }
}

impl StdError for PusherError {}

impl From<PusherError> for Error {
    fn from(err: PusherError) -> Self {
        Error::with_source(Kind::WebSocket, err)
    }
}
