use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::PusherError;
use crate::error::Error;

/// Close code used when a close-style payload carries no integer code.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// A single frame on the wire.
///
/// `data` is either a string or a structured value. When decoding, a string that
/// itself holds JSON is unwrapped one level.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Envelope {
    /// Event name (e.g. `pusher:connection_established`, `client-typing`)
    #[builder(into)]
    pub event: String,
    /// Event payload
    #[serde(default, skip_serializing_if = "Value::is_null")]
    #[builder(default)]
    pub data: Value,
    /// Channel the event belongs to, absent for connection-level events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub channel: Option<String>,
    /// Originating user for client events on presence channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub user_id: Option<String>,
}

impl Envelope {
    /// Create a connection-level envelope with no channel.
    #[must_use]
    pub fn new<S: Into<String>>(event: S, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            channel: None,
            user_id: None,
        }
    }
}

/// Close information delivered by a transport, or embedded in a `pusher:error`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: Option<String>,
}

impl CloseEvent {
    #[must_use]
    pub fn new(code: u16, reason: Option<String>) -> Self {
        Self { code, reason }
    }

    /// Read a close-style payload (`{code, reason}` or `{code, message}`).
    #[must_use]
    pub fn from_data(data: &Value) -> Self {
        let code = data
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(NO_STATUS_RECEIVED);
        let reason = ["reason", "message"]
            .iter()
            .find_map(|key| data.get(*key).and_then(Value::as_str))
            .map(ToOwned::to_owned);

        Self { code, reason }
    }
}

/// What the connection manager should do after a close or error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    /// Server demands an encrypted transport
    SslOnly,
    /// Fatal: do not reconnect
    Refused,
    /// Reconnect after a delay
    Backoff,
    /// Reconnect immediately
    Retry,
}

/// Classification of the first message received on a transport.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum HandshakeAction {
    Connected {
        socket_id: String,
        activity_timeout: Duration,
    },
    SslOnly {
        error: Option<PusherError>,
    },
    Refused {
        error: Option<PusherError>,
    },
    Backoff {
        error: Option<PusherError>,
    },
    Retry {
        error: Option<PusherError>,
    },
    ProtocolError {
        detail: Arc<Error>,
    },
}

impl HandshakeAction {
    #[must_use]
    pub fn from_close(action: Action, error: Option<PusherError>) -> Self {
        match action {
            Action::SslOnly => Self::SslOnly { error },
            Action::Refused => Self::Refused { error },
            Action::Backoff => Self::Backoff { error },
            Action::Retry => Self::Retry { error },
        }
    }

    /// Classify a raw handshake, folding codec failures into [`Self::ProtocolError`].
    #[must_use]
    pub fn from_message(raw: &str) -> Self {
        super::process_handshake(raw).unwrap_or_else(|e| Self::ProtocolError {
            detail: Arc::new(e),
        })
    }

    /// The close-style action and its error, if this is not `Connected` or `ProtocolError`.
    #[must_use]
    pub fn close_action(&self) -> Option<(Action, Option<&PusherError>)> {
        match self {
            Self::SslOnly { error } => Some((Action::SslOnly, error.as_ref())),
            Self::Refused { error } => Some((Action::Refused, error.as_ref())),
            Self::Backoff { error } => Some((Action::Backoff, error.as_ref())),
            Self::Retry { error } => Some((Action::Retry, error.as_ref())),
            Self::Connected { .. } | Self::ProtocolError { .. } => None,
        }
    }
}
