use std::sync::Arc;
use std::time::Duration;

use super::connection::ConnectionState;
use crate::error::Error;
use crate::protocol::Envelope;

/// Network reachability as reported by the host environment.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Reachability {
    Online,
    Offline,
}

/// Category of a published error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ErrorKind {
    /// The handshake could not be understood
    HandshakeError,
    /// The transport or server reported an error
    WebSocketError,
}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub error: Arc<Error>,
}

/// Everything the connection manager publishes.
///
/// Each effective state transition produces exactly one [`ConnectionEvent::StateChange`]
/// followed by exactly one event named after the new state.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChange {
        previous: ConnectionState,
        current: ConnectionState,
    },
    Connecting,
    Connected {
        socket_id: String,
    },
    Disconnected,
    Unavailable,
    Failed,
    Error(ErrorEvent),
    /// A decoded inbound message, including protocol events
    Message(Envelope),
    /// A reconnect is scheduled in roughly this many seconds
    ConnectingIn {
        seconds: u64,
    },
}

impl ConnectionEvent {
    /// The event named after `state`. `Initialized` is never re-entered, so it has none.
    pub(crate) fn entered(state: ConnectionState, socket_id: Option<String>) -> Option<Self> {
        match state {
            ConnectionState::Initialized => None,
            ConnectionState::Connecting => Some(Self::Connecting),
            ConnectionState::Connected => Some(Self::Connected {
                socket_id: socket_id.unwrap_or_default(),
            }),
            ConnectionState::Disconnected => Some(Self::Disconnected),
            ConnectionState::Unavailable => Some(Self::Unavailable),
            ConnectionState::Failed => Some(Self::Failed),
        }
    }

    /// Wire-style name of the event, e.g. `state_change` or `connecting_in`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChange { .. } => "state_change",
            Self::Connecting => "connecting",
            Self::Connected { .. } => "connected",
            Self::Disconnected => "disconnected",
            Self::Unavailable => "unavailable",
            Self::Failed => "failed",
            Self::Error(_) => "error",
            Self::Message(_) => "message",
            Self::ConnectingIn { .. } => "connecting_in",
        }
    }
}

/// Records passed to the [`DiagnosticSink`](super::traits::DiagnosticSink).
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Diagnostic {
    StateChanged {
        state: ConnectionState,
        socket_id: Option<String>,
    },
    Network(Reachability),
    HandshakeError(Arc<Error>),
    PongTimeout {
        timeout: Duration,
    },
}
