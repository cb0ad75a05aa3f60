use tokio::sync::mpsc;

use super::error::WsError;
use super::events::Reachability;
use super::timer::TimerKind;
use super::traits::Transport;
use crate::protocol::CloseEvent;

/// Everything the connection manager reacts to, handled strictly in order.
pub(crate) enum Input {
    Connect,
    Disconnect,
    Send(String),
    Reachability(Reachability),
    Timer {
        kind: TimerKind,
        token: u64,
    },
    Attempt {
        id: u64,
        result: Result<Handshake, WsError>,
    },
    AttemptClosed {
        id: u64,
        close: CloseEvent,
    },
    Transport {
        id: u64,
        event: TransportEvent,
    },
}

/// A transport that opened and delivered its first message.
#[non_exhaustive]
pub struct Handshake {
    pub transport: Box<dyn Transport>,
    /// First raw frame received on the transport
    pub message: String,
}

impl Handshake {
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, message: String) -> Self {
        Self { transport, message }
    }
}

#[derive(Debug)]
pub(crate) enum TransportEvent {
    Message(String),
    Activity,
    Error(WsError),
    Closed(Option<CloseEvent>),
}

/// Handed to [`Strategy::connect`](super::traits::Strategy::connect); reports the
/// outcome of one attempt.
#[derive(Clone)]
pub struct AttemptCallback {
    id: u64,
    inputs: mpsc::UnboundedSender<Input>,
}

impl AttemptCallback {
    pub(crate) fn new(id: u64, inputs: mpsc::UnboundedSender<Input>) -> Self {
        Self { id, inputs }
    }

    pub fn report(&self, result: Result<Handshake, WsError>) {
        _ = self.inputs.send(Input::Attempt {
            id: self.id,
            result,
        });
    }

    /// The server closed the socket before sending its first frame.
    pub fn closed(&self, close: CloseEvent) {
        _ = self.inputs.send(Input::AttemptClosed { id: self.id, close });
    }
}

/// Handed to [`Transport::bind`]; forwards transport notifications to the manager.
#[derive(Clone)]
pub struct TransportListener {
    id: u64,
    inputs: mpsc::UnboundedSender<Input>,
}

impl TransportListener {
    pub(crate) fn new(id: u64, inputs: mpsc::UnboundedSender<Input>) -> Self {
        Self { id, inputs }
    }

    /// A text frame arrived.
    pub fn message(&self, raw: String) {
        self.deliver(TransportEvent::Message(raw));
    }

    /// Any other sign of life, e.g. a native pong.
    pub fn activity(&self) {
        self.deliver(TransportEvent::Activity);
    }

    pub fn error(&self, error: WsError) {
        self.deliver(TransportEvent::Error(error));
    }

    /// The transport is gone. `close` carries the close code when one was received.
    pub fn closed(&self, close: Option<CloseEvent>) {
        self.deliver(TransportEvent::Closed(close));
    }

    pub(crate) fn deliver(&self, event: TransportEvent) {
        _ = self.inputs.send(Input::Transport { id: self.id, event });
    }
}
