#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt as _};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::config::{Collaborators, Config};
use super::error::WsError;
use super::events::{ConnectionEvent, Reachability};
use super::input::Input;
use super::machine::{Machine, Outputs};
use crate::Result;
use crate::error::Error;
use crate::protocol::{self, Envelope};

/// Broadcast channel capacity for published events.
const BROADCAST_CAPACITY: usize = 1024;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// Created, `connect` never called. Never re-entered.
    Initialized,
    /// Waiting for a handshake
    Connecting,
    /// Handshake accepted, a connection is adopted
    Connected,
    /// Explicitly disconnected, or refused by the server
    Disconnected,
    /// Connecting for longer than the unavailable timeout
    Unavailable,
    /// No transport is supported. Terminal.
    Failed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

struct Inner {
    inputs: mpsc::UnboundedSender<Input>,
    state_rx: watch::Receiver<ConnectionState>,
    socket_rx: watch::Receiver<Option<String>>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    shutdown: CancellationToken,
    /// Cancels the driver when the last handle is dropped
    _guard: DropGuard,
}

/// Manages the lifecycle of one Pusher connection.
///
/// The handle is cheap to clone. All commands return immediately; their effects
/// surface later as [`ConnectionEvent`]s and state changes. A single background
/// task owns the state machine and handles commands, timer firings and
/// transport callbacks one at a time, in the order they arrive.
///
/// Dropping the last handle disconnects and stops the background task.
///
/// # Example
///
/// ```no_run
/// use pusher_client_sdk::ws::config::{Collaborators, Config};
/// use pusher_client_sdk::ws::socket::WebSocketStrategyFactory;
/// use pusher_client_sdk::ws::{ConnectionEvent, ConnectionManager};
///
/// # async fn run() -> pusher_client_sdk::Result<()> {
/// let factory = WebSocketStrategyFactory::new("ws.pusherapp.com");
/// let manager = ConnectionManager::new("app-key", Config::default(), Collaborators::new(factory))?;
///
/// let mut events = manager.subscribe();
/// manager.connect();
///
/// while let Ok(event) = events.recv().await {
///     if let ConnectionEvent::Connected { socket_id } = event {
///         println!("connected as {socket_id}");
///         break;
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a connection manager for application `key` and start its driver task.
    ///
    /// Must be called within a tokio runtime. The manager starts in
    /// [`ConnectionState::Initialized`]; call [`Self::connect`] to start connecting.
    pub fn new<K: Into<String>>(
        key: K,
        config: Config,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::validation("application key must not be empty"));
        }
        config.validate()?;

        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Initialized);
        let (socket_tx, socket_rx) = watch::channel(None);

        let machine = Machine::new(
            key,
            config,
            collaborators,
            Outputs {
                inputs: inputs_tx.clone(),
                state: state_tx,
                socket_id: socket_tx,
                events: events_tx.clone(),
            },
        );

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            Self::drive(machine, inputs_rx, token).await;
        });

        Ok(Self {
            inner: Arc::new(Inner {
                inputs: inputs_tx,
                state_rx,
                socket_rx,
                events_tx,
                _guard: shutdown.clone().drop_guard(),
                shutdown,
            }),
        })
    }

    /// Feed queued inputs to the machine until shut down.
    async fn drive(
        mut machine: Machine,
        mut inputs: mpsc::UnboundedReceiver<Input>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Connection manager dropped, disconnecting");
                    machine.handle(Input::Disconnect);
                    break;
                }
                Some(input) = inputs.recv() => machine.handle(input),
                else => break,
            }
        }
    }

    fn enqueue(&self, input: Input) -> Result<()> {
        self.inner
            .inputs
            .send(input)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Start connecting. Does nothing while an attempt or connection exists.
    pub fn connect(&self) {
        _ = self.enqueue(Input::Connect);
    }

    /// Tear everything down and move to [`ConnectionState::Disconnected`].
    pub fn disconnect(&self) {
        _ = self.enqueue(Input::Disconnect);
    }

    /// Send one raw frame over the adopted connection.
    ///
    /// # Errors
    ///
    /// [`WsError::NotConnected`] unless the state is `Connected`, and
    /// [`WsError::ConnectionClosed`] if the driver task has stopped.
    pub fn send<S: Into<String>>(&self, raw: S) -> Result<()> {
        if !self.state().is_connected() {
            return Err(WsError::NotConnected.into());
        }
        self.enqueue(Input::Send(raw.into()))
    }

    /// Encode and send an event, optionally scoped to `channel`.
    pub fn send_event<D: Serialize>(
        &self,
        event: &str,
        data: &D,
        channel: Option<&str>,
    ) -> Result<()> {
        let envelope = Envelope::builder()
            .event(event)
            .data(serde_json::to_value(data)?)
            .maybe_channel(channel)
            .build();
        self.send(protocol::encode_message(&envelope)?)
    }

    /// Report a network reachability change.
    pub fn notify_reachability(&self, reachability: Reachability) {
        _ = self.enqueue(Input::Reachability(reachability));
    }

    /// Forward every item of `signals` as a reachability change until the stream
    /// ends or the manager is dropped.
    pub fn bind_reachability<S>(&self, signals: S)
    where
        S: Stream<Item = Reachability> + Send + 'static,
    {
        let inputs = self.inner.inputs.clone();
        let shutdown = self.inner.shutdown.clone();

        tokio::spawn(async move {
            let mut signals = std::pin::pin!(signals);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    signal = signals.next() => {
                        let Some(reachability) = signal else {
                            break;
                        };
                        if inputs.send(Input::Reachability(reachability)).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Socket id assigned by the server, while connected.
    #[must_use]
    pub fn socket_id(&self) -> Option<String> {
        self.inner.socket_rx.borrow().clone()
    }

    /// Subscribe to published events.
    ///
    /// Each call returns a new independent receiver that sees events published
    /// after the call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Published events as a stream. Falling behind yields [`WsError::Lagged`]
    /// and the stream ends.
    pub fn events(&self) -> impl Stream<Item = Result<ConnectionEvent>> + use<> {
        let mut rx = self.subscribe();

        try_stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Event subscriber lagged, missed {n} events");
                        Err(WsError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}
