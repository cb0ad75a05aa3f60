use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};

use super::config::{BACKOFF_DELAY, Collaborators, Config};
use super::error::WsError;
use super::connection::ConnectionState;
use super::events::{ConnectionEvent, Diagnostic, ErrorEvent, ErrorKind, Reachability};
use super::input::{AttemptCallback, Handshake, Input, TransportEvent, TransportListener};
use super::timer::{ActivityPhase, Timer, TimerKind};
use super::traits::{
    Attempt, DiagnosticSink, Scheduler, Strategy, StrategyFactory, StrategyOptions, Transport,
};
use crate::error::Error;
use crate::protocol::{self, Action, CloseEvent, Envelope, HandshakeAction, PusherError};

/// Where the machine publishes what it does.
pub(crate) struct Outputs {
    /// Queue the machine itself is driven from; cloned into every callback
    pub(crate) inputs: mpsc::UnboundedSender<Input>,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) socket_id: watch::Sender<Option<String>>,
    pub(crate) events: broadcast::Sender<ConnectionEvent>,
}

struct InFlight {
    id: u64,
    handle: Box<dyn Attempt>,
}

struct Adopted {
    id: u64,
    transport: Box<dyn Transport>,
}

impl Adopted {
    fn send_event(&mut self, event: &str, data: Value) -> bool {
        match protocol::encode_message(&Envelope::new(event, data)) {
            Ok(raw) => self.transport.send(&raw),
            Err(_e) => false,
        }
    }

    fn ping(&mut self) {
        if self.transport.supports_ping() {
            self.transport.ping();
        } else {
            _ = self.send_event(protocol::PING, json!({}));
        }
    }
}

/// The connection lifecycle state machine.
///
/// Owns at most one in-flight attempt or one adopted connection, plus the
/// unavailable, activity and retry timers. It is driven by [`Machine::handle`]
/// one [`Input`] at a time; collaborators only ever enqueue inputs, so no
/// callback runs while a transition is half applied. Every input that refers to
/// an attempt, connection or timer carries the id it was issued with and is
/// dropped when that resource is no longer the one owned.
pub(crate) struct Machine {
    key: String,
    config: Config,
    factory: Arc<dyn StrategyFactory>,
    strategy: Box<dyn Strategy>,
    scheduler: Arc<dyn Scheduler>,
    diagnostics: Arc<dyn DiagnosticSink>,
    outputs: Outputs,
    state: ConnectionState,
    use_tls: bool,
    attempt: Option<InFlight>,
    connection: Option<Adopted>,
    activity_timeout: Duration,
    unavailable_timer: Timer,
    activity_timer: Timer,
    retry_timer: Timer,
    next_id: u64,
}

impl Machine {
    pub(crate) fn new(
        key: String,
        config: Config,
        collaborators: Collaborators,
        outputs: Outputs,
    ) -> Self {
        let Collaborators {
            strategy: factory,
            scheduler,
            diagnostics,
        } = collaborators;
        let use_tls = config.use_tls;
        let strategy = factory.strategy(&StrategyOptions {
            key: key.clone(),
            use_tls,
        });

        Self {
            key,
            activity_timeout: config.activity_timeout,
            config,
            factory,
            strategy,
            scheduler,
            diagnostics,
            outputs,
            state: ConnectionState::Initialized,
            use_tls,
            attempt: None,
            connection: None,
            unavailable_timer: Timer::default(),
            activity_timer: Timer::default(),
            retry_timer: Timer::default(),
            next_id: 0,
        }
    }

    pub(crate) fn handle(&mut self, input: Input) {
        match input {
            Input::Connect => self.connect(),
            Input::Disconnect => self.disconnect(),
            Input::Send(raw) => {
                if !self.send(&raw) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%raw, "Dropping frame, no connection accepted it");
                }
            }
            Input::Reachability(reachability) => self.on_reachability(reachability),
            Input::Timer { kind, token } => self.on_timer(kind, token),
            Input::Attempt { id, result } => self.on_attempt(id, result),
            Input::AttemptClosed { id, close } => self.on_attempt_closed(id, &close),
            Input::Transport { id, event } => self.on_transport(id, event),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn connect(&mut self) {
        if self.connection.is_some() || self.attempt.is_some() {
            return;
        }
        if !self.strategy.is_supported() {
            self.update_state(ConnectionState::Failed, None);
            return;
        }

        self.update_state(ConnectionState::Connecting, None);
        self.start_connecting();
        self.arm(TimerKind::Unavailable, self.config.unavailable_timeout);
    }

    fn disconnect(&mut self) {
        self.disconnect_internally();
        self.update_state(ConnectionState::Disconnected, None);
    }

    fn send(&mut self, raw: &str) -> bool {
        self.connection
            .as_mut()
            .is_some_and(|connection| connection.transport.send(raw))
    }

    fn start_connecting(&mut self) {
        self.abort_connecting();
        let id = self.next_id();
        let callback = AttemptCallback::new(id, self.outputs.inputs.clone());
        let handle = self.strategy.connect(0, callback);
        self.attempt = Some(InFlight { id, handle });
    }

    fn abort_connecting(&mut self) {
        if let Some(mut attempt) = self.attempt.take() {
            attempt.handle.abort();
        }
    }

    fn on_attempt(&mut self, id: u64, result: Result<Handshake, WsError>) {
        if self.attempt.as_ref().map(|attempt| attempt.id) != Some(id) {
            // Nobody will adopt a transport from a superseded attempt.
            if let Ok(mut handshake) = result {
                handshake.transport.close();
            }
            return;
        }

        match result {
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "Connection attempt failed, retrying");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                self.start_connecting();
            }
            Ok(handshake) => self.on_handshake(handshake),
        }
    }

    fn on_attempt_closed(&mut self, id: u64, close: &CloseEvent) {
        if self.attempt.as_ref().map(|attempt| attempt.id) != Some(id) {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(code = close.code, "Closed before the handshake");
        self.abort_connecting();
        self.apply_policy(
            protocol::close_code_to_action(close),
            protocol::close_event_to_error(close),
        );
    }

    fn on_handshake(&mut self, handshake: Handshake) {
        let Handshake {
            mut transport,
            message,
        } = handshake;

        let action = HandshakeAction::from_message(&message);
        self.abort_connecting();

        match action {
            HandshakeAction::Connected {
                socket_id,
                activity_timeout,
            } => self.adopt(transport, socket_id, activity_timeout),
            HandshakeAction::ProtocolError { detail } => {
                transport.close();
                self.diagnostics
                    .error(&Diagnostic::HandshakeError(Arc::clone(&detail)));
                self.emit(ConnectionEvent::Error(ErrorEvent {
                    kind: ErrorKind::HandshakeError,
                    error: detail,
                }));
                self.retry_in(BACKOFF_DELAY);
            }
            HandshakeAction::SslOnly { error } => {
                transport.close();
                self.apply_policy(Action::SslOnly, error);
            }
            HandshakeAction::Refused { error } => {
                transport.close();
                self.apply_policy(Action::Refused, error);
            }
            HandshakeAction::Backoff { error } => {
                transport.close();
                self.apply_policy(Action::Backoff, error);
            }
            HandshakeAction::Retry { error } => {
                transport.close();
                self.apply_policy(Action::Retry, error);
            }
        }
    }

    fn adopt(
        &mut self,
        transport: Box<dyn Transport>,
        socket_id: String,
        server_timeout: Duration,
    ) {
        self.activity_timeout = self
            .config
            .activity_timeout
            .min(server_timeout)
            .min(transport.activity_timeout().unwrap_or(Duration::MAX));
        self.unavailable_timer.cancel();

        let id = self.next_id();
        let mut connection = Adopted { id, transport };
        connection
            .transport
            .bind(TransportListener::new(id, self.outputs.inputs.clone()));
        self.connection = Some(connection);
        self.reset_activity_check();

        self.outputs.socket_id.send_replace(Some(socket_id.clone()));
        self.update_state(ConnectionState::Connected, Some(socket_id));
    }

    /// Release the adopted connection without closing it.
    fn abandon_connection(&mut self) -> Option<Adopted> {
        self.activity_timer.cancel();
        let mut connection = self.connection.take()?;
        connection.transport.unbind();
        self.outputs.socket_id.send_replace(None);
        Some(connection)
    }

    fn disconnect_internally(&mut self) {
        self.abort_connecting();
        self.retry_timer.cancel();
        self.unavailable_timer.cancel();
        if let Some(mut connection) = self.abandon_connection() {
            connection.transport.close();
        }
    }

    fn apply_policy(&mut self, action: Action, error: Option<PusherError>) {
        if let Some(error) = error {
            self.emit_error(ErrorKind::WebSocketError, error.into());
        }

        match action {
            Action::SslOnly => {
                self.use_tls = true;
                self.update_strategy();
                self.retry_in(Duration::ZERO);
            }
            Action::Refused => self.disconnect(),
            Action::Backoff => self.retry_in(BACKOFF_DELAY),
            Action::Retry => self.retry_in(Duration::ZERO),
        }
    }

    fn update_strategy(&mut self) {
        self.strategy = self.factory.strategy(&StrategyOptions {
            key: self.key.clone(),
            use_tls: self.use_tls,
        });
    }

    fn retry_in(&mut self, delay: Duration) {
        if !delay.is_zero() {
            let seconds = delay.saturating_add(Duration::from_millis(500)).as_secs();
            self.emit(ConnectionEvent::ConnectingIn { seconds });
        }
        self.arm(TimerKind::Retry, delay);
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration) {
        let token = self.next_id();
        let inputs = self.outputs.inputs.clone();
        let callback = Box::new(move || {
            _ = inputs.send(Input::Timer { kind, token });
        });

        let timer = match kind {
            TimerKind::Unavailable => &mut self.unavailable_timer,
            TimerKind::Activity(_) => &mut self.activity_timer,
            TimerKind::Retry => &mut self.retry_timer,
        };
        timer.arm(self.scheduler.as_ref(), delay, token, callback);
    }

    fn on_timer(&mut self, kind: TimerKind, token: u64) {
        let timer = match kind {
            TimerKind::Unavailable => &mut self.unavailable_timer,
            TimerKind::Activity(_) => &mut self.activity_timer,
            TimerKind::Retry => &mut self.retry_timer,
        };
        if !timer.fire(token) {
            return;
        }

        match kind {
            TimerKind::Unavailable => {
                if self.state == ConnectionState::Connecting {
                    self.update_state(ConnectionState::Unavailable, None);
                }
            }
            TimerKind::Retry => {
                self.disconnect_internally();
                self.connect();
            }
            TimerKind::Activity(ActivityPhase::Idle) => self.send_activity_check(),
            TimerKind::Activity(ActivityPhase::AwaitPong) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Activity check timed out: no sign of life within {:?}",
                    self.config.pong_timeout
                );
                self.diagnostics.error(&Diagnostic::PongTimeout {
                    timeout: self.config.pong_timeout,
                });
                self.retry_in(Duration::ZERO);
            }
        }
    }

    fn send_activity_check(&mut self) {
        self.activity_timer.cancel();
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        connection.ping();
        self.arm(
            TimerKind::Activity(ActivityPhase::AwaitPong),
            self.config.pong_timeout,
        );
    }

    fn reset_activity_check(&mut self) {
        self.activity_timer.cancel();
        if self
            .connection
            .as_ref()
            .is_some_and(|connection| !connection.transport.handles_activity_checks())
        {
            self.arm(
                TimerKind::Activity(ActivityPhase::Idle),
                self.activity_timeout,
            );
        }
    }

    fn on_transport(&mut self, id: u64, event: TransportEvent) {
        if self.connection.as_ref().map(|connection| connection.id) != Some(id) {
            return;
        }

        match event {
            TransportEvent::Message(raw) => self.on_message(&raw),
            TransportEvent::Activity => self.reset_activity_check(),
            TransportEvent::Error(e) => self.emit_error(ErrorKind::WebSocketError, e.into()),
            TransportEvent::Closed(close) => self.on_closed(close),
        }
    }

    fn on_message(&mut self, raw: &str) {
        // Any inbound frame, pongs and undecodable ones included, proves the connection is alive.
        self.reset_activity_check();

        let envelope = match protocol::decode_message(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.emit_error(ErrorKind::WebSocketError, e);
                return;
            }
        };

        if protocol::is_event(&envelope.event, protocol::PING) {
            if let Some(connection) = self.connection.as_mut() {
                _ = connection.send_event(protocol::PONG, json!({}));
            }
        } else if protocol::is_event(&envelope.event, protocol::ERROR) {
            let close = CloseEvent::from_data(&envelope.data);
            let code = envelope
                .data
                .get("code")
                .is_some_and(|code| !code.is_null())
                .then_some(close.code);
            self.emit_error(
                ErrorKind::WebSocketError,
                PusherError::new(code, close.reason).into(),
            );
        }

        self.emit(ConnectionEvent::Message(envelope));
    }

    fn on_closed(&mut self, close: Option<CloseEvent>) {
        let previous = self.state;
        _ = self.abandon_connection();

        if let Some(close) = close {
            self.apply_policy(
                protocol::close_code_to_action(&close),
                protocol::close_event_to_error(&close),
            );
        } else if matches!(
            previous,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            self.retry_in(BACKOFF_DELAY);
        }
    }

    fn on_reachability(&mut self, reachability: Reachability) {
        self.diagnostics.info(&Diagnostic::Network(reachability));

        match reachability {
            Reachability::Online => {
                if matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Unavailable
                ) {
                    self.retry_in(Duration::ZERO);
                }
            }
            Reachability::Offline => {
                if self.connection.is_some() {
                    self.send_activity_check();
                }
            }
        }
    }

    fn update_state(&mut self, next: ConnectionState, socket_id: Option<String>) {
        let previous = self.state;
        self.state = next;
        if previous == next {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(%previous, %next, ?socket_id, "State changed");
        self.diagnostics.info(&Diagnostic::StateChanged {
            state: next,
            socket_id: socket_id.clone(),
        });
        self.outputs.state.send_replace(next);
        self.emit(ConnectionEvent::StateChange {
            previous,
            current: next,
        });
        if let Some(event) = ConnectionEvent::entered(next, socket_id) {
            self.emit(event);
        }
    }

    fn emit_error(&self, kind: ErrorKind, error: Error) {
        self.emit(ConnectionEvent::Error(ErrorEvent {
            kind,
            error: Arc::new(error),
        }));
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is not an error.
        _ = self.outputs.events.send(event);
    }
}
