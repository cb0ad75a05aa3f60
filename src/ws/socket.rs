//! Default [`Strategy`] opening a single WebSocket with `tokio-tungstenite`.

use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::error::WsError;
use super::input::{AttemptCallback, Handshake, TransportEvent, TransportListener};
use super::traits::{Attempt, Strategy, StrategyFactory, StrategyOptions, Transport};
use crate::Result;
use crate::protocol::{CloseEvent, PROTOCOL_VERSION, types::NO_STATUS_RECEIVED};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_WS_PORT: u16 = 80;
const DEFAULT_WSS_PORT: u16 = 443;

/// Longest wait for the first frame after the socket opens.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A failed attempt reports its error only after this pause, since the manager
/// restarts failed attempts immediately.
const FAILED_ATTEMPT_PAUSE: Duration = Duration::from_secs(1);

/// Builds [`WebSocketStrategy`] instances for one host.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct WebSocketStrategyFactory {
    pub host: String,
    pub ws_port: u16,
    pub wss_port: u16,
}

impl WebSocketStrategyFactory {
    #[must_use]
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            ws_port: DEFAULT_WS_PORT,
            wss_port: DEFAULT_WSS_PORT,
        }
    }

    #[must_use]
    pub fn with_ports(mut self, ws_port: u16, wss_port: u16) -> Self {
        self.ws_port = ws_port;
        self.wss_port = wss_port;
        self
    }

    /// `ws[s]://host:port/app/{key}?protocol=7&client=rust&version=..&flash=false`
    pub fn endpoint(&self, options: &StrategyOptions) -> Result<Url> {
        let (scheme, port) = if options.use_tls {
            ("wss", self.wss_port)
        } else {
            ("ws", self.ws_port)
        };

        let mut url = Url::parse(&format!("{scheme}://{}:{port}", self.host))?;
        url.set_path(&format!("/app/{}", options.key));
        url.query_pairs_mut()
            .append_pair("protocol", &PROTOCOL_VERSION.to_string())
            .append_pair("client", "rust")
            .append_pair("version", env!("CARGO_PKG_VERSION"))
            .append_pair("flash", "false");

        Ok(url)
    }
}

impl StrategyFactory for WebSocketStrategyFactory {
    fn strategy(&self, options: &StrategyOptions) -> Box<dyn Strategy> {
        let endpoint = match self.endpoint(options) {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(host = %self.host, error = %e, "Unable to build endpoint");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                None
            }
        };

        Box::new(WebSocketStrategy { endpoint })
    }
}

/// Opens one WebSocket to a fixed endpoint per attempt.
///
/// The first text frame received is handed to the manager as the handshake.
/// Unsupported when no valid endpoint could be built.
#[derive(Debug, Clone)]
pub struct WebSocketStrategy {
    endpoint: Option<Url>,
}

impl Strategy for WebSocketStrategy {
    fn is_supported(&self) -> bool {
        self.endpoint.is_some()
    }

    fn connect(&self, _min_priority: u32, callback: AttemptCallback) -> Box<dyn Attempt> {
        let Some(endpoint) = self.endpoint.clone() else {
            return Box::new(SocketAttempt(None));
        };

        let handle = tokio::spawn(async move {
            match open(&endpoint).await {
                Ok(Opened::Handshake(handshake)) => callback.report(Ok(handshake)),
                Ok(Opened::Closed(close)) => callback.closed(close),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%endpoint, error = %e, "WebSocket attempt failed");
                    sleep(FAILED_ATTEMPT_PAUSE).await;
                    callback.report(Err(e));
                }
            }
        });

        Box::new(SocketAttempt(Some(handle.abort_handle())))
    }
}

struct SocketAttempt(Option<AbortHandle>);

impl Attempt for SocketAttempt {
    fn abort(&mut self) {
        // A handshake already reported owns its socket; aborting a finished task is a no-op.
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// How the socket answered once it was open.
enum Opened {
    Handshake(Handshake),
    /// Closed by the server before any text frame
    Closed(CloseEvent),
}

async fn open(endpoint: &Url) -> std::result::Result<Opened, WsError> {
    let (mut stream, _) = connect_async(endpoint.as_str())
        .await
        .map_err(WsError::Connection)?;

    let message = match timeout(HANDSHAKE_TIMEOUT, first_text(&mut stream))
        .await
        .map_err(WsError::transport)??
    {
        FirstFrame::Text(message) => message,
        FirstFrame::Close(frame) => return Ok(Opened::Closed(close_event(frame))),
    };

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(stream, commands_rx));

    Ok(Opened::Handshake(Handshake::new(
        Box::new(WebSocketTransport {
            commands: commands_tx,
        }),
        message,
    )))
}

enum FirstFrame {
    Text(String),
    Close(Option<CloseFrame>),
}

async fn first_text(stream: &mut WsStream) -> std::result::Result<FirstFrame, WsError> {
    while let Some(frame) = stream.next().await {
        match frame.map_err(WsError::Connection)? {
            Message::Text(text) => return Ok(FirstFrame::Text(text.as_str().to_owned())),
            Message::Close(frame) => return Ok(FirstFrame::Close(frame)),
            _ => {}
        }
    }

    Err(WsError::ConnectionClosed)
}

enum Command {
    Bind(TransportListener),
    Unbind,
    Send(String),
    Ping,
    Close,
}

/// An open socket. Frames are written and read by a dedicated task.
pub struct WebSocketTransport {
    commands: mpsc::UnboundedSender<Command>,
}

impl Transport for WebSocketTransport {
    fn bind(&mut self, listener: TransportListener) {
        _ = self.commands.send(Command::Bind(listener));
    }

    fn unbind(&mut self) {
        _ = self.commands.send(Command::Unbind);
    }

    fn send(&mut self, raw: &str) -> bool {
        self.commands.send(Command::Send(raw.to_owned())).is_ok()
    }

    fn supports_ping(&self) -> bool {
        true
    }

    fn ping(&mut self) {
        _ = self.commands.send(Command::Ping);
    }

    fn close(&mut self) {
        _ = self.commands.send(Command::Close);
    }
}

/// Where transport events go. Events raised before the manager binds are held back.
enum Route {
    Pending(Vec<TransportEvent>),
    Bound(TransportListener),
    Unbound,
}

impl Route {
    fn emit(&mut self, event: TransportEvent) {
        match self {
            Self::Pending(backlog) => backlog.push(event),
            Self::Bound(listener) => listener.deliver(event),
            Self::Unbound => {}
        }
    }

    fn bind(&mut self, listener: TransportListener) {
        if let Self::Pending(backlog) = self {
            for event in backlog.drain(..) {
                listener.deliver(event);
            }
        }
        *self = Self::Bound(listener);
    }
}

fn close_event(frame: Option<CloseFrame>) -> CloseEvent {
    match frame {
        Some(frame) => {
            let reason = frame.reason.as_str();
            CloseEvent::new(
                u16::from(frame.code),
                (!reason.is_empty()).then(|| reason.to_owned()),
            )
        }
        None => CloseEvent::new(NO_STATUS_RECEIVED, None),
    }
}

/// Per-socket IO loop.
async fn run(stream: WsStream, mut commands: mpsc::UnboundedReceiver<Command>) {
    let (mut write, mut read) = stream.split();
    let mut route = Route::Pending(Vec::new());

    loop {
        tokio::select! {
            command = commands.recv() => {
                let frame = match command {
                    Some(Command::Bind(listener)) => {
                        route.bind(listener);
                        continue;
                    }
                    Some(Command::Unbind) => {
                        route = Route::Unbound;
                        continue;
                    }
                    Some(Command::Send(raw)) => Message::Text(raw.into()),
                    Some(Command::Ping) => Message::Ping(Vec::<u8>::new().into()),
                    Some(Command::Close) | None => {
                        _ = write.send(Message::Close(None)).await;
                        break;
                    }
                };

                if let Err(e) = write.send(frame).await {
                    route.emit(TransportEvent::Error(WsError::Connection(e)));
                    route.emit(TransportEvent::Closed(None));
                    break;
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(%text, "Received WebSocket text message");
                        route.emit(TransportEvent::Message(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        route.emit(TransportEvent::Activity);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        route.emit(TransportEvent::Closed(Some(close_event(frame))));
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and raw frames carry nothing for this protocol.
                    }
                    Some(Err(e)) => {
                        route.emit(TransportEvent::Error(WsError::Connection(e)));
                        route.emit(TransportEvent::Closed(None));
                        break;
                    }
                    None => {
                        route.emit(TransportEvent::Closed(None));
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    fn options(use_tls: bool) -> StrategyOptions {
        StrategyOptions {
            key: "app-key".to_owned(),
            use_tls,
        }
    }

    #[test]
    fn endpoint_uses_plain_port_by_default() {
        let factory = WebSocketStrategyFactory::new("ws.example.com");

        let url = factory.endpoint(&options(false)).unwrap();

        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.host_str(), Some("ws.example.com"));
        assert_eq!(url.port_or_known_default(), Some(80));
        assert_eq!(url.path(), "/app/app-key");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(query[0], ("protocol".to_owned(), "7".to_owned()));
        assert_eq!(query[1], ("client".to_owned(), "rust".to_owned()));
        assert_eq!(query[3], ("flash".to_owned(), "false".to_owned()));
    }

    #[test]
    fn endpoint_switches_scheme_and_port_for_tls() {
        let factory = WebSocketStrategyFactory::new("127.0.0.1").with_ports(6001, 6002);

        let url = factory.endpoint(&options(true)).unwrap();

        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.port(), Some(6002));
    }

    #[test]
    fn invalid_host_is_unsupported() {
        let factory = WebSocketStrategyFactory::new("not a host");

        assert!(factory.endpoint(&options(false)).is_err());
        assert!(!factory.strategy(&options(false)).is_supported());
        assert!(
            WebSocketStrategyFactory::new("localhost")
                .strategy(&options(false))
                .is_supported()
        );
    }

    #[test]
    fn close_frames_map_to_close_events() {
        let event = close_event(Some(CloseFrame {
            code: CloseCode::from(4201),
            reason: "over capacity".into(),
        }));
        assert_eq!(event, CloseEvent::new(4201, Some("over capacity".to_owned())));

        let event = close_event(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        assert_eq!(event, CloseEvent::new(1000, None));

        assert_eq!(close_event(None).code, NO_STATUS_RECEIVED);
    }
}
