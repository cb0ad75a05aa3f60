#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Error reported by a custom transport
    Transport(Box<dyn StdError + Send + Sync + 'static>),
    /// The connection manager has shut down
    ConnectionClosed,
    /// No connection is currently adopted
    NotConnected,
    /// Event subscriber lagged and missed events
    Lagged {
        /// Number of events that were missed
        count: u64,
    },
}

impl WsError {
    /// Wrap an error raised by a transport implementation.
    pub fn transport<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::Transport(Box::new(error))
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection manager is closed"),
            Self::NotConnected => write!(f, "Not connected"),
            Self::Lagged { count } => write!(f, "Event subscriber lagged, missed {count} events"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Transport(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
