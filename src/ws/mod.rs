//! Connection lifecycle management.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: public handle; owns a background task driving the state machine
//! - [`traits`]: collaborator seams (strategy, transport, scheduler, diagnostics)
//! - [`socket`]: default WebSocket strategy and transport
//! - [`ConnectionEvent`]: everything the manager publishes
//!
//! # Example
//!
//! ```no_run
//! use pusher_client_sdk::ws::config::{Collaborators, Config};
//! use pusher_client_sdk::ws::socket::WebSocketStrategyFactory;
//! use pusher_client_sdk::ws::{ConnectionManager, Reachability};
//!
//! # async fn run() -> pusher_client_sdk::Result<()> {
//! let collaborators = Collaborators::new(WebSocketStrategyFactory::new("ws-eu.pusher.com"));
//! let manager = ConnectionManager::new("app-key", Config::default(), collaborators)?;
//!
//! manager.connect();
//! manager.notify_reachability(Reachability::Online);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod input;
pub(crate) mod machine;
pub mod socket;
pub mod timer;
pub mod traits;

pub use connection::{ConnectionManager, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use events::{ConnectionEvent, Diagnostic, ErrorEvent, ErrorKind, Reachability};
pub use input::{AttemptCallback, Handshake, TransportListener};
pub use timer::TokioScheduler;
pub use traits::*;
