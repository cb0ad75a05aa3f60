//! Connect to a Pusher Channels application and print lifecycle events.
//!
//! Run with tracing enabled:
//! ```sh
//! PUSHER_KEY=your-app-key PUSHER_HOST=ws-eu.pusher.com \
//!     RUST_LOG=info cargo run --example connect --features tracing
//! ```

use std::time::Duration;

use futures::StreamExt as _;
use pusher_client_sdk::ws::config::{Collaborators, Config};
use pusher_client_sdk::ws::socket::WebSocketStrategyFactory;
use pusher_client_sdk::ws::{ConnectionEvent, ConnectionManager};
use tokio::time::timeout;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let key = std::env::var("PUSHER_KEY")?;
    let host = std::env::var("PUSHER_HOST").unwrap_or_else(|_| "ws-mt1.pusher.com".to_owned());

    let config = Config::builder().use_tls(true).build();
    let manager = ConnectionManager::new(
        key,
        config,
        Collaborators::new(WebSocketStrategyFactory::new(host)),
    )?;

    let mut events = Box::pin(manager.events());
    manager.connect();

    while let Ok(Some(event)) = timeout(Duration::from_secs(30), events.next()).await {
        match event? {
            ConnectionEvent::StateChange { previous, current } => {
                info!(%previous, %current, "state change");
            }
            ConnectionEvent::Connected { socket_id } => {
                info!(%socket_id, "connected");
                manager.send_event("pusher:ping", &serde_json::json!({}), None)?;
            }
            ConnectionEvent::Error(error) => warn!(kind = %error.kind, error = %error.error),
            ConnectionEvent::Message(envelope) => {
                info!(event = %envelope.event, channel = ?envelope.channel, data = %envelope.data);
            }
            ConnectionEvent::ConnectingIn { seconds } => info!(seconds, "reconnecting"),
            other => info!(event = other.name()),
        }
    }

    manager.disconnect();
    info!(state = %manager.state(), "done");

    Ok(())
}
