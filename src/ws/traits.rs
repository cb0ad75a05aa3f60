//! Collaborator seams of the connection manager.
//!
//! The manager never talks to sockets, clocks or the network stack directly. It
//! asks a [`Strategy`] for connection attempts, adopts the [`Transport`] a
//! successful attempt hands back, arms timers through a [`Scheduler`] and records
//! diagnostics through a [`DiagnosticSink`]. Callbacks flow back through the
//! [`AttemptCallback`] and [`TransportListener`] handles, which only enqueue
//! work for the manager and never run its logic inline.

use std::time::Duration;

use super::events::Diagnostic;
use super::input::{AttemptCallback, TransportListener};

/// One-shot timer scheduling.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `callback` once after `delay`.
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>)
    -> Box<dyn TimerHandle>;
}

/// A scheduled timer.
pub trait TimerHandle: Send {
    /// Prevent the callback from running. Must be safe to call more than once,
    /// and after the timer has already fired.
    fn cancel(&mut self);
}

/// Parameters a [`StrategyFactory`] builds a strategy for.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyOptions {
    /// Application key
    pub key: String,
    /// Whether only encrypted transports may be used
    pub use_tls: bool,
}

/// Builds the active [`Strategy`]. Called at startup and again whenever the
/// server demands encryption.
pub trait StrategyFactory: Send + Sync + 'static {
    fn strategy(&self, options: &StrategyOptions) -> Box<dyn Strategy>;
}

/// Selects and sequences transport attempts.
pub trait Strategy: Send {
    /// Whether any transport of this strategy can run in the current environment.
    fn is_supported(&self) -> bool;

    /// Start trying to open a transport.
    ///
    /// The attempt reports through `callback`: an error when no handshake message
    /// could be received, the close event when the server closed first, or the
    /// opened transport together with its first message.
    fn connect(&self, min_priority: u32, callback: AttemptCallback) -> Box<dyn Attempt>;
}

/// An in-flight connection attempt.
pub trait Attempt: Send {
    /// Stop trying new transports. Sockets that were already handed over are not closed.
    fn abort(&mut self);
}

/// An open transport adopted by the manager after a successful handshake.
pub trait Transport: Send {
    /// Route message, activity, error and close notifications to `listener`.
    fn bind(&mut self, listener: TransportListener);

    /// Stop routing notifications.
    fn unbind(&mut self);

    /// Send one raw frame. Returns `false` if the frame could not be queued.
    fn send(&mut self, raw: &str) -> bool;

    /// Whether [`Transport::ping`] sends a native ping frame.
    fn supports_ping(&self) -> bool {
        false
    }

    fn ping(&mut self) {}

    fn close(&mut self);

    /// Whether the transport detects dead peers itself, making client pings unnecessary.
    fn handles_activity_checks(&self) -> bool {
        false
    }

    /// Idle limit imposed by the transport itself.
    fn activity_timeout(&self) -> Option<Duration> {
        None
    }
}

/// Structured, non-behavioral diagnostics.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn info(&self, record: &Diagnostic);
    fn error(&self, record: &Diagnostic);
}

/// Default sink: forwards records to `tracing` when the `tracing` feature is enabled.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDiagnostics;

impl DiagnosticSink for LogDiagnostics {
    fn info(&self, record: &Diagnostic) {
        #[cfg(feature = "tracing")]
        tracing::info!(?record, "connection diagnostic");
        #[cfg(not(feature = "tracing"))]
        let _ = record;
    }

    fn error(&self, record: &Diagnostic) {
        #[cfg(feature = "tracing")]
        tracing::error!(?record, "connection diagnostic");
        #[cfg(not(feature = "tracing"))]
        let _ = record;
    }
}
