#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;

use super::timer::TokioScheduler;
use super::traits::{DiagnosticSink, LogDiagnostics, Scheduler, StrategyFactory};
use crate::Result;
use crate::error::Error;

const DEFAULT_ACTIVITY_TIMEOUT_DURATION: Duration = Duration::from_secs(120);
const DEFAULT_PONG_TIMEOUT_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_UNAVAILABLE_TIMEOUT_DURATION: Duration = Duration::from_secs(10);

/// Delay used by the `Backoff` policy and after an unexpected close.
pub const BACKOFF_DELAY: Duration = Duration::from_secs(1);

/// Configuration for connection manager behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Silence after which the client sends a ping. The effective value is the
    /// minimum of this, the server's handshake value and the transport's own limit.
    #[builder(default = DEFAULT_ACTIVITY_TIMEOUT_DURATION)]
    pub activity_timeout: Duration,
    /// Maximum time to wait for any sign of life after a ping
    #[builder(default = DEFAULT_PONG_TIMEOUT_DURATION)]
    pub pong_timeout: Duration,
    /// Time spent connecting before the state becomes `unavailable`
    #[builder(default = DEFAULT_UNAVAILABLE_TIMEOUT_DURATION)]
    pub unavailable_timeout: Duration,
    /// Start with encrypted transports
    #[builder(default)]
    pub use_tls: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            activity_timeout: DEFAULT_ACTIVITY_TIMEOUT_DURATION,
            pong_timeout: DEFAULT_PONG_TIMEOUT_DURATION,
            unavailable_timeout: DEFAULT_UNAVAILABLE_TIMEOUT_DURATION,
            use_tls: false,
        }
    }
}

impl Config {
    /// Reject timeouts that would make the timers fire immediately.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("activity_timeout", self.activity_timeout),
            ("pong_timeout", self.pong_timeout),
            ("unavailable_timeout", self.unavailable_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::validation(format!("{name} must be greater than zero")));
            }
        }

        Ok(())
    }
}

/// Injected collaborators of the connection manager.
#[non_exhaustive]
#[derive(Clone)]
pub struct Collaborators {
    /// Builds the strategy; called again whenever encryption is forced on
    pub strategy: Arc<dyn StrategyFactory>,
    pub scheduler: Arc<dyn Scheduler>,
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl Collaborators {
    /// Use `strategy` with the tokio scheduler and tracing-backed diagnostics.
    #[must_use]
    pub fn new<F: StrategyFactory>(strategy: F) -> Self {
        Self {
            strategy: Arc::new(strategy),
            scheduler: Arc::new(TokioScheduler),
            diagnostics: Arc::new(LogDiagnostics),
        }
    }

    #[must_use]
    pub fn with_scheduler<S: Scheduler>(mut self, scheduler: S) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    #[must_use]
    pub fn with_diagnostics<D: DiagnosticSink>(mut self, diagnostics: D) -> Self {
        self.diagnostics = Arc::new(diagnostics);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts() {
        let config = Config::default();

        assert_eq!(config.activity_timeout, Duration::from_secs(120));
        assert_eq!(config.pong_timeout, Duration::from_secs(30));
        assert_eq!(config.unavailable_timeout, Duration::from_secs(10));
        assert!(!config.use_tls);
    }

    #[test]
    fn builder_fills_defaults() {
        let config = Config::builder()
            .pong_timeout(Duration::from_secs(5))
            .use_tls(true)
            .build();

        assert_eq!(config.activity_timeout, Duration::from_secs(120));
        assert_eq!(config.pong_timeout, Duration::from_secs(5));
        assert!(config.use_tls);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = Config::builder()
            .unavailable_timeout(Duration::ZERO)
            .build();

        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("unavailable_timeout"));
    }
}
