use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::sleep;

use super::traits::{Scheduler, TimerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Unavailable,
    Activity(ActivityPhase),
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActivityPhase {
    /// Waiting for silence before sending a ping
    Idle,
    /// Ping sent, waiting for any sign of life
    AwaitPong,
}

/// Scheduler backed by `tokio::time`. Requires a running tokio runtime.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(
        &self,
        delay: Duration,
        callback: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn TimerHandle> {
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            callback();
        });

        Box::new(TokioTimer(handle.abort_handle()))
    }
}

struct TokioTimer(AbortHandle);

impl TimerHandle for TokioTimer {
    fn cancel(&mut self) {
        self.0.abort();
    }
}

struct Armed {
    token: u64,
    handle: Box<dyn TimerHandle>,
}

/// A slot holding at most one armed one-shot timer.
///
/// The token identifies the armed timer so that a firing which raced with a
/// cancellation or re-arm can be recognised and dropped.
#[derive(Default)]
pub(crate) struct Timer {
    armed: Option<Armed>,
}

impl Timer {
    /// Arm the slot, cancelling whatever it held before.
    pub(crate) fn arm(
        &mut self,
        scheduler: &dyn Scheduler,
        delay: Duration,
        token: u64,
        callback: Box<dyn FnOnce() + Send>,
    ) {
        self.cancel();
        let handle = scheduler.schedule(delay, callback);
        self.armed = Some(Armed { token, handle });
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(mut armed) = self.armed.take() {
            armed.handle.cancel();
        }
    }

    /// Disarm the slot if `token` is the currently armed timer.
    ///
    /// Returns `false` for a firing that was superseded.
    pub(crate) fn fire(&mut self, token: u64) -> bool {
        if self.armed.as_ref().is_some_and(|armed| armed.token == token) {
            self.armed = None;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}
