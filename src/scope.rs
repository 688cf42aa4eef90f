use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Why a scope stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    DeadlineExceeded,
}

/// Cancellable execution scope shared by everything one invocation spawns.
///
/// Cloning shares the same cancellation state. `child()` derives a scope that
/// is cancelled together with its parent but can also be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct ExecutionScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecutionScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Child scope inheriting this scope's deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Child scope whose deadline is the earlier of the inherited one and `now + timeout`.
    pub fn child_with_timeout(&self, timeout: Option<Duration>) -> Self {
        let mut child = self.child();
        if let Some(timeout) = timeout {
            let candidate = Instant::now() + timeout;
            child.deadline = Some(match child.deadline {
                Some(inherited) => inherited.min(candidate),
                None => candidate,
            });
        }
        child
    }

    /// Idempotent.
    #[inline]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Completes once the scope is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Cancelled, or past its deadline.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Completes once the scope is cancelled or its deadline elapses, whichever is first.
    pub async fn stopped(&self) -> StopReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => self.stop_reason(),
                    _ = tokio::time::sleep_until(deadline) => StopReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                StopReason::Cancelled
            }
        }
    }

    // A token cancelled once the deadline has passed counts as the deadline.
    pub(crate) fn stop_reason(&self) -> StopReason {
        if self.is_expired() {
            StopReason::DeadlineExceeded
        } else {
            StopReason::Cancelled
        }
    }

    /// Cancels the token when the deadline elapses, so everything waiting on
    /// `cancelled()` sees the deadline too. Returns early if cancelled first.
    pub(crate) async fn cancel_at_deadline(self) {
        let Some(deadline) = self.deadline else {
            return;
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep_until(deadline) => self.token.cancel(),
        }
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Guard that cancels this scope when dropped.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}

impl From<CancellationToken> for ExecutionScope {
    fn from(token: CancellationToken) -> Self {
        Self::from_token(token)
    }
}
