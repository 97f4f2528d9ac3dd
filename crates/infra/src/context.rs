//! Request-scoped cancellation and deadline.
//!
//! Every public operation takes an [`OperationContext`]. External calls that
//! belong to one operation run through the same context, so a single deadline
//! bounds the whole chain (e.g. register resource + grant owner).

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::authz_service::AuthzServiceError;

/// Why a context stopped a future before it completed.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum Interrupted {
    #[error("deadline exceeded")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,
}

impl From<Interrupted> for AuthzServiceError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::Timeout => Self::Timeout,
            Interrupted::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OperationContext {
    /// No deadline; only explicit cancellation stops it.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derive a context that is cancelled with `self` and whose deadline is
    /// the earlier of the parent's and `now + timeout`.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(match self.deadline {
                Some(parent) => parent.min(candidate),
                None => candidate,
            }),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Race `fut` against cancellation and the deadline.
    ///
    /// An already-cancelled or expired context returns without polling `fut`.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        // A past deadline's sleep is not ready until the timer wheel ticks.
        if self.is_expired() {
            return Err(Interrupted::Timeout);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => Err(Interrupted::Timeout),
            out = fut => Ok(out),
        }
    }

    /// [`run`](Self::run) for fallible futures, folding interruption into the
    /// future's own error type.
    pub async fn try_run<T, E, F>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<Interrupted>,
    {
        self.run(fut).await.map_err(E::from)?
    }
}
