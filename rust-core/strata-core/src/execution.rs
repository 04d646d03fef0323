//! # Execution Context
//!
//! Request-scoped cancellation and deadline handle.
//!
//! Every request owns exactly one [`ExecutionContext`]. The server cancels it
//! when the connection goes away and attaches a deadline when a request
//! timeout is configured. Handlers, middleware and database helpers pass it
//! to [`ExecutionContext::run`] so long operations stop early.

use crate::error::ExecutionError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::background()
    }
}

impl ExecutionContext {
    /// A context that is never cancelled and has no deadline
    #[must_use]
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Wrap an existing cancellation token
    #[must_use]
    pub const fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Attach a deadline, keeping the earlier one if already set
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Attach a deadline `timeout` from now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context cancelled together with this one
    ///
    /// Cancelling the child does not cancel the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// The underlying cancellation token
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if one is attached
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Signal cancellation
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was signalled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the deadline has elapsed
    #[must_use]
    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The reason this context is done, or `None` while it is live
    #[must_use]
    pub fn err(&self) -> Option<ExecutionError> {
        if self.is_cancelled() {
            Some(ExecutionError::Cancelled)
        } else if self.deadline_exceeded() {
            Some(ExecutionError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Drive `fut` until it completes, the token is cancelled or the deadline passes
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Cancelled` or `ExecutionError::DeadlineExceeded`
    /// when the future is abandoned.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ExecutionError> {
        if let Some(err) = self.err() {
            return Err(err);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(ExecutionError::Cancelled),
            () = deadline => Err(ExecutionError::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }
}
