//! Cancellation and deadlines for driver operations.
//!
//! A [`RunContext`] is cancelled either explicitly or by its deadline passing,
//! and remembers which of the two happened first. Child contexts created
//! with [`RunContext::with_timeout`] are cancelled with their parent.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`RunContext`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interruption {
    /// [`RunContext::cancel`] was called on the context or an ancestor
    Cancelled,
    /// The context's deadline passed
    DeadlineExceeded,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interruption::Cancelled => f.write_str("cancelled"),
            Interruption::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Cancellable scope with an optional deadline.
#[derive(Clone)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    cause: Arc<OnceLock<Interruption>>,
    parent: Option<Box<RunContext>>,
}

impl RunContext {
    /// A root context: no deadline, cancelled only explicitly.
    pub fn background() -> Self {
        RunContext {
            token: CancellationToken::new(),
            deadline: None,
            cause: Arc::new(OnceLock::new()),
            parent: None,
        }
    }

    /// A child context that expires after `timeout`, or earlier if this
    /// context does.
    ///
    /// A timeout too large to represent as an instant sets no deadline of
    /// its own.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        RunContext {
            token: self.token.child_token(),
            deadline,
            cause: Arc::new(OnceLock::new()),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        let _ = self.cause.set(Interruption::Cancelled);
        self.token.cancel();
    }

    /// Why this context stopped, or `None` while it is still live.
    ///
    /// The first cause wins: a context cancelled before its deadline keeps
    /// reporting [`Interruption::Cancelled`] after the deadline passes.
    pub fn err(&self) -> Option<Interruption> {
        if let Some(cause) = self.cause.get() {
            return Some(*cause);
        }
        if let Some(cause) = self.parent.as_ref().and_then(|parent| parent.err()) {
            return Some(cause);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(self.expire());
        }
        if self.token.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        None
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolve when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Interruption {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        self.expire();
                    }
                }
            }
            None => self.token.cancelled().await,
        }
        self.err().unwrap_or(Interruption::Cancelled)
    }

    fn expire(&self) -> Interruption {
        let _ = self.cause.set(Interruption::DeadlineExceeded);
        self.token.cancel();
        *self.cause.get().unwrap_or(&Interruption::DeadlineExceeded)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("deadline", &self.deadline)
            .field("err", &self.err())
            .finish()
    }
}
