//! Per-call deadline and cancellation.
//!
//! A [`CallContext`] travels with every commit. It is checked before any
//! I/O starts and raced against the in-flight work afterwards, so a
//! cancelled or expired call returns promptly instead of waiting on the
//! network.

use std::future::Future;
use std::time::Duration;

use kestrel_core::{CommitError, CommitResult};
use tokio::sync::watch;
use tokio::time::Instant;

/// Deadline and cancellation signal for one call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every context created from the same [`CallContext::cancellable`]
/// call.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CallContext {
    /// A context with no deadline that is never cancelled.
    ///
    /// The client's configured request timeout still bounds the call.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Makes the context cancellable and returns the handle that cancels it.
    #[must_use]
    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(rx);
        (self, CancelHandle { tx })
    }

    /// Returns the deadline, if one is set.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true if the context has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Fails fast if the context is already done.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if cancellation was signalled, otherwise
    /// `DeadlineExceeded` if the deadline has passed.
    pub fn check(&self) -> CommitResult<()> {
        if self.is_cancelled() {
            return Err(CommitError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(CommitError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Runs `work` until it finishes, the context is cancelled, or the
    /// deadline passes. `default_timeout` applies when no deadline is set.
    ///
    /// Whichever fires first wins; the losing future is dropped.
    ///
    /// # Errors
    ///
    /// Returns the error from `work`, `Cancelled`, or `DeadlineExceeded`.
    pub async fn run<T, F>(&self, default_timeout: Duration, work: F) -> CommitResult<T>
    where
        F: Future<Output = CommitResult<T>>,
    {
        let deadline = self
            .deadline
            .unwrap_or_else(|| Instant::now() + default_timeout);

        tokio::select! {
            biased;
            () = self.cancelled() => Err(CommitError::Cancelled),
            () = tokio::time::sleep_until(deadline) => Err(CommitError::DeadlineExceeded),
            result = work => result,
        }
    }

    /// Resolves when cancellation is signalled. Never resolves otherwise.
    async fn cancelled(&self) {
        if let Some(rx) = &self.cancel {
            let mut rx = rx.clone();
            if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        // No handle, or the handle was dropped without cancelling.
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_live() {
        let ctx = CallContext::background();
        assert!(ctx.check().is_ok());
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let (ctx, handle) = CallContext::background().cancellable();
        let clone = ctx.clone();

        handle.cancel();
        handle.cancel();

        assert!(handle.is_cancelled());
        assert_eq!(ctx.check(), Err(CommitError::Cancelled));
        assert_eq!(clone.check(), Err(CommitError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(10));
        assert!(ctx.check().is_ok());

        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(ctx.check(), Err(CommitError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = CallContext::background();
        let result = ctx.run(Duration::from_secs(5), async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_hits_deadline() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(50));
        let result: CommitResult<()> = ctx
            .run(Duration::from_secs(60), std::future::pending())
            .await;
        assert_eq!(result, Err(CommitError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_uses_default_timeout() {
        let ctx = CallContext::background();
        let start = Instant::now();
        let result: CommitResult<()> = ctx
            .run(Duration::from_secs(3), std::future::pending())
            .await;
        assert_eq!(result, Err(CommitError::DeadlineExceeded));
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_run_cancelled_mid_flight() {
        let (ctx, handle) = CallContext::background().cancellable();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let result: CommitResult<()> = ctx
            .run(Duration::from_secs(60), std::future::pending())
            .await;
        assert_eq!(result, Err(CommitError::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = CallContext::background().cancellable();
        drop(handle);

        let result = ctx
            .run(Duration::from_secs(5), async {
                tokio::task::yield_now().await;
                Ok("done")
            })
            .await;
        assert_eq!(result, Ok("done"));
    }
}
