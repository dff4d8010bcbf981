use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::client::FetchError;

/// Cancellation scope for an upstream call: an explicit cancel token plus an
/// optional deadline. Cloning shares the token.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never canceled unless `cancel` is called.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The reason this context is finished, if it is.
    pub fn err(&self) -> Option<FetchError> {
        if self.token.is_cancelled() {
            return Some(FetchError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(FetchError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline passes.
    pub async fn done(&self) -> FetchError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => FetchError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => FetchError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                FetchError::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_live() {
        assert!(CallContext::background().err().is_none());
    }

    #[test]
    fn cancel_is_shared_by_clones() {
        let ctx = CallContext::background();
        let clone = ctx.clone();
        clone.cancel();
        assert!(matches!(ctx.err(), Some(FetchError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        assert!(ctx.err().is_none());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(matches!(ctx.err(), Some(FetchError::DeadlineExceeded)));
        assert!(matches!(ctx.done().await, FetchError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn done_resolves_on_cancel() {
        let ctx = CallContext::background();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.done().await });
        ctx.cancel();
        assert!(matches!(handle.await.unwrap(), FetchError::Cancelled));
    }
}
