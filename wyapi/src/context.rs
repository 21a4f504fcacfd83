//! Per-request cancellation and deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{GatewayError, Result};

/// Carries the cancellation signal and optional deadline of one logical
/// request. Cloning shares the same token, so cancelling any clone cancels
/// them all.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that times out `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Attach an externally owned token, e.g. one tied to a client connection.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drive `fut` to completion unless the context is cancelled or its
    /// deadline passes first. The losing future is dropped, which aborts any
    /// in-flight HTTP exchange it owns.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(GatewayError::Cancelled),
            () = sleep_until(self.deadline) => Err(GatewayError::TimedOut),
            res = fut => res,
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_when_untouched() {
        let ctx = RequestContext::new();
        let out = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let ctx = RequestContext::new();
        ctx.clone().cancel();
        assert!(ctx.is_cancelled());
        let res: Result<()> = ctx.run(std::future::pending()).await;
        assert!(matches!(res, Err(GatewayError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_elapses() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let res: Result<()> = ctx.run(std::future::pending()).await;
        assert!(matches!(res, Err(GatewayError::TimedOut)));
    }

    #[tokio::test]
    async fn errors_from_the_future_pass_through() {
        let ctx = RequestContext::new();
        let res: Result<()> = ctx
            .run(async { Err(GatewayError::InvalidInput("x".into())) })
            .await;
        assert!(matches!(res, Err(GatewayError::InvalidInput(_))));
    }
}
