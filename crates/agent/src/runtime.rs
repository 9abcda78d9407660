//! Per-run activation record.

use std::future::Future;
use std::time::Duration;

use gamefi_core::{AppError, AppResult};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// State shared by every stage of one orchestration run.
///
/// Cloning is cheap; clones share the cancellation token.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    model: String,
    search_limit: usize,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(
        model: impl Into<String>,
        search_limit: usize,
        call_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            model: model.into(),
            search_limit,
            call_timeout,
            cancel,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one model or store call under the per-call deadline and the
    /// run's cancellation token.
    pub async fn guard<T, F>(&self, what: &str, call: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled(format!("{} not started", what)));
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(AppError::Cancelled(format!("{} interrupted", what)))
            }
            result = tokio::time::timeout(self.call_timeout, call) => match result {
                Ok(inner) => inner,
                Err(_) => Err(AppError::Timeout(format!(
                    "{} exceeded {}s",
                    what,
                    self.call_timeout.as_secs()
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(timeout: Duration) -> (RunContext, CancellationToken) {
        let token = CancellationToken::new();
        (RunContext::new("llama3", 5, timeout, token.clone()), token)
    }

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let (ctx, _) = context(Duration::from_secs(1));
        let value = ctx.guard("add", async { Ok::<_, AppError>(2 + 2) }).await.unwrap();
        assert_eq!(value, 4);

        let err = ctx
            .guard("fail", async { Err::<(), _>(AppError::Store("down".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[tokio::test]
    async fn test_guard_times_out() {
        let (ctx, _) = context(Duration::from_millis(20));
        let err = ctx
            .guard("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AppError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_guard_observes_cancellation() {
        let (ctx, token) = context(Duration::from_secs(5));
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = ctx
            .guard("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AppError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
        assert!(ctx.is_cancelled());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_guard_refuses_after_cancel() {
        let (ctx, token) = context(Duration::from_secs(5));
        token.cancel();
        let err = ctx.guard("noop", async { Ok::<_, AppError>(()) }).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
    }
}
