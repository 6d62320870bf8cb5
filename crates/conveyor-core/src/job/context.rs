use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// Context handed to a job while it executes.
///
/// The cancellation token is a child of the executing worker's token, so it
/// fires when the worker or the whole dispatcher is stopped. Jobs that can run
/// for a long time should watch it and return early.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID as reported by the job.
    pub job_id: String,
    /// Service the job was routed through.
    pub service: String,
    /// ID of the worker executing the job (1-based within its service).
    pub worker_id: usize,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(
        job_id: impl Into<String>,
        service: impl Into<String>,
        worker_id: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            service: service.into(),
            worker_id,
            started_at: Utc::now(),
            cancel,
        }
    }

    /// Context that is never cancelled, for running a job outside a worker.
    pub fn detached(job_id: impl Into<String>, service: impl Into<String>) -> Self {
        Self::new(job_id, service, 0, CancellationToken::new())
    }

    /// Check whether shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until shutdown is requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Get the cancellation token for handing to nested tasks.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time since execution started.
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_context_creation() {
        let ctx = JobContext::new("job-1", "email", 2, CancellationToken::new());
        assert_eq!(ctx.job_id, "job-1");
        assert_eq!(ctx.service, "email");
        assert_eq!(ctx.worker_id, 2);
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_cancellation_follows_parent() {
        let parent = CancellationToken::new();
        let ctx = JobContext::new("job-1", "email", 1, parent.child_token());

        parent.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves() {
        let ctx = JobContext::detached("job-1", "email");
        let token = ctx.cancellation_token().clone();

        let waiter = tokio::spawn(async move { ctx.cancelled().await });
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
    }
}
