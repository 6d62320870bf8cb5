use std::time::Duration;

use futures::future::BoxFuture;

use conveyor_core::error::{ConveyorError, Result};
use conveyor_core::job::{Job, JobContext, JobMetadata};

/// Sample job for the `email` service.
///
/// Logs, pretends to work for a while and succeeds. Shutdown interrupts
/// the wait and the job reports failure.
#[derive(Debug, Clone)]
pub struct ExampleJob {
    meta: JobMetadata,
    duration: Duration,
}

impl ExampleJob {
    pub const SERVICE: &'static str = "email";
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(1);

    pub fn new(id: impl Into<String>) -> Self {
        Self {
            meta: JobMetadata::new(id, Self::SERVICE),
            duration: Self::DEFAULT_DURATION,
        }
    }

    /// How long the job works before succeeding.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Attach the recipient as the job payload.
    pub fn with_recipient(mut self, to: &str) -> Result<Self> {
        self.meta = self.meta.with_payload(serde_json::json!({ "to": to }))?;
        Ok(self)
    }

    pub fn metadata(&self) -> &JobMetadata {
        &self.meta
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Job for ExampleJob {
    fn id(&self) -> &str {
        &self.meta.id
    }

    fn service(&self) -> &str {
        &self.meta.service
    }

    fn execute<'a>(&'a self, ctx: &'a JobContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tracing::info!(
                job_id = %self.meta.id,
                worker_id = ctx.worker_id,
                payload = %self.meta.payload,
                "Executing example job"
            );

            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    tracing::warn!(job_id = %self.meta.id, "Example job interrupted");
                    Err(ConveyorError::job("interrupted by shutdown"))
                }
                _ = tokio::time::sleep(self.duration) => {
                    tracing::info!(job_id = %self.meta.id, "Example job done");
                    Ok(())
                }
            }
        })
    }
}
