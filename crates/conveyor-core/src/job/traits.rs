use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::context::JobContext;

/// A unit of work routed to a service queue and run by one of its workers.
///
/// Implementations are immutable once constructed. Ownership moves from the
/// producer into the queue and then to the worker that dequeues the job; the
/// job is dropped as soon as `execute` returns.
pub trait Job: Send + Sync + 'static {
    /// Caller-assigned identifier used for logging and correlation.
    ///
    /// Uniqueness is not enforced.
    fn id(&self) -> &str;

    /// Routing key; must match a registered service name.
    fn service(&self) -> &str;

    /// Run the job to completion or failure.
    ///
    /// Errors are logged by the worker and discarded. They never reach the
    /// producer that dispatched the job.
    fn execute<'a>(&'a self, ctx: &'a JobContext) -> BoxFuture<'a, Result<()>>;
}

/// Boxed job as it travels through a queue.
pub type BoxedJob = Box<dyn Job>;

impl fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id())
            .field("service", &self.service())
            .finish()
    }
}

type JobHandler = Arc<dyn Fn(JobContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A job backed by a closure.
///
/// ```ignore
/// let job = FnJob::new("job-1", "email", |ctx| async move {
///     tracing::info!(job_id = %ctx.job_id, "sending");
///     Ok(())
/// });
/// dispatcher.dispatch(job).await?;
/// ```
#[derive(Clone)]
pub struct FnJob {
    id: String,
    service: String,
    handler: JobHandler,
}

impl FnJob {
    /// Create a job that runs `handler` when executed.
    pub fn new<F, Fut>(id: impl Into<String>, service: impl Into<String>, handler: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            service: service.into(),
            handler: Arc::new(move |ctx| Box::pin(handler(ctx))),
        }
    }

}

impl fmt::Debug for FnJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob")
            .field("id", &self.id)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl Job for FnJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn service(&self) -> &str {
        &self.service
    }

    fn execute<'a>(&'a self, ctx: &'a JobContext) -> BoxFuture<'a, Result<()>> {
        (self.handler)(ctx.clone())
    }
}

/// Identity and payload shared by job implementations.
///
/// Embed this in a job struct and delegate `id`/`service` to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Job ID.
    pub id: String,
    /// Target service.
    pub service: String,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// Opaque job payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl JobMetadata {
    /// Create metadata with an empty payload.
    pub fn new(id: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            created_at: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    /// Create metadata with a generated ID.
    pub fn generated(service: impl Into<String>) -> Self {
        Self::new(new_job_id(), service)
    }

    /// Attach a payload.
    pub fn with_payload<T: Serialize>(mut self, payload: T) -> Result<Self> {
        self.payload = serde_json::to_value(payload)?;
        Ok(self)
    }
}

/// Generate a random job ID.
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
