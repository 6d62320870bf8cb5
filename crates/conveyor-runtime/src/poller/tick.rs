use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use conveyor_core::job::{BoxedJob, FnJob, Job};

/// Replaceable per-tick behavior.
pub type TickHandler = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

/// Predicate checked by the default tick before dispatching.
pub type Condition = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// Builds the job the default tick dispatches.
pub type JobFactory = Arc<dyn Fn() -> BoxedJob + Send + Sync>;

pub(crate) fn boxed_tick_handler<F, Fut>(f: F) -> TickHandler
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |token| Box::pin(f(token)))
}

pub(crate) fn boxed_condition<F, Fut>(f: F) -> Condition
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

pub(crate) fn boxed_job_factory<F, J>(f: F) -> JobFactory
where
    F: Fn() -> J + Send + Sync + 'static,
    J: Job,
{
    Arc::new(move || Box::new(f()) as BoxedJob)
}

/// Condition that always holds.
pub(crate) fn always() -> Condition {
    boxed_condition(|| async { true })
}

/// Factory producing a job that only logs its execution.
pub(crate) fn logging_job_factory(job_id: String, service: String) -> JobFactory {
    boxed_job_factory(move || {
        FnJob::new(job_id.clone(), service.clone(), |ctx| async move {
            tracing::info!(
                job_id = %ctx.job_id,
                service = %ctx.service,
                worker_id = ctx.worker_id,
                "Poller job executed"
            );
            Ok(())
        })
    })
}
