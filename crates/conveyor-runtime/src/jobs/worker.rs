use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_channel::Receiver;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use conveyor_core::error::{ConveyorError, Result};
use conveyor_core::job::{BoxedJob, JobContext};

use super::queue::{Delivery, JobQueue};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, loop not launched.
    Created,
    /// Loop running.
    Running,
    /// Loop cancelled or finished. Terminal.
    Stopped,
}

#[derive(Debug, Default)]
struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    busy: AtomicBool,
}

struct WorkerRuntime {
    state: WorkerState,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Sequential consumer bound to one service queue.
///
/// Each worker owns exactly one background task once started. Jobs are
/// executed one at a time; a failing or panicking job is logged and the
/// worker moves on to the next one.
pub struct Worker {
    id: usize,
    service: String,
    receiver: Receiver<Delivery>,
    stats: Arc<WorkerStats>,
    runtime: Mutex<WorkerRuntime>,
}

impl Worker {
    /// Create a worker consuming from `queue`.
    pub fn new(id: usize, queue: &JobQueue) -> Self {
        Self {
            id,
            service: queue.service().to_string(),
            receiver: queue.receiver(),
            stats: Arc::new(WorkerStats::default()),
            runtime: Mutex::new(WorkerRuntime {
                state: WorkerState::Created,
                cancel: None,
                task: None,
            }),
        }
    }

    /// Worker ID, 1-based within its service.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Service whose queue this worker consumes.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        let runtime = self.lock();
        match (&runtime.state, &runtime.task) {
            (WorkerState::Running, Some(task)) if task.is_finished() => WorkerState::Stopped,
            (state, _) => *state,
        }
    }

    /// Jobs handled so far, successful or not.
    pub fn jobs_processed(&self) -> u64 {
        self.stats.processed.load(Ordering::SeqCst)
    }

    /// Jobs that returned an error or panicked.
    pub fn jobs_failed(&self) -> u64 {
        self.stats.failed.load(Ordering::SeqCst)
    }

    /// Whether a job is executing right now.
    pub fn is_busy(&self) -> bool {
        self.stats.busy.load(Ordering::SeqCst)
    }

    /// Whether there is no loop left to wait for.
    ///
    /// True for a worker that was never started.
    pub fn is_finished(&self) -> bool {
        match &self.lock().task {
            Some(task) => task.is_finished(),
            None => true,
        }
    }

    /// Launch the receive loop under a child of `parent`.
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    /// Starting a running worker does nothing; a stopped worker is never
    /// restarted.
    pub fn start(&self, parent: &CancellationToken) {
        let mut runtime = self.lock();
        match runtime.state {
            WorkerState::Created => {}
            WorkerState::Running => return,
            WorkerState::Stopped => {
                tracing::warn!(
                    worker_id = self.id,
                    service = %self.service,
                    "Ignoring start on a stopped worker"
                );
                return;
            }
        }

        let token = parent.child_token();
        let task = tokio::spawn(run_loop(
            self.id,
            self.service.clone(),
            self.receiver.clone(),
            token.clone(),
            self.stats.clone(),
        ));

        runtime.state = WorkerState::Running;
        runtime.cancel = Some(token);
        runtime.task = Some(task);
    }

    /// Cancel the receive loop.
    ///
    /// A job already executing runs to completion. Calling this before
    /// `start` or more than once does nothing.
    pub fn stop(&self) {
        let mut runtime = self.lock();
        if runtime.state != WorkerState::Running {
            return;
        }
        if let Some(token) = runtime.cancel.as_ref() {
            token.cancel();
        }
        runtime.state = WorkerState::Stopped;
    }

    /// Wait for the loop task to exit.
    ///
    /// Returns immediately if the worker was never started or has already
    /// been joined.
    pub async fn join(&self) {
        let task = self.lock().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(
                    worker_id = self.id,
                    service = %self.service,
                    error = %e,
                    "Worker task ended abnormally"
                );
            }
            self.lock().state = WorkerState::Stopped;
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorkerRuntime> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("state", &self.state())
            .field("processed", &self.jobs_processed())
            .finish()
    }
}

async fn run_loop(
    id: usize,
    service: String,
    receiver: Receiver<Delivery>,
    token: CancellationToken,
    stats: Arc<WorkerStats>,
) {
    tracing::info!(worker_id = id, service = %service, "Worker started");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = receiver.recv() => match received {
                Ok(delivery) => {
                    stats.busy.store(true, Ordering::SeqCst);
                    let result = handle_job(id, delivery.accept(), &token).await;
                    stats.busy.store(false, Ordering::SeqCst);
                    stats.processed.fetch_add(1, Ordering::SeqCst);
                    if result.is_err() {
                        stats.failed.fetch_add(1, Ordering::SeqCst);
                    }
                }
                Err(_) => {
                    tracing::debug!(worker_id = id, service = %service, "Queue closed");
                    break;
                }
            }
        }
    }

    tracing::info!(worker_id = id, service = %service, "Worker stopped");
}

/// Execute one job, logging its outcome.
///
/// Panics inside `execute` are caught here and reported as job errors.
pub(crate) async fn handle_job(
    worker_id: usize,
    job: BoxedJob,
    token: &CancellationToken,
) -> Result<()> {
    let ctx = JobContext::new(job.id(), job.service(), worker_id, token.child_token());

    tracing::info!(
        worker_id,
        job_id = %ctx.job_id,
        service = %ctx.service,
        "Executing job"
    );

    // The call itself sits inside the unwound future so a panic raised
    // before the job's first await is caught as well.
    let result = match AssertUnwindSafe(async { job.execute(&ctx).await })
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(ConveyorError::Job(format!(
            "job panicked: {}",
            panic_message(panic.as_ref())
        ))),
    };

    let elapsed_ms = ctx.elapsed().as_millis() as u64;
    match &result {
        Ok(()) => {
            tracing::info!(
                worker_id,
                job_id = %ctx.job_id,
                service = %ctx.service,
                elapsed_ms,
                "Job completed"
            );
        }
        Err(e) => {
            tracing::error!(
                worker_id,
                job_id = %ctx.job_id,
                service = %ctx.service,
                elapsed_ms,
                error = %e,
                "Job failed"
            );
        }
    }

    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use conveyor_core::job::FnJob;
    use tokio::sync::oneshot;

    use super::*;

    fn signalling_job(id: &str, fail: bool) -> (BoxedJob, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let job = FnJob::new(id, "email", move |_| {
            let tx = tx.lock().unwrap().take();
            async move {
                if let Some(tx) = tx {
                    let _ = tx.send(());
                }
                if fail {
                    Err(ConveyorError::job("fail"))
                } else {
                    Ok(())
                }
            }
        });
        (Box::new(job), rx)
    }

    fn panicking_job(id: &str, message: &'static str) -> BoxedJob {
        Box::new(FnJob::new(id, "email", move |_| async move { explode(message) }))
    }

    fn explode(message: &str) -> Result<()> {
        panic!("{}", message.to_string())
    }

    /// Job whose handler panics before building its future.
    fn eagerly_panicking_job(id: &str, message: &'static str) -> BoxedJob {
        Box::new(FnJob::new(
            id,
            "email",
            move |_| -> std::future::Ready<Result<()>> { panic!("{}", message) },
        ))
    }

    #[tokio::test]
    async fn test_worker_executes_job() {
        let queue = JobQueue::new("email", 1);
        let worker = Worker::new(1, &queue);
        let parent = CancellationToken::new();

        worker.start(&parent);
        assert_eq!(worker.state(), WorkerState::Running);

        let (job, done) = signalling_job("job-1", false);
        queue.push(job).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), done)
            .await
            .expect("job was not executed")
            .unwrap();

        parent.cancel();
        worker.join().await;
        assert_eq!(worker.jobs_processed(), 1);
        assert_eq!(worker.jobs_failed(), 0);
    }

    #[tokio::test]
    async fn test_stop_prevents_execution() {
        let queue = JobQueue::new("email", 1);
        let worker = Worker::new(1, &queue);

        worker.start(&CancellationToken::new());
        worker.stop();
        worker.join().await;
        assert_eq!(worker.state(), WorkerState::Stopped);

        let (job, done) = signalling_job("job-1", false);
        queue.push(job).await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(200), done).await;
        assert!(result.is_err(), "job should not be executed after stop()");
    }

    #[tokio::test]
    async fn test_job_error_does_not_stop_worker() {
        let queue = JobQueue::new("email", 2);
        let worker = Worker::new(1, &queue);
        worker.start(&CancellationToken::new());

        let (failing, first_done) = signalling_job("job-1", true);
        let (ok, second_done) = signalling_job("job-2", false);
        queue.push(failing).await.unwrap();
        queue.push(ok).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), first_done)
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), second_done)
            .await
            .expect("worker should survive a failing job")
            .unwrap();

        worker.stop();
        worker.join().await;
        assert_eq!(worker.jobs_processed(), 2);
        assert_eq!(worker.jobs_failed(), 1);
    }

    #[tokio::test]
    async fn test_panicking_job_is_contained() {
        let queue = JobQueue::new("email", 2);
        let worker = Worker::new(1, &queue);
        worker.start(&CancellationToken::new());

        let panicking = panicking_job("job-1", "malformed job");
        let (ok, done) = signalling_job("job-2", false);
        queue.push(panicking).await.unwrap();
        queue.push(ok).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), done)
            .await
            .expect("worker should survive a panicking job")
            .unwrap();

        worker.stop();
        worker.join().await;
        assert_eq!(worker.jobs_failed(), 1);
    }

    #[tokio::test]
    async fn test_panic_before_first_await_is_contained() {
        let queue = JobQueue::new("email", 2);
        let worker = Worker::new(1, &queue);
        worker.start(&CancellationToken::new());

        let (ok, done) = signalling_job("job-2", false);
        queue
            .push(eagerly_panicking_job("job-1", "malformed job"))
            .await
            .unwrap();
        queue.push(ok).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), done)
            .await
            .expect("worker should survive a job panicking outside its future")
            .unwrap();

        worker.stop();
        worker.join().await;
        assert_eq!(worker.jobs_processed(), 2);
        assert_eq!(worker.jobs_failed(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let queue = JobQueue::new("email", 1);
        let worker = Worker::new(3, &queue);

        worker.stop();
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Created);
        assert_eq!(worker.id(), 3);
        assert_eq!(worker.service(), "email");
    }

    #[tokio::test]
    async fn test_stopped_worker_is_not_restarted() {
        let queue = JobQueue::new("email", 1);
        let worker = Worker::new(1, &queue);
        let parent = CancellationToken::new();

        worker.start(&parent);
        worker.stop();
        worker.join().await;

        worker.start(&parent);
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_worker() {
        let queue = JobQueue::new("email", 1);
        let worker = Worker::new(1, &queue);
        let parent = CancellationToken::new();

        worker.start(&parent);
        parent.cancel();

        tokio::time::timeout(Duration::from_secs(1), worker.join())
            .await
            .expect("worker should exit on parent cancellation");
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_closed_queue_ends_loop() {
        let queue = JobQueue::new("email", 1);
        let worker = Worker::new(1, &queue);
        worker.start(&CancellationToken::new());

        queue.close();
        tokio::time::timeout(Duration::from_secs(1), worker.join())
            .await
            .expect("worker should exit when its queue closes");
    }

    #[tokio::test]
    async fn test_handle_job_reports_panic_message() {
        let job = panicking_job("job-9", "bad payload");

        let err = handle_job(1, job, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Job error: job panicked: bad payload");

        let job = eagerly_panicking_job("job-10", "bad handler");
        let err = handle_job(1, job, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Job error: job panicked: bad handler");
    }
}
