use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use conveyor_core::config::ServiceConfig;
use conveyor_core::error::{ConveyorError, Result};
use conveyor_core::job::{BoxedJob, Job};

use super::queue::JobQueue;
use super::worker::Worker;

/// How often `shutdown` checks whether workers have exited.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A registered service: its queue and the workers bound to it.
struct ServiceEntry {
    queue: JobQueue,
    workers: Vec<Arc<Worker>>,
}

/// Point-in-time view of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStats {
    pub service: String,
    pub workers: usize,
    pub capacity: usize,
    pub queued: usize,
    pub processed: u64,
    pub failed: u64,
}

/// Result of waiting for workers after stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainResult {
    /// Every worker loop exited.
    Completed,
    /// Grace window elapsed with this many workers still executing a job.
    Timeout(usize),
}

/// Routes jobs to per-service bounded queues, each drained by a fixed pool
/// of workers.
///
/// ```text
/// producer ──► dispatch ──► [email queue] ──► worker 1..N ──► Job::execute
///                      └──► [sms queue]   ──► worker 1..M
/// ```
///
/// One cancellation token covers the dispatcher's whole lifetime. Stopping
/// cancels it, which ends every worker loop and releases producers waiting
/// on a full queue. Register services before calling `start`.
pub struct Dispatcher {
    services: RwLock<HashMap<String, ServiceEntry>>,
    shutdown: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher with its own shutdown token.
    pub fn new() -> Self {
        Self::with_shutdown(CancellationToken::new())
    }

    /// Create a dispatcher driven by an externally owned shutdown token.
    pub fn with_shutdown(shutdown: CancellationToken) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            shutdown,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Shutdown token shared by every worker.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register a service with `worker_count` workers and a queue of
    /// `queue_size` jobs.
    ///
    /// Returns `Ok(false)` without changing anything if the service is
    /// already registered. A `queue_size` of zero gives a rendezvous queue:
    /// dispatch waits until a worker takes the job. Workers of a service registered after `start`
    /// stay idle until `start` is called again.
    pub fn register(&self, service: &str, worker_count: usize, queue_size: usize) -> Result<bool> {
        if self.is_stopped() {
            return Err(ConveyorError::DispatcherStopped);
        }
        if service.trim().is_empty() {
            return Err(ConveyorError::InvalidArgument(
                "service name cannot be empty".to_string(),
            ));
        }

        let mut services = self.write();
        // `stop` may have run while this call waited for the lock.
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ConveyorError::DispatcherStopped);
        }
        if services.contains_key(service) {
            tracing::warn!(service, "Service already registered");
            return Ok(false);
        }

        let queue = JobQueue::new(service, queue_size);
        let workers = (1..=worker_count)
            .map(|id| Arc::new(Worker::new(id, &queue)))
            .collect();

        services.insert(service.to_string(), ServiceEntry { queue, workers });

        tracing::info!(service, worker_count, queue_size, "Service registered");
        if self.started.load(Ordering::SeqCst) {
            tracing::warn!(
                service,
                "Service registered after start; its workers run on the next start()"
            );
        }
        Ok(true)
    }

    /// Register every service in a configuration list.
    pub fn register_all(&self, services: &[ServiceConfig]) -> Result<()> {
        for service in services {
            self.register(&service.name, service.workers, service.queue_size)?;
        }
        Ok(())
    }

    /// Start every registered worker that is not running yet.
    pub fn start(&self) {
        if self.is_stopped() {
            tracing::warn!("Ignoring start on a stopped dispatcher");
            return;
        }

        let services = self.read();
        let mut worker_total = 0;
        for entry in services.values() {
            for worker in &entry.workers {
                worker.start(&self.shutdown);
            }
            worker_total += entry.workers.len();
        }
        self.started.store(true, Ordering::SeqCst);

        tracing::info!(
            services = services.len(),
            workers = worker_total,
            "Dispatcher started"
        );
    }

    /// Enqueue a job on its service queue.
    ///
    /// Waits while the queue is full. Returns `DispatcherStopped` if the
    /// dispatcher is stopped before or during the wait, and
    /// `ServiceNotRegistered` for an unknown service. Success means the job
    /// was accepted, not that it ran.
    pub async fn dispatch<J: Job>(&self, job: J) -> Result<()> {
        self.dispatch_boxed(Box::new(job)).await
    }

    /// Enqueue an already boxed job. See [`Dispatcher::dispatch`].
    pub async fn dispatch_boxed(&self, job: BoxedJob) -> Result<()> {
        if self.is_stopped() {
            return Err(ConveyorError::DispatcherStopped);
        }

        let queue = self.queue_for(job.service())?;

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ConveyorError::DispatcherStopped),
            result = queue.push(job) => result,
        }
    }

    /// Enqueue a job without waiting, failing with `QueueFull` at capacity.
    pub fn try_dispatch(&self, job: BoxedJob) -> Result<()> {
        if self.is_stopped() {
            return Err(ConveyorError::DispatcherStopped);
        }

        self.queue_for(job.service())?.try_push(job)
    }

    /// Cancel all workers and close every queue.
    ///
    /// Jobs already executing finish; jobs still buffered are dropped and
    /// counted in the log. Calling this more than once does nothing.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();

        let services = self.read();
        let mut dropped = 0;
        for entry in services.values() {
            for worker in &entry.workers {
                worker.stop();
            }
            dropped += entry.queue.close();
        }

        if dropped > 0 {
            tracing::warn!(dropped_jobs = dropped, "Dropped undelivered jobs on stop");
        }
        tracing::info!("Dispatcher stopped");
    }

    /// Stop, then wait up to `timeout` for every worker loop to exit.
    pub async fn shutdown(&self, timeout: Duration) -> DrainResult {
        self.stop();

        let workers: Vec<Arc<Worker>> = self
            .read()
            .values()
            .flat_map(|entry| entry.workers.iter().cloned())
            .collect();

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if workers.iter().all(|w| w.is_finished()) {
                for worker in &workers {
                    worker.join().await;
                }
                tracing::info!("All workers exited");
                return DrainResult::Completed;
            }

            if tokio::time::Instant::now() >= deadline {
                let busy = workers.iter().filter(|w| w.is_busy()).count();
                tracing::warn!(
                    busy_workers = busy,
                    "Shutdown grace window elapsed with jobs still running"
                );
                return DrainResult::Timeout(busy);
            }

            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// Names of registered services.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, service: &str) -> bool {
        self.read().contains_key(service)
    }

    /// Number of workers bound to a service.
    pub fn worker_count(&self, service: &str) -> Option<usize> {
        self.read().get(service).map(|e| e.workers.len())
    }

    /// Queue capacity fixed at registration.
    pub fn queue_capacity(&self, service: &str) -> Option<usize> {
        self.read().get(service).map(|e| e.queue.capacity())
    }

    /// Jobs currently buffered for a service.
    pub fn queue_depth(&self, service: &str) -> Option<usize> {
        self.read().get(service).map(|e| e.queue.len())
    }

    /// Per-service snapshot, sorted by service name.
    pub fn stats(&self) -> Vec<ServiceStats> {
        let mut stats: Vec<ServiceStats> = self
            .read()
            .iter()
            .map(|(name, entry)| ServiceStats {
                service: name.clone(),
                workers: entry.workers.len(),
                capacity: entry.queue.capacity(),
                queued: entry.queue.len(),
                processed: entry.workers.iter().map(|w| w.jobs_processed()).sum(),
                failed: entry.workers.iter().map(|w| w.jobs_failed()).sum(),
            })
            .collect();
        stats.sort_by(|a, b| a.service.cmp(&b.service));
        stats
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.shutdown.is_cancelled()
    }

    fn queue_for(&self, service: &str) -> Result<JobQueue> {
        self.read()
            .get(service)
            .map(|entry| entry.queue.clone())
            .ok_or_else(|| ConveyorError::ServiceNotRegistered(service.to_string()))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ServiceEntry>> {
        self.services.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ServiceEntry>> {
        self.services.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
