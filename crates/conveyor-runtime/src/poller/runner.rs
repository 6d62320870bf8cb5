use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use conveyor_core::config::PollerConfig as PollerSettings;
use conveyor_core::error::{ConveyorError, Result};
use conveyor_core::job::Job;

use super::tick::{
    always, boxed_condition, boxed_job_factory, boxed_tick_handler, logging_job_factory,
    Condition, JobFactory, TickHandler,
};
use crate::jobs::Dispatcher;

/// Shortest interval the poller will tick at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Service the default tick dispatches to.
    pub service: String,
    /// ID given to jobs built by the default factory.
    pub job_id: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            service: "email".to_string(),
            job_id: "job-123".to_string(),
        }
    }
}

impl From<&PollerSettings> for PollerConfig {
    fn from(settings: &PollerSettings) -> Self {
        Self {
            interval: settings.interval(),
            service: settings.service.clone(),
            job_id: settings.job_id.clone(),
        }
    }
}

/// Periodic producer.
///
/// Timer mechanics live in [`Poller::run`]; what happens on each tick is a
/// replaceable handler. The built-in handler checks a condition and, when
/// it holds, dispatches one job from the factory. Dispatch failures are
/// logged and never stop the ticking.
pub struct Poller {
    dispatcher: Arc<Dispatcher>,
    config: PollerConfig,
    condition: Condition,
    job_factory: JobFactory,
    on_tick: RwLock<Option<TickHandler>>,
    ticks: AtomicU64,
    running: AtomicBool,
}

impl Poller {
    /// Create a poller with the default tick behavior.
    pub fn new(dispatcher: Arc<Dispatcher>, config: PollerConfig) -> Self {
        let job_factory = logging_job_factory(config.job_id.clone(), config.service.clone());
        Self {
            dispatcher,
            config,
            condition: always(),
            job_factory,
            on_tick: RwLock::new(None),
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// Set the condition checked by the default tick.
    pub fn with_condition<F, Fut>(mut self, condition: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.condition = boxed_condition(condition);
        self
    }

    /// Set the job factory used by the default tick.
    pub fn with_job_factory<F, J>(mut self, factory: F) -> Self
    where
        F: Fn() -> J + Send + Sync + 'static,
        J: Job,
    {
        self.job_factory = boxed_job_factory(factory);
        self
    }

    /// Replace the tick handler at construction.
    pub fn with_on_tick<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.on_tick.write().unwrap_or_else(|e| e.into_inner()) =
            Some(boxed_tick_handler(handler));
        self
    }

    /// Replace the tick handler before `run` is called.
    ///
    /// Fails with `InvalidState` while the poller is running.
    pub fn set_on_tick<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            return Err(ConveyorError::InvalidState(
                "cannot replace the tick handler while the poller is running".to_string(),
            ));
        }
        *self.on_tick.write().unwrap_or_else(|e| e.into_inner()) =
            Some(boxed_tick_handler(handler));
        Ok(())
    }

    /// Restore the built-in tick handler.
    pub fn reset_on_tick(&self) -> Result<()> {
        if self.is_running() {
            return Err(ConveyorError::InvalidState(
                "cannot replace the tick handler while the poller is running".to_string(),
            ));
        }
        *self.on_tick.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Ticks observed since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Tick until `token` is cancelled.
    ///
    /// The first tick fires one interval after the call. Ticks missed while
    /// a handler runs long are skipped rather than bunched up. Running the
    /// same poller twice concurrently is refused.
    pub async fn run(&self, token: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Poller already running");
            return;
        }

        let handler = self
            .on_tick
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let period = self.config.interval.max(MIN_INTERVAL);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_ms = period.as_millis() as u64,
            custom_tick = handler.is_some(),
            "Poller started"
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    self.ticks.fetch_add(1, Ordering::SeqCst);
                    match &handler {
                        Some(handler) => handler(token.clone()).await,
                        None => self.default_tick(&token).await,
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!(ticks = self.ticks(), "Poller stopped");
    }

    /// Run in a background task under a child of `parent`.
    pub fn spawn(self: Arc<Self>, parent: &CancellationToken) -> PollerHandle {
        let token = parent.child_token();
        let run_token = token.clone();
        let task = tokio::spawn(async move { self.run(run_token).await });
        PollerHandle { token, task }
    }

    /// Check the condition and dispatch one job if it holds.
    async fn default_tick(&self, token: &CancellationToken) {
        tracing::trace!("Default tick");

        if !(self.condition)().await {
            return;
        }

        let job = (self.job_factory)();
        let job_id = job.id().to_string();
        let service = job.service().to_string();

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = self.dispatcher.dispatch_boxed(job) => result,
        };

        match result {
            Ok(()) => tracing::debug!(job_id = %job_id, service = %service, "Poller dispatched job"),
            Err(e) => tracing::warn!(
                job_id = %job_id,
                service = %service,
                error = %e,
                "Poller dispatch failed"
            ),
        }
    }
}

/// Handle to a poller running in the background.
pub struct PollerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Token whose cancellation stops the poller.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the poller and wait for its loop to return.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Poller task ended abnormally");
        }
    }
}
