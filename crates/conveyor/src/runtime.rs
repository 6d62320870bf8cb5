//! Process lifecycle: register services, start workers and the poller,
//! wait for a shutdown signal, then drain.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;

use conveyor_core::config::ConveyorConfig;
use conveyor_core::error::{ConveyorError, Result};
use conveyor_core::job::Job;
use conveyor_runtime::{Dispatcher, DrainResult, Poller, PollerConfig};

use crate::example::ExampleJob;

/// Prelude module for common imports.
pub mod prelude {
    pub use conveyor_core::config::ConveyorConfig;
    pub use conveyor_core::error::{ConveyorError, Result};
    pub use conveyor_core::job::{FnJob, Job, JobContext, JobMetadata};
    pub use conveyor_runtime::{Dispatcher, DrainResult, Poller, PollerConfig};

    pub use crate::{Conveyor, ConveyorBuilder, ExampleJob};
}

type PollerSetup = Box<dyn FnOnce(Poller) -> Poller + Send>;

/// The conveyor runtime.
pub struct Conveyor {
    config: ConveyorConfig,
    dispatcher: Arc<Dispatcher>,
    poller_enabled: bool,
    poller_setup: Vec<PollerSetup>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Conveyor {
    /// Create a new builder for configuring conveyor.
    pub fn builder() -> ConveyorBuilder {
        ConveyorBuilder::new()
    }

    pub fn config(&self) -> &ConveyorConfig {
        &self.config
    }

    /// Dispatcher shared with the poller; usable for producing jobs directly.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Handle that can request shutdown after `run` has taken ownership.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run until ctrl-c or a shutdown request, then drain.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            project = %self.config.project.name,
            env = %self.config.env,
            "Conveyor starting"
        );

        self.dispatcher.register_all(&self.config.services)?;
        self.dispatcher.start();

        let poller = if self.poller_enabled && self.config.poller.enabled {
            let mut poller = Poller::new(
                self.dispatcher.clone(),
                PollerConfig::from(&self.config.poller),
            );
            for setup in self.poller_setup.drain(..) {
                poller = setup(poller);
            }
            Some(Arc::new(poller).spawn(&self.dispatcher.shutdown_token()))
        } else {
            tracing::info!("Poller disabled");
            None
        };

        tracing::info!(services = ?self.dispatcher.services(), "Conveyor started");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
            }
            _ = self.shutdown_rx.recv() => {
                tracing::info!("Received shutdown notification");
            }
        }

        tracing::info!("Starting graceful shutdown...");

        if let Some(poller) = poller {
            poller.stop().await;
        }

        let grace = self.config.dispatcher.shutdown_timeout();
        match self.dispatcher.shutdown(grace).await {
            DrainResult::Completed => tracing::info!("All in-flight jobs finished"),
            DrainResult::Timeout(busy) => tracing::warn!(
                busy_workers = busy,
                grace_secs = grace.as_secs(),
                "Exiting with jobs still running"
            ),
        }

        for stats in self.dispatcher.stats() {
            tracing::info!(
                service = %stats.service,
                processed = stats.processed,
                failed = stats.failed,
                "Service totals"
            );
        }

        tracing::info!("Conveyor stopped");
        Ok(())
    }
}

/// Requests shutdown of a running [`Conveyor`].
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

/// Builder for configuring the conveyor runtime.
pub struct ConveyorBuilder {
    config: Option<ConveyorConfig>,
    poller_enabled: bool,
    poller_setup: Vec<PollerSetup>,
}

impl ConveyorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            poller_enabled: true,
            poller_setup: Vec::new(),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: ConveyorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Enable or disable the poller regardless of configuration.
    pub fn poller(mut self, enabled: bool) -> Self {
        self.poller_enabled = enabled;
        self
    }

    /// Replace the job the poller dispatches on each tick.
    pub fn job_factory<F, J>(self, factory: F) -> Self
    where
        F: Fn() -> J + Send + Sync + 'static,
        J: Job,
    {
        self.configure_poller(move |poller| poller.with_job_factory(factory))
    }

    /// Gate the poller's dispatch on a condition.
    pub fn condition<F, Fut>(self, condition: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.configure_poller(move |poller| poller.with_condition(condition))
    }

    /// Arbitrary poller customization applied at startup.
    pub fn configure_poller<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(Poller) -> Poller + Send + 'static,
    {
        self.poller_setup.push(Box::new(setup));
        self
    }

    /// Build the conveyor runtime.
    pub fn build(self) -> Result<Conveyor> {
        let config = self
            .config
            .ok_or_else(|| ConveyorError::Config("Configuration is required".to_string()))?;
        config.validate()?;

        let mut poller_setup = self.poller_setup;
        if poller_setup.is_empty() && config.poller.service == ExampleJob::SERVICE {
            let job_id = config.poller.job_id.clone();
            poller_setup.push(Box::new(move |poller: Poller| {
                poller.with_job_factory(move || ExampleJob::new(job_id.clone()))
            }));
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        Ok(Conveyor {
            config,
            dispatcher: Arc::new(Dispatcher::new()),
            poller_enabled: self.poller_enabled,
            poller_setup,
            shutdown_tx,
            shutdown_rx,
        })
    }
}

impl Default for ConveyorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
