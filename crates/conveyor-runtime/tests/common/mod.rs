#![allow(dead_code)]

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use conveyor_core::error::{ConveyorError, Result};
use conveyor_core::job::{Job, JobContext};

/// Lifecycle event reported by a [`RecordingJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String),
    Finished(String),
}

pub fn started(id: &str) -> Event {
    Event::Started(id.to_string())
}

pub fn finished(id: &str) -> Event {
    Event::Finished(id.to_string())
}

/// Job that reports when it starts and finishes, optionally sleeping and
/// failing in between.
pub struct RecordingJob {
    id: String,
    service: String,
    delay: Duration,
    fail: bool,
    events: mpsc::UnboundedSender<Event>,
}

impl Job for RecordingJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn service(&self) -> &str {
        &self.service
    }

    fn execute<'a>(&'a self, _ctx: &'a JobContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let _ = self.events.send(Event::Started(self.id.clone()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let _ = self.events.send(Event::Finished(self.id.clone()));

            if self.fail {
                Err(ConveyorError::job("recorder failure"))
            } else {
                Ok(())
            }
        })
    }
}

/// Builds recorder jobs reporting to one channel.
#[derive(Clone)]
pub struct RecordedJobs {
    tx: mpsc::UnboundedSender<Event>,
}

impl RecordedJobs {
    pub fn job(&self, id: &str, service: &str) -> RecordingJob {
        self.slow_job(id, service, Duration::ZERO)
    }

    pub fn slow_job(&self, id: &str, service: &str, delay: Duration) -> RecordingJob {
        RecordingJob {
            id: id.to_string(),
            service: service.to_string(),
            delay,
            fail: false,
            events: self.tx.clone(),
        }
    }

    pub fn failing_job(&self, id: &str, service: &str) -> RecordingJob {
        RecordingJob {
            fail: true,
            ..self.job(id, service)
        }
    }
}

/// Receiving end of the recorder channel plus a job builder.
pub struct Recorder {
    jobs: RecordedJobs,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Recorder {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            jobs: RecordedJobs { tx },
            rx,
        }
    }

    pub fn jobs(&self) -> RecordedJobs {
        self.jobs.clone()
    }

    pub fn job(&self, id: &str, service: &str) -> RecordingJob {
        self.jobs.job(id, service)
    }

    pub fn slow_job(&self, id: &str, service: &str, delay: Duration) -> RecordingJob {
        self.jobs.slow_job(id, service, delay)
    }

    pub fn failing_job(&self, id: &str, service: &str) -> RecordingJob {
        self.jobs.failing_job(id, service)
    }

    /// Next event, panicking if none arrives within `within`.
    pub async fn next(&mut self, within: Duration) -> Event {
        tokio::time::timeout(within, self.rx.recv())
            .await
            .expect("timed out waiting for a job event")
            .expect("event channel closed")
    }

    /// Collect events until `count` have arrived.
    pub async fn take(&mut self, count: usize, within: Duration) -> Vec<Event> {
        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            events.push(self.next(within).await);
        }
        events
    }

    /// Whether any event arrives within `within`.
    pub async fn is_quiet_for(&mut self, within: Duration) -> bool {
        tokio::time::timeout(within, self.rx.recv()).await.is_err()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("conveyor_runtime=debug")
        .with_test_writer()
        .try_init();
}
