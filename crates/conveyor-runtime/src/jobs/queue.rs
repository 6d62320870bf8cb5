use async_channel::{Receiver, Sender, TrySendError};
use tokio::sync::oneshot;

use conveyor_core::error::{ConveyorError, Result};
use conveyor_core::job::BoxedJob;

/// A job in transit, plus the receipt its producer waits on when the queue
/// has no buffer.
pub(crate) struct Delivery {
    job: BoxedJob,
    receipt: Option<oneshot::Sender<()>>,
}

impl Delivery {
    /// Take the job, releasing a producer waiting on the hand-off.
    pub(crate) fn accept(self) -> BoxedJob {
        if let Some(receipt) = self.receipt {
            let _ = receipt.send(());
        }
        self.job
    }
}

/// Bounded FIFO queue for a single service.
///
/// Any number of producers may send and any number of workers may receive.
/// Sending waits while the queue holds `capacity` jobs; each job is received
/// by exactly one worker.
///
/// A capacity of zero makes the queue a rendezvous: `push` returns only
/// once a worker has taken the job. Internally the job waits in a single
/// slot that does not count towards `len`.
#[derive(Clone)]
pub struct JobQueue {
    service: String,
    capacity: usize,
    sender: Sender<Delivery>,
    receiver: Receiver<Delivery>,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` jobs.
    pub fn new(service: impl Into<String>, capacity: usize) -> Self {
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        Self {
            service: service.into(),
            capacity,
            sender,
            receiver,
        }
    }

    /// Service this queue belongs to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Maximum number of buffered jobs.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether producers hand jobs directly to a worker.
    pub fn is_rendezvous(&self) -> bool {
        self.capacity == 0
    }

    /// Number of buffered jobs.
    pub fn len(&self) -> usize {
        if self.is_rendezvous() {
            0
        } else {
            self.sender.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub(crate) fn receiver(&self) -> Receiver<Delivery> {
        self.receiver.clone()
    }

    /// Enqueue a job, waiting for capacity.
    ///
    /// On a rendezvous queue this also waits for a worker to take the job.
    /// Fails with `DispatcherStopped` if the queue is closed, either up front
    /// or while waiting.
    pub async fn push(&self, job: BoxedJob) -> Result<()> {
        if !self.is_rendezvous() {
            return self
                .sender
                .send(Delivery { job, receipt: None })
                .await
                .map_err(|_| ConveyorError::DispatcherStopped);
        }

        let (receipt, taken) = oneshot::channel();
        self.sender
            .send(Delivery {
                job,
                receipt: Some(receipt),
            })
            .await
            .map_err(|_| ConveyorError::DispatcherStopped)?;

        // Dropped unaccepted when `close` drains the slot.
        taken.await.map_err(|_| ConveyorError::DispatcherStopped)
    }

    /// Enqueue a job without waiting.
    ///
    /// A rendezvous queue has no slot to fill without waiting, so it always
    /// reports `QueueFull`.
    pub fn try_push(&self, job: BoxedJob) -> Result<()> {
        if self.is_closed() {
            return Err(ConveyorError::DispatcherStopped);
        }
        if self.is_rendezvous() {
            return Err(ConveyorError::QueueFull(self.service.clone()));
        }

        match self.sender.try_send(Delivery { job, receipt: None }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ConveyorError::QueueFull(self.service.clone())),
            Err(TrySendError::Closed(_)) => Err(ConveyorError::DispatcherStopped),
        }
    }

    /// Close the queue and drop every job still buffered.
    ///
    /// Returns how many undelivered jobs were dropped. Closing twice drops
    /// nothing the second time.
    pub fn close(&self) -> usize {
        self.sender.close();

        let mut dropped = 0;
        while let Ok(delivery) = self.receiver.try_recv() {
            tracing::debug!(
                service = %self.service,
                job_id = %delivery.job.id(),
                "Dropping undelivered job"
            );
            dropped += 1;
        }
        dropped
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("service", &self.service)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
