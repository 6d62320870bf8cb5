use thiserror::Error;

/// Core error type for conveyor operations.
#[derive(Error, Debug)]
pub enum ConveyorError {
    /// A job was routed to a service with no registered queue.
    #[error("Service not registered: {0}")]
    ServiceNotRegistered(String),

    /// The dispatcher has been stopped and accepts no further jobs.
    #[error("Dispatcher stopped")]
    DispatcherStopped,

    /// Non-blocking dispatch found the service queue at capacity.
    #[error("Queue full for service: {0}")]
    QueueFull(String),

    /// A job failed during execution (returned an error or panicked).
    #[error("Job error: {0}")]
    Job(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ConveyorError {
    /// Create a job error from anything printable.
    pub fn job(message: impl Into<String>) -> Self {
        Self::Job(message.into())
    }

    /// Whether the caller may reasonably try the same operation again.
    ///
    /// A missing service can be registered later and a full queue drains,
    /// but a stopped dispatcher never comes back.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceNotRegistered(_) | Self::QueueFull(_))
    }
}

impl From<serde_json::Error> for ConveyorError {
    fn from(e: serde_json::Error) -> Self {
        ConveyorError::Serialization(e.to_string())
    }
}

/// Result type alias using ConveyorError.
pub type Result<T> = std::result::Result<T, ConveyorError>;
