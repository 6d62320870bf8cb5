pub mod jobs;
pub mod poller;

pub use jobs::{Dispatcher, DrainResult, JobQueue, ServiceStats, Worker, WorkerState};
pub use poller::{Poller, PollerConfig, PollerHandle};
