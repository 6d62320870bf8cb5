mod dispatcher;
mod queue;
mod worker;

pub use dispatcher::{Dispatcher, DrainResult, ServiceStats};
pub use queue::JobQueue;
pub use worker::{Worker, WorkerState};
