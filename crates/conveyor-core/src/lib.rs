pub mod config;
pub mod error;
pub mod job;

pub use config::ConveyorConfig;
pub use error::{ConveyorError, Result};
pub use job::{BoxedJob, FnJob, Job, JobContext, JobMetadata};
