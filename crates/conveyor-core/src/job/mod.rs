mod context;
mod traits;

pub use context::JobContext;
pub use traits::{new_job_id, BoxedJob, FnJob, Job, JobMetadata};
