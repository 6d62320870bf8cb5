mod runner;
mod tick;

pub use runner::{Poller, PollerConfig, PollerHandle};
pub use tick::{Condition, JobFactory, TickHandler};
