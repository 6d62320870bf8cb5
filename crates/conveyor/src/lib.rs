//! Conveyor: an in-process job dispatcher.
//!
//! Jobs are routed by service name to bounded queues, each drained by a
//! fixed pool of workers. A poller can produce jobs on a timer.

mod example;
mod runtime;

pub use conveyor_core;
pub use conveyor_runtime;

pub use example::ExampleJob;
pub use runtime::prelude;
pub use runtime::{Conveyor, ConveyorBuilder, ShutdownHandle};
