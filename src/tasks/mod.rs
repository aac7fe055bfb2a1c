//! Background tasks.

mod scheduler;

pub use scheduler::{Scheduler, SchedulerHandle, SweepKind, SweepReport};
