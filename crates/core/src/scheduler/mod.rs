//! Cycle scheduling.
//!
//! A repeating timer plus a manual-trigger path, with at most one cycle
//! running at a time and at most one manual request queued behind it.

mod runner;
mod types;

pub use runner::Scheduler;
pub use types::{
    CycleRunner, CycleTrigger, ManualTicket, SchedulerError, SchedulerState, SchedulerStatus,
};
