//! Automation cycle: detection followed by bounded search submission.
//!
//! [`Automation`] is the single seam that reports a cycle's progress to the
//! outside world: tracing, audit events and metrics are all emitted here.

mod runner;
mod types;

pub use runner::Automation;
pub use types::{CycleError, CycleResult};
