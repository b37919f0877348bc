//! Gap detection across every enabled media manager.
//!
//! One concurrent unit of work per server; a failing server is recorded in its
//! own result and never aborts its siblings.

mod detect;
mod types;

pub use detect::Detector;
pub use types::{DetectError, DetectionResult, DetectionResults};
