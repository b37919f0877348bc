//! Bounded search submission.
//!
//! Each category's limit is split across servers in proportion to their
//! wanted counts, then submitted as one batched command per server per
//! category. Dry-run shares the allocation path and skips only the calls.

mod allocation;
mod submit;
mod types;

pub use allocation::allocate;
pub use submit::SearchTrigger;
pub use types::{RateLimitNotice, TriggerError, TriggerResult, TriggerResults};
