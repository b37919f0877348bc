//! Media manager API client.

mod arr;
mod types;

pub use arr::ArrClient;
pub use types::*;
