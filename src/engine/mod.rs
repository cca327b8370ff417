pub mod aggregator;
pub mod query;
pub mod status;

pub use query::{Completion, ProbeStats, QueryConfig, QueryEngine, UpdateRequest};
pub use status::{StatusEvent, StatusTracker};
