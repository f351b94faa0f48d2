pub mod aggregator;
pub mod constants;
pub mod errors;
pub mod filter;
pub mod metric;

pub use filter::{FilterMetrics, PullOutcome};
