//! Error types for `metrics` module

/// Errors for the function [`crate::metrics::metric::Metric::new`]
#[derive(Debug, thiserror::Error, Clone, Copy, Eq, PartialEq)]
pub enum ParseError {
    /// Parse failure given in text
    #[error("parse failure: {0}")]
    Raw(&'static str),
}

/// Failure to create a new `Aggregator`
#[derive(Debug, thiserror::Error, Clone, Copy)]
pub enum Creation {
    /// The specified context max is too large given our constants. Indicates a
    /// serious programming error.
    #[error("context max is too large")]
    Contexts,
}

/// Failures from `Aggregator::insert`
#[derive(Debug, thiserror::Error, Clone, Copy, Eq, PartialEq)]
pub enum Insert {
    /// Every context slot is taken and the metric belongs to a new one.
    #[error("aggregator is full")]
    Overflow,
}
