use crate::condition::ParseError;
use thiserror::Error;

/// Failure to fetch raw rule bytes from a source.
#[derive(Debug, Error)]
pub enum PullError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Fetched bytes that are not a rule payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed rule payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Pull(#[from] PullError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// One rule string that failed to compile. Other rules are unaffected.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("rule `{raw}` for category {category} failed to compile: {source}")]
pub struct RuleCompileError {
    pub category: String,
    pub raw: String,
    pub source: ParseError,
}
