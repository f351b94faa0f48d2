/// The maximum tags that a `Metric` may hold.
pub const MAX_TAGS: usize = 32;

/// Tag values longer than this are truncated. Raw rule text is used as a tag.
pub const MAX_TAG_VALUE_BYTES: usize = 200;

pub const CONTEXTS: usize = 1024;

pub static MAX_CONTEXTS: usize = 65_536; // 2**16, arbitrary

pub const POINTS_SEEN_METRIC: &str = "filter.points.seen";
pub const POINTS_DROPPED_METRIC: &str = "filter.points.dropped";
pub const FILTER_LATENCY_METRIC: &str = "filter.latency";
pub const PULL_ATTEMPTS_METRIC: &str = "filter.pull.attempts";
pub const PULL_LATENCY_METRIC: &str = "filter.pull.latency";
pub const RULE_UPDATES_METRIC: &str = "filter.rules.updates";
pub const RULE_LAST_UPDATE_METRIC: &str = "filter.rules.last_update";
pub const RULE_COMPILE_ERRORS_METRIC: &str = "filter.rules.compile_errors";
pub const UNSUPPORTED_CATEGORY_METRIC: &str = "filter.category.unsupported";

pub const SEC_TO_MS: f64 = 1_000.0;
