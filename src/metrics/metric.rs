use crate::metrics::constants;
use crate::metrics::errors::ParseError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
/// Determine what kind/type of a metric has come in
pub enum Type {
    /// Monotonically increasing counter, summed
    Count,
    /// Point-in-time value, last one wins
    Gauge,
    /// Observations summarized as count/sum/min/max
    Distribution,
}

/// A single observation headed for the aggregator.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    pub(crate) name: String,
    pub(crate) kind: Type,
    pub(crate) value: f64,
    /// Sorted by key, so `a:1,b:2` and `b:2,a:1` land in the same context.
    pub(crate) tags: Vec<(String, String)>,
}

impl Metric {
    /// Build a metric from a name, a value and `(key, value)` tags.
    ///
    /// # Errors
    ///
    /// Fails when the name is empty, the value is not finite or there are more
    /// than [`constants::MAX_TAGS`] tags.
    pub fn new(
        name: &str,
        kind: Type,
        value: f64,
        tags: &[(&str, &str)],
    ) -> Result<Metric, ParseError> {
        if name.is_empty() {
            return Err(ParseError::Raw("Missing metric name"));
        }
        if !value.is_finite() {
            return Err(ParseError::Raw("Value is not finite"));
        }
        if tags.len() > constants::MAX_TAGS {
            return Err(ParseError::Raw("Too many tags"));
        }

        let mut tags: Vec<(String, String)> = tags
            .iter()
            .map(|(k, v)| ((*k).to_string(), truncate(v, constants::MAX_TAG_VALUE_BYTES)))
            .collect();
        tags.sort_unstable();

        Ok(Metric {
            name: name.to_string(),
            kind,
            value,
            tags,
        })
    }
}

/// Cuts `value` to at most `max` bytes on a char boundary.
pub(crate) fn truncate(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}
