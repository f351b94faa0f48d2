use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Local rules, keyed by category.
pub type FilterRules = HashMap<String, Vec<String>>;

/// Accepts either a map of category to rule strings (or a single rule string),
/// or the same map encoded as a JSON string, as env vars deliver it.
pub fn deserialize_filters<'de, D>(deserializer: D) -> Result<FilterRules, D::Error>
where
    D: Deserializer<'de>,
{
    let value: JsonValue = Deserialize::deserialize(deserializer)?;

    match value {
        JsonValue::String(s) if s.trim().is_empty() => Ok(FilterRules::new()),
        JsonValue::String(s) => match serde_json::from_str::<JsonValue>(&s) {
            Ok(JsonValue::Object(map)) => Ok(collect(map)),
            Ok(other) => {
                tracing::error!("CONFIG | Expected an object for filters, got {other}, ignoring");
                Ok(FilterRules::new())
            }
            Err(e) => {
                tracing::error!("CONFIG | Failed to parse filters: {}, ignoring", e);
                Ok(FilterRules::new())
            }
        },
        JsonValue::Object(map) => Ok(collect(map)),
        JsonValue::Null => Ok(FilterRules::new()),
        other => {
            tracing::error!("CONFIG | Expected an object for filters, got {other}, ignoring");
            Ok(FilterRules::new())
        }
    }
}

fn collect(map: serde_json::Map<String, JsonValue>) -> FilterRules {
    let mut rules = FilterRules::new();
    for (category, value) in map {
        let entry: &mut Vec<String> = rules.entry(category.clone()).or_default();
        match value {
            JsonValue::String(rule) => entry.push(rule),
            JsonValue::Array(items) => {
                for item in items {
                    match item {
                        JsonValue::String(rule) => entry.push(rule),
                        other => tracing::error!(
                            "CONFIG | Filter rule for {category} must be a string, got {other}, ignoring"
                        ),
                    }
                }
            }
            other => tracing::error!(
                "CONFIG | Filters for {category} must be a list of strings, got {other}, ignoring"
            ),
        }
    }
    rules
}
