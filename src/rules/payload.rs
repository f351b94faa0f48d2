//! Decoding of `{"filters": {...}, "pull_interval": ...}` rule payloads.

use crate::rules::errors::PayloadError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct FilterPayload {
    /// Category key to raw rule strings.
    #[serde(default, deserialize_with = "deserialize_filters")]
    pub filters: HashMap<String, Vec<String>>,
    /// Suggested refresh period. Absent when missing, non-positive or unparsable.
    #[serde(default, deserialize_with = "deserialize_interval")]
    pub pull_interval: Option<Duration>,
}

impl FilterPayload {
    pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn deserialize_filters<'de, D>(deserializer: D) -> Result<HashMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let filters: Option<HashMap<String, Option<Vec<String>>>> = Option::deserialize(deserializer)?;
    Ok(filters
        .unwrap_or_default()
        .into_iter()
        .map(|(category, rules)| (category, rules.unwrap_or_default()))
        .collect())
}

/// Numbers are nanoseconds; strings use `300ms`, `30s`, `1m30s` notation.
fn deserialize_interval<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let interval = match &value {
        Value::Null => None,
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(nanos_from_f64))
            .filter(|ns| *ns > 0)
            .map(Duration::from_nanos),
        Value::String(s) => parse_duration(s),
        _ => None,
    };
    if interval.is_none() && !value.is_null() {
        warn!("RULES | ignoring invalid pull_interval {value}");
    }
    Ok(interval)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn nanos_from_f64(f: f64) -> u64 {
    f as u64
}

/// Parses a positive duration such as `1h`, `2m30s`, `1.5s`, `250ms`, `10us` or `100ns`.
#[must_use]
pub fn parse_duration(text: &str) -> Option<Duration> {
    let mut rest = text.trim();
    if rest.is_empty() {
        return None;
    }
    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_nanos += value * scale;
    }
    if total_nanos < 1.0 || !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos_from_f64(total_nanos)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_payload() {
        let payload = FilterPayload::decode(
            br#"{"filters":{"metric":["{ measurement = 'cpu' }"],"logging":["{a=1}","{b=2}"]},"pull_interval":10000000000}"#,
        )
        .expect("failed to decode");
        assert_eq!(payload.filters.len(), 2);
        assert_eq!(payload.filters["logging"].len(), 2);
        assert_eq!(payload.pull_interval, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_decode_string_interval() {
        let payload = FilterPayload::decode(br#"{"filters":{},"pull_interval":"1m30s"}"#)
            .expect("failed to decode");
        assert_eq!(payload.pull_interval, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_decode_nulls_and_missing() {
        let payload = FilterPayload::decode(br#"{"filters":null}"#).expect("failed to decode");
        assert_eq!(payload, FilterPayload::default());

        let payload = FilterPayload::decode(br#"{"filters":{"metric":null},"pull_interval":-5}"#)
            .expect("failed to decode");
        assert_eq!(payload.filters["metric"], Vec::<String>::new());
        assert_eq!(payload.pull_interval, None);

        let payload = FilterPayload::decode(b"{}").expect("failed to decode");
        assert_eq!(payload, FilterPayload::default());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(FilterPayload::decode(b"not json").is_err());
        assert!(FilterPayload::decode(br#"{"filters":["a"]}"#).is_err());
        assert!(FilterPayload::decode(br#"{"filters":{"metric":[1]}}"#).is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("2m3s"), Some(Duration::from_secs(123)));
        assert_eq!(parse_duration("10us"), Some(Duration::from_micros(10)));
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration(""), None);
    }
}
