use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One observability data unit as seen by the filter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub name: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
    /// Unix timestamp in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

impl Point {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Scalar field value. Integers that fit in `i64` deserialize as `Int`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::UInt(u) => write!(f, "{u}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInt(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_point() {
        let point: Point = serde_json::from_str(
            r#"{"name":"cpu","tags":{"host":"a"},"fields":{"usage":1.5,"count":3,"big":18446744073709551615,"ok":true,"msg":"hi"}}"#,
        )
        .expect("failed to parse point");
        assert_eq!(point.name, "cpu");
        assert_eq!(point.tags.get("host"), Some(&"a".to_string()));
        assert_eq!(point.fields.get("usage"), Some(&FieldValue::Float(1.5)));
        assert_eq!(point.fields.get("count"), Some(&FieldValue::Int(3)));
        assert_eq!(point.fields.get("big"), Some(&FieldValue::UInt(u64::MAX)));
        assert_eq!(point.fields.get("ok"), Some(&FieldValue::Bool(true)));
        assert_eq!(
            point.fields.get("msg"),
            Some(&FieldValue::String("hi".to_string()))
        );
        assert_eq!(point.time, None);
    }

    #[test]
    fn test_missing_tags_and_fields_default_empty() {
        let point: Point = serde_json::from_str(r#"{"name":"mem"}"#).expect("failed to parse");
        assert!(point.tags.is_empty());
        assert!(point.fields.is_empty());
    }
}
