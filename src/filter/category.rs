use std::fmt;
use std::str::FromStr;

/// Kinds of telemetry a batch can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Logging,
    Tracing,
    Metric,
    Object,
    Network,
    KeyEvent,
    CustomObject,
    Rum,
    Security,
    Profiling,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Logging,
        Category::Tracing,
        Category::Metric,
        Category::Object,
        Category::Network,
        Category::KeyEvent,
        Category::CustomObject,
        Category::Rum,
        Category::Security,
        Category::Profiling,
    ];

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.key() == key)
    }

    /// Position in [`Category::ALL`].
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Key used in rule payloads and at the filter boundary.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Category::Logging => "logging",
            Category::Tracing => "tracing",
            Category::Metric => "metric",
            Category::Object => "object",
            Category::Network => "network",
            Category::KeyEvent => "keyevent",
            Category::CustomObject => "custom_object",
            Category::Rum => "rum",
            Category::Security => "security",
            Category::Profiling => "profiling",
        }
    }

    /// Identifier under which rules can address the point name.
    ///
    /// Traces, security and profiling data already carry a service-style tag,
    /// so their name is not exposed.
    #[must_use]
    pub const fn name_tag(self) -> Option<&'static str> {
        match self {
            Category::Logging | Category::Network | Category::KeyEvent | Category::Rum => {
                Some("source")
            }
            Category::Metric => Some("measurement"),
            Category::Object | Category::CustomObject => Some("class"),
            Category::Tracing | Category::Security | Category::Profiling => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = super::FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::from_key(s).ok_or_else(|| super::FilterError::UnsupportedCategory(s.to_string()))
    }
}
