use crate::condition::{self, WhereConditions};
use crate::rules::errors::RuleCompileError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Where the rules currently in force came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOrigin {
    Local,
    Remote,
}

impl RuleOrigin {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RuleOrigin::Local => "local",
            RuleOrigin::Remote => "remote",
        }
    }
}

/// Compiled conditions for one category.
#[derive(Debug, Clone)]
pub struct CategoryRules {
    pub conditions: WhereConditions,
    /// Rule strings that compiled, joined with `; `.
    pub raw: String,
    pub origin: RuleOrigin,
}

/// Immutable set of compiled rules, keyed by category.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    categories: HashMap<String, CategoryRules>,
}

impl RuleSet {
    /// Compiles every rule string independently. Rules that fail are reported and skipped;
    /// a category left without any compiled rule is not part of the set.
    #[must_use]
    pub fn build(
        filters: &HashMap<String, Vec<String>>,
        origin: RuleOrigin,
    ) -> (RuleSet, Vec<RuleCompileError>) {
        let mut categories = HashMap::with_capacity(filters.len());
        let mut errors = Vec::new();

        for (category, rules) in filters {
            let mut conditions = WhereConditions::default();
            let mut compiled = Vec::with_capacity(rules.len());

            for raw in rules {
                if raw.trim().is_empty() {
                    continue;
                }
                match condition::compile(raw) {
                    Ok(parsed) => {
                        conditions.extend(parsed);
                        compiled.push(raw.as_str());
                    }
                    Err(source) => errors.push(RuleCompileError {
                        category: category.clone(),
                        raw: raw.clone(),
                        source,
                    }),
                }
            }

            if compiled.is_empty() {
                debug!("RULES | no usable rules for category {category}");
                continue;
            }
            categories.insert(
                category.clone(),
                CategoryRules {
                    conditions,
                    raw: compiled.join("; "),
                    origin,
                },
            );
        }

        (RuleSet { categories }, errors)
    }

    #[must_use]
    pub fn get(&self, category: &str) -> Option<&CategoryRules> {
        self.categories.get(category)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }
}

/// Holds the rule set in force. Readers take a snapshot and never see a partial update.
#[derive(Debug, Default)]
pub struct RuleStore {
    current: RwLock<Arc<RuleSet>>,
}

impl RuleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rules(rules: RuleSet) -> Self {
        RuleStore {
            current: RwLock::new(Arc::new(rules)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read().expect("lock poisoned"))
    }

    /// Installs `rules` and returns the set it replaced.
    pub fn replace(&self, rules: RuleSet) -> Arc<RuleSet> {
        let next = Arc::new(rules);
        let mut current = self.current.write().expect("lock poisoned");
        std::mem::replace(&mut *current, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ParseError;

    fn filters(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.iter().map(ToString::to_string).collect()))
            .collect()
    }

    #[test]
    fn test_build_compiles_each_category() {
        let (rules, errors) = RuleSet::build(
            &filters(&[
                ("metric", &["{ measurement = 'cpu' }"]),
                ("logging", &["{ source = 'nginx' }", "{ status = 'debug' }"]),
            ]),
            RuleOrigin::Local,
        );
        assert!(errors.is_empty());
        assert_eq!(rules.len(), 2);

        let logging = rules.get("logging").expect("logging rules");
        assert_eq!(logging.conditions.len(), 2);
        assert_eq!(logging.raw, "{ source = 'nginx' }; { status = 'debug' }");
        assert_eq!(logging.origin, RuleOrigin::Local);
    }

    #[test]
    fn test_build_skips_bad_rules() {
        let (rules, errors) = RuleSet::build(
            &filters(&[("metric", &["{ a = }", "{ b = 1 }"])]),
            RuleOrigin::Remote,
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, "metric");
        assert_eq!(errors[0].raw, "{ a = }");
        assert!(matches!(errors[0].source, ParseError::Unexpected { .. }));

        let metric = rules.get("metric").expect("metric rules");
        assert_eq!(metric.conditions.len(), 1);
        assert_eq!(metric.raw, "{ b = 1 }");
    }

    #[test]
    fn test_category_with_only_bad_rules_is_absent() {
        let (rules, errors) = RuleSet::build(
            &filters(&[("metric", &["{ a = "]), ("object", &[]), ("rum", &["  "])]),
            RuleOrigin::Remote,
        );
        assert_eq!(errors.len(), 1);
        assert!(rules.is_empty());
        assert!(rules.get("metric").is_none());
    }

    #[test]
    fn test_replace_returns_previous() {
        let store = RuleStore::new();
        assert!(store.snapshot().is_empty());

        let (rules, _) = RuleSet::build(&filters(&[("metric", &["{ a = 1 }"])]), RuleOrigin::Local);
        let previous = store.replace(rules);
        assert!(previous.is_empty());

        let held = store.snapshot();
        let (rules, _) = RuleSet::build(&filters(&[("object", &["{ a = 1 }"])]), RuleOrigin::Remote);
        store.replace(rules);

        // A snapshot taken before the swap is unaffected by it.
        assert!(held.get("metric").is_some());
        assert!(held.get("object").is_none());
        let now = store.snapshot();
        assert!(now.get("metric").is_none());
        assert_eq!(now.get("object").map(|r| r.origin), Some(RuleOrigin::Remote));
    }

    #[test]
    fn test_origin_as_str() {
        assert_eq!(RuleOrigin::Local.as_str(), "local");
        assert_eq!(RuleOrigin::Remote.as_str(), "remote");
        assert_eq!(
            serde_json::to_string(&RuleOrigin::Remote).expect("serialize"),
            "\"remote\""
        );
    }
}
