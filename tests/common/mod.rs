#![allow(dead_code)]

use pointfilter::filter::Filter;
use pointfilter::metrics::aggregator::Aggregator;
use pointfilter::metrics::constants::CONTEXTS;
use pointfilter::metrics::FilterMetrics;
use pointfilter::point::Point;
use pointfilter::rules::{RuleOrigin, RuleSet, RuleStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub fn metrics() -> FilterMetrics {
    FilterMetrics::new(Arc::new(Mutex::new(
        Aggregator::<CONTEXTS>::new().expect("failed to create aggregator"),
    )))
}

pub fn rules(entries: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
    let mut filters: HashMap<String, Vec<String>> = HashMap::new();
    for (category, rule) in entries {
        filters
            .entry((*category).to_string())
            .or_default()
            .push((*rule).to_string());
    }
    filters
}

pub fn filter_with(entries: &[(&str, &str)]) -> (Filter, Arc<RuleStore>) {
    let (set, errors) = RuleSet::build(&rules(entries), RuleOrigin::Local);
    assert!(errors.is_empty(), "unexpected compile errors: {errors:?}");
    let store = Arc::new(RuleStore::with_rules(set));
    (Filter::new(Arc::clone(&store), metrics()), store)
}

pub fn names(points: &[Point]) -> Vec<&str> {
    points.iter().map(|p| p.name.as_str()).collect()
}
