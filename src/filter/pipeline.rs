use crate::condition::{Subject, WhereConditions};
use crate::filter::category::Category;
use crate::filter::stats::{CategoryCounters, FilterStats, RuleStats};
use crate::filter::FilterError;
use crate::metrics::FilterMetrics;
use crate::point::Point;
use crate::rules::{RefreshStatus, RuleStore};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error};

/// Distinct unknown categories reported by name. Later ones share [`UNLISTED_CATEGORY`].
pub const MAX_REPORTED_CATEGORIES: usize = 32;
pub const UNLISTED_CATEGORY: &str = "other";

/// Drops points that match the rules configured for their category.
pub struct Filter {
    store: Arc<RuleStore>,
    metrics: FilterMetrics,
    counters: [CategoryCounters; Category::ALL.len()],
    reported: Mutex<HashSet<String>>,
}

impl Filter {
    #[must_use]
    pub fn new(store: Arc<RuleStore>, metrics: FilterMetrics) -> Self {
        Filter {
            store,
            metrics,
            counters: std::array::from_fn(|_| CategoryCounters::default()),
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the points no rule matched, in their original order.
    ///
    /// A batch for an unknown category is returned untouched and reported, since
    /// its points cannot be matched reliably.
    pub fn filter(&self, category: &str, points: Vec<Point>) -> Vec<Point> {
        let Some(kind) = Category::from_key(category) else {
            self.report_unsupported(category, points.len());
            return points;
        };

        let rules = self.store.snapshot();
        let Some(entry) = rules.get(kind.key()) else {
            return points;
        };

        let started = Instant::now();
        let seen = points.len();
        let name_tag = kind.name_tag();
        let survivors: Vec<Point> = points
            .into_iter()
            .filter(|point| !entry.conditions.eval(&Subject::from_point(point, name_tag)))
            .collect();
        let dropped = seen - survivors.len();
        let elapsed = started.elapsed();

        self.metrics.record_batch(
            kind.key(),
            &entry.raw,
            entry.origin.as_str(),
            seen,
            dropped,
            elapsed,
        );
        self.counters[kind.index()].record(seen, dropped, elapsed);

        if dropped > 0 {
            debug!("FILTER | {kind}: dropped {dropped} of {seen} points in {elapsed:?}");
        }
        survivors
    }

    /// Totals for every category that has filtered at least one batch.
    #[must_use]
    pub fn rule_stats(&self) -> BTreeMap<String, RuleStats> {
        let rules = self.store.snapshot();
        Category::ALL
            .into_iter()
            .filter_map(|category| {
                let conditions = rules.get(category.key()).map_or("", |r| r.raw.as_str());
                self.counters[category.index()]
                    .snapshot(conditions)
                    .map(|stats| (category.key().to_string(), stats))
            })
            .collect()
    }

    #[must_use]
    pub fn stats(&self, refresh: &Mutex<RefreshStatus>) -> FilterStats {
        FilterStats {
            refresh: refresh.lock().expect("lock poisoned").clone(),
            rule_stats: self.rule_stats(),
        }
    }

    fn report_unsupported(&self, category: &str, count: usize) {
        let (first, listed) = {
            let mut reported = self.reported.lock().expect("lock poisoned");
            if reported.contains(category) {
                (false, true)
            } else if reported.len() < MAX_REPORTED_CATEGORIES {
                reported.insert(category.to_string());
                (true, true)
            } else {
                (false, false)
            }
        };

        let label = if listed { category } else { UNLISTED_CATEGORY };
        self.metrics.record_unsupported_category(label);
        if first {
            error!("FILTER | unsupported category {category:?}, passing {count} points through");
        } else {
            debug!("FILTER | unsupported category {category:?}, passing {count} points through");
        }
    }
}

/// Whether `point` matches any of `conditions` when seen as part of a `category` batch.
pub fn matches(
    conditions: &WhereConditions,
    category: &str,
    point: &Point,
) -> Result<bool, FilterError> {
    let kind: Category = category.parse()?;
    Ok(conditions.eval(&Subject::from_point(point, kind.name_tag())))
}
