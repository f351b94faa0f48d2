use crate::rules::RefreshStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running totals for one category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleStats {
    pub total: u64,
    pub filtered: u64,
    pub cost_ms: f64,
    pub cost_per_point_ms: f64,
    /// Rules currently installed for the category.
    pub conditions: String,
}

/// Lock-free counters behind a category's [`RuleStats`].
#[derive(Debug, Default)]
pub(crate) struct CategoryCounters {
    batches: AtomicU64,
    total: AtomicU64,
    filtered: AtomicU64,
    cost_ns: AtomicU64,
}

impl CategoryCounters {
    pub(crate) fn record(&self, seen: usize, dropped: usize, cost: Duration) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(seen as u64, Ordering::Relaxed);
        self.filtered.fetch_add(dropped as u64, Ordering::Relaxed);
        let cost_ns = u64::try_from(cost.as_nanos()).unwrap_or(u64::MAX);
        self.cost_ns.fetch_add(cost_ns, Ordering::Relaxed);
    }

    /// `None` until a batch has been recorded.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn snapshot(&self, conditions: &str) -> Option<RuleStats> {
        if self.batches.load(Ordering::Relaxed) == 0 {
            return None;
        }
        let total = self.total.load(Ordering::Relaxed);
        let cost_ms = self.cost_ns.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        Some(RuleStats {
            total,
            filtered: self.filtered.load(Ordering::Relaxed),
            cost_ms,
            cost_per_point_ms: if total > 0 { cost_ms / total as f64 } else { 0.0 },
            conditions: conditions.to_string(),
        })
    }
}

/// Everything an operator needs to tell whether filtering is healthy.
#[derive(Debug, Clone, Serialize)]
pub struct FilterStats {
    #[serde(flatten)]
    pub refresh: RefreshStatus,
    pub rule_stats: BTreeMap<String, RuleStats>,
}
