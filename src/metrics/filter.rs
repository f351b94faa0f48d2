use crate::metrics::aggregator::{Aggregator, Series, Summary};
use crate::metrics::constants::{self, CONTEXTS};
use crate::metrics::metric::{self, Metric};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error};

/// Metrics buffered before a recorder drains them into the aggregator itself.
const METRIC_BUFFER: usize = 4096;

/// Label for `filter.pull.attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    Ok,
    Error,
    /// Fetched fine but identical to the payload already applied.
    Unchanged,
}

impl PullOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PullOutcome::Ok => "ok",
            PullOutcome::Error => "error",
            PullOutcome::Unchanged => "unchanged",
        }
    }
}

/// Records filter and rule refresh metrics into a shared aggregator.
///
/// Recording never waits on the aggregator: metrics go through a bounded
/// channel and are drained into the aggregator on read, or by the recorder
/// that finds the channel full.
#[derive(Clone)]
pub struct FilterMetrics {
    aggregator: Arc<Mutex<Aggregator<CONTEXTS>>>,
    tx: mpsc::Sender<Metric>,
    rx: Arc<Mutex<mpsc::Receiver<Metric>>>,
    overflow_reported: Arc<AtomicBool>,
}

impl FilterMetrics {
    #[must_use]
    pub fn new(aggregator: Arc<Mutex<Aggregator<CONTEXTS>>>) -> FilterMetrics {
        let (tx, rx) = mpsc::channel(METRIC_BUFFER);
        FilterMetrics {
            aggregator,
            tx,
            rx: Arc::new(Mutex::new(rx)),
            overflow_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One filtered batch for a category that has rules.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_batch(
        &self,
        category: &str,
        rule: &str,
        origin: &str,
        seen: usize,
        dropped: usize,
        latency: Duration,
    ) {
        let tags = [("category", category), ("rule", rule), ("origin", origin)];
        self.record(
            constants::POINTS_SEEN_METRIC,
            metric::Type::Count,
            seen as f64,
            &tags,
        );
        self.record(
            constants::POINTS_DROPPED_METRIC,
            metric::Type::Count,
            dropped as f64,
            &tags,
        );
        self.record(
            constants::FILTER_LATENCY_METRIC,
            metric::Type::Distribution,
            latency.as_secs_f64() * constants::SEC_TO_MS,
            &[("category", category), ("rule", rule)],
        );
    }

    pub fn record_pull(&self, outcome: PullOutcome, latency: Duration) {
        self.record(
            constants::PULL_ATTEMPTS_METRIC,
            metric::Type::Count,
            1.0,
            &[("outcome", outcome.as_str())],
        );
        self.record(
            constants::PULL_LATENCY_METRIC,
            metric::Type::Distribution,
            latency.as_secs_f64() * constants::SEC_TO_MS,
            &[],
        );
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_update(&self, unix_seconds: i64) {
        self.record(constants::RULE_UPDATES_METRIC, metric::Type::Count, 1.0, &[]);
        self.record(
            constants::RULE_LAST_UPDATE_METRIC,
            metric::Type::Gauge,
            unix_seconds as f64,
            &[],
        );
    }

    pub fn record_compile_error(&self, category: &str) {
        self.record(
            constants::RULE_COMPILE_ERRORS_METRIC,
            metric::Type::Count,
            1.0,
            &[("category", category)],
        );
    }

    pub fn record_unsupported_category(&self, category: &str) {
        self.record(
            constants::UNSUPPORTED_CATEGORY_METRIC,
            metric::Type::Count,
            1.0,
            &[("category", category)],
        );
    }

    /// Drops every context tagged with a rule that is not in `installed`.
    ///
    /// Called after a rule swap so that replaced rule texts stop holding contexts.
    pub fn retain_rules<'a>(&self, installed: impl IntoIterator<Item = &'a str>) {
        let installed: HashSet<String> = installed
            .into_iter()
            .map(|rule| metric::truncate(rule, constants::MAX_TAG_VALUE_BYTES))
            .collect();

        let mut aggregator = self.aggregator.lock().expect("lock poisoned");
        self.drain_into(&mut aggregator);
        let before = aggregator.len();
        aggregator.retain(|_, tags| {
            tags.iter()
                .all(|(key, value)| key != "rule" || installed.contains(value))
        });
        let evicted = before - aggregator.len();
        drop(aggregator);

        if evicted > 0 {
            debug!("FILTER | evicted {evicted} metric contexts of replaced rules");
            self.overflow_reported.store(false, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Series> {
        let mut aggregator = self.aggregator.lock().expect("lock poisoned");
        self.drain_into(&mut aggregator);
        aggregator.to_series()
    }

    /// Current value of a count or gauge.
    #[must_use]
    pub fn value(&self, name: &str, tags: &[(&str, &str)]) -> Option<f64> {
        let mut aggregator = self.aggregator.lock().expect("lock poisoned");
        self.drain_into(&mut aggregator);
        aggregator.value(name, tags)
    }

    /// Summary of a distribution.
    #[must_use]
    pub fn summary(&self, name: &str, tags: &[(&str, &str)]) -> Option<Summary> {
        let mut aggregator = self.aggregator.lock().expect("lock poisoned");
        self.drain_into(&mut aggregator);
        aggregator.summary(name, tags)
    }

    /// Number of distinct contexts held.
    #[must_use]
    pub fn contexts(&self) -> usize {
        let mut aggregator = self.aggregator.lock().expect("lock poisoned");
        self.drain_into(&mut aggregator);
        aggregator.len()
    }

    fn record(&self, name: &str, kind: metric::Type, value: f64, tags: &[(&str, &str)]) {
        let metric = match Metric::new(name, kind, value, tags) {
            Ok(metric) => metric,
            Err(e) => {
                error!("FILTER | failed to build {name} metric: {e}");
                return;
            }
        };
        match self.tx.try_send(metric) {
            Ok(()) => {}
            Err(TrySendError::Full(metric)) => {
                let mut aggregator = self.aggregator.lock().expect("lock poisoned");
                self.drain_into(&mut aggregator);
                self.insert(&mut aggregator, &metric);
            }
            // `self` holds the receiver.
            Err(TrySendError::Closed(_)) => debug!("FILTER | metric channel closed"),
        }
    }

    /// Callers must hold the aggregator lock, which is always taken before the receiver.
    fn drain_into(&self, aggregator: &mut Aggregator<CONTEXTS>) {
        let mut rx = self.rx.lock().expect("lock poisoned");
        while let Ok(metric) = rx.try_recv() {
            self.insert(aggregator, &metric);
        }
    }

    fn insert(&self, aggregator: &mut Aggregator<CONTEXTS>, metric: &Metric) {
        if let Err(e) = aggregator.insert(metric) {
            if self.overflow_reported.swap(true, Ordering::Relaxed) {
                debug!("FILTER | failed to insert {} metric: {e}", metric.name);
            } else {
                error!("FILTER | failed to insert {} metric: {e}", metric.name);
            }
        }
    }
}
